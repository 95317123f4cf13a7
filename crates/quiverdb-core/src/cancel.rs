//! Cooperative cancellation for long-running operations.
//!
//! Every public engine operation accepts a [`CancelToken`]. Workers check
//! the token at well-defined points (between candidates, between pages,
//! between retries) and unwind with [`Error::Cancelled`]. Timeouts are
//! realized by cancelling from above; the engine imposes none itself.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply cloneable cancellation flag shared between a caller and the
/// workers executing on its behalf.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token that is never cancelled.
    ///
    /// Convenience for callers without a deadline.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// Requests cancellation. All clones observe the flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Checkpoint: returns `Err(Cancelled)` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once [`CancelToken::cancel`] has been
    /// called on any clone of this token.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes_checkpoint() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint().is_ok());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.checkpoint(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_never_token() {
        let token = CancelToken::never();
        assert!(token.checkpoint().is_ok());
    }
}
