//! Async I/O engine: a worker pool serializing page access.
//!
//! Requests are routed to workers by `page_id % workers`, so operations on
//! the same page execute in submission order on one worker while distinct
//! pages proceed independently. Each worker owns a bounded queue; when it
//! fills, blocking submissions wait and [`AsyncIoEngine::try_write`]
//! returns `Busy`.
//!
//! Writes are acknowledged once buffered. The per-worker buffer flushes
//! to the page store when it reaches the configured byte budget or when
//! the flush interval elapses, whichever is first; flush failures are
//! retried and then held until the next `sync`, which reports them. Reads
//! consult the buffer, so a worker always observes its own pending
//! writes. `sync` fans a barrier to every worker and joins all replies
//! after the buffers drain, so it covers all previously-submitted writes.

use crate::cancel::CancelToken;
use crate::config::IoConfig;
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use indexmap::IndexMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

use super::page::{Page, PageType};
use super::page_store::PageStore;

/// Transient write failures are retried this many times before surfacing.
const WRITE_RETRIES: usize = 3;

enum IoRequest {
    Read {
        page_id: u32,
        reply: Sender<Result<Page>>,
    },
    Write {
        page_id: u32,
        page_type: PageType,
        data: Vec<u8>,
        reply: Sender<Result<()>>,
    },
    Sync {
        reply: Sender<Result<()>>,
    },
}

struct Job {
    request: IoRequest,
    cancel: CancelToken,
}

/// Worker pool wrapping a [`PageStore`].
pub struct AsyncIoEngine {
    store: Arc<PageStore>,
    queues: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncIoEngine {
    /// Starts the worker pool over `store`.
    #[must_use]
    pub fn new(store: Arc<PageStore>, config: &IoConfig) -> Self {
        let worker_count = config.effective_async_workers().max(1);
        let queue_size = config.async_queue_size.max(1);
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));
        let write_buffer_size = config.write_buffer_size.max(1);

        let mut queues = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for worker_idx in 0..worker_count {
            let (tx, rx) = bounded::<Job>(queue_size);
            let store = Arc::clone(&store);
            let handle = std::thread::Builder::new()
                .name(format!("quiver-io-{worker_idx}"))
                .spawn(move || {
                    worker_loop(&store, &rx, write_buffer_size, flush_interval);
                })
                .expect("failed to spawn io worker");
            queues.push(tx);
            workers.push(handle);
        }

        debug!(workers = worker_count, queue_size, "async io engine started");
        Self {
            store,
            queues,
            workers,
        }
    }

    /// The wrapped page store.
    #[must_use]
    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    /// Reads a page through the pool, blocking until the slot frees up.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the token fires first; otherwise storage errors.
    pub fn read(&self, page_id: u32, cancel: &CancelToken) -> Result<Page> {
        cancel.checkpoint()?;
        let (reply_tx, reply_rx) = bounded(1);
        self.submit(
            page_id,
            Job {
                request: IoRequest::Read {
                    page_id,
                    reply: reply_tx,
                },
                cancel: cancel.clone(),
            },
        )?;
        recv_reply(&reply_rx)
    }

    /// Writes a page through the pool, blocking until the slot frees up.
    ///
    /// The write is acknowledged once buffered; durability comes from
    /// [`AsyncIoEngine::sync`].
    ///
    /// # Errors
    ///
    /// `Cancelled` when the token fires first; otherwise storage errors.
    pub fn write(
        &self,
        page_id: u32,
        page_type: PageType,
        data: Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.checkpoint()?;
        let (reply_tx, reply_rx) = bounded(1);
        self.submit(
            page_id,
            Job {
                request: IoRequest::Write {
                    page_id,
                    page_type,
                    data,
                    reply: reply_tx,
                },
                cancel: cancel.clone(),
            },
        )?;
        recv_reply(&reply_rx)
    }

    /// Non-blocking write submission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] immediately when the target queue is full.
    pub fn try_write(
        &self,
        page_id: u32,
        page_type: PageType,
        data: Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.checkpoint()?;
        let (reply_tx, reply_rx) = bounded(1);
        let queue = &self.queues[self.route(page_id)];
        let job = Job {
            request: IoRequest::Write {
                page_id,
                page_type,
                data,
                reply: reply_tx,
            },
            cancel: cancel.clone(),
        };
        queue
            .try_send(job)
            .map_err(|_| Error::Busy("io queue is full".to_string()))?;
        recv_reply(&reply_rx)
    }

    /// Drains every worker's write buffer and fsyncs the store.
    ///
    /// Waits for all previously-submitted writes: requests already queued
    /// ahead of the barrier complete before their worker acknowledges.
    ///
    /// # Errors
    ///
    /// Surfaces the first worker failure, including deferred flush errors.
    pub fn sync(&self, cancel: &CancelToken) -> Result<()> {
        cancel.checkpoint()?;
        let mut replies = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            let (reply_tx, reply_rx) = bounded(1);
            queue
                .send(Job {
                    request: IoRequest::Sync { reply: reply_tx },
                    cancel: cancel.clone(),
                })
                .map_err(|_| Error::Storage("io engine is shut down".to_string()))?;
            replies.push(reply_rx);
        }
        for reply in replies {
            recv_reply(&reply)?;
        }
        Ok(())
    }

    fn route(&self, page_id: u32) -> usize {
        page_id as usize % self.queues.len()
    }

    fn submit(&self, page_id: u32, job: Job) -> Result<()> {
        self.queues[self.route(page_id)]
            .send(job)
            .map_err(|_| Error::Storage("io engine is shut down".to_string()))
    }
}

impl Drop for AsyncIoEngine {
    fn drop(&mut self) {
        // Closing the queues lets each worker drain, flush, and exit.
        self.queues.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn recv_reply<T>(reply: &Receiver<Result<T>>) -> Result<T> {
    reply
        .recv()
        .map_err(|_| Error::Storage("io worker dropped the reply".to_string()))?
}

/// Pending coalesced writes, keyed by page id; the latest image wins and
/// submission order is preserved for the flush.
struct WriteBuffer {
    pending: IndexMap<u32, (PageType, Vec<u8>)>,
    bytes: usize,
    deferred_error: Option<Error>,
}

impl WriteBuffer {
    fn new() -> Self {
        Self {
            pending: IndexMap::new(),
            bytes: 0,
            deferred_error: None,
        }
    }

    fn push(&mut self, page_id: u32, page_type: PageType, data: Vec<u8>) {
        self.bytes += data.len();
        if let Some((_, old)) = self.pending.insert(page_id, (page_type, data)) {
            self.bytes -= old.len();
        }
    }

    fn flush(&mut self, store: &PageStore) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let entries: Vec<(u32, PageType, Vec<u8>)> = self
            .pending
            .drain(..)
            .map(|(id, (ty, data))| (id, ty, data))
            .collect();
        self.bytes = 0;

        let writes: Vec<(u32, PageType, &[u8])> = entries
            .iter()
            .map(|(id, ty, data)| (*id, *ty, data.as_slice()))
            .collect();

        for attempt in 0..=WRITE_RETRIES {
            match store.write_batch(&writes) {
                Ok(_) => return Ok(()),
                Err(err) if err.is_recoverable() && attempt < WRITE_RETRIES => {
                    warn!(attempt, error = %err, "retrying page batch write");
                }
                Err(err) => {
                    let storage_err = Error::Storage(err.to_string());
                    self.deferred_error = Some(Error::Storage(err.to_string()));
                    return Err(storage_err);
                }
            }
        }
        unreachable!("retry loop either returns or records an error")
    }
}

fn worker_loop(
    store: &PageStore,
    rx: &Receiver<Job>,
    write_buffer_size: usize,
    flush_interval: Duration,
) {
    let mut buffer = WriteBuffer::new();

    loop {
        match rx.recv_timeout(flush_interval) {
            Ok(job) => {
                if job.cancel.is_cancelled() {
                    cancel_job(job.request);
                    continue;
                }
                match job.request {
                    IoRequest::Read { page_id, reply } => {
                        // Serve pending images so a worker sees its own writes.
                        let result = match buffer.pending.get(&page_id) {
                            Some((page_type, data)) => {
                                Page::new(page_id, *page_type, 0, data, store.page_size())
                            }
                            None => store.read_page(page_id),
                        };
                        let _ = reply.send(result);
                    }
                    IoRequest::Write {
                        page_id,
                        page_type,
                        data,
                        reply,
                    } => {
                        buffer.push(page_id, page_type, data);
                        let _ = reply.send(Ok(()));
                        if buffer.bytes >= write_buffer_size {
                            let _ = buffer.flush(store);
                        }
                    }
                    IoRequest::Sync { reply } => {
                        let result = match buffer.deferred_error.take() {
                            Some(err) => Err(err),
                            None => buffer.flush(store).and_then(|()| store.sync()),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = buffer.flush(store);
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = buffer.flush(store);
                let _ = store.sync();
                break;
            }
        }
    }
}

fn cancel_job(request: IoRequest) {
    match request {
        IoRequest::Read { reply, .. } => {
            let _ = reply.send(Err(Error::Cancelled));
        }
        IoRequest::Write { reply, .. } => {
            let _ = reply.send(Err(Error::Cancelled));
        }
        IoRequest::Sync { reply } => {
            let _ = reply.send(Err(Error::Cancelled));
        }
    }
}
