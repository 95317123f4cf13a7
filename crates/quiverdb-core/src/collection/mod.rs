//! Collections: the unit of storage and search.
//!
//! A collection owns its vectors, its index, its page store, an optional
//! vectorizer, and the search executor with its query cache. All
//! persistent state lives under one directory per collection.

mod core;
mod search;
mod types;

#[cfg(test)]
mod search_tests;

pub use types::{Collection, CollectionConfig, CollectionInfo, ContentPolicy};
