//! Content-addressed cache with stale-while-revalidate semantics.
//!
//! Values are produced on demand through [`Cache::get_or_compute`]; at most
//! one production per key runs at a time and its result is shared with every
//! caller waiting on that key. Entries live in a pluggable [`CacheStore`].

pub mod cache;
pub mod entry;
pub mod error;
pub mod store;

pub use cache::Cache;
pub use entry::{CacheEntry, CachePolicy, Fresh, Freshness};
pub use error::{BoxError, CacheError};
pub use store::{CacheStore, FsStore, MemoryStore};
