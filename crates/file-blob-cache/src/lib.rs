//! File-based blob cache with TTL eviction
//!
//! Materializes durable blobs onto local disk so they can be served
//! cheaply, and evicts local copies whose durable last-read time is older
//! than a TTL. The cache is a read-through accelerator only: every file in
//! it can be deleted at any time and rebuilt from the blob store.

mod cache;
mod error;
mod locks;
mod types;

pub use cache::{default_ttl, BlobCache, DEFAULT_TTL_SECS};
pub use error::{CacheError, Result};
pub use types::{CacheEntry, CacheStats, CachedFile, EvictionReport};
