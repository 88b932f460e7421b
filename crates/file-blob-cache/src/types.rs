//! Cache types

use chrono::{DateTime, Utc};
use cuerre_blobstore::BlobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A blob materialized on local disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub blob_id: BlobId,
    pub path: PathBuf,
    pub size: u64,
    /// Last time this entry was materialized or confirmed present
    pub materialized_at: DateTime<Utc>,
}

/// A cache entry opened for reading.
///
/// The handle is opened while the entry's lock is held, so it stays
/// readable even if the file is evicted afterwards.
#[derive(Debug)]
pub struct CachedFile {
    pub entry: CacheEntry,
    pub file: tokio::fs::File,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Cache files looked at
    pub scanned: usize,
    /// Files with no durable record; left alone
    pub untracked: usize,
    /// Files still within the TTL
    pub retained: usize,
    /// Expired files skipped because a request held them
    pub busy: usize,
    pub evicted: usize,
    /// Deletions that failed
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_cache_entry_serialization() {
        let entry = CacheEntry {
            blob_id: BlobId::parse("65f1c0ffee00112233445566").unwrap(),
            path: PathBuf::from("/cache/65f1c0ffee00112233445577.png"),
            size: 12345,
            materialized_at: Utc::now(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("65f1c0ffee00112233445566"));
        assert!(json.contains("12345"));

        let deserialized: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.blob_id, entry.blob_id);
        assert_eq!(deserialized.size, entry.size);
    }
}
