//! Materialization and TTL eviction of durable blobs on local disk

use crate::error::{CacheError, Result};
use crate::locks::KeyedLocks;
use crate::types::{CacheEntry, CacheStats, CachedFile, EvictionReport};
use chrono::{DateTime, Duration, Utc};
use cuerre_blobstore::{BlobId, BlobRecord, BlobStore};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default eviction TTL: two hours since the last durable read
pub const DEFAULT_TTL_SECS: i64 = 2 * 60 * 60;

/// Prefix of in-progress writes; never served and never swept
const PARTIAL_PREFIX: &str = ".partial-";

pub fn default_ttl() -> Duration {
    Duration::seconds(DEFAULT_TTL_SECS)
}

/// Local disk cache in front of a [`BlobStore`]
pub struct BlobCache {
    store: Arc<dyn BlobStore>,
    /// Flat directory holding one file per cached blob
    cache_dir: PathBuf,
    /// In-memory view of what this process has materialized
    entries: RwLock<HashMap<BlobId, CacheEntry>>,
    locks: KeyedLocks,
    current_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlobCache {
    pub fn new(cache_dir: PathBuf, store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            cache_dir,
            entries: RwLock::new(HashMap::new()),
            locks: KeyedLocks::default(),
            current_size: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Ensure the cache directory exists and drop partial writes left by
    /// an earlier process
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;

        let mut removed = 0usize;
        let mut dir = fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(PARTIAL_PREFIX) {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = ?entry.path(), error = %e, "Failed to remove partial file"),
                }
            }
        }

        info!(cache_dir = ?self.cache_dir, removed_partials = removed, "Cache initialized");
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Make sure `record`'s payload is on local disk and return where.
    ///
    /// An existing cache file is reused without touching the store.
    pub async fn materialize(&self, record: &BlobRecord) -> Result<CacheEntry> {
        let _guard = self.locks.lock(&record.id).await;
        self.materialize_locked(record).await
    }

    /// Materialize `record` and open it for reading
    pub async fn open(&self, record: &BlobRecord) -> Result<CachedFile> {
        let _guard = self.locks.lock(&record.id).await;
        let entry = self.materialize_locked(record).await?;
        let file = fs::File::open(&entry.path).await?;
        Ok(CachedFile { entry, file })
    }

    async fn materialize_locked(&self, record: &BlobRecord) -> Result<CacheEntry> {
        let path = self.path_for(&record.filename)?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() == record.length => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(id = %record.id, "Cache hit");
                return Ok(self.register(record, path).await);
            }
            Ok(meta) => {
                warn!(
                    id = %record.id,
                    cached_len = meta.len(),
                    durable_len = record.length,
                    "Cached file does not match its record, refetching"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(id = %record.id, "Cache miss");

        let blob = self.store.get(&record.id, record.blob_type()).await?;
        self.write_atomically(&record.filename, &path, &blob.content)
            .await?;

        Ok(self.register(&blob.record, path).await)
    }

    /// Write to a partial file in the cache directory, then rename it over
    /// the final path so readers only ever see complete files.
    async fn write_atomically(&self, filename: &str, path: &Path, data: &[u8]) -> Result<()> {
        let partial = self
            .cache_dir
            .join(format!("{}{}", PARTIAL_PREFIX, filename));

        let written = async {
            let mut file = fs::File::create(&partial).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&partial, path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn register(&self, record: &BlobRecord, path: PathBuf) -> CacheEntry {
        let entry = CacheEntry {
            blob_id: record.id.clone(),
            path,
            size: record.length,
            materialized_at: Utc::now(),
        };

        let previous = {
            let mut entries = self.entries.write().await;
            entries.insert(record.id.clone(), entry.clone())
        };
        if let Some(previous) = previous {
            self.current_size.fetch_sub(previous.size, Ordering::Relaxed);
        }
        self.current_size.fetch_add(entry.size, Ordering::Relaxed);

        entry
    }

    async fn unregister(&self, id: &BlobId) {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(id)
        };
        if let Some(entry) = removed {
            self.current_size.fetch_sub(entry.size, Ordering::Relaxed);
        }
    }

    /// Cache path for a stored filename
    fn path_for(&self, filename: &str) -> Result<PathBuf> {
        let mut components = Path::new(filename).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single || filename.starts_with(PARTIAL_PREFIX) {
            return Err(CacheError::InvalidFilename(filename.to_string()));
        }
        Ok(self.cache_dir.join(filename))
    }

    /// Names of complete files currently in the cache directory
    async fn cached_filenames(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.cache_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }
            names.push(name);
        }

        Ok(names)
    }

    /// Delete local copies whose durable last read (or upload, if never
    /// read) is more than `ttl` before `now`.
    ///
    /// Durable records are never touched. Files without a durable record
    /// and files held by an in-flight request are skipped; a failed
    /// deletion is logged and the sweep carries on.
    pub async fn evict_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<EvictionReport> {
        let filenames = self.cached_filenames().await?;
        let mut report = EvictionReport {
            scanned: filenames.len(),
            ..Default::default()
        };
        if filenames.is_empty() {
            return Ok(report);
        }

        let candidates = self.store.list_candidates(&filenames).await?;
        report.untracked = filenames.len().saturating_sub(candidates.len());

        for candidate in candidates {
            let age = now - candidate.clock();
            if age <= ttl {
                report.retained += 1;
                continue;
            }

            let Some(_guard) = self.locks.try_lock(&candidate.id) else {
                debug!(id = %candidate.id, "Expired entry is in use, skipping");
                report.busy += 1;
                continue;
            };

            let path = match self.path_for(&candidate.filename) {
                Ok(path) => path,
                Err(e) => {
                    warn!(id = %candidate.id, error = %e, "Skipping unexpected cache filename");
                    report.failed += 1;
                    continue;
                }
            };

            match fs::remove_file(&path).await {
                Ok(()) => {
                    self.unregister(&candidate.id).await;
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    report.evicted += 1;
                    info!(
                        id = %candidate.id,
                        filename = %candidate.filename,
                        age_secs = age.num_seconds(),
                        "Evicted cached blob"
                    );
                }
                Err(e) => {
                    if e.kind() == ErrorKind::NotFound {
                        self.unregister(&candidate.id).await;
                    }
                    warn!(path = ?path, error = %e, "Failed to evict cached blob");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            total_size: self.current_size.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
