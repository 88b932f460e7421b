//! Retrieval flow: resolve a record, materialize it locally, note the read

use crate::error::Result;
use chrono::Utc;
use cuerre_blobstore::{BlobId, BlobRecord, BlobStore, BlobType};
use file_blob_cache::BlobCache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A blob ready to be streamed to a client
#[derive(Debug)]
pub struct ServableBlob {
    pub record: BlobRecord,
    pub path: PathBuf,
    pub size: u64,
    pub file: tokio::fs::File,
}

pub struct RetrievalCoordinator {
    store: Arc<dyn BlobStore>,
    cache: Arc<BlobCache>,
}

impl RetrievalCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, cache: Arc<BlobCache>) -> Self {
        Self { store, cache }
    }

    /// Look up `id` as a blob of `blob_type` and open its cached copy.
    ///
    /// A record of the other type is not found. Failing to record the
    /// read time does not fail the retrieval.
    pub async fn fetch(&self, blob_type: BlobType, id: &BlobId) -> Result<ServableBlob> {
        let record = self.store.find(id, blob_type).await?;
        let cached = self.cache.open(&record).await?;

        if let Err(e) = self.store.touch_last_read(id, Utc::now()).await {
            warn!(id = %id, error = %e, "Failed to record last read");
        }

        debug!(id = %id, blob_type = %blob_type, size = cached.entry.size, "Serving blob");
        Ok(ServableBlob {
            record,
            path: cached.entry.path,
            size: cached.entry.size,
            file: cached.file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testing::FlakyStore;
    use cuerre_blobstore::{MemoryBlobStore, NewBlob};
    use std::sync::atomic::Ordering;
    use tokio::io::AsyncReadExt;

    fn coordinator(store: Arc<dyn BlobStore>, dir: &std::path::Path) -> RetrievalCoordinator {
        let cache = Arc::new(BlobCache::new(dir.to_path_buf(), store.clone()));
        RetrievalCoordinator::new(store, cache)
    }

    async fn read_all(mut servable: ServableBlob) -> Vec<u8> {
        let mut buf = Vec::new();
        servable.file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_fetch_returns_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let id = store
            .put(b"hello world!".to_vec(), NewBlob::file("a.txt"))
            .await
            .unwrap();

        let retrieval = coordinator(store.clone(), dir.path());
        let servable = retrieval.fetch(BlobType::File, &id).await.unwrap();
        assert_eq!(servable.size, 12);
        assert!(servable.path.starts_with(dir.path()));
        assert_eq!(read_all(servable).await, b"hello world!");

        let record = store.find(&id, BlobType::File).await.unwrap();
        assert!(record.metadata.last_read.is_some());
    }

    #[tokio::test]
    async fn test_fetch_enforces_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let file_id = store.put(vec![1, 2, 3], NewBlob::file("a.bin")).await.unwrap();
        let qr_id = store.put(vec![4, 5, 6], NewBlob::qr()).await.unwrap();

        let retrieval = coordinator(store, dir.path());
        let err = retrieval.fetch(BlobType::Qr, &file_id).await.unwrap_err();
        assert!(matches!(err, AppError::Store(ref e) if e.is_not_found()));
        let err = retrieval.fetch(BlobType::File, &qr_id).await.unwrap_err();
        assert!(matches!(err, AppError::Store(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_refetch_reuses_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore::default());
        let id = store.put(b"same".to_vec(), NewBlob::file("s.txt")).await.unwrap();

        let retrieval = coordinator(store.clone(), dir.path());
        let first = retrieval.fetch(BlobType::File, &id).await.unwrap();
        let first_path = first.path.clone();
        assert_eq!(read_all(first).await, b"same");

        let second = retrieval.fetch(BlobType::File, &id).await.unwrap();
        assert_eq!(second.path, first_path);
        assert_eq!(read_all(second).await, b"same");

        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.len().await, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_touch_failure_still_serves() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore::default());
        let id = store.put(b"payload".to_vec(), NewBlob::file("p.txt")).await.unwrap();
        store.fail_touch.store(true, Ordering::SeqCst);

        let retrieval = coordinator(store.clone(), dir.path());
        let servable = retrieval.fetch(BlobType::File, &id).await.unwrap();
        assert_eq!(read_all(servable).await, b"payload");

        let record = store.find(&id, BlobType::File).await.unwrap();
        assert!(record.metadata.last_read.is_none());
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let retrieval = coordinator(Arc::new(MemoryBlobStore::new()), dir.path());
        let err = retrieval
            .fetch(BlobType::File, &BlobId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(ref e) if e.is_not_found()));
        assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
    }
}
