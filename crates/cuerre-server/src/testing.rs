//! Store wrappers for exercising failure paths in tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cuerre_blobstore::{
    Blob, BlobId, BlobRecord, BlobStore, BlobType, CacheCandidate, MemoryBlobStore, NewBlob,
    Result, StoreError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A [`MemoryBlobStore`] whose writes and touches can be made to fail
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
    pub inner: MemoryBlobStore,
    /// Fail every `put` after this many have succeeded
    pub puts_allowed: Option<usize>,
    pub fail_touch: AtomicBool,
    pub puts: AtomicUsize,
    pub gets: AtomicUsize,
}

impl FlakyStore {
    pub fn allowing_puts(n: usize) -> Arc<Self> {
        Arc::new(Self {
            puts_allowed: Some(n),
            ..Self::default()
        })
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected failure".to_string())
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, content: Vec<u8>, blob: NewBlob) -> Result<BlobId> {
        let done = self.puts.fetch_add(1, Ordering::SeqCst);
        if self.puts_allowed.is_some_and(|allowed| done >= allowed) {
            return Err(unavailable());
        }
        self.inner.put(content, blob).await
    }

    async fn find(&self, id: &BlobId, expected: BlobType) -> Result<BlobRecord> {
        self.inner.find(id, expected).await
    }

    async fn get(&self, id: &BlobId, expected: BlobType) -> Result<Blob> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id, expected).await
    }

    async fn touch_last_read(&self, id: &BlobId, at: DateTime<Utc>) -> Result<()> {
        if self.fail_touch.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.touch_last_read(id, at).await
    }

    async fn list_candidates(&self, filenames: &[String]) -> Result<Vec<CacheCandidate>> {
        self.inner.list_candidates(filenames).await
    }
}
