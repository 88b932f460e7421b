use crate::error::Result;
use crate::id::BlobId;
use crate::types::{Blob, BlobRecord, BlobType, CacheCandidate, NewBlob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable storage for blob payloads and their metadata.
///
/// Every call is a round trip to the backing store; implementations keep
/// no read cache of their own. A record whose type differs from the one a
/// caller expects is reported as [`StoreError::NotFound`], exactly like a
/// missing record, so a QR image can never be read through the file path
/// and vice versa.
///
/// [`StoreError::NotFound`]: crate::StoreError::NotFound
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload under a freshly minted id
    async fn put(&self, content: Vec<u8>, blob: NewBlob) -> Result<BlobId>;

    /// Look up a record's metadata without transferring its payload
    async fn find(&self, id: &BlobId, expected: BlobType) -> Result<BlobRecord>;

    /// Fetch a record together with its payload
    async fn get(&self, id: &BlobId, expected: BlobType) -> Result<Blob>;

    /// Overwrite `lastRead`; idempotent
    async fn touch_last_read(&self, id: &BlobId, at: DateTime<Utc>) -> Result<()>;

    /// Records whose stored filename is one of `filenames`.
    ///
    /// Names with no durable record are left out of the result.
    async fn list_candidates(&self, filenames: &[String]) -> Result<Vec<CacheCandidate>>;
}
