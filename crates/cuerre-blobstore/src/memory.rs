//! In-process blob store

use crate::error::{Result, StoreError};
use crate::id::BlobId;
use crate::store::BlobStore;
use crate::types::{
    stored_filename, Blob, BlobMetadata, BlobRecord, BlobType, CacheCandidate, NewBlob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// A [`BlobStore`] that keeps records in memory.
///
/// Nothing survives a restart; used for local development and tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Blob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Ids of every stored record, in no particular order
    #[cfg(any(test, feature = "test-util"))]
    pub async fn ids(&self) -> Vec<BlobId> {
        self.blobs.read().await.keys().cloned().collect()
    }

    /// Overwrite a record's upload time
    #[cfg(any(test, feature = "test-util"))]
    pub async fn set_uploaded_at(&self, id: &BlobId, at: DateTime<Utc>) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        let blob = blobs.get_mut(id).ok_or(StoreError::NotFound)?;
        blob.record.uploaded_at = at;
        Ok(())
    }
}

fn matching<'a>(blob: Option<&'a Blob>, expected: BlobType) -> Result<&'a Blob> {
    blob.filter(|b| b.record.blob_type() == expected)
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, content: Vec<u8>, blob: NewBlob) -> Result<BlobId> {
        let id = BlobId::generate();
        let record = BlobRecord {
            id: id.clone(),
            filename: stored_filename(&blob.extension),
            length: content.len() as u64,
            metadata: BlobMetadata {
                extension: blob.extension,
                original_name: blob.original_name,
                blob_type: blob.blob_type,
                last_read: None,
            },
            uploaded_at: Utc::now(),
        };
        debug!(id = %id, filename = %record.filename, "Stored blob in memory");

        self.blobs
            .write()
            .await
            .insert(id.clone(), Blob { record, content });
        Ok(id)
    }

    async fn find(&self, id: &BlobId, expected: BlobType) -> Result<BlobRecord> {
        let blobs = self.blobs.read().await;
        matching(blobs.get(id), expected).map(|b| b.record.clone())
    }

    async fn get(&self, id: &BlobId, expected: BlobType) -> Result<Blob> {
        let blobs = self.blobs.read().await;
        matching(blobs.get(id), expected).cloned()
    }

    async fn touch_last_read(&self, id: &BlobId, at: DateTime<Utc>) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        let blob = blobs.get_mut(id).ok_or(StoreError::NotFound)?;
        blob.record.metadata.last_read = Some(at);
        Ok(())
    }

    async fn list_candidates(&self, filenames: &[String]) -> Result<Vec<CacheCandidate>> {
        let wanted: HashSet<&str> = filenames.iter().map(String::as_str).collect();
        let blobs = self.blobs.read().await;

        Ok(blobs
            .values()
            .filter(|b| wanted.contains(b.record.filename.as_str()))
            .map(|b| CacheCandidate {
                id: b.record.id.clone(),
                filename: b.record.filename.clone(),
                last_read: b.record.metadata.last_read,
                uploaded_at: b.record.uploaded_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryBlobStore::new();
        let id = store
            .put(b"hello world!".to_vec(), NewBlob::file("a.txt"))
            .await
            .unwrap();

        let blob = store.get(&id, BlobType::File).await.unwrap();
        assert_eq!(blob.content, b"hello world!");
        assert_eq!(blob.record.id, id);
        assert_eq!(blob.record.length, 12);
        assert_eq!(blob.record.metadata.extension, "txt");
        assert_eq!(blob.record.metadata.original_name.as_deref(), Some("a.txt"));
        assert_eq!(blob.record.metadata.last_read, None);
        assert!(blob.record.filename.ends_with(".txt"));
        assert_ne!(blob.record.filename, "a.txt");
    }

    #[tokio::test]
    async fn test_put_assigns_fresh_ids() {
        let store = MemoryBlobStore::new();
        let a = store.put(vec![1], NewBlob::qr()).await.unwrap();
        let b = store.put(vec![1], NewBlob::qr()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_not_found() {
        let store = MemoryBlobStore::new();
        let file_id = store.put(vec![1, 2], NewBlob::file("a.bin")).await.unwrap();
        let qr_id = store.put(vec![3, 4], NewBlob::qr()).await.unwrap();

        assert!(store.get(&file_id, BlobType::Qr).await.unwrap_err().is_not_found());
        assert!(store.get(&qr_id, BlobType::File).await.unwrap_err().is_not_found());
        assert!(store.find(&file_id, BlobType::Qr).await.unwrap_err().is_not_found());
        assert!(store.find(&qr_id, BlobType::Qr).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let store = MemoryBlobStore::new();
        let id = BlobId::generate();
        assert!(store.get(&id, BlobType::File).await.unwrap_err().is_not_found());
        assert!(store
            .touch_last_read(&id, Utc::now())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_touch_last_read_overwrites() {
        let store = MemoryBlobStore::new();
        let id = store.put(vec![0], NewBlob::file("x.txt")).await.unwrap();

        let first = Utc::now() - Duration::minutes(5);
        let second = Utc::now();
        store.touch_last_read(&id, first).await.unwrap();
        store.touch_last_read(&id, second).await.unwrap();
        store.touch_last_read(&id, second).await.unwrap();

        let record = store.find(&id, BlobType::File).await.unwrap();
        assert_eq!(record.metadata.last_read, Some(second));
        assert_eq!(record.blob_type(), BlobType::File);
    }

    #[tokio::test]
    async fn test_list_candidates_ignores_unknown_names() {
        let store = MemoryBlobStore::new();
        let id = store.put(vec![0], NewBlob::file("x.txt")).await.unwrap();
        let record = store.find(&id, BlobType::File).await.unwrap();

        let candidates = store
            .list_candidates(&[record.filename.clone(), "stray-file.tmp".to_string()])
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, id);
        assert_eq!(candidates[0].filename, record.filename);

        assert!(store.list_candidates(&[]).await.unwrap().is_empty());
    }
}
