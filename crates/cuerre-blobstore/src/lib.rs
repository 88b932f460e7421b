//! Durable blob storage for Cuerre
//!
//! Stores uploaded files and their QR token images as independent records,
//! keyed by store-generated identifiers and tagged with their [`BlobType`].
//! The [`BlobStore`] trait is the seam used by the cache and the request
//! coordinators; [`PgBlobStore`] backs it with PostgreSQL and
//! [`MemoryBlobStore`] keeps everything in process.

mod error;
mod id;
mod memory;
mod postgres;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use id::{BlobId, InvalidBlobId};
pub use memory::MemoryBlobStore;
pub use postgres::{PgBlobStore, StoreOptions};
pub use store::BlobStore;
pub use types::{
    extension_of, stored_filename, Blob, BlobMetadata, BlobRecord, BlobType, CacheCandidate,
    NewBlob,
};
