//! Cuerre server library
//!
//! Stores uploaded files, mints a QR token for each one's retrieval URL and
//! serves both from a local cache whose copies expire after a TTL.

pub mod config;
pub mod error;
pub mod retrieval;
pub mod server;
pub mod sweeper;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, StoreBackend};
pub use error::{AppError, Result};
pub use retrieval::{RetrievalCoordinator, ServableBlob};
pub use server::{create_router, start_server, ServerState, SharedState, MAX_UPLOAD_BYTES};
pub use sweeper::{spawn_sweeper, sweep_once, SweepTrigger};
pub use types::{HttpResponse, UploadReceipt};
pub use upload::{UploadCoordinator, UrlBuilder};
