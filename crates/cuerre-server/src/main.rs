//! Cuerre - ephemeral file delivery over QR codes
//!
//! Accepts uploads, stores them durably, and answers with the URL of a QR
//! image that links back to the file.

use cuerre_blobstore::{BlobStore, MemoryBlobStore, PgBlobStore};
use cuerre_server::{
    spawn_sweeper, start_server, AppError, Config, Result, RetrievalCoordinator, ServerState,
    SharedState, StoreBackend, SweepTrigger, UploadCoordinator, UrlBuilder,
};
use file_blob_cache::BlobCache;
use qr_token::QrTokenGenerator;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("cuerre_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Cuerre server...");

    let config = Config::from_env()?;
    info!("Port: {}", config.port);
    info!("App URL: {}", config.app_url);
    info!("Store: {:?}", config.store_backend);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache TTL: {} seconds", config.cache_ttl.num_seconds());

    let store: Arc<dyn BlobStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let store = PgBlobStore::connect(&config.database_url, config.store).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory blob store; uploads will not survive a restart");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let cache = Arc::new(BlobCache::new(config.cache_dir.clone(), store.clone()));
    cache.init().await?;

    let (sweeper, sweep_requests) = SweepTrigger::channel();
    spawn_sweeper(
        cache.clone(),
        config.cache_ttl,
        config.sweep_interval,
        sweep_requests,
    );

    let uploads = UploadCoordinator::new(
        store.clone(),
        QrTokenGenerator::new(),
        UrlBuilder::new(config.app_url.clone()),
    );
    let retrieval = RetrievalCoordinator::new(store, cache);

    let state: SharedState = Arc::new(
        ServerState::new(uploads, retrieval, sweeper).with_static_dir(config.static_dir.clone()),
    );

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
