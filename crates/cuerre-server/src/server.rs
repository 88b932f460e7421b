//! HTTP server
//!
//! Provides `POST /create`, `GET /file/{id}`, `GET /qr/{id}`, `/health` and
//! `/ping`. Any other path goes to the static file directory when one is
//! configured and is a 404 otherwise.

use crate::error::{AppError, Result};
use crate::retrieval::RetrievalCoordinator;
use crate::sweeper::SweepTrigger;
use crate::types::HttpResponse;
use crate::upload::UploadCoordinator;
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use cuerre_blobstore::{BlobId, BlobRecord, BlobType};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info};

/// Largest accepted upload request body
pub const MAX_UPLOAD_BYTES: usize = 10 << 20;

/// Multipart field carrying the uploaded file
const FILE_FIELD: &str = "file";

/// Shared state for the HTTP server
pub struct ServerState {
    pub uploads: UploadCoordinator,
    pub retrieval: RetrievalCoordinator,
    pub sweeper: SweepTrigger,
    pub static_dir: Option<PathBuf>,
}

impl ServerState {
    pub fn new(
        uploads: UploadCoordinator,
        retrieval: RetrievalCoordinator,
        sweeper: SweepTrigger,
    ) -> Self {
        Self {
            uploads,
            retrieval,
            sweeper,
            static_dir: None,
        }
    }

    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let mut router = Router::new()
        .route("/create", post(create))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/file/{id}", get(get_file))
        .route("/qr/{id}", get(get_qr));

    router = match &state.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found),
    };

    router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

async fn health() -> Json<HttpResponse<()>> {
    Json(HttpResponse::message("Api up and running"))
}

async fn ping() -> &'static str {
    "pong"
}

/// Accept a multipart upload and answer with the QR token's URL
async fn create(
    State(state): State<SharedState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<HttpResponse<String>>> {
    state.sweeper.trigger();

    let (content, original_name) = read_file_field(multipart?).await?;
    debug!(original_name = %original_name, size = content.len(), "Received upload");

    let receipt = state.uploads.upload(content, &original_name).await?;
    Ok(Json(HttpResponse::ok(
        "File uploaded successfully",
        receipt.qr_url,
    )))
}

/// Bytes and client-side name of the `file` field; other fields are ignored
async fn read_file_field(mut multipart: Multipart) -> Result<(Vec<u8>, String)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await?;
        return Ok((content.to_vec(), original_name));
    }

    Err(AppError::Validation(format!(
        "Missing multipart field `{}`",
        FILE_FIELD
    )))
}

async fn get_file(state: State<SharedState>, Path(id): Path<String>) -> Result<Response> {
    serve_blob(state, BlobType::File, &id).await
}

async fn get_qr(state: State<SharedState>, Path(id): Path<String>) -> Result<Response> {
    serve_blob(state, BlobType::Qr, &id).await
}

async fn not_found() -> AppError {
    AppError::NotFound
}

/// Stream a stored file or QR token
async fn serve_blob(
    State(state): State<SharedState>,
    blob_type: BlobType,
    id: &str,
) -> Result<Response> {
    state.sweeper.trigger();

    let id = BlobId::parse(id)?;
    let servable = state.retrieval.fetch(blob_type, &id).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(&servable.record))
        .header(header::CONTENT_LENGTH, servable.size);
    if let Some(disposition) = content_disposition(&servable.record) {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(servable.file)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn content_type(record: &BlobRecord) -> String {
    match record.blob_type() {
        BlobType::Qr => "image/png".to_string(),
        BlobType::File => mime_guess::from_ext(&record.metadata.extension)
            .first_or_octet_stream()
            .to_string(),
    }
}

/// `inline` with the uploader's file name, for files whose name is known
fn content_disposition(record: &BlobRecord) -> Option<HeaderValue> {
    if record.blob_type() != BlobType::File {
        return None;
    }
    let name = record.metadata.original_name.as_deref()?;
    let safe: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("inline; filename=\"{}\"", safe)).ok()
}
