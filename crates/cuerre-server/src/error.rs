//! Error types for the Cuerre server

use crate::types::HttpResponse;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cuerre_blobstore::{InvalidBlobId, StoreError};
use file_blob_cache::CacheError;
use qr_token::TokenError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// The request is malformed; the message is returned to the client
    Validation(String),
    NotFound,
    Store(StoreError),
    Cache(CacheError),
    Encoding(TokenError),
    Internal(String),
    /// Startup only; never produced while serving
    Config(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            AppError::Cache(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show to a client
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Store(err) if err.is_not_found() => "File not found".to_string(),
            AppError::Cache(err) if err.is_not_found() => "File not found".to_string(),
            AppError::NotFound => "File not found".to_string(),
            AppError::Store(_) | AppError::Cache(_) => "Storage unavailable".to_string(),
            AppError::Encoding(_) => "Error generating QR code".to_string(),
            AppError::Internal(_) | AppError::Config(_) => "Internal server error".to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Invalid request: {}", msg),
            AppError::NotFound => write!(f, "Not found"),
            AppError::Store(err) => write!(f, "Blob store error: {}", err),
            AppError::Cache(err) => write!(f, "Cache error: {}", err),
            AppError::Encoding(err) => write!(f, "Token error: {}", err),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Store(err) => Some(err),
            AppError::Cache(err) => Some(err),
            AppError::Encoding(err) => Some(err),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(HttpResponse::<()>::failure(self.public_message()))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Encoding(err)
    }
}

impl From<InvalidBlobId> for AppError {
    fn from(err: InvalidBlobId) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(err.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(err: MultipartRejection) -> Self {
        AppError::Validation(err.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for AppError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_is_bad_request() {
        let (status, body) = body_json(AppError::Validation("missing file".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "missing file");
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_store_not_found_is_404() {
        let (status, body) = body_json(AppError::from(StoreError::NotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "File not found");

        let (status, _) = body_json(AppError::from(CacheError::Store(StoreError::NotFound))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unavailable_hides_details() {
        let err = AppError::from(StoreError::Unavailable("pool exhausted at 10.0.0.3".into()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Storage unavailable");
    }

    #[tokio::test]
    async fn test_encoding_is_500() {
        let err = AppError::from(TokenError::Encoding("data too long".into()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Error generating QR code");
    }

    #[test]
    fn test_invalid_id_is_validation() {
        let err = AppError::from(InvalidBlobId("nope".into()));
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_config_error_display() {
        let err = AppError::Config("CUERRE_PORT: invalid digit".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: CUERRE_PORT: invalid digit"
        );
    }
}
