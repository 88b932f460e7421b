//! Core types for the Cuerre server

use cuerre_blobstore::BlobId;
use serde::Serialize;

/// JSON envelope used by every JSON endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> HttpResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_id: BlobId,
    pub qr_id: BlobId,
    /// URL encoded inside the QR token
    pub file_url: String,
    /// URL returned to the uploader
    pub qr_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response_serialization() {
        let body = HttpResponse::ok("File uploaded successfully", "http://x/qr/1".to_string());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "File uploaded successfully");
        assert_eq!(json["data"], "http://x/qr/1");
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let json = serde_json::to_value(HttpResponse::<()>::failure("")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false }));
    }

    #[test]
    fn test_receipt_serialization() {
        let receipt = UploadReceipt {
            file_id: BlobId::parse("65f1c0ffee00112233445566").unwrap(),
            qr_id: BlobId::parse("65f1c0ffee00112233445567").unwrap(),
            file_url: "http://localhost:3030/file/65f1c0ffee00112233445566".to_string(),
            qr_url: "http://localhost:3030/qr/65f1c0ffee00112233445567".to_string(),
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["fileId"], "65f1c0ffee00112233445566");
        assert_eq!(json["qrUrl"], receipt.qr_url);
    }
}
