//! Upload flow: store the file, mint its QR token, store the token

use crate::error::Result;
use crate::types::UploadReceipt;
use cuerre_blobstore::{BlobId, BlobStore, BlobType, NewBlob};
use qr_token::QrTokenGenerator;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds retrieval URLs of the form `{base}/{type}/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    base: String,
}

impl UrlBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn retrieval_url(&self, blob_type: BlobType, id: &BlobId) -> String {
        format!("{}/{}/{}", self.base, blob_type, id)
    }
}

pub struct UploadCoordinator {
    store: Arc<dyn BlobStore>,
    tokens: QrTokenGenerator,
    urls: UrlBuilder,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, tokens: QrTokenGenerator, urls: UrlBuilder) -> Self {
        Self {
            store,
            tokens,
            urls,
        }
    }

    /// Store `content`, then store a QR token pointing at it.
    ///
    /// The two writes are not atomic. If minting or storing the token
    /// fails, the file record is left behind unreferenced and the failure
    /// is logged with its id.
    pub async fn upload(&self, content: Vec<u8>, original_name: &str) -> Result<UploadReceipt> {
        let size = content.len();
        let file_id = self.store.put(content, NewBlob::file(original_name)).await?;
        let file_url = self.urls.retrieval_url(BlobType::File, &file_id);

        let png = match self.tokens.generate(&file_url) {
            Ok(png) => png,
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "QR encoding failed; file record orphaned");
                return Err(e.into());
            }
        };

        let qr_id = match self.store.put(png, NewBlob::qr()).await {
            Ok(id) => id,
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "Storing QR token failed; file record orphaned");
                return Err(e.into());
            }
        };
        let qr_url = self.urls.retrieval_url(BlobType::Qr, &qr_id);

        info!(file_id = %file_id, qr_id = %qr_id, size, "Upload stored");
        Ok(UploadReceipt {
            file_id,
            qr_id,
            file_url,
            qr_url,
        })
    }
}
