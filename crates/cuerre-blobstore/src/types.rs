//! Blob record types

use crate::id::BlobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest extension kept from a user-supplied name
const MAX_EXTENSION_LEN: usize = 16;

/// What a stored blob is. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    /// An uploaded file
    File,
    /// The QR token image minted for an uploaded file
    Qr,
}

impl BlobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobType::File => "file",
            BlobType::Qr => "qr",
        }
    }

    /// Parse the path segment / column value form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(BlobType::File),
            "qr" => Some(BlobType::Qr),
            _ => None,
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured metadata stored next to each payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(rename = "type")]
    pub blob_type: BlobType,
    /// Only mutable field; set by successful retrievals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read: Option<DateTime<Utc>>,
}

/// A durable blob record, without its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    pub id: BlobId,
    /// Store-internal name, also used as the local cache file name
    pub filename: String,
    pub length: u64,
    pub metadata: BlobMetadata,
    pub uploaded_at: DateTime<Utc>,
}

impl BlobRecord {
    pub fn blob_type(&self) -> BlobType {
        self.metadata.blob_type
    }
}

/// A record together with its payload
#[derive(Debug, Clone)]
pub struct Blob {
    pub record: BlobRecord,
    pub content: Vec<u8>,
}

/// Metadata supplied by the writer of a new blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlob {
    pub extension: String,
    pub original_name: Option<String>,
    pub blob_type: BlobType,
}

impl NewBlob {
    /// An uploaded file; the extension is derived from its original name.
    /// An empty name is recorded as absent.
    pub fn file(original_name: &str) -> Self {
        Self {
            extension: extension_of(original_name),
            original_name: (!original_name.is_empty()).then(|| original_name.to_string()),
            blob_type: BlobType::File,
        }
    }

    /// A rendered PNG token
    pub fn qr() -> Self {
        Self {
            extension: "png".to_string(),
            original_name: None,
            blob_type: BlobType::Qr,
        }
    }
}

/// Durable bookkeeping the eviction sweep needs for one cached file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCandidate {
    pub id: BlobId,
    pub filename: String,
    pub last_read: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

impl CacheCandidate {
    /// The time eviction age is measured from
    pub fn clock(&self) -> DateTime<Utc> {
        self.last_read.unwrap_or(self.uploaded_at)
    }
}

/// Extension of a user-supplied file name.
///
/// Takes the text after the last `.`, keeps ASCII alphanumerics only and
/// caps the length. A name without a dot, or whose suffix has nothing
/// left after that, has the empty extension.
pub fn extension_of(original_name: &str) -> String {
    match original_name.rsplit_once('.') {
        Some((_, suffix)) => suffix
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(MAX_EXTENSION_LEN)
            .collect(),
        None => String::new(),
    }
}

/// Fresh store-internal file name for a blob with the given extension
pub fn stored_filename(extension: &str) -> String {
    let stem = BlobId::generate();
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, extension)
    }
}
