//! Error types for the blob cache

use cuerre_blobstore::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Store(StoreError),
    Io(Box<std::io::Error>),
    /// A stored filename that is not a single plain path component
    InvalidFilename(String),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Store(err) if err.is_not_found())
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Store(err) => write!(f, "Blob store error: {}", err),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::InvalidFilename(name) => {
                write!(f, "Invalid cache filename: {:?}", name)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Store(err) => Some(err),
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::InvalidFilename(_) => None,
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Store(err)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
