//! Error types for the blob store

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// No record with that id, or its type differs from the one asked for
    NotFound,
    /// The store could not be reached in time
    Unavailable(String),
    Database(Box<sqlx::Error>),
    /// A stored row could not be turned back into a record
    Corrupt(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "Blob not found"),
            StoreError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StoreError::Database(err) => write!(f, "Database error: {}", err),
            StoreError::Corrupt(msg) => write!(f, "Corrupt blob record: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::PoolTimedOut => {
                StoreError::Unavailable("timed out waiting for a pooled connection".to_string())
            }
            sqlx::Error::Io(e) => StoreError::Unavailable(format!("database unreachable: {}", e)),
            err => StoreError::Database(Box::new(err)),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
