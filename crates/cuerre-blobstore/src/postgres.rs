//! PostgreSQL-backed blob store
//!
//! All operations share one bounded connection pool. Each operation is
//! scoped by a timeout; when it elapses the call fails with
//! [`StoreError::Unavailable`] and is not retried.

use crate::error::{Result, StoreError};
use crate::id::BlobId;
use crate::store::BlobStore;
use crate::types::{
    stored_filename, Blob, BlobMetadata, BlobRecord, BlobType, CacheCandidate, NewBlob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const RECORD_COLUMNS: &str =
    "id, filename, length, extension, original_name, blob_type, last_read, uploaded_at";

/// Pool sizing and per-operation timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub op_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            op_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BlobRow {
    id: String,
    filename: String,
    length: i64,
    extension: String,
    original_name: Option<String>,
    blob_type: String,
    last_read: Option<DateTime<Utc>>,
    uploaded_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct BlobContentRow {
    #[sqlx(flatten)]
    record: BlobRow,
    content: Vec<u8>,
}

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: String,
    filename: String,
    last_read: Option<DateTime<Utc>>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<BlobRow> for BlobRecord {
    type Error = StoreError;

    fn try_from(row: BlobRow) -> Result<Self> {
        let id = BlobId::parse(&row.id).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let blob_type = BlobType::parse(&row.blob_type).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown blob type {:?} for {}", row.blob_type, id))
        })?;
        let length = u64::try_from(row.length)
            .map_err(|_| StoreError::Corrupt(format!("negative length for {}", id)))?;

        Ok(BlobRecord {
            id,
            filename: row.filename,
            length,
            metadata: BlobMetadata {
                extension: row.extension,
                original_name: row.original_name,
                blob_type,
                last_read: row.last_read,
            },
            uploaded_at: row.uploaded_at,
        })
    }
}

impl TryFrom<CandidateRow> for CacheCandidate {
    type Error = StoreError;

    fn try_from(row: CandidateRow) -> Result<Self> {
        Ok(CacheCandidate {
            id: BlobId::parse(&row.id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            filename: row.filename,
            last_read: row.last_read,
            uploaded_at: row.uploaded_at,
        })
    }
}

/// Blob store backed by the `blobs` table
#[derive(Debug, Clone)]
pub struct PgBlobStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgBlobStore {
    /// Connect with a bounded pool
    pub async fn connect(database_url: &str, options: StoreOptions) -> Result<Self> {
        info!(
            max_connections = options.max_connections,
            timeout_secs = options.op_timeout.as_secs(),
            "Connecting to blob store..."
        );
        let connect = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.op_timeout)
            .connect(database_url);

        let pool = timeout(options.op_timeout, connect)
            .await
            .map_err(|_| StoreError::Unavailable("timed out connecting to database".to_string()))??;
        info!("Blob store connection established");

        Ok(Self::from_pool(pool, options.op_timeout))
    }

    pub fn from_pool(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Run versioned migrations (tracked in `_sqlx_migrations`)
    pub async fn migrate(&self) -> Result<()> {
        info!("Running blob store migrations...");
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        info!("Blob store migrations completed");
        Ok(())
    }

    async fn scoped<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => {
                warn!(op, timeout_secs = self.op_timeout.as_secs(), "Blob store call timed out");
                Err(StoreError::Unavailable(format!(
                    "{} timed out after {}s",
                    op,
                    self.op_timeout.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl BlobStore for PgBlobStore {
    async fn put(&self, content: Vec<u8>, blob: NewBlob) -> Result<BlobId> {
        let id = BlobId::generate();
        let filename = stored_filename(&blob.extension);
        let length = content.len() as i64;

        self.scoped(
            "put",
            sqlx::query(
                r#"
                INSERT INTO blobs
                    (id, filename, length, content, extension, original_name, blob_type, uploaded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(id.as_str())
            .bind(&filename)
            .bind(length)
            .bind(&content)
            .bind(&blob.extension)
            .bind(&blob.original_name)
            .bind(blob.blob_type.as_str())
            .bind(Utc::now())
            .execute(&self.pool),
        )
        .await?;

        debug!(id = %id, filename = %filename, length, blob_type = %blob.blob_type, "Stored blob");
        Ok(id)
    }

    async fn find(&self, id: &BlobId, expected: BlobType) -> Result<BlobRecord> {
        let sql = format!(
            "SELECT {} FROM blobs WHERE id = $1 AND blob_type = $2",
            RECORD_COLUMNS
        );
        let row: Option<BlobRow> = self
            .scoped(
                "find",
                sqlx::query_as(&sql)
                    .bind(id.as_str())
                    .bind(expected.as_str())
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn get(&self, id: &BlobId, expected: BlobType) -> Result<Blob> {
        let sql = format!(
            "SELECT {}, content FROM blobs WHERE id = $1 AND blob_type = $2",
            RECORD_COLUMNS
        );
        let row: Option<BlobContentRow> = self
            .scoped(
                "get",
                sqlx::query_as(&sql)
                    .bind(id.as_str())
                    .bind(expected.as_str())
                    .fetch_optional(&self.pool),
            )
            .await?;

        let row = row.ok_or(StoreError::NotFound)?;
        Ok(Blob {
            record: row.record.try_into()?,
            content: row.content,
        })
    }

    async fn touch_last_read(&self, id: &BlobId, at: DateTime<Utc>) -> Result<()> {
        let result = self
            .scoped(
                "touch_last_read",
                sqlx::query("UPDATE blobs SET last_read = $2 WHERE id = $1")
                    .bind(id.as_str())
                    .bind(at)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_candidates(&self, filenames: &[String]) -> Result<Vec<CacheCandidate>> {
        if filenames.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<CandidateRow> = self
            .scoped(
                "list_candidates",
                sqlx::query_as(
                    "SELECT id, filename, last_read, uploaded_at FROM blobs WHERE filename = ANY($1)",
                )
                .bind(filenames)
                .fetch_all(&self.pool),
            )
            .await?;

        rows.into_iter().map(CacheCandidate::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(blob_type: &str, length: i64) -> BlobRow {
        BlobRow {
            id: "65f1c0ffee00112233445566".to_string(),
            filename: "65f1c0ffee00112233445577.txt".to_string(),
            length,
            extension: "txt".to_string(),
            original_name: Some("a.txt".to_string()),
            blob_type: blob_type.to_string(),
            last_read: None,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_options() {
        let options = StoreOptions::default();
        assert_eq!(options.max_connections, 5);
        assert_eq!(options.op_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_row_into_record() {
        let record = BlobRecord::try_from(row("file", 12)).unwrap();
        assert_eq!(record.id.as_str(), "65f1c0ffee00112233445566");
        assert_eq!(record.length, 12);
        assert_eq!(record.blob_type(), BlobType::File);
        assert_eq!(record.metadata.original_name.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_row_with_unknown_type_is_corrupt() {
        let err = BlobRecord::try_from(row("assets", 12)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_row_with_negative_length_is_corrupt() {
        let err = BlobRecord::try_from(row("qr", -1)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    fn unreachable_store(op_timeout: Duration) -> PgBlobStore {
        // Nothing listens on port 1; the pool keeps retrying until it gives up.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://cuerre@127.0.0.1:1/cuerre")
            .unwrap();
        PgBlobStore::from_pool(pool, op_timeout)
    }

    #[tokio::test]
    async fn test_unreachable_database_is_unavailable() {
        let store = unreachable_store(Duration::from_millis(300));
        let started = std::time::Instant::now();

        let err = store
            .put(b"hello".to_vec(), NewBlob::file("a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "put: {err:?}");

        let err = store
            .find(&BlobId::generate(), BlobType::File)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "find: {err:?}");

        let err = store
            .list_candidates(&["65f1c0ffee00112233445577.txt".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "list_candidates: {err:?}");

        // Each call gives up once, without retrying past its timeout.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stalled_call_times_out() {
        let store = unreachable_store(Duration::from_millis(50));
        let err = store
            .scoped("get", std::future::pending::<std::result::Result<(), sqlx::Error>>())
            .await
            .unwrap_err();
        match err {
            StoreError::Unavailable(message) => assert!(message.starts_with("get timed out")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_migration_error_keeps_source() {
        let err = StoreError::from(sqlx::Error::from(sqlx::migrate::MigrateError::VersionMissing(1)));
        assert!(matches!(err, StoreError::Database(_)));
        let source = std::error::Error::source(&err).unwrap();
        assert!(matches!(
            source.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Migrate(_))
        ));
    }

    #[test]
    fn test_candidate_row_with_bad_id_is_corrupt() {
        let candidate = CandidateRow {
            id: "short".to_string(),
            filename: "x".to_string(),
            last_read: None,
            uploaded_at: Utc::now(),
        };
        assert!(CacheCandidate::try_from(candidate).is_err());
    }
}
