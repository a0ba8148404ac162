//! src/services/sqlite_store.rs
//!
//! SqliteChunkStore: the durable chunk store. Metadata records live in the
//! `files` table and payload chunks in `chunks`, keyed by `(file_id, n)`.
//! Identifiers are stored as their 24-character hex form.

use crate::{
    models::{file::FileMetadata, object_id::ObjectId},
    services::chunk_store::{ChunkStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tracing::debug;

/// Schema applied by [`SqliteChunkStore::migrate`].
const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteChunkStore {
    /// Shared SQLite connection pool.
    db: Arc<SqlitePool>,
}

#[derive(FromRow)]
struct FileRow {
    id: String,
    filename: String,
    length: Option<i64>,
    chunk_size: i64,
    content_type: String,
    upload_date: DateTime<Utc>,
    md5: Option<String>,
}

impl TryFrom<FileRow> for FileMetadata {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StoreError::CorruptRecord {
            file_id: row.id.clone(),
            reason: reason.to_string(),
        };
        let id = ObjectId::parse_str(&row.id).map_err(|_| corrupt("malformed id"))?;
        let length = row
            .length
            .map(u64::try_from)
            .transpose()
            .map_err(|_| corrupt("negative length"))?;
        let chunk_size =
            u32::try_from(row.chunk_size).map_err(|_| corrupt("chunk size out of range"))?;

        Ok(FileMetadata {
            id,
            filename: row.filename,
            length,
            chunk_size,
            content_type: row.content_type,
            upload_date: row.upload_date,
            md5: row.md5,
        })
    }
}

impl SqliteChunkStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// A private in-memory database.
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = INIT_MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn write_chunk(&self, file_id: ObjectId, n: u32, data: Bytes) -> StoreResult<()> {
        let result = sqlx::query("INSERT INTO chunks (file_id, n, data) VALUES (?, ?, ?)")
            .bind(file_id.to_hex())
            .bind(i64::from(n))
            .bind(data.as_ref())
            .execute(&*self.db)
            .await;

        match result {
            Ok(_) => Ok(()),
            // Someone else's chunk already sits under this key.
            Err(err) if is_unique_violation(&err) => Err(StoreError::FileAlreadyExists(file_id)),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn read_chunk(&self, file_id: ObjectId, n: u32) -> StoreResult<Bytes> {
        let data = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT data FROM chunks WHERE file_id = ? AND n = ?",
        )
        .bind(file_id.to_hex())
        .bind(i64::from(n))
        .fetch_optional(&*self.db)
        .await?;

        data.map(Bytes::from)
            .ok_or(StoreError::ChunkNotFound { file_id, n })
    }

    async fn write_metadata(&self, record: &FileMetadata) -> StoreResult<()> {
        let length = record
            .length
            .map(i64::try_from)
            .transpose()
            .map_err(|_| StoreError::CorruptRecord {
                file_id: record.id.to_hex(),
                reason: "length does not fit in a signed 64-bit column".into(),
            })?;

        let result = sqlx::query(
            "INSERT INTO files (id, filename, length, chunk_size, content_type, upload_date, md5)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_hex())
        .bind(&record.filename)
        .bind(length)
        .bind(i64::from(record.chunk_size))
        .bind(&record.content_type)
        .bind(record.upload_date)
        .bind(record.md5.as_deref())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::FileAlreadyExists(record.id)),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn read_metadata(&self, file_id: ObjectId) -> StoreResult<FileMetadata> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, filename, length, chunk_size, content_type, upload_date, md5
             FROM files WHERE id = ?",
        )
        .bind(file_id.to_hex())
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::FileNotFound(file_id)),
        }
    }

    async fn delete_file(&self, file_id: ObjectId) -> StoreResult<()> {
        let key = file_id.to_hex();
        let mut tx = self.db.begin().await?;
        let chunks = sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        let files = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(
            %file_id,
            chunks = chunks.rows_affected(),
            "deleted file chunks"
        );
        if files.rows_affected() == 0 {
            return Err(StoreError::FileNotFound(file_id));
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value != 1 {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "unexpected ping result: {}",
                value
            ))));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::DEFAULT_CONTENT_TYPE;
    use tempfile::TempDir;

    async fn setup_store() -> SqliteChunkStore {
        let store = SqliteChunkStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn record(id: ObjectId, length: Option<u64>, chunk_size: u32) -> FileMetadata {
        FileMetadata {
            id,
            filename: "clip.mp4".into(),
            length,
            chunk_size,
            content_type: DEFAULT_CONTENT_TYPE.into(),
            upload_date: Utc::now(),
            md5: Some("e09c80c42fda55f9d992e59ca6b3307d".into()),
        }
    }

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 12])
    }

    #[tokio::test]
    async fn test_chunk_roundtrip() {
        let store = setup_store().await;
        store
            .write_chunk(id(1), 0, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        store
            .write_chunk(id(1), 1, Bytes::from_static(b"ef"))
            .await
            .unwrap();

        assert_eq!(store.read_chunk(id(1), 0).await.unwrap(), "abcd");
        assert_eq!(store.read_chunk(id(1), 1).await.unwrap(), "ef");
    }

    #[tokio::test]
    async fn test_missing_chunk_is_not_found() {
        let store = setup_store().await;
        let err = store.read_chunk(id(1), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::ChunkNotFound { n: 0, .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let store = setup_store().await;
        let meta = record(id(2), Some(10), 4);
        store.write_metadata(&meta).await.unwrap();

        let loaded = store.read_metadata(id(2)).await.unwrap();
        assert_eq!(loaded.id, meta.id);
        assert_eq!(loaded.length, Some(10));
        assert_eq!(loaded.chunk_size, 4);
        assert_eq!(loaded.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(loaded.md5, meta.md5);
        assert_eq!(
            loaded.upload_date.timestamp_millis(),
            meta.upload_date.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_unknown_length_roundtrip() {
        let store = setup_store().await;
        store.write_metadata(&record(id(3), None, 4)).await.unwrap();
        assert_eq!(store.read_metadata(id(3)).await.unwrap().length, None);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_not_found() {
        let store = setup_store().await;
        let err = store.read_metadata(id(9)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_is_write_once() {
        let store = setup_store().await;
        store.write_metadata(&record(id(4), Some(1), 4)).await.unwrap();
        let err = store
            .write_metadata(&record(id(4), Some(2), 4))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::FileAlreadyExists(_)));
        assert_eq!(store.read_metadata(id(4)).await.unwrap().length, Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_chunk_is_rejected() {
        let store = setup_store().await;
        store
            .write_chunk(id(5), 0, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let err = store
            .write_chunk(id(5), 0, Bytes::from_static(b"b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::FileAlreadyExists(_)));
        assert_eq!(store.read_chunk(id(5), 0).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_chunks() {
        let store = setup_store().await;
        store
            .write_chunk(id(6), 0, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        store.write_metadata(&record(id(6), Some(4), 4)).await.unwrap();

        store.delete_file(id(6)).await.unwrap();

        assert!(store.read_metadata(id(6)).await.unwrap_err().is_not_found());
        assert!(matches!(
            store.read_chunk(id(6), 0).await.unwrap_err(),
            StoreError::ChunkNotFound { .. }
        ));
        assert!(store.delete_file(id(6)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_clears_orphaned_chunks() {
        let store = setup_store().await;
        store
            .write_chunk(id(7), 0, Bytes::from_static(b"left over"))
            .await
            .unwrap();

        let err = store.delete_file(id(7)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.read_chunk(id(7), 0).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_row_is_reported() {
        let store = setup_store().await;
        sqlx::query(
            "INSERT INTO files (id, filename, length, chunk_size, content_type, upload_date)
             VALUES (?, 'bad', -5, 4, 'video/mp4', ?)",
        )
        .bind(id(8).to_hex())
        .bind(Utc::now())
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.read_metadata(id(8)).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn test_ping() {
        let store = setup_store().await;
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("store.db").display());

        let store = SqliteChunkStore::connect(&url, 2).await.unwrap();
        store.migrate().await.unwrap();
        store
            .write_chunk(id(10), 0, Bytes::from_static(b"persisted"))
            .await
            .unwrap();
        store.write_metadata(&record(id(10), Some(9), 16)).await.unwrap();
        store.pool().close().await;

        let reopened = SqliteChunkStore::connect(&url, 2).await.unwrap();
        reopened.migrate().await.unwrap();
        assert_eq!(reopened.read_metadata(id(10)).await.unwrap().length, Some(9));
        assert_eq!(reopened.read_chunk(id(10), 0).await.unwrap(), "persisted");
    }
}
