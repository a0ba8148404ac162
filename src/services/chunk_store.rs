//! The chunk store contract shared by every storage backend.
//!
//! A stored file is an ordered run of immutable chunks keyed by
//! `(file id, sequence number)` plus one metadata record. Writers persist all
//! chunks first and the metadata record last, so a file only becomes visible
//! to readers once it is complete.

use crate::models::{file::FileMetadata, object_id::ObjectId};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file `{0}` not found")]
    FileNotFound(ObjectId),
    #[error("chunk {n} of file `{file_id}` not found")]
    ChunkNotFound { file_id: ObjectId, n: u32 },
    #[error("file `{0}` already exists")]
    FileAlreadyExists(ObjectId),
    #[error("chunk {n} of file `{file_id}` is missing")]
    ChunkMissing { file_id: ObjectId, n: u32 },
    #[error("chunk {n} of file `{file_id}` has {actual} bytes, expected {expected}")]
    ChunkWrongSize {
        file_id: ObjectId,
        n: u32,
        expected: usize,
        actual: usize,
    },
    #[error("file `{file_id}` has a corrupt record: {reason}")]
    CorruptRecord { file_id: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True for the "no such file" case that maps to a 404.
    ///
    /// A missing chunk of a file whose metadata exists is an integrity fault
    /// and does not count.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::FileNotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Chunk-level persistence primitives.
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// every request. A read returns either the complete chunk as written or
/// `ChunkNotFound`; never a partial chunk.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist chunk `n` of `file_id`.
    ///
    /// Callers write each file's chunks in increasing order starting at 0.
    async fn write_chunk(&self, file_id: ObjectId, n: u32, data: Bytes) -> StoreResult<()>;

    /// Read chunk `n` of `file_id`.
    async fn read_chunk(&self, file_id: ObjectId, n: u32) -> StoreResult<Bytes>;

    /// Persist the metadata record; fails if the id already has one.
    async fn write_metadata(&self, record: &FileMetadata) -> StoreResult<()>;

    /// Fetch the metadata record, or `FileNotFound`.
    async fn read_metadata(&self, file_id: ObjectId) -> StoreResult<FileMetadata>;

    /// Remove the metadata record and every chunk of the file.
    ///
    /// Orphaned chunks are removed even when no record exists, in which case
    /// `FileNotFound` is still returned.
    async fn delete_file(&self, file_id: ObjectId) -> StoreResult<()>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}
