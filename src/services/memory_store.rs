//! In-memory chunk store backend.

use crate::{
    models::{file::FileMetadata, object_id::ObjectId},
    services::chunk_store::{ChunkStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// Chunk store kept entirely in process memory.
///
/// Useful for tests and for throwaway instances; contents are lost on exit.
#[derive(Default)]
pub struct MemoryChunkStore {
    files: RwLock<HashMap<ObjectId, FileMetadata>>,
    chunks: RwLock<BTreeMap<(ObjectId, u32), Bytes>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks held for `file_id`.
    pub async fn chunk_count(&self, file_id: ObjectId) -> usize {
        let chunks = self.chunks.read().await;
        chunks
            .range((file_id, 0)..=(file_id, u32::MAX))
            .count()
    }

    /// Number of chunks held across all files.
    pub async fn stored_chunks(&self) -> usize {
        self.chunks.read().await.len()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn write_chunk(&self, file_id: ObjectId, n: u32, data: Bytes) -> StoreResult<()> {
        let mut chunks = self.chunks.write().await;
        debug_assert!(
            n == 0 || chunks.contains_key(&(file_id, n - 1)),
            "chunk {n} of {file_id} written out of order"
        );
        if chunks.contains_key(&(file_id, n)) {
            return Err(StoreError::FileAlreadyExists(file_id));
        }
        debug!(%file_id, n, size = data.len(), "storing chunk in memory");
        chunks.insert((file_id, n), data);
        Ok(())
    }

    async fn read_chunk(&self, file_id: ObjectId, n: u32) -> StoreResult<Bytes> {
        let chunks = self.chunks.read().await;
        chunks
            .get(&(file_id, n))
            .cloned()
            .ok_or(StoreError::ChunkNotFound { file_id, n })
    }

    async fn write_metadata(&self, record: &FileMetadata) -> StoreResult<()> {
        let mut files = self.files.write().await;
        if files.contains_key(&record.id) {
            return Err(StoreError::FileAlreadyExists(record.id));
        }
        files.insert(record.id, record.clone());
        Ok(())
    }

    async fn read_metadata(&self, file_id: ObjectId) -> StoreResult<FileMetadata> {
        let files = self.files.read().await;
        files
            .get(&file_id)
            .cloned()
            .ok_or(StoreError::FileNotFound(file_id))
    }

    async fn delete_file(&self, file_id: ObjectId) -> StoreResult<()> {
        let mut files = self.files.write().await;
        let mut chunks = self.chunks.write().await;
        chunks.retain(|(owner, _), _| *owner != file_id);
        debug!(%file_id, "deleted file from memory");
        match files.remove(&file_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::FileNotFound(file_id)),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 12])
    }

    fn record(file_id: ObjectId) -> FileMetadata {
        FileMetadata {
            id: file_id,
            filename: "f1".into(),
            length: Some(10),
            chunk_size: 4,
            content_type: "video/mp4".into(),
            upload_date: Utc::now(),
            md5: None,
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryChunkStore::new();
        store
            .write_chunk(id(1), 0, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        assert_eq!(store.read_chunk(id(1), 0).await.unwrap(), "abcd");
        assert_eq!(store.chunk_count(id(1)).await, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent_chunk() {
        let store = MemoryChunkStore::new();
        assert!(matches!(
            store.read_chunk(id(1), 3).await,
            Err(StoreError::ChunkNotFound { n: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_metadata_write_once() {
        let store = MemoryChunkStore::new();
        store.write_metadata(&record(id(2))).await.unwrap();
        assert!(matches!(
            store.write_metadata(&record(id(2))).await,
            Err(StoreError::FileAlreadyExists(_))
        ));
        assert_eq!(store.read_metadata(id(2)).await.unwrap().filename, "f1");
    }

    #[tokio::test]
    async fn test_delete_only_touches_one_file() {
        let store = MemoryChunkStore::new();
        for (file, byte) in [(id(3), b'x'), (id(4), b'y')] {
            store
                .write_chunk(file, 0, Bytes::from(vec![byte; 4]))
                .await
                .unwrap();
            store
                .write_chunk(file, 1, Bytes::from(vec![byte; 2]))
                .await
                .unwrap();
            store.write_metadata(&record(file)).await.unwrap();
        }

        store.delete_file(id(3)).await.unwrap();

        assert_eq!(store.chunk_count(id(3)).await, 0);
        assert_eq!(store.chunk_count(id(4)).await, 2);
        assert!(store.read_metadata(id(3)).await.unwrap_err().is_not_found());
        assert!(store.delete_file(id(3)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_chunk_is_rejected() {
        let store = MemoryChunkStore::new();
        store
            .write_chunk(id(5), 0, Bytes::from_static(b"a"))
            .await
            .unwrap();
        assert!(matches!(
            store.write_chunk(id(5), 0, Bytes::from_static(b"b")).await,
            Err(StoreError::FileAlreadyExists(_))
        ));
        assert_eq!(store.read_chunk(id(5), 0).await.unwrap(), "a");
    }
}
