//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use std::{
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};
use tower::ServiceExt;
use video_store::{
    models::{file::FileMetadata, object_id::ObjectId},
    services::{
        chunk_store::{ChunkStore, StoreError, StoreResult},
        memory_store::MemoryChunkStore,
    },
    state::AppState,
};

/// Memory store that counts every call and can be told to fail.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryChunkStore,
    pub chunk_reads: AtomicU32,
    pub metadata_reads: AtomicU32,
    fail_chunk: Option<u32>,
    pub fail_metadata: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read of chunk `n` fails with an I/O error.
    pub fn failing_chunk(n: u32) -> Self {
        Self {
            fail_chunk: Some(n),
            ..Self::default()
        }
    }

    pub fn chunk_reads(&self) -> u32 {
        self.chunk_reads.load(Ordering::SeqCst)
    }

    pub fn metadata_reads(&self) -> u32 {
        self.metadata_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for CountingStore {
    async fn write_chunk(&self, file_id: ObjectId, n: u32, data: Bytes) -> StoreResult<()> {
        self.inner.write_chunk(file_id, n, data).await
    }

    async fn read_chunk(&self, file_id: ObjectId, n: u32) -> StoreResult<Bytes> {
        self.chunk_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_chunk == Some(n) {
            return Err(StoreError::Io(std::io::Error::other("backend unavailable")));
        }
        self.inner.read_chunk(file_id, n).await
    }

    async fn write_metadata(&self, record: &FileMetadata) -> StoreResult<()> {
        self.inner.write_metadata(record).await
    }

    async fn read_metadata(&self, file_id: ObjectId) -> StoreResult<FileMetadata> {
        self.metadata_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("backend unavailable")));
        }
        self.inner.read_metadata(file_id).await
    }

    async fn delete_file(&self, file_id: ObjectId) -> StoreResult<()> {
        self.inner.delete_file(file_id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("backend unavailable")));
        }
        Ok(())
    }
}

pub fn chunk_size(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

/// Build state and router around `store`.
pub fn app_with(store: Arc<dyn ChunkStore>, chunk: u32) -> (AppState, Router) {
    let state = AppState::new(store, chunk_size(chunk));
    let app = video_store::app(state.clone());
    (state, app)
}

/// Write `chunks` as file `id` directly through the store.
pub async fn put_file(
    store: &dyn ChunkStore,
    id: ObjectId,
    chunks: &[&[u8]],
    chunk_size: u32,
) -> FileMetadata {
    let mut length = 0u64;
    for (n, chunk) in chunks.iter().enumerate() {
        store
            .write_chunk(id, n as u32, Bytes::copy_from_slice(chunk))
            .await
            .unwrap();
        length += chunk.len() as u64;
    }
    let record = FileMetadata {
        id,
        filename: "f1".into(),
        length: Some(length),
        chunk_size,
        content_type: "video/mp4".into(),
        upload_date: Utc::now(),
        md5: None,
    };
    store.write_metadata(&record).await.unwrap();
    record
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
