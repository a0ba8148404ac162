//! Lazy, forward-only reader over a file's chunks.
//!
//! A [`StreamHandle`] yields one store chunk per element, in sequence order,
//! issuing the next read only when the consumer asks for the next element. At
//! most one chunk is in flight per handle, so memory use is bounded by the
//! file's chunk size no matter how large the file is.

use crate::{
    models::{file::FileMetadata, object_id::ObjectId},
    services::chunk_store::{ChunkStore, StoreError, StoreResult},
};
use bytes::Bytes;
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Terminal error produced by a [`StreamHandle`].
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("stream cancelled")]
    Cancelled,
}

/// Opens [`StreamHandle`]s and tracks how many are alive.
#[derive(Clone)]
pub struct StreamReader {
    store: Arc<dyn ChunkStore>,
    open_streams: Arc<AtomicUsize>,
}

impl StreamReader {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Resolve `id` and open a fresh cursor at chunk 0.
    pub async fn open(&self, id: ObjectId) -> StoreResult<StreamHandle> {
        let file = self.store.read_metadata(id).await?;
        self.open_file(file, CancellationToken::new())
    }

    /// Open a cursor over an already-resolved file.
    ///
    /// Cancelling `cancel` stops the cursor before its next read, or aborts
    /// the read in flight.
    pub fn open_file(
        &self,
        file: FileMetadata,
        cancel: CancellationToken,
    ) -> StoreResult<StreamHandle> {
        if !file.has_valid_layout() {
            return Err(StoreError::CorruptRecord {
                file_id: file.id.to_hex(),
                reason: format!(
                    "chunk size {} cannot describe length {:?}",
                    file.chunk_size, file.length
                ),
            });
        }

        let lease = StreamLease::acquire(self.open_streams.clone());
        let cursor = Cursor {
            store: self.store.clone(),
            file,
            next: 0,
            cancel,
            _lease: lease,
        };

        let inner = stream::unfold(Some(cursor), |state| async move {
            let mut cursor = state?;
            match cursor.advance().await {
                Ok(Some(data)) => Some((Ok(data), Some(cursor))),
                Ok(None) => {
                    debug!(file_id = %cursor.file.id, chunks = cursor.next, "stream finished");
                    None
                }
                Err(err) => Some((Err(err), None)),
            }
        })
        .fuse()
        .boxed();

        Ok(StreamHandle { inner })
    }

    /// Handles currently alive, whether or not they are being polled.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

/// One open stream over a file. Ends after the last chunk, or with a single
/// terminal error.
pub struct StreamHandle {
    inner: BoxStream<'static, Result<Bytes, StreamError>>,
}

impl Stream for StreamHandle {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

struct Cursor {
    store: Arc<dyn ChunkStore>,
    file: FileMetadata,
    next: u32,
    cancel: CancellationToken,
    _lease: StreamLease,
}

impl Cursor {
    /// Read the next chunk, `Ok(None)` at a clean end of file.
    async fn advance(&mut self) -> Result<Option<Bytes>, StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        let file_id = self.file.id;
        let n = self.next;
        let count = self.file.chunk_count();
        if count.is_some_and(|count| n >= count) {
            return Ok(None);
        }

        trace!(%file_id, n, "reading chunk");
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
            read = self.store.read_chunk(file_id, n) => read,
        };

        let data = match read {
            Ok(data) => data,
            // Without a recorded length the first absent chunk marks the end.
            Err(StoreError::ChunkNotFound { .. }) if count.is_none() => return Ok(None),
            Err(StoreError::ChunkNotFound { .. }) => {
                return Err(StoreError::ChunkMissing { file_id, n }.into());
            }
            Err(err) => return Err(err.into()),
        };

        let expected = match self.file.expected_chunk_len(n) {
            Some(expected) if data.len() != expected => Some(expected),
            Some(_) => None,
            None if data.len() > self.file.chunk_size as usize => {
                Some(self.file.chunk_size as usize)
            }
            None => None,
        };
        if let Some(expected) = expected {
            return Err(StoreError::ChunkWrongSize {
                file_id,
                n,
                expected,
                actual: data.len(),
            }
            .into());
        }

        self.next = n.checked_add(1).ok_or_else(|| StoreError::CorruptRecord {
            file_id: file_id.to_hex(),
            reason: "file has more chunks than can be numbered".into(),
        })?;
        Ok(Some(data))
    }
}

/// Counts a handle as open until dropped.
struct StreamLease {
    open_streams: Arc<AtomicUsize>,
}

impl StreamLease {
    fn acquire(open_streams: Arc<AtomicUsize>) -> Self {
        open_streams.fetch_add(1, Ordering::SeqCst);
        Self { open_streams }
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
