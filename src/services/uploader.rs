//! ChunkUploader: the write side of the store.
//!
//! An incoming byte stream is cut into `chunk_size` pieces which are written
//! in sequence; the metadata record goes in last, once the length and MD5 are
//! known. If anything fails midway the chunks already written are removed,
//! unless the failure is an id collision: those chunks may belong to another
//! file and are left alone.

use crate::{
    models::{file::FileMetadata, object_id::ObjectId},
    services::chunk_store::{ChunkStore, StoreError, StoreResult},
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{io, num::NonZeroU32, sync::Arc};
use tracing::{debug, info, warn};

/// Describes a file about to be uploaded.
#[derive(Clone, Debug)]
pub struct NewUpload {
    pub filename: String,
    pub content_type: String,
}

#[derive(Clone)]
pub struct ChunkUploader {
    store: Arc<dyn ChunkStore>,
    chunk_size: u32,
}

impl ChunkUploader {
    pub fn new(store: Arc<dyn ChunkStore>, chunk_size: NonZeroU32) -> Self {
        Self {
            store,
            chunk_size: chunk_size.get(),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Stream-upload a file and return its metadata record.
    ///
    /// Memory use stays at one chunk regardless of how the input is framed.
    pub async fn upload_stream<S>(&self, upload: NewUpload, stream: S) -> StoreResult<FileMetadata>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.upload_with_id(ObjectId::new(), upload, stream).await
    }

    async fn upload_with_id<S>(
        &self,
        id: ObjectId,
        upload: NewUpload,
        stream: S,
    ) -> StoreResult<FileMetadata>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        match self.store.read_metadata(id).await {
            Ok(_) => return Err(StoreError::FileAlreadyExists(id)),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        debug!(%id, filename = %upload.filename, "starting upload");

        let (length, digest) = match self.write_chunks(id, stream).await {
            Ok(written) => written,
            Err(err) => {
                self.discard(id, &err).await;
                return Err(err);
            }
        };

        let record = FileMetadata {
            id,
            filename: upload.filename,
            length: Some(length),
            chunk_size: self.chunk_size,
            content_type: upload.content_type,
            upload_date: Utc::now(),
            md5: Some(digest),
        };
        if let Err(err) = self.store.write_metadata(&record).await {
            self.discard(id, &err).await;
            return Err(err);
        }

        info!(%id, filename = %record.filename, length, "upload complete");
        Ok(record)
    }

    async fn write_chunks<S>(&self, id: ObjectId, stream: S) -> StoreResult<(u64, String)>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let chunk_size = self.chunk_size as usize;
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut digest = Context::new();
        let mut length: u64 = 0;
        let mut n: u32 = 0;

        pin_mut!(stream);
        while let Some(piece) = stream.next().await {
            let piece = piece?;
            length += piece.len() as u64;
            digest.consume(&piece);

            let mut rest = piece.as_ref();
            while !rest.is_empty() {
                let take = (chunk_size - buffer.len()).min(rest.len());
                buffer.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
                if buffer.len() == chunk_size {
                    self.store
                        .write_chunk(id, n, buffer.split().freeze())
                        .await?;
                    buffer.reserve(chunk_size);
                    n = next_sequence(id, n)?;
                }
            }
        }
        if !buffer.is_empty() {
            self.store.write_chunk(id, n, buffer.freeze()).await?;
        }

        Ok((length, format!("{:x}", digest.compute())))
    }

    /// Best-effort removal of a partially written file.
    async fn discard(&self, id: ObjectId, cause: &StoreError) {
        if let StoreError::FileAlreadyExists(_) = cause {
            warn!(%id, "upload collided with an existing file; leaving its data in place");
            return;
        }
        match self.store.delete_file(id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(%id, error = %err, "failed to clean up aborted upload"),
        }
    }
}

fn next_sequence(id: ObjectId, n: u32) -> StoreResult<u32> {
    n.checked_add(1).ok_or_else(|| StoreError::CorruptRecord {
        file_id: id.to_hex(),
        reason: "file has more chunks than can be numbered".into(),
    })
}
