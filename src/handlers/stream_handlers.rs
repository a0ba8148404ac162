//! `GET /stream/{id}`: streams a stored video to the client.
//!
//! A request moves through validation (no storage access), resolution
//! (metadata lookup, headers decided) and streaming (one body write per
//! chunk). Failures before the first body byte become ordinary error
//! responses; after that the status is already on the wire, so a storage
//! failure is logged and the connection aborted instead.

use crate::{
    errors::AppError,
    handlers::file_id::FileId,
    models::{file::FileMetadata, object_id::ObjectId},
    services::stream_reader::{StreamError, StreamHandle},
    state::AppState,
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio_util::sync::DropGuard;
use tracing::{debug, error, info};

/// Every delivery is served as MP4 video.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Stream the file named by the `id` path segment.
pub async fn stream_video(
    State(state): State<AppState>,
    FileId(id): FileId,
) -> Result<Response, AppError> {
    let file = state.catalog.lookup(id).await.inspect_err(|err| {
        if err.is_not_found() {
            info!(%id, "video not found in storage");
        }
    })?;

    let cancel = state.shutdown.child_token();
    let handle = state.reader.open_file(file.clone(), cancel.clone())?;
    info!(%id, filename = %file.filename, length = ?file.length, "streaming video");

    let body = DeliveryBody::new(id, handle, cancel.drop_guard());
    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    set_video_headers(response.headers_mut(), &file);

    Ok(response)
}

pub(crate) fn set_video_headers(headers: &mut HeaderMap, file: &FileMetadata) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(VIDEO_CONTENT_TYPE),
    );

    if let Some(length) = file.length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    if let Some(md5) = file.md5.as_ref() {
        let quoted = format!("\"{}\"", md5);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Streaming,
    Completed,
    Failed,
}

/// Response body sink wrapping a [`StreamHandle`].
///
/// The transport drops the body when the client goes away; dropping it fires
/// the request's cancellation token so the reader stops pulling chunks.
struct DeliveryBody {
    id: ObjectId,
    inner: StreamHandle,
    state: Delivery,
    chunks: u32,
    bytes: u64,
    _cancel: DropGuard,
}

impl DeliveryBody {
    fn new(id: ObjectId, inner: StreamHandle, cancel: DropGuard) -> Self {
        Self {
            id,
            inner,
            state: Delivery::Streaming,
            chunks: 0,
            bytes: 0,
            _cancel: cancel,
        }
    }
}

impl Stream for DeliveryBody {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != Delivery::Streaming {
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(data)) => {
                this.chunks += 1;
                this.bytes += data.len() as u64;
                Poll::Ready(Some(Ok(data)))
            }
            Some(Err(err)) => {
                this.state = Delivery::Failed;
                match &err {
                    StreamError::Cancelled => {
                        debug!(id = %this.id, sent = this.bytes, "delivery cancelled");
                    }
                    StreamError::Storage(cause) => {
                        error!(
                            id = %this.id,
                            chunks = this.chunks,
                            sent = this.bytes,
                            error = %cause,
                            "storage failure mid-stream; aborting response"
                        );
                    }
                }
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.state = Delivery::Completed;
                info!(id = %this.id, chunks = this.chunks, bytes = this.bytes, "delivery complete");
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for DeliveryBody {
    fn drop(&mut self) {
        if self.state == Delivery::Streaming {
            debug!(id = %self.id, sent = self.bytes, "client disconnected; cancelling stream");
        }
    }
}
