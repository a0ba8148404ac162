//! Shared state handed to every handler.

use crate::services::{
    catalog::ObjectCatalog, chunk_store::ChunkStore, stream_reader::StreamReader,
    uploader::ChunkUploader,
};
use std::{num::NonZeroU32, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Everything a request needs, built once at startup around one store.
///
/// Cloning is cheap; all clones share the same store, open-stream counter
/// and shutdown token.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChunkStore>,
    pub catalog: ObjectCatalog,
    pub reader: StreamReader,
    pub uploader: ChunkUploader,
    /// Cancelled when the server shuts down; every delivery listens on a
    /// child of this token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(store: Arc<dyn ChunkStore>, chunk_size: NonZeroU32) -> Self {
        Self {
            catalog: ObjectCatalog::new(store.clone()),
            reader: StreamReader::new(store.clone()),
            uploader: ChunkUploader::new(store.clone(), chunk_size),
            shutdown: CancellationToken::new(),
            store,
        }
    }
}
