//! Object catalog: turns raw identifiers into metadata records.
//!
//! Resolution is split in two so callers can tell a malformed identifier
//! (client error) from a well-formed one that names nothing (missing
//! resource). [`ObjectCatalog::resolve`] never touches storage.

use crate::{
    models::{
        file::FileMetadata,
        object_id::{InvalidObjectId, ObjectId},
    },
    services::chunk_store::{ChunkStore, StoreResult},
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ObjectCatalog {
    store: Arc<dyn ChunkStore>,
}

impl ObjectCatalog {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Structural check of a raw identifier. Says nothing about existence.
    pub fn resolve(raw_id: &str) -> Result<ObjectId, InvalidObjectId> {
        Ok(ObjectId::parse_str(raw_id)?)
    }

    /// Fetch the metadata record for `id`, or `FileNotFound`.
    pub async fn lookup(&self, id: ObjectId) -> StoreResult<FileMetadata> {
        let file = self.store.read_metadata(id).await?;
        debug!(%id, filename = %file.filename, length = ?file.length, "resolved file");
        Ok(file)
    }

    /// Delete the record and every chunk of `id`.
    pub async fn remove(&self, id: ObjectId) -> StoreResult<()> {
        self.store.delete_file(id).await
    }
}
