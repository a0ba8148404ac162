//! Core data models for the chunked video store.
//!
//! Files are addressed by [`object_id::ObjectId`] and described by a
//! [`file::FileMetadata`] record; their bytes live in numbered chunks owned by
//! the chunk store.

pub mod file;
pub mod object_id;
