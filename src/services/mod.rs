//! Storage services: the chunk store backends and the components layered on
//! top of them.

pub mod catalog;
pub mod chunk_store;
pub mod memory_store;
pub mod sqlite_store;
pub mod stream_reader;
pub mod uploader;
