pub mod file_handlers;
pub mod file_id;
pub mod health_handlers;
pub mod stream_handlers;
