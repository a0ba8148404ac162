//! Defines the HTTP surface of the video store.
//!
//! ## Structure
//! - **Delivery**
//!   - `GET    /stream/{id}`: stream a stored video
//!
//! - **File administration**
//!   - `POST   /files?filename=`: upload a file (raw request body)
//!   - `GET    /files/{id}`: metadata only
//!   - `DELETE /files/{id}`: delete a file and its chunks
//!
//! - **Health**
//!   - `GET    /healthz`, `GET /readyz`

use crate::{
    handlers::{
        file_handlers::{delete_file, get_file, upload_file},
        health_handlers::{healthz, readyz},
        stream_handlers::stream_video,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build and return the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers. Uploads are
/// streamed into the store chunk by chunk, so the default body size limit is
/// lifted for them.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/stream/{id}", get(stream_video))
        .route(
            "/files",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/files/{id}", get(get_file).delete(delete_file))
        .layer(TraceLayer::new_for_http())
}
