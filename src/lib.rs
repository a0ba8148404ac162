//! Chunked video storage with streaming HTTP delivery.
//!
//! Files are cut into fixed-size chunks, stored with a metadata record and
//! served back chunk by chunk, so no request ever holds a whole video in
//! memory.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use state::AppState;

/// Build the application router around `state`.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
