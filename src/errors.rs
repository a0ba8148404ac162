use crate::{models::object_id::InvalidObjectId, services::chunk_store::StoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// Body message for identifiers that fail structural validation.
pub const INVALID_ID_MESSAGE: &str = "Invalid GridFS ID format";

/// Body message for well-formed identifiers that name no stored file.
pub const NOT_FOUND_MESSAGE: &str = "Video not found in storage";

/// An error that has already been classified into an HTTP status.
///
/// Client errors render as `{"message": ...}`, server errors as
/// `{"error": ...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = if self.status.is_server_error() {
            Json(json!({ "error": self.message }))
        } else {
            Json(json!({ "message": self.message }))
        };

        (self.status, body).into_response()
    }
}

impl From<InvalidObjectId> for AppError {
    fn from(_: InvalidObjectId) -> Self {
        AppError::bad_request(INVALID_ID_MESSAGE)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            AppError::not_found(NOT_FOUND_MESSAGE)
        } else {
            error!(error = %err, "storage failure");
            AppError::internal(err.to_string())
        }
    }
}
