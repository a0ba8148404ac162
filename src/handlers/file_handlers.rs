//! HTTP handlers for file administration: upload, metadata lookup, delete.
//! Upload bodies are streamed straight into the chunk uploader.

use crate::{
    errors::AppError,
    models::file::{DEFAULT_CONTENT_TYPE, FileMetadata},
    handlers::file_id::FileId,
    services::uploader::NewUpload,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;

/// Query params accepted by `POST /files`.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

/// POST `/files?filename=...`: store the request body as a new file.
pub async fn upload_file(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let filename = query
        .filename
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing filename parameter"))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let file = state
        .uploader
        .upload_stream(
            NewUpload {
                filename,
                content_type,
            },
            stream,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(file)))
}

/// GET `/files/{id}`: metadata only.
pub async fn get_file(
    State(state): State<AppState>,
    FileId(id): FileId,
) -> Result<Json<FileMetadata>, AppError> {
    let file = state.catalog.lookup(id).await?;
    Ok(Json(file))
}

/// DELETE `/files/{id}`: remove the record and all of its chunks.
pub async fn delete_file(
    State(state): State<AppState>,
    FileId(id): FileId,
) -> Result<StatusCode, AppError> {
    state.catalog.remove(id).await?;
    tracing::info!(%id, "deleted file");
    Ok(StatusCode::NO_CONTENT)
}
