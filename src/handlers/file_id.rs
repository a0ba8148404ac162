//! `{id}` path extractor shared by the file routes.
//!
//! Every way a path segment can fail to name a file (not UTF-8, not hex,
//! wrong length) is answered with the same JSON 400, before any storage
//! access.

use crate::{
    errors::{AppError, INVALID_ID_MESSAGE},
    models::object_id::ObjectId,
    services::catalog::ObjectCatalog,
};
use axum::{
    extract::{FromRequestParts, Path, rejection::PathRejection},
    http::request::Parts,
};
use tracing::{error, warn};

/// A structurally valid identifier taken from the `{id}` path segment.
#[derive(Clone, Copy, Debug)]
pub struct FileId(pub ObjectId);

impl<S> FromRequestParts<S> for FileId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = match Path::<String>::from_request_parts(parts, state).await {
            Ok(Path(raw_id)) => raw_id,
            Err(PathRejection::MissingPathParams(err)) => {
                error!(error = %err, "route has no id segment");
                return Err(AppError::internal(err.body_text()));
            }
            Err(rejection) => {
                warn!(error = %rejection.body_text(), "rejected undecodable id");
                return Err(AppError::bad_request(INVALID_ID_MESSAGE));
            }
        };

        let id = ObjectCatalog::resolve(&raw_id).inspect_err(|err| {
            warn!(raw_id = %raw_id, error = %err, "rejected malformed id");
        })?;
        Ok(FileId(id))
    }
}
