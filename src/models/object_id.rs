//! Object identifiers: BSON ObjectIds, rendered as 24 lowercase hex characters.
//!
//! New ids come from [`ObjectId::new`] (timestamp, per-process random value,
//! counter). Parsed ids are accepted as long as they are structurally valid.

pub use bson::oid::ObjectId;
use thiserror::Error;

/// Raised when a raw string is not a well-formed [`ObjectId`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InvalidObjectId(#[from] bson::oid::Error);

/// Serde adapter storing an [`ObjectId`] as its plain hex string.
///
/// BSON's own `Serialize` emits `{"$oid": ...}` for non-BSON formats.
pub mod hex_string {
    use super::ObjectId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error> {
        bson::serde_helpers::serialize_object_id_as_hex_string(id, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ObjectId, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ObjectId::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}
