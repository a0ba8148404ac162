//! Metadata record describing one stored file and its chunk layout.

use super::object_id::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type recorded when an upload does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Chunk size used when none is configured (255 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

/// Represents a single stored file.
///
/// The record is written once, after every chunk of the file has been
/// persisted, and never edited afterwards. The payload itself lives in the
/// chunk table, addressed by `(id, sequence number)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(with = "super::object_id::hex_string")]
    pub id: ObjectId,

    /// Original filename; not required to be unique.
    pub filename: String,

    /// Total size in bytes, if known when the record was written.
    pub length: Option<u64>,

    /// Size of every chunk except possibly the last.
    pub chunk_size: u32,

    pub content_type: String,

    /// When the upload completed.
    pub upload_date: DateTime<Utc>,

    /// Hex MD5 of the full content.
    pub md5: Option<String>,
}

impl FileMetadata {
    /// Number of chunks the file occupies, `ceil(length / chunk_size)`.
    ///
    /// `None` when the length is unknown, or when the record cannot describe a
    /// valid layout (zero chunk size, or more chunks than a `u32` can number).
    pub fn chunk_count(&self) -> Option<u32> {
        let length = self.length?;
        if self.chunk_size == 0 {
            return None;
        }
        u32::try_from(length.div_ceil(u64::from(self.chunk_size))).ok()
    }

    /// Exact byte length chunk `n` must have, for files of known length.
    pub fn expected_chunk_len(&self, n: u32) -> Option<usize> {
        let length = self.length?;
        let count = self.chunk_count()?;
        if n >= count {
            return None;
        }
        let chunk_size = u64::from(self.chunk_size);
        let expected = if n + 1 == count {
            length - u64::from(n) * chunk_size
        } else {
            chunk_size
        };
        usize::try_from(expected).ok()
    }

    /// Whether the record describes a layout a reader can follow.
    pub fn has_valid_layout(&self) -> bool {
        self.chunk_size > 0 && (self.length.is_none() || self.chunk_count().is_some())
    }
}
