//! Identifier of one stored upload.
//!
//! An id is also the on-disk file name: `<random>_<millis>.<extension>`.
//! The creation time is carried inside the name, so an id can always be
//! decoded back from a directory entry or a request path.

use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Separator between the random component and the timestamp.
pub const ID_SEPARATOR: char = '_';

/// Reasons a file name is not a valid [`ObjectId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing `_` separator")]
    MissingSeparator,
    #[error("random component must be non-empty lowercase alphanumerics")]
    InvalidRandom,
    #[error("timestamp component `{0}` is not a millisecond timestamp")]
    InvalidTimestamp(String),
    #[error("missing `.` before the extension")]
    MissingExtension,
    #[error("extension `{0}` must be ascii alphanumerics")]
    InvalidExtension(String),
}

/// A stored object's identifier.
///
/// Immutable once created. Ordering and hashing use the full name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Full file name, e.g. `k3j9x0a1b2c3_1718000000000.png`.
    name: String,

    /// Creation time in Unix milliseconds, decoded from `name`.
    created_at_millis: i64,

    /// Byte offset of the extension inside `name`.
    ext_start: usize,
}

impl ObjectId {
    /// Assemble an id from already-validated parts.
    pub(crate) fn from_parts(random: &str, created_at_millis: i64, extension: &str) -> Self {
        let name = format!("{random}{ID_SEPARATOR}{created_at_millis}.{extension}");
        let ext_start = name.len() - extension.len();
        Self {
            name,
            created_at_millis,
            ext_start,
        }
    }

    /// Decode a file name or request path segment.
    ///
    /// Never panics; anything that does not look exactly like a generated
    /// id (including path separators or `..`) is a [`DecodeError`].
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let (random, rest) = raw
            .split_once(ID_SEPARATOR)
            .ok_or(DecodeError::MissingSeparator)?;

        if random.is_empty()
            || !random
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(DecodeError::InvalidRandom);
        }

        let (millis, extension) = rest.split_once('.').ok_or(DecodeError::MissingExtension)?;

        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeError::InvalidTimestamp(millis.to_string()));
        }
        let created_at_millis = millis
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidTimestamp(millis.to_string()))?;

        if !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DecodeError::InvalidExtension(extension.to_string()));
        }

        Ok(Self::from_parts(random, created_at_millis, extension))
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn created_at_millis(&self) -> i64 {
        self.created_at_millis
    }

    /// Creation time as a UTC timestamp. Out-of-range values clamp to the epoch.
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.created_at_millis()).unwrap_or_default()
    }

    /// Extension without the leading dot; may be empty.
    pub fn extension(&self) -> &str {
        &self.name[self.ext_start..]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for ObjectId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.name
    }
}
