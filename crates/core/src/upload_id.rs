use std::fmt;

use serde::{Deserialize, Serialize};

/// A client-chosen identifier for one upload session.
///
/// The protocol never generates these server-side: the client picks a value
/// unique enough to survive reconnects (the original implementation simply
/// used a UUID string). The server treats it as an opaque key into the
/// session registry.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Wraps a raw string as an [`UploadId`] without validation.
    ///
    /// Empty identifiers are accepted here; callers that parse one off the
    /// wire should use [`UploadId::parse`] instead.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parses a raw string as an [`UploadId`], rejecting the empty string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, EmptyUploadId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(EmptyUploadId);
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UploadId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for UploadId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// Returned by [`UploadId::parse`] when the supplied string is empty.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("upload_id must not be empty")]
pub struct EmptyUploadId;
