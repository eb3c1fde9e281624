use serde::{Deserialize, Serialize};

/// Metadata carried from the client's `start` frame through to the
/// completion notifier's outbound POST body.
///
/// `token` and `filename` are required at the type level; the connection
/// handler validates their presence once, at `start` time, rather than
/// deferring the failure to the notifier (see design note 3 of the
/// specification this crate implements).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    /// Bearer credential forwarded as `Authorization: Bearer <token>`.
    pub token: String,
    /// Server-side display filename recorded by the metadata service.
    pub filename: String,
    /// Free-text description of the uploaded document, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Visibility of the resulting document. Defaults to [`Visibility::Private`].
    #[serde(default)]
    pub visibility: Visibility,
    /// Tags attached to the resulting document.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl UploadMetadata {
    /// Validates that the required fields are non-empty.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.token.is_empty() {
            return Err(MetadataError::MissingToken);
        }
        if self.filename.is_empty() {
            return Err(MetadataError::MissingFilename);
        }
        Ok(())
    }
}

/// Document visibility recorded by the metadata service.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the owner can see the document.
    #[default]
    Private,
    /// Anyone can see the document.
    Public,
}

/// Errors returned when validating [`UploadMetadata`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MetadataError {
    /// The `token` field was empty.
    #[error("metadata is missing a bearer token")]
    MissingToken,
    /// The `filename` field was empty.
    #[error("metadata is missing a filename")]
    MissingFilename,
}
