use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use upload_core::{UploadId, UploadMetadata};

/// One control frame read from, or written to, the wire.
///
/// Every variant carries `upload_id` so the handler never has to special-case
/// its absence; fields outside the action's own schema are ignored by
/// `serde` rather than rejected, matching the specification's tolerance for
/// unknown fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Creates a session if absent, or resumes an existing one.
    Start {
        /// The upload this frame concerns.
        upload_id: UploadId,
        /// Server-side base name to write the file under.
        filename: String,
        /// Total declared byte length of the upload. Must be non-zero.
        filesize: u64,
        /// Client-suggested chunk size; the server ignores this except to
        /// echo it back in the reply.
        chunk_size: u32,
        /// Metadata forwarded to the completion notifier.
        #[serde(default)]
        metadata: Option<UploadMetadata>,
    },
    /// Declares `length` raw bytes immediately follow this frame on the
    /// stream, to be written at `offset`.
    Chunk {
        /// The upload this frame concerns.
        upload_id: UploadId,
        /// Byte offset at which to write the following payload.
        offset: u64,
        /// Number of raw payload bytes immediately following this frame.
        length: u32,
    },
    /// Marks the session paused. Does not close the connection.
    Pause {
        /// The upload this frame concerns.
        upload_id: UploadId,
    },
    /// Marks the session resumed. Does not close the connection.
    Resume {
        /// The upload this frame concerns.
        upload_id: UploadId,
    },
    /// Marks the session stopped. Does not close the connection.
    Stop {
        /// The upload this frame concerns.
        upload_id: UploadId,
    },
    /// Asks for the server's authoritative offset for this upload id.
    QueryResume {
        /// The upload this frame concerns.
        upload_id: UploadId,
    },
}

impl ControlFrame {
    /// Returns the `upload_id` carried by any variant.
    #[must_use]
    pub fn upload_id(&self) -> &UploadId {
        match self {
            Self::Start { upload_id, .. }
            | Self::Chunk { upload_id, .. }
            | Self::Pause { upload_id }
            | Self::Resume { upload_id }
            | Self::Stop { upload_id }
            | Self::QueryResume { upload_id } => upload_id,
        }
    }
}

/// The `action` values [`read_frame`] recognizes, used to distinguish an
/// unrecognized action from a genuinely malformed frame.
pub const KNOWN_ACTIONS: &[&str] = &["start", "chunk", "pause", "resume", "stop", "query_resume"];

/// Reads one newline-terminated JSON control frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF before any bytes of a new frame were
/// read (the peer closed the connection between frames).
///
/// A line that fails to deserialize into [`ControlFrame`] is classified
/// before being reported, so the connection handler can reply with the
/// specific wire-level error reason the specification distinguishes:
/// - a recognized `action` with no `upload_id` yields
///   [`FrameReadError::MissingUploadId`],
/// - an `action` outside [`KNOWN_ACTIONS`] yields [`FrameReadError::UnknownAction`],
/// - anything else (non-JSON, wrong field types, absent `action`) yields
///   [`FrameReadError::Malformed`].
///
/// In every case the caller should keep the connection open; only the reply
/// reason differs.
pub fn read_frame(reader: &mut impl BufRead) -> Result<Option<ControlFrame>, FrameReadError> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).map_err(FrameReadError::Io)?;
    if bytes_read == 0 {
        return Ok(None);
    }

    let trimmed = line.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str(trimmed) {
        Ok(frame) => Ok(Some(frame)),
        Err(source) => Err(classify_parse_failure(trimmed, source)),
    }
}

fn classify_parse_failure(line: &str, source: serde_json::Error) -> FrameReadError {
    let Ok(probe) = serde_json::from_str::<serde_json::Value>(line) else {
        return FrameReadError::Malformed { source };
    };
    let Some(action) = probe.get("action").and_then(|v| v.as_str()) else {
        return FrameReadError::Malformed { source };
    };
    if !KNOWN_ACTIONS.contains(&action) {
        return FrameReadError::UnknownAction {
            action: action.to_owned(),
        };
    }
    if probe.get("upload_id").and_then(|v| v.as_str()).is_none() {
        return FrameReadError::MissingUploadId;
    }
    FrameReadError::Malformed { source }
}

/// Writes `value` as a single newline-terminated JSON object to `writer`.
pub fn write_frame<T: Serialize>(writer: &mut impl Write, value: &T) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes)?;
    writer.flush()
}

/// Errors returned by [`read_frame`].
#[derive(Debug, thiserror::Error)]
pub enum FrameReadError {
    /// The underlying stream read failed.
    #[error("frame read I/O error: {0}")]
    Io(std::io::Error),
    /// The line was not valid JSON, or was a JSON object with no recognizable
    /// `action` field.
    #[error("malformed control frame: {source}")]
    Malformed {
        /// The underlying JSON parse error.
        source: serde_json::Error,
    },
    /// The frame's `action` was not one of [`KNOWN_ACTIONS`].
    #[error("unknown control frame action {action:?}")]
    UnknownAction {
        /// The unrecognized action value.
        action: String,
    },
    /// The frame's `action` was recognized but it carried no `upload_id`.
    #[error("control frame is missing upload_id")]
    MissingUploadId,
}
