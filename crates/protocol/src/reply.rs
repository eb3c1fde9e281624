use std::io::BufRead;

use serde::{Deserialize, Serialize};

use upload_core::UploadId;

/// A reply frame sent back to the client.
///
/// Every reply is, on the wire, a single JSON object with a `status` field
/// of `"ok"` or `"error"`; the concrete shape otherwise varies by the action
/// that produced it. `serde`'s tagged-enum derive can't express "several
/// variants share the tag value `ok`, distinguished only by which other
/// fields are present", so this type serializes and deserializes through
/// [`WireReply`], a flat struct with every field optional, the way the
/// protocol crate's own hand-written envelope codecs handle shapes `serde`
/// can't derive directly.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Acknowledges a `start` frame with the server's authoritative offset.
    StartOk {
        /// Echoes the upload id that was started or resumed.
        upload_id: UploadId,
        /// The server's authoritative byte offset for this upload.
        offset: u64,
        /// Echoes the negotiated chunk size.
        chunk_size: u32,
    },
    /// Acknowledges a `chunk` frame with the new offset.
    ChunkOk {
        /// The offset after the chunk was durably written.
        offset: u64,
    },
    /// Acknowledges `pause`/`resume`/`stop` with the resulting state.
    StateOk {
        /// Echoes the upload id the state change applied to.
        upload_id: UploadId,
        /// The resulting advisory status, as its wire spelling.
        state: String,
    },
    /// Answers a `query_resume` frame.
    ResumeOk {
        /// The server's authoritative offset (`0` if the upload is unknown).
        offset: u64,
    },
    /// Reports a protocol, session, or I/O failure.
    Error {
        /// Machine-readable reason code.
        reason: ErrorReason,
    },
}

/// The fixed set of error reasons the server can report.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// The control frame's line was not valid JSON or not a known shape.
    InvalidHeader,
    /// A required `upload_id` field was absent.
    MissingUploadId,
    /// `start` was missing a required field or carried an invalid value
    /// (e.g. `filesize == 0`).
    InvalidStartParams,
    /// `chunk` declared an invalid `length` (zero, or absurdly large).
    InvalidLength,
    /// `chunk` referenced an upload id with no session.
    UnknownUpload,
    /// The chunk writer failed to durably write the payload.
    WriteFailed,
    /// The frame's `action` was not one of the known actions.
    UnknownAction,
    /// An unexpected internal failure occurred; the connection is closed
    /// immediately after this reply.
    InternalServerError,
}

/// The flat, all-fields-optional wire representation of [`Reply`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct WireReply {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    upload_id: Option<UploadId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    chunk_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    reason: Option<ErrorReason>,
}

impl From<&Reply> for WireReply {
    fn from(reply: &Reply) -> Self {
        match reply {
            Reply::StartOk {
                upload_id,
                offset,
                chunk_size,
            } => Self {
                status: "ok".into(),
                upload_id: Some(upload_id.clone()),
                offset: Some(*offset),
                chunk_size: Some(*chunk_size),
                ..Self::default()
            },
            Reply::ChunkOk { offset } => Self {
                status: "ok".into(),
                offset: Some(*offset),
                ..Self::default()
            },
            Reply::StateOk { upload_id, state } => Self {
                status: "ok".into(),
                upload_id: Some(upload_id.clone()),
                state: Some(state.clone()),
                ..Self::default()
            },
            Reply::ResumeOk { offset } => Self {
                status: "ok".into(),
                offset: Some(*offset),
                ..Self::default()
            },
            Reply::Error { reason } => Self {
                status: "error".into(),
                reason: Some(*reason),
                ..Self::default()
            },
        }
    }
}

impl TryFrom<WireReply> for Reply {
    type Error = ReplyDecodeError;

    fn try_from(wire: WireReply) -> Result<Self, Self::Error> {
        match wire.status.as_str() {
            "error" => Ok(Self::Error {
                reason: wire.reason.ok_or(ReplyDecodeError::MissingField("reason"))?,
            }),
            "ok" => {
                if let (Some(upload_id), Some(chunk_size)) =
                    (wire.upload_id.clone(), wire.chunk_size)
                {
                    Ok(Self::StartOk {
                        upload_id,
                        offset: wire.offset.ok_or(ReplyDecodeError::MissingField("offset"))?,
                        chunk_size,
                    })
                } else if let (Some(upload_id), Some(state)) = (wire.upload_id, wire.state) {
                    Ok(Self::StateOk { upload_id, state })
                } else if let Some(offset) = wire.offset {
                    Ok(Self::ChunkOk { offset })
                } else {
                    Err(ReplyDecodeError::Ambiguous)
                }
            }
            other => Err(ReplyDecodeError::UnknownStatus(other.to_owned())),
        }
    }
}

impl Serialize for Reply {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        WireReply::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reply {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WireReply::deserialize(deserializer)?;
        Reply::try_from(wire).map_err(serde::de::Error::custom)
    }
}

/// Reads one newline-terminated JSON reply from `reader`, the client-side
/// counterpart of [`crate::read_frame`].
///
/// Returns `Ok(None)` on a clean EOF before any bytes of a new reply were
/// read (the server closed the connection between replies).
pub fn read_reply(reader: &mut impl BufRead) -> Result<Option<Reply>, ReplyReadError> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).map_err(ReplyReadError::Io)?;
    if bytes_read == 0 {
        return Ok(None);
    }

    let trimmed = line.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| ReplyReadError::Malformed { source })
}

/// Errors returned by [`read_reply`].
#[derive(Debug, thiserror::Error)]
pub enum ReplyReadError {
    /// The underlying stream read failed.
    #[error("reply read I/O error: {0}")]
    Io(std::io::Error),
    /// The line was present but was not a recognizable reply.
    #[error("malformed reply: {source}")]
    Malformed {
        /// The underlying JSON parse error.
        source: serde_json::Error,
    },
}

/// Errors decoding a [`WireReply`] back into a [`Reply`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ReplyDecodeError {
    /// `status` carried a value other than `"ok"` or `"error"`.
    #[error("unknown reply status {0:?}")]
    UnknownStatus(String),
    /// A field required by the inferred variant was absent.
    #[error("reply is missing required field {0:?}")]
    MissingField(&'static str),
    /// `status == "ok"` but the present fields don't match any known shape.
    ///
    /// This can only happen for a [`Reply::ChunkOk`] decoded without its
    /// `offset` field, since `ChunkOk` is the fallback shape once
    /// `StartOk`/`StateOk` are ruled out.
    #[error("ok reply did not match any known shape")]
    Ambiguous,
}
