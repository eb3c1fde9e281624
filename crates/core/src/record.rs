use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::metadata::UploadMetadata;
use crate::status::SessionStatus;

/// The server-side state for one resumable file transfer.
///
/// See the invariants on [`SessionRecord::advance_offset`]: `offset` only
/// ever moves forward, and never past `filesize`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Server-side base name the file is written under.
    pub filename: String,
    /// Total declared byte length of the upload.
    pub filesize: u64,
    /// Bytes durably received so far.
    pub offset: u64,
    /// Current advisory lifecycle state.
    pub status: SessionStatus,
    /// `host:port` of the most recently connected client, informational only.
    pub peer: String,
    /// Opaque metadata carried through to the completion notifier.
    pub metadata: UploadMetadata,
    /// Unix timestamp, in seconds, of the first `start` for this upload id.
    pub created_at: u64,
}

impl SessionRecord {
    /// Creates a fresh record at offset zero with `status = Started`.
    #[must_use]
    pub fn new(filename: String, filesize: u64, peer: String, metadata: UploadMetadata) -> Self {
        Self {
            filename,
            filesize,
            offset: 0,
            status: SessionStatus::Started,
            peer,
            metadata,
            created_at: unix_now(),
        }
    }

    /// Reports whether `offset` has reached `filesize`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.offset >= self.filesize
    }

    /// Advances `offset` to `new_offset`, enforcing monotonicity and the
    /// `offset <= filesize` bound.
    ///
    /// Returns [`OffsetError::NotMonotonic`] if `new_offset < self.offset`,
    /// the one invariant violation a correct handler must never attempt (a
    /// short read or a stale client retry should never reach this call with
    /// a lower offset — the handler derives `new_offset` by adding the
    /// chunk's declared length to the offset it just read).
    ///
    /// `new_offset` is **not** capped at `filesize` here: the connection
    /// handler is responsible for comparing the result against `filesize`
    /// to decide whether the session has completed. Permitting the caller to
    /// observe an offset beyond `filesize` is deliberate in case a buggy
    /// client overshoots; the session manager still only treats the session
    /// as complete on `offset >= filesize`.
    pub fn advance_offset(&mut self, new_offset: u64) -> Result<(), OffsetError> {
        if new_offset < self.offset {
            return Err(OffsetError::NotMonotonic {
                current: self.offset,
                attempted: new_offset,
            });
        }
        self.offset = new_offset;
        Ok(())
    }
}

/// Errors returned by [`SessionRecord::advance_offset`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum OffsetError {
    /// The caller attempted to move `offset` backwards.
    #[error("offset must be monotonically non-decreasing (current {current}, attempted {attempted})")]
    NotMonotonic {
        /// The record's offset before the attempted change.
        current: u64,
        /// The offset the caller attempted to set.
        attempted: u64,
    },
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
