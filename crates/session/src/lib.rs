#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! The session manager is the only component that mutates upload state. It
//! wraps an [`upload_persistence::Store`] keyed by [`UploadId`] and enforces
//! the state table in full: `start` creates or resumes a session, `chunk`
//! advances its offset and, on reaching completion, invokes the notifier and
//! deletes the record, `pause`/`resume`/`stop` update the advisory status,
//! and `query_resume` answers with the authoritative offset. Connection
//! handlers never touch the persistence store directly.
//!
//! # Design
//!
//! Every mutation goes through [`upload_persistence::Store::transact`], so a
//! state transition is one atomic read-modify-write under the store's single
//! mutex — two connections racing `chunk` frames for the same upload id can
//! never observe or persist an interleaved record. Completion notification
//! happens from inside that same transaction, immediately before the record
//! is removed, which is what makes the "exactly-once" guarantee hold: only
//! one thread can ever be inside the transaction that flips a session from
//! incomplete to absent.

use std::path::{Path, PathBuf};

use upload_core::metadata::MetadataError;
use upload_core::record::OffsetError;
use upload_core::{SessionRecord, SessionStatus, UploadId, UploadMetadata};
use upload_notifier::Notifier;
use upload_persistence::{PersistenceError, Store};

/// The authoritative, durable registry of upload sessions.
pub struct SessionManager<N> {
    store: Store<UploadId, SessionRecord>,
    storage_dir: PathBuf,
    notifier: N,
}

/// The result of a successful `start`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StartOutcome {
    /// The server's authoritative offset for this upload, to be echoed back
    /// to the client verbatim.
    pub offset: u64,
}

/// The result of a successful `chunk`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkOutcome {
    /// The offset after the chunk was recorded.
    pub offset: u64,
    /// Whether this chunk completed the upload (`offset >= filesize`). The
    /// session record has already been deleted and the notifier already
    /// invoked by the time this is `true`.
    pub completed: bool,
}

impl<N: Notifier> SessionManager<N> {
    /// Opens the session registry at `state_path`, loading any sessions left
    /// over from a previous run. `storage_dir` is the root directory under
    /// which each upload's file lives at `<storage_dir>/<upload_id>/<filename>`,
    /// used only to build the path passed to the notifier on completion.
    pub fn open(
        state_path: impl Into<PathBuf>,
        storage_dir: impl Into<PathBuf>,
        notifier: N,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            store: Store::open(state_path)?,
            storage_dir: storage_dir.into(),
            notifier,
        })
    }

    /// Creates a new session at offset zero, or resumes an existing one.
    ///
    /// Rejects `filesize == 0` and metadata missing `token`/`filename`
    /// before either creating or mutating a record — the handler validates
    /// these once, here, rather than deferring the failure to the notifier.
    pub fn start(
        &self,
        upload_id: &UploadId,
        filename: String,
        filesize: u64,
        peer: String,
        metadata: UploadMetadata,
    ) -> Result<StartOutcome, SessionError> {
        if filesize == 0 {
            return Err(SessionError::InvalidStartParams);
        }
        metadata.validate()?;

        let record = self.store.transact(upload_id, |current| {
            let record = match current {
                None => SessionRecord::new(filename, filesize, peer, metadata),
                Some(mut record) => {
                    record.peer = peer;
                    record.metadata = metadata;
                    record.status = SessionStatus::Resumed;
                    record
                }
            };
            Ok::<_, SessionError>(Some(record))
        })?;
        let record = record.expect("start always leaves a record in place");
        tracing::info!(upload_id = %upload_id, offset = record.offset, "session started");
        Ok(StartOutcome {
            offset: record.offset,
        })
    }

    /// Advances the session's offset by a completed chunk write.
    ///
    /// On reaching `offset >= filesize`, invokes the notifier and deletes
    /// the record within the same transaction, so a duplicate chunk replying
    /// the same terminal offset can never observe the record again and can
    /// never trigger a second notification.
    pub fn record_chunk(
        &self,
        upload_id: &UploadId,
        new_offset: u64,
    ) -> Result<ChunkOutcome, SessionError> {
        let outcome = self.store.transact(upload_id, |current| {
            let mut record = current.ok_or(SessionError::UnknownUpload)?;
            record.advance_offset(new_offset)?;
            record.status = SessionStatus::Uploading;

            if record.is_complete() {
                let file_path = self.file_path(upload_id, &record.filename);
                tracing::info!(upload_id = %upload_id, offset = record.offset, "upload completed");
                self.notifier
                    .notify_completion(upload_id.as_str(), &file_path, &record.metadata);
                Ok(None)
            } else {
                Ok(Some(record))
            }
        })?;

        Ok(match outcome {
            None => ChunkOutcome {
                offset: new_offset,
                completed: true,
            },
            Some(record) => {
                tracing::debug!(upload_id = %upload_id, offset = record.offset, "chunk accepted");
                ChunkOutcome {
                    offset: record.offset,
                    completed: false,
                }
            }
        })
    }

    /// Marks the session paused.
    pub fn pause(&self, upload_id: &UploadId) -> Result<(), SessionError> {
        self.set_status(upload_id, SessionStatus::Paused)
    }

    /// Marks the session resumed.
    pub fn resume(&self, upload_id: &UploadId) -> Result<(), SessionError> {
        self.set_status(upload_id, SessionStatus::Resumed)
    }

    /// Marks the session stopped.
    pub fn stop(&self, upload_id: &UploadId) -> Result<(), SessionError> {
        self.set_status(upload_id, SessionStatus::Stopped)
    }

    /// Returns the current offset for `upload_id`, or `0` if no session
    /// exists. Never errors: an unknown id is a normal query result, not a
    /// failure.
    #[must_use]
    pub fn query_resume(&self, upload_id: &UploadId) -> u64 {
        self.store.get(upload_id).map_or(0, |record| record.offset)
    }

    /// Resolves the on-disk path a `chunk` frame for `upload_id` should be
    /// written to, or `None` if no session exists.
    ///
    /// This is a plain [`Store::get`] (not a transaction): the connection
    /// handler uses it only to decide where to write before calling
    /// [`SessionManager::record_chunk`], which re-checks the session exists
    /// under the registry's lock and is the sole source of truth for whether
    /// the chunk is actually accepted.
    #[must_use]
    pub fn resolve_file_path(&self, upload_id: &UploadId) -> Option<PathBuf> {
        self.store
            .get(upload_id)
            .map(|record| self.storage_dir.join(upload_id.as_str()).join(record.filename))
    }

    fn set_status(&self, upload_id: &UploadId, status: SessionStatus) -> Result<(), SessionError> {
        self.store.transact(upload_id, |current| {
            let mut record = current.ok_or(SessionError::UnknownUpload)?;
            record.status = status;
            Ok(Some(record))
        })?;
        tracing::info!(upload_id = %upload_id, status = %status, "session status updated");
        Ok(())
    }

    fn file_path(&self, upload_id: &UploadId, filename: &str) -> String {
        self.storage_dir
            .join(upload_id.as_str())
            .join(filename)
            .to_string_lossy()
            .into_owned()
    }

    /// The directory under which every upload's file is stored.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

/// Errors returned by [`SessionManager`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `chunk`, `pause`, `resume`, or `stop` referenced an upload id with no
    /// session.
    #[error("unknown upload")]
    UnknownUpload,
    /// `start` declared `filesize == 0`.
    #[error("invalid start parameters: filesize must be non-zero")]
    InvalidStartParams,
    /// `start`'s metadata was missing a required field.
    #[error(transparent)]
    InvalidMetadata(#[from] MetadataError),
    /// `chunk` attempted to move the offset backwards.
    #[error(transparent)]
    Offset(#[from] OffsetError),
    /// The persistence layer failed to load or save the session map.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
