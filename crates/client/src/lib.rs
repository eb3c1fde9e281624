#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `upload-client` mirrors the server's control/payload protocol from the
//! sending side: connect, `start` (resuming from a locally persisted offset
//! if one is known), stream chunks up to `chunk_size` bytes at a time,
//! respond to an embedding application's pause/resume/stop requests between
//! chunks, and drop the local resume entry once the upload completes.
//!
//! # Design
//!
//! Local resume state reuses [`upload_persistence::Store`], keyed by
//! [`UploadId`], mapping to the last acknowledged offset — the same
//! crash-safe atomic-rename persistence the server uses for its session
//! registry, just with a `u64` instead of a `SessionRecord` as the value.
//! [`UploadControls`] is the hook an embedding UI implements to drive
//! pause/resume/stop; [`NoControls`] is the default for a one-shot,
//! uninterruptible upload.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use upload_core::{UploadId, UploadMetadata};
use upload_persistence::{PersistenceError, Store};
use upload_protocol::{read_reply, write_frame, ControlFrame, ErrorReason, Reply, ReplyReadError};

/// Interval the driver sleeps between polls while a transfer is paused.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Hook an embedding application implements to steer an in-progress upload.
///
/// All three methods are polled between chunk iterations (and, for
/// [`UploadControls::should_resume`], while paused); none of them may block
/// for long, since they're called from the upload's own thread.
pub trait UploadControls {
    /// Returns `true` if the caller wants the upload paused right now.
    fn should_pause(&self) -> bool {
        false
    }
    /// Returns `true` if the caller wants the upload stopped right now.
    fn should_stop(&self) -> bool {
        false
    }
    /// Polled in a loop while paused; returns `true` once the caller wants
    /// to resume.
    fn should_resume(&self) -> bool {
        true
    }
}

/// [`UploadControls`] that never pauses or stops — a plain, uninterruptible
/// upload from start to completion.
pub struct NoControls;

impl UploadControls for NoControls {}

/// How an [`UploadDriver::upload`] call ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UploadOutcome {
    /// The file was fully transferred and acknowledged.
    Completed {
        /// The final offset, equal to the file's size.
        offset: u64,
    },
    /// The caller requested `stop` before completion.
    Stopped {
        /// The offset at the time of stopping.
        offset: u64,
    },
}

/// Drives one resumable upload, maintaining a local offset cache across
/// reconnects.
pub struct UploadDriver {
    resume_store: Store<UploadId, u64>,
}

impl UploadDriver {
    /// Opens (or creates) the local resume-state file at `resume_file`.
    pub fn open(resume_file: impl Into<PathBuf>) -> Result<Self, ClientError> {
        Ok(Self {
            resume_store: Store::open(resume_file)?,
        })
    }

    /// Returns the last known local offset for `upload_id`, or `0` if none
    /// is recorded — the offset the next [`UploadDriver::upload`] call for
    /// this id would resume from before even contacting the server.
    #[must_use]
    pub fn local_offset(&self, upload_id: &UploadId) -> u64 {
        self.resume_store.get(upload_id).unwrap_or(0)
    }

    /// Uploads `local_file` to `addr` under `upload_id`, resuming from the
    /// server's authoritative offset.
    ///
    /// Connects once, sends `start`, and streams chunks of up to
    /// `chunk_size` bytes until the server reports completion or
    /// `controls.should_stop()` becomes true. Any I/O failure tears the
    /// connection down after persisting the last acknowledged offset
    /// locally — a higher layer may retry by calling this again, which
    /// reconnects and resumes from that offset.
    pub fn upload(
        &self,
        addr: impl ToSocketAddrs,
        upload_id: UploadId,
        local_file: &Path,
        filename: String,
        metadata: UploadMetadata,
        chunk_size: u32,
        controls: &dyn UploadControls,
    ) -> Result<UploadOutcome, ClientError> {
        let filesize = std::fs::metadata(local_file)?.len();
        let mut stream = TcpStream::connect(addr)?;
        let mut reader = BufReader::new(stream.try_clone()?);

        write_frame(
            &mut stream,
            &ControlFrame::Start {
                upload_id: upload_id.clone(),
                filename,
                filesize,
                chunk_size,
                metadata: Some(metadata),
            },
        )?;
        let mut offset = match expect_reply(&mut reader)? {
            Reply::StartOk { offset, .. } => offset,
            Reply::Error { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::UnexpectedReply(other)),
        };
        self.persist_offset(&upload_id, offset)?;

        let mut file = File::open(local_file)?;
        file.seek(SeekFrom::Start(offset))?;

        let result = self.send_chunks(
            &mut stream,
            &mut reader,
            &mut file,
            &upload_id,
            &mut offset,
            filesize,
            chunk_size,
            controls,
        );

        match result {
            Ok(UploadOutcome::Completed { offset }) => {
                self.resume_store.delete(&upload_id)?;
                Ok(UploadOutcome::Completed { offset })
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn send_chunks(
        &self,
        stream: &mut TcpStream,
        reader: &mut BufReader<TcpStream>,
        file: &mut File,
        upload_id: &UploadId,
        offset: &mut u64,
        filesize: u64,
        chunk_size: u32,
        controls: &dyn UploadControls,
    ) -> Result<UploadOutcome, ClientError> {
        loop {
            if controls.should_stop() {
                write_frame(stream, &ControlFrame::Stop { upload_id: upload_id.clone() })?;
                let _ = expect_reply(reader);
                self.persist_offset(upload_id, *offset)?;
                return Ok(UploadOutcome::Stopped { offset: *offset });
            }

            if controls.should_pause() {
                write_frame(stream, &ControlFrame::Pause { upload_id: upload_id.clone() })?;
                let _ = expect_reply(reader);
                while !controls.should_resume() {
                    thread::sleep(PAUSE_POLL_INTERVAL);
                }
                write_frame(stream, &ControlFrame::Resume { upload_id: upload_id.clone() })?;
                let _ = expect_reply(reader);
                continue;
            }

            if *offset >= filesize {
                return Ok(UploadOutcome::Completed { offset: *offset });
            }

            let mut buf = vec![0u8; chunk_size as usize];
            let read_len = read_up_to(file, &mut buf)?;
            if read_len == 0 {
                return Ok(UploadOutcome::Completed { offset: *offset });
            }
            buf.truncate(read_len);

            write_frame(
                stream,
                &ControlFrame::Chunk {
                    upload_id: upload_id.clone(),
                    offset: *offset,
                    length: read_len as u32,
                },
            )?;
            stream.write_all(&buf)?;
            stream.flush()?;

            match expect_reply(reader)? {
                Reply::ChunkOk { offset: new_offset } => {
                    *offset = new_offset;
                    self.persist_offset(upload_id, *offset)?;
                }
                Reply::Error { reason } => return Err(ClientError::Rejected(reason)),
                other => return Err(ClientError::UnexpectedReply(other)),
            }
        }
    }

    fn persist_offset(&self, upload_id: &UploadId, offset: u64) -> Result<(), ClientError> {
        self.resume_store.update(upload_id.clone(), offset)?;
        Ok(())
    }
}

fn expect_reply(reader: &mut BufReader<TcpStream>) -> Result<Reply, ClientError> {
    match read_reply(reader)? {
        Some(reply) => Ok(reply),
        None => Err(ClientError::ConnectionClosed),
    }
}

/// Reads up to `buf.len()` bytes from `file`, stopping early at EOF.
///
/// Unlike [`Read::read_exact`], a short read here is the normal terminal
/// condition for the final chunk of a file whose size isn't a multiple of
/// `chunk_size`, not an error.
fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Errors returned by [`UploadDriver::upload`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A socket or local file I/O error occurred.
    #[error("client I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The server closed the connection before a reply was received.
    #[error("server closed the connection unexpectedly")]
    ConnectionClosed,
    /// The server's reply could not be parsed.
    #[error(transparent)]
    Reply(#[from] ReplyReadError),
    /// The server replied with an error reason.
    #[error("server rejected the request: {0:?}")]
    Rejected(ErrorReason),
    /// The server sent a reply that didn't match the frame just sent.
    #[error("unexpected server reply: {0:?}")]
    UnexpectedReply(Reply),
    /// The local resume-state store failed to load or save.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
