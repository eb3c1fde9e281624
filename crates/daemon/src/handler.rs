use std::io::{self, BufReader, Read};
use std::net::TcpStream;
use std::time::Duration;

use upload_chunk_io::write_chunk;
use upload_core::UploadId;
use upload_notifier::Notifier;
use upload_protocol::{read_frame, write_frame, ControlFrame, ErrorReason, FrameReadError, Reply};
use upload_session::{SessionError, SessionManager};

/// Runs the per-connection control loop until the peer disconnects, the
/// idle timeout elapses, or an unrecoverable I/O error occurs.
///
/// The session record for any upload in progress on this connection is left
/// untouched on exit: a closed socket is indistinguishable, from the session
/// manager's point of view, from a client that will reconnect and resume.
pub fn handle_connection<N: Notifier>(
    stream: TcpStream,
    sessions: &SessionManager<N>,
    idle_timeout: Duration,
) -> io::Result<()> {
    stream.set_read_timeout(Some(idle_timeout))?;
    stream.set_write_timeout(Some(idle_timeout))?;
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_owned());

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    loop {
        let frame = match read_frame(&mut reader) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(peer = %peer, "connection closed by peer");
                return Ok(());
            }
            Err(FrameReadError::Io(err)) if is_recoverable_disconnect(&err) => {
                tracing::debug!(peer = %peer, "connection idle timeout or reset");
                return Ok(());
            }
            Err(FrameReadError::Io(err)) => return Err(err),
            Err(FrameReadError::Malformed { .. }) => {
                write_frame(&mut writer, &Reply::Error {
                    reason: ErrorReason::InvalidHeader,
                })?;
                continue;
            }
            Err(FrameReadError::UnknownAction { action }) => {
                tracing::debug!(peer = %peer, action = %action, "unknown control frame action");
                write_frame(&mut writer, &Reply::Error {
                    reason: ErrorReason::UnknownAction,
                })?;
                continue;
            }
            Err(FrameReadError::MissingUploadId) => {
                write_frame(&mut writer, &Reply::Error {
                    reason: ErrorReason::MissingUploadId,
                })?;
                continue;
            }
        };

        match dispatch(&frame, sessions, &peer, &mut reader) {
            Ok(DispatchOutcome::Reply(reply)) => write_frame(&mut writer, &reply)?,
            Ok(DispatchOutcome::ShortRead) => {
                tracing::debug!(peer = %peer, "peer disconnected mid-chunk payload");
                return Ok(());
            }
            Err(err) => {
                tracing::error!(peer = %peer, error = %err, "internal error handling frame");
                let _ = write_frame(&mut writer, &Reply::Error {
                    reason: ErrorReason::InternalServerError,
                });
                return Ok(());
            }
        }
    }
}

fn is_recoverable_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
    )
}

enum DispatchOutcome {
    Reply(Reply),
    ShortRead,
}

fn dispatch<N: Notifier>(
    frame: &ControlFrame,
    sessions: &SessionManager<N>,
    peer: &str,
    reader: &mut impl Read,
) -> Result<DispatchOutcome, HandlerError> {
    let reply = match frame {
        ControlFrame::Start {
            upload_id,
            filename,
            filesize,
            chunk_size,
            metadata,
        } => handle_start(sessions, upload_id, filename, *filesize, *chunk_size, metadata.clone(), peer)?,

        ControlFrame::Chunk {
            upload_id,
            offset,
            length,
        } => return handle_chunk(sessions, upload_id, *offset, *length, reader),

        ControlFrame::Pause { upload_id } => handle_transition(sessions, upload_id, TransitionKind::Pause)?,
        ControlFrame::Resume { upload_id } => handle_transition(sessions, upload_id, TransitionKind::Resume)?,
        ControlFrame::Stop { upload_id } => handle_transition(sessions, upload_id, TransitionKind::Stop)?,

        ControlFrame::QueryResume { upload_id } => Reply::ResumeOk {
            offset: sessions.query_resume(upload_id),
        },
    };
    Ok(DispatchOutcome::Reply(reply))
}

#[allow(clippy::too_many_arguments)]
fn handle_start<N: Notifier>(
    sessions: &SessionManager<N>,
    upload_id: &UploadId,
    filename: &str,
    filesize: u64,
    chunk_size: u32,
    metadata: Option<upload_core::UploadMetadata>,
    peer: &str,
) -> Result<Reply, HandlerError> {
    let Some(metadata) = metadata else {
        return Ok(Reply::Error {
            reason: ErrorReason::InvalidStartParams,
        });
    };

    match sessions.start(upload_id, filename.to_owned(), filesize, peer.to_owned(), metadata) {
        Ok(outcome) => Ok(Reply::StartOk {
            upload_id: upload_id.clone(),
            offset: outcome.offset,
            chunk_size,
        }),
        Err(SessionError::InvalidStartParams | SessionError::InvalidMetadata(_)) => Ok(Reply::Error {
            reason: ErrorReason::InvalidStartParams,
        }),
        Err(err @ (SessionError::Persistence(_) | SessionError::UnknownUpload | SessionError::Offset(_))) => {
            Err(HandlerError::Session(err))
        }
    }
}

enum TransitionKind {
    Pause,
    Resume,
    Stop,
}

fn handle_transition<N: Notifier>(
    sessions: &SessionManager<N>,
    upload_id: &UploadId,
    kind: TransitionKind,
) -> Result<Reply, HandlerError> {
    let result = match kind {
        TransitionKind::Pause => sessions.pause(upload_id),
        TransitionKind::Resume => sessions.resume(upload_id),
        TransitionKind::Stop => sessions.stop(upload_id),
    };
    match result {
        Ok(()) => Ok(Reply::StateOk {
            upload_id: upload_id.clone(),
            state: transition_label(&kind).to_owned(),
        }),
        Err(SessionError::UnknownUpload) => Ok(Reply::Error {
            reason: ErrorReason::UnknownUpload,
        }),
        Err(err) => Err(HandlerError::Session(err)),
    }
}

fn transition_label(kind: &TransitionKind) -> &'static str {
    match kind {
        TransitionKind::Pause => "paused",
        TransitionKind::Resume => "resumed",
        TransitionKind::Stop => "stopped",
    }
}

/// Upper bound on a single `chunk` frame's declared `length`.
///
/// Large enough to comfortably exceed any sane negotiated `chunk_size`
/// without letting a malicious or buggy client force a multi-gigabyte
/// allocation per frame; `ErrorReason::InvalidLength` covers both this and
/// the zero-length case.
const MAX_CHUNK_LENGTH: u32 = 64 * 1024 * 1024;

fn handle_chunk<N: Notifier>(
    sessions: &SessionManager<N>,
    upload_id: &UploadId,
    offset: u64,
    length: u32,
    reader: &mut impl Read,
) -> Result<DispatchOutcome, HandlerError> {
    if length == 0 || length > MAX_CHUNK_LENGTH {
        return Ok(DispatchOutcome::Reply(Reply::Error {
            reason: ErrorReason::InvalidLength,
        }));
    }

    let mut buf = vec![0u8; length as usize];
    if reader.read_exact(&mut buf).is_err() {
        return Ok(DispatchOutcome::ShortRead);
    }

    let Some(path) = sessions.resolve_file_path(upload_id) else {
        return Ok(DispatchOutcome::Reply(Reply::Error {
            reason: ErrorReason::UnknownUpload,
        }));
    };

    if let Err(err) = write_chunk(&path, &buf, offset) {
        tracing::warn!(upload_id = %upload_id, error = %err, "chunk write failed");
        return Ok(DispatchOutcome::Reply(Reply::Error {
            reason: ErrorReason::WriteFailed,
        }));
    }

    let new_offset = offset + u64::from(length);
    match sessions.record_chunk(upload_id, new_offset) {
        Ok(outcome) => Ok(DispatchOutcome::Reply(Reply::ChunkOk {
            offset: outcome.offset,
        })),
        Err(SessionError::UnknownUpload) => Ok(DispatchOutcome::Reply(Reply::Error {
            reason: ErrorReason::UnknownUpload,
        })),
        // The client declared an offset/length pair that would move the
        // session backwards; the specification leaves offset trust policy
        // to the implementation (see the design notes on open question 1),
        // and this implementation reports it the same way as any other
        // invalid chunk coordinate rather than inventing a new wire reason.
        Err(SessionError::Offset(_)) => Ok(DispatchOutcome::Reply(Reply::Error {
            reason: ErrorReason::InvalidLength,
        })),
        Err(err) => Err(HandlerError::Session(err)),
    }
}

/// Internal errors surfaced by [`dispatch`], always mapped to
/// `internal_server_error` and a closed connection by
/// [`handle_connection`].
#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error(transparent)]
    Session(#[from] SessionError),
}
