#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `upload-protocol` defines the wire types for the resumable upload
//! control channel: one newline-terminated JSON object per frame, dispatched
//! on an `action` tag. Raw chunk payload bytes are *not* modeled here — they
//! never carry framing of their own, and the connection handler reads them
//! directly off the stream using the `length` declared by a [`ControlFrame::Chunk`]
//! frame.
//!
//! # Design
//!
//! [`ControlFrame`] is a tagged enum matching the action table in the
//! specification (`start`, `chunk`, `pause`, `resume`, `stop`,
//! `query_resume`). [`read_frame`] and [`write_frame`] perform the
//! newline-delimited JSON framing against any [`std::io::BufRead`] /
//! [`std::io::Write`] pair, keeping the handler's dispatch loop free of
//! serialization details. [`Reply`] models every acknowledgement shape the
//! server can send back, including the fixed set of [`ErrorReason`] values.

mod frame;
mod reply;

pub use frame::{read_frame, write_frame, ControlFrame, FrameReadError, KNOWN_ACTIONS};
pub use reply::{read_reply, ErrorReason, Reply, ReplyReadError};
