#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `upload-core` exposes the domain types shared by every layer of the
//! resumable upload service: the server's connection handler, session
//! manager, and notifier, plus the client driver. None of these types touch
//! the network or the filesystem directly — they describe the data, not the
//! I/O.
//!
//! # Design
//!
//! - [`upload_id::UploadId`] is the client-chosen key identifying one upload
//!   session.
//! - [`metadata::UploadMetadata`] and [`metadata::Visibility`] model the
//!   opaque-to-the-wire-protocol, concrete-to-Rust metadata payload carried
//!   from the client through to the completion notifier.
//! - [`status::SessionStatus`] enumerates the session lifecycle states.
//! - [`record::SessionRecord`] is the persisted, per-upload record and
//!   enforces the offset invariants described below.
//!
//! # Invariants
//!
//! - A [`record::SessionRecord`]'s `offset` is monotonically non-decreasing;
//!   [`record::SessionRecord::advance_offset`] is the only way to change it
//!   and rejects any decrease.
//! - `0 <= offset <= filesize` always holds for a live record.

/// Session record type and offset-advance invariants.
pub mod record;
/// Upload metadata carried from the client to the completion notifier.
pub mod metadata;
/// Session lifecycle states.
pub mod status;
/// The client-chosen upload identifier.
pub mod upload_id;

pub use metadata::{UploadMetadata, Visibility};
pub use record::SessionRecord;
pub use status::SessionStatus;
pub use upload_id::UploadId;
