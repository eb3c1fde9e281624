#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! Shared `tracing` wiring for the `upload-server` and `upload-client`
//! binaries: one [`init_tracing`] call sets up a formatted subscriber
//! honoring `RUST_LOG`, and [`Sink`]/[`BufferSink`] give tests a way to
//! capture structured events without depending on a real terminal.
//!
//! # Design
//!
//! [`init_tracing`] mirrors the `EnvFilter` + `fmt` combination used
//! throughout this corpus's binaries: default to `info`, let `RUST_LOG`
//! override per-module, write compact single-line records to stderr so
//! stdout stays free for any user-facing output.

use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

/// The default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Initializes the global `tracing` subscriber for a binary's `main`.
///
/// Safe to call more than once within a process (a second call is a no-op);
/// this matters for integration tests that exercise a binary's `main` more
/// than once in the same test process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// A destination for human-readable progress lines, distinct from
/// `tracing`'s structured event stream.
///
/// The client binary uses this for the handful of lines meant for a human
/// watching a transfer (`"uploaded 4096/16384 bytes"`), which don't belong
/// in the structured log at `info` level. [`StderrSink`] is the production
/// implementation; [`BufferSink`] lets tests assert on exactly what would
/// have been shown.
pub trait Sink: Send + Sync {
    /// Emits one line of output. Implementations should not panic.
    fn line(&self, message: &str);
}

/// Writes each line to stderr, the default [`Sink`] for both binaries.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn line(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Captures emitted lines in memory, for use in tests.
#[derive(Clone, Debug, Default)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every line recorded so far, in emission order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Sink for BufferSink {
    fn line(&self, message: &str) {
        self.lock().push(message.to_owned());
    }
}
