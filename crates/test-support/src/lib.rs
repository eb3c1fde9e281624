#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! Test-only helpers shared across this workspace's crates and its root
//! integration tests: a scratch workspace bundling a storage directory and
//! state file, and ephemeral-port allocation for binding a real
//! [`std::net::TcpListener`] in a test without colliding with other tests
//! running in the same process.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// A scratch directory laid out the way the daemon expects: a storage
/// subdirectory for uploaded file bytes and a state-file path for the
/// session registry, both rooted under one temporary directory that is
/// removed when the workspace is dropped.
pub struct TempWorkspace {
    _dir: TempDir,
    storage_dir: PathBuf,
    state_file: PathBuf,
}

impl TempWorkspace {
    /// Creates a new temporary workspace.
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let storage_dir = dir.path().join("storage");
        let state_file = dir.path().join("state.json");
        Ok(Self {
            _dir: dir,
            storage_dir,
            state_file,
        })
    }

    /// The directory uploaded files should be written under.
    #[must_use]
    pub fn storage_dir(&self) -> &std::path::Path {
        &self.storage_dir
    }

    /// The path the session registry should persist its state to.
    #[must_use]
    pub fn state_file(&self) -> &std::path::Path {
        &self.state_file
    }
}

/// Binds an ephemeral localhost port, long enough to learn which one the
/// kernel assigned, then releases it immediately.
///
/// There is an unavoidable race between this function returning and the
/// caller binding the same port for real; it is acceptable here because
/// tests bind the daemon's listener themselves moments later, the same
/// trade-off this corpus's own daemon integration tests accept.
#[must_use]
pub fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().expect("read local addr").port()
}

/// Connects to `port` on localhost, retrying with backoff until `timeout`
/// elapses, for tests that start a server on a background thread and need
/// to wait for its accept loop to come up.
///
/// # Panics
///
/// Panics if no connection succeeds before `timeout` elapses.
pub fn connect_with_retries(port: u16, timeout: Duration) -> TcpStream {
    const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
    const MAX_BACKOFF: Duration = Duration::from_millis(200);

    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let deadline = Instant::now() + timeout;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match TcpStream::connect_timeout(&target, backoff) {
            Ok(stream) => return stream,
            Err(error) => {
                if Instant::now() >= deadline {
                    panic!("failed to connect to 127.0.0.1:{port} within {timeout:?}: {error}");
                }
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
