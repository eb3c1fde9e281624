use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use upload_notifier::{HttpNotifier, Notifier};
use upload_session::SessionManager;

use crate::config::DaemonConfig;
use crate::handler::handle_connection;

/// Soft cap on concurrently live connection threads.
///
/// This is observability, not admission control: a connection beyond the
/// cap is still accepted and served, but its acceptance is logged at `warn`
/// so an operator watching logs can tell load is climbing, matching the
/// specification's preference for explicit resource accounting over a
/// silent unbounded thread count.
const SOFT_MAX_CONNECTIONS: usize = 256;

/// Errors that can prevent the daemon from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The listening socket could not be bound.
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        /// The host the daemon attempted to bind.
        host: String,
        /// The port the daemon attempted to bind.
        port: u16,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The session registry or its notifier failed to initialize.
    #[error(transparent)]
    Session(#[from] upload_session::SessionError),
    /// The production HTTP notifier failed to build.
    #[error(transparent)]
    Notifier(#[from] upload_notifier::NotifierError),
}

/// Runs the upload server with the production [`HttpNotifier`], blocking
/// until the listening socket is closed or accept fails unrecoverably.
pub fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let notifier = HttpNotifier::new(config.backend_url.clone())?;
    run_daemon_with(config, notifier)
}

/// Runs the upload server with a caller-supplied [`Notifier`], for
/// production use with an alternate backend or for tests that want to
/// observe completion calls without a real HTTP endpoint.
pub fn run_daemon_with<N: Notifier + 'static>(
    config: DaemonConfig,
    notifier: N,
) -> Result<(), DaemonError> {
    bind_daemon(config, notifier)?.serve()
}

/// A daemon bound to its listening socket but not yet serving connections.
///
/// Splitting bind from serve lets a test discover the actual port the
/// kernel assigned (when `port: 0` was requested) before handing the socket
/// off to the blocking accept loop on a background thread.
pub struct BoundDaemon<N> {
    listener: TcpListener,
    sessions: Arc<SessionManager<N>>,
    idle_timeout: Duration,
}

impl<N: Notifier + 'static> BoundDaemon<N> {
    /// The address the listening socket was actually bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop, blocking until the listener is closed or
    /// accept fails unrecoverably.
    pub fn serve(self) -> Result<(), DaemonError> {
        serve(self.listener, self.sessions, self.idle_timeout)
    }
}

/// Binds the listening socket and opens the session registry without
/// starting the accept loop. See [`BoundDaemon`].
pub fn bind_daemon<N: Notifier + 'static>(
    config: DaemonConfig,
    notifier: N,
) -> Result<BoundDaemon<N>, DaemonError> {
    let sessions = Arc::new(SessionManager::open(
        &config.state_file,
        &config.storage_dir,
        notifier,
    )?);

    let listener =
        TcpListener::bind((config.host.as_str(), config.port)).map_err(|source| DaemonError::Bind {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

    tracing::info!(host = %config.host, port = config.port, "upload server listening");
    Ok(BoundDaemon {
        listener,
        sessions,
        idle_timeout: config.idle_timeout,
    })
}

fn serve<N: Notifier + 'static>(
    listener: TcpListener,
    sessions: Arc<SessionManager<N>>,
    idle_timeout: std::time::Duration,
) -> Result<(), DaemonError> {
    let live_connections = Arc::new(AtomicUsize::new(0));

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept connection");
                continue;
            }
        };

        let sessions = Arc::clone(&sessions);
        let live_connections = Arc::clone(&live_connections);
        let count = live_connections.fetch_add(1, Ordering::SeqCst) + 1;
        if count > SOFT_MAX_CONNECTIONS {
            tracing::warn!(count, cap = SOFT_MAX_CONNECTIONS, "live connection count above soft cap");
        }

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        tracing::debug!(peer = %peer, count, "connection accepted");

        thread::spawn(move || {
            if let Err(err) = handle_connection(stream, sessions.as_ref(), idle_timeout) {
                tracing::warn!(peer = %peer, error = %err, "connection handler exited with error");
            }
            live_connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    Ok(())
}
