#![deny(unsafe_code)]

//! Binary entry point for the resumable upload server.
//!
//! Loads [`upload_daemon::DaemonConfig`] from the environment, applies any
//! CLI overrides, and runs the daemon until the listening socket closes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use upload_daemon::DaemonConfig;

/// Resumable chunked file upload server.
#[derive(Parser, Debug)]
#[command(name = "upload-server", version, about)]
struct Args {
    /// Address to bind the listening socket to.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the listening socket to.
    #[arg(long)]
    port: Option<u16>,

    /// Directory uploaded file bytes are written under.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Path the session registry persists its state to.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// URL the completion notifier POSTs to on upload completion.
    #[arg(long)]
    backend_url: Option<String>,

    /// Seconds of inactivity before a connection is closed.
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Chunk size, in bytes, echoed back to clients on `start`.
    #[arg(long)]
    chunk_size: Option<u32>,
}

impl Args {
    fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(storage_dir) = self.storage_dir {
            config.storage_dir = storage_dir;
        }
        if let Some(state_file) = self.state_file {
            config.state_file = state_file;
        }
        if let Some(backend_url) = self.backend_url {
            config.backend_url = backend_url;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    logging_sink::init_tracing();

    let args = Args::parse();
    let config = args.apply(DaemonConfig::from_env().context("loading daemon configuration")?);

    tracing::info!(host = %config.host, port = config.port, "starting upload server");
    upload_daemon::run_daemon(config).context("upload server exited with an error")
}
