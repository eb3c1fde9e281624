#![deny(unsafe_code)]

//! Binary entry point for the resumable upload client.
//!
//! Parses CLI arguments describing a single file transfer, resumes from
//! whatever local offset is already known for the given upload id, and
//! drives the transfer to completion or until stopped.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use upload_client::{NoControls, UploadDriver};
use upload_core::{UploadId, UploadMetadata, Visibility};

/// Resumable chunked file upload client.
#[derive(Parser, Debug)]
#[command(name = "upload-client", version, about)]
struct Args {
    /// Server host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to connect to.
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Local file to upload.
    #[arg(long)]
    file: PathBuf,

    /// Identifier for this upload; reused across reconnects to resume.
    #[arg(long)]
    upload_id: String,

    /// Chunk size, in bytes, requested from the server.
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: u32,

    /// Bearer token forwarded to the completion notifier.
    #[arg(long)]
    token: String,

    /// Free-text description recorded with the upload.
    #[arg(long)]
    description: Option<String>,

    /// Makes the resulting document publicly visible.
    #[arg(long)]
    public: bool,

    /// Tags attached to the resulting document.
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Path to the local resume-state file.
    #[arg(long, default_value = "./tmp/client_resume_state.json")]
    resume_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    logging_sink::init_tracing();
    let args = Args::parse();

    let filename = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .context("upload file path has no file name")?;

    let metadata = UploadMetadata {
        token: args.token,
        filename: filename.clone(),
        description: args.description,
        visibility: if args.public {
            Visibility::Public
        } else {
            Visibility::Private
        },
        tags: args.tags,
    };

    let driver = UploadDriver::open(&args.resume_file).context("opening local resume state")?;
    let upload_id = UploadId::new(args.upload_id);

    tracing::info!(upload_id = %upload_id, file = %args.file.display(), "starting upload");
    let outcome = driver
        .upload(
            (args.host.as_str(), args.port),
            upload_id,
            &args.file,
            filename,
            metadata,
            args.chunk_size,
            &NoControls,
        )
        .context("upload failed")?;

    match outcome {
        upload_client::UploadOutcome::Completed { offset } => {
            tracing::info!(offset, "upload completed");
        }
        upload_client::UploadOutcome::Stopped { offset } => {
            tracing::info!(offset, "upload stopped before completion");
        }
    }

    Ok(())
}
