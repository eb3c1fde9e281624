use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the upload server.
///
/// Assembled by [`DaemonConfig::from_env`] and then optionally overridden by
/// CLI flags at the binary's `main`, matching the precedence the
/// specification calls for: CLI flag over environment variable over
/// built-in default.
#[derive(Clone, Debug, PartialEq)]
pub struct DaemonConfig {
    /// Address to bind the listening socket to.
    pub host: String,
    /// Port to bind the listening socket to.
    pub port: u16,
    /// Root directory under which every upload's file is written, at
    /// `<storage_dir>/<upload_id>/<filename>`.
    pub storage_dir: PathBuf,
    /// Path to the durable session registry document.
    pub state_file: PathBuf,
    /// URL the completion notifier posts to.
    pub backend_url: String,
    /// Per-connection idle timeout applied to both header and payload reads.
    pub idle_timeout: Duration,
    /// Default chunk size advertised to clients that don't request one of
    /// their own; purely advisory, the server never enforces it.
    pub chunk_size: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9000,
            storage_dir: PathBuf::from("./storage"),
            state_file: PathBuf::from("./tmp/uploads_state.json"),
            backend_url: "http://127.0.0.1:8080/api/uploads/complete".to_owned(),
            idle_timeout: Duration::from_secs(60),
            chunk_size: 64 * 1024,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from the recognized environment variables
    /// (`HOST`, `PORT`, `STORAGE_DIR`, `STATE_FILE`, `BACKEND_URL`,
    /// `IDLE_TIMEOUT_SECS`, `CHUNK_SIZE`), falling back to
    /// [`DaemonConfig::default`] for anything unset. Never panics; a value
    /// that is set but unparsable is reported as a [`ConfigError`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = parse_env("PORT", defaults.port, ConfigError::InvalidPort)?;
        let storage_dir = env::var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);
        let state_file = env::var("STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.state_file);
        let backend_url = env::var("BACKEND_URL").unwrap_or(defaults.backend_url);
        let idle_timeout_secs = parse_env(
            "IDLE_TIMEOUT_SECS",
            defaults.idle_timeout.as_secs(),
            ConfigError::InvalidIdleTimeout,
        )?;
        let chunk_size = parse_env(
            "CHUNK_SIZE",
            defaults.chunk_size,
            ConfigError::InvalidChunkSize,
        )?;

        Ok(Self {
            host,
            port,
            storage_dir,
            state_file,
            backend_url,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            chunk_size,
        })
    }
}

fn parse_env<T>(
    key: &'static str,
    default: T,
    wrap: fn(ParseIntError) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    match env::var(key) {
        Ok(value) => value.parse().map_err(wrap),
        Err(_) => Ok(default),
    }
}

/// Errors returned by [`DaemonConfig::from_env`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `PORT` was set but not a valid `u16`.
    #[error("invalid PORT: {0}")]
    InvalidPort(ParseIntError),
    /// `IDLE_TIMEOUT_SECS` was set but not a valid integer.
    #[error("invalid IDLE_TIMEOUT_SECS: {0}")]
    InvalidIdleTimeout(ParseIntError),
    /// `CHUNK_SIZE` was set but not a valid `u32`.
    #[error("invalid CHUNK_SIZE: {0}")]
    InvalidChunkSize(ParseIntError),
}
