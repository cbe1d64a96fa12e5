//! Error types for ptarchive
//!
//! Errors fall into two groups:
//! - Run-level errors (configuration, missing credentials, catalog failures)
//!   abort the whole run before any archive is fetched.
//! - Per-archive errors (transport, format, filesystem, mid-copy I/O) are the
//!   terminal outcome of one archive and never affect sibling workers.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ptarchive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ptarchive
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pattern")
        key: Option<String>,
    },

    /// Request could not be issued or the response status was not successful
    #[error("transport error: {message}")]
    Transport {
        /// HTTP status code, when a response was received
        status: Option<u16>,
        /// Human-readable description of the failure
        message: String,
    },

    /// Stream is not validly framed as the expected compressed format
    #[error("format error: {0}")]
    Format(String),

    /// Destination path could not be created
    #[error("cannot create {path}: {source}")]
    Filesystem {
        /// The path that could not be created
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Textual archive size that does not parse as a byte count
    #[error("invalid size {raw:?} for archive {filename}")]
    InvalidSize {
        /// Archive the size belongs to
        filename: String,
        /// The raw size text as received from the catalog
        raw: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking copy task panicked or was cancelled
    #[error("task error: {0}")]
    Task(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Build a transport error from an HTTP status
    pub fn status(status: reqwest::StatusCode, url: &str) -> Self {
        Error::Transport {
            status: Some(status.as_u16()),
            message: format!("http status: {} {}", status, url),
        }
    }

    /// Configuration errors abort the whole run; everything else is scoped
    /// to the archive that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. })
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task(e.to_string())
    }
}
