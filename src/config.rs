//! Configuration types for ptarchive

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transform::LineMatcher;

/// How a single archive's byte stream is transformed before it is written
///
/// Empty filter strings are treated the same as absent ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Gunzip the archive body
    #[serde(default)]
    pub decompress: bool,

    /// Keep only lines containing this text (case-sensitive)
    #[serde(default)]
    pub substring: Option<String>,

    /// Keep only lines matching this regular expression
    #[serde(default)]
    pub pattern: Option<String>,
}

impl StreamOptions {
    /// Substring filter, if set and non-empty
    pub fn substring(&self) -> Option<&str> {
        self.substring.as_deref().filter(|s| !s.is_empty())
    }

    /// Pattern filter, if set and non-empty
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether any line filter is configured
    pub fn has_filters(&self) -> bool {
        self.substring().is_some() || self.pattern().is_some()
    }

    /// Whether the body will actually be decompressed
    ///
    /// Filters operate on lines of plain text, so requesting either one turns
    /// decompression on regardless of [`StreamOptions::decompress`].
    pub fn effective_decompress(&self) -> bool {
        self.decompress || self.has_filters()
    }
}

/// Main configuration for an archive retrieval run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory archives are written to (default: a fresh temporary directory)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Number of concurrent fetch workers (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Base URL of the archive API (default: "https://papertrailapp.com/api/v1")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Request header carrying the API token (default: "X-Papertrail-Token")
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Whole-request timeout (None = no timeout; archive bodies can be large)
    #[serde(default)]
    pub request_timeout: Option<Duration>,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Per-archive stream transformation
    #[serde(default)]
    pub stream: StreamOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            workers: default_workers(),
            api_base_url: default_api_base_url(),
            token_header: default_token_header(),
            request_timeout: None,
            event_capacity: default_event_capacity(),
            stream: StreamOptions::default(),
        }
    }
}

impl Config {
    /// Check settings that would otherwise fail after work has started
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero worker count, a zero event channel
    /// capacity, a malformed API URL or a pattern that does not compile.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("workers", "worker count must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config(
                "event_capacity",
                "event channel capacity must be at least 1",
            ));
        }
        url::Url::parse(&self.api_base_url).map_err(|e| {
            Error::config(
                "api_base_url",
                format!("invalid API base URL '{}': {}", self.api_base_url, e),
            )
        })?;
        if let Some(pattern) = self.stream.pattern() {
            LineMatcher::pattern(pattern)?;
        }
        Ok(())
    }

    /// URL of the archive listing
    pub fn catalog_url(&self) -> String {
        format!("{}/archives.json", self.api_base_url.trim_end_matches('/'))
    }
}

fn default_workers() -> usize {
    4
}

fn default_api_base_url() -> String {
    "https://papertrailapp.com/api/v1".to_string()
}

fn default_token_header() -> String {
    "X-Papertrail-Token".to_string()
}

fn default_event_capacity() -> usize {
    1000
}
