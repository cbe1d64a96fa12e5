//! Utility functions for paths and timestamps

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix of temporary output directories
pub const OUTPUT_DIR_PREFIX: &str = "ptarchive";

/// Directory archives are written to for this run
///
/// Uses `configured` when given; otherwise creates a fresh temporary
/// directory named `ptarchive*` that is left in place after the run.
///
/// # Errors
///
/// Returns [`Error::Filesystem`] if the temporary directory cannot be created.
pub fn resolve_output_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }

    let temp = tempfile::Builder::new()
        .prefix(OUTPUT_DIR_PREFIX)
        .tempdir()
        .map_err(|source| Error::Filesystem {
            path: std::env::temp_dir(),
            source,
        })?;
    Ok(temp.keep())
}

/// Create `dir` and its parents if missing
///
/// # Errors
///
/// Returns [`Error::Filesystem`] if the directory cannot be created.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| Error::Filesystem {
            path: dir.to_path_buf(),
            source,
        })
}

/// Parse an RFC 3339 timestamp into UTC
///
/// # Errors
///
/// Returns [`Error::Config`] naming `key` if `value` is not RFC 3339.
pub fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::config(key, format!("invalid {} time '{}': {}", key, value, e)))
}
