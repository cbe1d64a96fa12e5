//! # ptarchive
//!
//! Concurrent retrieval of hourly log archives from the Papertrail archive API.
//!
//! ## Design Philosophy
//!
//! ptarchive is designed to be:
//! - **Streaming** - Archive bodies flow from the network to disk through a
//!   decompress/filter chain without being buffered whole
//! - **Bounded** - A fixed pool of workers drains the selected archives
//! - **Failure-isolated** - One bad archive never cancels its siblings
//! - **Event-driven** - Consumers subscribe to per-archive outcomes
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::TimeDelta;
//! use ptarchive::{ArchiveRetriever, Config, TimeWindow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let retriever = ArchiveRetriever::from_config(Config::default())?;
//!
//!     let mut events = retriever.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let selected = retriever.select(&TimeWindow::last(TimeDelta::hours(6))).await?;
//!     let output_dir = retriever.output_dir()?;
//!     let summary = retriever.download(selected, &output_dir).await?;
//!     println!("{} of {} archives saved", summary.succeeded, summary.dispatched);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive catalog retrieval
pub mod catalog;
/// Configuration types
pub mod config;
/// Bounded worker pool
pub mod dispatcher;
/// Error types
pub mod error;
/// Per-archive fetch worker
pub mod fetcher;
/// Catalog, selection and download entry point
pub mod retriever;
/// Decompression and line filtering
pub mod transform;
/// Authenticated HTTP transport
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use catalog::{ArchiveCatalog, HttpCatalog};
pub use config::{Config, StreamOptions};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use fetcher::{Fetcher, fetch_archive};
pub use retriever::ArchiveRetriever;
pub use transform::{LineMatcher, TransformChain};
pub use transport::{ArchiveTransport, ByteStream, Credentials, HttpClient, TOKEN_ENV_VAR};
pub use types::{
    ArchiveDescriptor, ArchiveSet, DryRunEntry, Event, FetchReport, RawSize, RunSummary,
    TimeWindow,
};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Archives being written when the signal arrives are left as partial files.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Wait for a termination signal.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
