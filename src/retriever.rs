//! Top-level entry point tying catalog, selection and download together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::catalog::{ArchiveCatalog, HttpCatalog};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::fetcher::{Fetcher, destination_path};
use crate::transform::TransformChain;
use crate::transport::{ArchiveTransport, Credentials, HttpClient};
use crate::types::{ArchiveDescriptor, ArchiveSet, DryRunEntry, Event, RunSummary, TimeWindow};
use crate::utils;

/// Archive retriever (cloneable - all fields are Arc-wrapped or cheap to clone)
#[derive(Clone)]
pub struct ArchiveRetriever {
    config: Arc<Config>,
    catalog: Arc<dyn ArchiveCatalog>,
    transport: Arc<dyn ArchiveTransport>,
    chain: TransformChain,
    event_tx: broadcast::Sender<Event>,
}

impl ArchiveRetriever {
    /// Create a retriever talking to the archive API
    ///
    /// The API token is read from [`crate::transport::TOKEN_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid or the
    /// token is missing. Nothing is sent over the network.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let credentials = Credentials::from_env()?;
        Self::with_credentials(config, &credentials)
    }

    /// Create a retriever talking to the archive API with an explicit token
    pub fn with_credentials(config: Config, credentials: &Credentials) -> Result<Self> {
        config.validate()?;
        let client = HttpClient::new(&config, credentials)?;
        let catalog = HttpCatalog::new(client.clone(), config.catalog_url());
        Self::with_collaborators(config, Arc::new(catalog), Arc::new(client))
    }

    /// Create a retriever from arbitrary catalog and transport implementations
    pub fn with_collaborators(
        config: Config,
        catalog: Arc<dyn ArchiveCatalog>,
        transport: Arc<dyn ArchiveTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let chain = TransformChain::new(&config.stream)?;
        let (event_tx, _rx) = broadcast::channel(config.event_capacity);

        tracing::debug!(
            workers = config.workers,
            chain = %chain,
            catalog = %config.catalog_url(),
            "Archive retriever ready"
        );

        Ok(Self {
            config: Arc::new(config),
            catalog,
            transport,
            chain,
            event_tx,
        })
    }

    /// Subscribe to run events
    ///
    /// Subscribers that fall more than `event_capacity` events behind see
    /// `RecvError::Lagged`; the run itself never waits on them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The transform chain every archive goes through
    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    /// Fetch the full catalog
    pub async fn list_archives(&self) -> Result<ArchiveSet> {
        self.catalog.list_archives().await
    }

    /// Catalog entries overlapping `window`, in catalog order
    pub async fn select(&self, window: &TimeWindow) -> Result<ArchiveSet> {
        let archives = self.list_archives().await?;
        let selected = archives.matching(|a| window.contains_archive(a));
        tracing::info!(
            start = %window.start,
            end = %window.end,
            available = archives.len(),
            selected = selected.len(),
            "Selected archives"
        );
        Ok(selected)
    }

    /// What [`ArchiveRetriever::download`] would fetch, without fetching it
    ///
    /// # Errors
    ///
    /// Fails as a whole with [`crate::Error::InvalidSize`] if any size is not
    /// a byte count.
    pub fn dry_run(&self, selected: &ArchiveSet) -> Result<Vec<DryRunEntry>> {
        selected
            .iter()
            .map(|archive| {
                Ok(DryRunEntry {
                    name: archive.filename.clone(),
                    size: archive.size()?,
                })
            })
            .collect()
    }

    /// Output directory for a run: the configured one or a fresh temp dir
    pub fn output_dir(&self) -> Result<PathBuf> {
        utils::resolve_output_dir(self.config.output_dir.as_deref())
    }

    /// Where `archive` lands under `output_dir`
    pub fn destination_for(&self, output_dir: &Path, archive: &ArchiveDescriptor) -> PathBuf {
        destination_path(output_dir, archive, &self.chain)
    }

    /// Fetch every archive in `selected` into `output_dir`
    ///
    /// Per-archive failures are reported as [`Event::ArchiveFailed`] and
    /// counted in the summary; they do not fail the call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Filesystem`] if `output_dir` cannot be created.
    pub async fn download(&self, selected: ArchiveSet, output_dir: &Path) -> Result<RunSummary> {
        self.download_inner(selected, output_dir, None).await
    }

    /// Like [`ArchiveRetriever::download`], also delivering every event of
    /// this run to `events`
    ///
    /// Unlike [`ArchiveRetriever::subscribe`], nothing sent to `events` is
    /// dropped, however far the receiver falls behind.
    pub async fn download_with_events(
        &self,
        selected: ArchiveSet,
        output_dir: &Path,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<RunSummary> {
        self.download_inner(selected, output_dir, Some(events)).await
    }

    async fn download_inner(
        &self,
        selected: ArchiveSet,
        output_dir: &Path,
        events: Option<mpsc::UnboundedSender<Event>>,
    ) -> Result<RunSummary> {
        utils::ensure_dir(output_dir).await?;

        tracing::info!(
            archives = selected.len(),
            output_dir = %output_dir.display(),
            chain = %self.chain,
            "Starting download"
        );

        let fetcher = Arc::new(Fetcher::new(
            Arc::clone(&self.transport),
            self.chain.clone(),
            output_dir,
        ));
        let mut dispatcher = Dispatcher::new(self.config.workers, self.event_tx.clone());
        if let Some(events) = events {
            dispatcher = dispatcher.with_event_sink(events);
        }

        let summary = dispatcher
            .run(selected, move |archive| {
                let fetcher = Arc::clone(&fetcher);
                async move { fetcher.fetch(&archive).await }
            })
            .await;
        Ok(summary)
    }
}
