//! Archive catalog retrieval.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::transport::{HttpClient, request_error};
use crate::types::ArchiveSet;

/// Source of the ordered list of available archives
#[async_trait]
pub trait ArchiveCatalog: Send + Sync {
    /// Fetch the full listing once
    async fn list_archives(&self) -> Result<ArchiveSet>;
}

/// A fixed listing, e.g. one loaded earlier or built in tests
#[async_trait]
impl ArchiveCatalog for ArchiveSet {
    async fn list_archives(&self) -> Result<ArchiveSet> {
        Ok(self.clone())
    }
}

/// Catalog served as JSON by the archive API
pub struct HttpCatalog {
    client: HttpClient,
    url: String,
}

impl HttpCatalog {
    /// Catalog at `url`, fetched with `client`
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ArchiveCatalog for HttpCatalog {
    async fn list_archives(&self) -> Result<ArchiveSet> {
        let response = self.client.get(&self.url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(&self.url, &e))?;

        let archives: ArchiveSet = serde_json::from_slice(&body).map_err(Error::Serialization)?;
        tracing::debug!(url = %self.url, archives = archives.len(), "Fetched archive catalog");
        Ok(archives)
    }
}
