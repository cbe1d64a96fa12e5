//! Fetch worker: stream one archive through its transform chain onto disk.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::io::SyncIoBridge;

use crate::error::{Error, Result};
use crate::transform::{GZIP_SUFFIX, TransformChain};
use crate::transport::ArchiveTransport;
use crate::types::{ArchiveDescriptor, FetchReport};

/// Where `archive` is written under `output_dir`
///
/// The archive's own file name is kept, minus a trailing `.gz` when the
/// chain decompresses it.
pub fn destination_path(
    output_dir: &Path,
    archive: &ArchiveDescriptor,
    chain: &TransformChain,
) -> PathBuf {
    let name = if chain.decompresses() {
        archive
            .filename
            .strip_suffix(GZIP_SUFFIX)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(&archive.filename)
    } else {
        &archive.filename
    };
    output_dir.join(name)
}

/// Fetch one archive to `destination`
///
/// Issues exactly one read request. The body is decoded and filtered on a
/// blocking thread while it streams in; the destination file is created only
/// once the chain has accepted the start of the body. A failure part-way
/// through the copy leaves the partial file in place.
///
/// # Errors
///
/// - [`Error::Transport`] if the request fails or the status is not successful
/// - [`Error::Format`] if the body should be gzip and is not
/// - [`Error::Filesystem`] if `destination` cannot be created
/// - [`Error::Io`] if reading the body or writing the file fails mid-copy
pub async fn fetch_archive(
    transport: &dyn ArchiveTransport,
    archive: &ArchiveDescriptor,
    chain: &TransformChain,
    destination: &Path,
) -> Result<FetchReport> {
    tracing::debug!(
        archive = %archive.filename,
        chain = %chain,
        destination = %destination.display(),
        "Requesting archive"
    );

    let body = transport.open_for_read(archive.download_url()).await?;
    let body = SyncIoBridge::new(body);

    let chain = chain.clone();
    let path = destination.to_path_buf();
    let bytes_written =
        tokio::task::spawn_blocking(move || write_transformed(body, &chain, &path)).await??;

    Ok(FetchReport {
        name: archive.filename.clone(),
        path: destination.to_path_buf(),
        bytes_written,
    })
}

fn write_transformed<R>(body: R, chain: &TransformChain, destination: &Path) -> Result<u64>
where
    R: Read + Send + 'static,
{
    let mut stream = chain.apply(body)?;

    let mut file = File::create(destination).map_err(|source| Error::Filesystem {
        path: destination.to_path_buf(),
        source,
    })?;

    let written = io::copy(&mut stream, &mut file)?;
    file.flush()?;
    Ok(written)
}

/// Fetch worker bound to one transport, chain and output directory
pub struct Fetcher {
    transport: Arc<dyn ArchiveTransport>,
    chain: TransformChain,
    output_dir: PathBuf,
}

impl Fetcher {
    /// Create a fetcher writing under `output_dir`
    pub fn new(
        transport: Arc<dyn ArchiveTransport>,
        chain: TransformChain,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            chain,
            output_dir: output_dir.into(),
        }
    }

    /// Destination of `archive` for this fetcher
    pub fn destination_for(&self, archive: &ArchiveDescriptor) -> PathBuf {
        destination_path(&self.output_dir, archive, &self.chain)
    }

    /// Fetch `archive` into the output directory
    pub async fn fetch(&self, archive: &ArchiveDescriptor) -> Result<FetchReport> {
        let destination = self.destination_for(archive);
        fetch_archive(self.transport.as_ref(), archive, &self.chain, &destination).await
    }
}
