//! Core types for ptarchive

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};

/// Archive size exactly as the catalog delivered it
///
/// Depending on the API version the catalog reports `filesize` either as a
/// JSON number or as a string holding a decimal byte count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSize {
    /// Numeric byte count
    Bytes(u64),
    /// Textual byte count, parsed lazily
    Text(String),
}

impl From<u64> for RawSize {
    fn from(n: u64) -> Self {
        RawSize::Bytes(n)
    }
}

impl From<&str> for RawSize {
    fn from(s: &str) -> Self {
        RawSize::Text(s.to_string())
    }
}

impl From<String> for RawSize {
    fn from(s: String) -> Self {
        RawSize::Text(s)
    }
}

/// Download link of an archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDownload {
    /// Absolute URL of the archive body
    pub href: String,
}

/// Hypermedia links attached to an archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLinks {
    /// Where the archive body can be fetched
    pub download: ArchiveDownload,
}

/// One remote archive as described by the catalog
///
/// Immutable once constructed. The only interior state is the memoized
/// parsed size, which is derived purely from `size` and therefore identical
/// no matter which thread computes it first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    /// Unique archive file name (e.g. `2019-06-01-10.tsv.gz`)
    pub filename: String,

    /// Size as received from the catalog
    #[serde(rename = "filesize")]
    pub size: RawSize,

    #[serde(skip)]
    size_cache: OnceLock<u64>,

    /// First instant covered by the archive
    pub start: DateTime<Utc>,

    /// Last instant covered by the archive
    pub end: DateTime<Utc>,

    /// Download locator
    #[serde(rename = "_links")]
    pub links: ArchiveLinks,

    /// Human-readable span length (e.g. "1 hour")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_formatted: Option<String>,

    /// Human-readable start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_formatted: Option<String>,
}

impl ArchiveDescriptor {
    /// Create a descriptor without display metadata
    pub fn new(
        filename: impl Into<String>,
        size: impl Into<RawSize>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        href: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size: size.into(),
            size_cache: OnceLock::new(),
            start,
            end,
            links: ArchiveLinks {
                download: ArchiveDownload { href: href.into() },
            },
            duration_formatted: None,
            start_formatted: None,
        }
    }

    /// Download locator of the archive body
    pub fn download_url(&self) -> &str {
        &self.links.download.href
    }

    /// Size in bytes, parsed once and memoized
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSize`] if the catalog sent a textual size that
    /// is not a non-negative integer.
    pub fn size(&self) -> Result<u64> {
        if let Some(n) = self.size_cache.get() {
            return Ok(*n);
        }

        let parsed = match &self.size {
            RawSize::Bytes(n) => *n,
            RawSize::Text(raw) => raw.trim().parse::<u64>().map_err(|_| Error::InvalidSize {
                filename: self.filename.clone(),
                raw: raw.clone(),
            })?,
        };

        Ok(*self.size_cache.get_or_init(|| parsed))
    }

    /// Whether this archive's span intersects `window`, both bounds inclusive
    #[must_use]
    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        overlaps(self, window)
    }
}

/// Inclusive interval overlap: `[as, ae]` meets `[bs, be]` iff
/// `as <= be && ae >= bs`.
///
/// Reversed spans on either side are not special-cased; they follow the
/// same formula.
#[must_use]
pub fn overlaps(archive: &ArchiveDescriptor, window: &TimeWindow) -> bool {
    archive.start <= window.end && archive.end >= window.start
}

/// Query time range
///
/// `start <= end` is expected but not enforced. An inverted window selects
/// whatever the overlap formula yields for it, which is usually nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Inclusive upper bound
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window from explicit bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of length `span` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, span: TimeDelta) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    /// The window of length `span` ending now
    pub fn last(span: TimeDelta) -> Self {
        Self::ending_at(Utc::now(), span)
    }

    /// Whether `archive` overlaps this window
    #[must_use]
    pub fn contains_archive(&self, archive: &ArchiveDescriptor) -> bool {
        overlaps(archive, self)
    }

    /// Predicate bound to this window, for use with [`ArchiveSet::matching`]
    pub fn matcher(self) -> impl Fn(&ArchiveDescriptor) -> bool {
        move |archive| self.contains_archive(archive)
    }
}

/// Ordered collection of archive descriptors
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "Vec<ArchiveDescriptor>")]
pub struct ArchiveSet {
    archives: Vec<Arc<ArchiveDescriptor>>,
}

impl ArchiveSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Archives accepted by `predicate`, in their original order
    #[must_use]
    pub fn matching<F>(&self, predicate: F) -> ArchiveSet
    where
        F: Fn(&ArchiveDescriptor) -> bool,
    {
        Self {
            archives: self
                .archives
                .iter()
                .filter(|a| predicate(a))
                .cloned()
                .collect(),
        }
    }

    /// Number of archives
    pub fn len(&self) -> usize {
        self.archives.len()
    }

    /// Whether the set holds no archives
    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    /// Sum of every archive's size
    ///
    /// # Errors
    ///
    /// Fails as a whole on the first archive whose size cannot be determined.
    pub fn total_size(&self) -> Result<u64> {
        self.archives
            .iter()
            .try_fold(0u64, |acc, a| Ok(acc.saturating_add(a.size()?)))
    }

    /// Iterate over the descriptors in order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ArchiveDescriptor>> {
        self.archives.iter()
    }

    /// Descriptor at `index`
    pub fn get(&self, index: usize) -> Option<&Arc<ArchiveDescriptor>> {
        self.archives.get(index)
    }
}

impl From<Vec<ArchiveDescriptor>> for ArchiveSet {
    fn from(archives: Vec<ArchiveDescriptor>) -> Self {
        Self {
            archives: archives.into_iter().map(Arc::new).collect(),
        }
    }
}

impl FromIterator<ArchiveDescriptor> for ArchiveSet {
    fn from_iter<I: IntoIterator<Item = ArchiveDescriptor>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl IntoIterator for ArchiveSet {
    type Item = Arc<ArchiveDescriptor>;
    type IntoIter = std::vec::IntoIter<Arc<ArchiveDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.archives.into_iter()
    }
}

impl<'a> IntoIterator for &'a ArchiveSet {
    type Item = &'a Arc<ArchiveDescriptor>;
    type IntoIter = std::slice::Iter<'a, Arc<ArchiveDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.archives.iter()
    }
}

/// One line of dry-run output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunEntry {
    /// Archive file name
    pub name: String,
    /// Archive size in bytes
    pub size: u64,
}

/// Outcome of a successful archive fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Archive file name
    pub name: String,
    /// File the transformed stream was written to
    pub path: PathBuf,
    /// Bytes written to `path`
    pub bytes_written: u64,
}

/// Completion report of a dispatcher run
///
/// Counts only. Individual failures are reported through [`Event::ArchiveFailed`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Workers actually spawned
    pub workers: usize,
    /// Archives handed to a worker
    pub dispatched: usize,
    /// Archives fetched successfully
    pub succeeded: usize,
    /// Archives that failed
    pub failed: usize,
}

/// Events emitted while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A worker picked up an archive
    ArchiveStarted {
        /// Index of the worker within the pool
        worker: usize,
        /// Archive file name
        name: String,
    },

    /// An archive was written to disk
    ArchiveComplete {
        /// Index of the worker within the pool
        worker: usize,
        /// Archive file name
        name: String,
        /// Destination file
        path: PathBuf,
        /// Bytes written
        bytes_written: u64,
    },

    /// An archive could not be fetched
    ArchiveFailed {
        /// Index of the worker within the pool
        worker: usize,
        /// Archive file name
        name: String,
        /// Error message
        error: String,
    },

    /// Every worker has exited
    RunFinished {
        /// Final counts
        summary: RunSummary,
    },
}
