//! Ordered composition of stream transforms.

use std::fmt;
use std::io::{BufRead, BufReader, Read};

use super::decompress::decompress;
use super::line_filter::{LineFilter, LineMatcher};
use crate::config::StreamOptions;
use crate::error::Result;

/// Transformed archive body, owned by the fetch that built it
pub type TransformedStream = Box<dyn BufRead + Send>;

/// Stage list derived from [`StreamOptions`]
///
/// Order is fixed: gunzip, then substring filter, then pattern filter.
/// Building the chain compiles the pattern, so a bad pattern surfaces before
/// any archive is requested. The chain itself is immutable and is shared by
/// every worker of a run.
#[derive(Clone, Debug)]
pub struct TransformChain {
    decompress: bool,
    substring: Option<LineMatcher>,
    pattern: Option<LineMatcher>,
}

impl TransformChain {
    /// Build the chain for `options`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if a line filter does not compile.
    pub fn new(options: &StreamOptions) -> Result<Self> {
        let substring = options.substring().map(LineMatcher::substring).transpose()?;
        let pattern = options.pattern().map(LineMatcher::pattern).transpose()?;

        Ok(Self {
            decompress: options.effective_decompress(),
            substring,
            pattern,
        })
    }

    /// Chain that copies bytes through untouched
    pub fn passthrough() -> Self {
        Self {
            decompress: false,
            substring: None,
            pattern: None,
        }
    }

    /// Whether the first stage is gzip decoding
    pub fn decompresses(&self) -> bool {
        self.decompress
    }

    /// Wrap `reader` in every configured stage
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Format`] if decompression is on and `reader`
    /// does not carry a gzip stream.
    pub fn apply<R>(&self, reader: R) -> Result<TransformedStream>
    where
        R: Read + Send + 'static,
    {
        let mut stream: TransformedStream = if self.decompress {
            Box::new(decompress(reader)?)
        } else {
            Box::new(BufReader::new(reader))
        };

        if let Some(matcher) = &self.substring {
            stream = Box::new(LineFilter::new(stream, matcher.clone()));
        }
        if let Some(matcher) = &self.pattern {
            stream = Box::new(LineFilter::new(stream, matcher.clone()));
        }

        Ok(stream)
    }
}

impl fmt::Display for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages = Vec::new();
        if self.decompress {
            stages.push("gunzip");
        }
        if self.substring.is_some() {
            stages.push("substring");
        }
        if self.pattern.is_some() {
            stages.push("pattern");
        }
        if stages.is_empty() {
            stages.push("copy");
        }
        write!(f, "{}", stages.join(" -> "))
    }
}
