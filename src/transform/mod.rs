//! Streaming transforms applied to an archive body before it is written
//!
//! Every stage is a blocking [`std::io::BufRead`] adapter so stages compose by
//! plain wrapping and nothing ever holds more than one line in memory:
//! - [`decompress`] - gzip decoding with an eager header check
//! - [`line_filter`] - line-oriented filtering by substring or pattern
//! - [`chain`] - builds the ordered stage list from [`crate::config::StreamOptions`]

mod chain;
mod decompress;
mod line_filter;

pub use chain::{TransformChain, TransformedStream};
pub use decompress::{Decompressed, GZIP_SUFFIX, decompress};
pub use line_filter::{LineFilter, LineMatcher};
