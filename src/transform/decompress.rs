//! Gzip decoding of archive bodies.

use flate2::bufread::MultiGzDecoder;
use std::io::{self, BufReader, Chain, Cursor, Read};

use crate::error::{Error, Result};

/// File name suffix of gzip-compressed archives
pub const GZIP_SUFFIX: &str = ".gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reader returned by [`decompress`]
pub type Decompressed<R> = BufReader<MultiGzDecoder<BufReader<Chain<Cursor<[u8; 2]>, R>>>>;

/// Wrap `reader` in a gzip decoder
///
/// The whole gzip header of the first member is read and checked before this
/// returns, so a body that is not gzip (an empty response, plain text served
/// under a `.gz` name, a corrupt header) is rejected before anything
/// downstream, such as the destination file, is created. Concatenated gzip
/// members are decoded in sequence.
///
/// # Errors
///
/// Returns [`Error::Format`] if the stream is shorter than the gzip magic,
/// does not start with it or carries an invalid header, and [`Error::Io`] if
/// reading the magic fails.
pub fn decompress<R: Read>(mut reader: R) -> Result<Decompressed<R>> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::Format("stream ended before the gzip header".to_string())
        }
        _ => Error::Io(e),
    })?;

    if magic != GZIP_MAGIC {
        return Err(Error::Format(format!(
            "not a gzip stream (starts with {:02x} {:02x})",
            magic[0], magic[1]
        )));
    }

    // The bufread decoder parses the header on construction.
    let decoder = MultiGzDecoder::new(BufReader::new(Cursor::new(magic).chain(reader)));
    if decoder.header().is_none() {
        return Err(Error::Format("invalid gzip header".to_string()));
    }

    Ok(BufReader::new(decoder))
}
