//! Line-oriented filtering of a byte stream.

use std::io::{self, BufRead, Read};

use crate::error::{Error, Result};

/// Line predicate used by [`LineFilter`]
///
/// The trailing line terminator (`\n` or `\r\n`) is not part of the text the
/// predicate sees, so `$` in a pattern anchors at the end of the line content.
#[derive(Clone, Debug)]
pub enum LineMatcher {
    /// Case-sensitive containment of a literal, searched as an escaped pattern
    Substring(regex::bytes::Regex),
    /// Regular-expression match on the line bytes
    Pattern(regex::bytes::Regex),
}

impl LineMatcher {
    /// Matcher for plain substring containment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `needle` exceeds the compiled size limit.
    pub fn substring(needle: &str) -> Result<Self> {
        regex::bytes::Regex::new(&regex::escape(needle))
            .map(LineMatcher::Substring)
            .map_err(|e| Error::config("substring", format!("invalid substring filter: {}", e)))
    }

    /// Compile a pattern matcher
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `pattern` is not a valid regular expression.
    pub fn pattern(pattern: &str) -> Result<Self> {
        regex::bytes::Regex::new(pattern)
            .map(LineMatcher::Pattern)
            .map_err(|e| Error::config("pattern", format!("invalid pattern '{}': {}", pattern, e)))
    }

    /// Whether `line` is accepted
    pub fn is_match(&self, line: &[u8]) -> bool {
        let content = strip_terminator(line);
        match self {
            LineMatcher::Substring(re) | LineMatcher::Pattern(re) => re.is_match(content),
        }
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Byte source that yields only the lines of `inner` accepted by a matcher
///
/// Emitted lines keep their `\n` terminator. A final fragment without a
/// terminator is emitted as-is if it matches. If `inner` fails while a line
/// is being read, the error is returned and the partial line is dropped.
///
/// `LineFilter` is itself [`BufRead`], so filters stack without extra
/// buffering.
pub struct LineFilter<R> {
    inner: R,
    matcher: LineMatcher,
    line: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: BufRead> LineFilter<R> {
    /// Wrap `inner`, keeping lines accepted by `matcher`
    pub fn new(inner: R, matcher: LineMatcher) -> Self {
        Self {
            inner,
            matcher,
            line: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Unwrap the underlying reader, discarding any pending line
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> BufRead for LineFilter<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.line.len() {
            if self.done {
                return Ok(&[]);
            }

            self.line.clear();
            self.pos = 0;

            match self.inner.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    if !self.matcher.is_match(&self.line) {
                        self.line.clear();
                    }
                }
                Err(e) => {
                    self.line.clear();
                    return Err(e);
                }
            }
        }

        Ok(&self.line[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.line.len());
    }
}

impl<R: BufRead> Read for LineFilter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}
