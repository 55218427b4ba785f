//! Output buffer with optional tail-window search.
//!
//! Console output accumulates here between expectations. A match consumes
//! the buffer up to the end of the match; whatever follows stays for the
//! next `expect`. For very chatty consoles the search can be limited to
//! the last `search_depth` bytes, so a prompt is found without rescanning
//! megabytes of log output.

use bytes::{Bytes, BytesMut};

use super::patterns::{self, ExpectPattern, Found};

/// Buffer for accumulating console output and searching it for patterns.
#[derive(Debug)]
pub struct PatternBuffer {
    /// Unconsumed output.
    buffer: BytesMut,

    /// How many bytes from the end to search, `None` for the whole buffer.
    search_depth: Option<usize>,

    /// Whether ANSI escape sequences are removed on the way in.
    strip_ansi: bool,
}

impl PatternBuffer {
    /// Create a new pattern buffer.
    pub fn new(search_depth: Option<usize>, strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            strip_ansi,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        if !self.strip_ansi {
            self.buffer.extend_from_slice(data);
            return;
        }
        self.buffer.extend_from_slice(&strip_ansi_escapes::strip(data));
    }

    /// Find the earliest match of any pattern.
    ///
    /// Offsets in the returned [`Found`] are relative to the whole buffer.
    pub fn find(&self, patterns: &[ExpectPattern]) -> Option<Found> {
        let offset = match self.search_depth {
            Some(depth) => self.buffer.len().saturating_sub(depth),
            None => 0,
        };
        patterns::search(patterns, &self.buffer[offset..]).map(|mut found| {
            found.start += offset;
            found.end += offset;
            found
        })
    }

    /// Remove and return everything up to `end`.
    pub fn consume(&mut self, end: usize) -> Bytes {
        let end = end.min(self.buffer.len());
        self.buffer.split_to(end).freeze()
    }

    /// Drain everything, e.g. on EOF.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Unconsumed output, for timeout reports.
    pub fn pending_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(None, true)
    }
}
