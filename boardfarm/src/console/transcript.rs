//! Console transcripts.
//!
//! A [`Transcript`] tees every received byte to a log file. Writes go
//! straight to the file (no userspace buffering), so `tail -f` on the
//! log follows the console live. [`RecentOutput`] keeps the last few
//! kilobytes in memory for fatal-error reports.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::warn;

/// File sink for a console's raw output.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: Option<File>,
}

impl Transcript {
    /// Create (or append to) the transcript file, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Append raw bytes. A write failure disables the transcript instead of
    /// failing the console.
    pub fn record(&mut self, data: &[u8]) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(data) {
                warn!("transcript {} disabled: {}", self.path.display(), e);
                self.file = None;
            }
        }
    }

    /// Path of the transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bounded in-memory copy of the most recent output.
#[derive(Debug)]
pub struct RecentOutput {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl RecentOutput {
    /// Keep at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record received bytes, evicting the oldest.
    pub fn push(&mut self, data: &[u8]) {
        for &b in data {
            if self.bytes.len() == self.capacity {
                self.bytes.pop_front();
            }
            self.bytes.push_back(b);
        }
    }

    /// The last `n` lines, carriage returns removed.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let (a, b) = self.bytes.as_slices();
        let mut raw = Vec::with_capacity(a.len() + b.len());
        raw.extend_from_slice(a);
        raw.extend_from_slice(b);
        let text = String::from_utf8_lossy(&strip_ansi_escapes::strip(&raw)).replace('\r', "");
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(n);
        lines[skip..].iter().map(|l| (*l).to_string()).collect()
    }
}

impl Default for RecentOutput {
    fn default() -> Self {
        Self::new(16 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_output_tail() {
        let mut recent = RecentOutput::new(64);
        recent.push(b"one\r\ntwo\r\nthree\r\nbft# ");
        assert_eq!(recent.tail(2), vec!["three", "bft# "]);
    }

    #[test]
    fn test_recent_output_evicts() {
        let mut recent = RecentOutput::new(4);
        recent.push(b"abcdef");
        assert_eq!(recent.tail(1), vec!["cdef"]);
    }

    #[test]
    fn test_transcript_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("lan.console.log");
        let mut transcript = Transcript::create(&path).unwrap();
        transcript.record(b"hello ");
        transcript.record(b"world");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
        assert_eq!(transcript.path(), path.as_path());
    }
}
