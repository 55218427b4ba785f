//! Expectation patterns for console matching.

use std::fmt;

use memchr::memmem;
use regex::bytes::Regex;

/// Something `expect` can wait for.
///
/// `Timeout` and `Eof` are sentinels: when present in the pattern list,
/// the corresponding condition returns its index instead of failing.
#[derive(Debug, Clone)]
pub enum ExpectPattern {
    /// A regular expression searched anywhere in the unread output.
    Regex(Regex),

    /// A literal byte string.
    Exact(Vec<u8>),

    /// Matches when the deadline passes.
    Timeout,

    /// Matches when the child closes the terminal.
    Eof,
}

/// Where a pattern matched inside the searched bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// Index of the matched pattern in the list passed to `expect`.
    pub index: usize,

    /// Byte offset where the match starts.
    pub start: usize,

    /// Byte offset where the match ends.
    pub end: usize,

    /// Capture groups (regex patterns only), group 0 excluded.
    pub groups: Vec<Option<String>>,
}

impl ExpectPattern {
    /// Compile a regex pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Build a literal pattern.
    pub fn exact(text: impl AsRef<[u8]>) -> Self {
        Self::Exact(text.as_ref().to_vec())
    }

    /// Whether this is one of the `Timeout`/`Eof` sentinels.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Timeout | Self::Eof)
    }

    /// Find the first match of this pattern in `data`.
    ///
    /// Returns `(start, end, groups)`; sentinels never match data.
    fn find(&self, data: &[u8]) -> Option<(usize, usize, Vec<Option<String>>)> {
        match self {
            Self::Regex(re) => {
                let caps = re.captures(data)?;
                let whole = caps.get(0)?;
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|g| g.map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned()))
                    .collect();
                Some((whole.start(), whole.end(), groups))
            }
            Self::Exact(needle) => {
                if needle.is_empty() {
                    return None;
                }
                memmem::find(data, needle).map(|pos| (pos, pos + needle.len(), Vec::new()))
            }
            Self::Timeout | Self::Eof => None,
        }
    }
}

impl fmt::Display for ExpectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
            Self::Exact(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Eof => write!(f, "EOF"),
        }
    }
}

impl From<Regex> for ExpectPattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

/// Search `data` for the earliest match among `patterns`.
///
/// The match starting first wins; on a tie the lower index wins. This
/// mirrors how an operator reads a terminal: whatever appears first is
/// what the device said.
pub fn search(patterns: &[ExpectPattern], data: &[u8]) -> Option<Found> {
    let mut best: Option<Found> = None;
    for (index, pattern) in patterns.iter().enumerate() {
        if let Some((start, end, groups)) = pattern.find(data) {
            let better = match &best {
                Some(b) => start < b.start,
                None => true,
            };
            if better {
                best = Some(Found {
                    index,
                    start,
                    end,
                    groups,
                });
            }
        }
    }
    best
}

/// Index of a sentinel in the pattern list, if present.
pub fn sentinel_index(patterns: &[ExpectPattern], sentinel: &ExpectPattern) -> Option<usize> {
    patterns
        .iter()
        .position(|p| std::mem::discriminant(p) == std::mem::discriminant(sentinel))
}

/// Render a pattern list for error messages.
pub fn describe(patterns: &[ExpectPattern]) -> String {
    let parts: Vec<String> = patterns.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

/// Compile a list of regex strings into expect patterns.
pub fn compile_all(patterns: &[&str]) -> Result<Vec<ExpectPattern>, regex::Error> {
    patterns.iter().map(|p| ExpectPattern::regex(p)).collect()
}

/// Compile a list of prompt regex strings.
pub fn compile_prompts<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_match_wins() {
        let patterns = compile_all(&[r"world", r"hello"]).unwrap();
        let found = search(&patterns, b"hello world").unwrap();
        assert_eq!(found.index, 1);
        assert_eq!((found.start, found.end), (0, 5));
    }

    #[test]
    fn test_tie_goes_to_lower_index() {
        let patterns = compile_all(&[r"ab", r"a"]).unwrap();
        let found = search(&patterns, b"xxab").unwrap();
        assert_eq!(found.index, 0);
    }

    #[test]
    fn test_exact_is_literal() {
        let patterns = vec![ExpectPattern::exact("(yes/no)?")];
        let found = search(&patterns, b"continue connecting (yes/no)? ").unwrap();
        assert_eq!(found.index, 0);
        assert_eq!(found.start, 20);
    }

    #[test]
    fn test_groups_are_captured() {
        let patterns = compile_all(&[r"inet (\d+\.\d+\.\d+\.\d+)"]).unwrap();
        let found = search(&patterns, b"  inet 10.0.0.1/24 brd").unwrap();
        assert_eq!(found.groups, vec![Some("10.0.0.1".to_string())]);
    }

    #[test]
    fn test_sentinels_never_match_data() {
        let patterns = vec![ExpectPattern::Timeout, ExpectPattern::Eof];
        assert!(search(&patterns, b"TIMEOUT EOF").is_none());
        assert_eq!(sentinel_index(&patterns, &ExpectPattern::Eof), Some(1));
    }

    #[test]
    fn test_describe() {
        let patterns = vec![
            ExpectPattern::regex(r"#\s*$").unwrap(),
            ExpectPattern::Timeout,
        ];
        assert_eq!(describe(&patterns), r"[/#\s*$/, TIMEOUT]");
    }
}
