//! `curl -v` output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

/// curl messages that mean no HTTP exchange took place.
const FAILURES: &[&str] = &[
    "Connection refused",
    "Could not resolve host",
    "Connection timed out",
    "Operation timed out",
    "Failed to connect",
    "No route to host",
    "Network is unreachable",
];

static STATUS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\s*HTTP/[\d.]+\s+(\d{3})").unwrap());
static HTML_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<html.*</html>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// Outcome of an HTTP GET issued through curl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpResult {
    /// Everything curl printed.
    pub raw: String,

    /// Status code of the last response, e.g. "200".
    pub code: String,

    /// Response body with markup removed.
    pub beautified_text: String,
}

impl HttpResult {
    /// Classify `curl -v` output.
    ///
    /// Transport failures (refused, unresolvable, timed out) are use-case
    /// failures carrying curl's own message.
    pub fn parse(output: &str) -> Result<Self> {
        if let Some(reason) = FAILURES.iter().find(|f| output.contains(*f)) {
            let line = output
                .lines()
                .find(|l| l.contains(reason))
                .unwrap_or(reason)
                .trim();
            return Err(Error::UseCase(format!(
                "Curl Failure due to the following reason {line}"
            )));
        }

        let code = STATUS_RE
            .captures_iter(output)
            .last()
            .map(|c| c[1].to_string())
            .ok_or_else(|| Error::UseCase("no HTTP status line in curl output".to_string()))?;

        Ok(Self {
            raw: output.to_string(),
            code,
            beautified_text: beautify(output),
        })
    }
}

fn beautify(output: &str) -> String {
    let body = match HTML_RE.find(output) {
        Some(m) => TAG_RE.replace_all(m.as_str(), "").into_owned(),
        None => output
            .lines()
            .filter(|l| !l.starts_with(['*', '<', '>', '{', '}']))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    BLANK_RE.replace_all(body.trim(), "\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_refused() {
        let output = "*   Trying 10.0.0.1:80...\n* connect to 10.0.0.1 port 80 failed: Connection refused\n\
                      curl: (7) Failed to connect to 10.0.0.1 port 80: Connection refused\n";
        let err = HttpResult::parse(output).unwrap_err();
        assert_eq!(err.kind(), "UseCaseFailure");
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_ok_response() {
        let output = "\
*   Trying 10.0.0.1:80...
> GET / HTTP/1.1
> Host: 10.0.0.1
>
< HTTP/1.1 200 OK
< Content-Type: text/html
<
<html><head><title>It works</title></head>
<body><h1>Hello</h1></body></html>
* Connection #0 to host 10.0.0.1 left intact
";
        let result = HttpResult::parse(output).unwrap();
        assert_eq!(result.code, "200");
        assert!(!result.beautified_text.is_empty());
        assert!(result.beautified_text.contains("It works"));
        assert!(result.beautified_text.contains("Hello"));
        assert!(!result.beautified_text.contains('<'));
    }

    #[test]
    fn test_redirect_uses_last_status() {
        let output = "< HTTP/1.1 301 Moved Permanently\n< Location: /new\n< HTTP/1.1 404 Not Found\n";
        assert_eq!(HttpResult::parse(output).unwrap().code, "404");
    }

    #[test]
    fn test_no_status() {
        assert!(HttpResult::parse("garbage").is_err());
    }
}
