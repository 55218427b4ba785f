//! Scripted send/expect sequences.
//!
//! Some dialogues need more than "command, then prompt": bootloader menus,
//! `kermit` initialisation, `passwd`. An interactive sequence sends each
//! input and waits for that step's pattern before moving on.

use std::time::{Duration, Instant};

use regex::bytes::Regex;

use super::patterns::ExpectPattern;
use super::pty::{Console, normalize_newlines};
use crate::error::Result;

/// One step of an interactive sequence.
///
/// # Example
///
/// ```rust
/// use boardfarm::console::InteractiveEvent;
///
/// let events = vec![
///     InteractiveEvent::new("passwd", r"New password:").unwrap(),
///     InteractiveEvent::hidden("s3cret", r"Retype new password:").unwrap(),
///     InteractiveEvent::hidden("s3cret", r"#\s*$").unwrap(),
/// ];
/// assert!(events[1].hidden);
/// ```
#[derive(Debug, Clone)]
pub struct InteractiveEvent {
    /// The line to send.
    pub input: String,

    /// Pattern to wait for after sending.
    pub pattern: Regex,

    /// Keep the input out of logs (passwords).
    pub hidden: bool,

    /// Timeout override for this step.
    pub timeout: Option<Duration>,
}

impl InteractiveEvent {
    /// Create a new step.
    pub fn new(input: impl Into<String>, pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            input: input.into(),
            pattern: Regex::new(pattern)?,
            hidden: false,
            timeout: None,
        })
    }

    /// Create a step whose input is not logged.
    pub fn hidden(input: impl Into<String>, pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            hidden: true,
            ..Self::new(input, pattern)?
        })
    }

    /// Wait at most `timeout` for this step's pattern.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Output of one step.
#[derive(Debug, Clone)]
pub struct InteractiveStep {
    /// What was typed; `********` for hidden steps.
    pub input: String,

    /// Output received before the step's pattern, newlines normalised.
    pub output: String,

    pub elapsed: Duration,
}

/// Result of a whole sequence.
#[derive(Debug, Clone)]
pub struct InteractiveResult {
    pub steps: Vec<InteractiveStep>,

    pub elapsed: Duration,
}

impl InteractiveResult {
    /// Output of the final step.
    pub fn final_output(&self) -> Option<&str> {
        self.steps.last().map(|s| s.output.as_str())
    }

    /// Every step's output, in order.
    pub fn full_output(&self) -> String {
        self.steps.iter().map(|s| s.output.as_str()).collect()
    }
}

/// Fluent construction of an interactive sequence.
#[derive(Debug, Default)]
pub struct InteractiveBuilder {
    events: Vec<InteractiveEvent>,
    default_timeout: Option<Duration>,
    error: Option<regex::Error>,
}

impl InteractiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step.
    pub fn step(mut self, input: impl Into<String>, pattern: &str) -> Self {
        match InteractiveEvent::new(input, pattern) {
            Ok(event) => self.events.push(event),
            Err(e) => self.error = self.error.or(Some(e)),
        }
        self
    }

    /// Add a step with hidden input.
    pub fn hidden_step(mut self, input: impl Into<String>, pattern: &str) -> Self {
        match InteractiveEvent::hidden(input, pattern) {
            Ok(event) => self.events.push(event),
            Err(e) => self.error = self.error.or(Some(e)),
        }
        self
    }

    /// Default timeout for steps without their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Finish the sequence, failing on the first invalid pattern.
    pub fn build(self) -> std::result::Result<Vec<InteractiveEvent>, regex::Error> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let default_timeout = self.default_timeout;
        Ok(self
            .events
            .into_iter()
            .map(|mut e| {
                e.timeout = e.timeout.or(default_timeout);
                e
            })
            .collect())
    }
}

impl Console {
    /// Run a send/expect sequence, stopping at the first failing step.
    pub async fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<InteractiveResult> {
        let start = Instant::now();
        let mut steps = Vec::with_capacity(events.len());

        for event in events {
            let step_start = Instant::now();
            if event.hidden {
                self.sendline_hidden(&event.input).await?;
            } else {
                self.sendline(&event.input).await?;
            }
            self.expect(&[ExpectPattern::Regex(event.pattern.clone())], event.timeout)
                .await?;

            steps.push(InteractiveStep {
                input: if event.hidden {
                    "********".to_string()
                } else {
                    event.input.clone()
                },
                output: normalize_newlines(self.before()),
                elapsed: step_start.elapsed(),
            });
        }

        Ok(InteractiveResult {
            steps,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults() {
        let event = InteractiveEvent::new("reboot", r"confirm").unwrap();
        assert_eq!(event.input, "reboot");
        assert!(!event.hidden);
        assert!(event.timeout.is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(InteractiveEvent::new("x", r"(unclosed").is_err());
        assert!(InteractiveBuilder::new().step("x", "(").build().is_err());
    }

    #[test]
    fn test_builder_applies_default_timeout() {
        let events = InteractiveBuilder::new()
            .step("set telnet wait off", r"C-Kermit>")
            .hidden_step("secret", r"#")
            .with_timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(!events[0].hidden);
        assert!(events[1].hidden);
        assert_eq!(events[0].timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_output_accessors() {
        let result = InteractiveResult {
            steps: vec![
                InteractiveStep {
                    input: "a".into(),
                    output: "one".into(),
                    elapsed: Duration::from_millis(1),
                },
                InteractiveStep {
                    input: "b".into(),
                    output: "two".into(),
                    elapsed: Duration::from_millis(1),
                },
            ],
            elapsed: Duration::from_millis(2),
        };
        assert_eq!(result.final_output(), Some("two"));
        assert_eq!(result.full_output(), "onetwo");
    }

    #[tokio::test]
    async fn test_send_interactive_against_mock() {
        let mock = tokio_test::io::Builder::new()
            .write(b"set telnet wait off\n")
            .read(b"set telnet wait off\r\nC-Kermit>")
            .write(b"connect\n")
            .read(b"connect\r\nConnecting...\r\nlogin: ")
            .build();
        let mut console = Console::from_stream("kermit", mock, Default::default());

        let events = InteractiveBuilder::new()
            .step("set telnet wait off", r"C-Kermit>")
            .step("connect", r"login: ")
            .build()
            .unwrap();
        let result = console.send_interactive(&events).await.unwrap();

        assert_eq!(result.steps.len(), 2);
        assert!(result.final_output().unwrap().contains("Connecting..."));
    }
}
