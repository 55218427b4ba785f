//! Interactive console over a spawned child process.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use log::{debug, trace, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::patterns::{self, ExpectPattern, Found};
use super::transcript::{RecentOutput, Transcript};
use crate::error::{ConsoleError, Error, Result};

/// Default timeout for blocking console calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `close()` waits for the child after sending the logout command.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Upper bound on prompts answered by `login()` before giving up.
const MAX_LOGIN_STEPS: usize = 4;

/// Linux reports a hung-up PTY master as EIO rather than a zero-length read.
const EIO: i32 = 5;

/// Anything the console can talk to: a PTY master, or an in-memory pipe in tests.
pub trait ConsoleStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> ConsoleStream for T {}

/// Per-console behaviour.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Default timeout for `expect` and friends.
    pub timeout: Duration,

    /// Delay between characters when sending (flaky serial lines).
    pub char_delay: Option<Duration>,

    /// Strip ANSI escape sequences before matching.
    pub strip_ansi: bool,

    /// Limit pattern search to the last N bytes of unread output.
    pub search_depth: Option<usize>,

    /// Echo everything received to stdout.
    pub echo_stdout: bool,

    /// Command sent by `close()` before terminating the child.
    pub logout_command: Option<String>,

    /// PTY width in columns.
    pub terminal_width: u16,

    /// PTY height in rows.
    pub terminal_height: u16,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            char_delay: None,
            strip_ansi: true,
            search_depth: None,
            echo_stdout: false,
            logout_command: None,
            terminal_width: 511,
            terminal_height: 24,
        }
    }
}

/// Command line of the child process behind a console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program to execute.
    pub program: String,

    /// Arguments.
    pub args: Vec<String>,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    /// Create a spec for a program with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Build a spec from an argv vector.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.as_ref().to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            env: Vec::new(),
        })
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The full command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The last successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectMatch {
    /// Index of the matched pattern.
    pub index: usize,

    /// The matched text.
    pub text: String,

    /// Capture groups, group 0 excluded.
    pub groups: Vec<Option<String>>,
}

impl ExpectMatch {
    /// Capture group `n` (1-based, as in regex syntax).
    pub fn group(&self, n: usize) -> Option<&str> {
        self.groups.get(n.checked_sub(1)?)?.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleState {
    Open,
    Eof,
    Closed,
}

enum ReadOutcome {
    Data,
    Eof,
    Timeout,
}

/// A child process driven as a line-oriented duplex channel.
///
/// Every blocking call takes `&mut self`, so at most one send-and-expect
/// cycle is outstanding on a console at any time.
pub struct Console {
    name: String,
    config: ConsoleConfig,
    stream: Option<Box<dyn ConsoleStream>>,
    child: Option<Child>,
    buffer: PatternBuffer,
    prompts: Vec<Regex>,
    saved_prompts: Vec<Vec<Regex>>,
    transcript: Option<Transcript>,
    recent: RecentOutput,
    before: String,
    after: String,
    last_match: Option<ExpectMatch>,
    pending_cleanup: Vec<String>,
    state: ConsoleState,
    exit_status: Option<ExitStatus>,
}

impl Console {
    /// Spawn `spec` inside a fresh PTY.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(name: impl Into<String>, spec: &SpawnSpec, config: ConsoleConfig) -> Result<Self> {
        let name = name.into();
        let command = spec.command_line();
        let fail = |message: String| ConsoleError::SpawnFailed {
            console: name.clone(),
            command: command.clone(),
            message,
        };

        let pty = pty_process::Pty::new().map_err(|e| fail(e.to_string()))?;
        pty.resize(pty_process::Size::new(
            config.terminal_height,
            config.terminal_width,
        ))
        .map_err(|e| fail(e.to_string()))?;

        let mut cmd = pty_process::Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.env("TERM", "xterm");
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let pts = pty.pts().map_err(|e| fail(e.to_string()))?;
        let child = cmd.spawn(&pts).map_err(|e| fail(e.to_string()))?;

        debug!("[{}] spawned: {}", name, command);
        Ok(Self::with_parts(name, Box::new(pty), Some(child), config))
    }

    /// Wrap an existing duplex stream (no child process).
    pub fn from_stream<S: ConsoleStream + 'static>(
        name: impl Into<String>,
        stream: S,
        config: ConsoleConfig,
    ) -> Self {
        Self::with_parts(name.into(), Box::new(stream), None, config)
    }

    fn with_parts(
        name: String,
        stream: Box<dyn ConsoleStream>,
        child: Option<Child>,
        config: ConsoleConfig,
    ) -> Self {
        Self {
            buffer: PatternBuffer::new(config.search_depth, config.strip_ansi),
            name,
            config,
            stream: Some(stream),
            child,
            prompts: Vec::new(),
            saved_prompts: Vec::new(),
            transcript: None,
            recent: RecentOutput::default(),
            before: String::new(),
            after: String::new(),
            last_match: None,
            pending_cleanup: Vec::new(),
            state: ConsoleState::Open,
            exit_status: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Console name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text between the last send and the latest match.
    pub fn before(&self) -> &str {
        &self.before
    }

    /// The matched text of the latest expectation.
    pub fn after(&self) -> &str {
        &self.after
    }

    /// Details of the latest successful match.
    pub fn last_match(&self) -> Option<&ExpectMatch> {
        self.last_match.as_ref()
    }

    /// Current prompt set.
    pub fn prompts(&self) -> &[Regex] {
        &self.prompts
    }

    /// Replace the prompt set.
    pub fn set_prompts(&mut self, prompts: Vec<Regex>) {
        self.prompts = prompts;
    }

    /// Replace the prompt set from regex strings.
    pub fn set_prompt_patterns<S: AsRef<str>>(&mut self, prompts: &[S]) -> Result<()> {
        self.prompts = patterns::compile_prompts(prompts).map_err(ConsoleError::from)?;
        Ok(())
    }

    /// Temporarily prepend extra prompts; undo with [`restore_prompts`](Self::restore_prompts).
    pub fn push_prompts(&mut self, extra: Vec<Regex>) {
        let previous = self.prompts.clone();
        let mut prompts = extra;
        prompts.extend(previous.iter().cloned());
        self.saved_prompts.push(previous);
        self.prompts = prompts;
    }

    /// Restore the prompt set saved by the last `push_prompts`.
    pub fn restore_prompts(&mut self) {
        if let Some(previous) = self.saved_prompts.pop() {
            self.prompts = previous;
        }
    }

    /// Default timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Set the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Set the per-character send delay.
    pub fn set_char_delay(&mut self, delay: Option<Duration>) {
        self.config.char_delay = delay;
    }

    /// Configuration of this console.
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Start teeing received bytes to `path`.
    pub fn attach_transcript(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let transcript = Transcript::create(path).map_err(ConsoleError::from)?;
        debug!("[{}] transcript: {}", self.name, transcript.path().display());
        self.transcript = Some(transcript);
        Ok(())
    }

    /// Path of the transcript file, if any.
    pub fn transcript_path(&self) -> Option<&std::path::Path> {
        self.transcript.as_ref().map(Transcript::path)
    }

    /// The last `n` lines received, for error reports.
    pub fn transcript_tail(&self, n: usize) -> Vec<String> {
        self.recent.tail(n)
    }

    /// Whether the child is still connected.
    pub fn is_alive(&self) -> bool {
        self.state == ConsoleState::Open
    }

    /// Whether `close()` has completed.
    pub fn is_closed(&self) -> bool {
        self.state == ConsoleState::Closed
    }

    /// Exit code of the child, once it has been reaped.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status.and_then(|s| s.code())
    }

    /// Queue a command to run before the next `execute_command`.
    ///
    /// Used by scoped helpers whose guard was dropped without being
    /// released explicitly.
    pub fn defer_cleanup(&mut self, command: impl Into<String>) {
        self.pending_cleanup.push(command.into());
    }

    /// Commands still waiting in the cleanup queue.
    pub fn pending_cleanup(&self) -> &[String] {
        &self.pending_cleanup
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Write raw text to the child.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        trace!("[{}] send: {:?}", self.name, text);
        self.write_bytes(text.as_bytes()).await
    }

    /// Write `line` followed by a newline.
    pub async fn sendline(&mut self, line: &str) -> Result<()> {
        debug!("[{}] sendline: {:?}", self.name, line);
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write_bytes(&data).await
    }

    /// Write a line without logging its content.
    pub async fn sendline_hidden(&mut self, line: &str) -> Result<()> {
        debug!("[{}] sendline: ********", self.name);
        let mut data = line.as_bytes().to_vec();
        data.push(b'\n');
        self.write_bytes(&data).await
    }

    /// Write a secret followed by a newline without logging it.
    pub async fn sendline_secret(&mut self, secret: &SecretString) -> Result<()> {
        self.sendline_hidden(secret.expose_secret()).await
    }

    /// Send a control character, e.g. `'c'` for Ctrl-C.
    pub async fn sendcontrol(&mut self, c: char) -> Result<()> {
        if !c.is_ascii() {
            return Err(Error::Boardfarm(format!(
                "cannot send control character for {c:?}"
            )));
        }
        let byte = (c.to_ascii_lowercase() as u8) & 0x1f;
        debug!("[{}] sendcontrol: ^{}", self.name, c.to_ascii_uppercase());
        self.write_bytes(&[byte]).await
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let name = self.name.clone();
        if self.state != ConsoleState::Open {
            return Err(self.not_open_error());
        }
        let delay = self.config.char_delay;
        let stream = self
            .stream
            .as_mut()
            .ok_or(ConsoleError::Closed { console: name })?;

        match delay {
            Some(delay) if !delay.is_zero() => {
                for byte in data {
                    stream
                        .write_all(std::slice::from_ref(byte))
                        .await
                        .map_err(ConsoleError::from)?;
                    stream.flush().await.map_err(ConsoleError::from)?;
                    tokio::time::sleep(delay).await;
                }
            }
            _ => {
                stream.write_all(data).await.map_err(ConsoleError::from)?;
                stream.flush().await.map_err(ConsoleError::from)?;
            }
        }
        Ok(())
    }

    fn not_open_error(&self) -> Error {
        match self.state {
            ConsoleState::Eof => ConsoleError::Eof {
                console: self.name.clone(),
            }
            .into(),
            _ => ConsoleError::Closed {
                console: self.name.clone(),
            }
            .into(),
        }
    }

    // ------------------------------------------------------------------
    // Expecting
    // ------------------------------------------------------------------

    /// Consume output until one of `patterns` matches; return its index.
    ///
    /// `timeout` of `None` uses the console default. Fails with a timeout
    /// or EOF error unless the list contains the matching sentinel.
    pub async fn expect(
        &mut self,
        patterns: &[ExpectPattern],
        timeout: Option<Duration>,
    ) -> Result<usize> {
        if patterns.is_empty() {
            return Err(ConsoleError::EmptyPatternList {
                console: self.name.clone(),
            }
            .into());
        }
        if self.state == ConsoleState::Closed {
            return Err(self.not_open_error());
        }

        let timeout = timeout.unwrap_or(self.config.timeout);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(found) = self.buffer.find(patterns) {
                return Ok(self.record_match(found));
            }
            if self.state == ConsoleState::Eof {
                return self.on_eof(patterns).await;
            }
            match self.read_chunk(deadline).await? {
                ReadOutcome::Data => {}
                ReadOutcome::Eof => {
                    debug!("[{}] EOF", self.name);
                    self.state = ConsoleState::Eof;
                }
                ReadOutcome::Timeout => return self.on_timeout(patterns, timeout),
            }
        }
    }

    /// Regex convenience wrapper around [`expect`](Self::expect).
    pub async fn expect_regex(&mut self, patterns: &[&str], timeout: Option<Duration>) -> Result<usize> {
        let compiled = patterns::compile_all(patterns).map_err(ConsoleError::from)?;
        self.expect(&compiled, timeout).await
    }

    /// Like [`expect`](Self::expect) with literal strings.
    pub async fn expect_exact(&mut self, patterns: &[&str], timeout: Option<Duration>) -> Result<usize> {
        let literal: Vec<ExpectPattern> = patterns.iter().map(ExpectPattern::exact).collect();
        self.expect(&literal, timeout).await
    }

    /// Wait for any pattern of the prompt set.
    pub async fn expect_prompt(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let prompts: Vec<ExpectPattern> = self.prompts.iter().cloned().map(ExpectPattern::Regex).collect();
        self.expect(&prompts, timeout).await
    }

    /// Wait for the child to close the terminal, then reap it.
    pub async fn expect_eof(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.expect(&[ExpectPattern::Eof], timeout).await?;
        Ok(())
    }

    fn record_match(&mut self, found: Found) -> usize {
        let consumed = self.buffer.consume(found.end);
        self.before = String::from_utf8_lossy(&consumed[..found.start]).into_owned();
        self.after = String::from_utf8_lossy(&consumed[found.start..]).into_owned();
        trace!("[{}] matched #{}: {:?}", self.name, found.index, self.after);
        self.last_match = Some(ExpectMatch {
            index: found.index,
            text: self.after.clone(),
            groups: found.groups,
        });
        found.index
    }

    async fn on_eof(&mut self, patterns: &[ExpectPattern]) -> Result<usize> {
        self.before = String::from_utf8_lossy(&self.buffer.take()).into_owned();
        self.after.clear();
        self.last_match = None;
        self.reap().await;
        match patterns::sentinel_index(patterns, &ExpectPattern::Eof) {
            Some(index) => Ok(index),
            None => Err(ConsoleError::Eof {
                console: self.name.clone(),
            }
            .into()),
        }
    }

    fn on_timeout(&mut self, patterns: &[ExpectPattern], timeout: Duration) -> Result<usize> {
        // Unmatched output stays buffered so a resync can still see it.
        self.before = self.buffer.pending_text().into_owned();
        self.after.clear();
        self.last_match = None;
        match patterns::sentinel_index(patterns, &ExpectPattern::Timeout) {
            Some(index) => Ok(index),
            None => Err(ConsoleError::Timeout {
                console: self.name.clone(),
                timeout,
                patterns: patterns::describe(patterns),
            }
            .into()),
        }
    }

    async fn read_chunk(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        let mut chunk = [0u8; 4096];
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(ReadOutcome::Eof),
        };

        let n = match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Err(_) => return Ok(ReadOutcome::Timeout),
            Ok(Ok(0)) => return Ok(ReadOutcome::Eof),
            Ok(Ok(n)) => n,
            Ok(Err(e)) if e.raw_os_error() == Some(EIO) => return Ok(ReadOutcome::Eof),
            Ok(Err(e)) => return Err(ConsoleError::Io(e).into()),
        };

        self.ingest(&chunk[..n]);
        Ok(ReadOutcome::Data)
    }

    fn ingest(&mut self, data: &[u8]) {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(data);
        }
        if self.config.echo_stdout {
            let mut stdout = std::io::stdout();
            let _ = std::io::Write::write_all(&mut stdout, data);
            let _ = std::io::Write::flush(&mut stdout);
        }
        self.recent.push(data);
        self.buffer.extend(data);
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Send `command`, wait for the prompt, and return its output.
    ///
    /// The output is the text between the echoed command and the prompt,
    /// with line endings normalised to `\n`. A command that prints nothing
    /// yields an empty string.
    pub async fn execute_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        self.run_pending_cleanup().await?;
        self.sendline(command).await?;
        self.expect_prompt(timeout).await?;
        Ok(strip_command_echo(&self.before, command))
    }

    /// Interrupt whatever is running and wait for a prompt again.
    pub async fn resync(&mut self, timeout: Option<Duration>) -> Result<()> {
        debug!("[{}] resyncing with prompt", self.name);
        self.sendcontrol('c').await?;
        self.expect_prompt(timeout).await?;
        Ok(())
    }

    /// Run the commands queued with [`defer_cleanup`](Self::defer_cleanup).
    pub async fn run_pending_cleanup(&mut self) -> Result<()> {
        if self.pending_cleanup.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending_cleanup);
        for command in pending {
            debug!("[{}] deferred cleanup: {}", self.name, command);
            self.sendline(&command).await?;
            self.expect_prompt(None).await?;
        }
        Ok(())
    }

    /// Walk a login sequence: answer host-key questions and password
    /// prompts until the shell prompt shows up.
    pub async fn login(&mut self, password: Option<&SecretString>, timeout: Option<Duration>) -> Result<()> {
        let mut login_patterns = patterns::compile_all(&[
            r"\(yes/no(/\[fingerprint\])?\)\?",
            r"[Pp]assword:",
        ])
        .map_err(ConsoleError::from)?;
        login_patterns.extend(self.prompts.iter().cloned().map(ExpectPattern::Regex));

        if login_patterns.len() == 2 {
            return Err(ConsoleError::EmptyPatternList {
                console: self.name.clone(),
            }
            .into());
        }

        for _ in 0..MAX_LOGIN_STEPS {
            match self.expect(&login_patterns, timeout).await? {
                0 => self.sendline("yes").await?,
                1 => match password {
                    Some(password) => self.sendline_secret(password).await?,
                    None => {
                        return Err(Error::Boardfarm(format!(
                            "console '{}' asked for a password but none is configured",
                            self.name
                        )));
                    }
                },
                _ => return Ok(()),
            }
        }

        Err(Error::Boardfarm(format!(
            "console '{}' kept prompting during login",
            self.name
        )))
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Log out (best effort) and terminate the child. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConsoleState::Closed {
            return Ok(());
        }

        if self.state == ConsoleState::Open {
            if let Err(e) = self.run_pending_cleanup().await {
                warn!("[{}] deferred cleanup failed: {}", self.name, e);
            }
            if let Some(logout) = self.config.logout_command.clone() {
                match self.sendline(&logout).await {
                    Ok(()) => {
                        if let Err(e) = self.expect(&[ExpectPattern::Eof], Some(CLOSE_GRACE)).await {
                            debug!("[{}] no EOF after '{}': {}", self.name, logout, e);
                        }
                    }
                    Err(e) => debug!("[{}] logout failed: {}", self.name, e),
                }
            }
        }

        self.stream = None;
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.start_kill() {
                    debug!("[{}] kill failed: {}", self.name, e);
                }
            }
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(Ok(status)) => self.exit_status = Some(status),
                Ok(Err(e)) => warn!("[{}] failed to reap child: {}", self.name, e),
                Err(_) => warn!("[{}] child did not exit within {:?}", self.name, CLOSE_GRACE),
            }
        }

        self.state = ConsoleState::Closed;
        debug!("[{}] closed", self.name);
        Ok(())
    }

    async fn reap(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("[{}] child exited: {}", self.name, status);
                    self.exit_status = Some(status);
                    self.child = None;
                }
                Ok(Err(e)) => warn!("[{}] failed to reap child: {}", self.name, e),
                Err(_) => {}
            }
        }
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("prompts", &self.prompts.iter().map(Regex::as_str).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Ok(None) = child.try_wait() {
                warn!("Console '{}' dropped without close(); killing child", self.name);
                let _ = child.start_kill();
            }
        }
    }
}

/// Remove the echoed command from `before` and normalise line endings.
///
/// The echo is removed literally (first occurrence) together with the
/// line break that ends it. Without an echo the text is returned as is.
pub fn strip_command_echo(before: &str, command: &str) -> String {
    let body = match (command.is_empty(), before.find(command)) {
        (false, Some(pos)) => {
            let rest = &before[pos + command.len()..];
            let rest = rest.trim_start_matches('\r');
            rest.strip_prefix('\n').unwrap_or(rest)
        }
        _ => before,
    };
    normalize_newlines(body)
}

/// Turn `\r\n` (and stray `\r` before newlines) into `\n`.
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        out.push_str(line.trim_end_matches('\r'));
        if lines.peek().is_some() {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    const PROMPT: &str = "bft# ";

    /// A scripted shell on the far end of a duplex pipe.
    ///
    /// It echoes each line like a terminal would, then prints the canned
    /// reply and a prompt. `sleep` swallows input until Ctrl-C.
    fn fake_shell(far: DuplexStream) {
        tokio::spawn(async move {
            let (rd, mut wr) = tokio::io::split(far);
            let mut rd = BufReader::new(rd);
            wr.write_all(PROMPT.as_bytes()).await.unwrap();
            let mut sleeping = false;
            loop {
                let mut line = Vec::new();
                let n = rd.read_until(b'\n', &mut line).await.unwrap();
                if n == 0 {
                    break;
                }
                if sleeping {
                    if line.contains(&0x03) {
                        wr.write_all(b"^C\r\n").await.unwrap();
                        wr.write_all(PROMPT.as_bytes()).await.unwrap();
                        sleeping = false;
                    }
                    continue;
                }
                if line == [0x03] || line.starts_with(&[0x03]) {
                    wr.write_all(b"^C\r\n").await.unwrap();
                    wr.write_all(PROMPT.as_bytes()).await.unwrap();
                    continue;
                }
                let cmd = String::from_utf8_lossy(&line).trim_end().to_string();
                wr.write_all(format!("{cmd}\r\n").as_bytes()).await.unwrap();
                let reply: &str = match cmd.as_str() {
                    "echo FOO" => "FOO\r\n",
                    "echo X" => "X\r\n",
                    "printf OK" => "OK",
                    "true" => "",
                    "exit" => break,
                    c if c.starts_with("sleep") => {
                        sleeping = true;
                        continue;
                    }
                    _ => "sh: command not found\r\n",
                };
                wr.write_all(reply.as_bytes()).await.unwrap();
                wr.write_all(PROMPT.as_bytes()).await.unwrap();
            }
        });
    }

    async fn shell_console() -> Console {
        let (near, far) = tokio::io::duplex(4096);
        fake_shell(far);
        let mut console = Console::from_stream("test", near, ConsoleConfig::default());
        console.set_prompt_patterns(&["bft# "]).unwrap();
        console.expect_prompt(Some(Duration::from_secs(5))).await.unwrap();
        console
    }

    #[tokio::test]
    async fn test_execute_command_captures_output() {
        let mut console = shell_console().await;
        assert_eq!(console.execute_command("echo FOO", None).await.unwrap(), "FOO\n");
        assert_eq!(console.execute_command("printf OK", None).await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_execute_command_without_output_is_empty() {
        let mut console = shell_console().await;
        assert_eq!(console.execute_command("true", None).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_timeout_then_resync() {
        let mut console = shell_console().await;
        console.sendline("sleep 5").await.unwrap();
        let err = console
            .expect_prompt(Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Timeout");
        assert!(console.is_alive());

        console.sendcontrol('c').await.unwrap();
        console.sendline("").await.unwrap();
        console.expect_prompt(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(console.execute_command("echo X", None).await.unwrap(), "X\n");
    }

    #[tokio::test]
    async fn test_timeout_sentinel_returns_index() {
        let mut console = shell_console().await;
        let idx = console
            .expect(
                &[ExpectPattern::exact("never"), ExpectPattern::Timeout],
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[tokio::test]
    async fn test_empty_pattern_list_is_rejected() {
        let mut console = shell_console().await;
        let err = console.expect(&[], None).await.unwrap_err();
        assert!(matches!(err, Error::Console(ConsoleError::EmptyPatternList { .. })));
    }

    #[tokio::test]
    async fn test_eof_is_reported() {
        let mut console = shell_console().await;
        console.sendline("exit").await.unwrap();
        let err = console
            .expect_prompt(Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Console(ConsoleError::Eof { .. })));
        assert!(!console.is_alive());
        assert!(console.sendline("echo X").await.is_err());
    }

    #[tokio::test]
    async fn test_eof_sentinel_returns_index() {
        let mut console = shell_console().await;
        console.sendline("exit").await.unwrap();
        let idx = console
            .expect(&[ExpectPattern::exact("nope"), ExpectPattern::Eof], Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(idx, 1);
        assert!(console.before().contains("exit"));
    }

    #[tokio::test]
    async fn test_expect_exact_sets_before_and_after() {
        let mut console = shell_console().await;
        console.sendline("echo FOO").await.unwrap();
        let idx = console.expect_exact(&["FOO"], None).await.unwrap();
        assert_eq!(idx, 0);
        assert_eq!(console.after(), "FOO");
        assert_eq!(console.before(), "echo ");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut console = shell_console().await;
        console.close().await.unwrap();
        assert!(console.is_closed());
        console.close().await.unwrap();
        assert!(console.expect_prompt(None).await.is_err());
    }

    #[tokio::test]
    async fn test_deferred_cleanup_runs_before_next_command() {
        let mut console = shell_console().await;
        console.defer_cleanup("true");
        assert_eq!(console.pending_cleanup().len(), 1);
        assert_eq!(console.execute_command("echo X", None).await.unwrap(), "X\n");
        assert!(console.pending_cleanup().is_empty());
    }

    #[tokio::test]
    async fn test_push_and_restore_prompts() {
        let mut console = shell_console().await;
        console.push_prompts(vec![Regex::new("password:").unwrap()]);
        assert_eq!(console.prompts().len(), 2);
        assert_eq!(console.prompts()[0].as_str(), "password:");
        console.restore_prompts();
        assert_eq!(console.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_sendline_writes_newline() {
        let mock = tokio_test::io::Builder::new().write(b"ls -l\n").build();
        let mut console = Console::from_stream("mock", mock, ConsoleConfig::default());
        console.sendline("ls -l").await.unwrap();
    }

    #[tokio::test]
    async fn test_sendcontrol_byte() {
        let mock = tokio_test::io::Builder::new().write(&[0x03]).write(&[0x1b]).build();
        let mut console = Console::from_stream("mock", mock, ConsoleConfig::default());
        console.sendcontrol('c').await.unwrap();
        console.sendcontrol('[').await.unwrap();
    }

    #[test]
    fn test_strip_command_echo() {
        assert_eq!(strip_command_echo("echo FOO\r\nFOO\r\n", "echo FOO"), "FOO\n");
        assert_eq!(strip_command_echo("printf OK\r\nOK", "printf OK"), "OK");
        assert_eq!(strip_command_echo("true\r\n", "true"), "");
        // Non-echoing shell
        assert_eq!(strip_command_echo("FOO\r\n", "echo FOO"), "FOO\n");
    }

    #[test]
    fn test_spawn_spec_from_argv() {
        let spec = SpawnSpec::from_argv(&["scp", "-P", "22", "a", "b"]).unwrap();
        assert_eq!(spec.program, "scp");
        assert_eq!(spec.command_line(), "scp -P 22 a b");
        assert!(SpawnSpec::from_argv::<&str>(&[]).is_none());
    }
}
