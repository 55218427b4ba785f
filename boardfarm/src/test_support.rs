//! Scripted shells for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::console::{Console, ConsoleConfig};

pub const PROMPT: &str = "root@bft:~# ";
pub const PROMPT_PATTERN: &str = r"root@bft:~# $";

/// A fake shell: echoes each line, prints the canned reply and a prompt.
///
/// Commands without a canned reply print nothing. `exit` closes the
/// stream. Every received line is recorded.
#[derive(Clone, Default)]
pub struct ScriptedShell {
    replies: HashMap<String, String>,
    prefix_replies: Vec<(String, String)>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to an exact command line.
    pub fn reply(mut self, command: &str, output: &str) -> Self {
        self.replies.insert(command.to_string(), output.to_string());
        self
    }

    /// Reply to any command line starting with `prefix`.
    pub fn reply_prefix(mut self, prefix: &str, output: &str) -> Self {
        self.prefix_replies.push((prefix.to_string(), output.to_string()));
        self
    }

    /// Lines received so far.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Handle to the command log, shared with every console spawned from this shell.
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        self.log.clone()
    }

    fn answer(&self, cmd: &str) -> String {
        if let Some(reply) = self.replies.get(cmd) {
            return reply.clone();
        }
        self.prefix_replies
            .iter()
            .find(|(prefix, _)| cmd.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_default()
    }

    fn serve(self, far: DuplexStream) {
        tokio::spawn(async move {
            let (rd, mut wr) = tokio::io::split(far);
            let mut rd = BufReader::new(rd);
            if wr.write_all(PROMPT.as_bytes()).await.is_err() {
                return;
            }
            loop {
                let mut line = Vec::new();
                match rd.read_until(b'\n', &mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let cmd = String::from_utf8_lossy(&line).trim_end().to_string();
                self.log.lock().unwrap().push(cmd.clone());
                if cmd == "exit" {
                    break;
                }
                let reply = self.answer(&cmd).replace('\n', "\r\n");
                let out = format!("{cmd}\r\n{reply}{PROMPT}");
                if wr.write_all(out.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
    }

    /// A console connected to this shell, already past the first prompt.
    pub async fn console(&self, name: &str) -> Console {
        let (near, far) = tokio::io::duplex(64 * 1024);
        self.clone().serve(far);
        let config = ConsoleConfig {
            timeout: Duration::from_secs(5),
            logout_command: Some("exit".to_string()),
            ..ConsoleConfig::default()
        };
        let mut console = Console::from_stream(name, near, config);
        console.set_prompt_patterns(&[PROMPT_PATTERN]).unwrap();
        console.expect_prompt(None).await.unwrap();
        console
    }
}
