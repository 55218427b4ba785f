//! Connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::console::{ConsoleConfig, DEFAULT_TIMEOUT};
use crate::shell::{self, ShellDefinition};

/// Transport used to reach a device console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// `ssh USER@HOST` with host-key and password handling.
    Ssh,

    /// A local command spawned from an argv vector.
    LocalCmd,

    /// `telnet HOST PORT`, or kermit when it is installed.
    Telnet,

    /// The configured conn-cmd, spawned verbatim (ser2net, picocom, ...).
    Ser2Net,
}

impl ConnectionKind {
    /// Canonical inventory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Ssh => "ssh",
            ConnectionKind::LocalCmd => "local_cmd",
            ConnectionKind::Telnet => "telnet",
            ConnectionKind::Ser2Net => "ser2net",
        }
    }

    /// Whether this transport logs in by itself.
    pub fn auto_login(&self) -> bool {
        matches!(self, ConnectionKind::Ssh | ConnectionKind::Telnet)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown connection type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection type '{0}'")]
pub struct UnknownConnectionKind(pub String);

impl FromStr for ConnectionKind {
    type Err = UnknownConnectionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ssh" | "authenticated_ssh" => Ok(ConnectionKind::Ssh),
            "local_cmd" | "local" => Ok(ConnectionKind::LocalCmd),
            "telnet" => Ok(ConnectionKind::Telnet),
            "ser2net" | "serial" => Ok(ConnectionKind::Ser2Net),
            other => Err(UnknownConnectionKind(other.to_string())),
        }
    }
}

/// Everything the factory needs to build a console.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Host to connect to (ssh, telnet).
    pub host: Option<String>,

    /// Port (ssh default 22, telnet default 23).
    pub port: Option<u16>,

    /// Login user for ssh.
    pub username: Option<String>,

    /// Login password, answered at the password prompt.
    pub password: Option<SecretString>,

    /// Command line for local_cmd and ser2net.
    pub conn_cmd: Vec<String>,

    /// Shell the console lands in.
    pub shell: ShellDefinition,

    /// Default timeout for every blocking call.
    pub timeout: Duration,

    /// Optional per-character send delay.
    pub char_delay: Option<Duration>,

    /// Transcript log file.
    pub transcript: Option<PathBuf>,

    /// Echo received bytes to stdout.
    pub echo_stdout: bool,

    /// Allow telnet to go through kermit when it is installed.
    pub prefer_kermit: bool,

    /// Run the shell's on-open commands after login.
    pub run_on_open: bool,
}

impl ConnectionParams {
    /// Parameters for `shell` with every other field defaulted.
    pub fn new(shell: ShellDefinition) -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            conn_cmd: Vec::new(),
            shell,
            timeout: DEFAULT_TIMEOUT,
            char_delay: None,
            transcript: None,
            echo_stdout: false,
            prefer_kermit: true,
            run_on_open: true,
        }
    }

    /// Console configuration derived from these parameters.
    pub fn console_config(&self, kind: ConnectionKind) -> ConsoleConfig {
        let logout_command = match kind {
            ConnectionKind::Ser2Net => None,
            _ => self.shell.logout_command.clone(),
        };
        ConsoleConfig {
            timeout: self.timeout,
            char_delay: self.char_delay,
            echo_stdout: self.echo_stdout,
            logout_command,
            ..ConsoleConfig::default()
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::new(shell::builtin::bash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("ssh".parse::<ConnectionKind>(), Ok(ConnectionKind::Ssh));
        assert_eq!(
            "authenticated_ssh".parse::<ConnectionKind>(),
            Ok(ConnectionKind::Ssh)
        );
        assert_eq!(
            "local_cmd".parse::<ConnectionKind>(),
            Ok(ConnectionKind::LocalCmd)
        );
        assert_eq!("serial".parse::<ConnectionKind>(), Ok(ConnectionKind::Ser2Net));
        assert_eq!("TELNET".parse::<ConnectionKind>(), Ok(ConnectionKind::Telnet));
        let err = "carrier-pigeon".parse::<ConnectionKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown connection type 'carrier-pigeon'");
        let err: Box<dyn std::error::Error> = Box::new(err);
        assert!(err.source().is_none());
    }

    #[test]
    fn test_serial_has_no_logout() {
        let params = ConnectionParams::default();
        assert_eq!(
            params.console_config(ConnectionKind::Ssh).logout_command.as_deref(),
            Some("exit")
        );
        assert!(params
            .console_config(ConnectionKind::Ser2Net)
            .logout_command
            .is_none());
    }
}
