//! Builder for console connections.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::config::{ConnectionKind, ConnectionParams};
use super::factory::connection_factory;
use crate::console::Console;
use crate::error::Result;
use crate::shell::{self, ShellDefinition};

/// Fluent front-end to [`connection_factory`].
///
/// # Example
///
/// ```rust,no_run
/// use boardfarm::connection::{ConnectionBuilder, ConnectionKind};
///
/// # async fn example() -> Result<(), boardfarm::Error> {
/// let mut console = ConnectionBuilder::new(ConnectionKind::Ssh, "wan.console")
///     .host("192.168.1.10")
///     .username("root")
///     .password("bigfoot1")
///     .shell("bash")?
///     .connect()
///     .await?;
///
/// let uptime = console.execute_command("uptime", None).await?;
/// println!("{uptime}");
/// console.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionBuilder {
    kind: ConnectionKind,
    name: String,
    params: ConnectionParams,
}

impl ConnectionBuilder {
    /// Start building a console called `name` over `kind`.
    pub fn new(kind: ConnectionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: ConnectionParams::new(shell::builtin::bash()),
        }
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.params.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.params.port = Some(port);
        self
    }

    /// Set the login user.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.params.username = Some(username.into());
        self
    }

    /// Set the login password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.params.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the command line for local_cmd / ser2net consoles.
    pub fn conn_cmd<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.conn_cmd = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Use a registered shell by name.
    pub fn shell(mut self, name: &str) -> Result<Self> {
        self.params.shell = shell::lookup(name)?;
        Ok(self)
    }

    /// Use a custom shell definition.
    pub fn custom_shell(mut self, shell: ShellDefinition) -> Self {
        self.params.shell = shell;
        self
    }

    /// Set the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.params.timeout = timeout;
        self
    }

    /// Set a per-character send delay.
    pub fn char_delay(mut self, delay: Duration) -> Self {
        self.params.char_delay = Some(delay);
        self
    }

    /// Tee the transcript into `path`.
    pub fn transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.transcript = Some(path.into());
        self
    }

    /// Echo received bytes to stdout.
    pub fn echo_stdout(mut self, echo: bool) -> Self {
        self.params.echo_stdout = echo;
        self
    }

    /// Never use kermit for telnet.
    pub fn without_kermit(mut self) -> Self {
        self.params.prefer_kermit = false;
        self
    }

    /// Skip the shell's on-open commands.
    pub fn skip_on_open(mut self) -> Self {
        self.params.run_on_open = false;
        self
    }

    /// The parameters assembled so far.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Spawn and log in.
    pub async fn connect(self) -> Result<Console> {
        connection_factory(self.kind, &self.name, self.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_builder_collects_params() {
        let builder = ConnectionBuilder::new(ConnectionKind::Ssh, "lan.console")
            .host("10.0.0.2")
            .port(2222)
            .username("root")
            .password("secret")
            .timeout(Duration::from_secs(5))
            .shell("busybox")
            .unwrap();

        let params = builder.params();
        assert_eq!(params.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(params.port, Some(2222));
        assert_eq!(params.username.as_deref(), Some("root"));
        assert_eq!(params.password.as_ref().unwrap().expose_secret(), "secret");
        assert_eq!(params.timeout, Duration::from_secs(5));
        assert_eq!(params.shell.name, "busybox");
    }

    #[test]
    fn test_builder_unknown_shell() {
        assert!(ConnectionBuilder::new(ConnectionKind::LocalCmd, "x")
            .shell("fish")
            .is_err());
    }
}
