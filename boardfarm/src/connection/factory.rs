//! Connection factory: turns a transport kind plus parameters into a
//! logged-in console.

use std::path::{Path, PathBuf};

use log::{debug, info};

use super::config::{ConnectionKind, ConnectionParams};
use crate::console::{Console, InteractiveBuilder, SpawnSpec};
use crate::error::{ConsoleError, Error, Result};

const SSH_DEFAULT_PORT: u16 = 22;
const TELNET_DEFAULT_PORT: u16 = 23;
const KERMIT_PROMPT: &str = r"(C-)?Kermit>\s*$";

/// Options passed to every ssh invocation.
const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "ServerAliveInterval=60",
    "-o",
    "ServerAliveCountMax=5",
];

/// Build a console called `name` for `kind`.
///
/// The console gets the shell's prompt set, a transcript when one is
/// configured, and (for ssh and telnet) a completed login. A failure after
/// the child was spawned closes the console before the error is returned.
pub async fn connection_factory(
    kind: ConnectionKind,
    name: &str,
    params: ConnectionParams,
) -> Result<Console> {
    let (spec, via_kermit) = spawn_spec(kind, name, &params)?;
    info!("[{}] connecting via {}: {}", name, kind, spec.command_line());

    let mut console = Console::spawn(name, &spec, params.console_config(kind))?;
    match prepare(&mut console, kind, via_kermit, &params).await {
        Ok(()) => Ok(console),
        Err(e) => {
            if let Err(close_err) = console.close().await {
                debug!("[{}] close after failed connect: {}", name, close_err);
            }
            Err(e)
        }
    }
}

async fn prepare(
    console: &mut Console,
    kind: ConnectionKind,
    via_kermit: bool,
    params: &ConnectionParams,
) -> Result<()> {
    if let Some(path) = &params.transcript {
        console.attach_transcript(path)?;
    }
    console.set_prompts(params.shell.prompts.clone());

    if via_kermit {
        kermit_connect(console, params).await?;
    }

    if kind.auto_login() {
        console.login(params.password.as_ref(), None).await?;
        if params.run_on_open {
            for command in &params.shell.on_open_commands {
                console.execute_command(command, None).await?;
            }
        }
    }
    Ok(())
}

/// Assemble the command line for `kind`. The flag is true when telnet
/// is routed through kermit.
pub fn spawn_spec(
    kind: ConnectionKind,
    name: &str,
    params: &ConnectionParams,
) -> Result<(SpawnSpec, bool)> {
    match kind {
        ConnectionKind::Ssh => Ok((ssh_spec(name, params)?, false)),
        ConnectionKind::Telnet => {
            let host = require_host(name, kind, params)?;
            let port = params.port.unwrap_or(TELNET_DEFAULT_PORT);
            match find_in_path("kermit").filter(|_| params.prefer_kermit) {
                Some(kermit) => Ok((SpawnSpec::new(kermit.to_string_lossy()), true)),
                None => Ok((
                    SpawnSpec::new("telnet").arg(host).arg(port.to_string()),
                    false,
                )),
            }
        }
        ConnectionKind::LocalCmd | ConnectionKind::Ser2Net => {
            let spec = SpawnSpec::from_argv(&params.conn_cmd).ok_or_else(|| {
                spawn_error(name, kind, "no conn_cmd configured".to_string())
            })?;
            Ok((spec, false))
        }
    }
}

fn ssh_spec(name: &str, params: &ConnectionParams) -> Result<SpawnSpec> {
    let host = require_host(name, ConnectionKind::Ssh, params)?;
    let port = params.port.unwrap_or(SSH_DEFAULT_PORT);
    let target = match &params.username {
        Some(user) => format!("{user}@{host}"),
        None => host.to_string(),
    };
    Ok(SpawnSpec::new("ssh")
        .arg("-p")
        .arg(port.to_string())
        .args(SSH_OPTIONS.iter().copied())
        .arg(target))
}

fn require_host<'a>(
    name: &str,
    kind: ConnectionKind,
    params: &'a ConnectionParams,
) -> Result<&'a str> {
    params
        .host
        .as_deref()
        .ok_or_else(|| spawn_error(name, kind, "no host configured".to_string()))
}

fn spawn_error(name: &str, kind: ConnectionKind, message: String) -> Error {
    ConsoleError::SpawnFailed {
        console: name.to_string(),
        command: kind.to_string(),
        message,
    }
    .into()
}

/// Drive kermit from its own prompt into a telnet session.
async fn kermit_connect(console: &mut Console, params: &ConnectionParams) -> Result<()> {
    let host = params.host.as_deref().unwrap_or_default();
    let port = params.port.unwrap_or(TELNET_DEFAULT_PORT);

    console.expect_regex(&[KERMIT_PROMPT], None).await?;
    let events = InteractiveBuilder::new()
        .step("set telnet wait off", KERMIT_PROMPT)
        .step(format!("set host {host} {port} /telnet"), KERMIT_PROMPT)
        .step("set carrier-watch off", KERMIT_PROMPT)
        .step("connect", r"Connecting to|-{5,}")
        .build()
        .map_err(ConsoleError::from)?;
    console.send_interactive(&events).await?;

    // Serial servers stay silent until they see a keystroke.
    console.sendline("").await
}

/// Locate `program` on `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in_dirs(program, std::env::split_paths(&path))
}

fn find_in_dirs<I>(program: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    dirs.into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}
