//! Built-in shell definitions.
//!
//! Prompt patterns are anchored to the end of the unread output, so a
//! `#` in the middle of command output never ends a command early.

use crate::shell::ShellDefinition;

/// Failure markers shared by every POSIX-ish shell.
const POSIX_FAILURES: &[&str] = &[
    "command not found",
    "No such file or directory",
    "Permission denied",
    "Operation not permitted",
];

/// A whole trailing line shaped like `user@host:dir$ `. Output that merely
/// ends in `#` or `$` mid-line is not a prompt.
const GENERIC_PROMPT: &str = r"(?m:^)[\w\-@:~/\.\]\[ ]*[$#] ?\z";

fn posix(name: &str) -> ShellDefinition {
    POSIX_FAILURES
        .iter()
        .fold(ShellDefinition::new(name), |shell, p| {
            shell.with_failure_pattern(*p)
        })
        .with_logout("exit")
}

/// Generic bash on a Linux host: `user@host:~$ ` or `root@host:~# `.
pub fn bash() -> ShellDefinition {
    posix("bash")
        .with_prompt(GENERIC_PROMPT)
        .unwrap()
        .with_on_open_command("export TERM=xterm")
        .with_on_open_command("stty columns 400")
}

/// Busybox ash, as found on most embedded targets.
pub fn busybox() -> ShellDefinition {
    posix("busybox")
        .with_prompt(GENERIC_PROMPT)
        .unwrap()
        .with_on_open_command("export TERM=xterm")
}

/// OpenWrt's `root@OpenWrt:~# `.
pub fn openwrt() -> ShellDefinition {
    posix("openwrt")
        .with_prompt(r"root@[\w\-]+:[^#\r\n]*#\s?$")
        .unwrap()
        .with_on_open_command("export TERM=xterm")
}

/// prplOS (OpenWrt derivative): `root@prplOS:~# `.
pub fn prplos() -> ShellDefinition {
    posix("prplos")
        .with_prompt(r"root@prplOS:[^#\r\n]*#\s?$")
        .unwrap()
        .with_on_open_command("export TERM=xterm")
}

/// RDK-B gateways: `root@<model>:~# `.
pub fn rdkb() -> ShellDefinition {
    posix("rdkb")
        .with_prompt(r"root@\S+:[^#\r\n]*#\s?$")
        .unwrap()
        .with_on_open_command("export TERM=xterm")
}

/// Every built-in shell.
pub fn all() -> Vec<ShellDefinition> {
    vec![bash(), busybox(), openwrt(), prplos(), rdkb()]
}
