//! File copies between the harness host and a device over scp.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

use super::linux::LinuxDevice;
use crate::connection::{ConnectionKind, ConnectionParams, connection_factory};
use crate::console::ExpectPattern;
use crate::error::{ConsoleError, DeviceError, Error, Result};
use crate::shell::ShellDefinition;

const SCP_TIMEOUT: Duration = Duration::from_secs(120);
const SSH_DEFAULT_PORT: u16 = 22;
const MAX_PROMPTS: usize = 4;

/// Direction of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToDevice,
    FromDevice,
}

impl LinuxDevice {
    /// Copy a file from the harness host to `remote` on the device.
    pub async fn scp_local_file_to_device(&mut self, local: &Path, remote: &str) -> Result<()> {
        let argv = self.scp_argv(Direction::ToDevice, local, remote)?;
        self.run_scp(argv).await
    }

    /// Copy `remote` from the device to a file on the harness host.
    pub async fn scp_device_file_to_local(&mut self, remote: &str, local: &Path) -> Result<()> {
        let argv = self.scp_argv(Direction::FromDevice, local, remote)?;
        self.run_scp(argv).await
    }

    fn scp_argv(&self, direction: Direction, local: &Path, remote: &str) -> Result<Vec<String>> {
        let record = self.record();
        let host = record.ipaddr.as_deref().ok_or_else(|| self.scp_error("no ipaddr in inventory"))?;
        let target = match &record.username {
            Some(user) => format!("{user}@{host}:{remote}"),
            None => format!("{host}:{remote}"),
        };
        let local = self.local_path(local).to_string_lossy().into_owned();

        let mut argv: Vec<String> = [
            "scp",
            "-P",
            &record.port.unwrap_or(SSH_DEFAULT_PORT).to_string(),
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        match direction {
            Direction::ToDevice => argv.extend([local, target]),
            Direction::FromDevice => argv.extend([target, local]),
        }
        Ok(argv)
    }

    /// Relative local paths live in the run's scratch directory.
    pub fn local_path(&self, local: &Path) -> PathBuf {
        if local.is_absolute() {
            local.to_path_buf()
        } else {
            self.settings().scratch_dir.join(local)
        }
    }

    async fn run_scp(&mut self, argv: Vec<String>) -> Result<()> {
        let name = format!("{}.scp", self.name());
        info!("[{}] {}", self.name(), argv.join(" "));

        let mut params = ConnectionParams::new(ShellDefinition::new("scp"));
        params.conn_cmd = argv;
        params.timeout = SCP_TIMEOUT;
        params.echo_stdout = self.settings().echo_stdout;
        let mut console = connection_factory(ConnectionKind::LocalCmd, &name, params)
            .await
            .map_err(|e| self.scp_error(&e.to_string()))?;

        let patterns = vec![
            ExpectPattern::regex(r"\(yes/no(/\[fingerprint\])?\)\?").map_err(ConsoleError::from)?,
            ExpectPattern::regex(r"[Pp]assword:").map_err(ConsoleError::from)?,
            ExpectPattern::Eof,
        ];

        let outcome = self.answer_scp(&mut console, &patterns).await;
        if let Err(e) = console.close().await {
            debug!("[{}] closing scp console: {}", name, e);
        }
        outcome?;

        match console.exit_status() {
            Some(0) => Ok(()),
            Some(code) => Err(self.scp_error(&format!(
                "scp exited with {code}: {}",
                console.before().trim()
            ))),
            None => Err(self.scp_error("scp exit status unknown")),
        }
    }

    async fn answer_scp(
        &self,
        console: &mut crate::console::Console,
        patterns: &[ExpectPattern],
    ) -> Result<()> {
        let mut prompts = 0;
        loop {
            match console.expect(patterns, None).await {
                Ok(0) => console.sendline("yes").await?,
                Ok(1) => {
                    let password = self
                        .record()
                        .password
                        .as_ref()
                        .ok_or_else(|| self.scp_error("password requested but none configured"))?;
                    console.sendline_secret(password).await?;
                }
                Ok(_) => return Ok(()),
                Err(e @ Error::Console(ConsoleError::Timeout { .. })) => {
                    return Err(self.scp_error(&e.to_string()));
                }
                Err(e) => return Err(e),
            }
            prompts += 1;
            if prompts > MAX_PROMPTS {
                return Err(self.scp_error("too many prompts"));
            }
        }
    }

    fn scp_error(&self, message: &str) -> Error {
        DeviceError::Scp {
            device: self.name().to_string(),
            message: message.to_string(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceSettings;
    use crate::inventory::DeviceRecord;

    fn device() -> LinuxDevice {
        let mut record = DeviceRecord::new("wan", "bf_wan", "ssh");
        record.ipaddr = Some("10.64.38.2".into());
        record.port = Some(4001);
        record.username = Some("root".into());
        LinuxDevice::new(record, DeviceSettings::default(), &[]).unwrap()
    }

    #[test]
    fn test_argv_to_device() {
        let argv = device()
            .scp_argv(Direction::ToDevice, Path::new("/tmp/fw.bin"), "/tftpboot/fw.bin")
            .unwrap();
        assert_eq!(argv[..3], ["scp", "-P", "4001"]);
        assert_eq!(argv[argv.len() - 2..], ["/tmp/fw.bin", "root@10.64.38.2:/tftpboot/fw.bin"]);
    }

    #[test]
    fn test_argv_from_device() {
        let argv = device()
            .scp_argv(Direction::FromDevice, Path::new("/tmp/cap.pcap"), "/root/cap.pcap")
            .unwrap();
        assert_eq!(argv[argv.len() - 2..], ["root@10.64.38.2:/root/cap.pcap", "/tmp/cap.pcap"]);
    }

    #[test]
    fn test_relative_local_path_uses_scratch() {
        let mut record = DeviceRecord::new("wan", "bf_wan", "ssh");
        record.ipaddr = Some("10.64.38.2".into());
        let settings = DeviceSettings {
            scratch_dir: PathBuf::from("/var/tmp/bft-run"),
            ..DeviceSettings::default()
        };
        let device = LinuxDevice::new(record, settings, &[]).unwrap();
        let argv = device
            .scp_argv(Direction::FromDevice, Path::new("wan.pcap"), "/tmp/wan.pcap")
            .unwrap();
        assert_eq!(argv.last().unwrap(), "/var/tmp/bft-run/wan.pcap");
        assert!(!argv.iter().any(|a| a.contains("@")));
    }

    #[test]
    fn test_argv_needs_ipaddr() {
        let mut record = DeviceRecord::new("cpe", "bf_cpe", "local_cmd");
        record.conn_cmd = Some(crate::inventory::ConnCmd::Line("bash".into()));
        let device = LinuxDevice::new(record, DeviceSettings::default(), &[]).unwrap();
        let err = device
            .scp_argv(Direction::ToDevice, Path::new("/tmp/a"), "/tmp/a")
            .unwrap_err();
        assert_eq!(err.kind(), "SCPFailure");
    }
}
