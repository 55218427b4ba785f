//! Linux-based CPE reached over serial or ssh.

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::time::Instant;

use super::{base, boxed, contingency_error};
use crate::console::Console;
use crate::device::{Device, DeviceSettings, LinuxDevice};
use crate::error::{DeviceError, Error, Result};
use crate::hooks::{HookContext, Stage};
use crate::inventory::DeviceRecord;
use crate::templates::{Cpe, CpeHw, CpeSw, Template};

pub const TYPE: &str = "bf_cpe";

pub const OPTIONS: &[&str] = &["no-power-cycle"];

const TEMPLATES: &[Template] = &[Template::Cpe];
const STAGES: &[Stage] = &[
    Stage::DeviceBoot,
    Stage::SkipBoot,
    Stage::ContingencyCheck,
    Stage::ShutdownDevice,
];

pub const DEFAULT_RETRIES: u32 = 3;
const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(300);
const ONLINE_POLL: Duration = Duration::from_secs(5);

pub fn create(record: DeviceRecord, settings: &DeviceSettings) -> Result<Box<dyn Device>> {
    boxed(BfCpe::new(base(record, settings, OPTIONS)?))
}

pub struct BfCpe {
    base: LinuxDevice,
    erouter_iface: String,
    lan_iface: String,
    reconnect_timeout: Duration,
    boot_timeout: Duration,
}

impl BfCpe {
    pub fn new(base: LinuxDevice) -> Self {
        let record = base.record();
        let erouter_iface = record.extra_str("erouter_iface").unwrap_or("erouter0").to_string();
        let lan_iface = record.extra_str("lan_iface").unwrap_or("br-lan").to_string();
        let boot_timeout = record
            .extra
            .get("boot_timeout")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_BOOT_TIMEOUT);
        Self {
            base,
            erouter_iface,
            lan_iface,
            reconnect_timeout: RECONNECT_TIMEOUT,
            boot_timeout,
        }
    }

    /// Per-attempt reconnect timeout of [`power_cycle`](CpeHw::power_cycle).
    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    fn boot_error(&self, message: String) -> Error {
        DeviceError::Boot {
            device: self.base.name().to_string(),
            message,
        }
        .into()
    }

    async fn reconnect(&mut self) -> Result<()> {
        match tokio::time::timeout(self.reconnect_timeout, self.base.connect()).await {
            Ok(result) => result,
            Err(_) => Err(self.boot_error(format!(
                "no prompt within {:?} of reconnecting",
                self.reconnect_timeout
            ))),
        }
    }
}

/// A reconnect that timed out or lost its transport may succeed next time.
fn worth_retrying(e: &Error) -> bool {
    matches!(e, Error::Device(DeviceError::Boot { .. })) || e.is_transport_or_timeout()
}

#[async_trait]
impl Device for BfCpe {
    delegate_linux!(base);

    fn templates(&self) -> &[Template] {
        TEMPLATES
    }

    fn stages(&self) -> &[Stage] {
        STAGES
    }

    async fn device_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await?;
        if !self.base.options().has("no-power-cycle") {
            self.power_cycle(DEFAULT_RETRIES).await?;
        }
        let timeout = self.boot_timeout;
        self.wait_for_online(timeout).await
    }

    async fn skip_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    /// The console must answer `echo FOO` with `FOO`.
    async fn contingency_check(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        let output = self.base.execute("echo FOO").await?;
        if output.trim() != "FOO" {
            return Err(contingency_error(
                &self.base,
                format!("console answered '{}' to 'echo FOO'", output.trim()),
            ));
        }
        Ok(())
    }

    async fn shutdown_device(&mut self) -> Result<()> {
        self.base.shutdown().await
    }

    fn as_cpe(&mut self) -> Option<&mut dyn Cpe> {
        Some(self)
    }
}

impl Cpe for BfCpe {
    fn hw(&mut self) -> &mut dyn CpeHw {
        self
    }

    fn sw(&mut self) -> &mut dyn CpeSw {
        self
    }
}

#[async_trait]
impl CpeHw for BfCpe {
    fn mac_address(&self) -> Option<&str> {
        self.base.record().mac.as_deref()
    }

    fn get_console(&mut self, role: &str) -> Result<&mut Console> {
        self.base.console_by_role(role)
    }

    /// Reboot from the shell and reconnect, up to `retries` times.
    async fn power_cycle(&mut self, retries: u32) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=retries.max(1) {
            info!("[{}] power cycle, attempt {}/{}", self.base.name(), attempt, retries);
            if let Ok(console) = self.base.console() {
                if let Err(e) = console.sendline("reboot -f").await {
                    warn!("[{}] reboot command failed: {}", self.base.name(), e);
                }
            }
            self.base.disconnect().await;

            match self.reconnect().await {
                Ok(()) => return Ok(()),
                Err(e) if worth_retrying(&e) => {
                    warn!("[{}] attempt {} failed: {}", self.base.name(), attempt, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(self.boot_error(format!(
            "no console after {} power cycle attempt(s): {}",
            retries.max(1),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn wait_for_hw_boot(&mut self, timeout: Duration) -> Result<()> {
        let console = self.base.console()?;
        console.sendline("").await?;
        if let Err(e) = console.expect_prompt(Some(timeout)).await {
            return Err(self.boot_error(format!("no prompt after boot: {e}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CpeSw for BfCpe {
    fn erouter_iface(&self) -> &str {
        &self.erouter_iface
    }

    fn lan_iface(&self) -> &str {
        &self.lan_iface
    }

    async fn version(&mut self) -> Result<String> {
        Ok(self.base.check_output("uname -r").await?.trim().to_string())
    }

    /// Online means the erouter interface holds an IPv4 address.
    async fn is_online(&mut self) -> Result<bool> {
        let iface = self.erouter_iface.clone();
        match self.base.get_interface_ipv4addr(&iface).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_transport_or_timeout() => Err(e),
            Err(_) => Ok(false),
        }
    }

    async fn wait_for_online(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_online().await? {
                info!("[{}] online", self.base.name());
                return Ok(());
            }
            if Instant::now() + ONLINE_POLL > deadline {
                return Err(self.boot_error(format!(
                    "{} has no address after {:?}",
                    self.erouter_iface, timeout
                )));
            }
            tokio::time::sleep(ONLINE_POLL).await;
        }
    }

    async fn execute(&mut self, command: &str) -> Result<String> {
        self.base.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::devices::tests::linux_with;
    use crate::inventory::{ConnCmd, Inventory};
    use crate::test_support::ScriptedShell;

    fn record() -> DeviceRecord {
        let mut record = DeviceRecord::new("cpe", TYPE, "local_cmd");
        record.conn_cmd = Some(ConnCmd::Line("/nonexistent/bft-console".into()));
        record.mac = Some("00:11:22:33:44:55".into());
        record
    }

    #[tokio::test]
    async fn test_contingency_echo() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new().reply("echo FOO", "FOO\n");
        let mut cpe = BfCpe::new(linux_with(&shell, record(), OPTIONS).await);
        cpe.contingency_check(&ctx).await.unwrap();

        let shell = ScriptedShell::new().reply("echo FOO", "garbage\n");
        let mut cpe = BfCpe::new(linux_with(&shell, record(), OPTIONS).await);
        let err = cpe.contingency_check(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), "ContingencyCheckError");
    }

    #[tokio::test]
    async fn test_power_cycle_gives_up() {
        let shell = ScriptedShell::new();
        let mut cpe = BfCpe::new(linux_with(&shell, record(), OPTIONS).await)
            .with_reconnect_timeout(Duration::from_secs(2));
        let err = cpe.hw().power_cycle(2).await.unwrap_err();
        assert_eq!(err.kind(), "DeviceBootFailure");
        assert!(err.to_string().contains("2 power cycle attempt"));
        assert_eq!(shell.commands()[0], "reboot -f");
    }

    #[tokio::test]
    async fn test_power_cycle_retries_silent_console() {
        // The console spawns but never shows a prompt.
        let mut silent = record();
        silent.conn_cmd = Some(ConnCmd::Argv(vec!["sleep".into(), "5".into()]));
        let shell = ScriptedShell::new();
        let mut cpe = BfCpe::new(linux_with(&shell, silent, OPTIONS).await)
            .with_reconnect_timeout(Duration::from_millis(300));
        let err = cpe.hw().power_cycle(2).await.unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::Boot { .. })));
        assert!(err.to_string().contains("2 power cycle attempt"));
        assert!(err.to_string().contains("no prompt within"));
    }

    #[tokio::test]
    async fn test_sw_surface() {
        let shell = ScriptedShell::new()
            .reply("ifconfig erouter0", "inet 100.64.0.10  netmask 255.255.255.0\n")
            .reply("uname -r; echo __bft_rc=$?", "5.15.0-bft\n__bft_rc=0\n");
        let mut cpe = BfCpe::new(linux_with(&shell, record(), OPTIONS).await);
        assert_eq!(cpe.hw().mac_address(), Some("00:11:22:33:44:55"));

        let sw = cpe.as_cpe().unwrap().sw();
        assert_eq!(sw.erouter_iface(), "erouter0");
        assert!(sw.is_online().await.unwrap());
        assert_eq!(sw.version().await.unwrap(), "5.15.0-bft");
        sw.wait_for_online(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_times_out() {
        let shell = ScriptedShell::new().reply("ifconfig erouter0", "erouter0: flags=4098<BROADCAST>\n");
        let mut cpe = BfCpe::new(linux_with(&shell, record(), OPTIONS).await);
        assert!(!cpe.sw().is_online().await.unwrap());
        let err = cpe.sw().wait_for_online(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), "DeviceBootFailure");
    }
}
