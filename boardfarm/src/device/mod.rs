//! Devices.
//!
//! A device is bound to one inventory record and owns the consoles it
//! opens. It takes part in the lifecycle through the per-stage hook
//! methods of [`Device`] and advertises its capabilities through
//! [`Device::templates`] and the `as_*` accessors.

mod capture;
mod linux;
mod options;
mod scp;

pub use capture::TcpdumpCapture;
pub use linux::{DEFAULT_ROLE, Ipv6Scope, LinkState, LinuxDevice, PingOptions};
pub use options::DeviceOptions;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::console::Console;
use crate::error::Result;
use crate::hooks::{HookContext, Stage};
use crate::templates::{Cpe, Lan, Provisioner, SipPhone, SipServer, Template, Tftp, Wan, Wlan};

/// Run-wide console settings every device receives at construction.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Default timeout of every console call.
    pub console_timeout: Duration,

    /// Where `<device>.<role>.log` transcripts go.
    pub console_log_dir: Option<PathBuf>,

    /// Echo console output to stdout.
    pub echo_stdout: bool,

    /// Per-run scratch directory on the harness host.
    pub scratch_dir: PathBuf,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            console_timeout: crate::console::DEFAULT_TIMEOUT,
            console_log_dir: None,
            echo_stdout: false,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// A live device taking part in a run.
///
/// Hook methods default to doing nothing; the orchestrator only calls the
/// ones named by [`stages`](Device::stages). Every hook runs to completion
/// before the next device's hook starts.
#[async_trait]
pub trait Device: Send {
    /// Inventory name.
    fn name(&self) -> &str;

    /// Inventory `type`.
    fn device_type(&self) -> &str;

    /// Templates this device satisfies.
    fn templates(&self) -> &[Template];

    /// Stages this device implements.
    fn stages(&self) -> &[Stage];

    fn implements(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }

    fn satisfies(&self, template: Template) -> bool {
        self.templates().contains(&template)
    }

    async fn server_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn server_configure(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn attached_device_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn device_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn device_configure(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn attached_device_configure(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Open consoles without changing device state.
    async fn skip_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn contingency_check(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn post_deploy(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Release every resource. Must be idempotent and must cope with a
    /// device that never finished booting.
    async fn shutdown_device(&mut self) -> Result<()> {
        Ok(())
    }

    /// Dispatch `stage` to its hook method.
    async fn run_hook(&mut self, stage: Stage, ctx: &HookContext<'_>) -> Result<()> {
        match stage {
            Stage::ServerBoot => self.server_boot(ctx).await,
            Stage::ServerConfigure => self.server_configure(ctx).await,
            Stage::AttachedDeviceBoot => self.attached_device_boot(ctx).await,
            Stage::DeviceBoot => self.device_boot(ctx).await,
            Stage::DeviceConfigure => self.device_configure(ctx).await,
            Stage::AttachedDeviceConfigure => self.attached_device_configure(ctx).await,
            Stage::SkipBoot => self.skip_boot(ctx).await,
            Stage::ContingencyCheck => self.contingency_check(ctx).await,
            Stage::PostDeployDevices => self.post_deploy(ctx).await,
            Stage::ShutdownDevice => self.shutdown_device().await,
        }
    }

    /// Console registered under `role`.
    fn console(&mut self, role: &str) -> Result<&mut Console>;

    /// Roles of the consoles currently open.
    fn console_roles(&self) -> Vec<String>;

    /// Last `lines` lines of every console, by role.
    fn transcript_tail(&self, lines: usize) -> Vec<(String, Vec<String>)>;

    fn linux(&mut self) -> Option<&mut LinuxDevice> {
        None
    }

    fn as_cpe(&mut self) -> Option<&mut dyn Cpe> {
        None
    }

    fn as_lan(&mut self) -> Option<&mut dyn Lan> {
        None
    }

    fn as_wan(&mut self) -> Option<&mut dyn Wan> {
        None
    }

    fn as_provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        None
    }

    fn as_tftp(&mut self) -> Option<&mut dyn Tftp> {
        None
    }

    fn as_sip_server(&mut self) -> Option<&mut dyn SipServer> {
        None
    }

    fn as_sip_phone(&mut self) -> Option<&mut dyn SipPhone> {
        None
    }

    fn as_wlan(&mut self) -> Option<&mut dyn Wlan> {
        None
    }
}
