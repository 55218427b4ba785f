//! TFTP server holding CPE images.

use async_trait::async_trait;

use super::{base, boxed};
use crate::device::{Device, DeviceSettings, LinuxDevice};
use crate::error::Result;
use crate::hooks::{HookContext, Stage};
use crate::inventory::DeviceRecord;
use crate::templates::{Template, Tftp};

pub const TYPE: &str = "bf_tftp";

pub const OPTIONS: &[&str] = &["tftpd-server"];

const TEMPLATES: &[Template] = &[Template::Tftp];
const STAGES: &[Stage] = &[
    Stage::ServerBoot,
    Stage::SkipBoot,
    Stage::PostDeployDevices,
    Stage::ShutdownDevice,
];

const DEFAULT_TFTP_DIR: &str = "/tftpboot";
const DEFAULT_RESTART: &str = "service tftpd-hpa restart";

pub fn create(record: DeviceRecord, settings: &DeviceSettings) -> Result<Box<dyn Device>> {
    boxed(BfTftp::new(base(record, settings, OPTIONS)?))
}

pub struct BfTftp {
    base: LinuxDevice,
    tftp_dir: String,
}

impl BfTftp {
    pub fn new(base: LinuxDevice) -> Self {
        let tftp_dir = base
            .record()
            .extra_str("tftp_dir")
            .unwrap_or(DEFAULT_TFTP_DIR)
            .to_string();
        Self { base, tftp_dir }
    }
}

#[async_trait]
impl Device for BfTftp {
    delegate_linux!(base);

    fn templates(&self) -> &[Template] {
        TEMPLATES
    }

    fn stages(&self) -> &[Stage] {
        STAGES
    }

    async fn server_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await?;
        self.base
            .check_output(&format!("mkdir -p {}", self.tftp_dir))
            .await?;
        if self.base.options().has("tftpd-server") {
            let restart = self
                .base
                .record()
                .extra_str("tftpd_restart_cmd")
                .unwrap_or(DEFAULT_RESTART)
                .to_string();
            self.base.check_output(&restart).await?;
        }
        Ok(())
    }

    async fn skip_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    /// Images are in place; the console is not needed for the tests.
    async fn post_deploy(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.disconnect().await;
        Ok(())
    }

    async fn shutdown_device(&mut self) -> Result<()> {
        self.base.shutdown().await
    }

    fn as_tftp(&mut self) -> Option<&mut dyn Tftp> {
        Some(self)
    }
}

#[async_trait]
impl Tftp for BfTftp {
    fn tftp_dir(&self) -> &str {
        &self.tftp_dir
    }

    /// Reconnects when the console was released after deploy.
    async fn download_image(&mut self, uri: &str) -> Result<String> {
        self.base.connect().await?;
        let dir = self.tftp_dir.clone();
        self.base.download_file_from_uri(uri, &dir).await
    }

    async fn is_serving(&mut self) -> Result<bool> {
        self.base.connect().await?;
        let (_, status) = self.base.run_with_status("pgrep in.tftpd").await?;
        Ok(status == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::devices::tests::{linux_with, ssh_record};
    use crate::inventory::Inventory;
    use crate::test_support::ScriptedShell;

    #[tokio::test]
    async fn test_post_deploy_releases_console() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new();
        let mut device = BfTftp::new(linux_with(&shell, ssh_record("tftp", TYPE), OPTIONS).await);
        assert_eq!(device.tftp_dir(), "/tftpboot");
        device.post_deploy(&ctx).await.unwrap();
        assert!(device.console_roles().is_empty());
        device.shutdown_device().await.unwrap();
    }

    #[tokio::test]
    async fn test_download_image() {
        let mut record = ssh_record("tftp", TYPE);
        record.extra.insert("tftp_dir".into(), "/srv/tftp".into());
        let shell = ScriptedShell::new()
            .reply_prefix("wget", "__bft_rc=0\n")
            .reply("pgrep in.tftpd; echo __bft_rc=$?", "1234\n__bft_rc=0\n");
        let mut device = BfTftp::new(linux_with(&shell, record, OPTIONS).await);
        let path = device.download_image("http://10.0.0.1/images/cpe.bin").await.unwrap();
        assert_eq!(path, "/srv/tftp/cpe.bin");
        assert!(device.is_serving().await.unwrap());
    }
}
