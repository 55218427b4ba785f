//! WAN-side host: the CPE's upstream, and the origin of WAN traffic.

use async_trait::async_trait;
use log::info;

use super::{base, boxed, contingency_error, dns_sanity};
use crate::device::{Device, DeviceSettings, LinuxDevice};
use crate::error::Result;
use crate::hooks::{HookContext, Stage};
use crate::inventory::DeviceRecord;
use crate::templates::{Template, Wan};

pub const TYPE: &str = "bf_wan";

pub const OPTIONS: &[&str] = &[
    "wan-static-ip",
    "wan-static-route",
    "wan-dhcp-client",
    "dns-check-domain",
];

const TEMPLATES: &[Template] = &[Template::Wan];
const STAGES: &[Stage] = &[
    Stage::ServerBoot,
    Stage::SkipBoot,
    Stage::ContingencyCheck,
    Stage::ShutdownDevice,
];

const DEFAULT_IFACE: &str = "eth1";

pub fn create(record: DeviceRecord, settings: &DeviceSettings) -> Result<Box<dyn Device>> {
    boxed(BfWan::new(base(record, settings, OPTIONS)?))
}

pub struct BfWan {
    base: LinuxDevice,
    iface: String,
}

impl BfWan {
    pub fn new(base: LinuxDevice) -> Self {
        let iface = base
            .record()
            .iface_dut
            .clone()
            .unwrap_or_else(|| DEFAULT_IFACE.to_string());
        Self { base, iface }
    }
}

#[async_trait]
impl Device for BfWan {
    delegate_linux!(base);

    fn templates(&self) -> &[Template] {
        TEMPLATES
    }

    fn stages(&self) -> &[Stage] {
        STAGES
    }

    async fn server_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await?;
        let iface = self.iface.clone();
        let options = self.base.options().clone();

        if let Some(cidr) = options.value("wan-static-ip") {
            self.base.set_static_ip(&iface, cidr).await?;
            if let Some(gateway) = options.value("wan-static-route") {
                self.base.add_route("default", gateway).await?;
            }
        } else if options.has("wan-dhcp-client") {
            let address = self.base.renew_dhcp(&iface).await?;
            info!("[{}] {} leased {}", self.base.name(), iface, address);
        }
        Ok(())
    }

    async fn skip_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    /// The WAN must hold an IPv4 address and resolve names.
    async fn contingency_check(&mut self, ctx: &HookContext<'_>) -> Result<()> {
        let iface = self.iface.clone();
        if let Err(e) = self.base.get_interface_ipv4addr(&iface).await {
            if e.is_transport_or_timeout() {
                return Err(e);
            }
            return Err(contingency_error(&self.base, format!("{iface} has no IPv4 address")));
        }
        dns_sanity(&mut self.base, ctx).await
    }

    async fn shutdown_device(&mut self) -> Result<()> {
        self.base.shutdown().await
    }

    fn as_wan(&mut self) -> Option<&mut dyn Wan> {
        Some(self)
    }
}

impl Wan for BfWan {
    fn iface_dut(&self) -> &str {
        &self.iface
    }

    fn linux(&mut self) -> &mut LinuxDevice {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::devices::tests::{RESOLV, linux_with, ssh_record};
    use crate::inventory::Inventory;
    use crate::test_support::ScriptedShell;

    async fn wan(shell: &ScriptedShell, options: &str) -> BfWan {
        let mut record = ssh_record("wan", TYPE);
        record.options = options.into();
        record.iface_dut = Some("eth0".into());
        BfWan::new(linux_with(shell, record, OPTIONS).await)
    }

    #[tokio::test]
    async fn test_contingency_needs_ipv4() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new()
            .reply("ifconfig eth0", "inet 10.64.38.2  netmask 255.255.255.0\n")
            .reply("cat /etc/resolv.conf", RESOLV);
        let mut device = wan(&shell, "").await;
        device.contingency_check(&ctx).await.unwrap();

        let shell = ScriptedShell::new().reply("ifconfig eth0", "eth0: flags=4098<BROADCAST>\n");
        let mut device = wan(&shell, "").await;
        let err = device.contingency_check(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), "ContingencyCheckError");
    }

    #[tokio::test]
    async fn test_wan_template_defaults() {
        let shell = ScriptedShell::new()
            .reply("ifconfig eth0", "inet addr:10.64.38.2  Bcast:10.64.38.255\n")
            .reply(
                "nslookup www.example.com",
                "Server: 8.8.8.8\nAddress: 8.8.8.8#53\n\nName: www.example.com\nAddress: 93.184.216.34\n",
            );
        let mut device = wan(&shell, "").await;
        let wan = device.as_wan().unwrap();
        assert_eq!(wan.wan_ipv4().await.unwrap(), "10.64.38.2");
        let lookup = wan.dns_lookup("www.example.com").await.unwrap();
        assert_eq!(lookup.domain_ip_addr, ["93.184.216.34"]);
    }

    #[test]
    fn test_unknown_options_are_dropped() {
        let mut record = ssh_record("wan", TYPE);
        record.options = "wan-dhcp-client, lan-static-ip:1.2.3.4/24".into();
        let device = BfWan::new(base(record, &DeviceSettings::default(), OPTIONS).unwrap());
        assert!(device.base.options().has("wan-dhcp-client"));
        assert!(!device.base.options().has("lan-static-ip"));
    }
}
