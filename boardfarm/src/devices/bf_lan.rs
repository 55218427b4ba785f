//! LAN client behind the CPE.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{base, boxed, dns_sanity};
use crate::device::{Device, DeviceSettings, Ipv6Scope, LinuxDevice};
use crate::error::{DeviceError, Result};
use crate::hooks::{HookContext, Stage};
use crate::inventory::DeviceRecord;
use crate::templates::{Lan, Template};

pub const TYPE: &str = "bf_lan";

/// Options a `bf_lan` record accepts.
pub const OPTIONS: &[&str] = &[
    "lan-dhcp-client",
    "lan-static-ip",
    "static-route",
    "dns-check-domain",
];

const TEMPLATES: &[Template] = &[Template::Lan];
const STAGES: &[Stage] = &[
    Stage::AttachedDeviceBoot,
    Stage::AttachedDeviceConfigure,
    Stage::SkipBoot,
    Stage::ContingencyCheck,
    Stage::ShutdownDevice,
];

const DEFAULT_IFACE: &str = "eth1";
const DHCPV6_TIMEOUT: Duration = Duration::from_secs(60);

pub fn create(record: DeviceRecord, settings: &DeviceSettings) -> Result<Box<dyn Device>> {
    boxed(BfLan::new(base(record, settings, OPTIONS)?))
}

pub struct BfLan {
    base: LinuxDevice,
    iface: String,
}

impl BfLan {
    pub fn new(base: LinuxDevice) -> Self {
        let iface = base
            .record()
            .iface_dut
            .clone()
            .unwrap_or_else(|| DEFAULT_IFACE.to_string());
        Self { base, iface }
    }

    /// Apply `static-route:<dest> via <gateway>`.
    async fn apply_static_route(&mut self) -> Result<()> {
        let Some(route) = self.base.options().value("static-route").map(str::to_string) else {
            return Ok(());
        };
        let (destination, gateway) = route.split_once(" via ").ok_or_else(|| DeviceError::Configuration {
            device: self.base.name().to_string(),
            message: format!("static-route '{route}' is not '<dest> via <gateway>'"),
        })?;
        self.base.add_route(destination.trim(), gateway.trim()).await
    }
}

#[async_trait]
impl Device for BfLan {
    delegate_linux!(base);

    fn templates(&self) -> &[Template] {
        TEMPLATES
    }

    fn stages(&self) -> &[Stage] {
        STAGES
    }

    async fn attached_device_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    async fn attached_device_configure(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        if let Some(cidr) = self.base.options().value("lan-static-ip").map(str::to_string) {
            let iface = self.iface.clone();
            self.base.set_static_ip(&iface, &cidr).await?;
        } else if self.base.options().has("lan-dhcp-client") {
            let address = self.start_ipv4_lan_client().await?;
            info!("[{}] leased {}", self.base.name(), address);
        }
        self.apply_static_route().await
    }

    async fn skip_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    async fn contingency_check(&mut self, ctx: &HookContext<'_>) -> Result<()> {
        dns_sanity(&mut self.base, ctx).await
    }

    async fn shutdown_device(&mut self) -> Result<()> {
        self.base.shutdown().await
    }

    fn as_lan(&mut self) -> Option<&mut dyn Lan> {
        Some(self)
    }
}

#[async_trait]
impl Lan for BfLan {
    fn iface_dut(&self) -> &str {
        &self.iface
    }

    fn linux(&mut self) -> &mut LinuxDevice {
        &mut self.base
    }

    async fn start_ipv4_lan_client(&mut self) -> Result<String> {
        let iface = self.iface.clone();
        self.base.release_dhcp(&iface).await?;
        self.base.renew_dhcp(&iface).await
    }

    async fn start_ipv6_lan_client(&mut self) -> Result<String> {
        let iface = self.iface.clone();
        self.base
            .execute_or_interrupt(&format!("dhclient -6 -v {iface}"), DHCPV6_TIMEOUT)
            .await?;
        self.base.get_interface_ipv6addr(&iface, Ipv6Scope::Global).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::devices::tests::{RESOLV, linux_with, ssh_record};
    use crate::inventory::Inventory;
    use crate::test_support::ScriptedShell;

    async fn lan(shell: &ScriptedShell, options: &str) -> BfLan {
        let mut record = ssh_record("lan", TYPE);
        record.options = options.into();
        BfLan::new(linux_with(shell, record, OPTIONS).await)
    }

    #[tokio::test]
    async fn test_dhcp_client_configure() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new().reply("ifconfig eth1", "inet 192.168.1.23  netmask 255.255.255.0\n");
        let mut device = lan(&shell, "lan-dhcp-client").await;
        device.attached_device_configure(&ctx).await.unwrap();

        let commands = shell.commands();
        assert!(commands.contains(&"dhclient -r eth1".to_string()));
        assert!(commands.contains(&"dhclient -v eth1".to_string()));
    }

    #[tokio::test]
    async fn test_static_ip_and_route() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new()
            .reply_prefix("ip ", "__bft_rc=0\n")
            .reply("ifconfig eth1", "inet 192.168.1.50  netmask 255.255.255.0\n");
        let mut device = lan(&shell, "lan-static-ip:192.168.1.50/24, static-route:10.0.0.0/8 via 192.168.1.1").await;
        device.attached_device_configure(&ctx).await.unwrap();

        let commands = shell.commands();
        assert!(commands.iter().any(|c| c.starts_with("ip addr add 192.168.1.50/24 dev eth1")));
        assert!(commands.iter().any(|c| c.starts_with("ip route add 10.0.0.0/8 via 192.168.1.1")));
    }

    #[tokio::test]
    async fn test_lan_template_surface() {
        let shell = ScriptedShell::new()
            .reply("cat /etc/resolv.conf", RESOLV)
            .reply(
                "ip -6 addr show dev eth1",
                "inet6 2001:db8:1::23/64 scope global dynamic\ninet6 fe80::23/64 scope link\n",
            );
        let mut device = lan(&shell, "").await;
        assert!(device.satisfies(Template::Lan));
        assert!(!device.implements(Stage::DeviceBoot));

        let lan = device.as_lan().unwrap();
        assert_eq!(lan.iface_dut(), "eth1");
        assert_eq!(lan.start_ipv6_lan_client().await.unwrap(), "2001:db8:1::23");
    }
}
