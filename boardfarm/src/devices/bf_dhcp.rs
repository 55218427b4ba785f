//! ISC dhcpd provisioner.
//!
//! During `server_configure` every inventory record carrying a `mac` gets
//! a host reservation in a dedicated include file, then dhcpd restarts.

use async_trait::async_trait;
use log::info;

use super::{base, boxed};
use crate::device::{Device, DeviceSettings, LinuxDevice};
use crate::error::Result;
use crate::hooks::{HookContext, Stage};
use crate::inventory::{DeviceRecord, Inventory};
use crate::templates::{Provisioner, Reservation, Template};

pub const TYPE: &str = "bf_dhcp";

pub const OPTIONS: &[&str] = &["dhcp-no-restart"];

const TEMPLATES: &[Template] = &[Template::Provisioner];
const STAGES: &[Stage] = &[
    Stage::ServerBoot,
    Stage::ServerConfigure,
    Stage::SkipBoot,
    Stage::ShutdownDevice,
];

const DEFAULT_IFACE: &str = "eth1";
const DEFAULT_RESERVATIONS: &str = "/etc/dhcp/bft-reservations.conf";
const DEFAULT_RESTART: &str = "service isc-dhcp-server restart";

pub fn create(record: DeviceRecord, settings: &DeviceSettings) -> Result<Box<dyn Device>> {
    boxed(BfDhcp::new(base(record, settings, OPTIONS)?))
}

/// Reservations for every other record that names a MAC address.
pub fn reservations(inventory: &Inventory, own_name: &str) -> Vec<Reservation> {
    inventory
        .iter()
        .filter(|record| record.name != own_name)
        .filter_map(|record| {
            Some(Reservation {
                name: record.name.clone(),
                mac: record.mac.clone()?,
                ipv4: record.extra_str("ipv4").map(str::to_string),
            })
        })
        .collect()
}

/// dhcpd `host` stanza for one reservation, on one line.
pub fn host_stanza(reservation: &Reservation) -> String {
    let mut stanza = format!(
        "host {} {{ hardware ethernet {};",
        reservation.name,
        reservation.mac.to_lowercase()
    );
    if let Some(ip) = &reservation.ipv4 {
        stanza.push_str(&format!(" fixed-address {ip};"));
    }
    stanza.push_str(" }");
    stanza
}

pub struct BfDhcp {
    base: LinuxDevice,
    iface: String,
    reservations_file: String,
}

impl BfDhcp {
    pub fn new(base: LinuxDevice) -> Self {
        let record = base.record();
        let iface = record
            .iface_dut
            .clone()
            .unwrap_or_else(|| DEFAULT_IFACE.to_string());
        let reservations_file = record
            .extra_str("reservations_file")
            .unwrap_or(DEFAULT_RESERVATIONS)
            .to_string();
        Self {
            base,
            iface,
            reservations_file,
        }
    }

    async fn write_reservations(&mut self, reservations: &[Reservation], append: bool) -> Result<()> {
        let lines: Vec<String> = reservations
            .iter()
            .map(|r| format!("'{}'", host_stanza(r)))
            .collect();
        let redirect = if append { ">>" } else { ">" };
        let command = if lines.is_empty() {
            format!(": {redirect} {}", self.reservations_file)
        } else {
            format!(
                "printf '%s\\n' {} {redirect} {}",
                lines.join(" "),
                self.reservations_file
            )
        };
        self.base.check_output(&command).await?;
        Ok(())
    }
}

#[async_trait]
impl Device for BfDhcp {
    delegate_linux!(base);

    fn templates(&self) -> &[Template] {
        TEMPLATES
    }

    fn stages(&self) -> &[Stage] {
        STAGES
    }

    async fn server_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    async fn server_configure(&mut self, ctx: &HookContext<'_>) -> Result<()> {
        let reservations = reservations(ctx.inventory, self.base.name());
        info!(
            "[{}] writing {} reservation(s) to {}",
            self.base.name(),
            reservations.len(),
            self.reservations_file
        );
        self.write_reservations(&reservations, false).await?;
        if self.base.options().has("dhcp-no-restart") {
            return Ok(());
        }
        self.restart_dhcp_server().await
    }

    async fn skip_boot(&mut self, _ctx: &HookContext<'_>) -> Result<()> {
        self.base.connect().await
    }

    async fn shutdown_device(&mut self) -> Result<()> {
        self.base.shutdown().await
    }

    fn as_provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }
}

#[async_trait]
impl Provisioner for BfDhcp {
    fn iface_dut(&self) -> &str {
        &self.iface
    }

    async fn provision_cpe(&mut self, reservation: &Reservation) -> Result<()> {
        self.write_reservations(std::slice::from_ref(reservation), true)
            .await?;
        self.restart_dhcp_server().await
    }

    async fn restart_dhcp_server(&mut self) -> Result<()> {
        let restart = self
            .base
            .record()
            .extra_str("dhcp_restart_cmd")
            .unwrap_or(DEFAULT_RESTART)
            .to_string();
        self.base.check_output(&restart).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::devices::tests::{linux_with, ssh_record};
    use crate::test_support::ScriptedShell;

    const INVENTORY: &str = r#"{"devices": [
        {"name": "prov", "type": "bf_dhcp", "connection_type": "ssh", "ipaddr": "10.0.0.3"},
        {"name": "cpe", "type": "bf_cpe", "connection_type": "ser2net",
         "conn_cmd": "picocom /dev/ttyUSB0", "mac": "00:AA:BB:CC:DD:EE", "ipv4": "10.1.0.10"},
        {"name": "lan", "type": "bf_lan", "connection_type": "ssh", "ipaddr": "10.0.0.4"}
    ]}"#;

    #[test]
    fn test_reservations_from_inventory() {
        let inventory = Inventory::from_json(INVENTORY).unwrap();
        let reservations = reservations(&inventory, "prov");
        assert_eq!(reservations.len(), 1);
        assert_eq!(
            host_stanza(&reservations[0]),
            "host cpe { hardware ethernet 00:aa:bb:cc:dd:ee; fixed-address 10.1.0.10; }"
        );
    }

    #[tokio::test]
    async fn test_server_configure_writes_and_restarts() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::from_json(INVENTORY).unwrap();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new()
            .reply_prefix("printf", "__bft_rc=0\n")
            .reply_prefix("service isc-dhcp-server restart", "__bft_rc=0\n");
        let mut device = BfDhcp::new(linux_with(&shell, ssh_record("prov", TYPE), OPTIONS).await);
        device.server_configure(&ctx).await.unwrap();

        let commands = shell.commands();
        assert!(commands[0].contains("hardware ethernet 00:aa:bb:cc:dd:ee"));
        assert!(commands[0].contains("> /etc/dhcp/bft-reservations.conf"));
        assert!(commands[1].starts_with("service isc-dhcp-server restart"));
    }

    #[tokio::test]
    async fn test_provision_cpe_appends() {
        let shell = ScriptedShell::new()
            .reply_prefix("printf", "__bft_rc=0\n")
            .reply_prefix("service", "__bft_rc=0\n");
        let mut device = BfDhcp::new(linux_with(&shell, ssh_record("prov", TYPE), OPTIONS).await);
        let reservation = Reservation {
            name: "cpe2".into(),
            mac: "00:11:22:33:44:55".into(),
            ipv4: None,
        };
        device.provision_cpe(&reservation).await.unwrap();
        assert!(shell.commands()[0].contains(">> /etc/dhcp/bft-reservations.conf"));
    }
}
