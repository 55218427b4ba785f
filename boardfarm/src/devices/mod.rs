//! Generic shell-driven devices.
//!
//! Each device wraps a [`LinuxDevice`] and adds the hooks and template
//! surface of its role. They cover a plain Linux lab: a LAN client, a WAN
//! host, a TFTP server, an ISC dhcpd provisioner and a Linux-based CPE.

use log::info;

use crate::device::{Device, DeviceSettings, LinuxDevice};
use crate::error::{DeviceError, Error, Result};
use crate::hooks::HookContext;
use crate::inventory::DeviceRecord;
use crate::registry::DeviceRegistry;

/// Implements the record/console accessors of [`Device`] by forwarding
/// to a [`LinuxDevice`] field.
macro_rules! delegate_linux {
    ($field:ident) => {
        fn name(&self) -> &str {
            self.$field.name()
        }

        fn device_type(&self) -> &str {
            self.$field.device_type()
        }

        fn console(&mut self, role: &str) -> $crate::error::Result<&mut $crate::console::Console> {
            self.$field.console_by_role(role)
        }

        fn console_roles(&self) -> Vec<String> {
            self.$field.console_roles()
        }

        fn transcript_tail(&self, lines: usize) -> Vec<(String, Vec<String>)> {
            self.$field.transcript_tail(lines)
        }

        fn linux(&mut self) -> Option<&mut $crate::device::LinuxDevice> {
            Some(&mut self.$field)
        }
    };
}

pub mod bf_cpe;
pub mod bf_dhcp;
pub mod bf_lan;
pub mod bf_tftp;
pub mod bf_wan;

pub use bf_cpe::BfCpe;
pub use bf_dhcp::BfDhcp;
pub use bf_lan::BfLan;
pub use bf_tftp::BfTftp;
pub use bf_wan::BfWan;

/// Register every device type of this module.
pub(crate) fn register_builtin(registry: &mut DeviceRegistry) {
    let builtin: [(&str, crate::registry::DeviceConstructor); 5] = [
        (bf_lan::TYPE, bf_lan::create),
        (bf_wan::TYPE, bf_wan::create),
        (bf_tftp::TYPE, bf_tftp::create),
        (bf_dhcp::TYPE, bf_dhcp::create),
        (bf_cpe::TYPE, bf_cpe::create),
    ];
    for (name, constructor) in builtin {
        registry.insert(name, constructor);
    }
}

fn boxed<D: Device + 'static>(device: D) -> Result<Box<dyn Device>> {
    Ok(Box::new(device))
}

fn base(record: DeviceRecord, settings: &DeviceSettings, options: &[&str]) -> Result<LinuxDevice> {
    LinuxDevice::new(record, settings.clone(), options)
}

fn contingency_error(device: &LinuxDevice, message: impl Into<String>) -> crate::error::Error {
    DeviceError::Contingency {
        device: device.name().to_string(),
        message: message.into(),
    }
    .into()
}

/// DNS part of the LAN/WAN contingency check.
///
/// Requires a nameserver in `/etc/resolv.conf`. When a check domain is
/// configured (env `dns_check_domain`, or the device option
/// `dns-check-domain`) it must also resolve.
pub(crate) async fn dns_sanity(device: &mut LinuxDevice, ctx: &HookContext<'_>) -> Result<()> {
    let resolv = device.execute("cat /etc/resolv.conf").await?;
    if !resolv
        .lines()
        .any(|line| line.trim_start().starts_with("nameserver"))
    {
        return Err(contingency_error(device, "no nameserver in /etc/resolv.conf"));
    }

    let domain = ctx
        .env_str("dns_check_domain")
        .or_else(|| device.options().value("dns-check-domain"))
        .map(str::to_string);
    if let Some(domain) = domain {
        match device.nslookup(&domain, None).await {
            Ok(lookup) => info!(
                "[{}] {} resolves to {}",
                device.name(),
                domain,
                lookup.domain_ip_addr.join(", ")
            ),
            Err(e @ Error::UseCase(_)) => {
                return Err(contingency_error(device, format!("cannot resolve {domain}: {e}")));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::device::DEFAULT_ROLE;
    use crate::inventory::Inventory;
    use crate::test_support::ScriptedShell;

    pub(crate) const RESOLV: &str = "nameserver 8.8.8.8\n";

    pub(crate) async fn linux_with(shell: &ScriptedShell, record: DeviceRecord, options: &[&str]) -> LinuxDevice {
        let mut device = base(record, &DeviceSettings::default(), options).unwrap();
        let console = shell.console(&format!("{}.console", device.name())).await;
        device.attach_console(DEFAULT_ROLE, console);
        device
    }

    pub(crate) fn ssh_record(name: &str, device_type: &str) -> DeviceRecord {
        let mut record = DeviceRecord::new(name, device_type, "ssh");
        record.ipaddr = Some("10.0.0.2".into());
        record
    }

    #[tokio::test]
    async fn test_dns_sanity() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({"dns_check_domain": "www.example.com"});
        let ctx = HookContext::new(&config, &inventory, &env);

        let shell = ScriptedShell::new()
            .reply("cat /etc/resolv.conf", RESOLV)
            .reply(
                "nslookup www.example.com",
                "Server: 8.8.8.8\nAddress: 8.8.8.8#53\n\nName: www.example.com\nAddress: 93.184.216.34\n",
            );
        let mut device = linux_with(&shell, ssh_record("wan", "bf_wan"), &[]).await;
        dns_sanity(&mut device, &ctx).await.unwrap();

        let shell = ScriptedShell::new().reply("cat /etc/resolv.conf", "# empty\n");
        let mut device = linux_with(&shell, ssh_record("wan", "bf_wan"), &[]).await;
        let err = dns_sanity(&mut device, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "ContingencyCheckError");
    }

    #[tokio::test]
    async fn test_dns_sanity_unresolvable() {
        let config = HarnessConfig::new("inv.json");
        let inventory = Inventory::default();
        let env = serde_json::json!({});
        let ctx = HookContext::new(&config, &inventory, &env);

        let mut record = ssh_record("lan", "bf_lan");
        record.options = "dns-check-domain:nope.invalid".into();
        let shell = ScriptedShell::new()
            .reply("cat /etc/resolv.conf", RESOLV)
            .reply(
                "nslookup nope.invalid",
                "Server: 8.8.8.8\nAddress: 8.8.8.8#53\n\n** server can't find nope.invalid: NXDOMAIN\n",
            );
        let mut device = linux_with(&shell, record, &[]).await;
        let err = dns_sanity(&mut device, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "ContingencyCheckError");
        assert!(err.to_string().contains("nope.invalid"));
    }
}
