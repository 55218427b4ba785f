use async_trait::async_trait;

use crate::device::LinuxDevice;
use crate::error::Result;
use crate::use_cases::DnsLookup;

/// The WAN-side host the CPE talks to.
#[async_trait]
pub trait Wan: Send {
    /// Interface facing the CPE.
    fn iface_dut(&self) -> &str;

    /// The shell-level helpers of this host.
    fn linux(&mut self) -> &mut LinuxDevice;

    /// IPv4 address of the WAN-side interface.
    async fn wan_ipv4(&mut self) -> Result<String> {
        let iface = self.iface_dut().to_string();
        self.linux().get_interface_ipv4addr(&iface).await
    }

    /// Resolve `domain` from the WAN host.
    async fn dns_lookup(&mut self, domain: &str) -> Result<DnsLookup> {
        self.linux().nslookup(domain, None).await
    }
}
