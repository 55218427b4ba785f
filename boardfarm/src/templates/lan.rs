use async_trait::async_trait;

use crate::device::LinuxDevice;
use crate::error::Result;

/// A LAN client host behind the CPE.
#[async_trait]
pub trait Lan: Send {
    /// Interface facing the CPE.
    fn iface_dut(&self) -> &str;

    /// The shell-level helpers of this host.
    fn linux(&mut self) -> &mut LinuxDevice;

    /// Obtain an IPv4 lease from the CPE; returns the address.
    async fn start_ipv4_lan_client(&mut self) -> Result<String>;

    /// Obtain an IPv6 lease from the CPE; returns the global address.
    async fn start_ipv6_lan_client(&mut self) -> Result<String>;

    /// Give the IPv4 lease back.
    async fn release_ipv4_lan_client(&mut self) -> Result<()> {
        let iface = self.iface_dut().to_string();
        self.linux().release_dhcp(&iface).await
    }
}
