use async_trait::async_trait;

use crate::error::Result;

/// A fixed DHCP lease for one CPE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Host name used in the server configuration.
    pub name: String,

    /// CPE MAC address.
    pub mac: String,

    /// Address to hand out, if pinned.
    pub ipv4: Option<String>,
}

/// A DHCP/provisioning server.
#[async_trait]
pub trait Provisioner: Send {
    /// Interface serving the CPE.
    fn iface_dut(&self) -> &str;

    /// Add a reservation and apply it.
    async fn provision_cpe(&mut self, reservation: &Reservation) -> Result<()>;

    /// Restart the DHCP service.
    async fn restart_dhcp_server(&mut self) -> Result<()>;
}
