use std::time::Duration;

use async_trait::async_trait;

use crate::console::Console;
use crate::error::Result;

/// Hardware side of a CPE: power, identity, consoles.
#[async_trait]
pub trait CpeHw: Send {
    /// Base MAC address of the board.
    fn mac_address(&self) -> Option<&str>;

    /// Console by role (`"console"`, ...).
    fn get_console(&mut self, role: &str) -> Result<&mut Console>;

    /// Reboot the board and reconnect, trying up to `retries` times.
    async fn power_cycle(&mut self, retries: u32) -> Result<()>;

    /// Wait until the board answers on its console again.
    async fn wait_for_hw_boot(&mut self, timeout: Duration) -> Result<()>;
}

/// Software side of a CPE: what runs on it.
#[async_trait]
pub trait CpeSw: Send {
    /// Interface that faces the WAN.
    fn erouter_iface(&self) -> &str;

    /// Interface that faces the LAN.
    fn lan_iface(&self) -> &str;

    /// Firmware version string.
    async fn version(&mut self) -> Result<String>;

    /// Whether the WAN interface holds an IPv4 address.
    async fn is_online(&mut self) -> Result<bool>;

    /// Poll until online or `timeout` passes.
    async fn wait_for_online(&mut self, timeout: Duration) -> Result<()>;

    /// Run a command on the CPE shell.
    async fn execute(&mut self, command: &str) -> Result<String>;
}

/// Customer-premises equipment: the device under test.
pub trait Cpe: Send {
    fn hw(&mut self) -> &mut dyn CpeHw;
    fn sw(&mut self) -> &mut dyn CpeSw;
}
