use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiBand {
    Ghz2_4,
    Ghz5,
    Ghz6,
}

impl fmt::Display for WifiBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WifiBand::Ghz2_4 => "2.4",
            WifiBand::Ghz5 => "5",
            WifiBand::Ghz6 => "6",
        })
    }
}

/// A Wi-Fi client.
#[async_trait]
pub trait Wlan: Send {
    /// Wireless interface name.
    fn iface_wifi(&self) -> &str;

    async fn wifi_client_connect(
        &mut self,
        ssid: &str,
        password: Option<&str>,
        band: WifiBand,
    ) -> Result<()>;

    async fn wifi_disconnect(&mut self) -> Result<()>;

    async fn is_wlan_connected(&mut self) -> Result<bool>;
}
