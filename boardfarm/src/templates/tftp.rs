use async_trait::async_trait;

use crate::error::Result;

/// A TFTP server the CPE bootloader can flash from.
#[async_trait]
pub trait Tftp: Send {
    /// Directory served over TFTP.
    fn tftp_dir(&self) -> &str;

    /// Fetch `uri` into the served directory; returns the file name.
    async fn download_image(&mut self, uri: &str) -> Result<String>;

    /// Whether the TFTP daemon is running.
    async fn is_serving(&mut self) -> Result<bool>;
}
