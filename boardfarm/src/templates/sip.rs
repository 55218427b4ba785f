use async_trait::async_trait;

use crate::error::Result;

/// A SIP softswitch.
#[async_trait]
pub trait SipServer: Send {
    async fn sipserver_start(&mut self) -> Result<()>;
    async fn sipserver_stop(&mut self) -> Result<()>;
    async fn sipserver_status(&mut self) -> Result<String>;

    /// Register a subscriber.
    async fn sipserver_user_add(&mut self, user: &str, password: &str) -> Result<()>;
}

/// A SIP endpoint.
#[async_trait]
pub trait SipPhone: Send {
    /// Directory number of this phone.
    fn number(&self) -> &str;

    async fn phone_start(&mut self) -> Result<()>;
    async fn phone_kill(&mut self) -> Result<()>;
    async fn on_hook(&mut self) -> Result<()>;
    async fn off_hook(&mut self) -> Result<()>;
    async fn dial(&mut self, number: &str) -> Result<()>;
    async fn answer(&mut self) -> Result<bool>;
}
