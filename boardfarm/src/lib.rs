//! # Boardfarm
//!
//! Test harness for network equipment driven through interactive consoles.
//!
//! Boardfarm reads an inventory of devices (a CPE under test plus the
//! servers and clients around it), opens a console to each over ssh,
//! telnet, a serial bridge or a local command, boots and configures the
//! topology through a fixed sequence of lifecycle hooks, runs tests that
//! ask for devices by role, and always tears everything down at the end.
//!
//! ## Features
//!
//! - Expect-style consoles over a PTY with regex or literal matching
//! - ssh, telnet (optionally through kermit), ser2net and local commands
//! - Linux device base with shell helpers (addresses, ping, captures, scp)
//! - Template lookups: tests ask for "the LAN", never for a device name
//! - Ordered lifecycle hooks with guaranteed, reverse-order shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use boardfarm::{ConnectionBuilder, ConnectionKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), boardfarm::Error> {
//!     let mut console = ConnectionBuilder::new(ConnectionKind::Ssh, "wan")
//!         .host("10.64.38.2")
//!         .username("root")
//!         .password("bigfoot1")
//!         .connect()
//!         .await?;
//!
//!     let output = console.execute_command("uname -a", None).await?;
//!     println!("{}", output);
//!
//!     console.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod console;
pub mod device;
pub mod devices;
pub mod error;
pub mod hooks;
pub mod inventory;
pub mod manager;
pub mod orchestrator;
pub mod registry;
pub mod shell;
pub mod templates;
pub mod testing;
pub mod use_cases;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use config::{Cli, HarnessConfig};
pub use connection::{ConnectionBuilder, ConnectionKind, ConnectionParams, connection_factory};
pub use console::{Console, ConsoleConfig, ExpectPattern, InteractiveBuilder, InteractiveEvent};
pub use device::{Device, DeviceSettings, LinuxDevice, TcpdumpCapture};
pub use error::{Error, Result};
pub use hooks::{HookContext, Stage};
pub use inventory::{DeviceRecord, Inventory};
pub use manager::DeviceManager;
pub use orchestrator::{Orchestrator, RunSummary, StageFailure};
pub use registry::DeviceRegistry;
pub use shell::ShellDefinition;
pub use templates::Template;
pub use testing::{TestCase, TestContext, TestRegistry};
