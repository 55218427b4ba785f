//! Harness configuration.
//!
//! Everything comes from the command line, with `BFT_DEBUG` and
//! `BFT_OVERLAY` read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use serde_json::Value;

use crate::device::DeviceSettings;
use crate::error::{InventoryError, Result};

/// Exit codes of the harness.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const TESTS_FAILED: i32 = 1;
    pub const HARNESS_ERROR: i32 = 2;
}

/// bft -- boot a device topology, run tests against it, tear it down
#[derive(Debug, Parser)]
#[command(name = "bft", version, about = "Boardfarm test harness")]
pub struct Cli {
    /// Test suites or test ids to run (default: the sanity suite)
    pub tests: Vec<String>,

    /// Inventory file (JSON)
    #[arg(long, short = 'i')]
    pub inventory: PathBuf,

    /// Environment / test-parameter file (JSON)
    #[arg(long, short = 'e')]
    pub env: Option<PathBuf>,

    /// Name of the device under test
    #[arg(long, short = 'b')]
    pub board: Option<String>,

    /// Reuse booted devices: open consoles only
    #[arg(long)]
    pub skip_boot: bool,

    /// Bypass pre-test sanity checks
    #[arg(long)]
    pub skip_contingency_checks: bool,

    /// Tee every console transcript into DIR/<device>.<role>.log
    #[arg(long, value_name = "DIR")]
    pub save_console_logs: Option<PathBuf>,

    /// Directory for per-run artefacts (default: <tmp>/bft-<pid>)
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Default console timeout in seconds
    #[arg(long, default_value = "30")]
    pub console_timeout: u64,

    /// Echo every console byte to stdout
    #[arg(
        long = "debug-console",
        env = "BFT_DEBUG",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub debug: bool,

    /// Extra device-class alias files or directories (space-separated)
    #[arg(long, env = "BFT_OVERLAY", value_delimiter = ' ')]
    pub overlay: Vec<PathBuf>,

    /// Log at debug level
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub inventory: PathBuf,
    pub env_file: Option<PathBuf>,
    pub board: Option<String>,
    pub skip_boot: bool,
    pub skip_contingency_checks: bool,
    pub save_console_logs: Option<PathBuf>,
    pub scratch_dir: PathBuf,
    pub console_timeout: Duration,
    pub debug: bool,
    pub overlay: Vec<PathBuf>,
    pub tests: Vec<String>,
}

impl HarnessConfig {
    /// Defaults for an inventory file, as if no flag were given.
    pub fn new(inventory: impl Into<PathBuf>) -> Self {
        Self {
            inventory: inventory.into(),
            env_file: None,
            board: None,
            skip_boot: false,
            skip_contingency_checks: false,
            save_console_logs: None,
            scratch_dir: default_scratch_dir(),
            console_timeout: crate::console::DEFAULT_TIMEOUT,
            debug: false,
            overlay: Vec::new(),
            tests: Vec::new(),
        }
    }

    /// Console settings handed to every device.
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            console_timeout: self.console_timeout,
            console_log_dir: self.save_console_logs.clone(),
            echo_stdout: self.debug,
            scratch_dir: self.scratch_dir.clone(),
        }
    }

    /// Create the scratch and console-log directories.
    pub fn prepare_dirs(&self) -> Result<()> {
        create_dir(&self.scratch_dir)?;
        if let Some(dir) = &self.save_console_logs {
            create_dir(dir)?;
        }
        Ok(())
    }

    /// Load the `--env` file, or an empty object.
    pub fn load_env(&self) -> Result<Value> {
        let Some(path) = &self.env_file else {
            return Ok(Value::Object(Default::default()));
        };
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&text).map_err(InventoryError::from)?)
    }
}

impl From<Cli> for HarnessConfig {
    fn from(cli: Cli) -> Self {
        Self {
            inventory: cli.inventory,
            env_file: cli.env,
            board: cli.board,
            skip_boot: cli.skip_boot,
            skip_contingency_checks: cli.skip_contingency_checks,
            save_console_logs: cli.save_console_logs,
            scratch_dir: cli.scratch_dir.unwrap_or_else(default_scratch_dir),
            console_timeout: Duration::from_secs(cli.console_timeout),
            debug: cli.debug,
            overlay: cli.overlay,
            tests: cli.tests,
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("bft-{}", std::process::id()))
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| {
        InventoryError::Read {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["bft", "--inventory", "inv.json"]).unwrap();
        let config = HarnessConfig::from(cli);
        assert_eq!(config.inventory, PathBuf::from("inv.json"));
        assert!(!config.skip_boot);
        assert_eq!(config.console_timeout, Duration::from_secs(30));
        assert!(config
            .scratch_dir
            .to_string_lossy()
            .contains(&format!("bft-{}", std::process::id())));
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "bft",
            "sanity",
            "lan_wan_ping",
            "-i",
            "inv.json",
            "--board",
            "cpe1",
            "--skip-boot",
            "--skip-contingency-checks",
            "--save-console-logs",
            "/tmp/logs",
        ])
        .unwrap();
        assert_eq!(cli.tests, ["sanity", "lan_wan_ping"]);
        let config = HarnessConfig::from(cli);
        assert_eq!(config.board.as_deref(), Some("cpe1"));
        assert!(config.skip_boot && config.skip_contingency_checks);
        let settings = config.device_settings();
        assert_eq!(settings.console_log_dir, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn test_inventory_is_required() {
        assert!(Cli::try_parse_from(["bft"]).is_err());
    }

    #[test]
    fn test_load_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        std::fs::write(&path, r#"{"dns_check_domain": "example.com"}"#).unwrap();
        let mut config = HarnessConfig::new("inv.json");
        assert_eq!(config.load_env().unwrap(), serde_json::json!({}));
        config.env_file = Some(path);
        assert_eq!(config.load_env().unwrap()["dns_check_domain"], "example.com");
    }
}
