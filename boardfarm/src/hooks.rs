//! Lifecycle stages and the context handed to every hook.

use std::fmt;
use std::path::Path;

use serde_json::Value;

use crate::config::{HarnessConfig, exit_code};
use crate::inventory::Inventory;

/// Lifecycle stages, in the order the orchestrator walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    ServerBoot,
    ServerConfigure,
    AttachedDeviceBoot,
    DeviceBoot,
    DeviceConfigure,
    AttachedDeviceConfigure,
    SkipBoot,
    ContingencyCheck,
    PostDeployDevices,
    ShutdownDevice,
}

impl Stage {
    /// Stages of a full boot, run when `--skip-boot` is not given.
    pub const BOOT: [Stage; 6] = [
        Stage::ServerBoot,
        Stage::ServerConfigure,
        Stage::AttachedDeviceBoot,
        Stage::DeviceBoot,
        Stage::DeviceConfigure,
        Stage::AttachedDeviceConfigure,
    ];

    /// Hook name as it appears in logs and reports.
    pub fn hook_name(&self) -> &'static str {
        match self {
            Stage::ServerBoot => "boardfarm_server_boot",
            Stage::ServerConfigure => "boardfarm_server_configure",
            Stage::AttachedDeviceBoot => "boardfarm_attached_device_boot",
            Stage::DeviceBoot => "boardfarm_device_boot",
            Stage::DeviceConfigure => "boardfarm_device_configure",
            Stage::AttachedDeviceConfigure => "boardfarm_attached_device_configure",
            Stage::SkipBoot => "boardfarm_skip_boot",
            Stage::ContingencyCheck => "contingency_check",
            Stage::PostDeployDevices => "boardfarm_post_deploy_devices",
            Stage::ShutdownDevice => "boardfarm_shutdown_device",
        }
    }

    /// A failure in this stage stops the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Stage::ShutdownDevice)
    }

    /// Exit code of a run stopped by a failure in this stage. A failed
    /// sanity check fails the batch, not the harness.
    pub fn failure_exit_code(&self) -> i32 {
        match self {
            Stage::ContingencyCheck => exit_code::TESTS_FAILED,
            _ => exit_code::HARNESS_ERROR,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// Read-only run state visible to hooks.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub config: &'a HarnessConfig,
    pub inventory: &'a Inventory,
    pub env: &'a Value,
}

impl<'a> HookContext<'a> {
    pub fn new(config: &'a HarnessConfig, inventory: &'a Inventory, env: &'a Value) -> Self {
        Self {
            config,
            inventory,
            env,
        }
    }

    /// String parameter from the environment file.
    pub fn env_str(&self, key: &str) -> Option<&'a str> {
        self.env.get(key)?.as_str()
    }

    /// Per-run scratch directory.
    pub fn scratch_dir(&self) -> &'a Path {
        &self.config.scratch_dir
    }

    /// Name of the selected board, if any.
    pub fn board(&self) -> Option<&'a str> {
        self.config.board.as_deref()
    }
}
