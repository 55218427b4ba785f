//! Lifecycle orchestration.
//!
//! The orchestrator instantiates every inventory device before any
//! console opens, walks the boot stages in order, runs the selected tests
//! and always finishes with `shutdown_device` on every device, in reverse
//! inventory order. Hooks never overlap: one device's hook completes
//! before the next one starts.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use log::{error, info, warn};
use serde_json::Value;

use crate::config::{HarnessConfig, exit_code};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::hooks::{HookContext, Stage};
use crate::inventory::Inventory;
use crate::manager::DeviceManager;
use crate::registry::DeviceRegistry;
use crate::templates::Template;
use crate::testing::{self, TestContext, TestRegistry, TestResult};

/// Transcript lines quoted in a failure report.
pub const REPORT_LINES: usize = 20;

/// A hook that failed, with enough context to diagnose it.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: Stage,
    pub device: String,
    pub kind: &'static str,
    pub message: String,
    /// Last lines of each console, by role.
    pub transcript: Vec<(String, Vec<String>)>,
}

impl StageFailure {
    fn new(stage: Stage, device: &dyn Device, error: &Error) -> Self {
        Self {
            stage,
            device: device.name().to_string(),
            kind: error.kind(),
            message: error.to_string(),
            transcript: device.transcript_tail(REPORT_LINES),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} failed on '{}' ({}): {}",
            self.stage, self.device, self.kind, self.message
        )?;
        for (role, lines) in &self.transcript {
            writeln!(f, "--- {}.{} (last {} lines) ---", self.device, role, lines.len())?;
            for line in lines {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

/// Result of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub exit_code: i32,
    pub failure: Option<StageFailure>,
    pub results: Vec<TestResult>,
    pub interrupted: bool,
}

/// Drives one run from inventory to shutdown.
pub struct Orchestrator {
    config: HarnessConfig,
    env: Value,
    inventory: Inventory,
    manager: DeviceManager,
    shut_down: HashSet<String>,
}

impl Orchestrator {
    /// Load overlays, the env file and the inventory, then build every
    /// device. Nothing is connected yet; any bad record fails the whole
    /// load.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let registry = DeviceRegistry::global();
        if !config.overlay.is_empty() {
            registry
                .write()
                .map_err(|_| Error::Boardfarm("device registry lock poisoned".into()))?
                .load_overlay(&config.overlay)?;
        }
        let registry = registry
            .read()
            .map_err(|_| Error::Boardfarm("device registry lock poisoned".into()))?;
        Self::with_registry(config, &registry)
    }

    pub fn with_registry(config: HarnessConfig, registry: &DeviceRegistry) -> Result<Self> {
        config.prepare_dirs()?;
        let env = config.load_env()?;
        let inventory = Inventory::load(&config.inventory)?;
        if let Some(board) = &config.board {
            inventory.check_board(board)?;
        }

        let settings = config.device_settings();
        let mut manager = DeviceManager::new();
        for record in inventory.iter() {
            manager.register(registry.instantiate(record.clone(), &settings)?)?;
        }
        info!("{} device(s) loaded from {}", manager.len(), config.inventory.display());

        Ok(Self::from_parts(config, env, inventory, manager))
    }

    /// Assemble from already-built parts.
    pub fn from_parts(config: HarnessConfig, env: Value, inventory: Inventory, manager: DeviceManager) -> Self {
        Self {
            config,
            env,
            inventory,
            manager,
            shut_down: HashSet::new(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn devices(&mut self) -> &mut DeviceManager {
        &mut self.manager
    }

    /// Device names in the order `stage` visits them.
    ///
    /// `server_boot` puts TFTP servers first and provisioners second;
    /// shutdown walks the inventory backwards.
    pub fn stage_order(&self, stage: Stage) -> Vec<String> {
        let mut names = self.manager.names();
        match stage {
            Stage::ServerBoot => {
                let rank = |name: &String| {
                    if self.manager.names_by_type(Template::Tftp).contains(name) {
                        0
                    } else if self.manager.names_by_type(Template::Provisioner).contains(name) {
                        1
                    } else {
                        2
                    }
                };
                names.sort_by_key(rank);
            }
            Stage::ShutdownDevice => names.reverse(),
            _ => {}
        }
        names
    }

    /// Run `stage` on every device that implements it.
    pub async fn run_stage(&mut self, stage: Stage) -> std::result::Result<(), StageFailure> {
        let ctx = HookContext::new(&self.config, &self.inventory, &self.env);
        for name in self.stage_order(stage) {
            let Ok(device) = self.manager.get_device_by_name(&name) else {
                continue;
            };
            if !device.implements(stage) {
                continue;
            }
            info!("{} -> {}", stage, name);
            if let Err(e) = device.run_hook(stage, &ctx).await {
                if !stage.is_fatal() {
                    warn!("{} failed on {}: {}", stage, name, e);
                    continue;
                }
                error!("{} failed on {}: {}", stage, name, e);
                return Err(StageFailure::new(stage, device, &e));
            }
        }
        Ok(())
    }

    /// Boot (or attach to) the topology and run the contingency checks.
    pub async fn deploy(&mut self) -> std::result::Result<(), StageFailure> {
        if self.config.skip_boot {
            self.run_stage(Stage::SkipBoot).await?;
        } else {
            for stage in Stage::BOOT {
                self.run_stage(stage).await?;
            }
        }
        if self.config.skip_contingency_checks {
            info!("contingency checks skipped");
        } else {
            self.run_stage(Stage::ContingencyCheck).await?;
        }
        self.run_stage(Stage::PostDeployDevices).await
    }

    /// Run `shutdown_device` once on every device, in reverse inventory
    /// order. Failures are logged and never stop the remaining devices.
    /// Returns the number of failed shutdowns.
    pub async fn shutdown(&mut self) -> usize {
        let mut failures = 0;
        for name in self.stage_order(Stage::ShutdownDevice) {
            if !self.shut_down.insert(name.clone()) {
                continue;
            }
            let Ok(device) = self.manager.get_device_by_name(&name) else {
                continue;
            };
            info!("{} -> {}", Stage::ShutdownDevice, name);
            if let Err(e) = device.shutdown_device().await {
                warn!("shutdown of {} failed: {}", name, e);
                failures += 1;
            }
        }
        failures
    }

    async fn deploy_and_test(&mut self, tests: &TestRegistry) -> RunSummary {
        if let Err(failure) = self.deploy().await {
            return RunSummary {
                exit_code: failure.stage.failure_exit_code(),
                failure: Some(failure),
                ..RunSummary::default()
            };
        }

        let selected = match tests.select(&self.config.tests) {
            Ok(selected) => selected,
            Err(e) => {
                error!("{}", e);
                return RunSummary {
                    exit_code: exit_code::HARNESS_ERROR,
                    ..RunSummary::default()
                };
            }
        };

        let mut ctx = TestContext {
            devices: &mut self.manager,
            env: &self.env,
            config: &self.config,
        };
        let results = testing::run_tests(&selected, &mut ctx).await;
        RunSummary {
            exit_code: testing::batch_exit_code(&results),
            results,
            ..RunSummary::default()
        }
    }

    /// Deploy, test and shut down.
    pub async fn run(&mut self, tests: &TestRegistry) -> RunSummary {
        let summary = self.deploy_and_test(tests).await;
        self.shutdown().await;
        summary
    }

    /// Like [`run`](Self::run), but `interrupt` completing abandons the
    /// current stage or test and goes straight to shutdown.
    pub async fn run_with_interrupt<F>(&mut self, tests: &TestRegistry, interrupt: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let summary = tokio::select! {
            summary = self.deploy_and_test(tests) => summary,
            () = interrupt => {
                warn!("interrupted; shutting down every device");
                RunSummary {
                    exit_code: exit_code::HARNESS_ERROR,
                    interrupted: true,
                    ..RunSummary::default()
                }
            }
        };
        self.shutdown().await;
        summary
    }
}
