//! Test cases, their registry and the results table.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{error, info};
use serde_json::Value;

use crate::config::{HarnessConfig, exit_code};
use crate::device::{DEFAULT_ROLE, PingOptions};
use crate::error::{DeviceError, Error, ManagerError, Result};
use crate::manager::DeviceManager;

/// Suite run when no test is named on the command line.
pub const DEFAULT_SUITE: &str = "sanity";

/// What a test sees: the devices by template plus the run parameters.
pub struct TestContext<'a> {
    pub devices: &'a mut DeviceManager,
    pub env: &'a Value,
    pub config: &'a HarnessConfig,
}

impl TestContext<'_> {
    pub fn env_str(&self, key: &str) -> Option<&str> {
        self.env.get(key)?.as_str()
    }
}

#[async_trait]
pub trait TestCase: Send + Sync {
    fn id(&self) -> &str;

    fn suite(&self) -> &str;

    async fn run(&self, ctx: &mut TestContext<'_>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    Failed(String),
    /// The topology lacks a device the test needs.
    Skipped(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASSED",
            Outcome::Failed(_) => "FAILED",
            Outcome::Skipped(_) => "SKIPPED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub id: String,
    pub suite: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// Known test cases, in registration order.
#[derive(Default)]
pub struct TestRegistry {
    tests: Vec<Box<dyn TestCase>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sanity suite.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ConsoleEcho));
        registry.register(Box::new(LanWanPing));
        registry.register(Box::new(WanDns));
        registry
    }

    pub fn register(&mut self, test: Box<dyn TestCase>) {
        self.tests.push(test);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.id())
    }

    /// Resolve suite names and test ids. An empty selection means the
    /// default suite. Unknown names are an error; duplicates run once.
    pub fn select(&self, names: &[String]) -> Result<Vec<&dyn TestCase>> {
        let default = [DEFAULT_SUITE.to_string()];
        let names = if names.is_empty() { &default[..] } else { names };

        let mut selected: Vec<&dyn TestCase> = Vec::new();
        for name in names {
            let matching: Vec<&dyn TestCase> = self
                .tests
                .iter()
                .filter(|t| t.id() == name.as_str() || t.suite() == name.as_str())
                .map(|t| t.as_ref())
                .collect();
            if matching.is_empty() {
                return Err(Error::Boardfarm(format!("unknown test or suite '{name}'")));
            }
            for test in matching {
                if !selected.iter().any(|s| s.id() == test.id()) {
                    selected.push(test);
                }
            }
        }
        Ok(selected)
    }
}

/// Run `tests` one after another. A failing test never stops the others.
pub async fn run_tests(tests: &[&dyn TestCase], ctx: &mut TestContext<'_>) -> Vec<TestResult> {
    let mut results = Vec::with_capacity(tests.len());
    for test in tests {
        info!("running {}::{}", test.suite(), test.id());
        let started = Instant::now();
        let outcome = match test.run(ctx).await {
            Ok(()) => Outcome::Passed,
            Err(Error::Manager(ManagerError::NoDevice { template })) => {
                Outcome::Skipped(format!("no {template} device in inventory"))
            }
            Err(e) => {
                error!("{} failed: {} ({})", test.id(), e, e.kind());
                Outcome::Failed(format!("{}: {}", e.kind(), e))
            }
        };
        results.push(TestResult {
            id: test.id().to_string(),
            suite: test.suite().to_string(),
            outcome,
            duration: started.elapsed(),
        });
    }
    results
}

/// Exit code for a finished batch.
pub fn batch_exit_code(results: &[TestResult]) -> i32 {
    if results.iter().any(|r| matches!(r.outcome, Outcome::Failed(_))) {
        exit_code::TESTS_FAILED
    } else {
        exit_code::SUCCESS
    }
}

/// Plain-text results table.
pub fn results_table(results: &[TestResult]) -> String {
    let width = results
        .iter()
        .map(|r| r.suite.len() + r.id.len() + 2)
        .max()
        .unwrap_or(0)
        .max("TEST".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:<8}  {:>8}", "TEST", "RESULT", "TIME");
    for result in results {
        let name = format!("{}::{}", result.suite, result.id);
        let _ = writeln!(
            out,
            "{:<width$}  {:<8}  {:>7.2}s",
            name,
            result.outcome.label(),
            result.duration.as_secs_f64()
        );
        if let Outcome::Failed(reason) | Outcome::Skipped(reason) = &result.outcome {
            let _ = writeln!(out, "    {reason}");
        }
    }
    let passed = results.iter().filter(|r| r.outcome == Outcome::Passed).count();
    let _ = writeln!(out, "{passed}/{} passed", results.len());
    out
}

fn use_case(message: String) -> Error {
    Error::UseCase(message)
}

/// Every open default console answers a trivial command.
struct ConsoleEcho;

#[async_trait]
impl TestCase for ConsoleEcho {
    fn id(&self) -> &str {
        "console_echo"
    }

    fn suite(&self) -> &str {
        DEFAULT_SUITE
    }

    async fn run(&self, ctx: &mut TestContext<'_>) -> Result<()> {
        for device in ctx.devices.iter_mut() {
            let name = device.name().to_string();
            let console = match device.console(DEFAULT_ROLE) {
                Ok(console) => console,
                Err(Error::Device(DeviceError::UnknownConsole { .. })) => continue,
                Err(e) => return Err(e),
            };
            let output = console.execute_command("echo bft-echo", None).await?;
            if output.trim() != "bft-echo" {
                return Err(use_case(format!("{name} echoed '{}'", output.trim())));
            }
        }
        Ok(())
    }
}

/// The LAN client reaches the WAN host's address.
struct LanWanPing;

#[async_trait]
impl TestCase for LanWanPing {
    fn id(&self) -> &str {
        "lan_wan_ping"
    }

    fn suite(&self) -> &str {
        DEFAULT_SUITE
    }

    async fn run(&self, ctx: &mut TestContext<'_>) -> Result<()> {
        let wan_ip = ctx.devices.wan()?.wan_ipv4().await?;
        let lan = ctx.devices.lan()?;
        let iface = lan.iface_dut().to_string();
        let options = PingOptions::default().iface(iface);
        if !lan.linux().ping(&wan_ip, &options).await? {
            return Err(use_case(format!("LAN cannot ping WAN address {wan_ip}")));
        }
        Ok(())
    }
}

/// The WAN host resolves the check domain.
struct WanDns;

#[async_trait]
impl TestCase for WanDns {
    fn id(&self) -> &str {
        "wan_dns"
    }

    fn suite(&self) -> &str {
        DEFAULT_SUITE
    }

    async fn run(&self, ctx: &mut TestContext<'_>) -> Result<()> {
        let domain = ctx.env_str("dns_check_domain").unwrap_or("example.com").to_string();
        let lookup = ctx.devices.wan()?.dns_lookup(&domain).await?;
        info!("{} -> {}", domain, lookup.domain_ip_addr.join(", "));
        Ok(())
    }
}
