//! `bft`: boot the inventory, run the selected tests, tear everything down.

use clap::Parser;
use log::error;

use boardfarm::config::exit_code;
use boardfarm::{Cli, HarnessConfig, Orchestrator, TestRegistry};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = HarnessConfig::from(cli);
    std::process::exit(run(config).await);
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn run(config: HarnessConfig) -> i32 {
    let mut orchestrator = match Orchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{} ({})", e, e.kind());
            eprintln!("bft: {e}");
            return exit_code::HARNESS_ERROR;
        }
    };

    let tests = TestRegistry::with_builtin();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let summary = orchestrator.run_with_interrupt(&tests, interrupt).await;

    if let Some(failure) = &summary.failure {
        eprintln!("FATAL: {failure}");
    }
    if !summary.results.is_empty() {
        print!("{}", boardfarm::testing::results_table(&summary.results));
    }
    summary.exit_code
}
