//! Fanout - Main Entry Point
//! Resolves the run configuration, wires the adapters and drives one orchestrated run

mod cli;
mod settings;
mod logging;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use fanout_core::application::orchestrator::constants::GRACEFUL_SHUTDOWN_TIMEOUT_MS;
use fanout_core::application::{Orchestrator, WorkerPool};
use fanout_core::port::{ExecutionState, SystemTimeProvider};
use fanout_infra_system::{FsInputDiscovery, SystemExecutorFactory};

use crate::cli::Cli;
use crate::settings::{load_templates, log_settings, ConfigError, FileConfig, RunSettings};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Logging first so configuration can be reported
    let _log_guard = logging::init(cli.log_format, cli.log_file.as_deref())?;
    info!("Fanout v{} starting...", fanout_core::VERSION);

    // 2. Configuration: file, environment, flags
    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(ConfigError::Missing(names)) => {
            eprintln!("Missing required parameters: {}\n", names.join(", "));
            Cli::command().print_help()?;
            return Ok(());
        }
        Err(e) => return Err(e).context("Invalid configuration"),
    };
    log_settings(&settings);

    // 3. Run. Sessions still blocked on an unresponsive node are abandoned at exit.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(run(settings));
    runtime.shutdown_timeout(Duration::from_millis(GRACEFUL_SHUTDOWN_TIMEOUT_MS));
    result
}

fn load_settings(cli: &Cli) -> Result<RunSettings, ConfigError> {
    let mut file = FileConfig::load(cli.config.as_deref())?;
    file.apply_cli(cli)?;
    let templates = load_templates(cli.templates.as_deref())?;
    file.into_settings(templates)
}

async fn run(settings: RunSettings) -> Result<()> {
    let RunSettings {
        context,
        worker_graph,
        coordinator_graph,
        mut inputs,
        discover,
    } = settings;

    // Dependency wiring
    let context = Arc::new(context);
    let pool = Arc::new(WorkerPool::new(context.coordinator.pool_size));
    let orchestrator = Orchestrator::new(
        context.clone(),
        Arc::new(SystemExecutorFactory::default()),
        pool,
        Arc::new(SystemTimeProvider),
    );

    if discover {
        let discovery = FsInputDiscovery::new().context("Input discovery setup failed")?;
        let found = orchestrator
            .discover_inputs(&discovery)
            .context("Input discovery failed")?;
        inputs.extend(found);
    }
    if inputs.is_empty() {
        warn!("No inputs to process");
    }

    let summary = orchestrator
        .run(&inputs, &worker_graph, coordinator_graph.as_ref())
        .await
        .context("Run failed")?;

    let failed = summary
        .worker_states
        .iter()
        .filter(|(_, state)| *state != ExecutionState::Completed(0))
        .count();
    info!(jobs = summary.jobs.len(), failed, "Worker phase finished");
    match (&summary.coordinator, &summary.coordinator_report) {
        (Some(_), Some(report)) => info!(
            code = report.return_code,
            "Coordinator finished in {}",
            fanout_core::application::format_elapsed(report.elapsed_ms)
        ),
        (Some(_), None) => warn!("Coordinator did not finish within its budget"),
        (None, _) => info!("No coordinator graph given"),
    }
    info!("Done.");
    Ok(())
}
