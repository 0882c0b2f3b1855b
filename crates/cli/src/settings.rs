// Run settings
// Layers: TOML file, then FANOUT_* environment, then command-line flags

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use fanout_core::application::orchestrator::constants::DEFAULT_WAIT_TIMEOUT;
use fanout_core::application::{CoordinatorSettings, RunContext, WorkerSettings};
use fanout_core::domain::node::DEFAULT_SSH_PORT;
use fanout_core::domain::{ComputeNode, DomainError, Platform, ProcessingGraph, TemplateSet};
use fanout_core::port::{Credentials, SearchDescriptor};

use crate::cli::Cli;

/// Built-in command templates
pub const DEFAULT_TEMPLATES: &str = include_str!("../templates/command_templates.toml");

const DEFAULT_COORDINATOR: &str = "localhost";
const ENV_PREFIX: &str = "FANOUT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required parameters: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Graph(#[from] DomainError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    pub name: Option<String>,
    pub platform: Option<Platform>,
    pub ssh_port: Option<u16>,
    pub local_folder: Option<String>,
    pub shared_folder: Option<String>,
    pub tool_location: Option<String>,
    pub wait_timeout_minutes: Option<u64>,
    pub pool_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub share_mount: Option<String>,
    pub input_folder: Option<String>,
    pub output_folder: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub nodes: Vec<ComputeNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub worker_ops: Option<String>,
    pub worker_graph: Option<PathBuf>,
    pub coordinator_ops: Option<String>,
    pub coordinator_graph: Option<PathBuf>,
    pub resume: bool,
    pub no_discovery: bool,
    pub inputs: Vec<String>,
}

/// Configuration record before validation; every field may still be missing
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub coordinator: CoordinatorSection,
    pub worker: WorkerSection,
    pub search: SearchDescriptor,
    pub run: RunSection,
}

/// Everything `main` needs to start a run
#[derive(Debug)]
pub struct RunSettings {
    pub context: RunContext,
    pub worker_graph: ProcessingGraph,
    pub coordinator_graph: Option<ProcessingGraph>,
    /// Given explicitly; scanned inputs are appended unless discovery is off
    pub inputs: Vec<String>,
    pub discover: bool,
}

impl FileConfig {
    /// Merge the optional config file with the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let merged = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(merged.try_deserialize()?)
    }

    /// Command-line flags take precedence over file and environment
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        let coordinator = &mut self.coordinator;
        set(&mut coordinator.local_folder, &cli.coordinator_local);
        set(&mut coordinator.shared_folder, &cli.coordinator_shared);
        set(&mut coordinator.name, &cli.coordinator_name);
        set(&mut coordinator.wait_timeout_minutes, &cli.wait_timeout);

        let worker = &mut self.worker;
        set(&mut worker.share_mount, &cli.worker_mount);
        set(&mut worker.input_folder, &cli.input_folder);
        set(&mut worker.output_folder, &cli.output_folder);
        set(&mut worker.user, &cli.user);
        set(&mut worker.password, &cli.password);
        if !cli.nodes.is_empty() {
            worker.nodes = cli
                .nodes
                .iter()
                .map(|entry| ComputeNode::parse_entry(entry))
                .collect::<Result<_, _>>()?;
        }

        let run = &mut self.run;
        if cli.worker_ops.is_some() || cli.worker_graph.is_some() {
            run.worker_ops.clone_from(&cli.worker_ops);
            run.worker_graph.clone_from(&cli.worker_graph);
        }
        if cli.coordinator_ops.is_some() || cli.coordinator_graph.is_some() {
            run.coordinator_ops.clone_from(&cli.coordinator_ops);
            run.coordinator_graph.clone_from(&cli.coordinator_graph);
        }
        run.resume |= cli.resume;
        run.no_discovery |= cli.no_discovery;
        if !cli.inputs.is_empty() {
            run.inputs.clone_from(&cli.inputs);
        }
        Ok(())
    }

    /// Check required values, load the graphs and build the run context.
    ///
    /// Every missing parameter is reported at once.
    pub fn into_settings(self, templates: TemplateSet) -> Result<RunSettings, ConfigError> {
        let FileConfig {
            coordinator,
            worker,
            search,
            run,
        } = self;

        let mut missing = Vec::new();
        let mut require = |value: Option<String>, name: &'static str| {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                missing.push(name);
            }
            value.unwrap_or_default()
        };
        let local_folder = require(coordinator.local_folder, "--coordinator-local");
        let shared_folder = require(coordinator.shared_folder, "--coordinator-shared");
        let share_mount = require(worker.share_mount, "--worker-mount");
        let input_folder = require(worker.input_folder, "--in");
        let output_folder = require(worker.output_folder, "--out");
        let user = require(worker.user, "-u/--user");
        let password = require(worker.password, "-p/--password");
        if worker.nodes.is_empty() {
            missing.push("--nodes");
        }
        if run.worker_ops.is_none() && run.worker_graph.is_none() {
            missing.push("--worker-ops | --worker-graph");
        }
        if run.no_discovery && run.inputs.is_empty() {
            missing.push("--input (required with --no-discovery)");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let worker_graph = load_graph(run.worker_ops.as_deref(), run.worker_graph.as_deref())?
            .ok_or(ConfigError::Missing(vec!["--worker-ops | --worker-graph"]))?;
        let coordinator_graph =
            load_graph(run.coordinator_ops.as_deref(), run.coordinator_graph.as_deref())?;

        let pool_size = match coordinator.pool_size {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    key: "coordinator.pool_size",
                    reason: "must be at least 1".to_string(),
                })
            }
            Some(size) => size,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        let wait_timeout = match coordinator.wait_timeout_minutes {
            Some(minutes) => minutes
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "coordinator.wait_timeout_minutes",
                    reason: format!("{minutes} minutes is out of range"),
                })?,
            None => DEFAULT_WAIT_TIMEOUT,
        };

        let mut coordinator_node = ComputeNode::new(
            coordinator
                .name
                .unwrap_or_else(|| DEFAULT_COORDINATOR.to_string()),
            coordinator.platform.unwrap_or_else(Platform::host),
        );
        coordinator_node.tool_location = coordinator.tool_location;
        coordinator_node.ssh_port = coordinator.ssh_port.unwrap_or(DEFAULT_SSH_PORT);

        let context = RunContext {
            coordinator: CoordinatorSettings {
                node: coordinator_node,
                local_folder,
                shared_folder,
                wait_timeout,
                pool_size,
            },
            worker: WorkerSettings {
                share_mount,
                input_folder,
                output_folder,
                credentials: Credentials::new(user, password),
                nodes: worker.nodes,
            },
            templates,
            search,
            resume: run.resume,
        };
        Ok(RunSettings {
            context,
            worker_graph,
            coordinator_graph,
            inputs: run.inputs,
            discover: !run.no_discovery,
        })
    }
}

/// Built-in templates, overridden key by key by `overrides` when given
pub fn load_templates(overrides: Option<&Path>) -> Result<TemplateSet, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_TEMPLATES, FileFormat::Toml));
    if let Some(path) = overrides {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    Ok(builder.build()?.try_deserialize()?)
}

fn load_graph(
    ops: Option<&str>,
    file: Option<&Path>,
) -> Result<Option<ProcessingGraph>, ConfigError> {
    if let Some(chain) = ops {
        return Ok(Some(ProcessingGraph::from_chain(chain)?));
    }
    let Some(path) = file else {
        return Ok(None);
    };
    let markup = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(ProcessingGraph::parse(&markup)?))
}

/// One log line per resolved option, secrets redacted
pub fn log_settings(settings: &RunSettings) {
    let ctx = &settings.context;
    let coordinator = &ctx.coordinator;
    info!("Coordinator: {} ({})", coordinator.node.name, coordinator.node.platform);
    info!("Coordinator local folder: {}", coordinator.local_folder);
    info!("Coordinator shared folder: {}", coordinator.shared_folder);
    info!("Worker mount folder: {}", ctx.worker.share_mount);
    info!("Input folder: {}", ctx.worker.input_folder);
    info!("Output folder: {}", ctx.worker.output_folder);
    info!("User: {}", ctx.worker.credentials.user);
    info!("Password: ***");
    for node in &ctx.worker.nodes {
        info!("Worker node: {} ({}, port {})", node.name, node.platform, node.ssh_port);
    }
    info!("Wait timeout: {} min", coordinator.wait_timeout.as_secs() / 60);
    info!("Pool size: {}", coordinator.pool_size);
    info!(
        "Worker graph: {}",
        settings
            .worker_graph
            .steps()
            .iter()
            .map(|s| s.operator.as_str())
            .collect::<Vec<_>>()
            .join("|")
    );
    if let Some(graph) = &settings.coordinator_graph {
        info!(
            "Coordinator graph: {}",
            graph
                .steps()
                .iter()
                .map(|s| s.operator.as_str())
                .collect::<Vec<_>>()
                .join("|")
        );
    }
    info!("Resume: {}", ctx.resume);
    info!("Discovery: {}", settings.discover);
}
