// Command-line surface

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored
    Pretty,
    /// One JSON object per event
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(
    about = "Run a processing graph on every input across worker nodes, then aggregate on the coordinator",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// TOML run configuration; flags override its values
    #[arg(long, env = "FANOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Coordinator folder backing the share
    #[arg(long = "coordinator-local")]
    pub coordinator_local: Option<String>,

    /// Network path of the share, as Windows nodes see it
    #[arg(long = "coordinator-shared")]
    pub coordinator_shared: Option<String>,

    /// Host name of the coordinator (default: localhost)
    #[arg(long = "coordinator-name")]
    pub coordinator_name: Option<String>,

    /// Where Linux workers mount the share
    #[arg(long = "worker-mount")]
    pub worker_mount: Option<String>,

    /// Input folder, relative to the share
    #[arg(long = "in")]
    pub input_folder: Option<String>,

    /// Output folder, relative to the share
    #[arg(long = "out")]
    pub output_folder: Option<String>,

    /// Worker nodes as name:platform[:port], comma separated
    #[arg(long, value_delimiter = ',')]
    pub nodes: Vec<String>,

    /// User for worker and coordinator sessions
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password for worker and coordinator sessions
    #[arg(short, long)]
    pub password: Option<String>,

    /// Worker operator chain, e.g. Resample{"-PtargetResolution=60"}|Write
    #[arg(long, conflicts_with = "worker_graph")]
    pub worker_ops: Option<String>,

    /// Worker graph document
    #[arg(long)]
    pub worker_graph: Option<PathBuf>,

    /// Coordinator operator chain
    #[arg(long, conflicts_with = "coordinator_graph")]
    pub coordinator_ops: Option<String>,

    /// Coordinator graph document
    #[arg(long)]
    pub coordinator_graph: Option<PathBuf>,

    /// Worker phase budget in minutes (default: 15)
    #[arg(short, long = "wait-timeout")]
    pub wait_timeout: Option<u64>,

    /// Skip the worker phase and only run the coordinator
    #[arg(short, long)]
    pub resume: bool,

    /// Do not scan the input folder; use --input values only
    #[arg(long)]
    pub no_discovery: bool,

    /// Explicit input, relative to the input folder (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// Command template overrides (TOML, merged key by key over the built-in set)
    #[arg(long)]
    pub templates: Option<PathBuf>,

    #[arg(long, value_enum, env = "FANOUT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
