// Orchestrator constants
use std::time::Duration;

/// Default worker-phase wait budget (15 minutes)
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Grace period for pooled tasks when the run ends (5 seconds)
pub const GRACEFUL_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Per-job worker graph file name, followed by the job sequence
pub const WORKER_GRAPH_PREFIX: &str = "workerGraph";
pub const GRAPH_FILE_EXTENSION: &str = ".xml";

pub const COORDINATOR_GRAPH_FILE: &str = "coordinatorGraph.xml";

/// Base name of a worker result, followed by the job sequence
pub const RESULT_PREFIX: &str = "result_";
pub const RESULT_EXTENSION: &str = ".tif";

/// Extra options the coordinator template gets for the aggregation operator
pub const AGGREGATION_OPTIONS: &str = "Mosaic -p ";

/// Mode applied to outputs so every node can read and replace them
pub const SHARED_FILE_MODE: &str = "0777";
