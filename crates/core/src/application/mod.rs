// Application Layer - Use Cases and Business Logic

pub mod barrier;
pub mod context;
pub mod orchestrator;
pub mod pool;
pub mod runner;

// Re-exports
pub use barrier::CompletionBarrier;
pub use context::{CoordinatorSettings, RunContext, WorkerSettings};
pub use orchestrator::{Orchestrator, RunSummary};
pub use pool::WorkerPool;
pub use runner::{format_elapsed, run_tracked, ExecutionReport};
