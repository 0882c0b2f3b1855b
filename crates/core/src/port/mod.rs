// Port Layer - Interfaces for external dependencies

pub mod executor;
pub mod input_discovery;
pub mod time_provider; // For deterministic elapsed-time tests

// Re-exports
pub use executor::{
    Credentials, ExecutionError, ExecutionMonitor, ExecutionState, ExecutionTarget, Executor,
    ExecutorFactory, ExecutorKind, OutputSink, RETURN_CODE_FAILURE, RETURN_CODE_PENDING,
};
pub use input_discovery::{FixedInputs, InputDiscovery, ProductType, SearchDescriptor};
pub use time_provider::{SystemTimeProvider, TimeProvider};
