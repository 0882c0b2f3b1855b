// Fanout Infrastructure - System Adapters
// Implements: Executor (local process, SSH), ExecutorFactory, InputDiscovery

pub mod executor_factory;
pub mod fs_discovery;
pub mod output;
pub mod process_executor;
pub mod remote_executor;

pub use executor_factory::SystemExecutorFactory;
pub use fs_discovery::FsInputDiscovery;
pub use process_executor::ProcessExecutor;
pub use remote_executor::{RemoteExecutor, SessionSettings};
