// Executor factory backed by the real transports

use std::sync::Arc;

use fanout_core::port::{ExecutionTarget, Executor, ExecutorFactory, ExecutorKind};

use crate::process_executor::ProcessExecutor;
use crate::remote_executor::{RemoteExecutor, SessionSettings};

#[derive(Debug, Clone, Default)]
pub struct SystemExecutorFactory {
    session: SessionSettings,
}

impl SystemExecutorFactory {
    pub fn new(session: SessionSettings) -> Self {
        Self { session }
    }
}

impl ExecutorFactory for SystemExecutorFactory {
    fn create(&self, kind: ExecutorKind, target: ExecutionTarget) -> Arc<dyn Executor> {
        match kind {
            ExecutorKind::Process => Arc::new(ProcessExecutor::new(target)),
            ExecutorKind::Remote => {
                Arc::new(RemoteExecutor::with_settings(target, self.session.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_kind_runs_locally() {
        let factory = SystemExecutorFactory::default();
        let executor = factory.create(
            ExecutorKind::Process,
            ExecutionTarget::new("localhost", 22, vec!["true".to_string()]),
        );
        assert_eq!(executor.host(), "localhost");
        assert_eq!(executor.execute(None, false).await.unwrap(), 0);
    }

    #[test]
    fn test_remote_kind_keeps_target() {
        let factory = SystemExecutorFactory::default();
        let target = ExecutionTarget::new("w1", 2222, vec!["ls".to_string()]);
        let executor = factory.create(ExecutorKind::Remote, target.clone());
        assert_eq!(executor.target(), &target);
        assert!(!executor.has_completed());
    }
}
