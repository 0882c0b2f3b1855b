//! Real local processes driven through the tracked-execution wrapper

use std::sync::Arc;
use std::time::Duration;

use fanout_core::application::{run_tracked, CompletionBarrier, WorkerPool};
use fanout_core::port::{
    ExecutionState, ExecutionTarget, Executor, ExecutorFactory, ExecutorKind, SystemTimeProvider,
    RETURN_CODE_FAILURE,
};
use fanout_infra_system::SystemExecutorFactory;

fn shell(script: &str) -> ExecutionTarget {
    ExecutionTarget::new(
        "localhost",
        22,
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
    )
}

#[tokio::test]
async fn test_tracked_process_captures_output() {
    let factory = SystemExecutorFactory::default();
    let executor = factory.create(ExecutorKind::Process, shell("echo one; echo two; exit 0"));
    let barrier = CompletionBarrier::new(1);

    let report = run_tracked(
        executor.clone(),
        Some(barrier.clone()),
        Arc::new(SystemTimeProvider),
        true,
    )
    .await;

    assert!(report.succeeded());
    assert_eq!(report.output, vec!["one".to_string(), "two".to_string()]);
    assert_eq!(barrier.remaining(), 0);
    assert!(executor.has_completed());
}

#[tokio::test]
async fn test_spawn_failure_reports_failure_code() {
    let factory = SystemExecutorFactory::default();
    let executor = factory.create(
        ExecutorKind::Process,
        ExecutionTarget::new("localhost", 22, vec!["no-such-program-fanout".to_string()]),
    );

    let report = run_tracked(executor.clone(), None, Arc::new(SystemTimeProvider), false).await;

    assert_eq!(report.return_code, RETURN_CODE_FAILURE);
    assert!(matches!(report.state, ExecutionState::Failed(_)));
    assert_eq!(executor.monitor().return_code(), RETURN_CODE_FAILURE);
}

#[tokio::test]
async fn test_pool_runs_processes_to_barrier() {
    let factory = SystemExecutorFactory::default();
    let pool = WorkerPool::new(2);
    let barrier = CompletionBarrier::new(4);
    let mut executors = Vec::new();

    for code in 0..4 {
        let executor = factory.create(ExecutorKind::Process, shell(&format!("sleep 0.1; exit {code}")));
        executors.push(executor.clone());
        let barrier = barrier.clone();
        pool.submit(async move {
            run_tracked(executor, Some(barrier), Arc::new(SystemTimeProvider), false).await;
        })
        .await;
    }

    assert!(barrier.wait(Duration::from_secs(10)).await);
    let codes: Vec<i32> = executors.iter().map(|e| e.monitor().return_code()).collect();
    assert_eq!(codes, vec![0, 1, 2, 3]);
    pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_barrier_times_out_on_slow_process() {
    let factory = SystemExecutorFactory::default();
    let executor: Arc<dyn Executor> = factory.create(ExecutorKind::Process, shell("sleep 5"));
    let barrier = CompletionBarrier::new(1);
    let pool = WorkerPool::new(1);
    {
        let executor = executor.clone();
        let barrier = barrier.clone();
        pool.submit(async move {
            run_tracked(executor, Some(barrier), Arc::new(SystemTimeProvider), false).await;
        })
        .await;
    }

    assert!(!barrier.wait(Duration::from_millis(200)).await);
    assert!(!executor.has_completed());

    executor.stop();
    pool.shutdown(Duration::from_secs(5)).await;
    assert_eq!(executor.monitor().state(), ExecutionState::StoppedExternally);
    assert_eq!(barrier.remaining(), 0);
}
