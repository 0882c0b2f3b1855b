// Tracked execution
// Lifecycle wrapper run around every executor submitted to the pool

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::application::barrier::CompletionBarrier;
use crate::port::{ExecutionError, ExecutionState, Executor, TimeProvider};

/// Outcome of one tracked execution
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub host: String,
    pub state: ExecutionState,
    pub return_code: i32,
    pub elapsed_ms: i64,
    /// Captured output lines, empty unless capture was requested
    pub output: Vec<String>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.state == ExecutionState::Completed(0)
    }
}

/// Counts the barrier down exactly once when dropped, including during a panic unwind.
struct CountdownGuard {
    barrier: Option<CompletionBarrier>,
}

impl Drop for CountdownGuard {
    fn drop(&mut self) {
        if let Some(barrier) = self.barrier.take() {
            barrier.count_down();
            info!("Active nodes: {}", barrier.remaining());
        }
    }
}

/// `HHhMMmSSs`
pub fn format_elapsed(millis: i64) -> String {
    let secs = millis.max(0) / 1000;
    format!("{:02}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Run `executor` to completion, record its state, log the outcome and release the barrier.
pub async fn run_tracked(
    executor: Arc<dyn Executor>,
    barrier: Option<CompletionBarrier>,
    clock: Arc<dyn TimeProvider>,
    capture: bool,
) -> ExecutionReport {
    let _countdown = CountdownGuard { barrier };
    let host = executor.host().to_string();
    let monitor = executor.monitor();
    let started = clock.now_millis();

    monitor.set_state(ExecutionState::Running);
    let (sink, mut lines) = if capture {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let state = match executor.execute(sink, true).await {
        Ok(code) => {
            if code == 0 {
                info!("[{}] completed OK", host);
            } else {
                warn!("[{}] completed NOK (code {})", host, code);
            }
            ExecutionState::Completed(code)
        }
        Err(ExecutionError::Stopped) => {
            warn!("[{}] stopped before completion", host);
            ExecutionState::StoppedExternally
        }
        Err(e) => {
            error!("[{}] failed: {}", host, e);
            ExecutionState::Failed(e.to_string())
        }
    };
    monitor.set_state(state.clone());

    let elapsed_ms = clock.elapsed_since(started);
    info!("[{}] elapsed {}", host, format_elapsed(elapsed_ms));

    let mut output = Vec::new();
    if let Some(rx) = lines.as_mut() {
        while let Ok(line) = rx.try_recv() {
            output.push(line);
        }
    }

    ExecutionReport {
        host,
        return_code: state.return_code(),
        state,
        elapsed_ms,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::executor::mocks::{MockBehavior, MockExecutor};
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::{ExecutionTarget, SystemTimeProvider, RETURN_CODE_FAILURE};

    fn clock() -> Arc<dyn TimeProvider> {
        Arc::new(SystemTimeProvider)
    }

    fn executor(behavior: MockBehavior) -> Arc<MockExecutor> {
        Arc::new(MockExecutor::new(
            ExecutionTarget::new("w1", 22, vec!["gpt".into(), "graph.xml".into()]),
            behavior,
        ))
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00h00m00s");
        assert_eq!(format_elapsed(3_723_999), "01h02m03s");
        assert_eq!(format_elapsed(-5), "00h00m00s");
    }

    #[tokio::test]
    async fn test_success_counts_down_and_captures() {
        let barrier = CompletionBarrier::new(2);
        let exec = executor(MockBehavior::Exit(0));
        let report = run_tracked(exec.clone(), Some(barrier.clone()), clock(), true).await;

        assert!(report.succeeded());
        assert_eq!(report.return_code, 0);
        assert_eq!(report.output, vec!["w1 gpt graph.xml".to_string()]);
        assert_eq!(barrier.remaining(), 1);
        assert!(exec.has_completed());
    }

    #[tokio::test]
    async fn test_failure_maps_to_failure_code() {
        let barrier = CompletionBarrier::new(1);
        let exec = executor(MockBehavior::Fail("connection reset".into()));
        let report = run_tracked(exec.clone(), Some(barrier.clone()), clock(), false).await;

        assert_eq!(report.return_code, RETURN_CODE_FAILURE);
        assert!(matches!(report.state, ExecutionState::Failed(_)));
        assert!(report.output.is_empty());
        assert_eq!(barrier.remaining(), 0);
        assert_eq!(exec.monitor().return_code(), RETURN_CODE_FAILURE);
    }

    #[tokio::test]
    async fn test_stop_is_reported_as_stopped_externally() {
        let exec = executor(MockBehavior::Hang);
        exec.stop();
        let report = run_tracked(exec.clone(), None, clock(), false).await;
        assert_eq!(report.state, ExecutionState::StoppedExternally);
        assert!(!exec.has_completed());
    }

    #[tokio::test]
    async fn test_panic_still_counts_down_once() {
        let barrier = CompletionBarrier::new(2);
        let exec = executor(MockBehavior::Panic("executor blew up".into()));
        let task_barrier = barrier.clone();
        let joined = tokio::spawn(async move {
            run_tracked(exec, Some(task_barrier), clock(), false).await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(barrier.remaining(), 1);
    }

    #[tokio::test]
    async fn test_elapsed_uses_injected_clock() {
        let manual = Arc::new(ManualTimeProvider::ticking(1_000, 61_000));
        let exec = executor(MockBehavior::Exit(4));
        let report = run_tracked(exec, None, manual.clone(), false).await;
        assert_eq!(report.elapsed_ms, 61_000);
        assert_eq!(format_elapsed(report.elapsed_ms), "00h01m01s");
        assert_eq!(report.return_code, 4);
        assert!(!report.succeeded());
    }
}
