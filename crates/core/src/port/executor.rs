// Executor Port
// Uniform run contract over local subprocesses and remote shell sessions

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

/// Return code reported while an executor has not finished
pub const RETURN_CODE_PENDING: i32 = i32::MAX;

/// Return code reported when the transport failed before an exit status was known
pub const RETURN_CODE_FAILURE: i32 = -255;

/// Receives captured output lines
pub type OutputSink = mpsc::UnboundedSender<String>;

/// Login for a remote session, also used as the escalation password
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// What to run and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    pub host: String,
    pub port: u16,
    pub arguments: Vec<String>,
    pub credentials: Option<Credentials>,
    /// Run with elevated privileges through `sudo -S`
    pub escalate: bool,
}

impl ExecutionTarget {
    pub fn new(host: impl Into<String>, port: u16, arguments: Vec<String>) -> Self {
        Self {
            host: host.into(),
            port,
            arguments,
            credentials: None,
            escalate: false,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn escalated(mut self) -> Self {
        self.escalate = true;
        self
    }

    /// Arguments joined into the single command string sent to a remote shell
    pub fn command_line(&self) -> String {
        self.arguments.join(" ")
    }
}

/// Lifecycle of one executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Created,
    Running,
    Completed(i32),
    Failed(String),
    /// Stop was requested and observed before the command finished
    StoppedExternally,
}

impl ExecutionState {
    pub fn return_code(&self) -> i32 {
        match self {
            ExecutionState::Completed(code) => *code,
            ExecutionState::Failed(_) => RETURN_CODE_FAILURE,
            _ => RETURN_CODE_PENDING,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed(_)
                | ExecutionState::Failed(_)
                | ExecutionState::StoppedExternally
        )
    }
}

/// Shared state of an executor: lifecycle plus the cooperative stop flag.
///
/// Stopping only makes this side stop reading. The remote command or local child keeps running.
#[derive(Debug)]
pub struct ExecutionMonitor {
    stopped: AtomicBool,
    cancelled: AtomicBool,
    state: Mutex<ExecutionState>,
}

impl Default for ExecutionMonitor {
    fn default() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            state: Mutex::new(ExecutionState::Created),
        }
    }
}

impl ExecutionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Record that the transport failed mid-run
    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ExecutionState {
        self.lock().clone()
    }

    pub fn set_state(&self, state: ExecutionState) {
        *self.lock() = state;
    }

    pub fn return_code(&self) -> i32 {
        self.lock().return_code()
    }

    /// True once a return code is known, successful or not
    pub fn has_completed(&self) -> bool {
        matches!(
            *self.lock(),
            ExecutionState::Completed(_) | ExecutionState::Failed(_)
        )
    }

    fn lock(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {user}@{host}")]
    Authentication { user: String, host: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Stopped before completion")]
    Stopped,
}

/// Executor trait
///
/// Implementations:
/// - ProcessExecutor: local child process
/// - RemoteExecutor: command over an authenticated SSH session
#[async_trait]
pub trait Executor: Send + Sync {
    fn target(&self) -> &ExecutionTarget;

    fn monitor(&self) -> &ExecutionMonitor;

    /// Run the command to completion and return its exit code.
    ///
    /// Output lines go to `sink` when given and to the log when `echo_to_log` is set.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed / Connection / Authentication if the command cannot start
    /// - ExecutionError::Stopped if a stop request was observed first
    async fn execute(
        &self,
        sink: Option<OutputSink>,
        echo_to_log: bool,
    ) -> Result<i32, ExecutionError>;

    fn host(&self) -> &str {
        &self.target().host
    }

    /// Best-effort cooperative stop
    fn stop(&self) {
        self.monitor().request_stop();
    }

    fn has_completed(&self) -> bool {
        self.monitor().has_completed()
    }
}

/// Transport an executor uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    Process,
    Remote,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Process => write!(f, "PROCESS"),
            ExecutorKind::Remote => write!(f, "REMOTE"),
        }
    }
}

/// Builds executors for the orchestrator
pub trait ExecutorFactory: Send + Sync {
    fn create(&self, kind: ExecutorKind, target: ExecutionTarget) -> Arc<dyn Executor>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Finish with the given exit code
        Exit(i32),
        /// Fail with a session error
        Fail(String),
        /// Panic with message (for countdown-on-panic testing)
        Panic(String),
        /// Never finish until stopped
        Hang,
    }

    /// Mock Executor for testing
    pub struct MockExecutor {
        target: ExecutionTarget,
        monitor: ExecutionMonitor,
        behavior: MockBehavior,
    }

    impl MockExecutor {
        pub fn new(target: ExecutionTarget, behavior: MockBehavior) -> Self {
            Self {
                target,
                monitor: ExecutionMonitor::new(),
                behavior,
            }
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        fn target(&self) -> &ExecutionTarget {
            &self.target
        }

        fn monitor(&self) -> &ExecutionMonitor {
            &self.monitor
        }

        async fn execute(
            &self,
            sink: Option<OutputSink>,
            _echo_to_log: bool,
        ) -> Result<i32, ExecutionError> {
            match &self.behavior {
                MockBehavior::Exit(code) => {
                    if let Some(sink) = sink {
                        let _ = sink.send(format!("{} {}", self.target.host, self.target.command_line()));
                    }
                    Ok(*code)
                }
                MockBehavior::Fail(msg) => Err(ExecutionError::Session(msg.clone())),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
                MockBehavior::Hang => {
                    while !self.monitor.is_stop_requested() {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    Err(ExecutionError::Stopped)
                }
            }
        }
    }

    /// Records every executor it creates
    pub struct MockExecutorFactory {
        default_behavior: MockBehavior,
        per_host: HashMap<String, MockBehavior>,
        created: Mutex<Vec<(ExecutorKind, ExecutionTarget)>>,
    }

    impl MockExecutorFactory {
        pub fn new(default_behavior: MockBehavior) -> Self {
            Self {
                default_behavior,
                per_host: HashMap::new(),
                created: Mutex::new(Vec::new()),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(MockBehavior::Exit(0))
        }

        pub fn with_host(mut self, host: impl Into<String>, behavior: MockBehavior) -> Self {
            self.per_host.insert(host.into(), behavior);
            self
        }

        /// Every `(kind, target)` passed to `create`, in call order
        pub fn created(&self) -> Vec<(ExecutorKind, ExecutionTarget)> {
            self.created
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }

        pub fn created_of(&self, kind: ExecutorKind) -> Vec<ExecutionTarget> {
            self.created()
                .into_iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, target)| target)
                .collect()
        }
    }

    impl ExecutorFactory for MockExecutorFactory {
        fn create(&self, kind: ExecutorKind, target: ExecutionTarget) -> Arc<dyn Executor> {
            let behavior = self
                .per_host
                .get(&target.host)
                .cloned()
                .unwrap_or_else(|| self.default_behavior.clone());
            self.created
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((kind, target.clone()));

            Arc::new(MockExecutor::new(target, behavior))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_return_codes() {
        assert_eq!(ExecutionState::Created.return_code(), RETURN_CODE_PENDING);
        assert_eq!(ExecutionState::Running.return_code(), RETURN_CODE_PENDING);
        assert_eq!(ExecutionState::Completed(3).return_code(), 3);
        assert_eq!(
            ExecutionState::Failed("boom".into()).return_code(),
            RETURN_CODE_FAILURE
        );
        assert!(ExecutionState::StoppedExternally.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
    }

    #[test]
    fn test_monitor_completion_and_stop() {
        let monitor = ExecutionMonitor::new();
        assert!(!monitor.has_completed());
        monitor.set_state(ExecutionState::Running);
        monitor.request_stop();
        assert!(monitor.is_stop_requested());
        assert!(!monitor.has_completed());
        monitor.set_state(ExecutionState::Failed("io".into()));
        assert!(monitor.has_completed());
        assert_eq!(monitor.return_code(), RETURN_CODE_FAILURE);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("ops", "s3cret");
        let shown = format!("{:?}", ExecutionTarget::new("w1", 22, vec![]).with_credentials(creds));
        assert!(shown.contains("ops"));
        assert!(!shown.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_mock_hang_observes_stop() {
        let executor = Arc::new(mocks::MockExecutor::new(
            ExecutionTarget::new("w1", 22, vec![]),
            mocks::MockBehavior::Hang,
        ));
        let running = executor.clone();
        let handle = tokio::spawn(async move { running.execute(None, false).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        executor.stop();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ExecutionError::Stopped)));
    }
}
