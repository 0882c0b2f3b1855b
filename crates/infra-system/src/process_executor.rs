// Local process executor
// reason: tokio::process for async child management, output streamed line by line
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use fanout_core::port::{ExecutionError, ExecutionMonitor, ExecutionTarget, Executor, OutputSink};

use crate::output::LineEmitter;

/// How often the read loop wakes up to look at the stop flag while the child is quiet
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runs the target's argument list as a child process on this machine.
///
/// The first argument is the program. With escalation the whole list is run through
/// `sudo -S` and the credentials' password is written to the child's stdin.
pub struct ProcessExecutor {
    target: ExecutionTarget,
    monitor: ExecutionMonitor,
}

impl ProcessExecutor {
    pub fn new(target: ExecutionTarget) -> Self {
        Self {
            target,
            monitor: ExecutionMonitor::new(),
        }
    }

    /// Program and arguments actually spawned
    fn command(&self) -> Result<(String, Vec<String>), ExecutionError> {
        let (program, args) = self
            .target
            .arguments
            .split_first()
            .ok_or_else(|| ExecutionError::InvalidCommand("empty argument list".to_string()))?;
        if !self.target.escalate {
            return Ok((program.clone(), args.to_vec()));
        }
        let mut escalated = vec!["-S".to_string(), "-p".to_string(), String::new()];
        escalated.extend(self.target.arguments.iter().cloned());
        Ok(("sudo".to_string(), escalated))
    }

    fn escalation_password(&self) -> Result<Option<String>, ExecutionError> {
        if !self.target.escalate {
            return Ok(None);
        }
        self.target
            .credentials
            .as_ref()
            .map(|c| Some(c.password.clone()))
            .ok_or_else(|| {
                ExecutionError::InvalidCommand("escalation requested without credentials".to_string())
            })
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn target(&self) -> &ExecutionTarget {
        &self.target
    }

    fn monitor(&self) -> &ExecutionMonitor {
        &self.monitor
    }

    async fn execute(
        &self,
        sink: Option<OutputSink>,
        echo_to_log: bool,
    ) -> Result<i32, ExecutionError> {
        let (program, args) = self.command()?;
        let password = self.escalation_password()?;
        let host = self.target.host.clone();

        info!(host = %host, command = %self.target.command_line(), "Invoking local process");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(if password.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{program}: {e}")))?;

        if let (Some(password), Some(mut stdin)) = (password.as_ref(), child.stdin.take()) {
            stdin.write_all(format!("{password}\n").as_bytes()).await?;
            stdin.flush().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::SpawnFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::SpawnFailed("stderr not captured".to_string()))?;

        let stderr_host = host.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).split(b'\n');
            while let Ok(Some(line)) = lines.next_segment().await {
                let line = String::from_utf8_lossy(&line);
                if !line.trim().is_empty() {
                    warn!("[{}] {}", stderr_host, line.trim_end());
                }
            }
        });

        let emitter = LineEmitter::new(host.clone(), password, sink, echo_to_log);
        let mut lines = BufReader::new(stdout).split(b'\n');
        loop {
            if self.monitor.is_stop_requested() {
                // The child is left running. Its output is still drained so it never
                // writes into a closed pipe; stderr keeps going to the log.
                tokio::spawn(async move { while let Ok(Some(_)) = lines.next_segment().await {} });
                return Err(ExecutionError::Stopped);
            }
            match timeout(STOP_POLL_INTERVAL, lines.next_segment()).await {
                Err(_) => continue,
                Ok(Ok(Some(line))) => {
                    emitter.emit_bytes(&line);
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    self.monitor.mark_cancelled();
                    stderr_task.abort();
                    return Err(ExecutionError::Io(e));
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            self.monitor.mark_cancelled();
            ExecutionError::Io(e)
        })?;
        let _ = stderr_task.await;

        // Killed by a signal: no exit code
        let code = status.code().unwrap_or(-1);
        info!(host = %host, code, "Local process exited");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::port::Credentials;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn target(args: &[&str]) -> ExecutionTarget {
        ExecutionTarget::new("localhost", 22, args.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let executor = ProcessExecutor::new(target(&["sh", "-c", "echo first; echo; echo second"]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let code = executor.execute(Some(tx), false).await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(rx.recv().await.unwrap(), "first");
        assert_eq!(rx.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let executor = ProcessExecutor::new(target(&["sh", "-c", "echo oops >&2; exit 3"]));
        assert_eq!(executor.execute(None, true).await.unwrap(), 3);
        assert!(!executor.monitor().is_cancelled());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let executor = ProcessExecutor::new(target(&["definitely-not-a-real-binary-4711"]));
        let err = executor.execute(None, false).await.unwrap_err();
        assert!(matches!(err, ExecutionError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_arguments_rejected() {
        let executor = ProcessExecutor::new(target(&[]));
        let err = executor.execute(None, false).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_forwarded_lossily() {
        let executor = ProcessExecutor::new(target(&[
            "sh",
            "-c",
            "printf 'caf\\351\\n'; printf 'bad\\377\\n' >&2; echo after; exit 0",
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let code = executor.execute(Some(tx), false).await.unwrap();

        assert_eq!(code, 0);
        assert!(!executor.monitor().is_cancelled());
        assert_eq!(rx.recv().await.unwrap(), "caf\u{FFFD}");
        assert_eq!(rx.recv().await.unwrap(), "after");
    }

    #[tokio::test]
    async fn test_stop_keeps_draining_child_output() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        // Prints well past a pipe buffer after the stop, then leaves a marker
        let script = format!(
            "sleep 0.3; i=0; while [ $i -lt 2000 ]; do echo line $i of noisy output; i=$((i+1)); done; touch {}",
            marker.display()
        );
        let executor = Arc::new(ProcessExecutor::new(target(&["sh", "-c", &script])));
        let running = executor.clone();
        let handle = tokio::spawn(async move { running.execute(None, false).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        executor.stop();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ExecutionError::Stopped)));

        let mut finished = false;
        for _ in 0..100 {
            if marker.exists() {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(finished, "stopped child should run to completion");
    }

    #[tokio::test]
    async fn test_stop_ends_read_loop() {
        let executor = Arc::new(ProcessExecutor::new(target(&["sleep", "30"])));
        let running = executor.clone();
        let handle = tokio::spawn(async move { running.execute(None, false).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        executor.stop();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("read loop should observe the stop flag")
            .unwrap();
        assert!(matches!(result, Err(ExecutionError::Stopped)));
    }

    #[test]
    fn test_escalated_command_goes_through_sudo() {
        let executor = ProcessExecutor::new(
            target(&["chmod", "0777", "/srv/out"])
                .with_credentials(Credentials::new("ops", "secret"))
                .escalated(),
        );
        let (program, args) = executor.command().unwrap();
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-S", "-p", "", "chmod", "0777", "/srv/out"]);
        assert_eq!(executor.escalation_password().unwrap().as_deref(), Some("secret"));

        let no_credentials = ProcessExecutor::new(target(&["true"]).escalated());
        assert!(no_credentials.escalation_password().is_err());
    }
}
