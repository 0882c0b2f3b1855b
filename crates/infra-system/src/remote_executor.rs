// Remote shell executor
// reason: ssh2 is blocking, so a whole session runs on tokio's blocking pool
use async_trait::async_trait;
use ssh2::{Channel, Session};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use fanout_core::port::{ExecutionError, ExecutionMonitor, ExecutionTarget, Executor, OutputSink};

use crate::output::{escalate_command, LineEmitter};

/// Transport tuning for SSH sessions
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    /// Read timeout; bounds how long a stop request can go unnoticed
    pub poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Runs the target's joined argument list over an authenticated SSH session
pub struct RemoteExecutor {
    target: ExecutionTarget,
    monitor: Arc<ExecutionMonitor>,
    settings: SessionSettings,
}

impl RemoteExecutor {
    pub fn new(target: ExecutionTarget) -> Self {
        Self::with_settings(target, SessionSettings::default())
    }

    pub fn with_settings(target: ExecutionTarget, settings: SessionSettings) -> Self {
        Self {
            target,
            monitor: Arc::new(ExecutionMonitor::new()),
            settings,
        }
    }

    /// Command string sent to the remote shell
    pub fn remote_command(&self) -> String {
        let command = self.target.command_line();
        if self.target.escalate {
            escalate_command(&command)
        } else {
            command
        }
    }
}

#[async_trait]
impl Executor for RemoteExecutor {
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
        if self.target.arguments.is_empty() {
            return Err(ExecutionError::InvalidCommand("empty argument list".to_string()));
        }
        let target = self.target.clone();
        let command = self.remote_command();
        let monitor = self.monitor.clone();
        let settings = self.settings.clone();

        info!("Invoking on {}: {}", target.host, target.command_line());

        let result = tokio::task::spawn_blocking(move || {
            run_session(&target, &command, &monitor, &settings, sink, echo_to_log)
        })
        .await
        .map_err(|e| ExecutionError::Session(format!("session task failed: {e}")))?;

        if let Err(e) = &result {
            if !matches!(e, ExecutionError::Stopped) {
                error!("Invocation of {} failed: {}", self.target.host, e);
                self.monitor.mark_cancelled();
            }
        }
        result
    }
}

/// Session timeouts are given in milliseconds, 0 meaning none
fn millis(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128).max(1) as u32
}

fn session_error(e: ssh2::Error) -> ExecutionError {
    ExecutionError::Session(e.to_string())
}

fn connect(target: &ExecutionTarget, settings: &SessionSettings) -> Result<Session, ExecutionError> {
    let connection_error = |reason: String| ExecutionError::Connection {
        host: target.host.clone(),
        port: target.port,
        reason,
    };

    let address = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| connection_error(e.to_string()))?
        .next()
        .ok_or_else(|| connection_error("host did not resolve".to_string()))?;
    let tcp = TcpStream::connect_timeout(&address, settings.connect_timeout)
        .map_err(|e| connection_error(e.to_string()))?;

    let mut session = Session::new().map_err(session_error)?;
    session.set_tcp_stream(tcp);
    // Bounds the handshake and authentication against a peer that accepts but never answers
    session.set_timeout(millis(settings.connect_timeout));
    session
        .handshake()
        .map_err(|e| connection_error(e.to_string()))?;

    let credentials = target.credentials.as_ref().ok_or_else(|| ExecutionError::Authentication {
        user: String::new(),
        host: target.host.clone(),
    })?;
    let denied = || ExecutionError::Authentication {
        user: credentials.user.clone(),
        host: target.host.clone(),
    };
    session
        .userauth_password(&credentials.user, &credentials.password)
        .map_err(|_| denied())?;
    if !session.authenticated() {
        return Err(denied());
    }
    Ok(session)
}

fn run_session(
    target: &ExecutionTarget,
    command: &str,
    monitor: &ExecutionMonitor,
    settings: &SessionSettings,
    sink: Option<OutputSink>,
    echo_to_log: bool,
) -> Result<i32, ExecutionError> {
    let session = connect(target, settings)?;
    if monitor.is_stop_requested() {
        return Err(ExecutionError::Stopped);
    }
    let mut channel = session.channel_session().map_err(session_error)?;

    let password = if target.escalate {
        channel
            .request_pty("xterm", None, None)
            .map_err(session_error)?;
        target.credentials.as_ref().map(|c| c.password.clone())
    } else {
        None
    };

    channel.exec(command).map_err(session_error)?;
    if let Some(password) = &password {
        channel.write_all(format!("{password}\n").as_bytes())?;
        channel.flush()?;
    }

    session.set_timeout(millis(settings.poll_interval));
    let emitter = LineEmitter::new(target.host.clone(), password, sink, echo_to_log);
    read_lines(&mut channel, monitor, &emitter)?;

    // The remote side sent EOF; closing no longer needs the polling timeout
    session.set_timeout(0);
    drain_stderr(&mut channel, &target.host);
    channel.wait_close().map_err(session_error)?;
    let code = channel.exit_status().map_err(session_error)?;
    info!(host = %target.host, code, "Remote command exited");
    Ok(code)
}

/// Read stdout until EOF, checking the stop flag whenever the read times out
fn read_lines(
    channel: &mut Channel,
    monitor: &ExecutionMonitor,
    emitter: &LineEmitter,
) -> Result<(), ExecutionError> {
    let mut reader = BufReader::new(channel);
    let mut line = Vec::new();
    loop {
        if monitor.is_stop_requested() {
            return Err(ExecutionError::Stopped);
        }
        // A timed-out read keeps its partial line in `line`, so it is only cleared once emitted
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                emitter.emit_bytes(&line);
                return Ok(());
            }
            Ok(_) => {
                emitter.emit_bytes(&line);
                line.clear();
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExecutionError::Io(e)),
        }
    }
}

/// Without a pty stderr arrives on its own stream; report it as warnings
fn drain_stderr(channel: &mut Channel, host: &str) {
    let mut buffer = Vec::new();
    if channel.stderr().read_to_end(&mut buffer).is_err() {
        return;
    }
    let text = String::from_utf8_lossy(&buffer);
    for message in text.lines().filter(|l| !l.trim().is_empty()) {
        warn!("[{}] {}", host, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::port::Credentials;
    use std::net::TcpListener;

    fn target(host: &str, port: u16) -> ExecutionTarget {
        ExecutionTarget::new(
            host,
            port,
            vec!["chmod".to_string(), "0777".to_string(), "/srv/out".to_string()],
        )
        .with_credentials(Credentials::new("ops", "secret"))
    }

    #[test]
    fn test_remote_command_plain_and_escalated() {
        let plain = RemoteExecutor::new(target("w1", 22));
        assert_eq!(plain.remote_command(), "chmod 0777 /srv/out");

        let escalated = RemoteExecutor::new(target("w1", 22).escalated());
        assert_eq!(escalated.remote_command(), "sudo -S -p '' chmod 0777 /srv/out");
    }

    #[tokio::test]
    async fn test_refused_connection_marks_cancelled() {
        // Bind then drop to get a port nothing listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let executor = RemoteExecutor::with_settings(
            target("127.0.0.1", port),
            SessionSettings {
                connect_timeout: Duration::from_secs(2),
                poll_interval: Duration::from_millis(100),
            },
        );

        let err = executor.execute(None, false).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Connection { .. }));
        assert!(executor.monitor().is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_arguments_rejected() {
        let executor = RemoteExecutor::new(ExecutionTarget::new("w1", 22, vec![]));
        let err = executor.execute(None, false).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidCommand(_)));
        assert!(!executor.monitor().is_cancelled());
    }
}
