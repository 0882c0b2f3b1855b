// Output handling shared by the executors
// Line forwarding to the sink and the log, plus sudo command rewriting

use fanout_core::port::OutputSink;
use tracing::info;

/// Prefix that makes `sudo` read the password from stdin without printing a prompt
pub const SUDO_PREFIX: &str = "sudo -S -p ''";

/// Rewrite `command` so that every `;`-separated sub-command runs through sudo
pub fn escalate_command(command: &str) -> String {
    let escalated = command.replace(';', &format!("; {SUDO_PREFIX} "));
    format!("{SUDO_PREFIX} {escalated}")
}

/// Forwards output lines of one execution.
///
/// Blank lines are dropped. When a password was written to the command's input, any line equal
/// to it is dropped too so the terminal echo never reaches the sink or the log.
pub struct LineEmitter {
    host: String,
    password: Option<String>,
    sink: Option<OutputSink>,
    echo_to_log: bool,
}

impl LineEmitter {
    pub fn new(
        host: impl Into<String>,
        password: Option<String>,
        sink: Option<OutputSink>,
        echo_to_log: bool,
    ) -> Self {
        Self {
            host: host.into(),
            password,
            sink,
            echo_to_log,
        }
    }

    /// Forward one raw line. Returns whether it was kept.
    pub fn emit(&self, raw: &str) -> bool {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return false;
        }
        if self.password.as_deref() == Some(line.trim()) {
            return false;
        }
        if let Some(sink) = &self.sink {
            // Receiver gone means nobody is collecting any more; logging still applies
            let _ = sink.send(line.to_string());
        }
        if self.echo_to_log {
            info!("[{}] {}", self.host, line);
        }
        true
    }

    /// Forward one line of raw bytes; invalid UTF-8 is replaced, never rejected
    pub fn emit_bytes(&self, raw: &[u8]) -> bool {
        self.emit(&String::from_utf8_lossy(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_escalate_command_prefixes_every_sub_command() {
        assert_eq!(escalate_command("chmod 0777 /srv/out"), "sudo -S -p '' chmod 0777 /srv/out");
        assert_eq!(
            escalate_command("mkdir -p /a;chmod 0777 /a"),
            "sudo -S -p '' mkdir -p /a; sudo -S -p '' chmod 0777 /a"
        );
    }

    #[test]
    fn test_emitter_drops_blank_and_password_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = LineEmitter::new("w1", Some("secret".to_string()), Some(tx), false);

        assert!(!emitter.emit("   \r\n"));
        assert!(!emitter.emit("secret\r\n"));
        assert!(emitter.emit("Processing 42%\n"));
        assert!(emitter.emit("secret-ish"));

        assert_eq!(rx.try_recv().unwrap(), "Processing 42%");
        assert_eq!(rx.try_recv().unwrap(), "secret-ish");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emitter_survives_closed_sink() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let emitter = LineEmitter::new("w1", None, Some(tx), true);
        assert!(emitter.emit("still logged"));
    }

    #[test]
    fn test_emit_bytes_replaces_invalid_utf8() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = LineEmitter::new("w1", None, Some(tx), false);
        assert!(emitter.emit_bytes(b"caf\xe9\n"));
        assert_eq!(rx.try_recv().unwrap(), "caf\u{FFFD}");
    }
}
