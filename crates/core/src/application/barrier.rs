// Completion Barrier
// Countdown released when every tracked executor has finished, or when the caller stops waiting

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Countdown latch shared by the executors of one phase.
///
/// Many executors count down, one orchestrator waits. Clones share the same count.
#[derive(Clone, Debug)]
pub struct CompletionBarrier {
    tx: Arc<watch::Sender<usize>>,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> Self {
        let (tx, _rx) = watch::channel(count);
        Self { tx: Arc::new(tx) }
    }

    /// Signal one completion. Saturates at zero.
    pub fn count_down(&self) {
        self.tx.send_modify(|remaining| *remaining = remaining.saturating_sub(1));
    }

    pub fn remaining(&self) -> usize {
        *self.tx.borrow()
    }

    /// Wait until the count reaches zero or `timeout` elapses.
    ///
    /// Returns `true` when released by the last completion, `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let released = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|remaining| *remaining == 0)).await,
            Ok(Ok(_))
        );
        released
    }
}
