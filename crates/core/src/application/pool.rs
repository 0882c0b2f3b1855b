// Worker Pool
// Fixed number of concurrently running tasks, shared by every phase of a run

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Bounded task pool.
///
/// Submissions never block; tasks beyond the pool size wait for a free slot inside their own task.
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Pool sized to the host's available parallelism
    pub fn with_available_parallelism() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let mut tasks = self.tasks.lock().await;
        // Reap finished tasks so the set does not grow over a long run
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Let running tasks finish within `grace`, then abort whatever is left.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!("Pooled task panicked: {}", e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), "Pool shutdown grace elapsed, aborting remaining tasks");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        self.permits.close();
        debug!("Worker pool stopped");
    }
}
