// Clock port
// Elapsed-time accounting for executions goes through this so tests control time

pub trait TimeProvider: Send + Sync {
    /// Wall-clock milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Milliseconds since `start_millis`, never negative
    fn elapsed_since(&self, start_millis: i64) -> i64 {
        (self.now_millis() - start_millis).max(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that moves only when told to, or by a fixed step on every reading
    #[derive(Debug, Default)]
    pub struct ManualTimeProvider {
        now: AtomicI64,
        step: i64,
    }

    impl ManualTimeProvider {
        pub fn new(start_millis: i64) -> Self {
            Self::ticking(start_millis, 0)
        }

        /// Every `now_millis` call returns the current time, then advances by `step_millis`
        pub fn ticking(start_millis: i64, step_millis: i64) -> Self {
            Self {
                now: AtomicI64::new(start_millis),
                step: step_millis,
            }
        }

        pub fn advance(&self, millis: i64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for ManualTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now.fetch_add(self.step, Ordering::SeqCst)
        }
    }
}
