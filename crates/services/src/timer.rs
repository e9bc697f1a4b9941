//! Per-attempt countdown clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

const TICK: Duration = Duration::from_secs(1);

/// Decrements once per elapsed second and fires its expiry callback exactly once.
///
/// `stop` is idempotent and may be called before the first tick, mid-run, or
/// after expiry. A stopped or expired timer only runs again after `start`.
#[derive(Debug)]
pub struct CountdownTimer {
    remaining: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            remaining: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Begin counting down from `duration_seconds`.
    ///
    /// Restarting cancels any previous run first. A zero duration expires
    /// immediately without ticking. Must be called inside a tokio runtime.
    pub fn start<T, E>(&mut self, duration_seconds: u64, mut on_tick: T, on_expire: E)
    where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.stop();
        self.remaining.store(duration_seconds, Ordering::SeqCst);
        let remaining = Arc::clone(&self.remaining);

        self.task = Some(tokio::spawn(async move {
            if duration_seconds == 0 {
                on_expire();
                return;
            }
            let mut ticks = time::interval_at(Instant::now() + TICK, TICK);
            loop {
                ticks.tick().await;
                let left = remaining.load(Ordering::SeqCst).saturating_sub(1);
                remaining.store(left, Ordering::SeqCst);
                on_tick(left);
                if left == 0 {
                    on_expire();
                    break;
                }
            }
        }));
    }

    /// Cancel the countdown, freezing `remaining`.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
