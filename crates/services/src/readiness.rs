//! Lobby device checks run as concurrent tasks.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use proctor_core::model::{CheckFailed, CheckKind, CheckStatus, ReadinessBoard, ReadinessVerdict};

use crate::config::ReadinessConfig;

/// Runs one device or environment verification.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// # Errors
    ///
    /// Returns `CheckFailed` when the device does not verify.
    async fn run(&self, kind: CheckKind) -> Result<(), CheckFailed>;
}

/// Probe that sleeps for a per-check latency and fails scripted checks.
#[derive(Debug, Default)]
pub struct SimulatedProbe {
    latencies: HashMap<CheckKind, Duration>,
    failures: Mutex<HashMap<CheckKind, u32>>,
}

impl SimulatedProbe {
    /// Latencies from config; every check listed under `fail` fails once.
    #[must_use]
    pub fn new(config: &ReadinessConfig) -> Self {
        let latencies = CheckKind::ALL
            .iter()
            .map(|kind| (*kind, config.latency(*kind)))
            .collect();
        let mut failures = HashMap::new();
        for kind in &config.fail {
            *failures.entry(*kind).or_insert(0) += 1;
        }
        Self {
            latencies,
            failures: Mutex::new(failures),
        }
    }

    /// Every check passes without delay.
    #[must_use]
    pub fn instant() -> Self {
        Self::default()
    }

    /// Make the next `times` runs of `kind` fail.
    #[must_use]
    pub fn fail_times(self, kind: CheckKind, times: u32) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(kind, times);
        }
        self
    }

    fn take_failure(&self, kind: CheckKind) -> bool {
        let Ok(mut failures) = self.failures.lock() else {
            return false;
        };
        match failures.get_mut(&kind) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DeviceProbe for SimulatedProbe {
    async fn run(&self, kind: CheckKind) -> Result<(), CheckFailed> {
        if let Some(latency) = self.latencies.get(&kind).filter(|d| !d.is_zero()) {
            tokio::time::sleep(*latency).await;
        }
        if self.take_failure(kind) {
            return Err(CheckFailed::new(kind, "device did not respond"));
        }
        Ok(())
    }
}

/// One status change reported by a running check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckUpdate {
    pub kind: CheckKind,
    pub status: CheckStatus,
}

/// Starts readiness runs against a probe.
#[derive(Clone)]
pub struct ReadinessSequencer {
    probe: Arc<dyn DeviceProbe>,
}

impl ReadinessSequencer {
    #[must_use]
    pub fn new(probe: Arc<dyn DeviceProbe>) -> Self {
        Self { probe }
    }

    /// Start every check in `kinds` concurrently.
    ///
    /// Each check reports `Pending`, `Running`, then `Passed` or `Failed`.
    /// A failure never cancels the others. Dropping the returned run aborts
    /// whatever is still in flight.
    #[must_use]
    pub fn run(&self, kinds: &[CheckKind]) -> ReadinessRun {
        let board = ReadinessBoard::new(kinds);
        let (tx, updates) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for kind in board.kinds() {
            let _ = tx.send(CheckUpdate {
                kind,
                status: CheckStatus::Pending,
            });
        }
        for kind in board.kinds() {
            let tx = tx.clone();
            let probe = Arc::clone(&self.probe);
            tasks.spawn(async move {
                let _ = tx.send(CheckUpdate {
                    kind,
                    status: CheckStatus::Running,
                });
                let status = match probe.run(kind).await {
                    Ok(()) => CheckStatus::Passed,
                    Err(err) => {
                        debug!(check = %kind, reason = %err.reason, "readiness check failed");
                        CheckStatus::Failed
                    }
                };
                let _ = tx.send(CheckUpdate { kind, status });
            });
        }

        ReadinessRun {
            board,
            updates,
            _tasks: tasks,
        }
    }
}

/// An in-flight readiness run.
pub struct ReadinessRun {
    board: ReadinessBoard,
    updates: mpsc::UnboundedReceiver<CheckUpdate>,
    _tasks: JoinSet<()>,
}

impl ReadinessRun {
    /// Next applied update, or `None` once every check has finished.
    pub async fn next(&mut self) -> Option<CheckUpdate> {
        while let Some(update) = self.updates.recv().await {
            if self.board.record(update.kind, update.status) {
                return Some(update);
            }
        }
        None
    }

    #[must_use]
    pub fn board(&self) -> &ReadinessBoard {
        &self.board
    }

    #[must_use]
    pub fn verdict(&self) -> ReadinessVerdict {
        self.board.verdict()
    }

    /// Drain remaining updates and return the final board.
    pub async fn finish(mut self) -> ReadinessBoard {
        while self.next().await.is_some() {}
        self.board
    }
}
