use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── CHECK KINDS ───────────────────────────────────────────────────────────────
//

/// A device or environment verification run in the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Camera,
    Microphone,
    Browser,
    Environment,
}

impl CheckKind {
    /// Every check, in lobby display order.
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Camera,
        CheckKind::Microphone,
        CheckKind::Browser,
        CheckKind::Environment,
    ];
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckKind::Camera => "camera",
            CheckKind::Microphone => "microphone",
            CheckKind::Browser => "browser",
            CheckKind::Environment => "environment",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown readiness check: {0}")]
pub struct UnknownCheck(pub String);

impl FromStr for CheckKind {
    type Err = UnknownCheck;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camera" => Ok(Self::Camera),
            "microphone" | "mic" => Ok(Self::Microphone),
            "browser" => Ok(Self::Browser),
            "environment" | "env" => Ok(Self::Environment),
            other => Err(UnknownCheck(other.to_owned())),
        }
    }
}

//
// ─── CHECK STATUS ──────────────────────────────────────────────────────────────
//

/// Lifecycle of one check: `Pending → Running → {Passed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl CheckStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Whether `self → next` is a legal step for a single run.
    ///
    /// Resetting to `Pending` is always allowed; it starts a new run.
    #[must_use]
    pub fn can_advance_to(self, next: CheckStatus) -> bool {
        matches!(
            (self, next),
            (_, CheckStatus::Pending)
                | (CheckStatus::Pending, CheckStatus::Running)
                | (CheckStatus::Running, CheckStatus::Passed | CheckStatus::Failed)
        )
    }
}

/// A failed readiness check. Recorded per check, never aborts the others.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} check failed: {reason}")]
pub struct CheckFailed {
    pub kind: CheckKind,
    pub reason: String,
}

impl CheckFailed {
    #[must_use]
    pub fn new(kind: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

//
// ─── BOARD ─────────────────────────────────────────────────────────────────────
//

/// Aggregate verdict over a set of checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessVerdict {
    /// Some check has not finished yet and none has failed.
    InProgress,
    Passed,
    Failed,
}

/// Per-check status table for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessBoard {
    entries: Vec<(CheckKind, CheckStatus)>,
}

impl Default for ReadinessBoard {
    fn default() -> Self {
        Self::new(&CheckKind::ALL)
    }
}

impl ReadinessBoard {
    /// Board with every given check `Pending`. Duplicates are collapsed.
    #[must_use]
    pub fn new(kinds: &[CheckKind]) -> Self {
        let mut entries: Vec<(CheckKind, CheckStatus)> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !entries.iter().any(|(k, _)| k == kind) {
                entries.push((*kind, CheckStatus::Pending));
            }
        }
        Self { entries }
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<CheckKind> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    #[must_use]
    pub fn status(&self, kind: CheckKind) -> Option<CheckStatus> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, status)| *status)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CheckKind, CheckStatus)> + '_ {
        self.entries.iter().copied()
    }

    /// Apply one status update. Returns `false` (and changes nothing) for an
    /// unknown check or an out-of-order step.
    pub fn record(&mut self, kind: CheckKind, status: CheckStatus) -> bool {
        match self.entries.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, current)) if current.can_advance_to(status) => {
                *current = status;
                true
            }
            _ => false,
        }
    }

    pub fn reset_all(&mut self) {
        for (_, status) in &mut self.entries {
            *status = CheckStatus::Pending;
        }
    }

    #[must_use]
    pub fn failed(&self) -> Vec<CheckKind> {
        self.entries
            .iter()
            .filter(|(_, s)| *s == CheckStatus::Failed)
            .map(|(k, _)| *k)
            .collect()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, s)| *s == CheckStatus::Passed)
    }

    /// `Passed` iff every check passed; any failure makes the verdict `Failed`.
    #[must_use]
    pub fn verdict(&self) -> ReadinessVerdict {
        if self.all_passed() {
            ReadinessVerdict::Passed
        } else if self.entries.iter().any(|(_, s)| *s == CheckStatus::Failed) {
            ReadinessVerdict::Failed
        } else {
            ReadinessVerdict::InProgress
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
