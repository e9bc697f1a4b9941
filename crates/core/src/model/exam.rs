use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

use crate::model::ids::{AttemptId, ExamId, IncidentId};
use crate::model::incident::Incident;
use crate::model::readiness::{CheckKind, CheckStatus, ReadinessBoard};

/// Below this many seconds the remaining time is shown as a warning.
pub const LOW_TIME_THRESHOLD_SECS: u64 = 300;

//
// ─── CATALOG LISTING ───────────────────────────────────────────────────────────
//

/// Availability of an exam on the candidate dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamStatus {
    Upcoming,
    Available,
    Completed,
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExamStatus::Upcoming => "upcoming",
            ExamStatus::Available => "available",
            ExamStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Dashboard row for one exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamListing {
    pub id: ExamId,
    pub title: String,
    pub course: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: ExamStatus,
}

//
// ─── PHASES & EVENTS ───────────────────────────────────────────────────────────
//

/// Lifecycle phase of one attempt. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamPhase {
    NotStarted,
    CheckingReadiness,
    ReadyAwaitingConsent,
    Active,
    Submitted,
    Expired,
}

impl ExamPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::Expired)
    }

    /// Target phase for `event`, ignoring guards. `None` if the table has no edge.
    #[must_use]
    pub fn next(self, event: ExamEvent) -> Option<ExamPhase> {
        match (self, event) {
            (Self::NotStarted, ExamEvent::EnterLobby) => Some(Self::CheckingReadiness),
            (Self::CheckingReadiness, ExamEvent::AllChecksPassed) => {
                Some(Self::ReadyAwaitingConsent)
            }
            (Self::ReadyAwaitingConsent, ExamEvent::Start) => Some(Self::Active),
            (Self::Active, ExamEvent::TimerExpired) => Some(Self::Expired),
            (Self::Active, ExamEvent::Submit) => Some(Self::Submitted),
            _ => None,
        }
    }
}

impl fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamEvent {
    EnterLobby,
    AllChecksPassed,
    Start,
    TimerExpired,
    Submit,
}

impl fmt::Display for ExamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lobby operations that mutate an attempt without moving its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyAction {
    RunChecks,
    Rescan,
    Consent,
}

impl fmt::Display for LobbyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobbyAction::RunChecks => f.write_str("running readiness checks"),
            LobbyAction::Rescan => f.write_str("rescanning a check"),
            LobbyAction::Consent => f.write_str("changing consent"),
        }
    }
}

/// Guard that blocked an otherwise legal edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmetGuard {
    ChecksNotPassed,
    ConsentMissing,
}

impl fmt::Display for UnmetGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmetGuard::ChecksNotPassed => f.write_str("not every readiness check has passed"),
            UnmetGuard::ConsentMissing => f.write_str("consent has not been given"),
        }
    }
}

/// A requested transition was rejected. State is never mutated on rejection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionError {
    #[error("{event} is not allowed from {from}")]
    NotAllowed { from: ExamPhase, event: ExamEvent },

    #[error("{event} from {from} rejected: {guard}")]
    GuardUnmet {
        from: ExamPhase,
        event: ExamEvent,
        guard: UnmetGuard,
    },

    #[error("{action} is not allowed from {from}")]
    OutsideLobby { from: ExamPhase, action: LobbyAction },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamSessionError {
    #[error("exam duration must be positive")]
    ZeroDuration,
}

/// Result of an applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: ExamPhase,
    pub to: ExamPhase,
}

//
// ─── EXAM SESSION ──────────────────────────────────────────────────────────────
//

/// One attempt at one exam, owned by the candidate's `Session`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    attempt_id: AttemptId,
    exam_id: ExamId,
    title: String,
    duration_seconds: u64,
    opened_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    remaining_seconds: u64,
    phase: ExamPhase,
    consent: bool,
    checks: ReadinessBoard,
    incidents: Vec<Incident>,
    incidents_raised: u32,
}

impl ExamSession {
    /// Open a new attempt in `NotStarted`.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::ZeroDuration` if `duration_seconds` is zero.
    pub fn new(
        exam_id: ExamId,
        title: impl Into<String>,
        duration_seconds: u64,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, ExamSessionError> {
        if duration_seconds == 0 {
            return Err(ExamSessionError::ZeroDuration);
        }
        Ok(Self {
            attempt_id: AttemptId::generate(),
            exam_id,
            title: title.into(),
            duration_seconds,
            opened_at,
            started_at: None,
            finished_at: None,
            remaining_seconds: duration_seconds,
            phase: ExamPhase::NotStarted,
            consent: false,
            checks: ReadinessBoard::default(),
            incidents: Vec::new(),
            incidents_raised: 0,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    #[must_use]
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    #[must_use]
    pub fn has_consent(&self) -> bool {
        self.consent
    }

    #[must_use]
    pub fn checks(&self) -> &ReadinessBoard {
        &self.checks
    }

    #[must_use]
    pub fn incidents_raised(&self) -> u32 {
        self.incidents_raised
    }

    /// Incidents still tracked by the attempt, including ones whose expiry has
    /// not been processed yet. Use `live_incidents` for a time-exact view.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    #[must_use]
    pub fn live_incidents(&self, now: Instant) -> Vec<Incident> {
        self.incidents
            .iter()
            .filter(|incident| incident.is_live_at(now))
            .cloned()
            .collect()
    }

    /// Apply a lifecycle event, enforcing the phase table and its guards.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the edge does not exist or a guard is
    /// unmet. The session is left untouched in that case.
    pub fn apply(
        &mut self,
        event: ExamEvent,
        now: DateTime<Utc>,
    ) -> Result<PhaseChange, TransitionError> {
        let from = self.phase;
        let to = from
            .next(event)
            .ok_or(TransitionError::NotAllowed { from, event })?;

        match event {
            ExamEvent::AllChecksPassed if !self.checks.all_passed() => {
                return Err(TransitionError::GuardUnmet {
                    from,
                    event,
                    guard: UnmetGuard::ChecksNotPassed,
                });
            }
            ExamEvent::Start if !self.consent => {
                return Err(TransitionError::GuardUnmet {
                    from,
                    event,
                    guard: UnmetGuard::ConsentMissing,
                });
            }
            ExamEvent::Start if !self.checks.all_passed() => {
                return Err(TransitionError::GuardUnmet {
                    from,
                    event,
                    guard: UnmetGuard::ChecksNotPassed,
                });
            }
            _ => {}
        }

        match to {
            ExamPhase::Active => {
                self.started_at = Some(now);
                self.remaining_seconds = self.duration_seconds;
            }
            ExamPhase::Expired => {
                self.remaining_seconds = 0;
                self.finished_at = Some(now);
                self.incidents.clear();
            }
            ExamPhase::Submitted => {
                self.finished_at = Some(now);
                self.incidents.clear();
            }
            _ => {}
        }
        self.phase = to;
        Ok(PhaseChange { from, to })
    }

    /// Record or withdraw consent while still in the lobby.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::OutsideLobby` outside the readiness phases.
    pub fn set_consent(&mut self, consent: bool) -> Result<(), TransitionError> {
        if !self.accepts_check_updates() {
            return Err(TransitionError::OutsideLobby {
                from: self.phase,
                action: LobbyAction::Consent,
            });
        }
        self.consent = consent;
        Ok(())
    }

    /// Whether the readiness board may be mutated in the current phase.
    #[must_use]
    pub fn accepts_check_updates(&self) -> bool {
        matches!(
            self.phase,
            ExamPhase::CheckingReadiness | ExamPhase::ReadyAwaitingConsent
        )
    }

    /// Reset every check to `Pending` ahead of a full run.
    pub fn reset_checks(&mut self) -> bool {
        if !self.accepts_check_updates() {
            return false;
        }
        self.checks.reset_all();
        true
    }

    /// Apply one check update. Ignored outside the readiness phases.
    pub fn record_check(&mut self, kind: CheckKind, status: CheckStatus) -> bool {
        self.accepts_check_updates() && self.checks.record(kind, status)
    }

    /// Store a countdown tick. Ignored unless `Active`; never increases.
    pub fn record_tick(&mut self, remaining: u64) -> bool {
        if self.phase != ExamPhase::Active {
            return false;
        }
        self.remaining_seconds = remaining.min(self.remaining_seconds);
        true
    }

    /// Track a freshly raised incident. Ignored unless `Active`.
    pub fn raise_incident(&mut self, incident: Incident) -> bool {
        if self.phase != ExamPhase::Active {
            return false;
        }
        self.incidents.push(incident);
        self.incidents_raised = self.incidents_raised.saturating_add(1);
        true
    }

    /// Drop an incident whose TTL elapsed. Returns whether it was present.
    pub fn expire_incident(&mut self, id: IncidentId) -> bool {
        let before = self.incidents.len();
        self.incidents.retain(|incident| incident.id() != id);
        before != self.incidents.len()
    }
}

//
// ─── REMAINING TIME ────────────────────────────────────────────────────────────
//

/// Format seconds as `mm:ss`; minutes are not wrapped into hours.
#[must_use]
pub fn format_remaining(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[must_use]
pub fn is_low_time(seconds: u64) -> bool {
    seconds < LOW_TIME_THRESHOLD_SECS
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
