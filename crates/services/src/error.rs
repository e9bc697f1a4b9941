//! Shared error types for the services crate.

use thiserror::Error;

use proctor_core::model::{
    CheckKind, CheckStatus, ExamId, ExamSessionError, ExamStatus, Role, SessionStateError,
    TransitionError,
};
use storage::repository::{IncidentRecordId, ReviewStatus, StorageError};

/// Rejected configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("incident delay range is empty: min {min}s > max {max}s")]
    InvalidDelayRange { min: u64, max: u64 },
    #[error("incident probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),
    #[error("incident ttl must be positive")]
    ZeroTtl,
    #[error("incident max delay must be positive")]
    ZeroDelay,
    #[error("{field} of {secs}s exceeds the {max}s limit")]
    TooLong {
        field: &'static str,
        secs: u64,
        max: u64,
    },
}

/// `AuthenticationFailure`: surfaced to the caller, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("authentication failed: identifier is not an e-mail address")]
    MalformedIdentifier,
    #[error("authentication failed: credential rejected")]
    InvalidCredential,
}

/// Errors emitted by the session state machine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("no exam session is open")]
    NoExamSession,
    #[error("an exam session is already open")]
    ExamAlreadyOpen,
    #[error("exam {exam_id} is {status} and cannot be entered")]
    ExamUnavailable { exam_id: ExamId, status: ExamStatus },
    #[error("{kind} check is {status:?}; only failed checks can be rescanned")]
    RescanRejected { kind: CheckKind, status: CheckStatus },
    #[error("{0} is not part of this exam's readiness checks")]
    UnknownCheck(CheckKind),
    #[error("readiness run was cancelled")]
    ReadinessCancelled,
    #[error("session store is unavailable")]
    Poisoned,
    #[error(transparent)]
    Authentication(#[from] AuthError),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error(transparent)]
    ExamSession(#[from] ExamSessionError),
    #[error(transparent)]
    Content(#[from] StorageError),
}

impl From<SessionStateError> for SessionError {
    fn from(err: SessionStateError) -> Self {
        match err {
            SessionStateError::NotAuthenticated => Self::NotAuthenticated,
            SessionStateError::ExamAlreadyOpen => Self::ExamAlreadyOpen,
            _ => Self::NoExamSession,
        }
    }
}

/// Errors emitted while assembling `AppServices`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors emitted by `ExamDashboardService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DashboardError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `IncidentReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewError {
    #[error("role {0} may not review incidents")]
    Forbidden(Role),
    #[error("incident {id} is already {status}")]
    AlreadyResolved {
        id: IncidentRecordId,
        status: ReviewStatus,
    },
    #[error("an incident can only be resolved as reviewed or dismissed")]
    InvalidResolution,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
