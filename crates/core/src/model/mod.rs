mod account;
mod exam;
mod ids;
mod incident;
mod readiness;
mod session;
mod settings;

pub use account::{Identity, Role};
pub use exam::{
    ExamEvent, ExamListing, ExamPhase, ExamSession, ExamSessionError, ExamStatus,
    LOW_TIME_THRESHOLD_SECS, LobbyAction, PhaseChange, TransitionError, UnmetGuard,
    format_remaining, is_low_time,
};
pub use ids::{AttemptId, ExamId, IncidentId, ParseIdError, UserId};
pub use incident::{INCIDENT_TTL, Incident, IncidentCategory, Severity};
pub use readiness::{
    CheckFailed, CheckKind, CheckStatus, ReadinessBoard, ReadinessVerdict, UnknownCheck,
};
pub use session::{Session, SessionStateError};
pub use settings::{ProctorSetting, ProctorSettings};
