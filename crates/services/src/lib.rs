#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod incident_review;
pub mod incidents;
pub mod readiness;
pub mod sessions;
pub mod timer;

pub use proctor_core::Clock;

pub use app_services::AppServices;
pub use auth::{Authenticator, MockAuthenticator};
pub use config::{AuthConfig, IncidentConfig, ReadinessConfig, ServicesConfig};
pub use dashboard::{DashboardOverview, ExamDashboardService};
pub use error::{
    AppServicesError, AuthError, ConfigError, DashboardError, ReviewError, SessionError,
};
pub use incident_review::IncidentReviewService;
pub use incidents::{
    DiceFactory, IncidentDice, IncidentGenerator, IncidentSignal, RandomDice, ScriptedDice,
    random_dice_factory,
};
pub use readiness::{CheckUpdate, DeviceProbe, ReadinessRun, ReadinessSequencer, SimulatedProbe};
pub use sessions::{
    Collaborators, ExamOutcome, SessionEvent, SessionMachine, SessionSnapshot, SessionStore,
};
pub use timer::CountdownTimer;
