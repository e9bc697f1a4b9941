use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::model::ids::IncidentId;
use crate::model::settings::{ProctorSetting, ProctorSettings};

/// How long a raised incident stays visible.
pub const INCIDENT_TTL: Duration = Duration::from_secs(10);

//
// ─── CATEGORIES ────────────────────────────────────────────────────────────────
//

/// Severity attached to an incident when it is written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(label)
    }
}

/// The fixed catalog of simulated proctoring alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    MultipleFaces,
    FaceNotVisible,
    LookingAway,
    BackgroundNoise,
    SuspiciousMovement,
}

impl IncidentCategory {
    pub const CATALOG: [IncidentCategory; 5] = [
        IncidentCategory::MultipleFaces,
        IncidentCategory::FaceNotVisible,
        IncidentCategory::LookingAway,
        IncidentCategory::BackgroundNoise,
        IncidentCategory::SuspiciousMovement,
    ];

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::MultipleFaces => "Multiple faces detected. Please ensure only you are visible.",
            Self::FaceNotVisible => "Face not clearly visible. Adjust your position.",
            Self::LookingAway => "Please avoid looking away from the screen frequently.",
            Self::BackgroundNoise => {
                "Background noise detected. Ensure you're in a quiet environment."
            }
            Self::SuspiciousMovement => {
                "Suspicious movement detected. Remain still during the exam."
            }
        }
    }

    /// The toggle that must be on for this category to fire.
    #[must_use]
    pub fn required_setting(self) -> ProctorSetting {
        match self {
            Self::MultipleFaces | Self::FaceNotVisible => ProctorSetting::FacialRecognition,
            Self::LookingAway | Self::SuspiciousMovement => ProctorSetting::AiMonitoring,
            Self::BackgroundNoise => ProctorSetting::EnvironmentScan,
        }
    }

    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::MultipleFaces => Severity::High,
            Self::FaceNotVisible | Self::SuspiciousMovement => Severity::Medium,
            Self::LookingAway | Self::BackgroundNoise => Severity::Low,
        }
    }

    /// Categories allowed to fire under the given settings, in catalog order.
    #[must_use]
    pub fn enabled_under(settings: &ProctorSettings) -> Vec<IncidentCategory> {
        Self::CATALOG
            .into_iter()
            .filter(|c| settings.is_enabled(c.required_setting()))
            .collect()
    }
}

//
// ─── INCIDENT ──────────────────────────────────────────────────────────────────
//

/// A transient proctoring alert raised during an active attempt.
///
/// `created_at`/`expires_at` are monotonic instants on the scheduler's clock;
/// `raised_at` is the wall-clock stamp used for audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    id: IncidentId,
    category: IncidentCategory,
    created_at: Instant,
    expires_at: Instant,
    raised_at: DateTime<Utc>,
}

impl Incident {
    /// Create an incident that expires exactly `ttl` after `created_at`.
    #[must_use]
    pub fn new(
        id: IncidentId,
        category: IncidentCategory,
        created_at: Instant,
        ttl: Duration,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            category,
            created_at,
            expires_at: created_at + ttl,
            raised_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> IncidentId {
        self.id
    }

    #[must_use]
    pub fn category(&self) -> IncidentCategory {
        self.category
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        self.category.message()
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    #[must_use]
    pub fn raised_at(&self) -> DateTime<Utc> {
        self.raised_at
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }

    /// Visible for every instant in `[created_at, expires_at)`.
    #[must_use]
    pub fn is_live_at(&self, now: Instant) -> bool {
        now >= self.created_at && now < self.expires_at
    }
}
