use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::UserId;

/// Coarse role tag attached to every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Proctor,
    Admin,
}

impl Role {
    /// Derive the role tag from a login identifier.
    ///
    /// Identifiers mentioning `admin` map to `Admin`, then `proctor` to
    /// `Proctor`; everyone else is a `Student`.
    #[must_use]
    pub fn from_identifier(identifier: &str) -> Self {
        let lowered = identifier.to_ascii_lowercase();
        if lowered.contains("admin") {
            Self::Admin
        } else if lowered.contains("proctor") {
            Self::Proctor
        } else {
            Self::Student
        }
    }

    /// Whether this role may review flagged incidents.
    #[must_use]
    pub fn can_review_incidents(self) -> bool {
        matches!(self, Self::Proctor | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Student => "student",
            Role::Proctor => "proctor",
            Role::Admin => "admin",
        };
        f.write_str(label)
    }
}

/// Immutable identity returned by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: UserId,
    display_name: String,
    email: String,
    role: Role,
    authenticated_at: DateTime<Utc>,
}

impl Identity {
    #[must_use]
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        authenticated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            email: email.into(),
            role,
            authenticated_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }
}
