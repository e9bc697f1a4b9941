use async_trait::async_trait;
use std::time::Duration;

use proctor_core::model::{Identity, Role, UserId};

use crate::Clock;
use crate::error::AuthError;

/// Identity collaborator. Failures are surfaced, never retried.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify a credential and produce an identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` when the identifier or credential is rejected.
    async fn authenticate(&self, identifier: &str, credential: &str)
    -> Result<Identity, AuthError>;
}

/// Accepts any well-formed e-mail with a non-empty password after a short delay.
#[derive(Debug, Clone)]
pub struct MockAuthenticator {
    clock: Clock,
    latency: Duration,
}

impl MockAuthenticator {
    #[must_use]
    pub fn new(clock: Clock, latency: Duration) -> Self {
        Self { clock, latency }
    }

    /// No artificial delay; for tests.
    #[must_use]
    pub fn instant(clock: Clock) -> Self {
        Self::new(clock, Duration::ZERO)
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<Identity, AuthError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let identifier = identifier.trim();
        let (local, domain) = identifier
            .split_once('@')
            .ok_or(AuthError::MalformedIdentifier)?;
        if local.is_empty() || domain.is_empty() {
            return Err(AuthError::MalformedIdentifier);
        }
        if credential.is_empty() {
            return Err(AuthError::InvalidCredential);
        }

        Ok(Identity::new(
            UserId::generate(),
            local,
            identifier,
            Role::from_identifier(identifier),
            self.clock.now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::time::{fixed_clock, fixed_now};

    #[tokio::test]
    async fn derives_display_name_and_role() {
        let auth = MockAuthenticator::instant(fixed_clock());
        let identity = auth
            .authenticate("proctor.jane@school.edu", "secret")
            .await
            .unwrap();

        assert_eq!(identity.display_name(), "proctor.jane");
        assert_eq!(identity.role(), Role::Proctor);
        assert_eq!(identity.authenticated_at(), fixed_now());
    }

    #[tokio::test]
    async fn rejects_missing_at_sign_and_empty_password() {
        let auth = MockAuthenticator::instant(fixed_clock());
        assert_eq!(
            auth.authenticate("student", "pw").await.unwrap_err(),
            AuthError::MalformedIdentifier
        );
        assert_eq!(
            auth.authenticate("student@school.edu", "").await.unwrap_err(),
            AuthError::InvalidCredential
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_configured_latency() {
        let auth = MockAuthenticator::new(fixed_clock(), Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        auth.authenticate("a@b.c", "pw").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
