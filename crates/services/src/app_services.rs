use std::sync::Arc;
use std::time::Duration;

use storage::repository::Storage;

use crate::Clock;
use crate::auth::{Authenticator, MockAuthenticator};
use crate::config::ServicesConfig;
use crate::dashboard::ExamDashboardService;
use crate::error::AppServicesError;
use crate::incident_review::IncidentReviewService;
use crate::readiness::{DeviceProbe, SimulatedProbe};
use crate::sessions::{Collaborators, SessionMachine};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    machine: SessionMachine,
    dashboard: Arc<ExamDashboardService>,
    incident_review: Arc<IncidentReviewService>,
}

impl AppServices {
    /// Build services over the in-memory demo catalog with the simulated
    /// authenticator and device probe.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if `config` fails validation.
    pub fn in_memory(config: &ServicesConfig, clock: Clock) -> Result<Self, AppServicesError> {
        Self::with_storage(config, clock, Storage::in_memory())
    }

    /// Simulated authenticator and device probe over the given storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if `config` fails validation.
    pub fn with_storage(
        config: &ServicesConfig,
        clock: Clock,
        storage: Storage,
    ) -> Result<Self, AppServicesError> {
        let authenticator: Arc<dyn Authenticator> = Arc::new(MockAuthenticator::new(
            clock,
            Duration::from_millis(config.auth.latency_ms),
        ));
        let probe: Arc<dyn DeviceProbe> = Arc::new(SimulatedProbe::new(&config.readiness));
        Self::with_parts(config, clock, storage, authenticator, probe)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if `config` fails validation.
    pub fn with_parts(
        config: &ServicesConfig,
        clock: Clock,
        storage: Storage,
        authenticator: Arc<dyn Authenticator>,
        probe: Arc<dyn DeviceProbe>,
    ) -> Result<Self, AppServicesError> {
        config.validate()?;

        let machine = SessionMachine::new(
            clock,
            config,
            Collaborators {
                authenticator,
                exams: Arc::clone(&storage.exams),
                incident_log: Arc::clone(&storage.incidents),
                probe,
            },
        );
        let dashboard = Arc::new(ExamDashboardService::new(Arc::clone(&storage.exams)));
        let incident_review = Arc::new(IncidentReviewService::new(Arc::clone(&storage.incidents)));

        Ok(Self {
            machine,
            dashboard,
            incident_review,
        })
    }

    #[must_use]
    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<ExamDashboardService> {
        Arc::clone(&self.dashboard)
    }

    #[must_use]
    pub fn incident_review(&self) -> Arc<IncidentReviewService> {
        Arc::clone(&self.incident_review)
    }
}
