use std::sync::Arc;

use proctor_core::model::{ExamListing, ExamStatus};
use storage::repository::ExamCatalog;

use crate::error::DashboardError;

/// Candidate dashboard grouped the way the exam list is tabbed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardOverview {
    pub upcoming: Vec<ExamListing>,
    pub available: Vec<ExamListing>,
    pub completed: Vec<ExamListing>,
}

impl DashboardOverview {
    #[must_use]
    pub fn total(&self) -> usize {
        self.upcoming.len() + self.available.len() + self.completed.len()
    }
}

/// Read-only access to the exam catalog for the dashboard.
#[derive(Clone)]
pub struct ExamDashboardService {
    exams: Arc<dyn ExamCatalog>,
}

impl ExamDashboardService {
    #[must_use]
    pub fn new(exams: Arc<dyn ExamCatalog>) -> Self {
        Self { exams }
    }

    /// Every exam ordered by schedule.
    ///
    /// # Errors
    ///
    /// Returns `DashboardError::Storage` if the catalog cannot be read.
    pub async fn list(&self) -> Result<Vec<ExamListing>, DashboardError> {
        Ok(self.exams.list_exams().await?)
    }

    /// # Errors
    ///
    /// Returns `DashboardError::Storage` if the catalog cannot be read.
    pub async fn overview(&self) -> Result<DashboardOverview, DashboardError> {
        let mut overview = DashboardOverview::default();
        for listing in self.list().await? {
            match listing.status {
                ExamStatus::Upcoming => overview.upcoming.push(listing),
                ExamStatus::Available => overview.available.push(listing),
                ExamStatus::Completed => overview.completed.push(listing),
            }
        }
        Ok(overview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::InMemoryRepository;

    #[tokio::test]
    async fn overview_groups_the_demo_catalog_by_status() {
        let service = ExamDashboardService::new(Arc::new(InMemoryRepository::with_demo_exams()));
        let overview = service.overview().await.unwrap();

        assert_eq!(overview.total(), 3);
        assert_eq!(overview.upcoming[0].course, "CS101");
        assert_eq!(overview.available[0].course, "CS201");
        assert_eq!(overview.completed[0].course, "CS301");
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_overview() {
        let service = ExamDashboardService::new(Arc::new(InMemoryRepository::new()));
        assert_eq!(service.overview().await.unwrap(), DashboardOverview::default());
    }
}
