use std::sync::Arc;

use tracing::info;

use proctor_core::model::Identity;
use storage::repository::{IncidentLog, IncidentRecord, IncidentRecordId, ReviewStatus};

use crate::error::ReviewError;

/// Proctor-facing view over the incident audit log.
#[derive(Clone)]
pub struct IncidentReviewService {
    incidents: Arc<dyn IncidentLog>,
}

impl IncidentReviewService {
    #[must_use]
    pub fn new(incidents: Arc<dyn IncidentLog>) -> Self {
        Self { incidents }
    }

    /// Most recent flagged incidents, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Forbidden` for students, or `Storage` if the log
    /// cannot be read.
    pub async fn flagged(
        &self,
        reviewer: &Identity,
        limit: usize,
    ) -> Result<Vec<IncidentRecord>, ReviewError> {
        ensure_reviewer(reviewer)?;
        Ok(self.incidents.list_recent(limit).await?)
    }

    /// Mark a pending incident as reviewed or dismissed.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for students, `InvalidResolution` when asked to
    /// resolve back to pending, `AlreadyResolved` for a non-pending record,
    /// or `Storage` if the record is missing.
    pub async fn resolve(
        &self,
        reviewer: &Identity,
        id: IncidentRecordId,
        resolution: ReviewStatus,
    ) -> Result<IncidentRecord, ReviewError> {
        ensure_reviewer(reviewer)?;
        if resolution == ReviewStatus::Pending {
            return Err(ReviewError::InvalidResolution);
        }

        let record = self.incidents.get(id).await?;
        if record.status != ReviewStatus::Pending {
            return Err(ReviewError::AlreadyResolved {
                id,
                status: record.status,
            });
        }

        let updated = self.incidents.set_status(id, resolution).await?;
        info!(id, status = %resolution, reviewer = %reviewer.user_id(), "incident resolved");
        Ok(updated)
    }
}

fn ensure_reviewer(reviewer: &Identity) -> Result<(), ReviewError> {
    if reviewer.role().can_review_incidents() {
        Ok(())
    } else {
        Err(ReviewError::Forbidden(reviewer.role()))
    }
}
