use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proctor_core::model::{ExamId, ExamListing, ExamStatus, IncidentCategory, Severity, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),
}

//
// ─── EXAM CONTENT ──────────────────────────────────────────────────────────────
//

/// One multiple-choice question. Opaque to the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub text: String,
    pub options: Vec<String>,
}

/// What the lifecycle needs to open an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamContent {
    pub id: ExamId,
    pub title: String,
    pub status: ExamStatus,
    pub duration_seconds: u64,
    pub questions: Vec<Question>,
}

/// Stored shape of an exam: its dashboard listing plus delivery content.
///
/// `duration_seconds` is authoritative for the countdown; the listing's
/// minute count is display-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamRecord {
    pub listing: ExamListing,
    pub duration_seconds: u64,
    pub questions: Vec<Question>,
}

impl ExamRecord {
    #[must_use]
    pub fn new(listing: ExamListing, questions: Vec<Question>) -> Self {
        let duration_seconds = u64::from(listing.duration_minutes) * 60;
        Self {
            listing,
            duration_seconds,
            questions,
        }
    }

    #[must_use]
    pub fn with_duration_seconds(mut self, seconds: u64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn content(&self) -> ExamContent {
        ExamContent {
            id: self.listing.id,
            title: self.listing.title.clone(),
            status: self.listing.status,
            duration_seconds: self.duration_seconds,
            questions: self.questions.clone(),
        }
    }
}

/// Exam content collaborator.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// Fetch delivery content for an exam.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the exam does not exist.
    async fn get_exam(&self, id: ExamId) -> Result<ExamContent, StorageError>;

    /// Dashboard listings ordered by schedule.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_exams(&self) -> Result<Vec<ExamListing>, StorageError>;

    /// Insert or replace an exam.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the exam cannot be stored.
    async fn upsert_exam(&self, record: ExamRecord) -> Result<(), StorageError>;
}

//
// ─── INCIDENT LOG ──────────────────────────────────────────────────────────────
//

/// Storage identifier for an audit record.
pub type IncidentRecordId = u64;

/// Review state of a flagged incident on the proctor dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Reviewed,
    Dismissed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewed => "reviewed",
            ReviewStatus::Dismissed => "dismissed",
        };
        f.write_str(label)
    }
}

/// Audit entry for a raised incident, before the log assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncidentRecord {
    pub exam_id: ExamId,
    pub exam_title: String,
    pub user_id: UserId,
    pub candidate: String,
    pub category: IncidentCategory,
    pub message: String,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: IncidentRecordId,
    pub exam_id: ExamId,
    pub exam_title: String,
    pub user_id: UserId,
    pub candidate: String,
    pub category: IncidentCategory,
    pub message: String,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
    pub status: ReviewStatus,
}

impl IncidentRecord {
    #[must_use]
    pub fn from_new(id: IncidentRecordId, record: NewIncidentRecord) -> Self {
        Self {
            id,
            exam_id: record.exam_id,
            exam_title: record.exam_title,
            user_id: record.user_id,
            candidate: record.candidate,
            category: record.category,
            message: record.message,
            severity: record.severity,
            raised_at: record.raised_at,
            status: ReviewStatus::Pending,
        }
    }
}

/// Incident audit sink.
#[async_trait]
pub trait IncidentLog: Send + Sync {
    /// Append a record and return its id. New records start `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn append(&self, record: NewIncidentRecord) -> Result<IncidentRecordId, StorageError>;

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get(&self, id: IncidentRecordId) -> Result<IncidentRecord, StorageError>;

    /// Most recent records first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the log cannot be read.
    async fn list_recent(&self, limit: usize) -> Result<Vec<IncidentRecord>, StorageError>;

    /// Overwrite the review status and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn set_status(
        &self,
        id: IncidentRecordId,
        status: ReviewStatus,
    ) -> Result<IncidentRecord, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct IncidentTable {
    next_id: IncidentRecordId,
    rows: BTreeMap<IncidentRecordId, IncidentRecord>,
}

/// In-memory repository for the catalog and the audit log.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    exams: Arc<Mutex<BTreeMap<ExamId, ExamRecord>>>,
    incidents: Arc<Mutex<IncidentTable>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with the demo catalog.
    #[must_use]
    pub fn with_demo_exams() -> Self {
        let exams = crate::demo::demo_exams()
            .into_iter()
            .map(|record| (record.listing.id, record))
            .collect();
        Self {
            exams: Arc::new(Mutex::new(exams)),
            incidents: Arc::default(),
        }
    }
}

#[async_trait]
impl ExamCatalog for InMemoryRepository {
    async fn get_exam(&self, id: ExamId) -> Result<ExamContent, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&id)
            .map(ExamRecord::content)
            .ok_or(StorageError::NotFound)
    }

    async fn list_exams(&self) -> Result<Vec<ExamListing>, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut listings: Vec<ExamListing> =
            guard.values().map(|record| record.listing.clone()).collect();
        listings.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        Ok(listings)
    }

    async fn upsert_exam(&self, record: ExamRecord) -> Result<(), StorageError> {
        let mut guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.listing.id, record);
        Ok(())
    }
}

#[async_trait]
impl IncidentLog for InMemoryRepository {
    async fn append(&self, record: NewIncidentRecord) -> Result<IncidentRecordId, StorageError> {
        let mut guard = self
            .incidents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.next_id += 1;
        let id = guard.next_id;
        guard.rows.insert(id, IncidentRecord::from_new(id, record));
        Ok(id)
    }

    async fn get(&self, id: IncidentRecordId) -> Result<IncidentRecord, StorageError> {
        let guard = self
            .incidents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.rows.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<IncidentRecord>, StorageError> {
        let guard = self
            .incidents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<IncidentRecord> = guard.rows.values().cloned().collect();
        rows.sort_by(|a, b| b.raised_at.cmp(&a.raised_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn set_status(
        &self,
        id: IncidentRecordId,
        status: ReviewStatus,
    ) -> Result<IncidentRecord, StorageError> {
        let mut guard = self
            .incidents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let row = guard.rows.get_mut(&id).ok_or(StorageError::NotFound)?;
        row.status = status;
        Ok(row.clone())
    }
}

/// Aggregates collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub exams: Arc<dyn ExamCatalog>,
    pub incidents: Arc<dyn IncidentLog>,
}

impl Storage {
    /// In-memory storage seeded with the demo catalog.
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::with_demo_exams();
        let exams: Arc<dyn ExamCatalog> = Arc::new(repo.clone());
        let incidents: Arc<dyn IncidentLog> = Arc::new(repo);
        Self { exams, incidents }
    }
}
