#![forbid(unsafe_code)]

pub mod demo;
pub mod repository;

pub use repository::{
    ExamCatalog, ExamContent, ExamRecord, IncidentLog, IncidentRecord, IncidentRecordId,
    InMemoryRepository, NewIncidentRecord, Question, ReviewStatus, Storage, StorageError,
};
