use proctor_core::model::{ExamId, ExamStatus};
use storage::demo::demo_exams;
use storage::repository::{ExamCatalog, IncidentLog, InMemoryRepository, ReviewStatus, Storage};

#[tokio::test]
async fn demo_catalog_lists_exams_by_schedule() {
    let repo = InMemoryRepository::with_demo_exams();

    let listings = repo.list_exams().await.unwrap();
    let courses: Vec<&str> = listings.iter().map(|l| l.course.as_str()).collect();
    assert_eq!(courses, vec!["CS301", "CS201", "CS101"]);

    let available: Vec<ExamId> = listings
        .iter()
        .filter(|l| l.status == ExamStatus::Available)
        .map(|l| l.id)
        .collect();
    assert_eq!(available, vec![ExamId::new(2)]);
}

#[tokio::test]
async fn content_duration_comes_from_minutes() {
    let repo = InMemoryRepository::with_demo_exams();

    let content = repo.get_exam(ExamId::new(2)).await.unwrap();
    assert_eq!(content.duration_seconds, 180 * 60);
    assert_eq!(content.questions.len(), 5);
    assert!(content.questions.iter().all(|q| q.options.len() == 4));
}

#[tokio::test]
async fn upsert_can_shorten_an_exam() {
    let repo = InMemoryRepository::new();
    let record = demo_exams()
        .into_iter()
        .next()
        .unwrap()
        .with_duration_seconds(5);
    repo.upsert_exam(record).await.unwrap();

    let content = repo.get_exam(ExamId::new(1)).await.unwrap();
    assert_eq!(content.duration_seconds, 5);
}

#[tokio::test]
async fn storage_handles_share_one_backend() {
    let storage = Storage::in_memory();
    assert_eq!(storage.exams.list_exams().await.unwrap().len(), 3);
    assert!(storage.incidents.list_recent(10).await.unwrap().is_empty());
    assert!(matches!(
        storage.incidents.set_status(1, ReviewStatus::Dismissed).await,
        Err(storage::StorageError::NotFound)
    ));
}
