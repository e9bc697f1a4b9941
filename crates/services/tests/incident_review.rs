use std::sync::Arc;

use proctor_core::model::{ExamId, Identity, IncidentCategory, Role, UserId};
use proctor_core::time::fixed_now;
use services::{IncidentReviewService, ReviewError};
use storage::repository::{InMemoryRepository, IncidentLog, NewIncidentRecord, ReviewStatus};

fn identity(email: &str) -> Identity {
    let role = Role::from_identifier(email);
    Identity::new(UserId::generate(), "someone", email, role, fixed_now())
}

fn flagged(category: IncidentCategory) -> NewIncidentRecord {
    NewIncidentRecord {
        exam_id: ExamId::new(2),
        exam_title: "Data Structures and Algorithms".into(),
        user_id: UserId::generate(),
        candidate: "alex".into(),
        category,
        message: category.message().into(),
        severity: category.severity(),
        raised_at: fixed_now(),
    }
}

#[tokio::test]
async fn proctor_reviews_and_dismisses_flagged_incidents() {
    let repo = InMemoryRepository::new();
    let faces = repo.append(flagged(IncidentCategory::MultipleFaces)).await.unwrap();
    let noise = repo.append(flagged(IncidentCategory::BackgroundNoise)).await.unwrap();
    let service = IncidentReviewService::new(Arc::new(repo.clone()));
    let proctor = identity("proctor@school.edu");

    let listed = service.flagged(&proctor, 10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|r| r.status == ReviewStatus::Pending));

    let reviewed = service
        .resolve(&proctor, faces, ReviewStatus::Reviewed)
        .await
        .unwrap();
    assert_eq!(reviewed.status, ReviewStatus::Reviewed);

    let admin = identity("admin@school.edu");
    service
        .resolve(&admin, noise, ReviewStatus::Dismissed)
        .await
        .unwrap();
    assert_eq!(repo.get(noise).await.unwrap().status, ReviewStatus::Dismissed);

    let again = service
        .resolve(&proctor, faces, ReviewStatus::Dismissed)
        .await
        .unwrap_err();
    assert!(matches!(
        again,
        ReviewError::AlreadyResolved {
            status: ReviewStatus::Reviewed,
            ..
        }
    ));
}

#[tokio::test]
async fn students_cannot_review() {
    let repo = InMemoryRepository::new();
    let id = repo.append(flagged(IncidentCategory::LookingAway)).await.unwrap();
    let service = IncidentReviewService::new(Arc::new(repo));
    let student = identity("sam@school.edu");

    assert!(matches!(
        service.flagged(&student, 10).await.unwrap_err(),
        ReviewError::Forbidden(Role::Student)
    ));
    assert!(matches!(
        service
            .resolve(&student, id, ReviewStatus::Reviewed)
            .await
            .unwrap_err(),
        ReviewError::Forbidden(Role::Student)
    ));
}

#[tokio::test]
async fn resolving_back_to_pending_or_a_missing_record_fails() {
    let repo = InMemoryRepository::new();
    let id = repo.append(flagged(IncidentCategory::FaceNotVisible)).await.unwrap();
    let service = IncidentReviewService::new(Arc::new(repo));
    let proctor = identity("proctor@school.edu");

    assert!(matches!(
        service
            .resolve(&proctor, id, ReviewStatus::Pending)
            .await
            .unwrap_err(),
        ReviewError::InvalidResolution
    ));
    assert!(matches!(
        service
            .resolve(&proctor, id + 100, ReviewStatus::Reviewed)
            .await
            .unwrap_err(),
        ReviewError::Storage(_)
    ));
}
