//! Fabricated catalog used by the in-memory backend and the CLI.

use chrono::{DateTime, TimeZone, Utc};
use proctor_core::model::{ExamId, ExamListing, ExamStatus};

use crate::repository::{ExamRecord, Question};

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or_default()
}

fn question(id: u32, text: &str, options: [&str; 4]) -> Question {
    Question {
        id,
        text: text.to_owned(),
        options: options.iter().map(|o| (*o).to_owned()).collect(),
    }
}

/// The five mock questions every demo exam delivers.
#[must_use]
pub fn demo_questions() -> Vec<Question> {
    vec![
        question(
            1,
            "What is the primary purpose of a proctored examination?",
            [
                "To increase test difficulty",
                "To ensure academic integrity",
                "To record student behavior",
                "To automate grading",
            ],
        ),
        question(
            2,
            "Which of the following is NOT typically a feature of automated proctoring systems?",
            [
                "Facial recognition",
                "Eye movement tracking",
                "Automatic grading of essays",
                "Background noise detection",
            ],
        ),
        question(
            3,
            "Which type of authentication is most secure for online proctoring?",
            [
                "Username and password",
                "Email verification",
                "Biometric verification",
                "Knowledge-based questions",
            ],
        ),
        question(
            4,
            "What does AI behavior analysis primarily monitor during a proctored exam?",
            [
                "Test scores",
                "Typing speed",
                "Suspicious movements",
                "Internet connection",
            ],
        ),
        question(
            5,
            "What ethical concern is most commonly associated with automated proctoring?",
            [
                "Environmental impact",
                "Privacy intrusion",
                "Technological dependency",
                "Cost of implementation",
            ],
        ),
    ]
}

/// Three exams: one upcoming, one available, one completed.
#[must_use]
pub fn demo_exams() -> Vec<ExamRecord> {
    let listings = [
        ExamListing {
            id: ExamId::new(1),
            title: "Introduction to Computer Science".into(),
            course: "CS101".into(),
            scheduled_at: at(2025, 5, 15, 10),
            duration_minutes: 120,
            status: ExamStatus::Upcoming,
        },
        ExamListing {
            id: ExamId::new(2),
            title: "Data Structures and Algorithms".into(),
            course: "CS201".into(),
            scheduled_at: at(2025, 5, 10, 14),
            duration_minutes: 180,
            status: ExamStatus::Available,
        },
        ExamListing {
            id: ExamId::new(3),
            title: "Database Systems".into(),
            course: "CS301".into(),
            scheduled_at: at(2025, 5, 5, 9),
            duration_minutes: 90,
            status: ExamStatus::Completed,
        },
    ];

    listings
        .into_iter()
        .map(|listing| ExamRecord::new(listing, demo_questions()))
        .collect()
}
