use std::sync::Arc;
use std::time::Duration;

use proctor_core::model::{
    CheckKind, CheckStatus, ExamId, ExamPhase, ExamStatus, IncidentCategory, LobbyAction,
    ProctorSetting, ProctorSettings, ReadinessVerdict, TransitionError, UnmetGuard,
};
use proctor_core::time::fixed_clock;
use services::{
    Collaborators, DiceFactory, IncidentDice, MockAuthenticator, ScriptedDice, ServicesConfig,
    SessionError, SessionEvent, SessionMachine, SimulatedProbe,
};
use storage::demo::demo_exams;
use storage::repository::{ExamCatalog, IncidentLog, InMemoryRepository};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

const AVAILABLE: ExamId = ExamId::new(2);

struct Harness {
    machine: SessionMachine,
    repo: InMemoryRepository,
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn scripted(dice: ScriptedDice) -> DiceFactory {
    Arc::new(move || -> Box<dyn IncidentDice> { Box::new(dice.clone()) })
}

async fn harness(duration_seconds: u64, probe: SimulatedProbe, dice: ScriptedDice) -> Harness {
    let repo = InMemoryRepository::with_demo_exams();
    let record = demo_exams()
        .into_iter()
        .find(|record| record.listing.id == AVAILABLE)
        .unwrap()
        .with_duration_seconds(duration_seconds);
    repo.upsert_exam(record).await.unwrap();

    let clock = fixed_clock();
    let collaborators = Collaborators {
        authenticator: Arc::new(MockAuthenticator::instant(clock)),
        exams: Arc::new(repo.clone()),
        incident_log: Arc::new(repo.clone()),
        probe: Arc::new(probe),
    };
    let machine = SessionMachine::new(clock, &ServicesConfig::default(), collaborators)
        .with_dice(scripted(dice));
    Harness { machine, repo }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn raised_categories(events: &[SessionEvent]) -> Vec<IncidentCategory> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::IncidentRaised(incident) => Some(incident.category()),
            _ => None,
        })
        .collect()
}

fn phase(machine: &SessionMachine) -> Option<ExamPhase> {
    machine.snapshot().unwrap().phase()
}

/// Sign in, open the available exam, pass every check and consent.
async fn ready(machine: &SessionMachine) {
    machine.login("student@school.edu", "pw").await.unwrap();
    machine.enter_lobby(AVAILABLE).await.unwrap();
    let board = machine.run_checks().await.unwrap();
    assert_eq!(board.verdict(), ReadinessVerdict::Passed);
    machine.give_consent().unwrap();
}

#[tokio::test(start_paused = true)]
async fn short_exam_expires_and_stops_background_work() {
    let h = harness(
        5,
        SimulatedProbe::new(&services::ReadinessConfig::default()),
        ScriptedDice::new(),
    )
    .await;
    h.machine.login("student@school.edu", "pw").await.unwrap();
    h.machine.enter_lobby(AVAILABLE).await.unwrap();
    assert_eq!(phase(&h.machine), Some(ExamPhase::CheckingReadiness));

    let checks_started = Instant::now();
    let board = h.machine.run_checks().await.unwrap();
    assert!(checks_started.elapsed() <= secs(2));
    assert!(
        CheckKind::ALL
            .iter()
            .all(|kind| board.status(*kind) == Some(CheckStatus::Passed))
    );
    assert_eq!(phase(&h.machine), Some(ExamPhase::ReadyAwaitingConsent));

    h.machine.give_consent().unwrap();
    h.machine.start_active().unwrap();
    assert!(h.machine.background_active().unwrap());

    time::sleep(secs(5)).await;
    settle().await;

    let snapshot = h.machine.snapshot().unwrap();
    let exam = snapshot.exam().unwrap();
    assert_eq!(exam.phase(), ExamPhase::Expired);
    assert_eq!(exam.remaining_seconds(), 0);
    assert!(exam.finished_at().is_some());
    assert!(!h.machine.background_active().unwrap());
}

#[tokio::test(start_paused = true)]
async fn submit_freezes_remaining_time_and_silences_ticks() {
    let h = harness(7200, SimulatedProbe::instant(), ScriptedDice::new()).await;
    ready(&h.machine).await;
    h.machine.start_active().unwrap();
    let mut rx = h.machine.subscribe();

    time::sleep(secs(30)).await;
    settle().await;
    let outcome = h.machine.submit().unwrap();
    assert_eq!(outcome.phase, ExamPhase::Submitted);
    assert_eq!(outcome.remaining_seconds, 7170);

    time::sleep(secs(60)).await;
    settle().await;

    let events = drain(&mut rx);
    let submitted = events
        .iter()
        .position(|event| {
            matches!(
                event,
                SessionEvent::PhaseChanged {
                    to: ExamPhase::Submitted,
                    ..
                }
            )
        })
        .unwrap();
    assert!(
        events[..submitted]
            .iter()
            .any(|event| matches!(event, SessionEvent::Tick { remaining_seconds: 7170 }))
    );
    assert!(
        !events[submitted..]
            .iter()
            .any(|event| matches!(event, SessionEvent::Tick { .. }))
    );
    assert_eq!(
        h.machine.snapshot().unwrap().exam().unwrap().remaining_seconds(),
        7170
    );
    assert!(!h.machine.background_active().unwrap());
}

#[tokio::test(start_paused = true)]
async fn start_without_consent_is_rejected_every_time() {
    let h = harness(600, SimulatedProbe::instant(), ScriptedDice::new()).await;
    h.machine.login("student@school.edu", "pw").await.unwrap();
    h.machine.enter_lobby(AVAILABLE).await.unwrap();

    let early = h.machine.start_active().unwrap_err();
    assert!(matches!(
        early,
        SessionError::InvalidTransition(TransitionError::NotAllowed {
            from: ExamPhase::CheckingReadiness,
            ..
        })
    ));

    h.machine.run_checks().await.unwrap();
    for _ in 0..3 {
        let err = h.machine.start_active().unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition(TransitionError::GuardUnmet {
                guard: UnmetGuard::ConsentMissing,
                ..
            })
        ));
        assert_eq!(phase(&h.machine), Some(ExamPhase::ReadyAwaitingConsent));
    }
    assert!(!h.machine.background_active().unwrap());

    h.machine.give_consent().unwrap();
    h.machine.withdraw_consent().unwrap();
    assert!(h.machine.start_active().is_err());
}

#[tokio::test(start_paused = true)]
async fn lobby_actions_are_rejected_once_active() {
    let h = harness(600, SimulatedProbe::instant(), ScriptedDice::new()).await;
    ready(&h.machine).await;
    h.machine.start_active().unwrap();

    let err = h.machine.run_checks().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidTransition(TransitionError::OutsideLobby {
            from: ExamPhase::Active,
            action: LobbyAction::RunChecks,
        })
    ));
    assert!(err.to_string().contains("running readiness checks"));

    assert!(matches!(
        h.machine.rescan(CheckKind::Camera).await.unwrap_err(),
        SessionError::InvalidTransition(TransitionError::OutsideLobby {
            action: LobbyAction::Rescan,
            ..
        })
    ));
    assert!(matches!(
        h.machine.withdraw_consent().unwrap_err(),
        SessionError::InvalidTransition(TransitionError::OutsideLobby {
            action: LobbyAction::Consent,
            ..
        })
    ));
    assert_eq!(phase(&h.machine), Some(ExamPhase::Active));
}

#[tokio::test(start_paused = true)]
async fn rescanning_a_failed_check_leaves_the_others_alone() {
    let probe = SimulatedProbe::new(&services::ReadinessConfig::default())
        .fail_times(CheckKind::Microphone, 1);
    let h = harness(600, probe, ScriptedDice::new()).await;
    h.machine.login("student@school.edu", "pw").await.unwrap();
    h.machine.enter_lobby(AVAILABLE).await.unwrap();

    let board = h.machine.run_checks().await.unwrap();
    assert_eq!(board.verdict(), ReadinessVerdict::Failed);
    assert_eq!(board.failed(), vec![CheckKind::Microphone]);
    assert_eq!(phase(&h.machine), Some(ExamPhase::CheckingReadiness));

    let rejected = h.machine.rescan(CheckKind::Camera).await.unwrap_err();
    assert!(matches!(
        rejected,
        SessionError::RescanRejected {
            kind: CheckKind::Camera,
            status: CheckStatus::Passed
        }
    ));

    let mut rx = h.machine.subscribe();
    let board = h.machine.rescan(CheckKind::Microphone).await.unwrap();
    assert_eq!(board.verdict(), ReadinessVerdict::Passed);
    assert_eq!(phase(&h.machine), Some(ExamPhase::ReadyAwaitingConsent));

    let touched: Vec<CheckKind> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::CheckUpdated { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(touched.len(), 3);
    assert!(touched.iter().all(|kind| *kind == CheckKind::Microphone));
}

#[tokio::test(start_paused = true)]
async fn incidents_live_for_their_ttl_and_stop_after_submit() {
    let dice = ScriptedDice::new()
        .with_delays([secs(20), secs(20), secs(20)])
        .with_rolls([0.0, 0.0, 0.0])
        .with_picks([0, 3, 1]);
    let h = harness(7200, SimulatedProbe::instant(), dice).await;
    ready(&h.machine).await;
    h.machine.start_active().unwrap();
    let t0 = Instant::now();
    let mut rx = h.machine.subscribe();

    time::sleep_until(t0 + secs(20)).await;
    settle().await;
    let live = h.machine.snapshot().unwrap().live_incidents;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].expires_at() - live[0].created_at(), secs(10));

    time::sleep_until(t0 + secs(29)).await;
    settle().await;
    assert_eq!(h.machine.snapshot().unwrap().live_incidents.len(), 1);

    time::sleep_until(t0 + secs(30)).await;
    settle().await;
    assert!(h.machine.snapshot().unwrap().live_incidents.is_empty());

    time::sleep_until(t0 + secs(42)).await;
    settle().await;
    assert_eq!(h.machine.snapshot().unwrap().live_incidents.len(), 1);

    let outcome = h.machine.submit().unwrap();
    assert_eq!(outcome.incidents_raised, 2);

    time::sleep_until(t0 + secs(200)).await;
    settle().await;

    let events = drain(&mut rx);
    let submitted = events
        .iter()
        .position(|event| matches!(event, SessionEvent::PhaseChanged { .. }))
        .unwrap();
    assert!(!events[submitted..].iter().any(|event| matches!(
        event,
        SessionEvent::IncidentRaised(_) | SessionEvent::IncidentExpired { .. }
    )));
    assert!(h.machine.snapshot().unwrap().exam().unwrap().incidents().is_empty());

    let records = h.repo.list_recent(10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.exam_id == AVAILABLE));
    assert!(records.iter().all(|record| record.candidate == "student"));
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_wins_over_an_incident_in_flight() {
    let dice = ScriptedDice::new()
        .with_delays([secs(20)])
        .with_rolls([0.0]);
    let h = harness(25, SimulatedProbe::instant(), dice).await;
    ready(&h.machine).await;
    h.machine.start_active().unwrap();
    let t0 = Instant::now();
    let mut rx = h.machine.subscribe();

    time::sleep_until(t0 + secs(40)).await;
    settle().await;

    let events = drain(&mut rx);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, SessionEvent::IncidentRaised(_)))
    );
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, SessionEvent::IncidentExpired { .. }))
    );
    let snapshot = h.machine.snapshot().unwrap();
    assert_eq!(snapshot.phase(), Some(ExamPhase::Expired));
    assert!(snapshot.exam().unwrap().incidents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn leaving_an_active_room_submits_then_destroys_the_attempt() {
    let h = harness(600, SimulatedProbe::instant(), ScriptedDice::new()).await;
    ready(&h.machine).await;
    h.machine.start_active().unwrap();
    let mut rx = h.machine.subscribe();

    time::sleep(secs(10)).await;
    settle().await;
    let outcome = h.machine.leave_room().unwrap();
    assert_eq!(outcome.phase, ExamPhase::Submitted);
    assert_eq!(outcome.remaining_seconds, 590);

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::ExamClosed {
            final_phase: ExamPhase::Submitted,
            ..
        })
    ));
    assert!(h.machine.snapshot().unwrap().exam().is_none());
    assert!(!h.machine.background_active().unwrap());

    // A fresh attempt can be opened afterwards.
    h.machine.enter_lobby(AVAILABLE).await.unwrap();
    assert_eq!(phase(&h.machine), Some(ExamPhase::CheckingReadiness));
}

#[tokio::test(start_paused = true)]
async fn leaving_the_lobby_cancels_a_readiness_run() {
    let h = harness(
        600,
        SimulatedProbe::new(&services::ReadinessConfig::default()),
        ScriptedDice::new(),
    )
    .await;
    h.machine.login("student@school.edu", "pw").await.unwrap();
    h.machine.enter_lobby(AVAILABLE).await.unwrap();

    let machine = h.machine.clone();
    let run = tokio::spawn(async move { machine.run_checks().await });
    time::sleep(Duration::from_millis(500)).await;
    settle().await;

    let outcome = h.machine.leave_room().unwrap();
    assert_eq!(outcome.phase, ExamPhase::CheckingReadiness);
    assert!(matches!(
        run.await.unwrap(),
        Err(SessionError::ReadinessCancelled)
    ));
    assert!(h.machine.snapshot().unwrap().exam().is_none());
}

#[tokio::test(start_paused = true)]
async fn logout_cancels_everything_and_restores_settings() {
    let h = harness(600, SimulatedProbe::instant(), ScriptedDice::new()).await;
    ready(&h.machine).await;
    assert!(!h.machine.toggle_setting(ProctorSetting::Recording).unwrap());
    h.machine.start_active().unwrap();

    h.machine.logout().unwrap();
    let snapshot = h.machine.snapshot().unwrap();
    assert!(!snapshot.session.is_authenticated());
    assert!(snapshot.exam().is_none());
    assert_eq!(snapshot.settings, ProctorSettings::default());
    assert!(!h.machine.background_active().unwrap());
}

#[tokio::test(start_paused = true)]
async fn setting_toggles_apply_from_the_next_attempt() {
    let dice = ScriptedDice::new()
        .with_delays([secs(20)])
        .with_rolls([0.0])
        .with_picks([0]);
    let h = harness(600, SimulatedProbe::instant(), dice).await;
    ready(&h.machine).await;
    h.machine.start_active().unwrap();
    let mut rx = h.machine.subscribe();

    assert!(
        !h.machine
            .toggle_setting(ProctorSetting::FacialRecognition)
            .unwrap()
    );
    time::sleep(secs(21)).await;
    settle().await;
    assert_eq!(
        raised_categories(&drain(&mut rx)),
        vec![IncidentCategory::MultipleFaces]
    );

    h.machine.leave_room().unwrap();
    h.machine.enter_lobby(AVAILABLE).await.unwrap();
    h.machine.run_checks().await.unwrap();
    h.machine.give_consent().unwrap();
    h.machine.start_active().unwrap();
    drain(&mut rx);

    time::sleep(secs(21)).await;
    settle().await;
    assert_eq!(
        raised_categories(&drain(&mut rx)),
        vec![IncidentCategory::LookingAway]
    );
    assert!(!h.machine.settings().unwrap().facial_recognition);
}

#[tokio::test(start_paused = true)]
async fn lobby_entry_is_gated_by_sign_in_and_availability() {
    let h = harness(600, SimulatedProbe::instant(), ScriptedDice::new()).await;
    assert!(matches!(
        h.machine.enter_lobby(AVAILABLE).await.unwrap_err(),
        SessionError::NotAuthenticated
    ));

    assert!(matches!(
        h.machine.login("not-an-email", "pw").await.unwrap_err(),
        SessionError::Authentication(_)
    ));
    assert!(!h.machine.snapshot().unwrap().session.is_authenticated());

    h.machine.login("student@school.edu", "pw").await.unwrap();
    assert!(matches!(
        h.machine.enter_lobby(ExamId::new(1)).await.unwrap_err(),
        SessionError::ExamUnavailable {
            status: ExamStatus::Upcoming,
            ..
        }
    ));
    h.machine.enter_lobby(AVAILABLE).await.unwrap();
    assert!(matches!(
        h.machine.enter_lobby(AVAILABLE).await.unwrap_err(),
        SessionError::ExamAlreadyOpen
    ));
}
