use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use proctor_core::model::{
    AttemptId, CheckKind, CheckStatus, ExamEvent, ExamId, ExamPhase, ExamSession, ExamStatus,
    Identity, Incident, IncidentId, LobbyAction, ProctorSetting, ProctorSettings, ReadinessBoard,
    Session, TransitionError,
};
use storage::repository::{ExamCatalog, IncidentLog, NewIncidentRecord};

use crate::Clock;
use crate::auth::Authenticator;
use crate::config::ServicesConfig;
use crate::error::SessionError;
use crate::incidents::{DiceFactory, IncidentGenerator, IncidentSignal, random_dice_factory};
use crate::readiness::{DeviceProbe, ReadinessRun, ReadinessSequencer};

use super::events::SessionEvent;
use super::store::SessionStore;

const EVENT_CAPACITY: usize = 1024;

/// External collaborators the state machine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub exams: Arc<dyn ExamCatalog>,
    pub incident_log: Arc<dyn IncidentLog>,
    pub probe: Arc<dyn DeviceProbe>,
}

/// Final state of an attempt, returned by `submit` and `leave_room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamOutcome {
    pub attempt_id: AttemptId,
    pub exam_id: ExamId,
    pub phase: ExamPhase,
    pub remaining_seconds: u64,
    pub incidents_raised: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&ExamSession> for ExamOutcome {
    fn from(exam: &ExamSession) -> Self {
        Self {
            attempt_id: exam.attempt_id(),
            exam_id: exam.exam_id(),
            phase: exam.phase(),
            remaining_seconds: exam.remaining_seconds(),
            incidents_raised: exam.incidents_raised(),
            started_at: exam.started_at(),
            finished_at: exam.finished_at(),
        }
    }
}

/// Cloned view of the store for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: Session,
    pub settings: ProctorSettings,
    /// Incidents visible right now; expired ones are excluded even if their
    /// removal callback has not run yet.
    pub live_incidents: Vec<Incident>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn exam(&self) -> Option<&ExamSession> {
        self.session.exam()
    }

    #[must_use]
    pub fn phase(&self) -> Option<ExamPhase> {
        self.exam().map(ExamSession::phase)
    }
}

/// Owns the session store and exposes the lifecycle transitions.
///
/// Every mutation takes the store lock, so transitions, ticks, check results
/// and incident signals never interleave. The lock is never held across an
/// `.await`.
#[derive(Clone)]
pub struct SessionMachine {
    store: Arc<Mutex<SessionStore>>,
    events: broadcast::Sender<SessionEvent>,
    clock: Clock,
    collaborators: Collaborators,
    sequencer: ReadinessSequencer,
    dice: DiceFactory,
}

impl SessionMachine {
    #[must_use]
    pub fn new(clock: Clock, config: &ServicesConfig, collaborators: Collaborators) -> Self {
        let generator = IncidentGenerator::new(config.incidents.clone(), clock);
        let store = SessionStore::new(config.settings, generator);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: Arc::new(Mutex::new(store)),
            events,
            clock,
            sequencer: ReadinessSequencer::new(Arc::clone(&collaborators.probe)),
            collaborators,
            dice: random_dice_factory(config.incidents.seed),
        }
    }

    #[must_use]
    pub fn with_dice(mut self, dice: DiceFactory) -> Self {
        self.dice = dice;
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionStore>, SessionError> {
        self.store.lock().map_err(|_| SessionError::Poisoned)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    //
    // ─── AUTHENTICATION ────────────────────────────────────────────────────────
    //

    /// Sign in through the authentication collaborator.
    ///
    /// Signing in over an existing session replaces it, cancelling whatever
    /// it had running.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Authentication` when the credential is rejected;
    /// the store is left untouched.
    pub async fn login(
        &self,
        identifier: &str,
        credential: &str,
    ) -> Result<Identity, SessionError> {
        let identity = match self
            .collaborators
            .authenticator
            .authenticate(identifier, credential)
            .await
        {
            Ok(identity) => identity,
            Err(err) => {
                info!(error = %err, "sign-in rejected");
                return Err(err.into());
            }
        };

        let mut store = self.lock()?;
        if store.session().is_authenticated() {
            store.reset();
            store.bump_epoch();
            self.emit(SessionEvent::SignedOut);
        }
        store.sign_in(identity.clone());
        info!(user = %identity.user_id(), role = %identity.role(), "signed in");
        self.emit(SessionEvent::SignedIn {
            user_id: identity.user_id(),
            role: identity.role(),
        });
        Ok(identity)
    }

    /// Cancel every background process and reset the store.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the store is unavailable.
    pub fn logout(&self) -> Result<(), SessionError> {
        let mut store = self.lock()?;
        let was_signed_in = store.session().is_authenticated();
        store.reset();
        store.bump_epoch();
        if was_signed_in {
            info!("signed out");
            self.emit(SessionEvent::SignedOut);
        }
        Ok(())
    }

    //
    // ─── LOBBY ─────────────────────────────────────────────────────────────────
    //

    /// Open an attempt for an available exam and move it into the lobby.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated`, `ExamAlreadyOpen`, `ExamUnavailable`, or
    /// `Content` when the exam cannot be fetched.
    pub async fn enter_lobby(&self, exam_id: ExamId) -> Result<ExamSession, SessionError> {
        self.ensure_can_open()?;

        let content = self.collaborators.exams.get_exam(exam_id).await?;
        if content.status != ExamStatus::Available {
            return Err(SessionError::ExamUnavailable {
                exam_id,
                status: content.status,
            });
        }

        let mut store = self.lock()?;
        let mut exam = ExamSession::new(
            content.id,
            content.title,
            content.duration_seconds,
            self.clock.now(),
        )?;
        let change = exam.apply(ExamEvent::EnterLobby, self.clock.now())?;
        let attempt_id = exam.attempt_id();
        let opened = store.session_mut().attach_exam(exam)?.clone();

        info!(exam = %exam_id, attempt = %attempt_id, "entered lobby");
        self.emit(SessionEvent::PhaseChanged {
            attempt_id,
            from: change.from,
            to: change.to,
        });
        Ok(opened)
    }

    fn ensure_can_open(&self) -> Result<(), SessionError> {
        let store = self.lock()?;
        let session = store.session();
        if !session.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        if session.exam().is_some() {
            return Err(SessionError::ExamAlreadyOpen);
        }
        Ok(())
    }

    /// Reset every check to `Pending` and run them all concurrently.
    ///
    /// Resolves once every check finished. When all pass while the attempt is
    /// `CheckingReadiness`, it advances to `ReadyAwaitingConsent`. A full run
    /// from `ReadyAwaitingConsent` leaves the phase unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` outside the readiness phases, or
    /// `ReadinessCancelled` if the attempt was closed mid-run.
    pub async fn run_checks(&self) -> Result<ReadinessBoard, SessionError> {
        let handle = {
            let mut store = self.lock()?;
            let exam = store.session_mut().exam_mut()?;
            if !exam.reset_checks() {
                return Err(outside_lobby(exam.phase(), LobbyAction::RunChecks));
            }
            let kinds = exam.checks().kinds();
            store.cancel_readiness();
            let generation = store.next_readiness_generation();
            let epoch = store.epoch();
            let run = self.sequencer.run(&kinds);
            let machine = self.clone();
            let handle =
                tokio::spawn(async move { machine.drive_checks(run, epoch, generation).await });
            store.track_readiness(handle.abort_handle());
            handle
        };
        handle.await.map_err(|_| SessionError::ReadinessCancelled)
    }

    /// Re-run a single failed check, leaving the others untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCheck` if the attempt has no such check,
    /// `RescanRejected` unless the check is `Failed`, or `InvalidTransition`
    /// outside the readiness phases.
    pub async fn rescan(&self, kind: CheckKind) -> Result<ReadinessBoard, SessionError> {
        let handle = {
            let mut store = self.lock()?;
            let exam = store.session_mut().exam_mut()?;
            if !exam.accepts_check_updates() {
                return Err(outside_lobby(exam.phase(), LobbyAction::Rescan));
            }
            let status = exam
                .checks()
                .status(kind)
                .ok_or(SessionError::UnknownCheck(kind))?;
            if status != CheckStatus::Failed {
                return Err(SessionError::RescanRejected { kind, status });
            }
            let generation = store.readiness_generation();
            let epoch = store.epoch();
            let run = self.sequencer.run(&[kind]);
            let machine = self.clone();
            let handle =
                tokio::spawn(async move { machine.drive_checks(run, epoch, generation).await });
            store.track_readiness(handle.abort_handle());
            handle
        };
        info!(check = %kind, "rescanning");
        handle.await.map_err(|_| SessionError::ReadinessCancelled)
    }

    async fn drive_checks(
        self,
        mut run: ReadinessRun,
        epoch: u64,
        generation: u64,
    ) -> ReadinessBoard {
        while let Some(update) = run.next().await {
            let Ok(mut store) = self.store.lock() else {
                break;
            };
            if store.epoch() != epoch || store.readiness_generation() != generation {
                debug!(check = %update.kind, "stale readiness update ignored");
                break;
            }
            let Ok(exam) = store.session_mut().exam_mut() else {
                break;
            };
            if !exam.record_check(update.kind, update.status) {
                continue;
            }
            if update.status.is_terminal() {
                info!(check = %update.kind, status = ?update.status, "readiness check finished");
            }
            self.emit(SessionEvent::CheckUpdated {
                kind: update.kind,
                status: update.status,
            });

            if exam.phase() == ExamPhase::CheckingReadiness && exam.checks().all_passed() {
                if let Ok(change) = exam.apply(ExamEvent::AllChecksPassed, self.clock.now()) {
                    info!("all readiness checks passed");
                    self.emit(SessionEvent::PhaseChanged {
                        attempt_id: exam.attempt_id(),
                        from: change.from,
                        to: change.to,
                    });
                }
            }
        }

        match self.store.lock() {
            Ok(store) => store
                .session()
                .exam()
                .map_or_else(|| run.board().clone(), |exam| exam.checks().clone()),
            Err(_) => run.board().clone(),
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidTransition` outside the readiness phases.
    pub fn give_consent(&self) -> Result<(), SessionError> {
        self.set_consent(true)
    }

    /// # Errors
    ///
    /// Returns `InvalidTransition` outside the readiness phases.
    pub fn withdraw_consent(&self) -> Result<(), SessionError> {
        self.set_consent(false)
    }

    fn set_consent(&self, given: bool) -> Result<(), SessionError> {
        let mut store = self.lock()?;
        store.session_mut().exam_mut()?.set_consent(given)?;
        self.emit(SessionEvent::ConsentChanged { given });
        Ok(())
    }

    //
    // ─── ACTIVE EXAM ───────────────────────────────────────────────────────────
    //

    /// Enter `Active`, starting the countdown and the incident generator in
    /// the same step.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` without mutating anything when consent is
    /// missing, a check has not passed, or the attempt is not awaiting consent.
    pub fn start_active(&self) -> Result<(), SessionError> {
        let mut store = self.lock()?;
        let exam = store.session_mut().exam_mut()?;
        let change = exam.apply(ExamEvent::Start, self.clock.now())?;
        let attempt_id = exam.attempt_id();
        let duration = exam.duration_seconds();

        store.cancel_readiness();
        let epoch = store.bump_epoch();
        let hooks = Hooks {
            store: Arc::downgrade(&self.store),
            events: self.events.clone(),
            clock: self.clock,
            incident_log: Arc::clone(&self.collaborators.incident_log),
            epoch,
        };
        let (tick, expire, incident) = (hooks.clone(), hooks.clone(), hooks);
        store.start_background(
            duration,
            move |remaining| tick.on_tick(remaining),
            move || expire.on_expire(),
            (self.dice)(),
            move |signal| incident.on_incident(signal),
        );

        info!(attempt = %attempt_id, duration_seconds = duration, "exam started");
        self.emit(SessionEvent::PhaseChanged {
            attempt_id,
            from: change.from,
            to: change.to,
        });
        Ok(())
    }

    /// Submit the active attempt, freezing the remaining time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the attempt is `Active`.
    pub fn submit(&self) -> Result<ExamOutcome, SessionError> {
        let mut store = self.lock()?;
        self.submit_locked(&mut store)
    }

    fn submit_locked(&self, store: &mut SessionStore) -> Result<ExamOutcome, SessionError> {
        let from = store
            .session()
            .exam()
            .map(ExamSession::phase)
            .ok_or(SessionError::NoExamSession)?;
        if from.next(ExamEvent::Submit).is_none() {
            return Err(TransitionError::NotAllowed {
                from,
                event: ExamEvent::Submit,
            }
            .into());
        }

        store.halt_background();
        store.bump_epoch();
        let exam = store.session_mut().exam_mut()?;
        let change = exam.apply(ExamEvent::Submit, self.clock.now())?;
        let outcome = ExamOutcome::from(&*exam);

        info!(
            attempt = %outcome.attempt_id,
            remaining_seconds = outcome.remaining_seconds,
            incidents = outcome.incidents_raised,
            "exam submitted"
        );
        self.emit(SessionEvent::PhaseChanged {
            attempt_id: outcome.attempt_id,
            from: change.from,
            to: change.to,
        });
        Ok(outcome)
    }

    /// Close the exam room and destroy the attempt.
    ///
    /// An `Active` attempt is submitted first; a lobby attempt is abandoned
    /// and its readiness run cancelled.
    ///
    /// # Errors
    ///
    /// Returns `NoExamSession` when nothing is open.
    pub fn leave_room(&self) -> Result<ExamOutcome, SessionError> {
        let mut store = self.lock()?;
        let phase = store
            .session()
            .exam()
            .map(ExamSession::phase)
            .ok_or(SessionError::NoExamSession)?;
        if phase == ExamPhase::Active {
            self.submit_locked(&mut store)?;
        }

        store.halt_all();
        store.bump_epoch();
        let exam = store
            .session_mut()
            .detach_exam()
            .ok_or(SessionError::NoExamSession)?;
        let outcome = ExamOutcome::from(&exam);

        info!(exam = %outcome.exam_id, phase = %outcome.phase, "left exam room");
        self.emit(SessionEvent::ExamClosed {
            exam_id: outcome.exam_id,
            final_phase: outcome.phase,
        });
        Ok(outcome)
    }

    //
    // ─── SETTINGS & VIEWS ──────────────────────────────────────────────────────
    //

    /// Flip a proctoring toggle. Takes effect for the next exam start.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the store is unavailable.
    pub fn toggle_setting(&self, setting: ProctorSetting) -> Result<bool, SessionError> {
        let mut store = self.lock()?;
        let enabled = store.toggle_setting(setting);
        debug!(%setting, enabled, "setting toggled");
        self.emit(SessionEvent::SettingToggled { setting, enabled });
        Ok(enabled)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the store is unavailable.
    pub fn settings(&self) -> Result<ProctorSettings, SessionError> {
        Ok(self.lock()?.settings())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the store is unavailable.
    pub fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let store = self.lock()?;
        let now = tokio::time::Instant::now().into_std();
        let live_incidents = store
            .session()
            .exam()
            .map(|exam| exam.live_incidents(now))
            .unwrap_or_default();
        Ok(SessionSnapshot {
            session: store.session().clone(),
            settings: store.settings(),
            live_incidents,
        })
    }

    /// Whether the countdown or the incident generator is still running.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the store is unavailable.
    pub fn background_active(&self) -> Result<bool, SessionError> {
        let store = self.lock()?;
        Ok(store.timer_running() || store.incidents_running())
    }
}

fn outside_lobby(from: ExamPhase, action: LobbyAction) -> SessionError {
    TransitionError::OutsideLobby { from, action }.into()
}

/// Callbacks handed to the countdown and the incident generator.
///
/// They hold the store weakly and carry the epoch current at `start_active`;
/// once the epoch moves on they do nothing.
#[derive(Clone)]
struct Hooks {
    store: Weak<Mutex<SessionStore>>,
    events: broadcast::Sender<SessionEvent>,
    clock: Clock,
    incident_log: Arc<dyn IncidentLog>,
    epoch: u64,
}

impl Hooks {
    fn with_current<R>(&self, f: impl FnOnce(&mut SessionStore) -> Option<R>) -> Option<R> {
        let store = self.store.upgrade()?;
        let mut store = store.lock().ok()?;
        if store.epoch() != self.epoch {
            debug!(epoch = self.epoch, current = store.epoch(), "stale callback ignored");
            return None;
        }
        f(&mut store)
    }

    fn on_tick(&self, remaining: u64) {
        self.with_current(|store| {
            let exam = store.session_mut().exam_mut().ok()?;
            if exam.record_tick(remaining) {
                debug!(remaining_seconds = remaining, "tick");
                let _ = self.events.send(SessionEvent::Tick {
                    remaining_seconds: exam.remaining_seconds(),
                });
            }
            Some(())
        });
    }

    fn on_expire(&self) {
        self.with_current(|store| {
            store.halt_background();
            let change = store
                .session_mut()
                .exam_mut()
                .ok()?
                .apply(ExamEvent::TimerExpired, self.clock.now())
                .ok()?;
            store.bump_epoch();
            let attempt_id = store.session().exam()?.attempt_id();
            info!(attempt = %attempt_id, "exam time expired");
            let _ = self.events.send(SessionEvent::PhaseChanged {
                attempt_id,
                from: change.from,
                to: change.to,
            });
            Some(())
        });
    }

    fn on_incident(&self, signal: IncidentSignal) {
        match signal {
            IncidentSignal::Raised(incident) => {
                if let Some(record) = self.with_current(|store| self.raise(store, incident)) {
                    let log = Arc::clone(&self.incident_log);
                    tokio::spawn(async move {
                        if let Err(err) = log.append(record).await {
                            warn!(error = %err, "incident log rejected record");
                        }
                    });
                }
            }
            IncidentSignal::Expired(id) => {
                self.with_current(|store| self.expire(store, id));
            }
        }
    }

    fn raise(&self, store: &mut SessionStore, incident: Incident) -> Option<NewIncidentRecord> {
        let identity = store.session().identity()?.clone();
        let exam = store.session_mut().exam_mut().ok()?;
        if !exam.raise_incident(incident.clone()) {
            return None;
        }
        let record = NewIncidentRecord {
            exam_id: exam.exam_id(),
            exam_title: exam.title().to_owned(),
            user_id: identity.user_id(),
            candidate: identity.display_name().to_owned(),
            category: incident.category(),
            message: incident.message().to_owned(),
            severity: incident.category().severity(),
            raised_at: incident.raised_at(),
        };
        info!(id = %incident.id(), category = ?incident.category(), "incident raised");
        let _ = self.events.send(SessionEvent::IncidentRaised(incident));
        Some(record)
    }

    fn expire(&self, store: &mut SessionStore, id: IncidentId) -> Option<()> {
        let exam = store.session_mut().exam_mut().ok()?;
        if exam.expire_incident(id) {
            debug!(%id, "incident expired");
            let _ = self.events.send(SessionEvent::IncidentExpired { id });
        }
        Some(())
    }
}
