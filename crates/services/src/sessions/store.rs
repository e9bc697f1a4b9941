use tokio::task::AbortHandle;

use proctor_core::model::{Identity, ProctorSetting, ProctorSettings, Session};

use crate::incidents::{IncidentDice, IncidentGenerator, IncidentSignal};
use crate::timer::CountdownTimer;

/// Process-wide session state plus the background processes it owns.
///
/// Readers are public; every mutator is crate-private so that changes only
/// happen through `SessionMachine`.
#[derive(Debug)]
pub struct SessionStore {
    session: Session,
    settings: ProctorSettings,
    initial_settings: ProctorSettings,
    /// Invalidated at every phase exit; background callbacks carry the value
    /// they were started with and become no-ops once it moves on.
    epoch: u64,
    readiness_generation: u64,
    readiness_runs: Vec<AbortHandle>,
    timer: CountdownTimer,
    incidents: IncidentGenerator,
}

impl SessionStore {
    #[must_use]
    pub fn new(settings: ProctorSettings, incidents: IncidentGenerator) -> Self {
        Self {
            session: Session::anonymous(),
            settings,
            initial_settings: settings,
            epoch: 0,
            readiness_generation: 0,
            readiness_runs: Vec::new(),
            timer: CountdownTimer::new(),
            incidents,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn settings(&self) -> ProctorSettings {
        self.settings
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn readiness_generation(&self) -> u64 {
        self.readiness_generation
    }

    #[must_use]
    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    #[must_use]
    pub fn incidents_running(&self) -> bool {
        self.incidents.is_running()
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub(crate) fn sign_in(&mut self, identity: Identity) {
        self.session = Session::authenticated(identity);
    }

    /// Back to an anonymous session with the initial settings.
    pub(crate) fn reset(&mut self) {
        self.halt_all();
        self.session = Session::anonymous();
        self.settings = self.initial_settings;
    }

    pub(crate) fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn next_readiness_generation(&mut self) -> u64 {
        self.readiness_generation += 1;
        self.readiness_generation
    }

    pub(crate) fn track_readiness(&mut self, run: AbortHandle) {
        self.readiness_runs.retain(|run| !run.is_finished());
        self.readiness_runs.push(run);
    }

    pub(crate) fn cancel_readiness(&mut self) {
        for run in self.readiness_runs.drain(..) {
            run.abort();
        }
    }

    /// Start the countdown and the incident generator together.
    pub(crate) fn start_background<T, E, S>(
        &mut self,
        duration_seconds: u64,
        on_tick: T,
        on_expire: E,
        dice: Box<dyn IncidentDice>,
        sink: S,
    ) where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
        S: FnMut(IncidentSignal) + Send + 'static,
    {
        self.timer.start(duration_seconds, on_tick, on_expire);
        self.incidents.start(true, &self.settings, dice, sink);
    }

    /// Stop the countdown and the incident generator.
    pub(crate) fn halt_background(&mut self) {
        self.timer.stop();
        self.incidents.stop();
    }

    pub(crate) fn halt_all(&mut self) {
        self.halt_background();
        self.cancel_readiness();
    }

    pub(crate) fn toggle_setting(&mut self, setting: ProctorSetting) -> bool {
        self.settings.toggle(setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IncidentConfig;
    use proctor_core::model::{Role, UserId};
    use proctor_core::time::{fixed_clock, fixed_now};

    fn store() -> SessionStore {
        SessionStore::new(
            ProctorSettings::default(),
            IncidentGenerator::new(IncidentConfig::default(), fixed_clock()),
        )
    }

    #[test]
    fn reset_restores_initial_settings_and_drops_identity() {
        let mut store = store();
        store.sign_in(Identity::new(
            UserId::generate(),
            "sam",
            "sam@school.edu",
            Role::Student,
            fixed_now(),
        ));
        store.toggle_setting(ProctorSetting::Recording);
        assert!(!store.settings().recording);

        store.reset();
        assert!(!store.session().is_authenticated());
        assert_eq!(store.settings(), ProctorSettings::default());
    }

    #[test]
    fn epoch_and_generation_only_move_forward() {
        let mut store = store();
        assert_eq!(store.bump_epoch(), 1);
        assert_eq!(store.bump_epoch(), 2);
        assert_eq!(store.next_readiness_generation(), 1);
        assert_eq!(store.readiness_generation(), 1);
    }
}
