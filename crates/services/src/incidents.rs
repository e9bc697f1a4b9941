//! Simulated proctoring alerts raised at random intervals while an exam is active.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use proctor_core::model::{Incident, IncidentCategory, IncidentId, ProctorSettings};

use crate::Clock;
use crate::config::IncidentConfig;

const MIN_EVALUATION_GAP: Duration = Duration::from_millis(1);

/// Source of randomness for the generator.
pub trait IncidentDice: Send {
    /// Delay before the next evaluation, within `[min, max]`.
    fn next_delay(&mut self, min: Duration, max: Duration) -> Duration;

    /// Uniform draw in `[0, 1)`.
    fn roll(&mut self) -> f64;

    /// Uniform index in `[0, len)`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Builds fresh dice for each generator start.
pub type DiceFactory = Arc<dyn Fn() -> Box<dyn IncidentDice> + Send + Sync>;

/// `RandomDice` seeded from `seed`, or from OS entropy when `None`.
#[must_use]
pub fn random_dice_factory(seed: Option<u64>) -> DiceFactory {
    Arc::new(move || -> Box<dyn IncidentDice> {
        match seed {
            Some(seed) => Box::new(RandomDice::seeded(seed)),
            None => Box::new(RandomDice::from_entropy()),
        }
    })
}

#[derive(Debug, Clone)]
pub struct RandomDice {
    rng: StdRng,
}

impl RandomDice {
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl IncidentDice for RandomDice {
    fn next_delay(&mut self, min: Duration, max: Duration) -> Duration {
        if min >= max {
            return min;
        }
        let lo = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let hi = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.rng.random_range(lo..=hi))
    }

    fn roll(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn pick(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len.max(1))
    }
}

/// Replays queued values; once a queue runs dry it falls back to the
/// longest delay, a roll that never fires, and the first category.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    delays: VecDeque<Duration>,
    rolls: VecDeque<f64>,
    picks: VecDeque<usize>,
}

impl ScriptedDice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delays(mut self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays.extend(delays);
        self
    }

    #[must_use]
    pub fn with_rolls(mut self, rolls: impl IntoIterator<Item = f64>) -> Self {
        self.rolls.extend(rolls);
        self
    }

    #[must_use]
    pub fn with_picks(mut self, picks: impl IntoIterator<Item = usize>) -> Self {
        self.picks.extend(picks);
        self
    }
}

impl IncidentDice for ScriptedDice {
    fn next_delay(&mut self, min: Duration, max: Duration) -> Duration {
        self.delays
            .pop_front()
            .map_or(max, |delay| delay.clamp(min, max.max(min)))
    }

    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().unwrap_or(1.0)
    }

    fn pick(&mut self, len: usize) -> usize {
        self.picks
            .pop_front()
            .unwrap_or(0)
            .min(len.saturating_sub(1))
    }
}

/// What the generator reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentSignal {
    Raised(Incident),
    Expired(IncidentId),
}

/// Background process raising and expiring incidents.
///
/// One task owns both the evaluation schedule and the per-incident expiry
/// queue, so `stop` cancels every pending emission and removal at once.
#[derive(Debug)]
pub struct IncidentGenerator {
    config: IncidentConfig,
    clock: Clock,
    next_id: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl IncidentGenerator {
    #[must_use]
    pub fn new(config: IncidentConfig, clock: Clock) -> Self {
        Self {
            config,
            clock,
            next_id: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Start emitting into `sink`. Returns `false` (and does nothing) unless
    /// `session_active`.
    ///
    /// Categories are filtered by `settings` once, here; later toggles only
    /// affect the next start. Restarting cancels the previous run.
    pub fn start<S>(
        &mut self,
        session_active: bool,
        settings: &ProctorSettings,
        mut dice: Box<dyn IncidentDice>,
        mut sink: S,
    ) -> bool
    where
        S: FnMut(IncidentSignal) + Send + 'static,
    {
        self.stop();
        if !session_active {
            return false;
        }

        let categories = IncidentCategory::enabled_under(settings);
        let config = self.config.clone();
        let clock = self.clock;
        let next_id = Arc::clone(&self.next_id);

        self.task = Some(tokio::spawn(async move {
            let (min, max, ttl) = (config.min_delay(), config.max_delay(), config.ttl());
            let mut pending: VecDeque<(Instant, IncidentId)> = VecDeque::new();
            let Some(mut next_eval) = Instant::now().checked_add(dice.next_delay(min, max)) else {
                warn!("incident delay out of range, generator idle");
                return;
            };

            loop {
                let expiry = pending.front().map(|(at, _)| *at);
                tokio::select! {
                    biased;
                    () = time::sleep_until(expiry.unwrap_or(next_eval)), if expiry.is_some() => {
                        if let Some((_, id)) = pending.pop_front() {
                            sink(IncidentSignal::Expired(id));
                        }
                    }
                    () = time::sleep_until(next_eval) => {
                        if !categories.is_empty() && dice.roll() < config.probability {
                            let created = Instant::now();
                            let Some(expires) = created.checked_add(ttl) else {
                                warn!(?ttl, "incident ttl out of range, generator stopped");
                                return;
                            };
                            let index = dice.pick(categories.len()).min(categories.len() - 1);
                            let category = categories[index];
                            let id = IncidentId::new(next_id.fetch_add(1, Ordering::SeqCst) + 1);
                            let incident =
                                Incident::new(id, category, created.into_std(), ttl, clock.now());
                            debug!(%id, ?category, "incident raised");
                            pending.push_back((expires, id));
                            sink(IncidentSignal::Raised(incident));
                        }
                        // Never evaluate twice at the same instant.
                        let delay = dice.next_delay(min, max).max(MIN_EVALUATION_GAP);
                        let Some(at) = next_eval.checked_add(delay) else {
                            warn!(?delay, "incident delay out of range, generator stopped");
                            return;
                        };
                        next_eval = at;
                    }
                }
            }
        }));
        true
    }

    /// Cancel scheduling and every pending expiry. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for IncidentGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
