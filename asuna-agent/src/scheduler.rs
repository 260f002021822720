//! # Autonomous Scheduler
//!
//! One parametrised state machine for every unprompted behavior. Each
//! registered behavior has its own interval and "last fired" time; a poll
//! fires it when the interval has elapsed, runs its stage-specific action
//! generator, and hands the result to the [`CallbackRegistry`].
//!
//! Two ways to drive it:
//!
//! - [`Scheduler::tick`]: a deterministic poll of every behavior at a
//!   given instant, for tests and embedders with their own loop.
//! - [`Scheduler::spawn`]: one tokio task per behavior, polling every
//!   `tick` and stopped through the returned [`SchedulerHandle`].
//!
//! Poll state lives behind `parking_lot` locks that are never held across
//! an `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use asuna_core::CharacterState;
use asuna_core::clock::{Clock, EnvironmentSensor};
use asuna_core::config::AutonomousConfig;
use asuna_core::persona;
use asuna_core::types::Stage;

use crate::events::{AutonomousEvent, BehaviorCategory, CallbackRegistry, EventPayload};
use crate::phrases;
use crate::session::{SharedState, SharedStore, persist_transition, persist_unlocks, recovery_event};

// ---------------------------------------------------------------------------
// Action generators
// ---------------------------------------------------------------------------

/// What an action generator may read and touch while firing.
pub struct ActionContext<'a> {
    /// Stage at fire time.
    pub stage: Stage,
    /// Fire time.
    pub now: DateTime<Utc>,
    /// The character; locked for the duration of the call.
    pub character: &'a mut CharacterState,
    /// Environment probe.
    pub sensor: &'a dyn EnvironmentSensor,
    /// Scheduler randomness.
    pub rng: &'a mut dyn RngCore,
}

/// Produces the payload for one behavior category.
pub trait ActionGenerator: Send + Sync {
    /// Category this generator serves.
    fn category(&self) -> BehaviorCategory;

    /// Run once. `None` means "nothing to report this time"; the slot is
    /// still consumed.
    fn generate(&self, ctx: &mut ActionContext<'_>) -> Option<EventPayload>;
}

/// Looks around the virtual space: a security sweep while anxious,
/// friendly exploration once relaxed, optimisation when trusting and
/// caretaking when dependent.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentInvestigation;

impl EnvironmentInvestigation {
    fn security_check(rng: &mut dyn RngCore) -> EventPayload {
        let items_checked = rng.gen_range(50..=200);
        let flagged = rng.gen_range(0..=10);
        let report = if flagged > 0 {
            format!("Detected {flagged} unknown targets. We should confirm they're safe first.")
        } else {
            "Security sweep complete. No danger markers found.".to_string()
        };
        EventPayload::EnvironmentReport {
            report,
            items_checked,
            flagged,
        }
    }

    fn friendly_exploration(rng: &mut dyn RngCore) -> EventPayload {
        let items_checked = rng.gen_range(100..=300);
        let interesting = rng.gen_range(5..=20);
        EventPayload::EnvironmentReport {
            report: format!(
                "I found {interesting} interesting things while exploring. Want to look at them with me?"
            ),
            items_checked,
            flagged: 0,
        }
    }

    fn active_optimisation(rng: &mut dyn RngCore) -> EventPayload {
        let items_checked = rng.gen_range(200..=500);
        let improvements = rng.gen_range(3..=8);
        EventPayload::EnvironmentReport {
            report: format!(
                "I made {improvements} improvements to the virtual space. It should be easier to use now!"
            ),
            items_checked,
            flagged: 0,
        }
    }

    fn caring_management(rng: &mut dyn RngCore) -> EventPayload {
        let items_checked = rng.gen_range(300..=600);
        let tasks = rng.gen_range(5..=10);
        EventPayload::EnvironmentReport {
            report: format!("I looked after the virtual space for you: {tasks} chores done, everything's ready."),
            items_checked,
            flagged: 0,
        }
    }
}

impl ActionGenerator for EnvironmentInvestigation {
    fn category(&self) -> BehaviorCategory {
        BehaviorCategory::EnvironmentCheck
    }

    fn generate(&self, ctx: &mut ActionContext<'_>) -> Option<EventPayload> {
        let cluttered = ctx.sensor.desktop_cluttered();
        ctx.character
            .emotion_mut()
            .set_environment_factor("desktop", if cluttered { "cluttered" } else { "tidy" });

        Some(match ctx.stage {
            Stage::Anxious => Self::security_check(ctx.rng),
            Stage::Relaxed => Self::friendly_exploration(ctx.rng),
            Stage::Trusting => Self::active_optimisation(ctx.rng),
            Stage::Dependent => Self::caring_management(ctx.rng),
        })
    }
}

/// Feeds stage-flavoured probe phrases to the ledger; reports only when
/// something unlocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemorySweep;

impl MemorySweep {
    fn basic_topics() -> &'static [&'static str] {
        &["environment survey complete", "who am I", "the flash of a sword"]
    }

    fn daily_topics() -> &'static [&'static str] {
        &["time to cook", "let's take a break", "tidying the cottage", "the boss raid"]
    }

    fn emotional_topics() -> &'static [&'static str] {
        &["dinner in the real world", "after school", "a meal together"]
    }

    fn deep_topics() -> &'static [&'static str] {
        &["remember when", "our future", "a shared dream", "a special memory"]
    }

    pub(crate) fn announce(stage: Stage, content: &str) -> String {
        match stage {
            Stage::Anxious => format!("Something came back to me... {content}"),
            Stage::Relaxed => format!("Oh! I just remembered something: {content}"),
            Stage::Trusting => format!("I want you to know this. I remembered: {content}"),
            Stage::Dependent => format!("Another piece of us came back: {content}"),
        }
    }
}

impl ActionGenerator for MemorySweep {
    fn category(&self) -> BehaviorCategory {
        BehaviorCategory::MemoryRecovery
    }

    fn generate(&self, ctx: &mut ActionContext<'_>) -> Option<EventPayload> {
        let topics = match ctx.stage {
            Stage::Anxious => Self::basic_topics(),
            Stage::Relaxed => Self::daily_topics(),
            Stage::Trusting => Self::emotional_topics(),
            Stage::Dependent => Self::deep_topics(),
        };
        let topic = topics.choose(ctx.rng)?;
        let unlocked = ctx.character.probe(topic, ctx.now, ctx.sensor);
        let first = unlocked.first()?;
        Some(EventPayload::MemoryRecovered {
            message: Self::announce(ctx.stage, first.content()),
            fragments: unlocked.iter().map(|f| f.id().clone()).collect(),
        })
    }
}

/// Starts a conversation, gated by the stage's proactive probability.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProactiveChat;

impl ActionGenerator for ProactiveChat {
    fn category(&self) -> BehaviorCategory {
        BehaviorCategory::ProactiveChat
    }

    fn generate(&self, ctx: &mut ActionContext<'_>) -> Option<EventPayload> {
        let probability = persona::profile(ctx.stage).proactive_probability;
        if !ctx.rng.gen_bool(probability) {
            debug!(stage = %ctx.stage, probability, "Proactive chat skipped");
            return None;
        }
        let text = phrases::proactive_lines(ctx.stage).choose(ctx.rng)?;
        Some(EventPayload::ProactiveMessage {
            text: (*text).to_string(),
        })
    }
}

/// Simulated file housekeeping with a stage-flavoured summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct Housekeeping;

impl ActionGenerator for Housekeeping {
    fn category(&self) -> BehaviorCategory {
        BehaviorCategory::FileOrganization
    }

    fn generate(&self, ctx: &mut ActionContext<'_>) -> Option<EventPayload> {
        let (items, summary) = match ctx.stage {
            Stage::Anxious => {
                let threats: u32 = ctx.rng.gen_range(0..=3);
                (
                    ctx.rng.gen_range(50..=100),
                    format!("Safety check finished. {threats} items need confirming before I trust them."),
                )
            }
            Stage::Relaxed => (
                ctx.rng.gen_range(100..=200),
                "Sorted the map data, just like arranging loot back in Aincrad!".to_string(),
            ),
            Stage::Trusting => (
                ctx.rng.gen_range(200..=400),
                "Optimised the storage. Everything should be quicker to find now!".to_string(),
            ),
            Stage::Dependent => (
                ctx.rng.gen_range(300..=500),
                "Arranged everything the way you like it. It's all taken care of.".to_string(),
            ),
        };
        Some(EventPayload::Housekeeping { summary, items })
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Behavior {
    generator: Box<dyn ActionGenerator>,
    interval: chrono::Duration,
    last_fired: Mutex<DateTime<Utc>>,
    fire_count: AtomicU64,
}

/// Snapshot of one behavior's timer.
#[derive(Debug, Clone, Serialize)]
pub struct BehaviorStatus {
    /// Which behavior.
    pub category: BehaviorCategory,
    /// Configured interval in seconds.
    pub interval_secs: i64,
    /// When it last fired (or when the scheduler started).
    pub last_fired: DateTime<Utc>,
    /// Events actually emitted.
    pub fire_count: u64,
}

/// Snapshot of the whole scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether background tasks are running.
    pub running: bool,
    /// Stage the character is in.
    pub stage: Stage,
    /// Per-behavior timers.
    pub behaviors: Vec<BehaviorStatus>,
}

/// The autonomous behavior state machine.
pub struct Scheduler {
    state: SharedState,
    sensor: Arc<dyn EnvironmentSensor>,
    registry: Arc<CallbackRegistry>,
    store: Option<SharedStore>,
    behaviors: Vec<Behavior>,
    rng: Mutex<StdRng>,
    start: DateTime<Utc>,
    running: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let categories: Vec<_> = self.behaviors.iter().map(|b| b.generator.category()).collect();
        f.debug_struct("Scheduler")
            .field("behaviors", &categories)
            .field("start", &self.start)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Empty scheduler; every behavior added later counts `start` as its
    /// last fire.
    #[must_use]
    pub fn new(
        state: SharedState,
        sensor: Arc<dyn EnvironmentSensor>,
        registry: Arc<CallbackRegistry>,
        start: DateTime<Utc>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            state,
            sensor,
            registry,
            store: None,
            behaviors: Vec::new(),
            rng: Mutex::new(seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)),
            start,
            running: AtomicBool::new(false),
        }
    }

    /// Scheduler with the four built-in behaviors at the configured intervals.
    #[must_use]
    pub fn standard(
        state: SharedState,
        sensor: Arc<dyn EnvironmentSensor>,
        registry: Arc<CallbackRegistry>,
        config: &AutonomousConfig,
        start: DateTime<Utc>,
    ) -> Self {
        Self::new(state, sensor, registry, start, config.seed)
            .with_behavior(EnvironmentInvestigation, secs(config.environment_check_secs))
            .with_behavior(MemorySweep, secs(config.memory_trigger_secs))
            .with_behavior(ProactiveChat, secs(config.proactive_chat_secs))
            .with_behavior(Housekeeping, secs(config.file_organization_secs))
    }

    /// Add a behavior firing every `interval`.
    #[must_use]
    pub fn with_behavior(mut self, generator: impl ActionGenerator + 'static, interval: Duration) -> Self {
        let interval = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
        self.behaviors.push(Behavior {
            generator: Box::new(generator),
            interval,
            last_fired: Mutex::new(self.start),
            fire_count: AtomicU64::new(0),
        });
        self
    }

    /// Persist unlocks and transitions caused by background behaviors.
    #[must_use]
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Poll every behavior at `now`; returns the events emitted.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<AutonomousEvent> {
        (0..self.behaviors.len())
            .filter_map(|idx| self.poll(idx, now))
            .collect()
    }

    /// Poll one behavior. Fires when its interval has elapsed since the
    /// last fire; the slot is consumed even when the generator reports
    /// nothing.
    fn poll(&self, idx: usize, now: DateTime<Utc>) -> Option<AutonomousEvent> {
        let behavior = self.behaviors.get(idx)?;
        {
            let mut last = behavior.last_fired.lock();
            if now - *last < behavior.interval {
                return None;
            }
            *last = now;
        }

        let category = behavior.generator.category();
        let (stage, payload, recovered) = {
            let mut state = self.state.lock();
            let audit_before = state.ledger().audit().len();
            let refresh = state.refresh(now);
            if let Some(transition) = &refresh.transition {
                persist_transition(self.store.as_ref(), transition);
            }
            let recovered = state.ledger().audit()[audit_before..].to_vec();
            persist_unlocks(self.store.as_ref(), &recovered);
            let audit_before = state.ledger().audit().len();

            let mut rng = self.rng.lock();
            let mut ctx = ActionContext {
                stage: refresh.stage,
                now,
                character: &mut state,
                sensor: self.sensor.as_ref(),
                rng: &mut *rng,
            };
            let payload = behavior.generator.generate(&mut ctx);

            let fresh = &state.ledger().audit()[audit_before..];
            persist_unlocks(self.store.as_ref(), fresh);
            (refresh.stage, payload, recovered)
        };

        // Unlocks from the stage change itself, not from the behavior.
        if let Some(event) = recovery_event(stage, &recovered, now) {
            self.registry.dispatch(&event);
        }

        let Some(payload) = payload else {
            debug!(category = %category, stage = %stage, "Behavior fired with nothing to report");
            return None;
        };
        behavior.fire_count.fetch_add(1, Ordering::Relaxed);

        let event = AutonomousEvent {
            category,
            stage,
            payload,
            at: now,
        };
        let report = self.registry.dispatch(&event);
        info!(
            category = %category,
            stage = %stage,
            delivered = report.delivered,
            failed = report.failed,
            message = event.payload.message(),
            "Autonomous behavior fired"
        );
        Some(event)
    }

    /// Timer snapshot.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        let stage = self.state.lock().stage();
        SchedulerStatus {
            running: self.running.load(Ordering::Acquire),
            stage,
            behaviors: self
                .behaviors
                .iter()
                .map(|b| BehaviorStatus {
                    category: b.generator.category(),
                    interval_secs: b.interval.num_seconds(),
                    last_fired: *b.last_fired.lock(),
                    fire_count: b.fire_count.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }

    /// Whether background tasks are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one tokio task per behavior, polling every `tick` against `clock`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, clock: Arc<dyn Clock>, tick: Duration) -> SchedulerHandle {
        self.running.store(true, Ordering::Release);
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let tick = tick.max(Duration::from_millis(1));

        let tasks = (0..self.behaviors.len())
            .map(|idx| {
                let scheduler = Arc::clone(self);
                let clock = Arc::clone(&clock);
                let stop = Arc::clone(&stop);
                let wake = Arc::clone(&wake);
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(tick);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {}
                            () = wake.notified() => {}
                        }
                        if stop.load(Ordering::Acquire) {
                            break;
                        }
                        scheduler.poll(idx, clock.now());
                    }
                })
            })
            .collect();

        info!(
            behaviors = self.behaviors.len(),
            tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX),
            "Autonomous scheduler started"
        );
        SchedulerHandle {
            scheduler: Arc::clone(self),
            stop,
            wake,
            tasks,
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Owner of the background tasks started by [`Scheduler::spawn`].
///
/// Dropping the handle signals the tasks to stop without waiting for them.
pub struct SchedulerHandle {
    scheduler: Arc<Scheduler>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("tasks", &self.tasks.len())
            .field("stopped", &self.stop.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    /// The scheduler being driven.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Stop every behavior loop and wait for the tasks to finish.
    pub async fn stop(mut self) {
        self.signal();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Autonomous scheduler stopped");
    }

    fn signal(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_waiters();
        self.scheduler.running.store(false, Ordering::Release);
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use asuna_core::clock::{FixedSensor, NoSensor};
    use asuna_core::persistence::{MemoryStore, PersistenceEngine};
    use asuna_core::types::InteractionCounters;

    use crate::events::{FnSink, SinkError};

    fn shared(start: DateTime<Utc>) -> SharedState {
        Arc::new(Mutex::new(CharacterState::new(start, 100)))
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn fires_once_interval_has_elapsed() {
        let start = Utc::now();
        let registry = Arc::new(CallbackRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        registry.register(
            BehaviorCategory::EnvironmentCheck,
            Arc::new(FnSink::new(move |_: &AutonomousEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), SinkError>(())
            })),
        );
        let scheduler = Scheduler::new(shared(start), Arc::new(NoSensor), registry, start, Some(1))
            .with_behavior(EnvironmentInvestigation, Duration::from_secs(60));

        for t in (10..60).step_by(10) {
            assert!(scheduler.tick(start + chrono::Duration::seconds(t)).is_empty(), "fired at {t}s");
        }
        assert_eq!(scheduler.tick(start + chrono::Duration::seconds(60)).len(), 1);
        assert!(scheduler.tick(start + chrono::Duration::seconds(70)).is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let status = scheduler.status();
        assert_eq!(status.behaviors[0].fire_count, 1);
        assert_eq!(status.behaviors[0].interval_secs, 60);
        assert!(!status.running);
    }

    #[test]
    fn behaviors_keep_independent_timers() {
        let start = Utc::now();
        let scheduler = Scheduler::new(
            shared(start),
            Arc::new(NoSensor),
            Arc::new(CallbackRegistry::new()),
            start,
            Some(9),
        )
        .with_behavior(EnvironmentInvestigation, Duration::from_secs(30))
        .with_behavior(Housekeeping, Duration::from_secs(300));

        let mut env = 0;
        let mut house = 0;
        for t in (10..=300).step_by(10) {
            for event in scheduler.tick(start + chrono::Duration::seconds(t)) {
                match event.category {
                    BehaviorCategory::EnvironmentCheck => env += 1,
                    BehaviorCategory::FileOrganization => house += 1,
                    other => panic!("unexpected {other}"),
                }
            }
        }
        assert_eq!(env, 10);
        assert_eq!(house, 1);
    }

    #[test]
    fn background_transition_stores_and_announces_new_stage_unlocks() {
        let start = Utc::now();
        let state = shared(start);
        for _ in 0..3 {
            state.lock().observe("let's do it together", start, &NoSensor);
        }
        let engine = PersistenceEngine::open_in_memory().expect("in-memory db");
        let store: SharedStore = Arc::new(Mutex::new(Box::new(engine) as Box<dyn MemoryStore>));
        let registry = Arc::new(CallbackRegistry::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        registry.register(
            BehaviorCategory::MemoryRecovery,
            Arc::new(FnSink::new(move |e: &AutonomousEvent| {
                sink.lock().push(e.clone());
                Ok::<(), SinkError>(())
            })),
        );
        let scheduler = Scheduler::new(Arc::clone(&state), Arc::new(NoSensor), registry, start, Some(3))
            .with_behavior(EnvironmentInvestigation, Duration::from_secs(60))
            .with_store(Arc::clone(&store));

        scheduler.tick(start + chrono::Duration::days(8));
        assert_eq!(state.lock().stage(), Stage::Dependent);

        let log = store.lock().unlock_log(50).expect("log");
        assert!(log.iter().any(|r| r.fragment_id.as_str() == "complete_bond"));
        let events = events.lock();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::MemoryRecovered { fragments, .. } => {
                assert!(fragments.iter().any(|id| id.as_str() == "complete_bond"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn proactive_chat_probability_tracks_stage() {
        let start = Utc::now();
        let mut character = CharacterState::new(start, 10);
        let mut rng = rng();
        let mut fired = 0;
        for _ in 0..1000 {
            let mut ctx = ActionContext {
                stage: Stage::Dependent,
                now: start,
                character: &mut character,
                sensor: &NoSensor,
                rng: &mut rng,
            };
            if ProactiveChat.generate(&mut ctx).is_some() {
                fired += 1;
            }
        }
        assert!((500..=700).contains(&fired), "fired {fired} times");
    }

    #[test]
    fn memory_sweep_reports_only_unlocks() {
        let start = Utc::now();
        let mut character = CharacterState::new(start, 10);
        let mut rng = rng();
        let mut ctx = ActionContext {
            stage: Stage::Anxious,
            now: start,
            character: &mut character,
            sensor: &FixedSensor(false),
            rng: &mut rng,
        };
        // basic_identity has an always-true trigger.
        let first = MemorySweep.generate(&mut ctx);
        assert!(matches!(first, Some(EventPayload::MemoryRecovered { .. })));

        // Nothing left that a probe phrase can unlock without counters.
        let mut later = Vec::new();
        for _ in 0..10 {
            let mut ctx = ActionContext {
                stage: Stage::Anxious,
                now: start,
                character: &mut character,
                sensor: &FixedSensor(false),
                rng: &mut rng,
            };
            later.push(MemorySweep.generate(&mut ctx));
        }
        let unlocked_ids: Vec<_> = later
            .into_iter()
            .flatten()
            .flat_map(|p| match p {
                EventPayload::MemoryRecovered { fragments, .. } => fragments,
                _ => Vec::new(),
            })
            .collect();
        assert!(!unlocked_ids.iter().any(|id| id.as_str() == "basic_identity"));
        assert_eq!(character.counters(), InteractionCounters::default());
    }

    #[test]
    fn environment_check_records_clutter() {
        let start = Utc::now();
        let mut character = CharacterState::new(start, 10);
        let mut rng = rng();
        let mut ctx = ActionContext {
            stage: Stage::Relaxed,
            now: start,
            character: &mut character,
            sensor: &FixedSensor(true),
            rng: &mut rng,
        };
        let payload = EnvironmentInvestigation.generate(&mut ctx).expect("always reports");
        assert!(matches!(payload, EventPayload::EnvironmentReport { flagged: 0, .. }));

        let ctx = character.emotion_mut().update("hi", Stage::Relaxed, &InteractionCounters::default(), start);
        assert_eq!(ctx.environment.get("desktop").map(String::as_str), Some("cluttered"));
    }
}
