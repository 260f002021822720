//! # Character Session
//!
//! The explicit per-session object. It owns the character state, the
//! response composer, the event-sink registry and, when enabled, the
//! autonomous scheduler; nothing is global, so several sessions can live
//! side by side.
//!
//! ## Foreground turn
//!
//! ```text
//! text ─► observe (count, stage, ledger, emotion) ─► persist ─► compose ─► outcome
//! ```
//!
//! The state lock is released before composing, so a slow generator never
//! blocks the background behaviors.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use asuna_core::CharacterState;
use asuna_core::clock::{Clock, EnvironmentSensor, NoSensor, SystemClock};
use asuna_core::config::AsunaConfig;
use asuna_core::emotion::{EmotionSummary, EmotionalContext};
use asuna_core::error::Result;
use asuna_core::ledger::{LedgerSummary, MemoryFragment, RecoveredFragment, UnlockRecord};
use asuna_core::persistence::{MemoryStore, PersistenceEngine, UserProfile};
use asuna_core::stage::StageTransition;
use asuna_core::types::{Emotion, FragmentId, InteractionCounters, Stage};
use asuna_llm::{LlmClient, LlmProvider, TextGenerator};

use crate::composer::{AiMode, ComposeContext, ComposerMode, ComposerSettings, ResponseComposer, ResponseSource};
use crate::events::{AutonomousEvent, BehaviorCategory, CallbackRegistry, EventPayload, EventSink};
use crate::scheduler::{MemorySweep, Scheduler, SchedulerHandle};

/// Character state shared between the foreground path and the scheduler.
pub type SharedState = Arc<Mutex<CharacterState>>;

/// Durable store shared between the foreground path and the scheduler.
pub type SharedStore = Arc<Mutex<Box<dyn MemoryStore>>>;

// ---------------------------------------------------------------------------
// Store helpers (failures are logged, never surfaced)
// ---------------------------------------------------------------------------

pub(crate) fn persist_transition(store: Option<&SharedStore>, transition: &StageTransition) {
    if let Some(store) = store {
        if let Err(e) = store.lock().append_transition(transition) {
            warn!(error = %e, from = %transition.from, to = %transition.to, "Failed to store stage transition");
        }
    }
}

pub(crate) fn persist_unlocks(store: Option<&SharedStore>, records: &[UnlockRecord]) {
    let Some(store) = store else { return };
    if records.is_empty() {
        return;
    }
    let store = store.lock();
    for record in records {
        if let Err(e) = store.append_unlock(record) {
            warn!(error = %e, fragment = %record.fragment_id, "Failed to store fragment unlock");
        }
    }
}

/// A memory-recovery event for unlocks that happened outside a sweep.
pub(crate) fn recovery_event(
    stage: Stage,
    records: &[UnlockRecord],
    now: DateTime<Utc>,
) -> Option<AutonomousEvent> {
    let first = records.first()?;
    Some(AutonomousEvent {
        category: BehaviorCategory::MemoryRecovery,
        stage,
        payload: EventPayload::MemoryRecovered {
            fragments: records.iter().map(|r| r.fragment_id.clone()).collect(),
            message: MemorySweep::announce(stage, &first.content),
        },
        at: now,
    })
}

fn persist_profile(store: Option<&SharedStore>, profile: &UserProfile) {
    if let Some(store) = store {
        if let Err(e) = store.lock().save_profile(profile) {
            warn!(error = %e, user = %profile.user_id, "Failed to store user profile");
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Everything one user turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionOutcome {
    /// Stage after the turn.
    pub stage: Stage,
    /// Set when this turn moved the stage forward.
    pub transition: Option<StageTransition>,
    /// The reply.
    pub reply: String,
    /// Where the reply came from.
    pub source: ResponseSource,
    /// Emotion resolved for the turn.
    pub emotion: EmotionalContext,
    /// Fragments unlocked by the turn.
    #[serde(skip)]
    pub unlocked: Vec<MemoryFragment>,
    /// Counters after the turn.
    pub counters: InteractionCounters,
}

/// Queryable session state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// User the session belongs to.
    pub user_id: String,
    /// Current stage.
    pub stage: Stage,
    /// Seconds since the relationship started.
    pub elapsed_secs: i64,
    /// Interaction counters.
    pub counters: InteractionCounters,
    /// Backend state as of the last reply.
    pub ai_mode: AiMode,
    /// Composer configuration.
    pub composer_mode: ComposerMode,
    /// Ledger progress.
    pub memory: LedgerSummary,
    /// Most recent emotion, if any turn has happened.
    pub current_emotion: Option<Emotion>,
    /// Whether background behaviors are running.
    pub autonomous_running: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`CharacterSession`] from configuration and collaborators.
pub struct SessionBuilder {
    config: AsunaConfig,
    generator: Option<Arc<dyn TextGenerator>>,
    store: Option<Box<dyn MemoryStore>>,
    clock: Option<Arc<dyn Clock>>,
    sensor: Option<Arc<dyn EnvironmentSensor>>,
    seed: Option<u64>,
}

impl SessionBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: AsunaConfig) -> Self {
        Self {
            config,
            generator: None,
            store: None,
            clock: None,
            sensor: None,
            seed: None,
        }
    }

    /// Use this generator instead of building one from `[llm]`.
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use this store instead of opening `[persistence].path`.
    #[must_use]
    pub fn store(mut self, store: Box<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source (defaults to the system clock).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Environment probe (defaults to [`NoSensor`]).
    #[must_use]
    pub fn sensor(mut self, sensor: Arc<dyn EnvironmentSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Seed every random choice the session makes.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the session, restoring counters and unlocks from the store.
    ///
    /// # Errors
    /// Opening the configured database or reading the stored profile.
    pub fn build(self) -> Result<CharacterSession> {
        let Self {
            mut config,
            generator,
            store,
            clock,
            sensor,
            seed,
        } = self;
        if let Some(seed) = seed {
            config.autonomous.seed = Some(seed);
        }
        let seed = config.autonomous.seed;

        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sensor = sensor.unwrap_or_else(|| Arc::new(NoSensor));
        let now = clock.now();

        let store = match store {
            Some(store) => Some(store),
            None if config.persistence.enabled => Some(Box::new(PersistenceEngine::open(
                Path::new(&config.persistence.path),
                &config.persistence,
            )?) as Box<dyn MemoryStore>),
            None => None,
        };

        let history_cap = config.emotion.history_cap;
        let user_id = config.persona.user_id.clone();
        let state = match &store {
            Some(store) => match store.load_profile(&user_id)? {
                Some(profile) => {
                    let recovered: Vec<RecoveredFragment> = store.unlocked_fragments()?;
                    info!(
                        user = %user_id,
                        interactions = profile.counters.interaction_count,
                        fragments = recovered.len(),
                        "Restored character from store"
                    );
                    let state = CharacterState::from_profile(&profile, &recovered, history_cap, now);
                    // Fragments that became eligible while the session was away.
                    for record in state.ledger().audit() {
                        if let Err(e) = store.append_unlock(record) {
                            warn!(error = %e, fragment = %record.fragment_id, "Failed to store fragment unlock");
                        }
                    }
                    state
                }
                None => CharacterState::new(now, history_cap),
            },
            None => CharacterState::new(now, history_cap),
        };

        let settings = ComposerSettings::from_config(&config);
        let composer = match generator {
            Some(generator) => ResponseComposer::new(Some(generator), settings, seed),
            None => match generator_from_config(&config) {
                Ok(generator) => ResponseComposer::new(Some(generator), settings, seed),
                Err(reason) => ResponseComposer::template_only(reason, settings, seed),
            },
        };

        let stage = state.stage();
        let session = CharacterSession {
            config,
            state: Arc::new(Mutex::new(state)),
            store: store.map(|s| Arc::new(Mutex::new(s))),
            composer,
            registry: Arc::new(CallbackRegistry::new()),
            clock,
            sensor,
            scheduler: Mutex::new(None),
        };
        info!(
            user = %session.config.persona.user_id,
            stage = %stage,
            mode = ?session.composer.mode(),
            "Character session ready"
        );
        Ok(session)
    }
}

/// HTTP generator from `[llm]`, or the reason generation is off.
fn generator_from_config(config: &AsunaConfig) -> std::result::Result<Arc<dyn TextGenerator>, String> {
    if let Some(problem) = config.llm.credential_problem() {
        return Err(problem);
    }
    let provider = LlmProvider::from_config(
        &config.llm.provider,
        &config.llm.base_url,
        config.llm.api_key.as_deref(),
    )
    .map_err(|e| e.to_string())?;
    Ok(Arc::new(LlmClient::new(
        provider,
        config.llm.model.clone(),
        config.llm.max_retries,
    )))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One companion relationship: state, composer, sinks and scheduler.
pub struct CharacterSession {
    config: AsunaConfig,
    state: SharedState,
    store: Option<SharedStore>,
    composer: ResponseComposer,
    registry: Arc<CallbackRegistry>,
    clock: Arc<dyn Clock>,
    sensor: Arc<dyn EnvironmentSensor>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
}

impl std::fmt::Debug for CharacterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterSession")
            .field("user_id", &self.config.persona.user_id)
            .field("composer", &self.composer)
            .field("registry", &self.registry)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl CharacterSession {
    /// Shorthand for [`SessionBuilder::new`].
    #[must_use]
    pub fn builder(config: AsunaConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Handle one user utterance. Never fails; generation problems show up
    /// as [`ResponseSource::Fallback`].
    pub async fn process_interaction(&self, text: &str) -> InteractionOutcome {
        let now = self.clock.now();

        let (observation, memories, fresh, profile) = {
            let mut state = self.state.lock();
            let audit_before = state.ledger().audit().len();
            let observation = state.observe(text, now, self.sensor.as_ref());
            let fresh: Vec<UnlockRecord> = state.ledger().audit()[audit_before..].to_vec();
            let memories = state.ledger().context_prompt();
            let profile = state.to_profile(&self.config.persona.user_id, now);
            (observation, memories, fresh, profile)
        };

        if let Some(transition) = &observation.transition {
            persist_transition(self.store.as_ref(), transition);
        }
        persist_unlocks(self.store.as_ref(), &fresh);
        persist_profile(self.store.as_ref(), &profile);
        self.announce_recovered(observation.stage, &fresh, now);

        let ctx = ComposeContext {
            stage: observation.stage,
            emotion: &observation.emotion,
            unlocked: &observation.unlocked,
            memories: &memories,
            now,
        };
        let composition = self.composer.compose(text, &ctx).await;

        InteractionOutcome {
            stage: observation.stage,
            transition: observation.transition,
            reply: composition.text,
            source: composition.source,
            emotion: observation.emotion,
            unlocked: observation.unlocked,
            counters: observation.counters,
        }
    }

    /// Attach a user detail to a fragment. Returns `false` (and logs) for
    /// an unknown id.
    pub fn supplement(&self, id: &str, text: &str) -> bool {
        let now = self.clock.now();
        let id = FragmentId::new(id);
        let profile = {
            let mut state = self.state.lock();
            if let Err(e) = state.supplement(&id, text) {
                warn!(fragment = %id, error = %e, "Supplement ignored");
                return false;
            }
            state.to_profile(&self.config.persona.user_id, now)
        };
        persist_profile(self.store.as_ref(), &profile);
        true
    }

    /// Current session state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let now = self.clock.now();
        let (refresh, fresh, elapsed, counters, memory, current_emotion) = {
            let mut state = self.state.lock();
            let audit_before = state.ledger().audit().len();
            let refresh = state.refresh(now);
            let fresh: Vec<UnlockRecord> = state.ledger().audit()[audit_before..].to_vec();
            let stage = refresh.stage;
            (
                refresh,
                fresh,
                state.clock().elapsed(now),
                state.counters(),
                state.ledger().summary(stage),
                state.emotion().current().map(|c| c.current_emotion),
            )
        };
        if let Some(transition) = &refresh.transition {
            persist_transition(self.store.as_ref(), transition);
        }
        persist_unlocks(self.store.as_ref(), &fresh);
        self.announce_recovered(refresh.stage, &fresh, now);
        SessionStatus {
            user_id: self.config.persona.user_id.clone(),
            stage: refresh.stage,
            elapsed_secs: elapsed.num_seconds(),
            counters,
            ai_mode: self.composer.ai_mode(),
            composer_mode: self.composer.mode().clone(),
            memory,
            current_emotion,
            autonomous_running: self.scheduler.lock().as_ref().is_some_and(|s| s.is_running()),
        }
    }

    /// Deliver foreground unlocks to the memory-recovery sinks.
    fn announce_recovered(&self, stage: Stage, records: &[UnlockRecord], now: DateTime<Utc>) {
        let Some(event) = recovery_event(stage, records, now) else {
            return;
        };
        let report = self.registry.dispatch(&event);
        debug!(
            stage = %stage,
            fragments = records.len(),
            delivered = report.delivered,
            failed = report.failed,
            "Recovered memories announced"
        );
    }

    /// Emotion statistics over the recent history.
    #[must_use]
    pub fn emotion_summary(&self) -> EmotionSummary {
        self.state.lock().emotion().summary()
    }

    /// Ledger progress at the current stage.
    #[must_use]
    pub fn memory_summary(&self) -> LedgerSummary {
        let state = self.state.lock();
        state.ledger().summary(state.stage())
    }

    /// Formatted recovered memories, one per line.
    #[must_use]
    pub fn memory_context(&self) -> String {
        self.state.lock().ledger().context_prompt()
    }

    /// Most recent unlocks, newest first; from the store when there is one.
    #[must_use]
    pub fn unlock_history(&self, limit: usize) -> Vec<UnlockRecord> {
        if let Some(store) = &self.store {
            match store.lock().unlock_log(limit) {
                Ok(records) => return records,
                Err(e) => warn!(error = %e, "Failed to read unlock log, using session audit"),
            }
        }
        self.state
            .lock()
            .ledger()
            .audit()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Backend state as of the last reply.
    #[must_use]
    pub fn ai_mode(&self) -> AiMode {
        self.composer.ai_mode()
    }

    /// Add a sink for autonomous events of `category`.
    pub fn register_sink(&self, category: BehaviorCategory, sink: Arc<dyn EventSink>) {
        self.registry.register(category, sink);
    }

    /// The session's scheduler, created on first use. `None` when
    /// autonomous behavior is disabled.
    #[must_use]
    pub fn scheduler(&self) -> Option<Arc<Scheduler>> {
        if !self.config.persona.autonomous_behavior {
            return None;
        }
        let mut slot = self.scheduler.lock();
        let scheduler = slot.get_or_insert_with(|| {
            let mut scheduler = Scheduler::standard(
                Arc::clone(&self.state),
                Arc::clone(&self.sensor),
                Arc::clone(&self.registry),
                &self.config.autonomous,
                self.clock.now(),
            );
            if let Some(store) = &self.store {
                scheduler = scheduler.with_store(Arc::clone(store));
            }
            Arc::new(scheduler)
        });
        Some(Arc::clone(scheduler))
    }

    /// Start the background behaviors. `None` when autonomous behavior is
    /// disabled or already running.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start_autonomous(&self) -> Option<SchedulerHandle> {
        let scheduler = self.scheduler()?;
        if scheduler.is_running() {
            warn!("Autonomous behavior already running");
            return None;
        }
        let tick = std::time::Duration::from_secs(self.config.autonomous.tick_secs.max(1));
        Some(scheduler.spawn(Arc::clone(&self.clock), tick))
    }

    /// Save the profile now.
    pub fn flush(&self) {
        let profile = self
            .state
            .lock()
            .to_profile(&self.config.persona.user_id, self.clock.now());
        persist_profile(self.store.as_ref(), &profile);
    }

    /// Relationship start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.state.lock().clock().start_time()
    }

    /// Configuration the session was built with.
    #[must_use]
    pub fn config(&self) -> &AsunaConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asuna_core::clock::ManualClock;

    fn offline_config() -> AsunaConfig {
        let mut config = AsunaConfig::default();
        config.persistence.enabled = false;
        config.llm.provider = "none".into();
        config
    }

    #[tokio::test]
    async fn template_only_when_provider_is_none() {
        let session = SessionBuilder::new(offline_config()).seed(1).build().expect("build");
        let status = session.status();
        assert_eq!(status.ai_mode, AiMode::TemplateOnly);
        assert!(matches!(status.composer_mode, ComposerMode::TemplateOnly { .. }));

        let outcome = session.process_interaction("hello").await;
        assert_eq!(outcome.source, ResponseSource::Template);
        assert_eq!(outcome.stage, Stage::Anxious);
        assert_eq!(outcome.counters.interaction_count, 1);
    }

    #[tokio::test]
    async fn placeholder_key_degrades_to_templates() {
        let mut config = offline_config();
        config.llm.provider = "openai".into();
        config.llm.api_key = Some(asuna_core::config::PLACEHOLDER_API_KEY.into());
        let session = SessionBuilder::new(config).build().expect("build");
        match session.status().composer_mode {
            ComposerMode::TemplateOnly { reason } => assert!(reason.contains("placeholder")),
            ComposerMode::Generative => panic!("expected template-only"),
        }
    }

    #[test]
    fn supplement_unknown_id_is_a_noop() {
        let session = SessionBuilder::new(offline_config()).build().expect("build");
        assert!(!session.supplement("no_such_fragment", "text"));
        assert!(session.supplement("core_bond", "the lakeside promise"));
    }

    #[test]
    fn autonomous_disabled_gives_no_scheduler() {
        let mut config = offline_config();
        config.persona.autonomous_behavior = false;
        let session = SessionBuilder::new(config).build().expect("build");
        assert!(session.scheduler().is_none());
        assert!(session.start_autonomous().is_none());
    }

    #[test]
    fn scheduler_is_created_once() {
        let clock = ManualClock::new(Utc::now());
        let session = SessionBuilder::new(offline_config())
            .clock(Arc::new(clock))
            .build()
            .expect("build");
        let a = session.scheduler().expect("enabled");
        let b = session.scheduler().expect("enabled");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.status().behaviors.len(), 4);
    }
}
