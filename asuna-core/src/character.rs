//! # Character State
//!
//! The per-session aggregate that owns the stage clock, the memory ledger,
//! the emotion blender and the interaction counters.
//!
//! [`CharacterState::observe`] is the foreground pipeline for one user
//! utterance: count it, refresh the stage, run the ledger, update the
//! emotion. Callers that share the state across tasks wrap it in a mutex;
//! nothing here is async.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::clock::{EnvironmentSensor, NoSensor};
use crate::emotion::{EmotionBlender, EmotionalContext};
use crate::error::Result;
use crate::ledger::{MemoryFragment, MemoryLedger, RecoveredFragment};
use crate::persistence::{SharedMemory, UserProfile};
use crate::persona;
use crate::stage::{StageClock, StageRefresh, StageTransition};
use crate::types::{FragmentId, InteractionCounters, Stage};

/// Most recent reassurance utterances kept for the profile.
const CARE_ACTIONS_KEPT: usize = 20;

/// Everything one utterance changed.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Stage after refreshing.
    pub stage: Stage,
    /// Set when the stage moved forward on this utterance.
    pub transition: Option<StageTransition>,
    /// Fragments unlocked by this utterance.
    pub unlocked: Vec<MemoryFragment>,
    /// Emotion resolved for this utterance.
    pub emotion: EmotionalContext,
    /// Counters after this utterance.
    pub counters: InteractionCounters,
}

/// Mutable state of one character session.
#[derive(Debug, Clone)]
pub struct CharacterState {
    clock: StageClock,
    ledger: MemoryLedger,
    emotion: EmotionBlender,
    counters: InteractionCounters,
    care_actions: Vec<String>,
}

impl CharacterState {
    /// Fresh state with the built-in fragment catalog.
    #[must_use]
    pub fn new(start: DateTime<Utc>, history_cap: usize) -> Self {
        Self::with_ledger(start, MemoryLedger::new(), history_cap)
    }

    /// Fresh state with a custom ledger.
    #[must_use]
    pub fn with_ledger(start: DateTime<Utc>, ledger: MemoryLedger, history_cap: usize) -> Self {
        Self {
            clock: StageClock::new(start),
            ledger,
            emotion: EmotionBlender::new(history_cap),
            counters: InteractionCounters::default(),
            care_actions: Vec::new(),
        }
    }

    /// Rebuild state from a stored profile and the fragments unlocked in
    /// earlier sessions, keeping their original unlock times. The stage is
    /// recomputed at `now`; fragments that became eligible while the
    /// session was away unlock and land in the audit trail.
    #[must_use]
    pub fn from_profile(
        profile: &UserProfile,
        recovered: &[RecoveredFragment],
        history_cap: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let mut state = Self::new(profile.started_at, history_cap);
        state.counters = profile.counters;
        state.care_actions.clone_from(&profile.care_actions);
        for shared in &profile.shared_memories {
            if let Err(e) = state.ledger.supplement(&shared.fragment_id, &shared.text) {
                warn!(fragment = %shared.fragment_id, error = %e, "Stored supplement skipped");
            }
        }
        state.ledger.restore_unlocked(recovered);
        state.refresh(now);
        state
    }

    /// Snapshot the persistent part of the state.
    #[must_use]
    pub fn to_profile(&self, user_id: &str, now: DateTime<Utc>) -> UserProfile {
        let shared_memories = self
            .ledger
            .fragments()
            .iter()
            .filter_map(|f| {
                f.user_supplement().map(|text| SharedMemory {
                    fragment_id: f.id().clone(),
                    text: text.to_string(),
                })
            })
            .collect();
        UserProfile {
            user_id: user_id.to_string(),
            counters: self.counters,
            care_actions: self.care_actions.clone(),
            shared_memories,
            preferences: std::collections::BTreeMap::new(),
            started_at: self.clock.start_time(),
            last_interaction: now,
        }
    }

    /// Process one user utterance.
    pub fn observe(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
        sensor: &dyn EnvironmentSensor,
    ) -> Observation {
        self.counters.interaction_count += 1;
        if persona::is_care(text) {
            self.counters.care_count += 1;
            self.care_actions.push(text.to_string());
            if self.care_actions.len() > CARE_ACTIONS_KEPT {
                self.care_actions.remove(0);
            }
        }
        if persona::is_task(text) {
            self.counters.tasks_completed += 1;
        }

        let StageRefresh { stage, transition } = self.clock.refresh(now, &self.counters);
        let unlocked = self
            .ledger
            .record_interaction(text, stage, &self.counters, now, sensor);
        let emotion = self.emotion.update(text, stage, &self.counters, now);

        Observation {
            stage,
            transition,
            unlocked,
            emotion,
            counters: self.counters,
        }
    }

    /// Refresh the stage without counting an interaction.
    ///
    /// On a transition the ledger runs once for the new stage with the
    /// current counters and no utterance, so counter and always-true
    /// fragments unlock immediately. New unlocks appear in
    /// [`MemoryLedger::audit`].
    pub fn refresh(&mut self, now: DateTime<Utc>) -> StageRefresh {
        let refresh = self.clock.refresh(now, &self.counters);
        if refresh.transition.is_some() {
            self.ledger
                .record_interaction("", refresh.stage, &self.counters, now, &NoSensor);
        }
        refresh
    }

    /// Run the ledger against `text` without counting an interaction.
    ///
    /// Used by background sweeps that probe for recoverable memories.
    pub fn probe(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
        sensor: &dyn EnvironmentSensor,
    ) -> Vec<MemoryFragment> {
        let stage = self.clock.refresh(now, &self.counters).stage;
        self.ledger
            .record_interaction(text, stage, &self.counters, now, sensor)
    }

    /// Attach a user detail to a fragment.
    ///
    /// # Errors
    /// Returns `AsunaError::FragmentNotFound` for an unknown id.
    pub fn supplement(&mut self, id: &FragmentId, text: &str) -> Result<()> {
        self.ledger.supplement(id, text)
    }

    /// Cached stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.clock.current()
    }

    /// Current counters.
    #[must_use]
    pub fn counters(&self) -> InteractionCounters {
        self.counters
    }

    /// The stage clock.
    #[must_use]
    pub fn clock(&self) -> &StageClock {
        &self.clock
    }

    /// The memory ledger.
    #[must_use]
    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// The emotion blender.
    #[must_use]
    pub fn emotion(&self) -> &EmotionBlender {
        &self.emotion
    }

    /// Mutable emotion blender, for environment factors.
    pub fn emotion_mut(&mut self) -> &mut EmotionBlender {
        &mut self.emotion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn observe_counts_and_unlocks() {
        let start = Utc::now();
        let mut state = CharacterState::new(start, 100);
        let obs = state.observe("Don't worry, let's do it together", start, &NoSensor);
        assert_eq!(obs.counters.interaction_count, 1);
        assert_eq!(obs.counters.care_count, 1);
        assert_eq!(obs.counters.tasks_completed, 1);
        assert_eq!(obs.stage, Stage::Anxious);
        assert!(obs.unlocked.iter().any(|f| f.id().as_str() == "basic_identity"));
    }

    #[test]
    fn relaxes_after_scenario() {
        let start = Utc::now();
        let mut state = CharacterState::new(start, 100);
        let mut last = None;
        for i in 0..12 {
            let text = if i < 4 { "it's safe here" } else { "hello" };
            last = Some(state.observe(text, start + Duration::hours(30), &NoSensor));
        }
        let obs = last.expect("observed");
        assert_eq!(obs.stage, Stage::Relaxed);
        assert_eq!(obs.counters.care_count, 4);
        // The relaxed-stage counter fragment unlocks the moment the stage changes.
        assert!(state.ledger().is_unlocked(&FragmentId::from("daily_fragments")));
    }

    #[test]
    fn transition_reported_on_the_turn_it_happens() {
        let start = Utc::now();
        let mut state = CharacterState::new(start, 100);
        let late = start + Duration::days(8);
        let obs = state.observe("hi", late, &NoSensor);
        let t = obs.transition.expect("transition");
        assert_eq!(t.to, Stage::Trusting);
        assert!(state.observe("hi", late, &NoSensor).transition.is_none());
    }

    #[test]
    fn profile_round_trip_restores_progress() {
        let start = Utc::now() - Duration::days(3);
        let mut state = CharacterState::new(start, 100);
        let now = start + Duration::days(2);
        for _ in 0..3 {
            state.observe("don't worry", now, &NoSensor);
        }
        state
            .supplement(&FragmentId::from("floor_22_cottage"), "white curtains")
            .expect("supplement");

        let profile = state.to_profile("companion", now);
        let recovered = recovered_from(&state);
        let restored = CharacterState::from_profile(&profile, &recovered, 100, now);

        assert_eq!(restored.counters(), state.counters());
        assert_eq!(restored.clock().start_time(), start);
        assert_eq!(restored.ledger().supplement_count(), 1);
        for r in &recovered {
            assert!(restored.ledger().is_unlocked(&r.fragment_id));
        }
    }

    fn recovered_from(state: &CharacterState) -> Vec<RecoveredFragment> {
        state
            .ledger()
            .audit()
            .iter()
            .map(|r| RecoveredFragment {
                fragment_id: r.fragment_id.clone(),
                unlocked_at: r.at,
            })
            .collect()
    }

    #[test]
    fn restore_keeps_original_unlock_times() {
        let start = Utc::now() - Duration::days(5);
        let mut state = CharacterState::new(start, 100);
        state.observe("hello", start, &NoSensor);
        let id = FragmentId::from("basic_identity");
        let original = state.ledger().get(&id).and_then(MemoryFragment::unlocked_at);
        assert_eq!(original, Some(start));

        let later = start + Duration::days(2);
        let profile = state.to_profile("companion", later);
        let restored = CharacterState::from_profile(&profile, &recovered_from(&state), 100, later);
        let again = restored.ledger().get(&id).and_then(MemoryFragment::unlocked_at);
        assert_eq!(again, original);
    }

    #[test]
    fn unknown_stored_supplement_is_skipped() {
        let now = Utc::now();
        let mut profile = UserProfile::new("companion", now);
        profile.shared_memories.push(SharedMemory {
            fragment_id: FragmentId::from("retired_fragment"),
            text: "from an older catalog".to_string(),
        });
        let restored = CharacterState::from_profile(&profile, &[], 100, now);
        assert_eq!(restored.ledger().supplement_count(), 0);
    }

    #[test]
    fn transition_on_refresh_unlocks_new_stage_fragments() {
        let start = Utc::now();
        let mut state = CharacterState::new(start, 100);
        for _ in 0..3 {
            state.observe("let's do it together", start, &NoSensor);
        }
        let bond = FragmentId::from("complete_bond");
        assert!(!state.ledger().is_unlocked(&bond));

        let audit_before = state.ledger().audit().len();
        let refresh = state.refresh(start + Duration::days(8));
        assert_eq!(refresh.stage, Stage::Dependent);
        assert!(refresh.transition.is_some());
        assert!(state.ledger().is_unlocked(&bond));
        let fresh = &state.ledger().audit()[audit_before..];
        assert!(fresh.iter().any(|r| r.fragment_id == bond));
        assert_eq!(state.counters().interaction_count, 3);

        // No transition, no pass.
        let audit_len = state.ledger().audit().len();
        assert!(state.refresh(start + Duration::days(9)).transition.is_none());
        assert_eq!(state.ledger().audit().len(), audit_len);
    }

    #[test]
    fn probe_does_not_count() {
        let start = Utc::now();
        let mut state = CharacterState::new(start, 100);
        let unlocked = state.probe("the flash of a blade", start, &NoSensor);
        assert!(unlocked.iter().any(|f| f.id().as_str() == "flash_nickname"));
        assert_eq!(state.counters().interaction_count, 0);
    }
}
