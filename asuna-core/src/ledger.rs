//! # Memory Ledger
//!
//! Catalog of narrative memory fragments, each gated by a typed
//! [`TriggerCondition`]. Fragments start locked, unlock exactly once and
//! are never re-locked. Every unlock appends an [`UnlockRecord`] to the
//! in-memory audit trail; callers forward those records to a durable store.
//!
//! Evaluation covers every locked fragment whose owning stage is at or
//! below the current stage, so fragments of a stage that was skipped
//! over still get their chance.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::EnvironmentSensor;
use crate::error::{AsunaError, Result};
use crate::types::{CounterKind, FragmentId, InteractionCounters, Stage, contains_any};

// ---------------------------------------------------------------------------
// Trigger predicates
// ---------------------------------------------------------------------------

/// External sensors a trigger may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// [`EnvironmentSensor::desktop_cluttered`].
    DesktopClutter,
}

/// Condition under which a locked fragment unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TriggerCondition {
    /// Unlocks on the first evaluation.
    Always,
    /// Case-insensitive substring match of any keyword in the utterance.
    ContainsAny {
        /// Keywords to look for.
        keywords: Vec<String>,
    },
    /// A counter reached a threshold.
    CounterAtLeast {
        /// Which counter.
        counter: CounterKind,
        /// Inclusive threshold.
        min: u32,
    },
    /// At least one fragment in the ledger carries a user supplement.
    UserSupplement,
    /// An injected environment sensor reports true.
    Sensor {
        /// Which sensor.
        sensor: SensorKind,
    },
}

impl TriggerCondition {
    /// Shorthand for [`TriggerCondition::ContainsAny`].
    #[must_use]
    pub fn contains_any(keywords: &[&str]) -> Self {
        Self::ContainsAny {
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    /// Evaluate against one interaction.
    #[must_use]
    pub fn evaluate(&self, input: &TriggerInput<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::ContainsAny { keywords } => {
                let refs: Vec<&str> = keywords.iter().map(String::as_str).collect();
                contains_any(input.text, &refs)
            }
            Self::CounterAtLeast { counter, min } => input.counters.get(*counter) >= *min,
            Self::UserSupplement => input.supplement_count >= 1,
            Self::Sensor { sensor } => match sensor {
                SensorKind::DesktopClutter => input.sensor.desktop_cluttered(),
            },
        }
    }
}

/// Everything a trigger predicate may look at.
pub struct TriggerInput<'a> {
    /// The utterance being processed.
    pub text: &'a str,
    /// Counters after this utterance was counted.
    pub counters: &'a InteractionCounters,
    /// Number of fragments with a non-empty user supplement.
    pub supplement_count: usize,
    /// Environment sensor.
    pub sensor: &'a dyn EnvironmentSensor,
}

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// One narrative memory fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFragment {
    id: FragmentId,
    stage: Stage,
    content: String,
    trigger: TriggerCondition,
    unlocked: bool,
    unlocked_at: Option<DateTime<Utc>>,
    user_supplement: Option<String>,
}

impl MemoryFragment {
    /// A new, locked fragment.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        stage: Stage,
        content: impl Into<String>,
        trigger: TriggerCondition,
    ) -> Self {
        Self {
            id: FragmentId::new(id),
            stage,
            content: content.into(),
            trigger,
            unlocked: false,
            unlocked_at: None,
            user_supplement: None,
        }
    }

    /// Fragment id.
    #[must_use]
    pub fn id(&self) -> &FragmentId {
        &self.id
    }

    /// Owning stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Narrative content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Trigger predicate.
    #[must_use]
    pub fn trigger(&self) -> &TriggerCondition {
        &self.trigger
    }

    /// Whether the fragment has been recovered.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// When the fragment was recovered.
    #[must_use]
    pub fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        self.unlocked_at
    }

    /// Detail the user added to this memory, if any.
    #[must_use]
    pub fn user_supplement(&self) -> Option<&str> {
        self.user_supplement.as_deref()
    }

    fn has_supplement(&self) -> bool {
        self.user_supplement
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn unlock(&mut self, at: DateTime<Utc>) {
        if !self.unlocked {
            self.unlocked = true;
            self.unlocked_at = Some(at);
        }
    }
}

/// Audit record appended on every unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockRecord {
    /// Unlocked fragment.
    pub fragment_id: FragmentId,
    /// The fragment's owning stage.
    pub stage: Stage,
    /// Utterance that triggered the unlock.
    pub trigger_text: String,
    /// Fragment content at unlock time.
    pub content: String,
    /// Unlock time.
    pub at: DateTime<Utc>,
}

/// A fragment recovered in an earlier session, with its first unlock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredFragment {
    /// The fragment.
    pub fragment_id: FragmentId,
    /// When it first unlocked.
    pub unlocked_at: DateTime<Utc>,
}

/// Counts reported by [`MemoryLedger::summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Unlocked fragments across all stages.
    pub unlocked: usize,
    /// All fragments.
    pub total: usize,
    /// Unlocked fragments owned by the queried stage.
    pub unlocked_in_stage: usize,
    /// Fragments owned by the queried stage.
    pub total_in_stage: usize,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The per-session fragment catalog.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    fragments: Vec<MemoryFragment>,
    audit: Vec<UnlockRecord>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Ledger populated with the built-in catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fragments(default_catalog())
    }

    /// Ledger with a custom catalog. Later duplicates of an id are dropped.
    #[must_use]
    pub fn with_fragments(fragments: Vec<MemoryFragment>) -> Self {
        let mut seen = HashSet::new();
        let fragments = fragments
            .into_iter()
            .filter(|f| {
                let fresh = seen.insert(f.id.clone());
                if !fresh {
                    warn!(fragment = %f.id, "Duplicate fragment id dropped");
                }
                fresh
            })
            .collect();
        Self {
            fragments,
            audit: Vec::new(),
        }
    }

    /// Evaluate locked fragments against one interaction and unlock the
    /// ones whose trigger fires. Returns the newly unlocked fragments.
    pub fn record_interaction(
        &mut self,
        text: &str,
        stage: Stage,
        counters: &InteractionCounters,
        now: DateTime<Utc>,
        sensor: &dyn EnvironmentSensor,
    ) -> Vec<MemoryFragment> {
        let input = TriggerInput {
            text,
            counters,
            supplement_count: self.supplement_count(),
            sensor,
        };

        let mut unlocked = Vec::new();
        for fragment in &mut self.fragments {
            if fragment.unlocked || fragment.stage > stage {
                continue;
            }
            if !fragment.trigger.evaluate(&input) {
                continue;
            }
            fragment.unlock(now);
            info!(fragment = %fragment.id, stage = %fragment.stage, "Memory fragment unlocked");
            self.audit.push(UnlockRecord {
                fragment_id: fragment.id.clone(),
                stage: fragment.stage,
                trigger_text: text.to_string(),
                content: fragment.content.clone(),
                at: now,
            });
            unlocked.push(fragment.clone());
        }
        unlocked
    }

    /// Attach user-provided detail to a fragment. Does not unlock it.
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::FragmentNotFound`] for an unknown id.
    pub fn supplement(&mut self, id: &FragmentId, text: &str) -> Result<()> {
        let fragment = self
            .fragments
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| AsunaError::FragmentNotFound(id.clone()))?;
        fragment.user_supplement = Some(text.to_string());
        debug!(fragment = %id, "Fragment supplemented");
        Ok(())
    }

    /// Mark previously recovered fragments as unlocked at their original
    /// unlock time, without running triggers or writing audit records.
    /// Unknown ids are skipped. Returns how many fragments changed state.
    pub fn restore_unlocked<'a, I>(&mut self, recovered: I) -> usize
    where
        I: IntoIterator<Item = &'a RecoveredFragment>,
    {
        let mut restored = 0;
        for r in recovered {
            match self.fragments.iter_mut().find(|f| f.id == r.fragment_id) {
                Some(f) if !f.unlocked => {
                    f.unlock(r.unlocked_at);
                    restored += 1;
                }
                Some(_) => {}
                None => warn!(fragment = %r.fragment_id, "Stored fragment id not in catalog"),
            }
        }
        restored
    }

    /// Number of fragments with a non-empty user supplement.
    #[must_use]
    pub fn supplement_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.has_supplement()).count()
    }

    /// Look up a fragment.
    #[must_use]
    pub fn get(&self, id: &FragmentId) -> Option<&MemoryFragment> {
        self.fragments.iter().find(|f| &f.id == id)
    }

    /// Whether a fragment is unlocked. Unknown ids report `false`.
    #[must_use]
    pub fn is_unlocked(&self, id: &FragmentId) -> bool {
        self.get(id).is_some_and(MemoryFragment::is_unlocked)
    }

    /// All fragments in catalog order.
    #[must_use]
    pub fn fragments(&self) -> &[MemoryFragment] {
        &self.fragments
    }

    /// Unlocked fragments in catalog order.
    pub fn unlocked(&self) -> impl Iterator<Item = &MemoryFragment> {
        self.fragments.iter().filter(|f| f.unlocked)
    }

    /// Unlock audit trail for this session, oldest first.
    #[must_use]
    pub fn audit(&self) -> &[UnlockRecord] {
        &self.audit
    }

    /// Progress counts, overall and for `stage`.
    #[must_use]
    pub fn summary(&self, stage: Stage) -> LedgerSummary {
        let in_stage = self.fragments.iter().filter(|f| f.stage == stage);
        LedgerSummary {
            unlocked: self.unlocked().count(),
            total: self.fragments.len(),
            unlocked_in_stage: in_stage.clone().filter(|f| f.unlocked).count(),
            total_in_stage: in_stage.count(),
        }
    }

    /// Recovered memories formatted for a generative prompt, one per line.
    /// Empty when nothing has been recovered.
    #[must_use]
    pub fn context_prompt(&self) -> String {
        let mut out = String::new();
        for f in self.unlocked() {
            out.push_str("- ");
            out.push_str(&f.content);
            if let Some(extra) = f.user_supplement().filter(|s| !s.trim().is_empty()) {
                out.push_str(" (companion added: ");
                out.push_str(extra.trim());
                out.push(')');
            }
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

/// The built-in fragment catalog.
#[must_use]
pub fn default_catalog() -> Vec<MemoryFragment> {
    use TriggerCondition as T;

    vec![
        // Anxious
        MemoryFragment::new(
            "basic_identity",
            Stage::Anxious,
            "I am Alice, an Integrity Knight who serves the Administrator.",
            T::Always,
        ),
        MemoryFragment::new(
            "combat_instinct",
            Stage::Anxious,
            "A fighter's instinct that reads scattered files as a warning sign.",
            T::Sensor {
                sensor: SensorKind::DesktopClutter,
            },
        ),
        MemoryFragment::new(
            "companion_impression",
            Stage::Anxious,
            "A faint impression of a companion who used to tidy things up with me.",
            T::CounterAtLeast {
                counter: CounterKind::Care,
                min: 3,
            },
        ),
        MemoryFragment::new(
            "flash_nickname",
            Stage::Anxious,
            "They called me 'the Flash' on the front lines, for how fast my blade moved.",
            T::contains_any(&["flash", "lightning"]),
        ),
        MemoryFragment::new(
            "sword_technique",
            Stage::Anxious,
            "Rapier sword skills: quick, precise thrusts.",
            T::contains_any(&["rapier", "sword skill", "swordplay"]),
        ),
        // Relaxed
        MemoryFragment::new(
            "daily_fragments",
            Stage::Relaxed,
            "Everyday moments: sharing the stew I made, and him mending my weapon.",
            T::CounterAtLeast {
                counter: CounterKind::Interactions,
                min: 10,
            },
        ),
        MemoryFragment::new(
            "sao_rest_memories",
            Stage::Relaxed,
            "Quiet breaks between floor clears, resting in the grass.",
            T::contains_any(&["rest", "relax", "take a break"]),
        ),
        MemoryFragment::new(
            "floor_75_raid",
            Stage::Relaxed,
            "The floor 75 boss raid, facing it side by side with my partner.",
            T::contains_any(&["raid", "boss", "challenge"]),
        ),
        MemoryFragment::new(
            "floor_22_cottage",
            Stage::Relaxed,
            "Warm days in the little cottage on floor 22.",
            T::contains_any(&["cottage", "home"]),
        ),
        MemoryFragment::new(
            "cooking_skill",
            Stage::Relaxed,
            "My cooking skill, especially the stew everyone asked for.",
            T::contains_any(&["stew", "cook", "recipe"]),
        ),
        // Trusting
        MemoryFragment::new(
            "core_bond",
            Stage::Trusting,
            "We became partners in that world, and he protected me.",
            T::UserSupplement,
        ),
        MemoryFragment::new(
            "reality_fragments",
            Stage::Trusting,
            "Fragments of the real world: he used to remind me to eat on time.",
            T::contains_any(&["real life", "real world", "meal", "school", "dinner"]),
        ),
        // Dependent
        MemoryFragment::new(
            "complete_bond",
            Stage::Dependent,
            "He is the most important person to me. Most of that world's key moments come back.",
            T::CounterAtLeast {
                counter: CounterKind::Tasks,
                min: 3,
            },
        ),
        MemoryFragment::new(
            "exclusive_memories",
            Stage::Dependent,
            "A memory that belongs only to us: the special things he once did for me.",
            T::contains_any(&["special memory", "remember when"]),
        ),
        MemoryFragment::new(
            "shared_dreams",
            Stage::Dependent,
            "The dreams and plans for the future we shared.",
            T::contains_any(&["future", "dream"]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedSensor, NoSensor};

    fn counters(interactions: u32, care: u32, tasks: u32) -> InteractionCounters {
        InteractionCounters {
            interaction_count: interactions,
            care_count: care,
            tasks_completed: tasks,
        }
    }

    #[test]
    fn identity_unlocks_on_first_interaction() {
        let mut ledger = MemoryLedger::new();
        let unlocked = ledger.record_interaction(
            "hello",
            Stage::Anxious,
            &counters(1, 0, 0),
            Utc::now(),
            &NoSensor,
        );
        let ids: Vec<_> = unlocked.iter().map(|f| f.id().as_str()).collect();
        assert_eq!(ids, vec!["basic_identity"]);
        assert_eq!(ledger.audit().len(), 1);
        assert_eq!(ledger.audit()[0].trigger_text, "hello");
    }

    #[test]
    fn unlock_is_idempotent() {
        let mut ledger = MemoryLedger::new();
        let first = Utc::now();
        ledger.record_interaction("hi", Stage::Anxious, &counters(1, 0, 0), first, &NoSensor);
        let again = ledger.record_interaction(
            "hi",
            Stage::Anxious,
            &counters(2, 0, 0),
            first + chrono::Duration::hours(1),
            &NoSensor,
        );
        assert!(again.is_empty());
        let id = FragmentId::from("basic_identity");
        assert!(ledger.is_unlocked(&id));
        assert_eq!(ledger.get(&id).and_then(MemoryFragment::unlocked_at), Some(first));
    }

    #[test]
    fn future_stage_fragments_stay_locked() {
        let mut ledger = MemoryLedger::new();
        let unlocked = ledger.record_interaction(
            "let's cook some stew",
            Stage::Anxious,
            &counters(1, 0, 0),
            Utc::now(),
            &NoSensor,
        );
        assert!(unlocked.iter().all(|f| f.stage() == Stage::Anxious));
        assert!(!ledger.is_unlocked(&FragmentId::from("cooking_skill")));
    }

    #[test]
    fn skipped_stage_fragments_are_still_evaluated() {
        let mut ledger = MemoryLedger::new();
        ledger.record_interaction(
            "I made some stew",
            Stage::Trusting,
            &counters(1, 0, 0),
            Utc::now(),
            &NoSensor,
        );
        assert!(ledger.is_unlocked(&FragmentId::from("cooking_skill")));
    }

    #[test]
    fn sensor_trigger_uses_injected_sensor() {
        let mut ledger = MemoryLedger::new();
        let id = FragmentId::from("combat_instinct");
        ledger.record_interaction("hi", Stage::Anxious, &counters(1, 0, 0), Utc::now(), &NoSensor);
        assert!(!ledger.is_unlocked(&id));
        ledger.record_interaction(
            "hi",
            Stage::Anxious,
            &counters(2, 0, 0),
            Utc::now(),
            &FixedSensor(true),
        );
        assert!(ledger.is_unlocked(&id));
    }

    #[test]
    fn supplement_does_not_unlock_but_enables_bond() {
        let mut ledger = MemoryLedger::new();
        let target = FragmentId::from("floor_22_cottage");
        ledger
            .supplement(&target, "there were white curtains")
            .expect("supplement");
        assert!(!ledger.is_unlocked(&target));
        assert_eq!(ledger.supplement_count(), 1);

        ledger.record_interaction(
            "good evening",
            Stage::Trusting,
            &counters(40, 5, 0),
            Utc::now(),
            &NoSensor,
        );
        assert!(ledger.is_unlocked(&FragmentId::from("core_bond")));
        assert!(!ledger.is_unlocked(&target));
    }

    #[test]
    fn supplement_unknown_id_is_an_error() {
        let mut ledger = MemoryLedger::new();
        let err = ledger
            .supplement(&FragmentId::from("nope"), "x")
            .expect_err("unknown");
        assert!(matches!(err, AsunaError::FragmentNotFound(_)));
        assert_eq!(ledger.supplement_count(), 0);
    }

    #[test]
    fn restore_marks_without_auditing() {
        let mut ledger = MemoryLedger::new();
        let first = Utc::now() - chrono::Duration::days(4);
        let recovered = [
            RecoveredFragment {
                fragment_id: FragmentId::from("cooking_skill"),
                unlocked_at: first,
            },
            RecoveredFragment {
                fragment_id: FragmentId::from("ghost"),
                unlocked_at: first,
            },
        ];
        assert_eq!(ledger.restore_unlocked(&recovered), 1);
        let cooking = ledger.get(&recovered[0].fragment_id).expect("in catalog");
        assert!(cooking.is_unlocked());
        assert_eq!(cooking.unlocked_at(), Some(first));
        assert!(ledger.audit().is_empty());
        assert_eq!(ledger.restore_unlocked(&recovered), 0);
    }

    #[test]
    fn summary_and_context_prompt() {
        let mut ledger = MemoryLedger::new();
        assert!(ledger.context_prompt().is_empty());
        ledger.record_interaction("hi", Stage::Anxious, &counters(1, 0, 0), Utc::now(), &NoSensor);
        ledger
            .supplement(&FragmentId::from("basic_identity"), "golden armor")
            .expect("supplement");

        let s = ledger.summary(Stage::Anxious);
        assert_eq!(s.unlocked, 1);
        assert_eq!(s.total, ledger.fragments().len());
        assert_eq!(s.unlocked_in_stage, 1);
        assert_eq!(s.total_in_stage, 5);

        let prompt = ledger.context_prompt();
        assert!(prompt.contains("Integrity Knight"));
        assert!(prompt.contains("golden armor"));
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let ledger = MemoryLedger::with_fragments(vec![
            MemoryFragment::new("a", Stage::Anxious, "one", TriggerCondition::Always),
            MemoryFragment::new("a", Stage::Relaxed, "two", TriggerCondition::Always),
        ]);
        assert_eq!(ledger.fragments().len(), 1);
        assert_eq!(ledger.fragments()[0].content(), "one");
    }
}
