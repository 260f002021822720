//! Property-Based Tests for the stage clock, ledger and blender.
//!
//! Uses `proptest` to check the invariants that must hold for any
//! sequence of inputs: first-day stage, monotonic progression, unlock
//! idempotence and bounded emotion intensity.

use chrono::{Duration, Utc};
use proptest::prelude::*;

use asuna_core::clock::NoSensor;
use asuna_core::emotion::EmotionBlender;
use asuna_core::ledger::MemoryLedger;
use asuna_core::stage::{StageClock, compute_stage};
use asuna_core::types::{FragmentId, InteractionCounters, Stage};
use asuna_core::language;
use asuna_core::CharacterState;

fn arb_counters() -> impl Strategy<Value = InteractionCounters> {
    (0u32..200, 0u32..50, 0u32..20).prop_map(|(i, c, t)| InteractionCounters {
        interaction_count: i,
        care_count: c,
        tasks_completed: t,
    })
}

fn arb_utterance() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "hello",
        "don't worry",
        "let's organize the files together",
        "I'm scared",
        "I'm so happy today",
        "that was unexpected",
        "I'll protect you",
        "tell me about the cottage",
        "remember when we had stew",
        "time to rest",
        "what's your dream for the future",
    ])
    .prop_map(str::to_string)
}

// ---------------------------------------------------------------------------
// Property: the first day is always anxious
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn first_day_is_anxious(secs in 0i64..86_400, counters in arb_counters()) {
        prop_assert_eq!(compute_stage(Duration::seconds(secs), &counters), Stage::Anxious);
    }
}

// ---------------------------------------------------------------------------
// Property: more time and more counters never give an earlier stage
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn compute_stage_is_monotonic(
        a in 0i64..(30 * 86_400),
        extra in 0i64..(30 * 86_400),
        base in arb_counters(),
        more in arb_counters(),
    ) {
        let bigger = InteractionCounters {
            interaction_count: base.interaction_count + more.interaction_count,
            care_count: base.care_count + more.care_count,
            tasks_completed: base.tasks_completed + more.tasks_completed,
        };
        prop_assert!(bigger.dominates(&base));
        let early = compute_stage(Duration::seconds(a), &base);
        let late = compute_stage(Duration::seconds(a + extra), &bigger);
        prop_assert!(late >= early);
    }

    #[test]
    fn stage_clock_never_regresses(offsets in prop::collection::vec(0i64..(20 * 86_400), 1..30)) {
        let start = Utc::now();
        let mut clock = StageClock::new(start);
        let counters = InteractionCounters {
            interaction_count: 50,
            care_count: 10,
            tasks_completed: 1,
        };
        let mut highest = Stage::Anxious;
        for off in offsets {
            let stage = clock.refresh(start + Duration::seconds(off), &counters).stage;
            prop_assert!(stage >= highest);
            highest = stage;
        }
    }
}

// ---------------------------------------------------------------------------
// Property: unlocked fragments remain unlocked
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unlocks_are_permanent(
        utterances in prop::collection::vec(arb_utterance(), 1..40),
        hours in prop::collection::vec(0i64..400, 1..40),
    ) {
        let start = Utc::now();
        let mut state = CharacterState::new(start, 100);
        let mut seen: Vec<FragmentId> = Vec::new();
        for (text, h) in utterances.iter().zip(hours.iter().cycle()) {
            let obs = state.observe(text, start + Duration::hours(*h), &NoSensor);
            for f in &obs.unlocked {
                prop_assert!(!seen.contains(f.id()), "fragment unlocked twice");
                seen.push(f.id().clone());
            }
            for id in &seen {
                prop_assert!(state.ledger().is_unlocked(id));
            }
        }
        prop_assert_eq!(state.ledger().audit().len(), seen.len());
    }

    #[test]
    fn supplementing_unknown_ids_changes_nothing(id in "[a-z_]{1,16}", text in ".{0,32}") {
        let mut ledger = MemoryLedger::new();
        let fid = FragmentId::new(id);
        let known = ledger.get(&fid).is_some();
        let result = ledger.supplement(&fid, &text);
        prop_assert_eq!(result.is_ok(), known);
        if !known {
            prop_assert_eq!(ledger.supplement_count(), 0);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: emotion intensity stays in [0, 1], history stays bounded
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn intensity_bounded(
        utterances in prop::collection::vec(arb_utterance(), 1..150),
        stage_idx in 0usize..4,
    ) {
        let mut blender = EmotionBlender::new(100);
        let stage = Stage::ALL[stage_idx];
        for (i, text) in utterances.iter().enumerate() {
            let counters = InteractionCounters {
                interaction_count: u32::try_from(i).unwrap_or(u32::MAX),
                ..InteractionCounters::default()
            };
            let ctx = blender.update(text, stage, &counters, Utc::now());
            prop_assert!((0.0..=1.0).contains(&ctx.intensity));
        }
        prop_assert!(blender.history_len() <= 100);
    }
}

// ---------------------------------------------------------------------------
// Property: tone never introduces a forbidden phrase
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn tone_and_cap_never_add_forbidden(text in "[a-zA-Z ,.!?]{0,200}", stage_idx in 0usize..4) {
        let stage = Stage::ALL[stage_idx];
        let before = language::contains_forbidden(&text);
        let toned = language::apply_stage_tone(&text, stage);
        let capped = language::cap_length(&toned, language::ANXIOUS_MAX_CHARS);
        if !before {
            prop_assert!(!language::contains_forbidden(&capped));
        }
        prop_assert!(capped.chars().count() <= language::ANXIOUS_MAX_CHARS + 3);
    }
}
