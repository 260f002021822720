//! # Stage Clock
//!
//! Derives the relationship [`Stage`] from the time elapsed since the
//! session began and the three interaction counters.
//!
//! | elapsed   | rule                                                        |
//! |-----------|-------------------------------------------------------------|
//! | `< 24h`   | Anxious                                                     |
//! | `< 7d`    | Relaxed if `interactions >= 10 && care >= 3`, else Anxious  |
//! | `>= 7d`   | Dependent if `tasks >= 3`, else Trusting                    |
//!
//! [`compute_stage`] is the pure rule. [`StageClock`] caches the last stage
//! and never lets it move backwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{InteractionCounters, Stage};

/// Interactions required before the character can relax.
pub const RELAX_MIN_INTERACTIONS: u32 = 10;
/// Reassurances required before the character can relax.
pub const RELAX_MIN_CARE: u32 = 3;
/// Shared tasks required for full dependence.
pub const DEPENDENT_MIN_TASKS: u32 = 3;

/// Pure stage rule. Negative elapsed time is treated as zero.
#[must_use]
pub fn compute_stage(elapsed: Duration, counters: &InteractionCounters) -> Stage {
    if elapsed < Duration::hours(24) {
        Stage::Anxious
    } else if elapsed < Duration::days(7) {
        if counters.interaction_count >= RELAX_MIN_INTERACTIONS
            && counters.care_count >= RELAX_MIN_CARE
        {
            Stage::Relaxed
        } else {
            Stage::Anxious
        }
    } else if counters.tasks_completed >= DEPENDENT_MIN_TASKS {
        Stage::Dependent
    } else {
        Stage::Trusting
    }
}

/// A recorded change of stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    /// Stage before the change.
    pub from: Stage,
    /// Stage after the change.
    pub to: Stage,
    /// When the change was observed.
    pub at: DateTime<Utc>,
    /// Counters at the time of the change.
    pub counters: InteractionCounters,
}

/// Result of [`StageClock::refresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageRefresh {
    /// The current stage after refreshing.
    pub stage: Stage,
    /// Set when this refresh moved the stage forward.
    pub transition: Option<StageTransition>,
}

/// Per-session stage clock.
#[derive(Debug, Clone)]
pub struct StageClock {
    start: DateTime<Utc>,
    cached: Stage,
}

impl StageClock {
    /// A new clock whose session started at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            cached: Stage::Anxious,
        }
    }

    /// Session start time.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    /// Last computed stage.
    #[must_use]
    pub fn current(&self) -> Stage {
        self.cached
    }

    /// Time elapsed since the session started, clamped at zero.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.start).max(Duration::zero())
    }

    /// Recompute the stage at `now`.
    ///
    /// The cached stage only moves forward; a computed stage below it is
    /// ignored with a warning.
    pub fn refresh(&mut self, now: DateTime<Utc>, counters: &InteractionCounters) -> StageRefresh {
        let computed = compute_stage(self.elapsed(now), counters);

        if computed < self.cached {
            warn!(
                cached = %self.cached,
                computed = %computed,
                "Stage would regress; keeping cached stage"
            );
            return StageRefresh {
                stage: self.cached,
                transition: None,
            };
        }

        if computed == self.cached {
            return StageRefresh {
                stage: computed,
                transition: None,
            };
        }

        let transition = StageTransition {
            from: self.cached,
            to: computed,
            at: now,
            counters: *counters,
        };
        info!(
            from = %transition.from,
            to = %transition.to,
            interactions = counters.interaction_count,
            care = counters.care_count,
            tasks = counters.tasks_completed,
            "Stage transition"
        );
        self.cached = computed;

        StageRefresh {
            stage: computed,
            transition: Some(transition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(interactions: u32, care: u32, tasks: u32) -> InteractionCounters {
        InteractionCounters {
            interaction_count: interactions,
            care_count: care,
            tasks_completed: tasks,
        }
    }

    #[test]
    fn first_day_is_always_anxious() {
        let c = counters(1000, 1000, 1000);
        assert_eq!(compute_stage(Duration::hours(23), &c), Stage::Anxious);
        assert_eq!(compute_stage(Duration::zero(), &c), Stage::Anxious);
    }

    #[test]
    fn relaxing_needs_interactions_and_care() {
        let elapsed = Duration::hours(30);
        assert_eq!(compute_stage(elapsed, &counters(12, 4, 0)), Stage::Relaxed);
        assert_eq!(compute_stage(elapsed, &counters(9, 4, 0)), Stage::Anxious);
        assert_eq!(compute_stage(elapsed, &counters(12, 2, 0)), Stage::Anxious);
    }

    #[test]
    fn after_a_week() {
        let elapsed = Duration::days(7);
        assert_eq!(compute_stage(elapsed, &counters(0, 0, 0)), Stage::Trusting);
        assert_eq!(compute_stage(elapsed, &counters(0, 0, 3)), Stage::Dependent);
    }

    #[test]
    fn refresh_reports_transition_once() {
        let start = Utc::now();
        let mut clock = StageClock::new(start);
        let c = counters(12, 4, 0);

        let r = clock.refresh(start + Duration::hours(30), &c);
        assert_eq!(r.stage, Stage::Relaxed);
        let t = r.transition.expect("transition");
        assert_eq!((t.from, t.to), (Stage::Anxious, Stage::Relaxed));

        let again = clock.refresh(start + Duration::hours(31), &c);
        assert_eq!(again.stage, Stage::Relaxed);
        assert!(again.transition.is_none());
    }

    #[test]
    fn cached_stage_never_regresses() {
        let start = Utc::now();
        let mut clock = StageClock::new(start);
        clock.refresh(start + Duration::days(8), &counters(0, 0, 3));
        assert_eq!(clock.current(), Stage::Dependent);

        // Time going backwards must not undo progress.
        let r = clock.refresh(start + Duration::hours(2), &counters(0, 0, 3));
        assert_eq!(r.stage, Stage::Dependent);
        assert!(r.transition.is_none());
    }

    #[test]
    fn stage_may_skip_intermediate_steps() {
        let start = Utc::now();
        let mut clock = StageClock::new(start);
        let r = clock.refresh(start + Duration::days(10), &counters(0, 0, 0));
        let t = r.transition.expect("transition");
        assert_eq!((t.from, t.to), (Stage::Anxious, Stage::Trusting));
    }
}
