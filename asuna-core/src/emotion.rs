//! # Emotion Blender
//!
//! Keeps the character's current emotion as a decaying, intensity-weighted
//! state derived from per-stage baselines and keyword triggers.
//!
//! ## Update rule
//!
//! 1. Scan the utterance for fear, joy, sadness and surprise keywords, in
//!    that priority order. The first category that matches wins.
//! 2. A care-received match overrides all of them.
//! 3. `intensity = min(1, baseline[stage][emotion] + boost) * decay`, where
//!    decay is 1.0 below 5 interactions, 0.9 below 20 and 0.8 afterwards.
//! 4. No match yields [`Emotion::Curious`] at its plain baseline.
//!
//! Every result is appended to a bounded rolling history.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::persona;
use crate::types::{Emotion, InteractionCounters, Stage, contains_any};

/// Default rolling history capacity.
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Records considered by [`EmotionBlender::summary`].
const SUMMARY_WINDOW: usize = 10;

// ---------------------------------------------------------------------------
// Baselines and triggers
// ---------------------------------------------------------------------------

/// Baseline intensity of `emotion` at `stage`.
#[must_use]
pub fn baseline(stage: Stage, emotion: Emotion) -> f32 {
    use Emotion::{Angry, Curious, Happy, Lonely, Sad, Surprised};
    match (stage, emotion) {
        (Stage::Anxious, Lonely) => 0.8,
        (Stage::Anxious, Curious) => 0.6,
        (Stage::Anxious, Sad) => 0.7,
        (Stage::Anxious, Happy) => 0.1,
        (Stage::Anxious, Angry) => 0.2,
        (Stage::Anxious, Surprised) => 0.5,

        (Stage::Relaxed, Happy) => 0.6,
        (Stage::Relaxed, Curious) => 0.8,
        (Stage::Relaxed, Sad | Lonely) => 0.2,
        (Stage::Relaxed, Angry) => 0.1,
        (Stage::Relaxed, Surprised) => 0.6,

        (Stage::Trusting, Happy) => 0.8,
        (Stage::Trusting, Curious) => 0.7,
        (Stage::Trusting, Sad | Lonely | Angry) => 0.1,
        (Stage::Trusting, Surprised) => 0.5,

        (Stage::Dependent, Happy) => 0.9,
        (Stage::Dependent, Curious) => 0.6,
        (Stage::Dependent, Sad) => 0.1,
        (Stage::Dependent, Lonely | Angry) => 0.05,
        (Stage::Dependent, Surprised) => 0.4,
    }
}

/// Keyword category that moved the emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTrigger {
    /// Fear words; expressed as [`Emotion::Lonely`].
    Fear,
    /// Joy words.
    Joy,
    /// Sadness words.
    Sadness,
    /// Surprise words.
    Surprise,
    /// Reassurance or care from the companion.
    CareReceived,
}

impl EmotionTrigger {
    /// Sentiment categories in priority order. Care is handled separately.
    const SENTIMENT: [EmotionTrigger; 4] = [Self::Fear, Self::Joy, Self::Sadness, Self::Surprise];

    /// Keywords for this category.
    #[must_use]
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Fear => &["scared", "afraid", "fear", "danger", "frightened", "worried"],
            Self::Joy => &["happy", "glad", "love", "delighted", "fun"],
            Self::Sadness => &["sad", "upset", "disappointed", "lonely", "cry"],
            Self::Surprise => &["surprise", "unexpected", "suddenly", "no way", "wow"],
            Self::CareReceived => persona::CARE_KEYWORDS,
        }
    }

    /// Emotion this category produces.
    #[must_use]
    pub fn emotion(self) -> Emotion {
        match self {
            Self::Fear => Emotion::Lonely,
            Self::Joy | Self::CareReceived => Emotion::Happy,
            Self::Sadness => Emotion::Sad,
            Self::Surprise => Emotion::Surprised,
        }
    }

    /// Intensity increment this category adds to the baseline.
    #[must_use]
    pub fn boost(self) -> f32 {
        match self {
            Self::Fear | Self::Sadness => 0.3,
            Self::Joy | Self::Surprise => 0.4,
            Self::CareReceived => 0.5,
        }
    }
}

/// Habituation multiplier for a cumulative interaction count.
#[must_use]
pub fn decay_factor(interaction_count: u32) -> f32 {
    if interaction_count < 5 {
        1.0
    } else if interaction_count < 20 {
        0.9
    } else {
        0.8
    }
}

// ---------------------------------------------------------------------------
// Context and history
// ---------------------------------------------------------------------------

/// Direction of intensity relative to the previous update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTrajectory {
    /// First update of the session.
    Initial,
    /// Intensity went up.
    Rising,
    /// Intensity went down.
    Falling,
    /// Intensity unchanged.
    Steady,
}

/// Emotional state produced by one update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalContext {
    /// Resolved emotion.
    pub current_emotion: Emotion,
    /// Intensity in `[0, 1]`.
    pub intensity: f32,
    /// Stage the update ran at.
    pub stage: Stage,
    /// Cumulative interactions.
    pub interaction_count: u32,
    /// Cumulative care received.
    pub care_received: u32,
    /// Categories that matched, winner last.
    pub triggers: Vec<EmotionTrigger>,
    /// Movement against the previous intensity.
    pub trajectory: EmotionTrajectory,
    /// Free-form environment notes, e.g. `desktop = "cluttered"`.
    pub environment: BTreeMap<String, String>,
    /// Update time.
    pub at: DateTime<Utc>,
}

impl EmotionalContext {
    /// Tint `text` according to the emotion and its intensity.
    #[must_use]
    pub fn color(&self, text: &str) -> String {
        color_text(text, self.current_emotion, self.intensity)
    }
}

/// Emotion tint used by the composer pipeline.
///
/// Happy above 0.7 adds a tilde, Lonely above 0.6 adds a hesitant opener,
/// Sad above 0.5 trails off and Surprised above 0.6 adds an exclamation.
#[must_use]
pub fn color_text(text: &str, emotion: Emotion, intensity: f32) -> String {
    let trimmed = text.trim_end();
    match emotion {
        Emotion::Happy if intensity > 0.7 => {
            if trimmed.ends_with(['!', '~']) {
                trimmed.to_string()
            } else {
                format!("{trimmed}~")
            }
        }
        Emotion::Lonely if intensity > 0.6 => {
            if trimmed.starts_with("I'm a little scared") {
                trimmed.to_string()
            } else {
                format!("I'm a little scared... {trimmed}")
            }
        }
        Emotion::Sad if intensity > 0.5 => {
            if trimmed.ends_with("...") || trimmed.ends_with('…') {
                trimmed.to_string()
            } else {
                format!("{}...", trimmed.trim_end_matches(['.', '!']))
            }
        }
        Emotion::Surprised if intensity > 0.6 => {
            if ["Eh", "Huh", "What"].iter().any(|p| trimmed.starts_with(p)) {
                trimmed.to_string()
            } else {
                format!("Eh? {trimmed}")
            }
        }
        _ => trimmed.to_string(),
    }
}

/// One entry of the rolling history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    /// When the update happened.
    pub at: DateTime<Utc>,
    /// Resolved emotion.
    pub emotion: Emotion,
    /// Resolved intensity.
    pub intensity: f32,
    /// Stage at the time.
    pub stage: Stage,
    /// Cumulative interactions at the time.
    pub interaction_count: u32,
}

/// Trend over the last three records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTrend {
    /// Fewer than three records.
    InsufficientData,
    /// Latest above the oldest of the three.
    Increasing,
    /// Latest below the oldest of the three.
    Decreasing,
    /// Equal.
    Stable,
}

impl fmt::Display for EmotionTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InsufficientData => "insufficient_data",
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        })
    }
}

/// Aggregate view of recent emotions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSummary {
    /// Most frequent emotion in the window; `None` with no history.
    pub dominant: Option<Emotion>,
    /// Mean intensity over the window.
    pub average_intensity: f32,
    /// Per-emotion counts over the window.
    pub distribution: BTreeMap<Emotion, usize>,
    /// Records currently held in history.
    pub total_records: usize,
    /// Recent trend.
    pub trend: EmotionTrend,
}

// ---------------------------------------------------------------------------
// Blender
// ---------------------------------------------------------------------------

/// Per-session emotion state.
#[derive(Debug, Clone)]
pub struct EmotionBlender {
    history: VecDeque<EmotionRecord>,
    cap: usize,
    last: Option<EmotionalContext>,
    environment: BTreeMap<String, String>,
}

impl Default for EmotionBlender {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl EmotionBlender {
    /// A blender keeping at most `history_cap` records (minimum 1).
    #[must_use]
    pub fn new(history_cap: usize) -> Self {
        let cap = history_cap.max(1);
        Self {
            history: VecDeque::with_capacity(cap),
            cap,
            last: None,
            environment: BTreeMap::new(),
        }
    }

    /// Set a free-form environment factor carried on later contexts.
    pub fn set_environment_factor(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(key.into(), value.into());
    }

    /// Resolve the emotion for `text` at `stage` and record it.
    pub fn update(
        &mut self,
        text: &str,
        stage: Stage,
        counters: &InteractionCounters,
        now: DateTime<Utc>,
    ) -> EmotionalContext {
        let mut triggers: Vec<EmotionTrigger> = EmotionTrigger::SENTIMENT
            .into_iter()
            .find(|t| contains_any(text, t.keywords()))
            .into_iter()
            .collect();
        if contains_any(text, EmotionTrigger::CareReceived.keywords()) {
            triggers.push(EmotionTrigger::CareReceived);
        }

        let (emotion, intensity) = match triggers.last() {
            Some(winner) => {
                let emotion = winner.emotion();
                let raw = (baseline(stage, emotion) + winner.boost()).min(1.0);
                (emotion, raw * decay_factor(counters.interaction_count))
            }
            None => (Emotion::Curious, baseline(stage, Emotion::Curious)),
        };

        let trajectory = match self.last.as_ref().map(|c| c.intensity) {
            None => EmotionTrajectory::Initial,
            Some(prior) if (intensity - prior).abs() < f32::EPSILON => EmotionTrajectory::Steady,
            Some(prior) if intensity > prior => EmotionTrajectory::Rising,
            Some(_) => EmotionTrajectory::Falling,
        };

        let ctx = EmotionalContext {
            current_emotion: emotion,
            intensity,
            stage,
            interaction_count: counters.interaction_count,
            care_received: counters.care_count,
            triggers,
            trajectory,
            environment: self.environment.clone(),
            at: now,
        };

        if self.history.len() == self.cap {
            self.history.pop_front();
        }
        self.history.push_back(EmotionRecord {
            at: now,
            emotion,
            intensity,
            stage,
            interaction_count: counters.interaction_count,
        });
        debug!(emotion = %emotion, intensity, stage = %stage, "Emotion updated");

        self.last = Some(ctx.clone());
        ctx
    }

    /// The most recent context, if any update has happened.
    #[must_use]
    pub fn current(&self) -> Option<&EmotionalContext> {
        self.last.as_ref()
    }

    /// Rolling history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &EmotionRecord> {
        self.history.iter()
    }

    /// Number of records held.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Summary over the most recent records.
    #[must_use]
    pub fn summary(&self) -> EmotionSummary {
        let skip = self.history.len().saturating_sub(SUMMARY_WINDOW);
        let window: Vec<&EmotionRecord> = self.history.iter().skip(skip).collect();

        let mut distribution = BTreeMap::new();
        let mut total = 0.0_f32;
        for r in &window {
            *distribution.entry(r.emotion).or_insert(0_usize) += 1;
            total += r.intensity;
        }
        let dominant = distribution
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(e, _)| *e);
        #[allow(clippy::cast_precision_loss)]
        let average_intensity = if window.is_empty() {
            0.0
        } else {
            total / window.len() as f32
        };

        EmotionSummary {
            dominant,
            average_intensity,
            distribution,
            total_records: self.history.len(),
            trend: self.trend(),
        }
    }

    fn trend(&self) -> EmotionTrend {
        let n = self.history.len();
        if n < 3 {
            return EmotionTrend::InsufficientData;
        }
        let first = self.history[n - 3].intensity;
        let last = self.history[n - 1].intensity;
        if (last - first).abs() < f32::EPSILON {
            EmotionTrend::Stable
        } else if last > first {
            EmotionTrend::Increasing
        } else {
            EmotionTrend::Decreasing
        }
    }
}
