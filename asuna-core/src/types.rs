//! Core type definitions for the companion character.
//!
//! All types are serializable so they can cross the persistence and
//! event-sink boundaries unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Relationship Stage
// ---------------------------------------------------------------------------

/// Memory-recovery stage of the character, in strict forward order.
///
/// The derived `Ord` follows declaration order, so `Anxious < Relaxed <
/// Trusting < Dependent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First day: cautious, terse, checks everything.
    Anxious,
    /// Curious and gentle; dependence starts to show.
    Relaxed,
    /// Lively caretaker who plans things together.
    Trusting,
    /// Full trust and deep emotional bond.
    Dependent,
}

impl Stage {
    /// All stages in progression order.
    pub const ALL: [Stage; 4] = [
        Stage::Anxious,
        Stage::Relaxed,
        Stage::Trusting,
        Stage::Dependent,
    ];

    /// Stable lowercase name, used in logs and persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anxious => "anxious",
            Self::Relaxed => "relaxed",
            Self::Trusting => "trusting",
            Self::Dependent => "dependent",
        }
    }

    /// The stage that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Anxious => Some(Self::Relaxed),
            Self::Relaxed => Some(Self::Trusting),
            Self::Trusting => Some(Self::Dependent),
            Self::Dependent => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anxious" => Ok(Self::Anxious),
            "relaxed" => Ok(Self::Relaxed),
            "trusting" => Ok(Self::Trusting),
            "dependent" => Ok(Self::Dependent),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Personality
// ---------------------------------------------------------------------------

/// Closed set of personality traits that dominate at each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityTrait {
    /// Wary of the unknown.
    Cautious,
    /// Reasons things out before acting.
    Rational,
    /// Probes with confirming questions.
    Tentative,
    /// Wants to know how things work.
    Curious,
    /// Soft-spoken and warm.
    Gentle,
    /// Budding reliance on the companion.
    Dependent,
    /// Playful and energetic.
    Lively,
    /// Takes the initiative.
    Active,
    /// Keeps promises and plans ahead.
    Responsible,
    /// Looks after the companion's wellbeing.
    Caring,
}

impl PersonalityTrait {
    /// Lowercase label used in prompts.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cautious => "cautious",
            Self::Rational => "rational",
            Self::Tentative => "tentative",
            Self::Curious => "curious",
            Self::Gentle => "gentle",
            Self::Dependent => "dependent",
            Self::Lively => "lively",
            Self::Active => "active",
            Self::Responsible => "responsible",
            Self::Caring => "caring",
        }
    }
}

impl fmt::Display for PersonalityTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

/// The character's discrete emotion labels.
///
/// There is no separate fear label: fear-like reactions are expressed as
/// [`Emotion::Lonely`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    /// Joy, warmth, feeling cared for.
    Happy,
    /// Interest; also the neutral default.
    Curious,
    /// Disappointment or grief.
    Sad,
    /// Isolation; stands in for fear.
    Lonely,
    /// Irritation.
    Angry,
    /// Startled by something unexpected.
    Surprised,
}

impl Emotion {
    /// All emotions, in a fixed order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Curious,
        Emotion::Sad,
        Emotion::Lonely,
        Emotion::Angry,
        Emotion::Surprised,
    ];

    /// Lowercase label used in prompts and history records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Curious => "curious",
            Self::Sad => "sad",
            Self::Lonely => "lonely",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Interaction Counters
// ---------------------------------------------------------------------------

/// Monotonically increasing counters that feed the stage clock and the
/// ledger's counter triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounters {
    /// Every user utterance.
    pub interaction_count: u32,
    /// Utterances containing a reassurance phrase.
    pub care_count: u32,
    /// Utterances proposing a collaborative task.
    pub tasks_completed: u32,
}

impl InteractionCounters {
    /// Read one counter by kind.
    #[must_use]
    pub fn get(&self, kind: CounterKind) -> u32 {
        match kind {
            CounterKind::Interactions => self.interaction_count,
            CounterKind::Care => self.care_count,
            CounterKind::Tasks => self.tasks_completed,
        }
    }

    /// True when every counter in `self` is at least the one in `other`.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.interaction_count >= other.interaction_count
            && self.care_count >= other.care_count
            && self.tasks_completed >= other.tasks_completed
    }
}

/// Selects one of the [`InteractionCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// `interaction_count`.
    Interactions,
    /// `care_count`.
    Care,
    /// `tasks_completed`.
    Tasks,
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interactions => "interactions",
            Self::Care => "care",
            Self::Tasks => "tasks",
        })
    }
}

// ---------------------------------------------------------------------------
// Fragment identity
// ---------------------------------------------------------------------------

/// Stable identifier of a memory fragment (e.g. `"basic_identity"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentId(pub String);

impl FragmentId {
    /// Wrap a string id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FragmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Case-insensitive substring test used by every keyword rule in the crate.
#[must_use]
pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .any(|k| lowered.contains(&k.to_lowercase()))
}
