//! # In-fiction Language
//!
//! Text transforms shared by the composer and the scheduler:
//!
//! - vocabulary substitution that maps mundane nouns to the persona's
//!   in-world terms, applied per match with a stage-dependent probability;
//! - stage tone suffixes and the early-stage length cap;
//! - the forbidden-phrase denylist;
//! - a rough emotional-intensity score used for diagnostics.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::types::Stage;

/// Mundane word to in-fiction replacements.
pub const VOCABULARY: &[(&str, &[&str])] = &[
    ("file", &["loot", "map data"]),
    ("files", &["loot", "map data"]),
    ("software", &["skill", "equipment"]),
    ("work", &["quest"]),
    ("user", &["companion"]),
    ("computer", &["virtual space"]),
];

/// Curt phrases the character never says.
pub const FORBIDDEN_PHRASES: &[&str] = &[
    "you're annoying",
    "hurry up",
    "i don't know",
    "whatever",
    "i don't care",
];

/// Maximum reply length while [`Stage::Anxious`].
pub const ANXIOUS_MAX_CHARS: usize = 100;

/// Expressive markers counted by [`emotional_intensity`].
const EXPRESSION_MARKERS: &[&str] = &["~", "♡", "...", "hehe", "wow", "eh?", "yay"];

/// Replace vocabulary words with in-fiction terms.
///
/// Matching is whole-word and ASCII case-insensitive. Each match is
/// replaced with probability `density`; a leading capital is preserved.
pub fn apply_vocabulary<R: Rng + ?Sized>(text: &str, density: f64, rng: &mut R) -> String {
    let density = density.clamp(0.0, 1.0);
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            word.push(ch);
            continue;
        }
        flush_word(&mut out, &mut word, density, rng);
        out.push(ch);
    }
    flush_word(&mut out, &mut word, density, rng);
    out
}

fn flush_word<R: Rng + ?Sized>(out: &mut String, word: &mut String, density: f64, rng: &mut R) {
    if word.is_empty() {
        return;
    }
    let lowered = word.to_ascii_lowercase();
    let replacement = VOCABULARY
        .iter()
        .find(|(from, _)| *from == lowered)
        .filter(|_| rng.gen_bool(density))
        .and_then(|(_, options)| options.choose(rng));

    match replacement {
        Some(term) => {
            if word.starts_with(|c: char| c.is_ascii_uppercase()) {
                out.push_str(&capitalize(term));
            } else {
                out.push_str(term);
            }
        }
        None => out.push_str(word),
    }
    word.clear();
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Whether `text` contains a denylisted phrase, ignoring case.
#[must_use]
pub fn contains_forbidden(text: &str) -> bool {
    let lowered = text.to_lowercase().replace('’', "'");
    FORBIDDEN_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Append the stage's tone marker.
///
/// Anxious ends on a question, Relaxed on a soft tilde and the later
/// stages on an affectionate heart.
#[must_use]
pub fn apply_stage_tone(text: &str, stage: Stage) -> String {
    let trimmed = text.trim_end();
    match stage {
        Stage::Anxious => {
            if trimmed.ends_with('?') {
                trimmed.to_string()
            } else if trimmed.ends_with("...") {
                format!("{trimmed}?")
            } else {
                format!("{}?", trimmed.strip_suffix('.').unwrap_or(trimmed))
            }
        }
        Stage::Relaxed => {
            if trimmed.ends_with('~') {
                trimmed.to_string()
            } else {
                format!("{trimmed}~")
            }
        }
        Stage::Trusting | Stage::Dependent => {
            if trimmed.ends_with('♡') {
                trimmed.to_string()
            } else {
                format!("{trimmed} ♡")
            }
        }
    }
}

/// Truncate to `max_chars` characters, appending `...` when cut.
#[must_use]
pub fn cap_length(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head.trim_end())
}

/// Heuristic expressiveness score in `[0, 1]`.
///
/// Each expressive marker adds 0.1 and each in-fiction term adds 0.05.
#[must_use]
pub fn emotional_intensity(text: &str) -> f32 {
    let lowered = text.to_lowercase();
    let markers = EXPRESSION_MARKERS
        .iter()
        .filter(|m| lowered.contains(*m))
        .count();
    let terms = VOCABULARY
        .iter()
        .flat_map(|(_, options)| options.iter())
        .filter(|t| lowered.contains(*t))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let score = markers as f32 * 0.1 + terms as f32 * 0.05;
    score.min(1.0)
}
