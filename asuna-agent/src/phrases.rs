//! Canned dialogue, by stage and intent.
//!
//! Used whenever text generation is off or fails. Every line here is run
//! through the same post-processing as generated text, so plain words like
//! "files" or "computer" are left for the vocabulary pass to dress up.

use asuna_core::types::{Stage, contains_any};

/// Line used when no candidate survives filtering.
pub const HAZY_FALLBACK: &str = "Sorry... my memory feels hazy right now. Could you say that again?";

/// What the companion seems to want, sniffed from keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Hello, small talk; the default.
    Greeting,
    /// Asking about the surroundings.
    EnvironmentReport,
    /// Tired, up late, overworked.
    RestReminder,
    /// Warmth or thanks.
    Affection,
    /// Something risky or unfamiliar.
    Caution,
    /// Questions.
    Curiosity,
}

impl Intent {
    /// Every intent.
    pub const ALL: [Intent; 6] = [
        Intent::Greeting,
        Intent::EnvironmentReport,
        Intent::RestReminder,
        Intent::Affection,
        Intent::Caution,
        Intent::Curiosity,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::EnvironmentReport => "environment_report",
            Self::RestReminder => "rest_reminder",
            Self::Affection => "affection",
            Self::Caution => "caution",
            Self::Curiosity => "curiosity",
        }
    }
}

// Checked in this order; the first hit wins.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Caution,
        &["danger", "virus", "careful", "warning", "hack", "risky", "suspicious"],
    ),
    (
        Intent::RestReminder,
        &["tired", "sleep", "exhausted", "overtime", "stayed up", "take a break", "take a rest"],
    ),
    (
        Intent::Affection,
        &["love", "thank", "miss you", "like you", "hug", "cute"],
    ),
    (
        Intent::EnvironmentReport,
        &["desktop", "folder", "file", "clean up", "look around", "environment", "computer"],
    ),
    (
        Intent::Curiosity,
        &["why", "what is", "what's", "how do", "how does", "tell me", "curious", "wonder"],
    ),
];

/// Pick an intent from the utterance; [`Intent::Greeting`] when nothing matches.
#[must_use]
pub fn detect_intent(text: &str) -> Intent {
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(text, keywords))
        .map_or(Intent::Greeting, |(intent, _)| *intent)
}

/// Candidate replies for a stage and intent. Never empty.
#[must_use]
pub fn replies(stage: Stage, intent: Intent) -> &'static [&'static str] {
    match stage {
        Stage::Anxious => anxious(intent),
        Stage::Relaxed => relaxed(intent),
        Stage::Trusting => trusting(intent),
        Stage::Dependent => dependent(intent),
    }
}

fn anxious(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Greeting => &[
            "W-who are you? Where is this place",
            "I'm a little scared... can you tell me this place is safe",
            "This place... why am I here",
        ],
        Intent::EnvironmentReport => &[
            "I checked the files nearby. Nothing marked as dangerous, I think",
            "So many unknown files in this computer... are they safe",
        ],
        Intent::RestReminder => &[
            "You look tired. Shouldn't you rest",
            "Is it safe to sleep here",
        ],
        Intent::Affection => &[
            "Th-thank you. Can I really trust you",
            "You're being kind to me... why",
        ],
        Intent::Caution => &[
            "Danger? Stay behind me. Where is it",
            "Something feels wrong. Should we check it first",
        ],
        Intent::Curiosity => &[
            "You want to know about me? Only if you tell me who you are first",
            "I'm not sure I can answer that yet. Can I ask you something too",
        ],
    }
}

fn relaxed(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Greeting => &[
            "It's you! I was looking around this digital space, it's more fun than I thought",
            "Hello! I sorted some files while you were away, want to see",
            "Nice weather today, isn't it? How has your day been",
        ],
        Intent::EnvironmentReport => &[
            "I explored the computer a bit and found some interesting files",
            "Everything looks peaceful here. I even found a quiet corner to sit",
        ],
        Intent::RestReminder => &[
            "You should take a short break. Even front-liners restore their HP",
            "Let's rest for a moment, I'll keep watch",
        ],
        Intent::Affection => &[
            "Hehe, that makes me happy",
            "Thank you. I'm glad you're the one who found me",
        ],
        Intent::Caution => &[
            "Hmm, that sounds risky. Let's look at it together, carefully",
            "Leave the suspicious files to me, I'll check them",
        ],
        Intent::Curiosity => &[
            "Ooh, good question! Let me think about it with you",
            "I'm curious too. Tell me more about this world",
        ],
    }
}

fn trusting(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Greeting => &[
            "You're finally here! I came up with a new plan for today",
            "Shall we sort your work together today? I can help you organise it",
            "Welcome back! I kept everything in order while you were gone",
        ],
        Intent::EnvironmentReport => &[
            "I tidied up the computer and optimised a few things, it should feel faster now",
            "Your files are all in order. This world is safe with me around",
        ],
        Intent::RestReminder => &[
            "No more staying up late! Your HP is almost in the red",
            "You've worked hard enough. Let me make you some tea and you rest",
        ],
        Intent::Affection => &[
            "I like spending time with you, you know",
            "Thank you for always being here",
        ],
        Intent::Caution => &[
            "Don't worry, I'll handle it. Just stay close",
            "Let me scout ahead first. I've done this on the front line many times",
        ],
        Intent::Curiosity => &[
            "Let's find out together! Two heads are better than one",
            "Good question. Here's what I think, and then you tell me yours",
        ],
    }
}

fn dependent(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Greeting => &[
            "You're the most important person to me. I'll always be by your side",
            "Let's clear this quest together, just like before",
            "With you here, I'm not afraid of anything",
        ],
        Intent::EnvironmentReport => &[
            "I took care of everything in the virtual space, it's all ready for you",
            "All your files are arranged the way you like them",
        ],
        Intent::RestReminder => &[
            "Come rest with me. The work can wait until tomorrow",
            "I'll stay right here while you sleep, I promise",
        ],
        Intent::Affection => &[
            "I missed you too. Every minute",
            "Having you here is all I need",
        ],
        Intent::Caution => &[
            "No matter what comes, we'll face it together. I won't let anything hurt you",
            "Stay behind me. I'll protect you, always",
        ],
        Intent::Curiosity => &[
            "Ask me anything. I want to share everything with you",
            "Let's wonder about it together, like we used to at the cottage",
        ],
    }
}

/// Unprompted openers for the proactive-chat behavior.
#[must_use]
pub fn proactive_lines(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Anxious => &[
            "Are you still there? This place makes me a little uneasy...",
            "Can you tell me what this place is? I'm a bit scared...",
            "Is it safe here? I noticed some unknown files...",
            "Could you explain what's going on here? I'm confused...",
        ],
        Stage::Relaxed => &[
            "You're back! I found something interesting and wanted to show you!",
            "How was your day? Anything new?",
            "I want to learn more about this digital world. Will you teach me?",
            "Let's do something together, just like back in Aincrad!",
        ],
        Stage::Trusting => &[
            "You're finally here! I prepared something fun to share with you.",
            "What do you want to do today? I can help you plan it!",
            "You've been working so hard lately. Want to relax together?",
            "I thought of a new game. Let's try it together!",
        ],
        Stage::Dependent => &[
            "You're back! I've been waiting, and I have so much I want to do with you.",
            "My most important person, you're finally home! I missed you.",
            "Welcome home! I've got everything ready for today.",
            "You're the most important person to me. I'll always watch over you.",
        ],
    }
}
