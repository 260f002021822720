//! Autonomous events and the sinks that receive them.
//!
//! The scheduler hands every event to a [`CallbackRegistry`], which fans it
//! out to the sinks registered for that event's [`BehaviorCategory`]. A
//! failing sink is logged and skipped; the others still run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use asuna_core::types::{FragmentId, Stage};

/// Kind of unprompted behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorCategory {
    /// Looking around the virtual space.
    EnvironmentCheck,
    /// Sweeping the ledger for recoverable memories.
    MemoryRecovery,
    /// Starting a conversation.
    ProactiveChat,
    /// Simulated file housekeeping.
    FileOrganization,
}

impl BehaviorCategory {
    /// Every category, in scheduling order.
    pub const ALL: [BehaviorCategory; 4] = [
        BehaviorCategory::EnvironmentCheck,
        BehaviorCategory::MemoryRecovery,
        BehaviorCategory::ProactiveChat,
        BehaviorCategory::FileOrganization,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnvironmentCheck => "environment_check",
            Self::MemoryRecovery => "memory_recovery",
            Self::ProactiveChat => "proactive_chat",
            Self::FileOrganization => "file_organization",
        }
    }
}

impl fmt::Display for BehaviorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an autonomous behavior produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Result of looking around the virtual space.
    EnvironmentReport {
        /// In-character report.
        report: String,
        /// Items looked at.
        items_checked: u32,
        /// Items that looked unfamiliar.
        flagged: u32,
    },
    /// Fragments recovered by a sweep, a stage change or a conversation turn.
    MemoryRecovered {
        /// Ids of the newly unlocked fragments.
        fragments: Vec<FragmentId>,
        /// In-character announcement.
        message: String,
    },
    /// An unprompted line of dialogue.
    ProactiveMessage {
        /// What she says.
        text: String,
    },
    /// Result of a housekeeping pass.
    Housekeeping {
        /// In-character summary.
        summary: String,
        /// Items touched.
        items: u32,
    },
}

impl EventPayload {
    /// The human-readable line carried by the payload.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::EnvironmentReport { report, .. } => report,
            Self::MemoryRecovered { message, .. } => message,
            Self::ProactiveMessage { text } => text,
            Self::Housekeeping { summary, .. } => summary,
        }
    }
}

/// One fired behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousEvent {
    /// Which behavior fired.
    pub category: BehaviorCategory,
    /// Stage at the time it fired.
    pub stage: Stage,
    /// What it produced.
    pub payload: EventPayload,
    /// When it fired.
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Why a sink could not take an event.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The receiver is gone (window closed, channel dropped).
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The receiver refused the event.
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Receiver of autonomous events (UI, notifications, logs).
pub trait EventSink: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    /// Any failure; the registry logs it and moves on.
    fn deliver(&self, event: &AutonomousEvent) -> Result<(), SinkError>;
}

/// Adapts a closure into an [`EventSink`].
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(&AutonomousEvent) -> Result<(), SinkError> + Send + Sync,
{
    /// Wrap `f`.
    #[must_use]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventSink for FnSink<F>
where
    F: Fn(&AutonomousEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, event: &AutonomousEvent) -> Result<(), SinkError> {
        (self.0)(event)
    }
}

/// Outcome of fanning one event out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sinks that accepted the event.
    pub delivered: usize,
    /// Sinks that failed.
    pub failed: usize,
}

/// Sinks registered per category, called in registration order.
#[derive(Default)]
pub struct CallbackRegistry {
    sinks: RwLock<BTreeMap<BehaviorCategory, Vec<Arc<dyn EventSink>>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks = self.sinks.read();
        let counts: BTreeMap<_, _> = sinks.iter().map(|(c, v)| (*c, v.len())).collect();
        f.debug_struct("CallbackRegistry").field("sinks", &counts).finish()
    }
}

impl CallbackRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sink for `category`.
    pub fn register(&self, category: BehaviorCategory, sink: Arc<dyn EventSink>) {
        self.sinks.write().entry(category).or_default().push(sink);
        debug!(category = %category, "Event sink registered");
    }

    /// Number of sinks for `category`.
    #[must_use]
    pub fn sink_count(&self, category: BehaviorCategory) -> usize {
        self.sinks.read().get(&category).map_or(0, Vec::len)
    }

    /// Deliver `event` to every sink of its category.
    ///
    /// The sink list is snapshotted first, so a sink may register further
    /// sinks without deadlocking.
    pub fn dispatch(&self, event: &AutonomousEvent) -> DispatchReport {
        let sinks: Vec<Arc<dyn EventSink>> = self
            .sinks
            .read()
            .get(&event.category)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for sink in sinks {
            match sink.deliver(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(category = %event.category, error = %e, "Event sink failed");
                }
            }
        }
        report
    }
}
