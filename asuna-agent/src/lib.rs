//! # asuna-agent: Per-Session Orchestration
//!
//! Wires the character core to its outer collaborators:
//!
//! - [`session::CharacterSession`]: the explicit session object. One user
//!   turn goes through observe, persist, then compose.
//! - [`composer::ResponseComposer`]: generative replies with a template
//!   fallback that never fails.
//! - [`scheduler::Scheduler`]: background behaviors on independent timers,
//!   delivered through [`events::CallbackRegistry`].
//! - [`telemetry`]: `tracing` subscriber setup from `[general]`.
//!
//! ```no_run
//! # async fn demo() -> asuna_core::error::Result<()> {
//! use asuna_agent::SessionBuilder;
//! use asuna_core::AsunaConfig;
//!
//! let session = SessionBuilder::new(AsunaConfig::default()).build()?;
//! let outcome = session.process_interaction("hello, are you okay?").await;
//! println!("[{}] {}", outcome.stage, outcome.reply);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod composer;
pub mod events;
pub mod phrases;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use composer::{AiMode, ComposerMode, ResponseComposer, ResponseSource};
pub use events::{AutonomousEvent, BehaviorCategory, CallbackRegistry, EventPayload, EventSink, FnSink, SinkError};
pub use scheduler::{ActionGenerator, Scheduler, SchedulerHandle};
pub use session::{CharacterSession, InteractionOutcome, SessionBuilder, SessionStatus};
pub use telemetry::init_tracing;
