//! # Asuna Core Library
//!
//! Stage-driven state of a persona companion character.
//!
//! A session's character moves through four memory-recovery stages:
//!
//! - **Anxious**: first day, cautious and terse
//! - **Relaxed**: curious and gentle, everyday memories return
//! - **Trusting**: lively, plans things together
//! - **Dependent**: complete bond, caring and devoted
//!
//! The stage is derived from elapsed time and interaction counters by the
//! [`stage::StageClock`]. Narrative fragments unlock through the
//! [`ledger::MemoryLedger`], and the [`emotion::EmotionBlender`] keeps a
//! decaying emotional state that colors generated text.
//!
//! Nothing in this crate performs I/O except [`persistence`]; time and
//! environment are injected through the [`clock`] seams.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod character;
pub mod clock;
pub mod config;
pub mod emotion;
pub mod error;
pub mod language;
pub mod ledger;
pub mod persistence;
pub mod persona;
pub mod stage;
pub mod types;

pub use character::{CharacterState, Observation};
pub use config::AsunaConfig;
pub use error::AsunaError;
pub use ledger::{MemoryFragment, MemoryLedger, RecoveredFragment};
pub use types::*;
