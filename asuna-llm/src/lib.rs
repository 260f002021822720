//! # asuna-llm: Text Generation for the Persona Core
//!
//! One seam and one adapter:
//!   - [`TextGenerator`]: the trait the composer calls. Any failure it
//!     returns is treated as "unavailable" upstream.
//!   - [`LlmClient`]: HTTP implementation for **Ollama** and any
//!     **OpenAI-compatible** chat-completions API.
//!
//! Every request carries its own timeout, and retries are opt-in
//! (`max_retries = 0` by default) so a slow backend can never starve the
//! foreground turn.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{GenerateFuture, LlmClient, LlmProvider, TextGenerator};
pub use error::LlmError;
pub use types::{LlmRequest, LlmResponse};
