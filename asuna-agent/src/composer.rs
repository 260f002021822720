//! # Response Composer
//!
//! Turns a user utterance plus the character's current stage, emotion and
//! recovered memories into one in-character reply.
//!
//! ## Modes
//!
//! - **Generative**: a [`TextGenerator`] is configured. The prompt embeds
//!   the stage profile, the emotion and the memory context. Any failure
//!   (timeout, transport, empty or denylisted output) falls back to the
//!   phrase tables; the caller never sees an error.
//! - **Template-only**: fixed at construction when no usable generator
//!   exists. Queryable through [`ResponseComposer::mode`].
//!
//! ## Post-processing
//!
//! Both modes share one pipeline: vocabulary substitution, emotion tint,
//! stage tone, the early-stage length cap, then the forbidden-phrase check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Timelike, Utc};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, warn};

use asuna_core::config::AsunaConfig;
use asuna_core::emotion::EmotionalContext;
use asuna_core::language::{self, ANXIOUS_MAX_CHARS, FORBIDDEN_PHRASES};
use asuna_core::ledger::MemoryFragment;
use asuna_core::persona;
use asuna_core::types::Stage;
use asuna_llm::prompt::{self, NO_MEMORIES, PERSONA_SYSTEM, PERSONA_USER};
use asuna_llm::{LlmRequest, TextGenerator};

use crate::phrases::{self, HAZY_FALLBACK, Intent};

/// Slack added on top of the request's own timeout for the outer guard.
const OUTER_TIMEOUT_GRACE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Modes and results
// ---------------------------------------------------------------------------

/// How the composer was configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ComposerMode {
    /// A text generator is available.
    Generative,
    /// Templates only, for the stated reason.
    TemplateOnly {
        /// Why generation is off (missing key, no provider, ...).
        reason: String,
    },
}

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Produced by the text generator.
    Generative,
    /// Picked from the phrase tables in template-only mode.
    Template,
    /// Picked from the phrase tables after generation failed.
    Fallback,
}

/// What the session reports about its AI backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    /// Generation is configured and the last call succeeded (or none yet).
    Generative,
    /// Generation is configured but the last call fell back.
    Fallback,
    /// Generation is not configured.
    TemplateOnly,
}

/// One composed reply.
#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    /// Final text after post-processing.
    pub text: String,
    /// Where it came from.
    pub source: ResponseSource,
    /// Intent used for template selection, when templates were used.
    pub intent: Option<&'static str>,
    /// Wall time spent composing.
    pub latency_ms: u64,
}

/// Everything the composer reads about the character for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    /// Current stage.
    pub stage: Stage,
    /// Emotion resolved for this turn.
    pub emotion: &'a EmotionalContext,
    /// Fragments unlocked by this turn.
    pub unlocked: &'a [MemoryFragment],
    /// Every recovered memory, formatted one per line.
    pub memories: &'a str,
    /// Time of the turn.
    pub now: DateTime<Utc>,
}

/// Tunables taken from configuration.
#[derive(Debug, Clone)]
pub struct ComposerSettings {
    /// Tint, tone and cap are applied only when true.
    pub persona_enabled: bool,
    /// Vocabulary substitution is applied only when true.
    pub vocabulary_enabled: bool,
    /// Token limit per generation.
    pub max_tokens: u32,
    /// Generated text is cut to this many characters.
    pub max_reply_chars: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self::from_config(&AsunaConfig::default())
    }
}

impl ComposerSettings {
    /// Settings from the `[persona]` and `[llm]` sections.
    #[must_use]
    pub fn from_config(config: &AsunaConfig) -> Self {
        Self {
            persona_enabled: config.persona.enabled,
            vocabulary_enabled: config.persona.vocabulary,
            max_tokens: config.llm.max_tokens,
            max_reply_chars: config.llm.max_reply_chars,
            request_timeout: config.llm.request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Produces replies, generative when possible and templated otherwise.
pub struct ResponseComposer {
    generator: Option<Arc<dyn TextGenerator>>,
    mode: ComposerMode,
    settings: ComposerSettings,
    rng: Mutex<StdRng>,
    last_source: Mutex<Option<ResponseSource>>,
}

impl std::fmt::Debug for ResponseComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseComposer")
            .field("mode", &self.mode)
            .field("settings", &self.settings)
            .field("last_source", &*self.last_source.lock())
            .finish_non_exhaustive()
    }
}

impl ResponseComposer {
    /// Composer backed by `generator`, or template-only when it is `None`
    /// or reports itself unavailable.
    #[must_use]
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        settings: ComposerSettings,
        seed: Option<u64>,
    ) -> Self {
        let (generator, mode) = match generator {
            Some(g) if g.is_available() => (Some(g), ComposerMode::Generative),
            Some(_) => (
                None,
                ComposerMode::TemplateOnly {
                    reason: "text generator reports no backend".to_string(),
                },
            ),
            None => (
                None,
                ComposerMode::TemplateOnly {
                    reason: "no text generator configured".to_string(),
                },
            ),
        };
        Self::build(generator, mode, settings, seed)
    }

    /// Template-only composer with an explicit reason.
    #[must_use]
    pub fn template_only(reason: impl Into<String>, settings: ComposerSettings, seed: Option<u64>) -> Self {
        Self::build(
            None,
            ComposerMode::TemplateOnly {
                reason: reason.into(),
            },
            settings,
            seed,
        )
    }

    fn build(
        generator: Option<Arc<dyn TextGenerator>>,
        mode: ComposerMode,
        settings: ComposerSettings,
        seed: Option<u64>,
    ) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        if let ComposerMode::TemplateOnly { reason } = &mode {
            warn!(reason = %reason, "Response composer running in template-only mode");
        }
        Self {
            generator,
            mode,
            settings,
            rng: Mutex::new(rng),
            last_source: Mutex::new(None),
        }
    }

    /// Mode fixed at construction.
    #[must_use]
    pub fn mode(&self) -> &ComposerMode {
        &self.mode
    }

    /// Backend state as seen by the last call.
    #[must_use]
    pub fn ai_mode(&self) -> AiMode {
        match (&self.mode, *self.last_source.lock()) {
            (ComposerMode::TemplateOnly { .. }, _) => AiMode::TemplateOnly,
            (ComposerMode::Generative, Some(ResponseSource::Fallback)) => AiMode::Fallback,
            (ComposerMode::Generative, _) => AiMode::Generative,
        }
    }

    /// Compose a reply. Never fails.
    pub async fn compose(&self, text: &str, ctx: &ComposeContext<'_>) -> Composition {
        let started = Instant::now();

        if let Some(generator) = self.generator.as_ref() {
            let request = self.build_request(text, ctx);
            let guard = self.settings.request_timeout + OUTER_TIMEOUT_GRACE;

            match tokio::time::timeout(guard, generator.generate(&request)).await {
                Ok(Ok(response)) => {
                    let raw = language::cap_length(response.text.trim(), self.settings.max_reply_chars);
                    if raw.is_empty() {
                        warn!("Generator returned blank text, using templates");
                    } else if let Some(final_text) = self.post_process(&raw, ctx) {
                        debug!(
                            stage = %ctx.stage,
                            latency_ms = response.latency_ms,
                            tokens = response.tokens_generated,
                            "Generated reply"
                        );
                        return self.finish(final_text, ResponseSource::Generative, None, started);
                    } else {
                        warn!(stage = %ctx.stage, "Generated reply hit the phrase filter, using templates");
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "Text generation failed, using templates"),
                Err(_) => warn!(
                    timeout_ms = u64::try_from(guard.as_millis()).unwrap_or(u64::MAX),
                    "Text generation timed out, using templates"
                ),
            }

            let (text, intent) = self.pick_template(text, ctx);
            return self.finish(text, ResponseSource::Fallback, Some(intent), started);
        }

        let (text, intent) = self.pick_template(text, ctx);
        self.finish(text, ResponseSource::Template, Some(intent), started)
    }

    /// Template selection alone, without touching the generator.
    #[must_use]
    pub fn compose_template(&self, text: &str, ctx: &ComposeContext<'_>) -> Composition {
        let started = Instant::now();
        let (text, intent) = self.pick_template(text, ctx);
        self.finish(text, ResponseSource::Template, Some(intent), started)
    }

    fn finish(
        &self,
        text: String,
        source: ResponseSource,
        intent: Option<Intent>,
        started: Instant,
    ) -> Composition {
        *self.last_source.lock() = Some(source);
        Composition {
            text,
            source,
            intent: intent.map(Intent::as_str),
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Try the stage/intent candidates in random order; the first that
    /// passes the filter wins.
    fn pick_template(&self, text: &str, ctx: &ComposeContext<'_>) -> (String, Intent) {
        let intent = phrases::detect_intent(text);
        let mut candidates = phrases::replies(ctx.stage, intent).to_vec();
        candidates.shuffle(&mut *self.rng.lock());

        let chosen = candidates
            .into_iter()
            .find_map(|line| self.post_process(line, ctx))
            .unwrap_or_else(|| HAZY_FALLBACK.to_string());
        (chosen, intent)
    }

    /// The shared pipeline. `None` when the result contains a denylisted
    /// phrase.
    fn post_process(&self, raw: &str, ctx: &ComposeContext<'_>) -> Option<String> {
        let profile = persona::profile(ctx.stage);
        let mut text = if self.settings.vocabulary_enabled {
            language::apply_vocabulary(raw, profile.vocabulary_density, &mut *self.rng.lock())
        } else {
            raw.to_string()
        };

        if self.settings.persona_enabled {
            text = ctx.emotion.color(&text);
            text = language::apply_stage_tone(&text, ctx.stage);
            if ctx.stage == Stage::Anxious {
                text = language::cap_length(&text, ANXIOUS_MAX_CHARS);
            }
        }

        if language::contains_forbidden(&text) {
            None
        } else {
            Some(text)
        }
    }

    fn build_request(&self, text: &str, ctx: &ComposeContext<'_>) -> LlmRequest {
        let profile = persona::profile(ctx.stage);
        let local = ctx.now.with_timezone(&Local);

        let mut memories = if ctx.memories.trim().is_empty() {
            NO_MEMORIES.to_string()
        } else {
            ctx.memories.trim_end().to_string()
        };
        if !ctx.unlocked.is_empty() {
            memories.push_str("\nJust recovered:");
            for fragment in ctx.unlocked {
                memories.push_str("\n- ");
                memories.push_str(fragment.content());
            }
        }

        let forbidden = FORBIDDEN_PHRASES
            .iter()
            .map(|p| format!("\"{p}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let intensity = format!("{:.2}", ctx.emotion.intensity);
        let now = local.format("%Y-%m-%d %H:%M").to_string();
        let max_chars = self.settings.max_reply_chars.to_string();
        let traits = profile.trait_list();

        let system = prompt::render_template(
            PERSONA_SYSTEM,
            &[
                ("stage", ctx.stage.as_str()),
                ("descriptor", profile.descriptor),
                ("traits", &traits),
                ("speech_style", profile.speech_style),
                ("emotion", ctx.emotion.current_emotion.as_str()),
                ("intensity", &intensity),
                ("now", &now),
                ("forbidden", &forbidden),
                ("max_chars", &max_chars),
                ("memories", &memories),
            ],
        );
        let user = prompt::render_template(
            PERSONA_USER,
            &[
                ("time_tag", prompt::time_of_day_tag(local.hour())),
                ("stage_tag", stage_tag(ctx.stage)),
                ("text", text),
            ],
        );

        LlmRequest::new(system, user)
            .with_temperature(profile.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_timeout(u64::try_from(self.settings.request_timeout.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Interaction tag placed in front of the user prompt.
#[must_use]
pub fn stage_tag(stage: Stage) -> &'static str {
    match stage {
        Stage::Anxious => "survey",
        Stage::Relaxed => "daily",
        Stage::Trusting | Stage::Dependent => "trusted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asuna_core::emotion::EmotionBlender;
    use asuna_core::types::InteractionCounters;
    use asuna_llm::{GenerateFuture, LlmError, LlmResponse};

    /// Generator that replies with a fixed line and records the request.
    struct Scripted {
        reply: Result<String, u64>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    impl TextGenerator for Scripted {
        fn generate<'a>(&'a self, request: &'a LlmRequest) -> GenerateFuture<'a> {
            self.seen.lock().push(request.clone());
            let result = match &self.reply {
                Ok(text) => Ok(LlmResponse {
                    text: text.clone(),
                    tokens_generated: 5,
                    latency_ms: 1,
                    model: "scripted".into(),
                }),
                Err(ms) => Err(LlmError::Timeout(*ms)),
            };
            Box::pin(async move { result })
        }
    }

    fn scripted(reply: Result<&str, u64>) -> Arc<Scripted> {
        Arc::new(Scripted {
            reply: reply.map(str::to_string),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn emotion_for(text: &str, stage: Stage) -> EmotionalContext {
        EmotionBlender::new(10).update(text, stage, &InteractionCounters::default(), Utc::now())
    }

    fn ctx<'a>(stage: Stage, emotion: &'a EmotionalContext) -> ComposeContext<'a> {
        ComposeContext {
            stage,
            emotion,
            unlocked: &[],
            memories: "",
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn template_only_without_generator() {
        let composer = ResponseComposer::new(None, ComposerSettings::default(), Some(7));
        assert!(matches!(composer.mode(), ComposerMode::TemplateOnly { .. }));

        let emotion = emotion_for("hello", Stage::Relaxed);
        let out = composer.compose("hello", &ctx(Stage::Relaxed, &emotion)).await;
        assert_eq!(out.source, ResponseSource::Template);
        assert_eq!(out.intent, Some("greeting"));
        assert!(out.text.ends_with('~'));
        assert_eq!(composer.ai_mode(), AiMode::TemplateOnly);
    }

    #[tokio::test]
    async fn generative_reply_is_post_processed() {
        let generator = scripted(Ok("I will guard the computer tonight."));
        let composer = ResponseComposer::new(
            Some(generator.clone() as Arc<dyn TextGenerator>),
            ComposerSettings::default(),
            Some(1),
        );
        let emotion = emotion_for("hello", Stage::Trusting);
        let out = composer.compose("hello", &ctx(Stage::Trusting, &emotion)).await;

        assert_eq!(out.source, ResponseSource::Generative);
        assert!(out.text.ends_with('♡'));
        assert_eq!(composer.ai_mode(), AiMode::Generative);

        let seen = generator.seen.lock();
        let request = seen.first().expect("one request");
        assert!(request.user.contains("[trusted]"));
        assert!(request.system.contains("trusting"));
        assert!((request.temperature - 0.8).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn anxious_request_runs_cooler() {
        let generator = scripted(Ok("Who are you."));
        let composer = ResponseComposer::new(
            Some(generator.clone() as Arc<dyn TextGenerator>),
            ComposerSettings::default(),
            Some(1),
        );
        let emotion = emotion_for("hi", Stage::Anxious);
        let out = composer.compose("hi", &ctx(Stage::Anxious, &emotion)).await;
        assert!(out.text.ends_with('?'));
        let seen = generator.seen.lock();
        assert!((seen[0].temperature - 0.7).abs() < f32::EPSILON);
        assert!(seen[0].user.contains("[survey]"));
        assert!(seen[0].system.contains(NO_MEMORIES));
    }

    #[tokio::test]
    async fn timeout_falls_back_to_templates() {
        let composer = ResponseComposer::new(
            Some(scripted(Err(8000)) as Arc<dyn TextGenerator>),
            ComposerSettings::default(),
            Some(3),
        );
        let emotion = emotion_for("hello", Stage::Relaxed);
        let out = composer.compose("hello", &ctx(Stage::Relaxed, &emotion)).await;
        assert_eq!(out.source, ResponseSource::Fallback);
        assert!(!out.text.is_empty());
        assert_eq!(composer.ai_mode(), AiMode::Fallback);
        assert_eq!(composer.mode(), &ComposerMode::Generative);
    }

    #[tokio::test]
    async fn denylisted_generation_is_replaced() {
        let composer = ResponseComposer::new(
            Some(scripted(Ok("Whatever, hurry up.")) as Arc<dyn TextGenerator>),
            ComposerSettings::default(),
            Some(3),
        );
        let emotion = emotion_for("hello", Stage::Dependent);
        let out = composer.compose("hello", &ctx(Stage::Dependent, &emotion)).await;
        assert_eq!(out.source, ResponseSource::Fallback);
        assert!(!language::contains_forbidden(&out.text));
    }

    #[test]
    fn anxious_templates_respect_cap() {
        let composer = ResponseComposer::new(None, ComposerSettings::default(), Some(11));
        let emotion = emotion_for("I'm scared", Stage::Anxious);
        for _ in 0..50 {
            let out = composer.compose_template("tell me about yourself", &ctx(Stage::Anxious, &emotion));
            assert!(out.text.chars().count() <= ANXIOUS_MAX_CHARS + 3, "{}", out.text);
        }
    }

    #[test]
    fn persona_disabled_skips_tone() {
        let settings = ComposerSettings {
            persona_enabled: false,
            vocabulary_enabled: false,
            ..ComposerSettings::default()
        };
        let composer = ResponseComposer::new(None, settings, Some(5));
        let emotion = emotion_for("hello", Stage::Relaxed);
        let out = composer.compose_template("hello", &ctx(Stage::Relaxed, &emotion));
        assert!(phrases::replies(Stage::Relaxed, Intent::Greeting).contains(&out.text.as_str()));
    }

    #[test]
    fn stage_tags() {
        assert_eq!(stage_tag(Stage::Anxious), "survey");
        assert_eq!(stage_tag(Stage::Relaxed), "daily");
        assert_eq!(stage_tag(Stage::Dependent), "trusted");
    }
}
