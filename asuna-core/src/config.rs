//! Configuration for the companion character.
//!
//! Maps directly to `asuna.toml`. Every section and field has a default,
//! so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides `[llm] api_key`.
pub const API_KEY_ENV: &str = "ASUNA_API_KEY";

/// Placeholder shipped in sample configs; treated as "no key".
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsunaConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Persona feature toggles.
    #[serde(default)]
    pub persona: PersonaConfig,
    /// Text-generation backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Autonomous behavior timers.
    #[serde(default)]
    pub autonomous: AutonomousConfig,
    /// Emotion blender settings.
    #[serde(default)]
    pub emotion: EmotionConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AsunaConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `AsunaError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::AsunaError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply overrides from the process environment.
    ///
    /// Currently only [`API_KEY_ENV`]; an empty value is ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Persona feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Apply persona post-processing (emotion tint, stage tone, length cap).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allow the autonomous scheduler to start.
    #[serde(default = "default_true")]
    pub autonomous_behavior: bool,
    /// Apply in-fiction vocabulary substitution.
    #[serde(default = "default_true")]
    pub vocabulary: bool,
    /// Profile key in the persistent store.
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            autonomous_behavior: true,
            vocabulary: true,
            user_id: default_user_id(),
        }
    }
}

/// Text-generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "openai", "ollama" or "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL of the API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Hard timeout for one generation call in milliseconds.
    #[serde(default = "default_8000")]
    pub request_timeout_ms: u64,
    /// Token limit passed to the provider.
    #[serde(default = "default_500")]
    pub max_tokens: u32,
    /// Generated replies are cut to this many characters.
    #[serde(default = "default_400")]
    pub max_reply_chars: usize,
    /// Extra attempts after a failed call.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            request_timeout_ms: 8000,
            max_tokens: 500,
            max_reply_chars: 400,
            max_retries: 0,
        }
    }
}

impl LlmConfig {
    /// Why generation cannot be used with this configuration, if it can't.
    ///
    /// `None` means the configuration is usable. Provider `none` and a
    /// missing or placeholder key for `openai` are reported here.
    #[must_use]
    pub fn credential_problem(&self) -> Option<String> {
        match self.provider.as_str() {
            "none" => Some("text generation disabled by configuration".to_string()),
            "ollama" => None,
            "openai" => match self.api_key.as_deref().map(str::trim) {
                None | Some("") => Some("missing API key".to_string()),
                Some(PLACEHOLDER_API_KEY) => Some("API key is still the placeholder".to_string()),
                Some(_) => None,
            },
            other => Some(format!("unknown provider '{other}'")),
        }
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Autonomous scheduler timers, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousConfig {
    /// Polling period of each category loop.
    #[serde(default = "default_10")]
    pub tick_secs: u64,
    /// Environment investigation interval.
    #[serde(default = "default_30")]
    pub environment_check_secs: u64,
    /// Memory-trigger sweep interval.
    #[serde(default = "default_60")]
    pub memory_trigger_secs: u64,
    /// Proactive chat interval.
    #[serde(default = "default_120")]
    pub proactive_chat_secs: u64,
    /// Housekeeping interval.
    #[serde(default = "default_300")]
    pub file_organization_secs: u64,
    /// Seed for the scheduler's random draws; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            environment_check_secs: 30,
            memory_trigger_secs: 60,
            proactive_chat_secs: 120,
            file_organization_secs: 300,
            seed: None,
        }
    }
}

/// Emotion blender settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionConfig {
    /// Rolling history capacity.
    #[serde(default = "default_100")]
    pub history_cap: usize,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self { history_cap: 100 }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Whether the session writes to a store at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use SQLite WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_db_path(),
            wal_mode: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_user_id() -> String {
    "companion".to_string()
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_db_path() -> String {
    "asuna_memory.db".to_string()
}
fn default_8000() -> u64 {
    8000
}
fn default_500() -> u32 {
    500
}
fn default_400() -> usize {
    400
}
fn default_10() -> u64 {
    10
}
fn default_30() -> u64 {
    30
}
fn default_60() -> u64 {
    60
}
fn default_120() -> u64 {
    120
}
fn default_300() -> u64 {
    300
}
fn default_100() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = AsunaConfig::from_toml("").expect("parse");
        assert_eq!(cfg.general.log_level, "info");
        assert!(cfg.persona.enabled);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.request_timeout_ms, 8000);
        assert_eq!(cfg.autonomous.tick_secs, 10);
        assert_eq!(cfg.autonomous.proactive_chat_secs, 120);
        assert_eq!(cfg.emotion.history_cap, 100);
        assert_eq!(cfg.persistence.path, "asuna_memory.db");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AsunaConfig::from_toml(
            r#"
            [persona]
            vocabulary = false

            [autonomous]
            proactive_chat_secs = 45
            seed = 7
            "#,
        )
        .expect("parse");
        assert!(!cfg.persona.vocabulary);
        assert!(cfg.persona.autonomous_behavior);
        assert_eq!(cfg.autonomous.proactive_chat_secs, 45);
        assert_eq!(cfg.autonomous.environment_check_secs, 30);
        assert_eq!(cfg.autonomous.seed, Some(7));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = AsunaConfig::from_toml("[llm\nprovider = ").expect_err("invalid");
        assert!(matches!(err, crate::AsunaError::Config(_)));
    }

    #[test]
    fn credential_problems() {
        let mut llm = LlmConfig::default();
        assert!(llm.credential_problem().is_some());

        llm.api_key = Some(PLACEHOLDER_API_KEY.to_string());
        assert!(llm.credential_problem().is_some());

        llm.api_key = Some("sk-real".to_string());
        assert!(llm.credential_problem().is_none());

        llm.provider = "none".to_string();
        assert!(llm.credential_problem().is_some());

        llm.provider = "ollama".to_string();
        llm.api_key = None;
        assert!(llm.credential_problem().is_none());
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("asuna.toml");
        std::fs::write(&path, "[general]\njson_logs = true\n").expect("write");
        let cfg = AsunaConfig::from_file(&path).expect("load");
        assert!(cfg.general.json_logs);
    }
}
