//! Text-generation client: a [`TextGenerator`] seam plus an HTTP adapter
//! for Ollama and OpenAI-compatible backends.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Boxed future returned by [`TextGenerator::generate`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>>;

/// Anything that can turn a prompt into text.
///
/// The composer only sees this trait, so tests can plug in scripted
/// generators and embedders can bring their own backend.
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `request`.
    fn generate<'a>(&'a self, request: &'a LlmRequest) -> GenerateFuture<'a>;

    /// Whether a backend is configured at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Provider backend for inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat-completions API.
    OpenAiCompatible {
        /// API root including the version, e.g. `https://api.openai.com/v1`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend; every call fails with [`LlmError::Unavailable`].
    None,
}

impl LlmProvider {
    /// Build a provider from its configured name.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown name or an
    /// OpenAI provider without a key.
    pub fn from_config(name: &str, base_url: &str, api_key: Option<&str>) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match name {
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" => match api_key.map(str::trim).filter(|k| !k.is_empty()) {
                Some(key) => Ok(Self::OpenAiCompatible {
                    base_url,
                    api_key: key.to_string(),
                }),
                None => Err(LlmError::ConfigError("openai provider needs an API key".into())),
            },
            "none" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }
}

/// Where the generated text lives in each backend's JSON.
#[derive(Debug, Clone, Copy)]
enum ResponseShape {
    Ollama,
    OpenAi,
}

impl ResponseShape {
    fn label(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    fn extract(self, json: &Value) -> (Option<&str>, u64) {
        match self {
            Self::Ollama => (json["response"].as_str(), json["eval_count"].as_u64().unwrap_or(0)),
            Self::OpenAi => (
                json["choices"][0]["message"]["content"].as_str(),
                json["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            ),
        }
    }
}

/// HTTP client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match &self.provider {
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::OpenAiCompatible { .. } => "openai",
            LlmProvider::None => "none",
        };
        f.debug_struct("LlmClient")
            .field("provider", &provider)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// A client with no backend (every call fails, callers fall back).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Generate a completion.
    ///
    /// # Errors
    /// Any transport, status, parse or empty-body failure. With retries
    /// configured, the final failure is wrapped in
    /// [`LlmError::RetriesExhausted`].
    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let url = format!("{base_url}/api/generate");
                let body = json!({
                    "model": self.model,
                    "system": request.system,
                    "prompt": request.user,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                self.send_with_retries(&url, &body, None, request, ResponseShape::Ollama)
                    .await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let url = format!("{base_url}/chat/completions");
                let body = json!({
                    "model": self.model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "stream": false,
                });
                self.send_with_retries(&url, &body, Some(api_key), request, ResponseShape::OpenAi)
                    .await
            }
        }
    }

    async fn send_with_retries(
        &self,
        url: &str,
        body: &Value,
        api_key: Option<&str>,
        request: &LlmRequest,
        shape: ResponseShape,
    ) -> Result<LlmResponse, LlmError> {
        let mut last = LlmError::Unavailable("no attempt made".into());
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    attempt = attempt + 1,
                    of = self.max_retries + 1,
                    provider = shape.label(),
                    "Retrying LLM call"
                );
            }
            match self.send_once(url, body, api_key, request, shape).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!(provider = shape.label(), error = %e, "LLM call failed");
                    last = e;
                }
            }
        }

        if self.max_retries == 0 {
            Err(last)
        } else {
            Err(LlmError::RetriesExhausted {
                attempts: self.max_retries + 1,
                last_error: last.to_string(),
            })
        }
    }

    async fn send_once(
        &self,
        url: &str,
        body: &Value,
        api_key: Option<&str>,
        request: &LlmRequest,
        shape: ResponseShape,
    ) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let mut builder = self
            .http
            .post(url)
            .json(body)
            .timeout(Duration::from_millis(request.timeout_ms));
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(request.timeout_ms)
            } else {
                LlmError::from(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("HTTP {status}: {detail}")));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        let (text, tokens) = shape.extract(&json);
        let text = text
            .ok_or_else(|| LlmError::ParseError("response has no text field".into()))?
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(LlmResponse {
            text,
            tokens_generated: u32::try_from(tokens).unwrap_or(u32::MAX),
            latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            model: self.model.clone(),
        })
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for LlmClient {
    fn generate<'a>(&'a self, request: &'a LlmRequest) -> GenerateFuture<'a> {
        Box::pin(self.complete(request))
    }

    fn is_available(&self) -> bool {
        LlmClient::is_available(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_config() {
        assert!(matches!(
            LlmProvider::from_config("ollama", "http://localhost:11434/", None),
            Ok(LlmProvider::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
        assert!(matches!(
            LlmProvider::from_config("openai", "https://api.openai.com/v1", Some("sk-x")),
            Ok(LlmProvider::OpenAiCompatible { .. })
        ));
        assert!(matches!(
            LlmProvider::from_config("openai", "https://api.openai.com/v1", Some("  ")),
            Err(LlmError::ConfigError(_))
        ));
        assert!(matches!(
            LlmProvider::from_config("llamafile", "", None),
            Err(LlmError::ConfigError(_))
        ));
        assert!(matches!(LlmProvider::from_config("none", "", None), Ok(LlmProvider::None)));
    }

    #[test]
    fn extract_shapes() {
        let ollama = json!({ "response": "hello", "eval_count": 3 });
        assert_eq!(ResponseShape::Ollama.extract(&ollama), (Some("hello"), 3));

        let openai = json!({
            "choices": [{ "message": { "content": "hi there" } }],
            "usage": { "completion_tokens": 2 }
        });
        assert_eq!(ResponseShape::OpenAi.extract(&openai), (Some("hi there"), 2));
        assert_eq!(ResponseShape::OpenAi.extract(&json!({})), (None, 0));
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .complete(&LlmRequest::new("s", "u"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let generator: Box<dyn TextGenerator> = Box::new(LlmClient::none());
        assert!(!generator.is_available());
        assert!(generator.generate(&LlmRequest::new("s", "u")).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_exhausts_retries() {
        let provider = LlmProvider::Ollama {
            base_url: "http://127.0.0.1:9".to_string(),
        };
        let client = LlmClient::new(provider, "tiny", 1);
        let err = client
            .complete(&LlmRequest::new("s", "u").with_timeout(500))
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
    }
}
