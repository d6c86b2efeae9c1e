use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{ChatTurn, Role};

/// Finish reasons Gemini reports when it refuses to produce content.
const REJECTION_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("Transient service error: {0}")]
    Transient(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Content rejected: {0}")]
    ContentRejected(String),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transient(_) | CompletionError::Timeout(_) => true,
            CompletionError::ApiError { status, .. } => *status == 429 || *status >= 500,
            CompletionError::ContentRejected(_) | CompletionError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Transient(err.to_string())
    }
}

/// Chat-completion backend used by the conversation loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Single-shot completion of `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Multi-turn completion: `history` followed by a new user `message`.
    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_concurrent_requests: usize,
}

impl From<&Config> for CompletionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            base_url: cfg.completion_base_url.clone(),
            api_key: cfg.google_api_key.clone(),
            model: cfg.completion_model.clone(),
            temperature: cfg.completion_temperature,
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            max_retries: cfg.max_retries,
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_concurrent_requests: cfg.max_concurrent_requests,
        }
    }
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    settings: CompletionSettings,
    semaphore: Arc<Semaphore>,
}

impl GeminiClient {
    pub fn new(mut settings: CompletionSettings) -> Result<Self, CompletionError> {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| CompletionError::InvalidResponse(format!("HTTP client: {}", e)))?;
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1)));

        Ok(Self {
            client,
            settings,
            semaphore,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url, self.settings.model
        )
    }

    /// Returns true when the configured model is reachable with our key.
    pub async fn health_check(&self) -> Result<bool, CompletionError> {
        let response = self
            .client
            .get(format!(
                "{}/v1beta/models/{}",
                self.settings.base_url, self.settings.model
            ))
            .header("x-goog-api-key", &self.settings.api_key)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    /// Sends `contents`, retrying transient failures with exponential backoff.
    async fn generate(&self, contents: Vec<Content<'_>>) -> Result<String, CompletionError> {
        let request = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
            },
        };

        let attempts = self.settings.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.settings.retry_base_delay * 2_u32.pow(attempt - 1);
                warn!(
                    "Completion attempt {} failed, retrying in {:?}: {}",
                    attempt,
                    delay,
                    last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default()
                );
                tokio::time::sleep(delay).await;
            }

            match self.generate_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CompletionError::Transient("no completion attempt was made".to_string())
        }))
    }

    async fn generate_once(
        &self,
        request: &GenerateContentRequest<'_>,
    ) -> Result<String, CompletionError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CompletionError::Transient(e.to_string()))?;

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(self.settings.request_timeout)
                } else {
                    CompletionError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::ApiError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let text = body.into_text()?;
        debug!("Completion returned {} chars", text.len());
        Ok(text)
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.generate(vec![Content::text("user", prompt)]).await
    }

    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String, CompletionError> {
        let mut contents: Vec<Content<'_>> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Content::text(role, &turn.content)
            })
            .collect();
        contents.push(Content::text("user", message));

        self.generate(contents).await
    }
}

// Request/Response Models
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(role: &'a str, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, CompletionError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CompletionError::ContentRejected(reason));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::InvalidResponse("no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return match candidate.finish_reason {
                Some(reason) if REJECTION_REASONS.contains(&reason.as_str()) => {
                    Err(CompletionError::ContentRejected(reason))
                }
                _ => Err(CompletionError::InvalidResponse(
                    "candidate contained no text".to_string(),
                )),
            };
        }

        Ok(text)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));

    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(str::trim)
            .unwrap_or(stripped.trim()),
        None => text,
    }
}
