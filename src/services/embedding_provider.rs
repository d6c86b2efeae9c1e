// src/services/embedding_provider.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Provider-specific errors
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("No embeddings returned")]
    NoEmbeddings,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for embedding providers (Gemini, Ollama, etc.)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for the given text content
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Gemini `embedContent` provider
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbeddingProvider {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.trim_start_matches("models/").to_string(),
        }
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart { text: content }],
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:embedContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http(format!("{}: {}", status, body)));
        }

        let body: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        match body.embedding {
            Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
            _ => Err(ProviderError::NoEmbeddings),
        }
    }
}

/// Ollama provider implementation
pub struct OllamaProvider {
    ollama: ollama_rs::Ollama,
    model: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(host: String, port: u16, model: String) -> Self {
        Self {
            ollama: ollama_rs::Ollama::new(host, port),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError> {
        use ollama_rs::generation::embeddings::request::{
            EmbeddingsInput, GenerateEmbeddingsRequest,
        };

        let input = EmbeddingsInput::Single(content.to_string());
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), input);

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .map(|embedding| embedding.into_iter().map(|v| v as f32).collect())
            .ok_or(ProviderError::NoEmbeddings)
    }
}

/// Mock provider for testing
pub struct MockProvider {
    pub response: Result<Vec<f32>, ProviderError>,
    /// When set, embeddings are derived from the text instead of `response`.
    pub hashed_dimension: Option<usize>,
    pub call_count: std::sync::Arc<std::sync::Mutex<usize>>,
}

impl MockProvider {
    /// Create a mock provider that returns a successful embedding
    pub fn new_success(embedding: Vec<f32>) -> Self {
        Self {
            response: Ok(embedding),
            hashed_dimension: None,
            call_count: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    /// Create a mock provider that returns an error
    pub fn new_error(error: ProviderError) -> Self {
        Self {
            response: Err(error),
            hashed_dimension: None,
            call_count: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    /// Create a mock provider producing bag-of-words vectors: every lowercase
    /// word is hashed into one of `dimension` buckets. Texts sharing words
    /// land close together.
    pub fn hashed(dimension: usize) -> Self {
        Self {
            response: Err(ProviderError::NoEmbeddings),
            hashed_dimension: Some(dimension),
            call_count: std::sync::Arc::new(std::sync::Mutex::new(0)),
        }
    }

    fn hash_embed(content: &str, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0.0_f32; dimension];
        for word in content
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u64::from_be_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % dimension;
            vector[bucket] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        if let Some(dimension) = self.hashed_dimension {
            return Ok(Self::hash_embed(content, dimension));
        }
        // Clone the result to allow multiple calls
        match &self.response {
            Ok(vec) => Ok(vec.clone()),
            Err(err) => Err(err.clone()),
        }
    }
}
