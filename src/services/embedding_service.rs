// src/services/embedding_service.rs
//! Embedding service with provider abstraction

use crate::config::{Config, EmbeddingProviderKind};
use crate::services::embedding_provider::{
    EmbeddingProvider, GeminiEmbeddingProvider, OllamaProvider, ProviderError,
};
use std::sync::Arc;
use tokio::sync::AcquireError;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("No embeddings returned")]
    NoEmbeddings,
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Semaphore error: {0}")]
    SemaphoreError(String),
    #[error("Max retries exceeded: {0}")]
    MaxRetriesExceeded(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl From<AcquireError> for EmbeddingError {
    fn from(err: AcquireError) -> Self {
        EmbeddingError::SemaphoreError(err.to_string())
    }
}

impl From<ProviderError> for EmbeddingError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoEmbeddings => EmbeddingError::NoEmbeddings,
            other => EmbeddingError::ProviderError(other.to_string()),
        }
    }
}

/// Wraps an [`EmbeddingProvider`] with a concurrency limit, retries and a
/// fixed output dimension. Every vector it hands out has `dimension` values.
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    dimension: usize,
}

impl EmbeddingService {
    /// Production constructor selecting the provider from configuration
    pub fn from_config(cfg: &Config) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = match cfg.embedding_provider {
            EmbeddingProviderKind::Gemini => Arc::new(GeminiEmbeddingProvider::new(
                cfg.completion_base_url.clone(),
                cfg.google_api_key.clone(),
                cfg.embedding_model.clone(),
            )),
            EmbeddingProviderKind::Ollama => Arc::new(OllamaProvider::new(
                cfg.ollama_host.clone(),
                cfg.ollama_port,
                cfg.embedding_model.clone(),
            )),
        };

        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(cfg.max_concurrent_requests.max(1))),
            max_retries: cfg.max_retries,
            dimension: cfg.embedding_dimension,
        }
    }

    /// Test constructor with custom provider
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(5)),
            max_retries: 3,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate embedding using configured provider
    pub async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, EmbeddingError> {
        let _permit = self.semaphore.acquire().await?;

        let embedding = self.provider.generate_embedding(content).await?;
        self.check_dimension(&embedding)?;

        debug!("Generated {}-dim embedding", embedding.len());
        Ok(embedding)
    }

    /// Generate embedding with retry logic
    pub async fn generate_embedding_with_retry(
        &self,
        content: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let attempts = self.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.generate_embedding(content).await {
                Ok(embedding) => return Ok(embedding),
                Err(e @ EmbeddingError::NoEmbeddings)
                | Err(e @ EmbeddingError::DimensionMismatch { .. }) => {
                    // Retrying cannot fix these
                    return Err(e);
                }
                Err(e) => {
                    warn!("Embedding attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);

                    // Exponential backoff (except on last attempt)
                    if attempt < attempts - 1 {
                        sleep(Duration::from_millis(100 * (2_u64.pow(attempt)))).await;
                    }
                }
            }
        }

        Err(EmbeddingError::MaxRetriesExceeded(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}
