pub mod embedding_provider;
pub mod embedding_service;
pub mod llm_client;
#[cfg(any(test, feature = "test-util"))]
pub mod mock_completion;

// Re-export for convenience
pub use embedding_provider::{EmbeddingProvider, MockProvider};
pub use embedding_service::EmbeddingService;
pub use llm_client::{CompletionError, CompletionService, GeminiClient};
#[cfg(any(test, feature = "test-util"))]
pub use mock_completion::ScriptedCompletion;
