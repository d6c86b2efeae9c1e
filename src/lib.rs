//! Journal Companion - conversational journaling assistant

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::{ChatSession, ChatTurn, ConversationLabels, DiaryEntry, Role, UserId};
pub use crate::orchestrator::conversation::{
    ConversationController, ConversationError, ConversationState, TurnOutcome,
};
pub use crate::orchestrator::JournalOrchestrator;
pub use crate::services::embedding_service::EmbeddingService;
pub use crate::services::llm_client::{CompletionError, CompletionService, GeminiClient};
pub use crate::storage::{EntryStore, LocalIndex, RowStore};
