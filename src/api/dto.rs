use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ChatTurn, ConversationLabels, DiaryEntry};
use crate::orchestrator::analytics::AnnotationFailure;
use crate::orchestrator::conversation::ConversationState;
use crate::storage::IndexHit;

// ==================== REQUEST DTOs ====================

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct StartConversationRequest {
    /// Processed as the first turn when present
    #[serde(default)]
    pub initial_entry: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Similarity,
    Topic,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub mode: Option<SearchMode>,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnResponse {
    Reply {
        content: String,
    },
    Declined {
        content: String,
    },
    Finalized {
        notice: String,
        entry: DiaryEntry,
        failed_fields: Vec<String>,
    },
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartConversationResponse {
    pub id: Uuid,
    pub user_id: String,
    pub status: ConversationStatusDto,
    /// Outcome of `initial_entry`, if one was sent
    pub first_turn: Option<TurnResponse>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatusDto {
    Active,
    Finalized,
}

impl From<ConversationState> for ConversationStatusDto {
    fn from(state: ConversationState) -> Self {
        match state {
            ConversationState::Active => ConversationStatusDto::Active,
            ConversationState::Finalized => ConversationStatusDto::Finalized,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub user_id: String,
    pub status: ConversationStatusDto,
    pub labels: ConversationLabels,
    pub turns: Vec<ChatTurn>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EntriesResponse {
    pub entries: Vec<DiaryEntry>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResultDto {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: serde_json::Value,
}

impl From<IndexHit> for SearchResultDto {
    fn from(hit: IndexHit) -> Self {
        Self {
            id: hit.id,
            score: hit.score,
            content: hit.content,
            metadata: hit.metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResultDto>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromptsResponse {
    pub starter_questions: Vec<String>,
    pub opening_question: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

pub(crate) fn failed_field_names(failures: &[AnnotationFailure]) -> Vec<String> {
    failures.iter().map(|f| f.field.to_string()).collect()
}
