use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::analytics::{AnalyticsPipeline, AnnotationFailure};
use super::label_extractor::LabelExtractor;
use super::summarizer::{EntrySummarizer, EntrySummary};
use crate::models::{ChatSession, ChatTurn, ConversationLabels, DiaryEntry, UserId};
use crate::prompts::PromptError;
use crate::services::llm_client::{CompletionError, CompletionService};
use crate::storage::{EntryStore, StoreError};

/// Returned with the stored entry when a conversation completes.
pub const COMPLETION_NOTICE: &str =
    "Thank you for sharing. I've saved today's entry to your journal.";

/// Sent in place of a reply the model refused to generate.
pub const DECLINED_REPLY: &str =
    "I'm sorry, I can't respond to that. Could you tell me about it in a different way?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Active,
    Finalized,
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("conversation is already finalized")]
    Finalized,
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("chat service failed: {0}")]
    Chat(CompletionError),
    #[error("entry could not be stored: {0}")]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl ConversationError {
    /// Whether resubmitting the same message may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConversationError::Chat(e) => e.is_transient(),
            ConversationError::Persistence(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinalizedEntry {
    pub notice: String,
    pub entry: DiaryEntry,
    pub failures: Vec<AnnotationFailure>,
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Reply(String),
    /// The model would not answer; the conversation continues.
    Declined(String),
    Finalized(FinalizedEntry),
}

/// Shared collaborators of every conversation.
#[derive(Clone)]
pub struct ConversationComponents {
    pub llm: Arc<dyn CompletionService>,
    pub extractor: Arc<LabelExtractor>,
    pub summarizer: Arc<EntrySummarizer>,
    pub analytics: Arc<AnalyticsPipeline>,
    pub store: EntryStore,
}

/// Drives one journaling conversation from the first message to a stored
/// entry.
///
/// Every user turn is first run through label extraction. While any of the
/// three labels is missing the turn goes to the chat model. Once all three
/// are known the turn is not sent to chat: the conversation is summarized,
/// annotated, and written to the store, and the controller stops accepting
/// turns.
pub struct ConversationController {
    user: UserId,
    session: ChatSession,
    labels: ConversationLabels,
    state: ConversationState,
    components: ConversationComponents,
}

impl ConversationController {
    pub fn new(user: UserId, session: ChatSession, components: ConversationComponents) -> Self {
        Self {
            user,
            session,
            labels: ConversationLabels::default(),
            state: ConversationState::Active,
            components,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn labels(&self) -> &ConversationLabels {
        &self.labels
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub async fn handle_turn(&mut self, text: &str) -> Result<TurnOutcome, ConversationError> {
        if self.state == ConversationState::Finalized {
            return Err(ConversationError::Finalized);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let history_len = self.session.len();
        self.session.push(ChatTurn::user(text));

        let extracted = self
            .components
            .extractor
            .extract(&self.session.user_transcript())
            .await;
        self.labels.merge(extracted);

        if self.labels.is_complete() {
            return self.finalize().await;
        }

        tracing::debug!(
            "Conversation for {} still missing {:?}",
            self.user,
            self.labels.missing_fields()
        );

        let history = &self.session.turns()[..history_len];
        match self.components.llm.chat(history, text).await {
            Ok(reply) => {
                self.session.push(ChatTurn::assistant(reply.clone()));
                Ok(TurnOutcome::Reply(reply))
            }
            Err(CompletionError::ContentRejected(reason)) => {
                tracing::warn!("Chat reply for {} was rejected: {}", self.user, reason);
                // Keep the refused turn out of the model context.
                self.session.rollback_user_turn();
                Ok(TurnOutcome::Declined(DECLINED_REPLY.to_string()))
            }
            Err(e) => {
                tracing::warn!("Chat call for {} failed: {}", self.user, e);
                self.session.rollback_user_turn();
                Err(ConversationError::Chat(e))
            }
        }
    }

    async fn finalize(&mut self) -> Result<TurnOutcome, ConversationError> {
        let date = today();
        tracing::info!("All labels gathered for {}; finalizing entry", self.user);

        let summary = match self
            .components
            .summarizer
            .summarize(&self.session.transcript())
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Summary failed, using the raw transcript: {}", e);
                EntrySummary::fallback(date, &self.session.user_transcript())
            }
        };

        match self.persist(date, summary).await {
            Ok(finalized) => {
                self.state = ConversationState::Finalized;
                Ok(TurnOutcome::Finalized(finalized))
            }
            Err(e) => {
                self.session.rollback_user_turn();
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        date: NaiveDate,
        summary: EntrySummary,
    ) -> Result<FinalizedEntry, ConversationError> {
        let store = &self.components.store;

        let mut entry = DiaryEntry {
            id: store.fresh_id(&self.user).await?,
            date,
            title: summary.title,
            content: summary.content,
            emotions: Vec::new(),
            key_topics: Vec::new(),
            mental_tendencies: Vec::new(),
            reflection_questions: String::new(),
            labels: self.labels.clone(),
        };

        let failures = self
            .components
            .analytics
            .annotate(&entry.content)
            .await
            .apply(&mut entry);

        store.add_entry(&self.user, &entry).await?;

        Ok(FinalizedEntry {
            notice: COMPLETION_NOTICE.to_string(),
            entry,
            failures,
        })
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
