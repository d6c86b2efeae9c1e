pub mod analytics;
pub mod context_assembly;
pub mod conversation;
pub mod import;
pub mod label_extractor;
pub mod summarizer;

use std::sync::Arc;
use std::time::Duration;

use crate::models::{ChatSession, UserId};
use crate::prompts::templates::chatbot_system_template;
use crate::services::llm_client::CompletionService;
use crate::storage::{EntryStore, IndexHit, ReconciliationReport, StoreError};

use analytics::AnalyticsPipeline;
use context_assembly::{ContextAssembler, ContextError};
use conversation::{ConversationComponents, ConversationController, ConversationError};
use import::{EntryImporter, ImportSummary, ImportedEntry};
use label_extractor::LabelExtractor;
use summarizer::EntrySummarizer;

/// Hidden reply that closes the seeded system instruction.
const SEED_ACKNOWLEDGMENT: &str =
    "Understood. I'll ask one gentle question at a time. What's on your mind today?";

/// Entry point for everything the assistant does for a user.
pub struct JournalOrchestrator {
    components: ConversationComponents,
    pub context: ContextAssembler,
    pub importer: EntryImporter,
    similar_entries_k: usize,
}

impl JournalOrchestrator {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        store: EntryStore,
        analytics_timeout: Duration,
        similar_entries_k: usize,
    ) -> Self {
        let analytics = Arc::new(AnalyticsPipeline::new(llm.clone(), analytics_timeout));

        Self {
            components: ConversationComponents {
                llm: llm.clone(),
                extractor: Arc::new(LabelExtractor::new(llm.clone())),
                summarizer: Arc::new(EntrySummarizer::new(llm.clone())),
                analytics: analytics.clone(),
                store: store.clone(),
            },
            context: ContextAssembler::new(llm, store.clone()),
            importer: EntryImporter::new(analytics, store),
            similar_entries_k,
        }
    }

    pub fn store(&self) -> &EntryStore {
        &self.components.store
    }

    /// Opens a conversation. With `initial_entry`, the nearest past entries
    /// are placed in the system instruction; the caller still submits the
    /// text as the first turn.
    pub async fn start_conversation(
        &self,
        user: UserId,
        initial_entry: Option<&str>,
    ) -> Result<ConversationController, ConversationError> {
        self.components.store.load_index_for_user(&user).await?;

        let hits: Vec<IndexHit> = match initial_entry.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => self
                .context
                .similar_entries(&user, text, self.similar_entries_k)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Could not retrieve similar entries for {}: {}", user, e);
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let instruction = chatbot_system_template().format(&[(
            "similar_entries",
            context_assembly::format_hits(&hits).as_str(),
        )])?;

        tracing::info!(
            "Starting conversation for {} with {} related entries",
            user,
            hits.len()
        );
        Ok(ConversationController::new(
            user,
            ChatSession::seeded(instruction, SEED_ACKNOWLEDGMENT),
            self.components.clone(),
        ))
    }

    pub async fn starter_questions(&self, user: &UserId) -> Result<Vec<String>, ContextError> {
        self.context.starter_questions(user).await
    }

    pub async fn opening_question(&self, user: &UserId) -> Result<Option<String>, ContextError> {
        self.context.opening_question(user).await
    }

    pub async fn topic_search(
        &self,
        user: &UserId,
        text: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, ContextError> {
        self.context.topic_search(user, text, k).await
    }

    pub async fn import_entries(&self, user: &UserId, entries: Vec<ImportedEntry>) -> ImportSummary {
        self.importer.import(user, entries).await
    }

    pub async fn reconcile(&self, user: &UserId) -> Result<ReconciliationReport, StoreError> {
        self.components.store.reconcile(user).await
    }
}
