use std::sync::Arc;

use crate::models::{DiaryEntry, UserId};
use crate::prompts::templates::{
    opening_question_template, question_generation_template, topic_query_template,
    topics_from_chat_template,
};
use crate::prompts::PromptError;
use crate::services::llm_client::{CompletionError, CompletionService};
use crate::storage::{EntryStore, IndexHit, StoreError};

/// Entries fed to starter-question generation.
const STARTER_CONTEXT_ENTRIES: usize = 5;
const STARTER_QUESTION_COUNT: usize = 5;
const NO_PAST_ENTRIES: &str = "No past entries yet.";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
}

/// Retrieval over a user's past entries and the prompts built from them.
pub struct ContextAssembler {
    llm: Arc<dyn CompletionService>,
    store: EntryStore,
}

impl ContextAssembler {
    pub fn new(llm: Arc<dyn CompletionService>, store: EntryStore) -> Self {
        Self { llm, store }
    }

    pub async fn similar_entries(
        &self,
        user: &UserId,
        text: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, ContextError> {
        Ok(self.store.search_text(user, text, k).await?)
    }

    /// Five questions to start today's entry, based on the latest entries.
    pub async fn starter_questions(&self, user: &UserId) -> Result<Vec<String>, ContextError> {
        let recent = latest_entries(self.store.entries(user).await?, STARTER_CONTEXT_ENTRIES);
        let context = if recent.is_empty() {
            NO_PAST_ENTRIES.to_string()
        } else {
            recent
                .iter()
                .map(format_entry)
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let prompt = question_generation_template().format(&[("context", context.as_str())])?;
        let response = self.llm.complete(&prompt).await?;
        Ok(parse_question_lines(&response)
            .into_iter()
            .take(STARTER_QUESTION_COUNT)
            .collect())
    }

    /// A single suggested topic drawn from the most recent entry. `None` for
    /// a user with no entries.
    pub async fn opening_question(&self, user: &UserId) -> Result<Option<String>, ContextError> {
        let Some(latest) = latest_entries(self.store.entries(user).await?, 1).pop() else {
            return Ok(None);
        };

        let prompt = opening_question_template().format(&[("latest_entry", latest.content.as_str())])?;
        let question = self.llm.complete(&prompt).await?.trim().to_string();
        Ok((!question.is_empty()).then_some(question))
    }

    /// Searches with the user's text widened by the keywords the model picks
    /// out of it. Keyword extraction failing falls back to the text alone.
    pub async fn topic_search(
        &self,
        user: &UserId,
        user_chat: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, ContextError> {
        let topics = match topics_from_chat_template()
            .format(&[("user_chat", user_chat)])
        {
            Ok(prompt) => match self.llm.complete(&prompt).await {
                Ok(topics) => topics.trim().to_string(),
                Err(e) => {
                    tracing::warn!("Topic extraction failed, searching with raw text: {}", e);
                    String::new()
                }
            },
            Err(e) => return Err(e.into()),
        };

        let query =
            topic_query_template().format(&[("user_chat", user_chat), ("topics", topics.as_str())])?;
        tracing::debug!("Topic search query: {}", query);
        Ok(self.store.search_text(user, &query, k).await?)
    }
}

/// Up to `n` entries, most recent first. Entries on the same date keep file
/// order reversed, so the last written comes first.
fn latest_entries(mut entries: Vec<DiaryEntry>, n: usize) -> Vec<DiaryEntry> {
    entries.reverse();
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    entries.truncate(n);
    entries
}

fn format_entry(entry: &DiaryEntry) -> String {
    format!(
        "Date: {}\nTitle: {}\n{}",
        entry.date.format("%Y-%m-%d"),
        entry.title,
        entry.content
    )
}

/// Formats index hits for the chatbot system prompt.
pub fn format_hits(hits: &[IndexHit]) -> String {
    if hits.is_empty() {
        return NO_PAST_ENTRIES.to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "Date: {}\nTitle: {}\n{}",
                hit.metadata["date"].as_str().unwrap_or("unknown"),
                hit.metadata["title"].as_str().unwrap_or("untitled"),
                hit.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One question per non-empty line with list numbering and bullets removed.
pub fn parse_question_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '*' || c == '•')
                .trim_start_matches(['.', ')'])
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("questions:"))
        .collect()
}
