use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::prompts::templates::summary_template;
use crate::prompts::PromptError;
use crate::services::llm_client::{strip_json_fences, CompletionError, CompletionService};

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("summary response was not usable: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntrySummary {
    pub title: String,
    pub content: String,
}

impl EntrySummary {
    /// Used when the model cannot produce a summary.
    pub fn fallback(date: NaiveDate, user_transcript: &str) -> Self {
        Self {
            title: format!("Journal entry {}", date.format("%Y-%m-%d")),
            content: user_transcript.to_string(),
        }
    }
}

/// Condenses a finished conversation into a titled first-person entry.
pub struct EntrySummarizer {
    llm: Arc<dyn CompletionService>,
}

impl EntrySummarizer {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    pub async fn summarize(&self, transcript: &str) -> Result<EntrySummary, SummaryError> {
        let prompt = summary_template().format(&[("transcript", transcript)])?;
        let response = self.llm.complete(&prompt).await?;
        parse_summary(&response)
    }
}

fn parse_summary(response: &str) -> Result<EntrySummary, SummaryError> {
    let summary: EntrySummary = serde_json::from_str(strip_json_fences(response))
        .map_err(|e| SummaryError::Parse(e.to_string()))?;

    let title = summary.title.trim();
    let content = summary.content.trim();
    if title.is_empty() || content.is_empty() {
        return Err(SummaryError::Parse("empty title or content".to_string()));
    }

    Ok(EntrySummary {
        title: title.to_string(),
        content: content.to_string(),
    })
}
