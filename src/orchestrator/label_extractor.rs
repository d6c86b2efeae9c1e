use serde_json::Value;
use std::sync::Arc;

use crate::models::ConversationLabels;
use crate::prompts::templates::label_extraction_template;
use crate::services::llm_client::{strip_json_fences, CompletionService};

/// Placeholder answers models give instead of `null`.
const UNSET_MARKERS: &[&str] = &["null", "none", "unknown", "n/a", "na", "not stated", ""];

/// Reads a conversation's user text and reports which of the three
/// completion facts have been stated.
pub struct LabelExtractor {
    llm: Arc<dyn CompletionService>,
}

impl LabelExtractor {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    /// Never fails: errors and unparseable output leave every field unset.
    pub async fn extract(&self, user_transcript: &str) -> ConversationLabels {
        if user_transcript.trim().is_empty() {
            return ConversationLabels::default();
        }

        let prompt = match label_extraction_template().format(&[("transcript", user_transcript)])
        {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("Label extraction prompt failed to render: {}", e);
                return ConversationLabels::default();
            }
        };

        let response = match self.llm.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Label extraction call failed, treating labels as unset: {}", e);
                return ConversationLabels::default();
            }
        };

        match parse_labels(&response) {
            Some(labels) => {
                tracing::debug!(
                    "Extracted labels, missing: {:?}",
                    labels.missing_fields()
                );
                labels
            }
            None => {
                tracing::warn!("Label extraction returned unparseable output");
                ConversationLabels::default()
            }
        }
    }
}

/// `None` when the response is not a JSON object. Each field is read on its
/// own, so one malformed field does not discard the others.
pub fn parse_labels(response: &str) -> Option<ConversationLabels> {
    let value: Value = serde_json::from_str(strip_json_fences(response)).ok()?;
    let object = value.as_object()?;

    let field = |name: &str| -> Option<String> {
        let text = match object.get(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            _ => return None,
        };
        if UNSET_MARKERS.contains(&text.to_lowercase().as_str()) {
            None
        } else {
            Some(text)
        }
    };

    Some(ConversationLabels {
        emotions_experienced: field("emotions_experienced"),
        current_state: field("current_state"),
        desired_state: field("desired_state"),
    })
}
