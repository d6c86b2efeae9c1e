//! Annotates a finished entry with tags and reflection questions.
//!
//! The four annotations are independent completion calls that run
//! concurrently. Each has its own time budget and a failure empties only its
//! own field.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::models::vocabulary::{self, EMOTIONS, KEY_TOPICS, MENTAL_TENDENCIES};
use crate::models::DiaryEntry;
use crate::prompts::templates::{
    emotions_template, key_topics_template, mental_tendencies_template,
    reflection_questions_template,
};
use crate::prompts::PromptTemplate;
use crate::services::llm_client::CompletionService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsField {
    Emotions,
    KeyTopics,
    MentalTendencies,
    ReflectionQuestions,
}

impl fmt::Display for AnalyticsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalyticsField::Emotions => "emotions",
            AnalyticsField::KeyTopics => "key_topics",
            AnalyticsField::MentalTendencies => "mental_tendencies",
            AnalyticsField::ReflectionQuestions => "reflection_questions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AnnotationFailure {
    pub field: AnalyticsField,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsReport {
    pub emotions: Vec<String>,
    pub key_topics: Vec<String>,
    pub mental_tendencies: Vec<String>,
    pub reflection_questions: String,
    pub failures: Vec<AnnotationFailure>,
}

impl AnalyticsReport {
    /// Copies the annotations onto `entry` and hands back the failures.
    pub fn apply(self, entry: &mut DiaryEntry) -> Vec<AnnotationFailure> {
        entry.emotions = self.emotions;
        entry.key_topics = self.key_topics;
        entry.mental_tendencies = self.mental_tendencies;
        entry.reflection_questions = self.reflection_questions;
        self.failures
    }
}

pub struct AnalyticsPipeline {
    llm: Arc<dyn CompletionService>,
    call_timeout: Duration,
}

impl AnalyticsPipeline {
    pub fn new(llm: Arc<dyn CompletionService>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    pub async fn annotate(&self, content: &str) -> AnalyticsReport {
        let emotion_list = vocabulary::as_prompt_list(EMOTIONS);
        let topic_list = vocabulary::as_prompt_list(KEY_TOPICS);
        let tendency_list = vocabulary::as_prompt_list(MENTAL_TENDENCIES);

        let emotion_values = [("entry_content", content), ("emotions", emotion_list.as_str())];
        let topic_values = [("entry_content", content), ("key_topics", topic_list.as_str())];
        let tendency_values = [
            ("entry_content", content),
            ("mental_tendencies", tendency_list.as_str()),
        ];
        let reflection_values = [("entry_content", content)];

        let (emotions, key_topics, mental_tendencies, reflection) = futures::join!(
            self.run(AnalyticsField::Emotions, emotions_template(), &emotion_values),
            self.run(AnalyticsField::KeyTopics, key_topics_template(), &topic_values),
            self.run(
                AnalyticsField::MentalTendencies,
                mental_tendencies_template(),
                &tendency_values,
            ),
            self.run(
                AnalyticsField::ReflectionQuestions,
                reflection_questions_template(),
                &reflection_values,
            ),
        );

        let mut report = AnalyticsReport::default();
        let mut record = |field: AnalyticsField, reason: String| {
            tracing::warn!("Analytics field {} left empty: {}", field, reason);
            report.failures.push(AnnotationFailure { field, reason });
        };

        let emotions = emotions.map(|r| parse_tags(&r, EMOTIONS));
        let key_topics = key_topics.map(|r| parse_tags(&r, KEY_TOPICS));
        let mental_tendencies = mental_tendencies.map(|r| parse_tags(&r, MENTAL_TENDENCIES));
        let reflection = reflection.and_then(|r| {
            let text = r.trim().to_string();
            if text.is_empty() {
                Err("empty response".to_string())
            } else {
                Ok(text)
            }
        });

        let emotions = emotions.unwrap_or_else(|e| {
            record(AnalyticsField::Emotions, e);
            Vec::new()
        });
        let key_topics = key_topics.unwrap_or_else(|e| {
            record(AnalyticsField::KeyTopics, e);
            Vec::new()
        });
        let mental_tendencies = mental_tendencies.unwrap_or_else(|e| {
            record(AnalyticsField::MentalTendencies, e);
            Vec::new()
        });
        let reflection_questions = reflection.unwrap_or_else(|e| {
            record(AnalyticsField::ReflectionQuestions, e);
            String::new()
        });

        report.emotions = emotions;
        report.key_topics = key_topics;
        report.mental_tendencies = mental_tendencies;
        report.reflection_questions = reflection_questions;
        report
    }

    async fn run(
        &self,
        field: AnalyticsField,
        template: PromptTemplate,
        values: &[(&str, &str)],
    ) -> Result<String, String> {
        let prompt = template.format(values).map_err(|e| e.to_string())?;

        match tokio::time::timeout(self.call_timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(response)) => {
                tracing::debug!("Analytics field {} answered", field);
                Ok(response)
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.call_timeout)),
        }
    }
}

/// Maps a tag response onto `vocab`, keeping canonical spellings in
/// first-seen order. Items are split on commas, semicolons and newlines, and
/// list bullets or numbering are ignored. If no item matches exactly, the
/// response is scanned for vocabulary terms appearing as whole words.
/// "hopeless" does not count as "Hope".
pub fn parse_tags(response: &str, vocab: &[&str]) -> Vec<String> {
    fn push(tags: &mut Vec<String>, term: &str) {
        if !tags.iter().any(|t| t == term) {
            tags.push(term.to_string());
        }
    }

    let mut tags = Vec::new();
    for item in response.split([',', ';', '\n']) {
        let cleaned = item
            .trim()
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c.is_ascii_digit())
            .trim_start_matches(['.', ')'])
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`');
        if let Some(term) = vocabulary::canonical(vocab, cleaned) {
            push(&mut tags, term);
        }
    }

    if tags.is_empty() {
        let haystack = words(response);
        for term in vocab {
            let needle = words(term);
            if !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle.as_slice()) {
                push(&mut tags, term);
            }
        }
    }

    tags
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
