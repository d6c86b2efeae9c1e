// Integration tests module
//
// Every test runs against a temp data dir, the local JSON index, hashed
// bag-of-words embeddings and a scripted completion service.

use journal_companion::{
    orchestrator::JournalOrchestrator,
    services::{EmbeddingService, MockProvider, ScriptedCompletion},
    storage::{EntryStore, LocalIndex, RowStore},
    Config, UserId,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mod api;
mod store;

pub const DIMENSION: usize = 64;
pub const ANALYTICS_TIMEOUT: Duration = Duration::from_millis(300);

// Substrings identifying each prompt in the library
pub const LABELS: &str = "Extract the following";
pub const SUMMARY: &str = "Turn this journaling conversation";
pub const EMOTIONS: &str = "relevant emotions?";
pub const TOPICS: &str = "relevant key topics?";
pub const TENDENCIES: &str = "relevant mental tendencies?";
pub const REFLECTION: &str = "help the writer reflect";
pub const STARTERS: &str = "generate 5 relevant questions";
pub const OPENING: &str = "latest journal";
pub const KEYWORDS: &str = "keywords, topics, nouns";

pub const NO_LABELS: &str =
    r#"{"emotions_experienced": null, "current_state": null, "desired_state": null}"#;
pub const EMOTIONS_ONLY: &str =
    r#"{"emotions_experienced": "anxious", "current_state": null, "desired_state": null}"#;
pub const EMOTIONS_AND_CURRENT: &str = r#"{"emotions_experienced": "anxious", "current_state": "behind on my thesis", "desired_state": null}"#;
pub const ALL_LABELS: &str = r#"{"emotions_experienced": "anxious", "current_state": "behind on my thesis", "desired_state": "a finished draft by Friday"}"#;

pub const SUMMARY_JSON: &str = r#"{"title": "Thesis crunch", "content": "I felt anxious because I am behind on my thesis. I want a finished draft by Friday."}"#;

pub const ALL_IN_ONE: &str =
    "I'm anxious because I'm behind on my thesis, and I want a finished draft by Friday.";

/// Adds well-behaved answers for the four analytics prompts.
pub fn with_analytics(script: ScriptedCompletion) -> ScriptedCompletion {
    script
        .on_prompt(EMOTIONS, "Fear, Hope")
        .on_prompt(TOPICS, "Studies, Productivity")
        .on_prompt(TENDENCIES, "Perfectionism")
        .on_prompt(
            REFLECTION,
            "What would a good-enough draft look like?\nWho could read it first?",
        )
}

/// Script for a conversation that finishes on its first message.
pub fn finishing_script() -> ScriptedCompletion {
    with_analytics(
        ScriptedCompletion::new()
            .on_prompt(LABELS, ALL_LABELS)
            .on_prompt(SUMMARY, SUMMARY_JSON),
    )
}

pub fn build_store(data_dir: &Path) -> EntryStore {
    build_store_with_dimension(data_dir, DIMENSION)
}

pub fn build_store_with_dimension(data_dir: &Path, dimension: usize) -> EntryStore {
    EntryStore::new(
        RowStore::new(data_dir.join("journal_entries")),
        Arc::new(LocalIndex::new(data_dir.join("index"))),
        EmbeddingService::with_provider(Arc::new(MockProvider::hashed(dimension)), dimension),
    )
}

pub struct TestContext {
    pub dir: TempDir,
    pub script: Arc<ScriptedCompletion>,
    pub orchestrator: Arc<JournalOrchestrator>,
}

impl TestContext {
    pub fn new(script: ScriptedCompletion) -> Self {
        let dir = TempDir::new().unwrap();
        let script = Arc::new(script);
        let orchestrator = Arc::new(JournalOrchestrator::new(
            script.clone(),
            build_store(dir.path()),
            ANALYTICS_TIMEOUT,
            3,
        ));

        Self {
            dir,
            script,
            orchestrator,
        }
    }

    pub fn config(&self, api_key: Option<&str>) -> Config {
        Config {
            data_dir: self.dir.path().to_string_lossy().into_owned(),
            api_key: api_key.map(str::to_string),
            embedding_dimension: DIMENSION,
            ..Config::default()
        }
    }

    /// A second store over the same files, as a restarted process would see them.
    pub fn reopened_store(&self) -> EntryStore {
        build_store(self.dir.path())
    }
}

pub fn user(name: &str) -> UserId {
    UserId::parse(name).unwrap()
}
