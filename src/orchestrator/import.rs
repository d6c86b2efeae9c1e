//! Bulk import of entries written before the assistant existed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use utoipa::ToSchema;

use super::analytics::AnalyticsPipeline;
use crate::models::{ConversationLabels, DiaryEntry, UserId};
use crate::storage::row_store::RowStoreError;
use crate::storage::EntryStore;

/// A plain `date,title,content` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportedEntry {
    pub date: NaiveDate,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Reads an import file with a `date,title,content` header. Dates are
/// `YYYY-MM-DD`.
pub fn read_import_file(path: &Path) -> Result<Vec<ImportedEntry>, RowStoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<ImportedEntry>()
        .enumerate()
        .map(|(idx, row)| {
            row.map_err(|e| RowStoreError::InvalidRow {
                row: idx + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Same user and text always give the same id, so re-running an import
/// skips what is already stored.
pub fn stable_entry_id(user: &UserId, entry: &ImportedEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(entry.date.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(entry.title.as_bytes());
    hasher.update(b"\n");
    hasher.update(entry.content.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct EntryImporter {
    analytics: Arc<AnalyticsPipeline>,
    store: EntryStore,
}

impl EntryImporter {
    pub fn new(analytics: Arc<AnalyticsPipeline>, store: EntryStore) -> Self {
        Self { analytics, store }
    }

    /// Annotates and stores each entry in order. A failing entry is counted
    /// and logged; the rest still go through.
    pub async fn import(&self, user: &UserId, entries: Vec<ImportedEntry>) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for imported in entries {
            let id = stable_entry_id(user, &imported);

            match self.store.contains(user, &id).await {
                Ok(true) => {
                    tracing::debug!("Skipping already imported entry {}", id);
                    summary.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Could not check entry {}: {}", id, e);
                    summary.failed += 1;
                    continue;
                }
            }

            let mut entry = DiaryEntry {
                id,
                date: imported.date,
                title: imported.title,
                content: imported.content,
                emotions: Vec::new(),
                key_topics: Vec::new(),
                mental_tendencies: Vec::new(),
                reflection_questions: String::new(),
                labels: ConversationLabels::default(),
            };
            let failures = self.analytics.annotate(&entry.content).await.apply(&mut entry);
            if !failures.is_empty() {
                tracing::debug!("Entry {} imported with {} empty fields", entry.id, failures.len());
            }

            match self.store.add_entry(user, &entry).await {
                Ok(()) => summary.imported += 1,
                Err(e) => {
                    tracing::warn!("Failed to import entry {}: {}", entry.id, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Import for {}: {} imported, {} skipped, {} failed",
            user,
            summary.imported,
            summary.skipped,
            summary.failed
        );
        summary
    }
}
