//! Append-only CSV file of diary entries, one file per user.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::models::{ConversationLabels, DiaryEntry, UserId};

const DATE_FORMAT: &str = "%Y-%m-%d";
const LIST_SEPARATOR: &str = "; ";

#[derive(Debug, thiserror::Error)]
pub enum RowStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

/// On-disk shape of a row. Tag lists are stored as `"; "`-joined text.
#[derive(Debug, Serialize, Deserialize)]
struct EntryRow {
    id: String,
    date: String,
    title: String,
    content: String,
    emotions: String,
    key_topics: String,
    mental_tendencies: String,
    reflection_questions: String,
    emotions_experienced: Option<String>,
    current_state: Option<String>,
    desired_state: Option<String>,
}

fn join_tags(tags: &[String]) -> String {
    tags.join(LIST_SEPARATOR)
}

fn split_tags(field: &str) -> Vec<String> {
    field
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl From<&DiaryEntry> for EntryRow {
    fn from(entry: &DiaryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            date: entry.date.format(DATE_FORMAT).to_string(),
            title: entry.title.clone(),
            content: entry.content.clone(),
            emotions: join_tags(&entry.emotions),
            key_topics: join_tags(&entry.key_topics),
            mental_tendencies: join_tags(&entry.mental_tendencies),
            reflection_questions: entry.reflection_questions.clone(),
            emotions_experienced: entry.labels.emotions_experienced.clone(),
            current_state: entry.labels.current_state.clone(),
            desired_state: entry.labels.desired_state.clone(),
        }
    }
}

impl EntryRow {
    fn into_entry(self, row: usize) -> Result<DiaryEntry, RowStoreError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|e| {
            RowStoreError::InvalidRow {
                row,
                reason: format!("date {:?}: {}", self.date, e),
            }
        })?;

        Ok(DiaryEntry {
            id: self.id,
            date,
            title: self.title,
            content: self.content,
            emotions: split_tags(&self.emotions),
            key_topics: split_tags(&self.key_topics),
            mental_tendencies: split_tags(&self.mental_tendencies),
            reflection_questions: self.reflection_questions,
            labels: ConversationLabels {
                emotions_experienced: self.emotions_experienced,
                current_state: self.current_state,
                desired_state: self.desired_state,
            },
        })
    }
}

/// Blocking CSV access. Callers on the async runtime go through
/// `EntryStore`, which moves these calls onto the blocking pool.
pub struct RowStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl RowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, user: &UserId) -> PathBuf {
        self.dir.join(format!("{}.csv", user))
    }

    /// Append one row, writing the header first if the file is new or empty.
    /// Appends are serialized so the header check and the write happen
    /// together, and each row reaches the file in a single write.
    pub fn append(&self, user: &UserId, entry: &DiaryEntry) -> Result<(), RowStoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(user);

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut bytes = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(is_new)
                .from_writer(&mut bytes);
            writer.serialize(EntryRow::from(entry))?;
            writer.flush()?;
        }

        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }

    /// All rows in file order. A missing file is an empty store.
    pub fn load_all(&self, user: &UserId) -> Result<Vec<DiaryEntry>, RowStoreError> {
        let path = self.path_for(user);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        reader
            .deserialize::<EntryRow>()
            .enumerate()
            .map(|(idx, row)| row?.into_entry(idx + 1))
            .collect()
    }

    pub fn ids(&self, user: &UserId) -> Result<Vec<String>, RowStoreError> {
        Ok(self.load_all(user)?.into_iter().map(|e| e.id).collect())
    }
}
