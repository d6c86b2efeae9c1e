use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use super::row_store::{RowStore, RowStoreError};
use super::vector_index::{IndexError, IndexHit, IndexRecord, VectorIndex};
use crate::models::{DiaryEntry, UserId};
use crate::services::embedding_service::{EmbeddingError, EmbeddingService};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("entry file error: {0}")]
    Rows(#[from] RowStoreError),
    #[error("entry {0} already exists")]
    DuplicateId(String),
    /// The vector was indexed but the row could not be written.
    #[error("entry {id} is indexed but its row was not written: {reason}")]
    PersistenceInconsistency { id: String, reason: String },
}

/// Ids present in only one half of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ReconciliationReport {
    pub row_count: usize,
    pub index_count: usize,
    pub only_in_rows: Vec<String>,
    pub only_in_index: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.only_in_rows.is_empty() && self.only_in_index.is_empty()
    }
}

/// Diary entries kept as CSV rows plus a vector index. A write lands in the
/// index first and the row second, under a per-user lock.
#[derive(Clone)]
pub struct EntryStore {
    rows: Arc<RowStore>,
    index: Arc<dyn VectorIndex>,
    embeddings: EmbeddingService,
    user_locks: Arc<Mutex<HashMap<UserId, Arc<Mutex<()>>>>>,
}

impl EntryStore {
    pub fn new(rows: RowStore, index: Arc<dyn VectorIndex>, embeddings: EmbeddingService) -> Self {
        Self {
            rows: Arc::new(rows),
            index,
            embeddings,
            user_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user.clone()).or_default().clone()
    }

    /// Runs a row-file operation on the blocking pool.
    async fn with_rows<T, F>(&self, op: F) -> Result<T, RowStoreError>
    where
        F: FnOnce(&RowStore) -> Result<T, RowStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let rows = Arc::clone(&self.rows);
        tokio::task::spawn_blocking(move || op(&rows))
            .await
            .map_err(|e| RowStoreError::Io(std::io::Error::other(e)))?
    }

    async fn row_ids(&self, user: &UserId) -> Result<Vec<String>, RowStoreError> {
        let user = user.clone();
        self.with_rows(move |rows| rows.ids(&user)).await
    }

    /// Open the user's index, creating an empty one on first use. An index
    /// built with another dimension than the embedding model is an error.
    pub async fn load_index_for_user(&self, user: &UserId) -> Result<usize, StoreError> {
        let expected = self.embeddings.dimension();
        match self.index.open(user).await? {
            Some(dimension) if dimension == expected => Ok(dimension),
            Some(dimension) => Err(IndexError::DimensionMismatch {
                expected,
                actual: dimension,
            }
            .into()),
            None => {
                tracing::info!("No index for {}; creating an empty one", user);
                self.index.create(user, expected).await?;
                Ok(expected)
            }
        }
    }

    /// A new id not used by any row or index record of the user.
    pub async fn fresh_id(&self, user: &UserId) -> Result<String, StoreError> {
        let taken = self.known_ids(user).await?;
        loop {
            let candidate = Uuid::new_v4().to_string();
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
    }

    pub async fn contains(&self, user: &UserId, id: &str) -> Result<bool, StoreError> {
        Ok(self.known_ids(user).await?.contains(id))
    }

    async fn known_ids(&self, user: &UserId) -> Result<HashSet<String>, StoreError> {
        let mut ids: HashSet<String> = self.row_ids(user).await?.into_iter().collect();
        ids.extend(self.index.ids(user).await?);
        Ok(ids)
    }

    pub async fn add_entry(&self, user: &UserId, entry: &DiaryEntry) -> Result<(), StoreError> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        self.load_index_for_user(user).await?;

        if self.contains(user, &entry.id).await? {
            return Err(StoreError::DuplicateId(entry.id.clone()));
        }

        let vector = self
            .embeddings
            .generate_embedding_with_retry(&entry.content)
            .await?;

        self.index
            .add(
                user,
                IndexRecord {
                    id: entry.id.clone(),
                    vector,
                    content: entry.content.clone(),
                    metadata: entry.index_metadata(),
                },
            )
            .await?;

        let row_user = user.clone();
        let row = entry.clone();
        if let Err(e) = self
            .with_rows(move |rows| rows.append(&row_user, &row))
            .await
        {
            tracing::error!(
                "Entry {} for {} is in the index but its row failed: {}",
                entry.id,
                user,
                e
            );
            return Err(StoreError::PersistenceInconsistency {
                id: entry.id.clone(),
                reason: e.to_string(),
            });
        }

        tracing::info!("Stored entry {} for {}", entry.id, user);
        Ok(())
    }

    pub async fn similarity_search(
        &self,
        user: &UserId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.load_index_for_user(user).await?;
        Ok(self.index.search(user, query, k).await?)
    }

    /// Embed `text` and search with it.
    pub async fn search_text(
        &self,
        user: &UserId,
        text: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, StoreError> {
        let query = self.embeddings.generate_embedding_with_retry(text).await?;
        self.similarity_search(user, &query, k).await
    }

    pub async fn entries(&self, user: &UserId) -> Result<Vec<DiaryEntry>, StoreError> {
        let user = user.clone();
        Ok(self.with_rows(move |rows| rows.load_all(&user)).await?)
    }

    pub async fn reconcile(&self, user: &UserId) -> Result<ReconciliationReport, StoreError> {
        let row_ids = self.row_ids(user).await?;
        let index_ids = self.index.ids(user).await?;

        let rows: HashSet<&String> = row_ids.iter().collect();
        let indexed: HashSet<&String> = index_ids.iter().collect();

        let mut only_in_rows: Vec<String> = rows.difference(&indexed).map(|s| s.to_string()).collect();
        let mut only_in_index: Vec<String> =
            indexed.difference(&rows).map(|s| s.to_string()).collect();
        only_in_rows.sort();
        only_in_index.sort();

        let report = ReconciliationReport {
            row_count: row_ids.len(),
            index_count: index_ids.len(),
            only_in_rows,
            only_in_index,
        };
        if !report.is_consistent() {
            tracing::warn!(
                "Store for {} is inconsistent: {} only in rows, {} only in index",
                user,
                report.only_in_rows.len(),
                report.only_in_index.len()
            );
        }
        Ok(report)
    }
}
