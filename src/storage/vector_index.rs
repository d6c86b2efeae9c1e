use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::UserId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    #[error("no index exists for user {0}")]
    NotFound(String),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("id {0} is already indexed")]
    DuplicateId(String),
    #[error("index I/O error: {0}")]
    Io(String),
    #[error("index backend error: {0}")]
    Backend(String),
}

/// One stored vector with the text it was computed from and a metadata copy
/// of the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    /// Cosine similarity; higher is closer
    pub score: f32,
}

/// Per-user nearest-neighbour index.
///
/// Every user owns an independent index pinned to one vector dimension at
/// creation time.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimension of the user's index, or `None` if it does not exist yet.
    async fn open(&self, user: &UserId) -> Result<Option<usize>, IndexError>;

    /// Create an empty index. Creating an index that already exists is a no-op.
    async fn create(&self, user: &UserId, dimension: usize) -> Result<(), IndexError>;

    async fn add(&self, user: &UserId, record: IndexRecord) -> Result<(), IndexError>;

    /// Up to `k` records, nearest first.
    async fn search(
        &self,
        user: &UserId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError>;

    async fn ids(&self, user: &UserId) -> Result<Vec<String>, IndexError>;
}
