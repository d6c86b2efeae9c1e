//! Flat on-disk index: one JSON file per user, brute-force cosine search.

use async_trait::async_trait;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::vector_index::{IndexError, IndexHit, IndexRecord, VectorIndex};
use crate::models::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    records: Vec<IndexRecord>,
}

pub struct LocalIndex {
    dir: PathBuf,
    cache: RwLock<HashMap<String, IndexFile>>,
}

impl LocalIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, user: &UserId) -> PathBuf {
        self.dir.join(format!("{}.json", user))
    }

    async fn read_file(path: &Path) -> Result<Option<IndexFile>, IndexError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| IndexError::Io(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexError::Io(e.to_string())),
        }
    }

    /// Write to a sibling temp file and rename over the target.
    async fn write_file(&self, path: &Path, file: &IndexFile) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| IndexError::Io(e.to_string()))?;

        let bytes = serde_json::to_vec(file).map_err(|e| IndexError::Io(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| IndexError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| IndexError::Io(e.to_string()))
    }

    /// Load the user's index into the cache if it is on disk.
    async fn load(&self, user: &UserId) -> Result<Option<IndexFile>, IndexError> {
        if let Some(file) = self.cache.read().await.get(user.as_str()) {
            return Ok(Some(file.clone()));
        }

        let loaded = Self::read_file(&self.path_for(user)).await?;
        if let Some(file) = &loaded {
            tracing::debug!(
                "Loaded index for {} ({} records, dim {})",
                user,
                file.records.len(),
                file.dimension
            );
            // An add may have cached a newer copy while the file was read.
            let mut cache = self.cache.write().await;
            let cached = cache
                .entry(user.as_str().to_string())
                .or_insert_with(|| file.clone());
            return Ok(Some(cached.clone()));
        }
        Ok(loaded)
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norms = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norms == 0.0 {
        0.0
    } else {
        a.dot(&b) / norms
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn open(&self, user: &UserId) -> Result<Option<usize>, IndexError> {
        Ok(self.load(user).await?.map(|file| file.dimension))
    }

    async fn create(&self, user: &UserId, dimension: usize) -> Result<(), IndexError> {
        let mut cache = self.cache.write().await;
        if cache.contains_key(user.as_str()) {
            return Ok(());
        }
        let path = self.path_for(user);
        if let Some(existing) = Self::read_file(&path).await? {
            cache.insert(user.as_str().to_string(), existing);
            return Ok(());
        }

        let file = IndexFile {
            dimension,
            records: Vec::new(),
        };
        self.write_file(&path, &file).await?;
        cache.insert(user.as_str().to_string(), file);

        tracing::info!("Created local index for {} with dimension {}", user, dimension);
        Ok(())
    }

    async fn add(&self, user: &UserId, record: IndexRecord) -> Result<(), IndexError> {
        // Hold the write lock across the disk write so concurrent adds for
        // the same user cannot interleave.
        let mut cache = self.cache.write().await;
        let mut file = match cache.get(user.as_str()) {
            Some(file) => file.clone(),
            None => Self::read_file(&self.path_for(user))
                .await?
                .ok_or_else(|| IndexError::NotFound(user.to_string()))?,
        };

        if record.vector.len() != file.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: file.dimension,
                actual: record.vector.len(),
            });
        }
        if file.records.iter().any(|r| r.id == record.id) {
            return Err(IndexError::DuplicateId(record.id));
        }

        file.records.push(record);
        self.write_file(&self.path_for(user), &file).await?;
        cache.insert(user.as_str().to_string(), file);
        Ok(())
    }

    async fn search(
        &self,
        user: &UserId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let file = self
            .load(user)
            .await?
            .ok_or_else(|| IndexError::NotFound(user.to_string()))?;

        if query.len() != file.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: file.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<IndexHit> = file
            .records
            .into_iter()
            .map(|record| IndexHit {
                score: cosine_similarity(query, &record.vector),
                id: record.id,
                content: record.content,
                metadata: record.metadata,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn ids(&self, user: &UserId) -> Result<Vec<String>, IndexError> {
        Ok(self
            .load(user)
            .await?
            .map(|file| file.records.into_iter().map(|r| r.id).collect())
            .unwrap_or_default())
    }
}
