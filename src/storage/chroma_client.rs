use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::vector_index::{IndexError, IndexHit, IndexRecord, VectorIndex};
use crate::models::UserId;

#[derive(Error, Debug)]
pub enum ChromaError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Chroma API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

impl From<ChromaError> for IndexError {
    fn from(err: ChromaError) -> Self {
        match err {
            ChromaError::CollectionNotFound(name) => IndexError::NotFound(name),
            other => IndexError::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChromaAddRequest {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    metadatas: Vec<Value>,
    documents: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChromaQueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    n_results: u32,
    include: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    ids: Vec<Vec<String>>,
    distances: Option<Vec<Vec<f32>>>,
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    documents: Option<Vec<Vec<Option<String>>>>,
}

#[derive(Debug, Deserialize)]
struct ChromaGetResponse {
    ids: Vec<String>,
}

struct CollectionInfo {
    id: String,
    dimension: Option<usize>,
}

/// ChromaDB client using HTTP API v2; each user gets the collection
/// `journal_<user>` in cosine space.
pub struct ChromaClient {
    base_url: String,
    client: Client,
    tenant: String,
    database: String,
}

impl ChromaClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
        }
    }

    pub fn collection_name(user: &UserId) -> String {
        format!("journal_{}", user)
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    fn collection_operation_url(&self, collection_id: &str, operation: &str) -> String {
        format!("{}/{}/{}", self.collections_url(), collection_id, operation)
    }

    async fn api_error(response: reqwest::Response) -> ChromaError {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(message) => ChromaError::ApiError { status, message },
            Err(e) => ChromaError::HttpError(e),
        }
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>, ChromaError> {
        let url = format!("{}/{}", self.collections_url(), name);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let collection: Value = response.json().await?;
                let id = collection["id"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ChromaError::CollectionNotFound(name.to_string()))?;
                let dimension = collection["metadata"]["dimension"]
                    .as_u64()
                    .or_else(|| collection["dimension"].as_u64())
                    .map(|d| d as usize);
                Ok(Some(CollectionInfo { id, dimension }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn require_collection(&self, user: &UserId) -> Result<CollectionInfo, ChromaError> {
        let name = Self::collection_name(user);
        self.get_collection(&name)
            .await?
            .ok_or(ChromaError::CollectionNotFound(name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), ChromaError> {
        let body = json!({
            "name": name,
            "metadata": {
                "hnsw:space": "cosine",
                "dimension": dimension
            },
            "get_or_create": true
        });

        let response = self
            .client
            .post(self.collections_url())
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::info!("Created collection {} with dimension {}", name, dimension);
                Ok(())
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn get_ids(
        &self,
        collection_id: &str,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>, ChromaError> {
        let mut body = json!({ "include": [] });
        if let Some(ids) = ids {
            body["ids"] = json!(ids);
        }

        let response = self
            .client
            .post(self.collection_operation_url(collection_id, "get"))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<ChromaGetResponse>().await?.ids),
            _ => Err(Self::api_error(response).await),
        }
    }

    /// Health check against the v2 heartbeat endpoint
    pub async fn ping(&self) -> Result<(), ChromaError> {
        let url = format!("{}/api/v2/heartbeat", self.base_url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

/// Chroma metadata values must be scalars: lists become `"; "`-joined text and
/// nested objects are flattened to dotted keys. Nulls are dropped.
pub(crate) fn flatten_metadata(metadata: &Value) -> Value {
    fn walk(prefix: &str, value: &Value, out: &mut Map<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    let key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&key, inner, out);
                }
            }
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                out.insert(prefix.to_string(), Value::String(joined));
            }
            Value::Null => {}
            scalar => {
                out.insert(prefix.to_string(), scalar.clone());
            }
        }
    }

    let mut out = Map::new();
    walk("", metadata, &mut out);
    Value::Object(out)
}

fn parse_query_results(response: ChromaQueryResponse) -> Vec<IndexHit> {
    let Some(ids) = response.ids.into_iter().next() else {
        return Vec::new();
    };
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let metadatas = response
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let documents = response
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    ids.into_iter()
        .enumerate()
        .map(|(idx, id)| IndexHit {
            id,
            // Cosine distance back to similarity
            score: 1.0 - distances.get(idx).copied().unwrap_or(1.0),
            metadata: metadatas
                .get(idx)
                .cloned()
                .flatten()
                .unwrap_or_else(|| json!({})),
            content: documents.get(idx).cloned().flatten().unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl VectorIndex for ChromaClient {
    async fn open(&self, user: &UserId) -> Result<Option<usize>, IndexError> {
        let name = Self::collection_name(user);
        match self.get_collection(&name).await? {
            Some(info) => Ok(Some(info.dimension.ok_or_else(|| {
                IndexError::Backend(format!("collection {} has no dimension metadata", name))
            })?)),
            None => Ok(None),
        }
    }

    async fn create(&self, user: &UserId, dimension: usize) -> Result<(), IndexError> {
        Ok(self
            .create_collection(&Self::collection_name(user), dimension)
            .await?)
    }

    async fn add(&self, user: &UserId, record: IndexRecord) -> Result<(), IndexError> {
        let collection = self.require_collection(user).await?;

        if let Some(expected) = collection.dimension {
            if expected != record.vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: record.vector.len(),
                });
            }
        }

        let existing = self
            .get_ids(&collection.id, Some(vec![record.id.clone()]))
            .await?;
        if !existing.is_empty() {
            return Err(IndexError::DuplicateId(record.id));
        }

        let request = ChromaAddRequest {
            ids: vec![record.id.clone()],
            embeddings: vec![record.vector],
            metadatas: vec![flatten_metadata(&record.metadata)],
            documents: vec![record.content],
        };

        let response = self
            .client
            .post(self.collection_operation_url(&collection.id, "add"))
            .json(&request)
            .send()
            .await
            .map_err(ChromaError::from)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::trace!("Added vector {} for {}", record.id, user);
                Ok(())
            }
            _ => Err(Self::api_error(response).await.into()),
        }
    }

    async fn search(
        &self,
        user: &UserId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let collection = self.require_collection(user).await?;

        let request = ChromaQueryRequest {
            query_embeddings: vec![query.to_vec()],
            n_results: k as u32,
            include: vec![
                "distances".to_string(),
                "metadatas".to_string(),
                "documents".to_string(),
            ],
        };

        let response = self
            .client
            .post(self.collection_operation_url(&collection.id, "query"))
            .json(&request)
            .send()
            .await
            .map_err(ChromaError::from)?;

        match response.status() {
            StatusCode::OK => {
                let body: ChromaQueryResponse =
                    response.json().await.map_err(ChromaError::from)?;
                Ok(parse_query_results(body))
            }
            _ => Err(Self::api_error(response).await.into()),
        }
    }

    async fn ids(&self, user: &UserId) -> Result<Vec<String>, IndexError> {
        match self.get_collection(&Self::collection_name(user)).await? {
            Some(collection) => Ok(self.get_ids(&collection.id, None).await?),
            None => Ok(Vec::new()),
        }
    }
}
