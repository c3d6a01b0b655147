//! Embedding-backed strategy storing one vector record per chunk.
//!
//! Records live under `vector_index::<document_id>::<chunk_index>`. Re-indexing a document
//! reuses records whose chunk hash is unchanged and retires records for chunks that no longer
//! exist, since the store offers no delete.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::strategy::{IndexStrategy, SearchHit, StrategyError, indexable_chunks, rank};
use crate::embedding::{EmbeddingClient, cosine_similarity};
use crate::execution::CanonicalDocument;
use crate::store::MetadataStore;

/// Key prefix of every vector record.
pub const VECTOR_INDEX_PREFIX: &str = "vector_index::";

#[derive(Debug, Serialize, Deserialize)]
struct VectorRecord {
    document_id: String,
    chunk_index: usize,
    chunk_hash: String,
    text: String,
    vector: Vec<f32>,
}

/// Deterministic SHA-256 hex digest of a chunk.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Strategy ranking chunks by cosine similarity to the embedded query.
pub struct VectorStoreStrategy {
    store: Arc<dyn MetadataStore>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl VectorStoreStrategy {
    /// Strategy persisting vectors in `store` and embedding through `embedder`.
    pub fn new(store: Arc<dyn MetadataStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    fn chunk_key(document_id: &str, chunk_index: usize) -> String {
        format!("{VECTOR_INDEX_PREFIX}{document_id}::{chunk_index}")
    }

    /// Existing chunk keys of a document, keyed by chunk index.
    async fn existing_chunks(&self, document_id: &str) -> Result<HashMap<usize, String>, StrategyError> {
        let prefix = format!("{VECTOR_INDEX_PREFIX}{document_id}::");
        let keys = self.store.query_keys_by_prefix(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let index = key.strip_prefix(&prefix)?.parse::<usize>().ok()?;
                Some((index, key))
            })
            .collect())
    }

    async fn stored_hash(&self, key: &str) -> Result<Option<String>, StrategyError> {
        let Some(document) = self.store.get(key).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_value::<VectorRecord>(document)
            .ok()
            .map(|record| record.chunk_hash))
    }
}

#[async_trait]
impl IndexStrategy for VectorStoreStrategy {
    async fn index_document(&self, document: &CanonicalDocument) -> Result<bool, StrategyError> {
        let chunks = indexable_chunks(document);
        if chunks.is_empty() {
            tracing::warn!(document = %document.id, "Document has no text to embed");
            return Ok(false);
        }

        let existing = self.existing_chunks(&document.id).await?;
        let mut pending = Vec::new();
        for (chunk_index, text) in chunks.iter().enumerate() {
            let chunk_hash = compute_chunk_hash(text);
            if let Some(key) = existing.get(&chunk_index)
                && self.stored_hash(key).await?.as_deref() == Some(chunk_hash.as_str())
            {
                continue;
            }
            pending.push((chunk_index, chunk_hash, text.clone()));
        }

        if !pending.is_empty() {
            let texts = pending.iter().map(|(_, _, text)| text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            if vectors.len() != pending.len() {
                return Err(StrategyError::Rejected(format!(
                    "embedding backend returned {} vectors for {} chunks",
                    vectors.len(),
                    pending.len()
                )));
            }
            for ((chunk_index, chunk_hash, text), vector) in pending.iter().cloned().zip(vectors) {
                let record = VectorRecord {
                    document_id: document.id.clone(),
                    chunk_index,
                    chunk_hash,
                    text,
                    vector,
                };
                self.store
                    .put(&Self::chunk_key(&document.id, chunk_index), serde_json::to_value(record)?)
                    .await?;
            }
        }

        let mut retired = 0;
        for (chunk_index, key) in existing {
            if chunk_index >= chunks.len() {
                self.store.put(&key, json!({ "retired": true })).await?;
                retired += 1;
            }
        }

        tracing::debug!(
            document = %document.id,
            chunks = chunks.len(),
            embedded = pending.len(),
            retired,
            "Vector index updated"
        );
        Ok(true)
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, StrategyError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StrategyError::Rejected("no embedding for query".to_string()))?;

        let mut best: HashMap<String, SearchHit> = HashMap::new();
        for key in self.store.query_keys_by_prefix(VECTOR_INDEX_PREFIX).await? {
            let Some(document) = self.store.get(&key).await? else {
                continue;
            };
            let Ok(record) = serde_json::from_value::<VectorRecord>(document) else {
                continue;
            };
            let score = cosine_similarity(&query_vector, &record.vector);
            let better = best
                .get(&record.document_id)
                .is_none_or(|current| score > current.score);
            if better {
                best.insert(
                    record.document_id.clone(),
                    SearchHit {
                        document_id: record.document_id,
                        score,
                        snippet: Some(record.text),
                    },
                );
            }
        }
        Ok(rank(best.into_values().collect(), top_k))
    }
}
