//! Strategy contract shared by every indexing backend.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::embedding::EmbeddingClientError;
use crate::execution::CanonicalDocument;
use crate::store::StoreError;

/// Failures raised inside a strategy. The dispatcher logs them and degrades to `false` or an
/// empty result set.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Persisting or reading index records failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The embedding backend could not vectorize the input.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Index records could not be encoded.
    #[error("failed to encode index record: {0}")]
    Encode(#[from] serde_json::Error),
    /// Input rejected by the strategy or preprocessor.
    #[error("{0}")]
    Rejected(String),
}

/// Ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Matching document.
    pub document_id: String,
    /// Relevance; higher is better. Scales differ between strategies.
    pub score: f32,
    /// Best-matching chunk text when the strategy keeps text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Pluggable indexing backend.
#[async_trait]
pub trait IndexStrategy: Send + Sync {
    /// Index a canonical document. `Ok(false)` means the strategy declined it.
    async fn index_document(&self, document: &CanonicalDocument) -> Result<bool, StrategyError>;

    /// Return at most `top_k` hits ordered by descending score.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, StrategyError>;
}

/// Hook applied to every document before a strategy sees it.
pub trait DocumentPreprocessor: Send + Sync {
    /// Return the document to index.
    fn preprocess(&self, document: &CanonicalDocument) -> Result<CanonicalDocument, StrategyError>;
}

/// Preprocessor that passes documents through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPreprocessor;

impl DocumentPreprocessor for IdentityPreprocessor {
    fn preprocess(&self, document: &CanonicalDocument) -> Result<CanonicalDocument, StrategyError> {
        Ok(document.clone())
    }
}

/// Chunks to index: the document's chunks, or its whole content when it has none. Blank
/// entries are dropped.
pub(crate) fn indexable_chunks(document: &CanonicalDocument) -> Vec<String> {
    let chunks: Vec<String> = if document.chunks.is_empty() {
        vec![document.content.clone()]
    } else {
        document.chunks.clone()
    };
    chunks
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

/// Order hits by descending score and keep the first `top_k`.
pub(crate) fn rank(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    hits.truncate(top_k);
    hits
}
