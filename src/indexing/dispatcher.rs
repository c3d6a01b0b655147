//! Strategy registry and dispatch, with per-document index metadata.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use super::graph::KnowledgeGraphStrategy;
use super::strategy::{DocumentPreprocessor, IdentityPreprocessor, IndexStrategy, SearchHit};
use super::vector::VectorStoreStrategy;
use crate::embedding::EmbeddingClient;
use crate::execution::CanonicalDocument;
use crate::store::{self, MetadataStore, index_metadata_key};

/// Name of the embedding-backed strategy.
pub const VECTOR_STORE: &str = "vector_store";
/// Name of the term graph strategy.
pub const KNOWLEDGE_GRAPH: &str = "knowledge_graph";

/// Errors surfaced to dispatcher callers. Strategy failures are not among them; those degrade
/// to `false` or an empty result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexingError {
    /// No strategy is registered under the requested name.
    #[error("Unknown indexing strategy: {0}")]
    UnknownStrategy(String),
}

/// Outcome recorded for one strategy in a document's index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyIndexEntry {
    /// Whether the strategy accepted the document.
    pub indexed: bool,
    /// Time of the indexing attempt.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Per-document record under `index_metadata::<doc_id>`, one entry per strategy.
pub type IndexMetadataRecord = BTreeMap<String, StrategyIndexEntry>;

/// Routes documents and queries to named strategies.
pub struct IndexingDispatcher {
    store: Arc<dyn MetadataStore>,
    strategies: RwLock<HashMap<String, Arc<dyn IndexStrategy>>>,
    default_strategy: RwLock<String>,
    preprocessor: Arc<dyn DocumentPreprocessor>,
    metadata_lock: tokio::sync::Mutex<()>,
}

impl IndexingDispatcher {
    /// Dispatcher with no strategies registered and `vector_store` as the default name.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            strategies: RwLock::new(HashMap::new()),
            default_strategy: RwLock::new(VECTOR_STORE.to_string()),
            preprocessor: Arc::new(IdentityPreprocessor),
            metadata_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Dispatcher with `vector_store` and `knowledge_graph` registered over the same store.
    pub fn with_default_strategies(
        store: Arc<dyn MetadataStore>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        let dispatcher = Self::new(store.clone());
        dispatcher.add_strategy(
            VECTOR_STORE,
            Arc::new(VectorStoreStrategy::new(store.clone(), embedder)),
        );
        dispatcher.add_strategy(KNOWLEDGE_GRAPH, Arc::new(KnowledgeGraphStrategy::new(store)));
        dispatcher
    }

    /// Replace the preprocessing hook.
    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn DocumentPreprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Register or replace a strategy under `name`.
    pub fn add_strategy(&self, name: impl Into<String>, strategy: Arc<dyn IndexStrategy>) {
        let name = name.into();
        tracing::info!(strategy = %name, "Registered indexing strategy");
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, strategy);
    }

    /// Change the strategy used when callers pass no name.
    pub fn set_default_strategy(&self, name: &str) -> Result<(), IndexingError> {
        if !self.has_strategy(name) {
            return Err(IndexingError::UnknownStrategy(name.to_string()));
        }
        *self
            .default_strategy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.to_string();
        Ok(())
    }

    /// Current default strategy name.
    pub fn default_strategy(&self) -> String {
        self.default_strategy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registered strategy names, sorted.
    pub fn strategy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_strategy(&self, name: &str) -> bool {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn resolve(&self, name: Option<&str>) -> Result<(String, Arc<dyn IndexStrategy>), IndexingError> {
        let name = name.map_or_else(|| self.default_strategy(), str::to_string);
        let strategy = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned();
        match strategy {
            Some(strategy) => Ok((name, strategy)),
            None => Err(IndexingError::UnknownStrategy(name)),
        }
    }

    /// Preprocess and index `document` with the named (or default) strategy.
    ///
    /// Returns `Ok(false)` when the strategy declines, errors, or panics. On success the
    /// strategy's entry is merged into the document's index metadata; a failed metadata write
    /// is logged and does not change the result.
    pub async fn index_document(
        &self,
        document: &CanonicalDocument,
        strategy: Option<&str>,
    ) -> Result<bool, IndexingError> {
        let (name, strategy) = self.resolve(strategy)?;

        let prepared = match self.preprocessor.preprocess(document) {
            Ok(prepared) => prepared,
            Err(error) => {
                tracing::error!(document = %document.id, error = %error, "Preprocessing failed");
                return Ok(false);
            }
        };

        let outcome = AssertUnwindSafe(strategy.index_document(&prepared))
            .catch_unwind()
            .await;
        let indexed = match outcome {
            Ok(Ok(indexed)) => indexed,
            Ok(Err(error)) => {
                tracing::error!(
                    strategy = %name,
                    document = %prepared.id,
                    error = %error,
                    "Indexing failed"
                );
                false
            }
            Err(_) => {
                tracing::error!(strategy = %name, document = %prepared.id, "Indexing strategy panicked");
                false
            }
        };

        if indexed {
            self.record_indexed(&prepared.id, &name).await;
            tracing::info!(strategy = %name, document = %prepared.id, "Document indexed");
        }
        Ok(indexed)
    }

    /// Search with the named (or default) strategy. Strategy failures yield an empty list.
    pub async fn search(
        &self,
        query: &str,
        strategy: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexingError> {
        let (name, strategy) = self.resolve(strategy)?;
        let outcome = AssertUnwindSafe(strategy.search(query, top_k))
            .catch_unwind()
            .await;
        Ok(match outcome {
            Ok(Ok(hits)) => hits,
            Ok(Err(error)) => {
                tracing::error!(strategy = %name, error = %error, "Search failed");
                Vec::new()
            }
            Err(_) => {
                tracing::error!(strategy = %name, "Search strategy panicked");
                Vec::new()
            }
        })
    }

    /// Index metadata for a document; empty when it was never indexed or cannot be read.
    pub async fn get_index_status(&self, document_id: &str) -> IndexMetadataRecord {
        let Some(document) = store::get_or_log(self.store.as_ref(), &index_metadata_key(document_id)).await
        else {
            return IndexMetadataRecord::new();
        };
        serde_json::from_value(document).unwrap_or_else(|error| {
            tracing::warn!(document = document_id, error = %error, "Index metadata is malformed");
            IndexMetadataRecord::new()
        })
    }

    async fn record_indexed(&self, document_id: &str, strategy: &str) {
        let _guard = self.metadata_lock.lock().await;
        let mut record = self.get_index_status(document_id).await;
        record.insert(
            strategy.to_string(),
            StrategyIndexEntry {
                indexed: true,
                timestamp: OffsetDateTime::now_utc(),
            },
        );
        let written = match serde_json::to_value(&record) {
            Ok(value) => {
                store::put_or_log(self.store.as_ref(), &index_metadata_key(document_id), value).await
            }
            Err(error) => {
                tracing::error!(document = document_id, error = %error, "Failed to encode index metadata");
                false
            }
        };
        if !written {
            tracing::warn!(
                document = document_id,
                strategy,
                "Document indexed but index metadata was not recorded"
            );
        }
    }
}
