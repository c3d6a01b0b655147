//! In-process store backed by an ordered map.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{MetadataStore, StoreError};

/// Volatile store for tests and one-shot runs. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn put(&self, id: &str, document: Value) -> Result<(), StoreError> {
        self.documents.write().await.insert(id.to_string(), document);
        Ok(())
    }

    async fn query_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
