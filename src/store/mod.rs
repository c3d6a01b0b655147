//! Metadata store interface and adapters.
//!
//! Every core component talks to persistence through [`MetadataStore`]: a plain key-value
//! document store with prefix enumeration. Adapters report failures as [`StoreError`]; callers
//! in the core degrade those failures to empty or `false` results after logging them.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Singleton key holding the ordered set of known pipeline ids.
pub const PIPELINES_LIST_KEY: &str = "pipelines_list";

/// Prefix shared by every indexing job record.
pub const JOB_KEY_PREFIX: &str = "indexing_metadata:";

/// Errors raised by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem or transport failure.
    #[error("store I/O failed for key '{key}': {source}")]
    Io {
        /// Key being read or written.
        key: String,
        /// Original I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Stored bytes could not be decoded as JSON.
    #[error("stored document '{key}' is not valid JSON: {source}")]
    Corrupt {
        /// Key whose document failed to decode.
        key: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Key cannot be represented by the adapter.
    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

/// Key-value document store consumed by the composer, engine, tracker, and dispatcher.
///
/// Implementations must provide read-after-write consistency for a single key within one
/// process. No multi-key transactions are assumed.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the document stored under `id`, or `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or replace the document stored under `id`.
    async fn put(&self, id: &str, document: Value) -> Result<(), StoreError>;

    /// List every key starting with `prefix`, in ascending key order.
    async fn query_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Key of a persisted pipeline definition.
pub fn pipeline_key(pipeline_id: &str) -> String {
    format!("pipeline::{pipeline_id}")
}

/// Key of an indexing job record.
pub fn job_key(job_id: &uuid::Uuid) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

/// Key of the per-document index metadata record.
pub fn index_metadata_key(document_id: &str) -> String {
    format!("index_metadata::{document_id}")
}

/// Read a key, logging and swallowing adapter failures.
pub(crate) async fn get_or_log(store: &dyn MetadataStore, key: &str) -> Option<Value> {
    match store.get(key).await {
        Ok(document) => document,
        Err(error) => {
            tracing::error!(key, error = %error, "Store read failed");
            None
        }
    }
}

/// Write a key, logging adapter failures and reporting success as a flag.
pub(crate) async fn put_or_log(store: &dyn MetadataStore, key: &str, document: Value) -> bool {
    match store.put(key, document).await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(key, error = %error, "Store write failed");
            false
        }
    }
}

/// Enumerate keys by prefix, logging adapter failures as an empty listing.
pub(crate) async fn keys_or_log(store: &dyn MetadataStore, prefix: &str) -> Vec<String> {
    match store.query_keys_by_prefix(prefix).await {
        Ok(keys) => keys,
        Err(error) => {
            tracing::error!(prefix, error = %error, "Store prefix query failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn key_conventions_are_stable() {
        assert_eq!(pipeline_key("ingest"), "pipeline::ingest");
        assert_eq!(index_metadata_key("doc-1"), "index_metadata::doc-1");
        let id = Uuid::nil();
        assert_eq!(
            job_key(&id),
            "indexing_metadata:00000000-0000-0000-0000-000000000000"
        );
    }
}
