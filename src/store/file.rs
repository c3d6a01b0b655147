//! Store that keeps one JSON file per key under a base directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::{MetadataStore, StoreError};

const EXTENSION: &str = ".json";

/// Directory-backed document store.
///
/// Writes go to a sibling temporary file and are renamed into place, so a reader never sees a
/// half-written document.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `base_path`, creating the directory when missing.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|source| StoreError::Io {
                key: base_path.display().to_string(),
                source,
            })?;
        tracing::debug!(path = %base_path.display(), "Opened file store");
        Ok(Self { base_path })
    }

    /// Directory holding the documents.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn document_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(format!("{key}{EXTENSION}")))
    }
}

#[async_trait]
impl MetadataStore for FileStore {
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: id.to_string(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: id.to_string(),
                source,
            })
    }

    async fn put(&self, id: &str, document: Value) -> Result<(), StoreError> {
        let path = self.document_path(id)?;
        let bytes = serde_json::to_vec(&document).map_err(|source| StoreError::Corrupt {
            key: id.to_string(),
            source,
        })?;
        let staging = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let io_error = |source| StoreError::Io {
            key: id.to_string(),
            source,
        };
        tokio::fs::write(&staging, bytes).await.map_err(io_error)?;
        tokio::fs::rename(&staging, &path).await.map_err(io_error)?;
        Ok(())
    }

    async fn query_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let io_error = |source| StoreError::Io {
            key: prefix.to_string(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.base_path)
            .await
            .map_err(io_error)?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(EXTENSION)
                && key.starts_with(prefix)
            {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = FileStore::open(dir.path()).await.expect("open");
            store
                .put("pipeline::ingest", json!({ "name": "ingest" }))
                .await
                .expect("put");
        }

        let reopened = FileStore::open(dir.path()).await.expect("reopen");
        let document = reopened.get("pipeline::ingest").await.expect("get");
        assert_eq!(document, Some(json!({ "name": "ingest" })));
        assert_eq!(reopened.get("pipeline::other").await.expect("get"), None);
    }

    #[tokio::test]
    async fn prefix_query_ignores_staging_and_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).await.expect("open");
        store.put("indexing_metadata:b", json!({})).await.unwrap();
        store.put("indexing_metadata:a", json!({})).await.unwrap();
        store.put("pipelines_list", json!({})).await.unwrap();
        std::fs::write(dir.path().join("indexing_metadata:c.json.tmp"), b"{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let keys = store.query_keys_by_prefix("indexing_metadata:").await.unwrap();
        assert_eq!(keys, vec!["indexing_metadata:a", "indexing_metadata:b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_to_one_key_all_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = std::sync::Arc::new(FileStore::open(dir.path()).await.expect("open"));
        let handles: Vec<_> = (0..16)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.put("pipelines_list", json!({ "n": n })).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("put");
        }

        let document = store.get("pipelines_list").await.unwrap().expect("stored");
        assert!(document["n"].is_u64());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).await.expect("open");
        let err = store.put("../escape", json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn corrupt_documents_surface_as_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).await.expect("open");
        std::fs::write(dir.path().join("broken.json"), b"not json").unwrap();
        let err = store.get("broken").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
