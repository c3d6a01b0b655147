//! Composer service: validation plus persistence of pipeline definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{self, MetadataStore, PIPELINES_LIST_KEY, pipeline_key};

use super::schema::validate_definition;
use super::types::{ComposerError, PipelineDefinition, ValidationError};

/// Shape of the singleton pipelines index record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PipelinesIndex {
    #[serde(default)]
    pipelines: Vec<String>,
}

/// Validates, stores, and enumerates pipeline definitions.
///
/// Persisting touches two keys: the definition itself and the shared pipelines index. The two
/// writes are not transactional; a crash in between leaves a stored but unlisted pipeline.
pub struct PipelineComposer {
    store: Arc<dyn MetadataStore>,
    index_lock: tokio::sync::Mutex<()>,
}

impl PipelineComposer {
    /// Build a composer on top of the given store.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            index_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Validate a raw definition and return its typed form.
    pub fn compose_pipeline(&self, definition: &Value) -> Result<PipelineDefinition, ValidationError> {
        let composed = validate_definition(definition)?;
        tracing::debug!(
            name = %composed.name,
            elements = composed.elements.len(),
            "Pipeline composed"
        );
        Ok(composed)
    }

    /// Re-validate and store a definition under `pipeline_id`, then register the id.
    ///
    /// Returns `Ok(false)` when the store rejected the definition write; the index is left
    /// untouched in that case.
    pub async fn persist_pipeline(
        &self,
        pipeline_id: &str,
        definition: &Value,
    ) -> Result<bool, ValidationError> {
        let validated = validate_definition(definition)?;
        Ok(self.persist_validated(pipeline_id, &validated, definition.clone()).await)
    }

    /// Parse pre-serialized JSON, then persist it like [`Self::persist_pipeline`].
    pub async fn persist_pipeline_json(
        &self,
        pipeline_id: &str,
        raw: &str,
    ) -> Result<bool, ValidationError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|error| ValidationError::Malformed(error.to_string()))?;
        self.persist_pipeline(pipeline_id, &value).await
    }

    /// Store an already-typed definition.
    pub async fn persist_definition(
        &self,
        pipeline_id: &str,
        definition: &PipelineDefinition,
    ) -> Result<bool, ValidationError> {
        let value = serde_json::to_value(definition)
            .map_err(|error| ValidationError::Schema(error.to_string()))?;
        self.persist_pipeline(pipeline_id, &value).await
    }

    /// Write the definition exactly as submitted; the typed form only gated it.
    async fn persist_validated(
        &self,
        pipeline_id: &str,
        definition: &PipelineDefinition,
        document: Value,
    ) -> bool {
        if !store::put_or_log(self.store.as_ref(), &pipeline_key(pipeline_id), document).await {
            return false;
        }
        self.update_index(pipeline_id, true).await;
        tracing::info!(
            pipeline = pipeline_id,
            name = %definition.name,
            elements = definition.elements.len(),
            "Pipeline persisted"
        );
        true
    }

    /// Load the definition stored under `pipeline_id`.
    pub async fn load_pipeline(&self, pipeline_id: &str) -> Result<PipelineDefinition, ComposerError> {
        load_definition(self.store.as_ref(), pipeline_id)
            .await
            .ok_or_else(|| ComposerError::NotFound(pipeline_id.to_string()))
    }

    /// Ids from the pipelines index, in registration order.
    pub async fn list_pipelines(&self) -> Vec<String> {
        self.read_index().await.pipelines
    }

    /// Drop `pipeline_id` from the pipelines index. The stored definition is not deleted.
    pub async fn remove_from_index(&self, pipeline_id: &str) -> bool {
        self.update_index(pipeline_id, false).await
    }

    async fn read_index(&self) -> PipelinesIndex {
        let Some(document) = store::get_or_log(self.store.as_ref(), PIPELINES_LIST_KEY).await else {
            return PipelinesIndex::default();
        };
        serde_json::from_value(document).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Pipelines index is malformed; treating as empty");
            PipelinesIndex::default()
        })
    }

    /// Read-modify-write of the shared index, serialized within this composer.
    async fn update_index(&self, pipeline_id: &str, add: bool) -> bool {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await;
        if add {
            if !index.pipelines.iter().any(|id| id == pipeline_id) {
                index.pipelines.push(pipeline_id.to_string());
            }
        } else {
            index.pipelines.retain(|id| id != pipeline_id);
        }
        let document = serde_json::json!({ "pipelines": index.pipelines });
        store::put_or_log(self.store.as_ref(), PIPELINES_LIST_KEY, document).await
    }
}

/// Read and decode a stored definition; store and decode failures read as absent.
pub(crate) async fn load_definition(
    store: &dyn MetadataStore,
    pipeline_id: &str,
) -> Option<PipelineDefinition> {
    let document = store::get_or_log(store, &pipeline_key(pipeline_id)).await?;
    match serde_json::from_value(document) {
        Ok(definition) => Some(definition),
        Err(error) => {
            tracing::error!(pipeline = pipeline_id, error = %error, "Stored pipeline is malformed");
            None
        }
    }
}

/// Derive a pipeline id from its display name (`"Doc Flow"` → `"pipeline_doc_flow"`).
pub fn derive_pipeline_id(name: &str) -> String {
    format!("pipeline_{}", name.trim().to_lowercase().replace(' ', "_"))
}
