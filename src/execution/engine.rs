//! Pipeline execution engine.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::composer::load_definition;
use crate::indexing::IndexingDispatcher;
use crate::metrics::PipelineMetrics;
use crate::store::MetadataStore;

use super::context::ExecutionContext;
use super::element::{Component, ElementError};
use super::registry::ElementRegistry;

/// Fatal execution errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No definition is stored under the requested id.
    #[error("Pipeline with id {0} not found")]
    PipelineNotFound(String),
    /// An element type is not registered.
    #[error("Cannot resolve element type '{element_type}'")]
    ElementResolution {
        /// Unresolvable type identifier.
        element_type: String,
    },
    /// An element raised an unrecognized failure.
    #[error("Error executing {element_type} at position {position}: {source}")]
    Element {
        /// Type identifier of the failing element.
        element_type: String,
        /// Zero-based position in the pipeline.
        position: usize,
        /// Original failure.
        #[source]
        source: anyhow::Error,
    },
}

/// How a non-fatal run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every element ran and asked to continue.
    Completed,
    /// An element returned `false`.
    Stopped {
        /// Type of the stopping element.
        element_type: String,
        /// Its position.
        position: usize,
    },
    /// An element reported a recognized pipeline failure.
    Halted {
        /// Type of the failing element.
        element_type: String,
        /// Its position.
        position: usize,
        /// Rendered failure.
        reason: String,
    },
}

/// Result of one execution: the final context plus how the run went.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// Pipeline that ran.
    pub pipeline_id: String,
    /// Context as left by the last element.
    pub context: ExecutionContext,
    /// Completion status.
    pub status: RunStatus,
    /// Number of elements that were invoked (passive ones excluded).
    pub elements_run: usize,
    /// Post-run indexing result; `None` when no document was ready to index.
    pub indexed: Option<bool>,
}

/// Runs stored pipelines against caller-supplied contexts.
///
/// Contexts are owned by a single call and never shared or persisted. The element registry and
/// its instance cache are shared by every concurrent execution.
pub struct PipelineExecutor {
    store: Arc<dyn MetadataStore>,
    registry: Arc<ElementRegistry>,
    dispatcher: Arc<IndexingDispatcher>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineExecutor {
    /// Assemble an executor from its collaborators.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        registry: Arc<ElementRegistry>,
        dispatcher: Arc<IndexingDispatcher>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
            metrics,
        }
    }

    /// Execution counters shared with this executor.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Load `pipeline_id`, run its elements in order over `context`, then index the result.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        mut context: ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let definition = load_definition(self.store.as_ref(), pipeline_id)
            .await
            .ok_or_else(|| ExecutionError::PipelineNotFound(pipeline_id.to_string()))?;
        self.metrics.record_started();
        tracing::info!(
            pipeline = pipeline_id,
            elements = definition.elements.len(),
            "Executing pipeline"
        );

        let mut status = RunStatus::Completed;
        let mut elements_run = 0;
        for (position, spec) in definition.elements.iter().enumerate() {
            let element_type = spec.element_type.as_str();
            tracing::info!(pipeline = pipeline_id, element_type, position, "Executing element");

            let Some(component) = self.registry.resolve(element_type) else {
                tracing::error!(pipeline = pipeline_id, element_type, "Unknown element type");
                self.metrics.record_failed();
                return Err(ExecutionError::ElementResolution {
                    element_type: element_type.to_string(),
                });
            };
            let element = match component {
                Component::Executable(element) => element,
                Component::Passive => {
                    tracing::warn!(
                        pipeline = pipeline_id,
                        element_type,
                        "Element has no executable entry point; skipping"
                    );
                    continue;
                }
            };

            elements_run += 1;
            match element.execute(&spec.config, &mut context).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(
                        pipeline = pipeline_id,
                        element_type,
                        "Pipeline execution stopped by element"
                    );
                    status = RunStatus::Stopped {
                        element_type: element_type.to_string(),
                        position,
                    };
                    break;
                }
                Err(ElementError::Pipeline(failure)) => {
                    tracing::error!(
                        pipeline = pipeline_id,
                        element_type,
                        error = %failure,
                        "Pipeline failure; halting"
                    );
                    status = RunStatus::Halted {
                        element_type: element_type.to_string(),
                        position,
                        reason: failure.to_string(),
                    };
                    break;
                }
                Err(ElementError::Unexpected(source)) => {
                    tracing::error!(
                        pipeline = pipeline_id,
                        element_type,
                        error = %source,
                        "Error executing element"
                    );
                    self.metrics.record_failed();
                    return Err(ExecutionError::Element {
                        element_type: element_type.to_string(),
                        position,
                        source,
                    });
                }
            }
        }

        match &status {
            RunStatus::Completed => self.metrics.record_completed(),
            RunStatus::Stopped { .. } | RunStatus::Halted { .. } => self.metrics.record_stopped(),
        }

        let indexed = self.index_processed_document(pipeline_id, &context).await;
        Ok(ExecutionOutcome {
            pipeline_id: pipeline_id.to_string(),
            context,
            status,
            elements_run,
            indexed,
        })
    }

    async fn index_processed_document(
        &self,
        pipeline_id: &str,
        context: &ExecutionContext,
    ) -> Option<bool> {
        let Some(document) = context.processed_document.as_ref() else {
            tracing::warn!(
                pipeline = pipeline_id,
                "No processed document found in context for indexing"
            );
            return None;
        };

        let indexed = match self.dispatcher.index_document(document, None).await {
            Ok(indexed) => indexed,
            Err(error) => {
                tracing::error!(pipeline = pipeline_id, error = %error, "Dispatch failed");
                false
            }
        };
        if indexed {
            self.metrics.record_indexed();
        } else {
            tracing::error!(
                pipeline = pipeline_id,
                document = %document.id,
                "Failed to index the processed document"
            );
        }
        Some(indexed)
    }
}
