//! Pipeline definition types and composer errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Validated pipeline definition as persisted under `pipeline::<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Human-readable pipeline name.
    pub name: String,
    /// Free-form description of what the pipeline does.
    pub description: String,
    /// Ordered elements executed by the engine.
    pub elements: Vec<ElementSpec>,
    /// Any further top-level keys, kept as submitted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One typed element of a pipeline, with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Fully-qualified element type identifier resolved through the element registry.
    #[serde(rename = "type")]
    pub element_type: String,
    /// Element-specific configuration handed to the element on every run.
    pub config: Map<String, Value>,
    /// Any further element keys, kept as submitted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementSpec {
    /// Build an element spec with the given type and configuration.
    pub fn new(element_type: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            element_type: element_type.into(),
            config,
            extra: Map::new(),
        }
    }
}

/// Reasons a pipeline definition is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The definition is not a JSON object.
    #[error("pipeline definition must be an object")]
    NotAnObject,
    /// A mandatory top-level component is absent.
    #[error("Missing required component: {0}")]
    MissingComponent(&'static str),
    /// An element lacks `type` or `config`.
    #[error("Invalid element structure at position {index}: {element}")]
    InvalidElement {
        /// Zero-based element position.
        index: usize,
        /// The offending element as received.
        element: String,
    },
    /// The definition has the right keys but the wrong shape.
    #[error("Invalid pipeline composition: {0}")]
    Schema(String),
    /// Pre-serialized input could not be parsed at all.
    #[error("pipeline definition is not valid JSON: {0}")]
    Malformed(String),
}

/// Errors returned by composer operations other than pure validation.
#[derive(Debug, Error)]
pub enum ComposerError {
    /// The definition failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No pipeline is stored under the requested id.
    #[error("Pipeline with id {0} not found")]
    NotFound(String),
}
