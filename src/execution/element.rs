//! Element contract and failure taxonomy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use super::context::ExecutionContext;

/// One unit of pipeline work.
///
/// A single instance is cached per element type and may run concurrently for independent
/// executions, so implementations must not keep unguarded mutable state. Per-run data belongs
/// in the context; per-use configuration arrives through `config`.
#[async_trait]
pub trait PipelineElement: Send + Sync {
    /// Run against `context`. `Ok(true)` continues the pipeline, `Ok(false)` stops it cleanly.
    async fn execute(
        &self,
        config: &Map<String, Value>,
        context: &mut ExecutionContext,
    ) -> Result<bool, ElementError>;
}

/// What a registered element type resolves to.
#[derive(Clone)]
pub enum Component {
    /// A runnable element.
    Executable(Arc<dyn PipelineElement>),
    /// A known type without an executable entry point; the engine skips it.
    Passive,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executable(_) => f.write_str("Component::Executable"),
            Self::Passive => f.write_str("Component::Passive"),
        }
    }
}

/// Expected, domain-level failure reported by an element.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFailure {
    /// What went wrong.
    pub message: String,
    /// Element or step that raised it.
    pub step: Option<String>,
    /// Structured diagnostic details.
    pub details: Map<String, Value>,
}

impl PipelineFailure {
    /// Failure with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step: None,
            details: Map::new(),
        }
    }

    /// Attach the step that failed.
    pub fn at_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Attach a diagnostic detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline Error: {}", self.message)?;
        if let Some(step) = &self.step {
            write!(f, " (Step: {step})")?;
        }
        if !self.details.is_empty() {
            write!(f, " - Details: {}", Value::Object(self.details.clone()))?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineFailure {}

/// Failure raised while an element runs.
#[derive(Debug, Error)]
pub enum ElementError {
    /// Recognized failure: logged, halts the pipeline, not propagated.
    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
    /// Anything else: logged and propagated to the caller.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}
