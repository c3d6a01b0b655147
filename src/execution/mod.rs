//! Pipeline execution: typed context, element contract, registry, engine, built-in elements.

pub mod context;
mod element;
pub mod elements;
mod engine;
mod registry;

pub use context::{
    CanonicalDocument, ExecutionContext, IndexCheckResult, IndexedDocument, ParsedContent,
    SourceDocument,
};
pub use element::{Component, ElementError, PipelineElement, PipelineFailure};
pub use engine::{ExecutionError, ExecutionOutcome, PipelineExecutor, RunStatus};
pub use registry::ElementRegistry;
