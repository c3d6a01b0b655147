//! Pipeline composition: schema validation and persistence of pipeline definitions.

mod schema;
mod service;
pub mod types;

pub use schema::validate_definition;
pub use service::{PipelineComposer, derive_pipeline_id};
pub(crate) use service::load_definition;
pub use types::{ComposerError, ElementSpec, PipelineDefinition, ValidationError};
