//! Two-stage validation gate for pipeline definitions.
//!
//! Stage one checks structural completeness on the raw value so callers get precise messages
//! about missing pieces. Stage two is the schema gate: the value must deserialize into
//! [`PipelineDefinition`], which enforces `name`/`description` as strings and `elements` as an
//! array of `{type: string, config: object}`.

use serde::Deserialize;
use serde_json::Value;

use super::types::{PipelineDefinition, ValidationError};

const REQUIRED_COMPONENTS: [&str; 3] = ["name", "description", "elements"];

/// Run both validation stages and return the typed definition.
pub fn validate_definition(definition: &Value) -> Result<PipelineDefinition, ValidationError> {
    check_structure(definition)?;
    check_schema(definition)
}

/// Verify required components and per-element `type`/`config` presence.
pub(crate) fn check_structure(definition: &Value) -> Result<(), ValidationError> {
    let object = definition.as_object().ok_or(ValidationError::NotAnObject)?;
    for component in REQUIRED_COMPONENTS {
        if !object.contains_key(component) {
            return Err(ValidationError::MissingComponent(component));
        }
    }

    // A non-array `elements` is left for the schema stage to reject.
    if let Some(elements) = object.get("elements").and_then(Value::as_array) {
        for (index, element) in elements.iter().enumerate() {
            let complete = element
                .as_object()
                .is_some_and(|fields| fields.contains_key("type") && fields.contains_key("config"));
            if !complete {
                return Err(ValidationError::InvalidElement {
                    index,
                    element: element.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Enforce the fixed definition schema by deserializing into the typed model.
pub(crate) fn check_schema(definition: &Value) -> Result<PipelineDefinition, ValidationError> {
    PipelineDefinition::deserialize(definition)
        .map_err(|error| ValidationError::Schema(error.to_string()))
}
