//! Typed execution context threaded through one pipeline run.
//!
//! Each known stage output has its own optional field. Adjacent elements agree on these fields
//! implicitly through the pipeline an operator composed; every element checks for the inputs it
//! needs and stops the run when they are missing. Keys outside the known stages live in
//! [`ExecutionContext::extras`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current layout version of [`ExecutionContext`].
pub const CONTEXT_VERSION: u32 = 1;

fn current_version() -> u32 {
    CONTEXT_VERSION
}

/// Mutable state owned by exactly one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Layout version, for callers that persist contexts between releases.
    #[serde(default = "current_version")]
    pub version: u32,
    /// Raw input document supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<SourceDocument>,
    /// Document type detected by the parser handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Parser selected for the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
    /// Text and metadata produced by parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<ParsedContent>,
    /// Canonical model of the parsed document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_document: Option<CanonicalDocument>,
    /// Index plan produced for the canonical document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_document: Option<IndexedDocument>,
    /// Outcome of the post-index sanity checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_check_result: Option<IndexCheckResult>,
    /// Document handed to the indexing dispatcher once the run ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_document: Option<CanonicalDocument>,
    /// Free-form values for stages without a dedicated field.
    #[serde(default, flatten)]
    pub extras: Map<String, Value>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            version: CONTEXT_VERSION,
            document: None,
            doc_type: None,
            parser: None,
            parsed_content: None,
            canonical_document: None,
            indexed_document: None,
            index_check_result: None,
            processed_document: None,
            extras: Map::new(),
        }
    }
}

impl ExecutionContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with an input document.
    pub fn with_document(document: SourceDocument) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    /// Read a free-form value.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Store a free-form value, returning the previous one.
    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.extras.insert(key.into(), value)
    }
}

/// Input document as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Path the document was read from, when it came from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Declared file type (`pdf`, `docx`, `txt`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Raw textual content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Caller metadata; an `id` entry names the resulting canonical document.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Output of the parsing stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedContent {
    /// Extracted text.
    pub text: String,
    /// Metadata carried over from the source document.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Normalized document shape shared by every indexing strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    /// Stable document identifier.
    pub id: String,
    /// Full text content.
    pub content: String,
    /// Arbitrary metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Content split into indexable chunks.
    #[serde(default)]
    pub chunks: Vec<String>,
}

/// Index plan for a canonical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Canonical document id.
    pub id: String,
    /// Identifier reserved in the vector index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
    /// Identifier reserved in the knowledge graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    /// Status label, `completed` once both identifiers are assigned.
    pub index_status: String,
}

/// Result of the index sanity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCheckResult {
    /// Whether every check passed.
    pub passed: bool,
    /// Human-readable summary.
    pub message: String,
}
