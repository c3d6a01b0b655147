//! Built-in pipeline elements.
//!
//! Pre/post-conditions on the context:
//!
//! | element | requires | produces |
//! |---|---|---|
//! | `DocParserHandler` | `document` | `doc_type`, `parser` |
//! | `DocParser` | `document`, `parser` | `parsed_content` |
//! | `CanonicalModel` | `parsed_content` (non-empty text) | `canonical_document` |
//! | `RAGIndexer` | `canonical_document` | `indexed_document`, `processed_document` |
//! | `IndexCheck` | `indexed_document` | `index_check_result` |
//!
//! A missing input stops the run (`Ok(false)`) rather than failing it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::context::{
    CanonicalDocument, ExecutionContext, IndexCheckResult, IndexedDocument, ParsedContent,
};
use super::element::{Component, ElementError, PipelineElement, PipelineFailure};
use super::registry::ElementRegistry;

/// Type id of [`DocParserHandler`].
pub const DOC_PARSER_HANDLER: &str = "docpipe.retrieval.DocParserHandler";
/// Type id of [`DocParser`].
pub const DOC_PARSER: &str = "docpipe.retrieval.DocParser";
/// Type id of [`CanonicalModel`].
pub const CANONICAL_MODEL: &str = "docpipe.core.CanonicalModel";
/// Type id of [`RagIndexer`].
pub const RAG_INDEXER: &str = "docpipe.retrieval.RAGIndexer";
/// Type id of [`IndexCheck`].
pub const INDEX_CHECK: &str = "docpipe.retrieval.IndexCheck";

/// Every built-in type id, in typical pipeline order.
pub const BUILTIN_TYPES: [&str; 5] = [
    DOC_PARSER_HANDLER,
    DOC_PARSER,
    CANONICAL_MODEL,
    RAG_INDEXER,
    INDEX_CHECK,
];

const DEFAULT_CHUNK_SEPARATOR: &str = "\n\n";
const INDEX_STATUS_COMPLETED: &str = "completed";

/// Install the built-in element factories.
pub(crate) fn register_builtins(registry: &mut ElementRegistry) {
    registry.register(DOC_PARSER_HANDLER, || {
        Component::Executable(Arc::new(DocParserHandler))
    });
    registry.register(DOC_PARSER, || Component::Executable(Arc::new(DocParser)));
    registry.register(CANONICAL_MODEL, || {
        Component::Executable(Arc::new(CanonicalModel))
    });
    registry.register(RAG_INDEXER, || Component::Executable(Arc::new(RagIndexer)));
    registry.register(INDEX_CHECK, || Component::Executable(Arc::new(IndexCheck)));
}

fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// Detects the document type and selects a parser for it.
pub struct DocParserHandler;

impl DocParserHandler {
    fn parser_for(doc_type: &str) -> &'static str {
        match doc_type {
            "pdf" => "PDFParser",
            "docx" => "DocxParser",
            "txt" => "TextParser",
            _ => "GenericParser",
        }
    }
}

#[async_trait]
impl PipelineElement for DocParserHandler {
    async fn execute(
        &self,
        _config: &Map<String, Value>,
        context: &mut ExecutionContext,
    ) -> Result<bool, ElementError> {
        let Some(document) = context.document.as_ref() else {
            tracing::warn!("No document found in context");
            return Ok(false);
        };
        let doc_type = document
            .file_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        context.parser = Some(Self::parser_for(&doc_type).to_string());
        context.doc_type = Some(doc_type);
        Ok(true)
    }
}

/// Extracts text from the document with the selected parser.
///
/// Config: `parser_type` overrides the parser chosen upstream.
pub struct DocParser;

#[async_trait]
impl PipelineElement for DocParser {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        context: &mut ExecutionContext,
    ) -> Result<bool, ElementError> {
        let parser = config_str(config, "parser_type")
            .map(str::to_string)
            .or_else(|| context.parser.clone());
        let (Some(document), Some(parser)) = (context.document.as_ref(), parser) else {
            tracing::warn!("Missing document or parser in context");
            return Ok(false);
        };

        let Some(text) = document.content.clone() else {
            let mut failure = PipelineFailure::new("document has no content to parse")
                .at_step(DOC_PARSER)
                .with_detail("parser", Value::String(parser));
            if let Some(path) = &document.file_path {
                failure = failure.with_detail("file_path", Value::String(path.clone()));
            }
            return Err(failure.into());
        };

        tracing::debug!(parser = %parser, bytes = text.len(), "Parsed document");
        context.parsed_content = Some(ParsedContent {
            text,
            metadata: document.metadata.clone(),
        });
        context.parser = Some(parser);
        Ok(true)
    }
}

/// Turns parsed content into the canonical document model.
///
/// Config: `chunk_separator` overrides the blank-line chunk boundary.
pub struct CanonicalModel;

impl CanonicalModel {
    fn chunk(content: &str, separator: &str) -> Vec<String> {
        content
            .split(separator)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl PipelineElement for CanonicalModel {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        context: &mut ExecutionContext,
    ) -> Result<bool, ElementError> {
        let Some(parsed) = context
            .parsed_content
            .as_ref()
            .filter(|parsed| !parsed.text.is_empty())
        else {
            tracing::warn!("No parsed content found in context");
            return Ok(false);
        };

        let separator = config_str(config, "chunk_separator")
            .filter(|separator| !separator.is_empty())
            .unwrap_or(DEFAULT_CHUNK_SEPARATOR);
        let id = parsed
            .metadata
            .get("id")
            .and_then(|id| match id {
                Value::String(id) => Some(id.clone()),
                Value::Number(id) => Some(id.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "unknown".to_string());

        context.canonical_document = Some(CanonicalDocument {
            id,
            content: parsed.text.clone(),
            metadata: parsed.metadata.clone(),
            chunks: Self::chunk(&parsed.text, separator),
        });
        Ok(true)
    }
}

/// Plans index identifiers for the canonical document and stages it for dispatch.
pub struct RagIndexer;

#[async_trait]
impl PipelineElement for RagIndexer {
    async fn execute(
        &self,
        _config: &Map<String, Value>,
        context: &mut ExecutionContext,
    ) -> Result<bool, ElementError> {
        let Some(canonical) = context.canonical_document.as_ref() else {
            tracing::warn!("No canonical document found in context");
            return Ok(false);
        };

        context.indexed_document = Some(IndexedDocument {
            id: canonical.id.clone(),
            vector_id: Some(format!("vector_{}", canonical.id)),
            graph_id: Some(format!("graph_{}", canonical.id)),
            index_status: INDEX_STATUS_COMPLETED.to_string(),
        });
        context.processed_document = Some(canonical.clone());
        Ok(true)
    }
}

/// Sanity-checks the index plan; the run continues only when every check passes.
pub struct IndexCheck;

#[async_trait]
impl PipelineElement for IndexCheck {
    async fn execute(
        &self,
        _config: &Map<String, Value>,
        context: &mut ExecutionContext,
    ) -> Result<bool, ElementError> {
        let Some(indexed) = context.indexed_document.as_ref() else {
            tracing::warn!("No indexed document found in context");
            return Ok(false);
        };

        let passed = indexed.vector_id.is_some()
            && indexed.graph_id.is_some()
            && indexed.index_status == INDEX_STATUS_COMPLETED;
        let message = if passed {
            "All checks passed"
        } else {
            "Some checks failed"
        };
        context.index_check_result = Some(IndexCheckResult {
            passed,
            message: message.to_string(),
        });
        Ok(passed)
    }
}
