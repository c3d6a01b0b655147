//! Term graph strategy: documents link to the terms they mention, weighted by frequency.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::strategy::{IndexStrategy, SearchHit, StrategyError, indexable_chunks, rank};
use crate::execution::CanonicalDocument;
use crate::store::MetadataStore;

/// Key prefix of every document node.
pub const GRAPH_INDEX_PREFIX: &str = "knowledge_graph::";

const MIN_TERM_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "and", "are", "but", "can", "for", "from", "had", "has", "have", "her", "his", "its", "not",
    "our", "she", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "was", "were", "what", "when", "which", "who", "will", "with", "you", "your",
];

#[derive(Debug, Serialize, Deserialize)]
struct DocumentNode {
    document_id: String,
    /// Edges to term nodes, weighted by occurrence count.
    terms: BTreeMap<String, u32>,
}

impl DocumentNode {
    fn total_weight(&self) -> u32 {
        self.terms.values().sum()
    }
}

/// Lowercase alphanumeric terms of at least three characters, stop words removed.
pub(crate) fn extract_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Strategy scoring documents by the share of their term weight that the query touches.
pub struct KnowledgeGraphStrategy {
    store: Arc<dyn MetadataStore>,
}

impl KnowledgeGraphStrategy {
    /// Strategy persisting document nodes in `store`.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IndexStrategy for KnowledgeGraphStrategy {
    async fn index_document(&self, document: &CanonicalDocument) -> Result<bool, StrategyError> {
        let mut terms: BTreeMap<String, u32> = BTreeMap::new();
        for chunk in indexable_chunks(document) {
            for term in extract_terms(&chunk) {
                *terms.entry(term).or_default() += 1;
            }
        }
        if terms.is_empty() {
            tracing::warn!(document = %document.id, "Document has no indexable terms");
            return Ok(false);
        }

        let node = DocumentNode {
            document_id: document.id.clone(),
            terms,
        };
        tracing::debug!(document = %document.id, terms = node.terms.len(), "Graph node updated");
        self.store
            .put(
                &format!("{GRAPH_INDEX_PREFIX}{}", document.id),
                serde_json::to_value(node)?,
            )
            .await?;
        Ok(true)
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, StrategyError> {
        let mut query_terms = extract_terms(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for key in self.store.query_keys_by_prefix(GRAPH_INDEX_PREFIX).await? {
            let Some(document) = self.store.get(&key).await? else {
                continue;
            };
            let Ok(node) = serde_json::from_value::<DocumentNode>(document) else {
                continue;
            };
            let matched: u32 = query_terms
                .iter()
                .filter_map(|term| node.terms.get(term))
                .sum();
            if matched == 0 {
                continue;
            }
            let covered = query_terms
                .iter()
                .filter(|term| node.terms.contains_key(*term))
                .count();
            // Coverage of the query dominates; term density breaks ties.
            let score = covered as f32 + matched as f32 / node.total_weight() as f32;
            hits.push(SearchHit {
                document_id: node.document_id,
                score,
                snippet: None,
            });
        }
        Ok(rank(hits, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn document(id: &str, content: &str) -> CanonicalDocument {
        CanonicalDocument {
            id: id.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn term_extraction_filters_noise() {
        assert_eq!(
            extract_terms("The Rust compiler, and its borrow-checker: go!"),
            ["rust", "compiler", "borrow", "checker"]
        );
    }

    #[tokio::test]
    async fn stores_weighted_terms() {
        let store = Arc::new(MemoryStore::new());
        let strategy = KnowledgeGraphStrategy::new(store.clone());
        assert!(strategy
            .index_document(&document("doc", "cache cache eviction"))
            .await
            .unwrap());

        let node = store.get("knowledge_graph::doc").await.unwrap().unwrap();
        assert_eq!(node["terms"]["cache"], 2);
        assert_eq!(node["terms"]["eviction"], 1);
    }

    #[tokio::test]
    async fn declines_documents_without_terms() {
        let strategy = KnowledgeGraphStrategy::new(Arc::new(MemoryStore::new()));
        assert!(!strategy.index_document(&document("doc", "a an to")).await.unwrap());
    }

    #[tokio::test]
    async fn search_prefers_documents_covering_more_terms() {
        let strategy = KnowledgeGraphStrategy::new(Arc::new(MemoryStore::new()));
        strategy
            .index_document(&document("both", "parser tokens lexer"))
            .await
            .unwrap();
        strategy
            .index_document(&document("one", "parser parser parser"))
            .await
            .unwrap();
        strategy
            .index_document(&document("none", "gardening tips"))
            .await
            .unwrap();

        let hits = strategy.search("parser lexer", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.document_id.as_str()).collect();
        assert_eq!(ids, ["both", "one"]);
        assert!(strategy.search("the and", 10).await.unwrap().is_empty());
    }
}
