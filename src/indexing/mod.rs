//! Indexing: job tracking, pluggable strategies, and the dispatcher routing between them.

mod dispatcher;
mod graph;
mod jobs;
mod strategy;
mod vector;

pub use dispatcher::{
    IndexMetadataRecord, IndexingDispatcher, IndexingError, KNOWLEDGE_GRAPH, StrategyIndexEntry,
    VECTOR_STORE,
};
pub use graph::{GRAPH_INDEX_PREFIX, KnowledgeGraphStrategy};
pub use jobs::{FileRecord, IndexingJob, JobError, JobStatus, JobTracker, UnknownStatus};
pub use strategy::{
    DocumentPreprocessor, IdentityPreprocessor, IndexStrategy, SearchHit, StrategyError,
};
pub use vector::{VECTOR_INDEX_PREFIX, VectorStoreStrategy, compute_chunk_hash};
