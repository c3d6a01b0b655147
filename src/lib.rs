#![deny(missing_docs)]

//! Core library for composing, executing, and indexing document-processing pipelines.

/// Pipeline definition validation and persistence.
pub mod composer;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and the hashing embedder.
pub mod embedding;
/// Execution context, element contract, registry, and engine.
pub mod execution;
/// Indexing jobs, strategies, and dispatch.
pub mod indexing;
/// Job runner that feeds files through pipelines.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Execution counters.
pub mod metrics;
/// Metadata store interface and adapters.
pub mod store;
