use std::sync::Arc;

use docpipe::composer::{PipelineComposer, derive_pipeline_id};
use docpipe::embedding::HashingEmbedder;
use docpipe::execution::{
    ElementRegistry, ExecutionContext, ExecutionError, PipelineExecutor, RunStatus,
    SourceDocument, elements,
};
use docpipe::indexing::{IndexingDispatcher, JobStatus, JobTracker, KNOWLEDGE_GRAPH, VECTOR_STORE};
use docpipe::ingest::IngestionService;
use docpipe::metrics::PipelineMetrics;
use docpipe::store::{FileStore, MemoryStore, MetadataStore};
use regex::Regex;
use serde_json::{Map, Value, json};

struct Harness {
    store: Arc<dyn MetadataStore>,
    composer: PipelineComposer,
    dispatcher: Arc<IndexingDispatcher>,
    executor: Arc<PipelineExecutor>,
    tracker: Arc<JobTracker>,
}

impl Harness {
    fn new(store: Arc<dyn MetadataStore>) -> Self {
        let dispatcher = Arc::new(IndexingDispatcher::with_default_strategies(
            store.clone(),
            Arc::new(HashingEmbedder::new(64)),
        ));
        let executor = Arc::new(PipelineExecutor::new(
            store.clone(),
            Arc::new(ElementRegistry::with_builtins()),
            dispatcher.clone(),
            Arc::new(PipelineMetrics::new()),
        ));
        Self {
            composer: PipelineComposer::new(store.clone()),
            tracker: Arc::new(JobTracker::new(store.clone())),
            store,
            dispatcher,
            executor,
        }
    }

    fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    async fn persist_rag_pipeline(&self) -> String {
        let definition = json!({
            "name": "RAG Ingest",
            "description": "Parse, normalize, and index documents",
            "elements": [
                { "type": elements::DOC_PARSER_HANDLER, "config": {} },
                { "type": elements::DOC_PARSER, "config": {} },
                { "type": elements::CANONICAL_MODEL, "config": {} },
                { "type": elements::RAG_INDEXER, "config": {} },
                { "type": elements::INDEX_CHECK, "config": {} }
            ]
        });
        let id = derive_pipeline_id("RAG Ingest");
        assert!(self.composer.persist_pipeline(&id, &definition).await.unwrap());
        id
    }
}

fn text_document(id: &str, content: &str) -> SourceDocument {
    let mut metadata = Map::new();
    metadata.insert("id".into(), Value::String(id.into()));
    SourceDocument {
        file_path: Some(format!("{id}.txt")),
        file_type: Some("txt".into()),
        content: Some(content.into()),
        metadata,
    }
}

#[tokio::test]
async fn builtin_pipeline_indexes_and_becomes_searchable() {
    let harness = Harness::in_memory();
    let pipeline_id = harness.persist_rag_pipeline().await;
    assert_eq!(pipeline_id, "pipeline_rag_ingest");
    assert_eq!(harness.composer.list_pipelines().await, [pipeline_id.clone()]);

    let context = ExecutionContext::with_document(text_document(
        "borrowck",
        "The borrow checker enforces aliasing rules.\n\nLifetimes describe reference validity.",
    ));
    let outcome = harness
        .executor
        .execute_pipeline(&pipeline_id, context)
        .await
        .expect("run");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.elements_run, 5);
    assert_eq!(outcome.indexed, Some(true));
    assert_eq!(outcome.context.parser.as_deref(), Some("TextParser"));
    let canonical = outcome.context.canonical_document.as_ref().expect("canonical");
    assert_eq!(canonical.chunks.len(), 2);
    assert!(outcome.context.index_check_result.as_ref().unwrap().passed);

    let status = harness.dispatcher.get_index_status("borrowck").await;
    assert!(status[VECTOR_STORE].indexed);

    let hits = harness
        .dispatcher
        .search("Lifetimes describe reference validity.", None, 3)
        .await
        .unwrap();
    assert_eq!(hits[0].document_id, "borrowck");
    assert_eq!(harness.executor.metrics().snapshot().documents_indexed, 1);
}

#[tokio::test]
async fn index_metadata_accumulates_across_strategies() {
    let harness = Harness::in_memory();
    let pipeline_id = harness.persist_rag_pipeline().await;
    let outcome = harness
        .executor
        .execute_pipeline(
            &pipeline_id,
            ExecutionContext::with_document(text_document("doc-7", "graph nodes and edges")),
        )
        .await
        .unwrap();
    let document = outcome.context.processed_document.expect("staged document");

    assert!(harness
        .dispatcher
        .index_document(&document, Some(KNOWLEDGE_GRAPH))
        .await
        .unwrap());

    let raw = harness
        .store
        .get("index_metadata::doc-7")
        .await
        .unwrap()
        .expect("metadata record");
    let object = raw.as_object().unwrap();
    assert_eq!(object.len(), 2);
    let timestamp = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$").unwrap();
    for strategy in [VECTOR_STORE, KNOWLEDGE_GRAPH] {
        assert_eq!(object[strategy]["indexed"], true);
        assert!(timestamp.is_match(object[strategy]["timestamp"].as_str().unwrap()));
    }
}

#[tokio::test]
async fn recognized_failure_halts_but_unknown_pipeline_errors() {
    let harness = Harness::in_memory();
    let pipeline_id = harness.persist_rag_pipeline().await;

    let mut document = text_document("empty", "");
    document.content = None;
    let outcome = harness
        .executor
        .execute_pipeline(&pipeline_id, ExecutionContext::with_document(document))
        .await
        .unwrap();
    match outcome.status {
        RunStatus::Halted { element_type, position, reason } => {
            assert_eq!(element_type, elements::DOC_PARSER);
            assert_eq!(position, 1);
            assert!(reason.starts_with("Pipeline Error:"));
        }
        other => panic!("expected halt, got {other:?}"),
    }
    assert_eq!(outcome.indexed, None);

    let err = harness
        .executor
        .execute_pipeline("pipeline_missing", ExecutionContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::PipelineNotFound(id) if id == "pipeline_missing"));
}

#[tokio::test]
async fn ingestion_tracks_each_file_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("guide.txt");
    let empty = dir.path().join("empty.txt");
    std::fs::write(&good, "Install the toolchain.\n\nRun the tests.").unwrap();
    std::fs::write(&empty, "").unwrap();
    let missing = dir.path().join("missing.txt");

    let harness = Harness::in_memory();
    let pipeline_id = harness.persist_rag_pipeline().await;
    let service = IngestionService::new(harness.tracker.clone(), harness.executor.clone());

    let paths: Vec<String> = [&good, &empty, &missing]
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let job = service.ingest(&pipeline_id, paths.clone()).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_files, 3);
    assert_eq!((job.completed_files, job.failed_files), (1, 2));
    assert!(job.end_time.is_some());
    assert_eq!(job.files[0].status, JobStatus::Completed);
    assert!(job.files[1].error_message.as_deref().unwrap().contains("stopped"));
    assert!(job.files[2].error_message.as_deref().unwrap().contains("failed to read"));
    assert!(harness.tracker.get_pending_files(job.job_id).await.unwrap().is_empty());

    let hits = harness
        .dispatcher
        .search("Run the tests.", None, 1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].document_id.starts_with("guide-"));

    let all = harness.tracker.get_all_jobs().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].job_id, job.job_id);
}

#[tokio::test]
async fn duplicate_paths_in_a_job_run_once() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "Only one run is expected.").unwrap();
    let path = file.display().to_string();

    let harness = Harness::in_memory();
    let pipeline_id = harness.persist_rag_pipeline().await;
    let service = IngestionService::new(harness.tracker.clone(), harness.executor.clone());
    let job = service
        .ingest(&pipeline_id, vec![path.clone(), path])
        .await
        .unwrap();

    assert_eq!(harness.executor.metrics().snapshot().executions_started, 1);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.completed_files, job.failed_files), (2, 0));
    assert!(job.files.iter().all(|file| file.status == JobStatus::Completed));
}

#[tokio::test]
async fn file_store_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let job_id = {
        let harness = Harness::new(Arc::new(FileStore::open(dir.path()).await.unwrap()));
        harness.persist_rag_pipeline().await;
        harness
            .tracker
            .create_job(vec!["a.txt".into(), "b.txt".into()])
            .await
    };

    let harness = Harness::new(Arc::new(FileStore::open(dir.path()).await.unwrap()));
    assert_eq!(harness.composer.list_pipelines().await, ["pipeline_rag_ingest"]);
    let definition = harness
        .composer
        .load_pipeline("pipeline_rag_ingest")
        .await
        .unwrap();
    assert_eq!(definition.elements.len(), 5);

    let job = harness
        .tracker
        .update_file_status(job_id, "a.txt", JobStatus::InProgress, None)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(
        harness.tracker.get_pending_files(job_id).await.unwrap(),
        ["b.txt"]
    );
}
