//! Job runner feeding each pending file of an indexing job through a pipeline.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::execution::{ExecutionContext, PipelineExecutor, RunStatus, SourceDocument};
use crate::indexing::{IndexingJob, JobError, JobStatus, JobTracker, compute_chunk_hash};

/// Runs indexing jobs file by file.
pub struct IngestionService {
    tracker: Arc<JobTracker>,
    executor: Arc<PipelineExecutor>,
}

impl IngestionService {
    /// Service updating jobs through `tracker` and running files on `executor`.
    pub fn new(tracker: Arc<JobTracker>, executor: Arc<PipelineExecutor>) -> Self {
        Self { tracker, executor }
    }

    /// Create a job for `paths` and run it through `pipeline_id`.
    pub async fn ingest(&self, pipeline_id: &str, paths: Vec<String>) -> Result<IndexingJob, JobError> {
        let job_id = self.tracker.create_job(paths).await;
        self.run_job(pipeline_id, job_id).await
    }

    /// Process every file of `job_id` that is still pending, sequentially, and return the
    /// job as left by the last update.
    pub async fn run_job(&self, pipeline_id: &str, job_id: Uuid) -> Result<IndexingJob, JobError> {
        let mut pending = self.tracker.get_pending_files(job_id).await?;
        // Updates apply to every entry with the same path, so each path runs once.
        let mut seen = HashSet::new();
        pending.retain(|path| seen.insert(path.clone()));
        tracing::info!(job = %job_id, pipeline = pipeline_id, files = pending.len(), "Running indexing job");

        for file_path in pending {
            self.tracker
                .update_file_status(job_id, &file_path, JobStatus::InProgress, None)
                .await?;
            let (status, error) = match self.process_file(pipeline_id, &file_path).await {
                Ok(()) => (JobStatus::Completed, None),
                Err(message) => {
                    tracing::warn!(job = %job_id, file_path, error = %message, "File failed");
                    (JobStatus::Failed, Some(message))
                }
            };
            self.tracker
                .update_file_status(job_id, &file_path, status, error.as_deref())
                .await?;
        }

        self.tracker.get_indexing_status(job_id).await
    }

    async fn process_file(&self, pipeline_id: &str, file_path: &str) -> Result<(), String> {
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|error| format!("failed to read {file_path}: {error}"))?;
        let context = ExecutionContext::with_document(source_document(file_path, &bytes));

        let outcome = self
            .executor
            .execute_pipeline(pipeline_id, context)
            .await
            .map_err(|error| error.to_string())?;

        match outcome.status {
            RunStatus::Completed => {}
            RunStatus::Stopped { element_type, position } => {
                return Err(format!("pipeline stopped at element {position} ({element_type})"));
            }
            RunStatus::Halted { reason, .. } => return Err(reason),
        }
        if outcome.indexed == Some(false) {
            return Err("document could not be indexed".to_string());
        }
        Ok(())
    }
}

/// Build the source document for a file read from disk.
///
/// The document id combines the file stem with a digest of the full path, so ids stay unique
/// and safe to embed in store keys.
pub fn source_document(file_path: &str, bytes: &[u8]) -> SourceDocument {
    let path = Path::new(file_path);
    let file_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);
    let stem: String = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let digest = compute_chunk_hash(file_path);

    let mut metadata = Map::new();
    metadata.insert("id".into(), json!(format!("{stem}-{}", &digest[..12])));
    metadata.insert("file_path".into(), Value::String(file_path.to_string()));
    metadata.insert("size_bytes".into(), json!(bytes.len()));

    SourceDocument {
        file_path: Some(file_path.to_string()),
        file_type,
        content: Some(String::from_utf8_lossy(bytes).into_owned()),
        metadata,
    }
}
