//! Indexing job state tracking.
//!
//! A job is a batch of files. Its aggregate counters and status are recomputed from the full
//! file list on every update, so repeated or out-of-order updates can never desynchronize the
//! job from its files. Updates to the same job are serialized through an in-process per-job
//! lock; the store itself is not assumed to offer compare-and-swap.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{self, JOB_KEY_PREFIX, MetadataStore, job_key};

/// Status shared by jobs and their files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Not started.
    Pending,
    /// Being processed.
    InProgress,
    /// Finished successfully (for a job: every file reached a terminal state).
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Whether a file in this status counts towards job completion.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A status name that matches no [`JobStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Per-file entry of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path exactly as submitted; updates match it byte for byte.
    pub file_path: String,
    /// Current status.
    pub status: JobStatus,
    /// Time of the latest status change.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<OffsetDateTime>,
    /// Most recent error reported for the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Persisted job record stored under `indexing_metadata:<job_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingJob {
    /// Job identifier.
    pub job_id: Uuid,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Time the job became `Completed`; set once.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<OffsetDateTime>,
    /// Aggregate status.
    pub status: JobStatus,
    /// Files in submission order.
    pub files: Vec<FileRecord>,
    /// Number of files at creation; never changes.
    pub total_files: usize,
    /// Files currently `Completed`.
    pub completed_files: usize,
    /// Files currently `Failed`.
    pub failed_files: usize,
}

impl IndexingJob {
    fn new(job_id: Uuid, file_paths: Vec<String>) -> Self {
        let files: Vec<FileRecord> = file_paths
            .into_iter()
            .map(|file_path| FileRecord {
                file_path,
                status: JobStatus::Pending,
                last_updated: None,
                error_message: None,
            })
            .collect();
        Self {
            job_id,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            status: JobStatus::Pending,
            total_files: files.len(),
            files,
            completed_files: 0,
            failed_files: 0,
        }
    }

    /// Paths still `Pending`.
    pub fn pending_files(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|file| file.status == JobStatus::Pending)
            .map(|file| file.file_path.clone())
            .collect()
    }

    /// Recompute counters and the aggregate status from the file list.
    fn recompute(&mut self, now: OffsetDateTime) {
        self.completed_files = self.count(JobStatus::Completed);
        self.failed_files = self.count(JobStatus::Failed);

        if self.status == JobStatus::Completed {
            return;
        }
        if self.completed_files + self.failed_files == self.total_files {
            self.status = JobStatus::Completed;
            self.end_time = Some(now);
        } else if self.files.iter().any(|file| file.status != JobStatus::Pending) {
            self.status = JobStatus::InProgress;
        }
    }

    fn count(&self, status: JobStatus) -> usize {
        self.files.iter().filter(|file| file.status == status).count()
    }
}

/// Errors surfaced by the tracker.
#[derive(Debug, Error)]
pub enum JobError {
    /// No readable job record exists for the id.
    #[error("No indexing job found with id {0}")]
    JobNotFound(Uuid),
}

/// Creates and updates indexing jobs in the metadata store.
pub struct JobTracker {
    store: Arc<dyn MetadataStore>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobTracker {
    /// Tracker persisting through `store`.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a job with every file `Pending` and persist it before returning its id.
    ///
    /// A failed write is logged; the id is still returned and later lookups report the job as
    /// not found.
    pub async fn create_job(&self, file_paths: Vec<String>) -> Uuid {
        let job = IndexingJob::new(Uuid::new_v4(), file_paths);
        let job_id = job.job_id;
        if self.save(&job).await {
            tracing::info!(job = %job_id, files = job.total_files, "Indexing job created");
        }
        job_id
    }

    /// Set the status of every entry whose path equals `file_path`, then recompute the job.
    ///
    /// Idempotent: repeating an identical update leaves the counters unchanged.
    pub async fn update_file_status(
        &self,
        job_id: Uuid,
        file_path: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<IndexingJob, JobError> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut job = self.load(job_id).await?;
        let now = OffsetDateTime::now_utc();
        let mut matched = false;
        for file in job.files.iter_mut().filter(|file| file.file_path == file_path) {
            file.status = status;
            file.last_updated = Some(now);
            if let Some(message) = error_message {
                file.error_message = Some(message.to_string());
            }
            matched = true;
        }
        if !matched {
            tracing::warn!(job = %job_id, file_path, "File is not part of the job");
        }

        let was_completed = job.status == JobStatus::Completed;
        job.recompute(now);
        self.save(&job).await;

        tracing::debug!(
            job = %job_id,
            file_path,
            status = ?status,
            completed = job.completed_files,
            failed = job.failed_files,
            total = job.total_files,
            "File status updated"
        );
        if !was_completed && job.status == JobStatus::Completed {
            tracing::info!(
                job = %job_id,
                completed = job.completed_files,
                failed = job.failed_files,
                "Indexing job completed"
            );
        }
        Ok(job)
    }

    /// Current job record.
    pub async fn get_indexing_status(&self, job_id: Uuid) -> Result<IndexingJob, JobError> {
        self.load(job_id).await
    }

    /// Paths of the job's files that are still `Pending`.
    pub async fn get_pending_files(&self, job_id: Uuid) -> Result<Vec<String>, JobError> {
        Ok(self.load(job_id).await?.pending_files())
    }

    /// Every job in the store, by prefix scan. Linear in the number of jobs; not paginated.
    pub async fn get_all_jobs(&self) -> Vec<IndexingJob> {
        let keys = store::keys_or_log(self.store.as_ref(), JOB_KEY_PREFIX).await;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(document) = store::get_or_log(self.store.as_ref(), &key).await else {
                continue;
            };
            match serde_json::from_value(document) {
                Ok(job) => jobs.push(job),
                Err(error) => tracing::warn!(key, error = %error, "Skipping malformed job record"),
            }
        }
        jobs
    }

    async fn load(&self, job_id: Uuid) -> Result<IndexingJob, JobError> {
        let document = store::get_or_log(self.store.as_ref(), &job_key(&job_id))
            .await
            .ok_or(JobError::JobNotFound(job_id))?;
        serde_json::from_value(document).map_err(|error| {
            tracing::error!(job = %job_id, error = %error, "Job record is malformed");
            JobError::JobNotFound(job_id)
        })
    }

    async fn save(&self, job: &IndexingJob) -> bool {
        match serde_json::to_value(job) {
            Ok(document) => store::put_or_log(self.store.as_ref(), &job_key(&job.job_id), document).await,
            Err(error) => {
                tracing::error!(job = %job.job_id, error = %error, "Failed to encode job");
                false
            }
        }
    }

    fn job_lock(&self, job_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Locks nobody else holds a handle to belong to idle jobs.
        locks.retain(|id, lock| *id == job_id || Arc::strong_count(lock) > 1);
        locks.entry(job_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker() -> JobTracker {
        JobTracker::new(Arc::new(MemoryStore::new()))
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[tokio::test]
    async fn new_jobs_start_pending() {
        let tracker = tracker();
        let job_id = tracker.create_job(paths(&["a.pdf", "b.pdf"])).await;

        let job = tracker.get_indexing_status(job_id).await.expect("job");
        assert_eq!(job.total_files, 2);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.files.iter().all(|file| file.status == JobStatus::Pending));
        assert!(job.end_time.is_none());
        assert_eq!(
            tracker.get_pending_files(job_id).await.unwrap(),
            paths(&["a.pdf", "b.pdf"])
        );
    }

    #[tokio::test]
    async fn terminal_files_complete_the_job() {
        let tracker = tracker();
        let job_id = tracker.create_job(paths(&["a.pdf", "b.pdf"])).await;

        let job = tracker
            .update_file_status(job_id, "a.pdf", JobStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.end_time.is_none());

        let job = tracker
            .update_file_status(job_id, "b.pdf", JobStatus::Failed, Some("parse error"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.completed_files, job.failed_files), (1, 1));
        assert!(job.end_time.is_some());
        assert_eq!(job.files[1].error_message.as_deref(), Some("parse error"));
    }

    #[tokio::test]
    async fn repeated_updates_do_not_double_count() {
        let tracker = tracker();
        let job_id = tracker.create_job(paths(&["a.pdf", "b.pdf"])).await;

        for _ in 0..3 {
            let job = tracker
                .update_file_status(job_id, "a.pdf", JobStatus::Completed, None)
                .await
                .unwrap();
            assert_eq!(job.completed_files, 1);
            assert_eq!(job.status, JobStatus::InProgress);
        }
    }

    #[tokio::test]
    async fn end_time_is_stamped_once() {
        let tracker = tracker();
        let job_id = tracker.create_job(paths(&["a.pdf"])).await;
        let first = tracker
            .update_file_status(job_id, "a.pdf", JobStatus::Completed, None)
            .await
            .unwrap();
        let second = tracker
            .update_file_status(job_id, "a.pdf", JobStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(first.end_time, second.end_time);
        assert_eq!(second.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn paths_match_exactly() {
        let tracker = tracker();
        let job_id = tracker.create_job(paths(&["docs/a.pdf"])).await;
        let job = tracker
            .update_file_status(job_id, "./docs/a.pdf", JobStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(job.completed_files, 0);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let tracker = tracker();
        let ghost = Uuid::new_v4();
        let err = tracker
            .update_file_status(ghost, "a.pdf", JobStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::JobNotFound(id) if id == ghost));
        assert!(tracker.get_pending_files(ghost).await.is_err());
    }

    #[tokio::test]
    async fn lists_every_job() {
        let tracker = tracker();
        let first = tracker.create_job(paths(&["a"])).await;
        let second = tracker.create_job(paths(&["b", "c"])).await;

        let mut ids: Vec<Uuid> = tracker.get_all_jobs().await.iter().map(|job| job.job_id).collect();
        ids.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn concurrent_updates_to_one_job_are_not_lost() {
        let tracker = Arc::new(tracker());
        let files: Vec<String> = (0..16).map(|n| format!("file-{n}.txt")).collect();
        let job_id = tracker.create_job(files.clone()).await;

        let handles: Vec<_> = files
            .into_iter()
            .map(|file| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker
                        .update_file_status(job_id, &file, JobStatus::Completed, None)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("update");
        }

        let job = tracker.get_indexing_status(job_id).await.unwrap();
        assert_eq!(job.completed_files, 16);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn status_parses_loosely() {
        assert_eq!("COMPLETED".parse::<JobStatus>(), Ok(JobStatus::Completed));
        assert_eq!("in-progress".parse::<JobStatus>(), Ok(JobStatus::InProgress));
        assert_eq!(
            "done".parse::<JobStatus>(),
            Err(UnknownStatus("done".to_string()))
        );
    }

    #[test]
    fn records_serialize_with_rfc3339_timestamps() {
        let job = IndexingJob::new(Uuid::nil(), paths(&["a.pdf"]));
        let value = serde_json::to_value(&job).unwrap();
        let start = value["start_time"].as_str().expect("string timestamp");
        assert!(start.contains('T'));
        assert_eq!(value["files"][0]["status"], "pending");
        assert!(value.get("end_time").is_none());
    }
}
