use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    executions_started: AtomicU64,
    executions_completed: AtomicU64,
    executions_stopped: AtomicU64,
    executions_failed: AtomicU64,
    documents_indexed: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an execution loaded its pipeline and began running elements.
    pub fn record_started(&self) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an execution in which every element asked to continue.
    pub fn record_completed(&self) {
        self.executions_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an execution stopped early by an element or a pipeline failure.
    pub fn record_stopped(&self) {
        self.executions_stopped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an execution aborted by a fatal error.
    pub fn record_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document successfully handed to an indexing strategy.
    pub fn record_indexed(&self) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executions_started: self.executions_started.load(Ordering::Relaxed),
            executions_completed: self.executions_completed.load(Ordering::Relaxed),
            executions_stopped: self.executions_stopped.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Executions that loaded a pipeline and started running it.
    pub executions_started: u64,
    /// Executions that ran every element.
    pub executions_completed: u64,
    /// Executions ended early by an element's stop signal or a pipeline failure.
    pub executions_stopped: u64,
    /// Executions aborted by a fatal error.
    pub executions_failed: u64,
    /// Documents indexed after a run.
    pub documents_indexed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_execution_outcomes() {
        let metrics = PipelineMetrics::new();
        metrics.record_started();
        metrics.record_completed();
        metrics.record_started();
        metrics.record_stopped();
        metrics.record_indexed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.executions_started, 2);
        assert_eq!(snapshot.executions_completed, 1);
        assert_eq!(snapshot.executions_stopped, 1);
        assert_eq!(snapshot.executions_failed, 0);
        assert_eq!(snapshot.documents_indexed, 1);
    }

    #[test]
    fn snapshot_is_consistent() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot().executions_started, 0);
        assert_eq!(metrics.snapshot().documents_indexed, 0);
    }
}
