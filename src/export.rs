//! The export boundary: where a finished task's records leave the engine.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Result;
use crate::types::records::{ResultStatus, TrackingRecord};
use crate::types::task::TaskId;

/// Everything one task produced, drained exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    /// The task.
    pub task_id: TaskId,
    /// Final status: the error's severity when the task failed, `ERROR` for
    /// not-found, `DATA` when business records were extracted.
    pub status: ResultStatus,
    /// Canonical records in export order: shipment summary first, then
    /// vessel legs, then each container's summary followed by its status
    /// events, then any terminal marker.
    pub records: Vec<TrackingRecord>,
}

/// Receives each task's drained result. Called at most once per task.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Persist or transmit one task's result.
    async fn export(&self, result: TaskResult) -> Result<()>;
}

/// Exporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExporter;

#[async_trait]
impl Exporter for NullExporter {
    async fn export(&self, result: TaskResult) -> Result<()> {
        tracing::debug!(task_id = %result.task_id, status = %result.status, "discarding result");
        Ok(())
    }
}

/// Exporter that collects results in memory, mostly for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    results: Mutex<Vec<TaskResult>>,
}

impl MemoryExporter {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything exported so far.
    pub fn results(&self) -> Vec<TaskResult> {
        self.results.lock().clone()
    }

    /// Take everything exported so far, leaving the collector empty.
    pub fn take(&self) -> Vec<TaskResult> {
        std::mem::take(&mut self.results.lock())
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    async fn export(&self, result: TaskResult) -> Result<()> {
        self.results.lock().push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_exporter_collects_in_order() {
        let exporter = MemoryExporter::new();
        for id in ["a", "b"] {
            exporter
                .export(TaskResult {
                    task_id: TaskId::from(id),
                    status: ResultStatus::Data,
                    records: vec![],
                })
                .await
                .unwrap();
        }

        let results = exporter.take();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].task_id, TaskId::from("a"));
        assert!(exporter.results().is_empty());
    }
}
