//! Per-task result aggregation.
//!
//! Responses for one task arrive in no particular order, possibly
//! interleaved across threads. The recorder owns the only cross-response
//! state in the engine: for each task a buffer of merged summaries keyed by
//! entity (`container_key`, `vessel_key`), filled append-by-append and
//! drained exactly once when the task finishes. Mutations go through the
//! per-task map entry, so two responses for the same task can never
//! interleave a partial write.

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::export::TaskResult;
use crate::types::records::{
    ContainerStatusEvent, ContainerSummary, ErrorMarker, NotFoundMarker, ResultStatus,
    ShipmentSummary, TrackingRecord, VesselLeg,
};
use crate::types::task::TaskId;

#[derive(Debug)]
struct ContainerEntry {
    summary: ContainerSummary,
    events: Vec<ContainerStatusEvent>,
}

#[derive(Debug, Default)]
struct TaskBuffer {
    shipment: Option<ShipmentSummary>,
    vessels: IndexMap<String, VesselLeg>,
    containers: IndexMap<String, ContainerEntry>,
    not_found: Option<NotFoundMarker>,
    error: Option<ErrorMarker>,
}

impl TaskBuffer {
    fn container_entry(&mut self, task_id: &TaskId, key: &str) -> &mut ContainerEntry {
        self.containers
            .entry(key.to_string())
            .or_insert_with(|| ContainerEntry {
                summary: ContainerSummary::new(task_id.clone(), key),
                events: Vec::new(),
            })
    }

    fn has_terminal(&self) -> bool {
        self.shipment.is_some() || self.not_found.is_some() || self.error.is_some()
    }

    fn has_data(&self) -> bool {
        self.shipment.is_some() || !self.vessels.is_empty() || !self.containers.is_empty()
    }
}

/// Accumulates canonical records per task until drain.
#[derive(Debug, Default)]
pub struct ResultRecorder {
    tasks: DashMap<TaskId, TaskBuffer>,
}

impl ResultRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer for a task. Idempotent.
    pub fn register(&self, task_id: TaskId) {
        self.tasks.entry(task_id).or_default();
    }

    /// Whether a task still has an undrained buffer.
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Append one record to its task's buffer.
    ///
    /// Summaries for an already-seen entity key merge field-wise (later
    /// values win); status events append. A status event for an unseen
    /// container key opens the container entry.
    ///
    /// # Errors
    ///
    /// Recording against an unregistered (or already drained) task, or
    /// passing a batch-scoped `TaskEnd` marker, is a programming error.
    pub fn record(&self, record: TrackingRecord) -> Result<()> {
        let task_id = match record.task_id() {
            Some(id) => id.clone(),
            None => {
                return Err(Error::internal(
                    "task-end markers belong to the completion tracker",
                ))
            },
        };

        let mut buffer = self.tasks.get_mut(&task_id).ok_or_else(|| {
            Error::internal(format!("record for unknown or drained task {task_id}"))
        })?;

        match record {
            TrackingRecord::ShipmentSummary(summary) => match &mut buffer.shipment {
                Some(existing) => existing.merge(summary),
                slot @ None => *slot = Some(summary),
            },
            TrackingRecord::VesselLeg(leg) => match buffer.vessels.get_mut(&leg.vessel_key) {
                Some(existing) => existing.merge(leg),
                None => {
                    buffer.vessels.insert(leg.vessel_key.clone(), leg);
                },
            },
            TrackingRecord::ContainerSummary(summary) => {
                let key = summary.container_key.clone();
                buffer.container_entry(&task_id, &key).summary.merge(summary);
            },
            TrackingRecord::ContainerStatusEvent(event) => {
                let key = event.container_key.clone();
                buffer.container_entry(&task_id, &key).events.push(event);
            },
            TrackingRecord::NotFound(marker) => {
                buffer.not_found = Some(marker);
            },
            TrackingRecord::Error(marker) => {
                if let Some(previous) = &buffer.error {
                    tracing::debug!(%task_id, previous = %previous.detail, "replacing error marker");
                }
                buffer.error = Some(marker);
            },
            TrackingRecord::TaskEnd(_) => unreachable!("rejected above"),
        }

        Ok(())
    }

    /// Whether the task has recorded a terminal record.
    pub fn has_terminal(&self, task_id: &TaskId) -> bool {
        self.tasks
            .get(task_id)
            .map(|b| b.has_terminal())
            .unwrap_or(false)
    }

    /// Remove and return everything the task accumulated.
    ///
    /// An errored task drains to its error marker alone and a not-found task
    /// to its not-found marker alone; partial data extracted before the
    /// failure is dropped, matching what downstream consumers can act on.
    ///
    /// # Errors
    ///
    /// Each task drains exactly once; a second drain is a programming error.
    pub fn drain(&self, task_id: &TaskId) -> Result<TaskResult> {
        let (_, buffer) = self.tasks.remove(task_id).ok_or_else(|| {
            Error::internal(format!("task {task_id} already drained or never registered"))
        })?;

        if let Some(marker) = buffer.error {
            let status = marker.status;
            return Ok(TaskResult {
                task_id: task_id.clone(),
                status,
                records: vec![TrackingRecord::Error(marker)],
            });
        }

        if let Some(marker) = buffer.not_found {
            return Ok(TaskResult {
                task_id: task_id.clone(),
                status: ResultStatus::Error,
                records: vec![TrackingRecord::NotFound(marker)],
            });
        }

        let status = if buffer.has_data() {
            ResultStatus::Data
        } else {
            tracing::warn!(%task_id, "drained without any records");
            ResultStatus::Ok
        };

        let mut records = Vec::new();
        if let Some(summary) = buffer.shipment {
            records.push(TrackingRecord::ShipmentSummary(summary));
        }
        for (_, leg) in buffer.vessels {
            records.push(TrackingRecord::VesselLeg(leg));
        }
        for (_, entry) in buffer.containers {
            records.push(TrackingRecord::ContainerSummary(entry.summary));
            for event in dedup_events(entry.events) {
                records.push(TrackingRecord::ContainerStatusEvent(event));
            }
        }

        Ok(TaskResult {
            task_id: task_id.clone(),
            status,
            records,
        })
    }
}

/// Drop repeated status events, keeping first occurrences in order. Sources
/// routinely repeat history rows across detail pages.
fn dedup_events(events: Vec<ContainerStatusEvent>) -> Vec<ContainerStatusEvent> {
    let mut unique: Vec<ContainerStatusEvent> = Vec::with_capacity(events.len());
    for event in events {
        if !unique.contains(&event) {
            unique.push(event);
        }
    }
    unique
}
