//! Task and batch completion tracking.
//!
//! Per task: a pending-request count plus a terminal-record flag. A task is
//! finished once its count returns to zero *and* a terminal record exists -
//! the count alone says nothing when a rule chain is still deciding whether
//! to fan out further.
//!
//! Per batch: an explicit countdown state machine. Pending-request counting
//! cannot express "no more tasks will ever be submitted", so the batch
//! transitions `Open -> Counting -> Finished` on an explicit declaration of
//! how many task completions are still expected. Completions observed while
//! still `Open` are banked and netted against the declaration, since nothing
//! orders a fast task's completion after a slow source's declaration.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::task::TaskId;

#[derive(Debug, Default)]
struct TaskProgress {
    pending: usize,
    issued: u64,
    completed: u64,
    terminal: bool,
    cancelled: bool,
    finished: bool,
}

#[derive(Debug)]
enum BatchState {
    Open { early_completions: usize },
    Counting { remaining: usize },
    Finished,
}

/// Tracks when tasks and the batch as a whole are done.
#[derive(Debug)]
pub struct CompletionTracker {
    tasks: DashMap<TaskId, TaskProgress>,
    batch: Mutex<BatchState>,
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionTracker {
    /// Tracker with no tasks and an open batch.
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            batch: Mutex::new(BatchState::Open {
                early_completions: 0,
            }),
        }
    }

    /// Start tracking a task. Idempotent.
    pub fn register_task(&self, task_id: TaskId) {
        self.tasks.entry(task_id).or_default();
    }

    /// Whether the task is known to this tracker.
    pub fn has_task(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Count one request accepted for this task, from the moment it is
    /// queued. The task cannot look finished while the request waits for a
    /// transport slot.
    pub fn request_issued(&self, task_id: &TaskId) -> Result<()> {
        let mut progress = self.progress_mut(task_id)?;
        progress.pending += 1;
        progress.issued += 1;
        Ok(())
    }

    /// Count one response (or terminal transport failure) processed for
    /// this task.
    ///
    /// # Errors
    ///
    /// A completion with nothing pending means a response was double-counted
    /// or never issued; that breaks the conservation invariant, so it fails
    /// fast instead of being absorbed.
    pub fn request_completed(&self, task_id: &TaskId) -> Result<()> {
        let mut progress = self.progress_mut(task_id)?;
        if progress.pending == 0 {
            return Err(Error::internal(format!(
                "task {task_id}: response completed with no request pending"
            )));
        }
        progress.pending -= 1;
        progress.completed += 1;
        Ok(())
    }

    /// Note that a terminal record was recorded for this task.
    pub fn record_terminal(&self, task_id: &TaskId) -> Result<()> {
        self.progress_mut(task_id)?.terminal = true;
        Ok(())
    }

    /// Stop issuing further requests for this task.
    pub fn cancel(&self, task_id: &TaskId) -> Result<()> {
        let mut progress = self.progress_mut(task_id)?;
        if !progress.cancelled {
            tracing::debug!(%task_id, "task cancelled");
            progress.cancelled = true;
        }
        Ok(())
    }

    /// Whether the task was cancelled.
    pub fn is_cancelled(&self, task_id: &TaskId) -> bool {
        self.tasks
            .get(task_id)
            .map(|p| p.cancelled)
            .unwrap_or(false)
    }

    /// Whether the task has been marked finished.
    pub fn is_task_finished(&self, task_id: &TaskId) -> bool {
        self.tasks.get(task_id).map(|p| p.finished).unwrap_or(false)
    }

    /// Requests currently in flight for the task.
    pub fn pending(&self, task_id: &TaskId) -> usize {
        self.tasks.get(task_id).map(|p| p.pending).unwrap_or(0)
    }

    /// Requests ever issued for the task.
    pub fn issued_count(&self, task_id: &TaskId) -> u64 {
        self.tasks.get(task_id).map(|p| p.issued).unwrap_or(0)
    }

    /// Responses ever processed for the task.
    pub fn completed_count(&self, task_id: &TaskId) -> u64 {
        self.tasks.get(task_id).map(|p| p.completed).unwrap_or(0)
    }

    /// Mark the task finished if it is complete: nothing pending and a
    /// terminal record recorded. Returns `true` exactly once per task.
    pub fn try_finish(&self, task_id: &TaskId) -> bool {
        let Some(mut progress) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if progress.finished || !progress.terminal || progress.pending > 0 {
            return false;
        }
        progress.finished = true;
        tracing::debug!(
            %task_id,
            issued = progress.issued,
            completed = progress.completed,
            "task finished"
        );
        true
    }

    fn progress_mut(
        &self,
        task_id: &TaskId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, TaskId, TaskProgress>> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::internal(format!("unknown task {task_id}")))
    }

    // ----- batch countdown -------------------------------------------------

    /// Declare how many task completions the batch still expects.
    ///
    /// First declaration wins; repeats are ignored with a warning.
    /// Completions observed before the declaration are netted against it.
    /// Returns `true` when this declaration itself finishes the batch.
    pub fn declare_remaining(&self, remaining: usize) -> bool {
        let mut batch = self.batch.lock();
        match *batch {
            BatchState::Open { early_completions } => {
                let net = remaining.saturating_sub(early_completions);
                if net == 0 {
                    tracing::debug!(remaining, early_completions, "batch finished on declaration");
                    *batch = BatchState::Finished;
                    true
                } else {
                    *batch = BatchState::Counting { remaining: net };
                    false
                }
            },
            BatchState::Counting { .. } | BatchState::Finished => {
                tracing::warn!(remaining, "duplicate batch-end declaration ignored");
                false
            },
        }
    }

    /// Count one task completion against the batch countdown. Returns
    /// `true` exactly when this completion finishes the batch.
    pub fn note_task_completion(&self) -> bool {
        let mut batch = self.batch.lock();
        match *batch {
            BatchState::Open {
                ref mut early_completions,
            } => {
                *early_completions += 1;
                false
            },
            BatchState::Counting { remaining: 1 } => {
                *batch = BatchState::Finished;
                true
            },
            BatchState::Counting { ref mut remaining } => {
                *remaining -= 1;
                false
            },
            BatchState::Finished => {
                tracing::warn!("task completion after batch already finished");
                false
            },
        }
    }

    /// Whether the batch countdown has reached zero.
    pub fn is_batch_finished(&self) -> bool {
        matches!(*self.batch.lock(), BatchState::Finished)
    }
}
