//! Task identity and batch submission types.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier linking every record and request of one tracking query.
///
/// Callers submit either string or numeric ids; both serialize transparently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    /// String task id.
    String(String),
    /// Numeric task id.
    Number(i64),
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for TaskId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// What kind of number a task is searching by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchType {
    /// Master bill of lading.
    Mbl,
    /// Booking number.
    Booking,
    /// Air waybill.
    Awb,
    /// Container number.
    Container,
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mbl => "MBL",
            Self::Booking => "BOOKING",
            Self::Awb => "AWB",
            Self::Container => "CONTAINER",
        };
        write!(f, "{s}")
    }
}

/// One batch entry: a single tracking query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Caller-assigned task id.
    pub task_id: TaskId,
    /// The number being searched.
    pub search_no: String,
    /// What kind of number `search_no` is.
    pub search_type: SearchType,
}

impl TaskDescriptor {
    /// Create a task descriptor.
    pub fn new(
        task_id: impl Into<TaskId>,
        search_no: impl Into<String>,
        search_type: SearchType,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            search_no: search_no.into(),
            search_type,
        }
    }
}

/// Validate a batch submission and drop exact duplicates.
///
/// Entries repeating an earlier `(task_id, search_no)` pair are removed,
/// preserving first-seen order. A task id that reappears with a *different*
/// search number is a submission bug and rejected.
pub fn dedup_batch(tasks: Vec<TaskDescriptor>) -> Result<Vec<TaskDescriptor>> {
    let mut seen: Vec<TaskDescriptor> = Vec::with_capacity(tasks.len());

    for task in tasks {
        match seen.iter().find(|t| t.task_id == task.task_id) {
            None => seen.push(task),
            Some(prev) if prev.search_no == task.search_no => {
                tracing::debug!(task_id = %task.task_id, "dropping duplicate batch entry");
            },
            Some(prev) => {
                return Err(Error::BatchMismatch(format!(
                    "task {} submitted with both '{}' and '{}'",
                    task.task_id, prev.search_no, task.search_no
                )));
            },
        }
    }

    Ok(seen)
}
