//! Crate-wide error type and the fault classification used to turn internal
//! failures into canonical error records.
//!
//! Every fault the engine can raise maps to exactly one [`ResultStatus`]
//! before it is exported; an unclassified fault is a bug, not a runtime
//! condition. Detail strings use stable angle-bracket tags so downstream
//! consumers can match on them.

use crate::types::records::{ErrorMarker, ResultStatus};
use crate::types::task::TaskId;

/// Result type alias using our error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Faults raised by the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input rejected at construction time.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal invariant broken. Always a programming error.
    #[error("internal error: {0}")]
    Internal(String),

    /// A response's context named a rule that was never registered.
    #[error("unknown rule id '{0}'")]
    UnknownRule(String),

    /// A response came back with a context the dispatcher cannot use.
    ///
    /// There is no task to charge this fault to, so it aborts the whole
    /// dispatch cycle instead of becoming an error record.
    #[error("request context unusable: {0}")]
    CorruptContext(String),

    /// Response body did not have the shape the rule expected.
    #[error("unexpected response format: {0}")]
    Format(String),

    /// Source answered with an unexpected HTTP status.
    #[error("unexpected response status {0}")]
    ResponseStatus(u16),

    /// Source recognized us as a bot and refused service.
    #[error("access denied by source")]
    AccessDenied,

    /// Source did not answer in time.
    #[error("source timed out: {0}")]
    Timeout(String),

    /// Retry budget for a fetch exhausted.
    #[error("retry budget exhausted: {0}")]
    MaxRetry(String),

    /// Proxy rotation could not produce a working exit.
    #[error("proxy renewal budget exhausted")]
    ProxyExhausted,

    /// Batch submission carried inconsistent task ids / search numbers.
    #[error("inconsistent batch submission: {0}")]
    BatchMismatch(String),

    /// A task's rule chain completed without producing a terminal record.
    #[error("task ended without a terminal record")]
    DidNotEnd,

    /// A task tried to issue more fetches than its configured budget.
    #[error("request budget exceeded for task")]
    RequestBudgetExceeded,

    /// A request named a source that is disabled in the engine config.
    #[error("source '{0}' is disabled")]
    SourceDisabled(String),

    /// A request named a source already poisoned by a systemic failure in
    /// this batch.
    #[error("source '{0}' is poisoned for the remainder of the batch")]
    SourcePoisoned(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a response-format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Classify this fault into the canonical status taxonomy.
    ///
    /// Task-local conditions that end only the affected search map to
    /// [`ResultStatus::Error`]; everything else is unrecoverable for the task
    /// and maps to [`ResultStatus::Fatal`].
    pub fn status(&self) -> ResultStatus {
        match self {
            Self::Timeout(_) | Self::MaxRetry(_) | Self::DidNotEnd => ResultStatus::Error,
            _ => ResultStatus::Fatal,
        }
    }

    /// Whether this fault poisons its source for the remainder of the batch.
    ///
    /// A systemic fault means further fetches against the same source will
    /// not succeed either (anti-bot block, dead proxy pool), so the
    /// orchestrator stops issuing them.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::AccessDenied | Self::ProxyExhausted)
    }

    /// Canonical tagged detail string for export payloads.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation(r) => format!("<validation-error> {r}"),
            Self::Internal(r) => format!("<general-fatal-error> {r}"),
            Self::UnknownRule(r) => format!("<unknown-rule> {r}"),
            Self::CorruptContext(r) => format!("<corrupt-context> {r}"),
            Self::Format(r) => format!("<format-error> {r}"),
            Self::ResponseStatus(c) => format!("<status-code-error> {c}"),
            Self::AccessDenied => "<access-denied>".to_string(),
            Self::Timeout(url) => format!("<website-timeout-error> url='{url}'"),
            Self::MaxRetry(r) => format!("<max-retry-error> {r}"),
            Self::ProxyExhausted => "<proxy-max-retry>".to_string(),
            Self::BatchMismatch(r) => format!("<search-no-length-mismatch> {r}"),
            Self::DidNotEnd => "<Task did not end>".to_string(),
            Self::RequestBudgetExceeded => "<request-budget-exceeded>".to_string(),
            Self::SourceDisabled(r) => format!("<source-disabled> {r}"),
            Self::SourcePoisoned(r) => format!("<source-poisoned> {r}"),
            Self::Serialization(e) => format!("<format-error> {e}"),
        }
    }

    /// Convert this fault into the canonical error record for `task_id`.
    pub fn to_marker(&self, task_id: TaskId) -> ErrorMarker {
        ErrorMarker {
            task_id,
            status: self.status(),
            detail: self.detail(),
        }
    }
}
