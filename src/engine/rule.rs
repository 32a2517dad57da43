//! The per-source handler interface.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::records::TrackingRecord;
use crate::types::request::RequestDescriptor;
use crate::types::response::FetchResponse;
use crate::types::task::TaskDescriptor;

/// What a rule produces from one response: records to aggregate and/or
/// follow-up fetches to issue.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutput {
    /// A canonical record for the recorder.
    Record(TrackingRecord),
    /// A follow-up fetch to submit to the transport.
    Request(RequestDescriptor),
}

impl RuleOutput {
    /// Wrap a record.
    pub fn record(record: impl Into<TrackingRecord>) -> Self {
        Self::Record(record.into())
    }

    /// Wrap a follow-up request.
    pub fn request(request: RequestDescriptor) -> Self {
        Self::Request(request)
    }
}

impl From<TrackingRecord> for RuleOutput {
    fn from(record: TrackingRecord) -> Self {
        Self::Record(record)
    }
}

impl From<RequestDescriptor> for RuleOutput {
    fn from(request: RequestDescriptor) -> Self {
        Self::Request(request)
    }
}

/// Handler for one kind of fetched response.
///
/// A rule is registered under its [`id`](Rule::id) and receives every
/// response whose echoed context names that id. Each response is handled
/// exactly once; a rule that needs state across responses stores it in the
/// request context's extra fields or aggregates through the recorder - it
/// must tolerate its responses arriving in any order.
///
/// Rules interpret response bodies; the engine never does. A body the rule
/// cannot make sense of should come back as a fault (`Error::format` and
/// friends) so the registry can classify it into an error record, rather
/// than panicking or being silently skipped.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Registry id. Must be unique within one registry.
    fn id(&self) -> &str;

    /// Build the initial request(s) for a task.
    ///
    /// Only entry rules implement this; the default refuses, mirroring rules
    /// that are reachable mid-chain only.
    fn start(&self, task: &TaskDescriptor) -> Result<Vec<RuleOutput>> {
        let _ = task;
        Err(Error::internal(format!(
            "rule '{}' cannot start a task",
            self.id()
        )))
    }

    /// Interpret one response.
    async fn handle(&self, response: FetchResponse) -> Result<Vec<RuleOutput>>;
}
