//! The scatter-gather loop.
//!
//! One logical event loop drives a whole batch: entry rules seed the first
//! request per task, the transport runs fetches concurrently, and completed
//! fetches are processed one at a time in whatever order they land. Nothing
//! here assumes arrival order - correctness rests on the recorder's keyed
//! merges and the tracker's counters, both of which are order-free.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::shared::transport::Transport;
use crate::types::records::{ResultStatus, TrackingRecord};
use crate::types::request::{RequestContext, RequestDescriptor, RequestQueue};
use crate::types::response::FetchResponse;
use crate::types::task::{dedup_batch, TaskDescriptor, TaskId};

use super::recorder::ResultRecorder;
use super::registry::RuleRegistry;
use super::rule::RuleOutput;
use super::tracker::CompletionTracker;

/// What a finished batch looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Engine-assigned id for this run.
    pub batch_id: Uuid,
    /// Tasks accepted after dedup.
    pub tasks: usize,
    /// Task results handed to the exporter.
    pub exported: usize,
    /// Whether the batch countdown reached zero.
    pub batch_finished: bool,
}

/// Drives batches of tracking tasks through rules, transport, and export.
pub struct Orchestrator<T> {
    registry: Arc<RuleRegistry>,
    transport: Arc<T>,
    exporter: Arc<dyn Exporter>,
    config: EngineConfig,
}

impl<T: Transport + 'static> Orchestrator<T> {
    /// Wire up an orchestrator with default configuration.
    pub fn new(
        registry: Arc<RuleRegistry>,
        transport: Arc<T>,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        Self {
            registry,
            transport,
            exporter,
            config: EngineConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one batch to completion.
    ///
    /// Every accepted task ends with exactly one exported terminal result -
    /// data, not-found, or error - no matter how its rule chain behaves.
    ///
    /// # Errors
    ///
    /// Only faults that cannot be charged to a single task abort the run: an
    /// unknown entry rule, a transport that violates the context-echo
    /// contract, or a failing exporter. Everything else becomes an error
    /// record for the affected task.
    pub async fn run_batch(
        &self,
        entry_rule_id: &str,
        tasks: Vec<TaskDescriptor>,
    ) -> Result<BatchOutcome> {
        let batch_id = Uuid::new_v4();
        let tasks = dedup_batch(tasks)?;
        tracing::info!(%batch_id, tasks = tasks.len(), entry_rule_id, "starting batch");

        let run = BatchRun {
            registry: self.registry.as_ref(),
            transport: Arc::clone(&self.transport),
            exporter: self.exporter.as_ref(),
            config: &self.config,
            recorder: ResultRecorder::new(),
            tracker: CompletionTracker::new(),
            queue: RequestQueue::new(),
            poisoned: HashSet::new(),
            exported: 0,
            batch_id,
        };
        run.execute(entry_rule_id, tasks).await
    }
}

type FetchFuture = BoxFuture<'static, (RequestContext, Result<FetchResponse>)>;

/// Mutable state of one batch run. Dropped when the batch ends, so no state
/// leaks between batches.
struct BatchRun<'a, T> {
    registry: &'a RuleRegistry,
    transport: Arc<T>,
    exporter: &'a dyn Exporter,
    config: &'a EngineConfig,
    recorder: ResultRecorder,
    tracker: CompletionTracker,
    queue: RequestQueue,
    poisoned: HashSet<String>,
    exported: usize,
    batch_id: Uuid,
}

impl<T: Transport + 'static> BatchRun<'_, T> {
    async fn execute(
        mut self,
        entry_rule_id: &str,
        tasks: Vec<TaskDescriptor>,
    ) -> Result<BatchOutcome> {
        let entry = self
            .registry
            .get(entry_rule_id)
            .ok_or_else(|| Error::UnknownRule(entry_rule_id.to_string()))?
            .clone();

        for task in &tasks {
            self.tracker.register_task(task.task_id.clone());
            self.recorder.register(task.task_id.clone());
        }
        // The orchestrator knows the task population up front; batch-style
        // rules re-declaring it later hit the duplicate-declaration path.
        self.tracker.declare_remaining(tasks.len());

        for task in &tasks {
            match entry.start(task) {
                Ok(outputs) => self.process_outputs(outputs).await?,
                Err(fault) => self.fail_task(&task.task_id, &fault).await?,
            }
        }

        let mut in_flight: FuturesUnordered<FetchFuture> = FuturesUnordered::new();
        loop {
            while in_flight.len() < self.config.max_concurrent_fetches {
                let Some(request) = self.queue.pop() else { break };
                if let Some(fetch) = self.submit(request).await? {
                    in_flight.push(fetch);
                }
            }

            let Some((context, outcome)) = in_flight.next().await else {
                if self.queue.is_empty() {
                    break;
                }
                continue;
            };

            let task_id = context.task_id.clone();
            self.tracker.request_completed(&task_id)?;

            match outcome {
                Ok(response) => {
                    if response.context != context {
                        return Err(Error::CorruptContext(format!(
                            "transport altered the context echoed for task {task_id}"
                        )));
                    }
                    let dispatch = self.registry.dispatch(response).await?;
                    if let Some(fault) = &dispatch.fault {
                        if fault.is_systemic() {
                            self.poison(&dispatch.rule_id);
                        }
                    }
                    self.process_outputs(dispatch.outputs).await?;
                    self.settle(&task_id).await?;
                },
                Err(fault) => {
                    tracing::warn!(%task_id, %fault, "transport failed terminally");
                    if fault.is_systemic() {
                        self.poison(&context.rule_id);
                    }
                    self.fail_task(&task_id, &fault).await?;
                },
            }
        }

        // A task whose chain ran dry without ever producing a terminal
        // record still owes its caller exactly one result.
        for task in &tasks {
            let task_id = &task.task_id;
            if !self.tracker.is_task_finished(task_id) && self.recorder.contains(task_id) {
                if !self.recorder.has_terminal(task_id) {
                    tracing::warn!(%task_id, "rule chain exhausted without a terminal record");
                    let fault = Error::DidNotEnd;
                    self.recorder
                        .record(TrackingRecord::Error(fault.to_marker(task_id.clone())))?;
                }
                self.tracker.record_terminal(task_id)?;
                self.settle(task_id).await?;
            }
        }

        let outcome = BatchOutcome {
            batch_id: self.batch_id,
            tasks: tasks.len(),
            exported: self.exported,
            batch_finished: self.tracker.is_batch_finished(),
        };
        tracing::info!(
            batch_id = %outcome.batch_id,
            exported = outcome.exported,
            batch_finished = outcome.batch_finished,
            "batch done"
        );
        Ok(outcome)
    }

    /// Route one dispatch's outputs: records into the recorder and tracker,
    /// requests into the queue, then settle every task the records touched.
    async fn process_outputs(&mut self, outputs: Vec<RuleOutput>) -> Result<()> {
        let mut touched: HashSet<TaskId> = HashSet::new();

        for output in outputs {
            match output {
                RuleOutput::Record(TrackingRecord::TaskEnd(marker)) => {
                    tracing::debug!(remaining = marker.remaining, "batch-end declaration");
                    self.tracker.declare_remaining(marker.remaining);
                },
                RuleOutput::Record(record) => {
                    // Unwrap is safe: only TaskEnd carries no task id.
                    let task_id = record.task_id().cloned().ok_or_else(|| {
                        Error::internal("record without task id escaped the TaskEnd arm")
                    })?;
                    if !self.tracker.has_task(&task_id) {
                        return Err(Error::internal(format!(
                            "rule emitted a record for unsubmitted task {task_id}"
                        )));
                    }
                    if self.tracker.is_task_finished(&task_id) {
                        tracing::debug!(%task_id, "discarding record for finished task");
                        continue;
                    }
                    let terminal = record.is_terminal();
                    let fatal = matches!(
                        &record,
                        TrackingRecord::Error(m) if m.status == ResultStatus::Fatal
                    );
                    self.recorder.record(record)?;
                    if terminal {
                        self.tracker.record_terminal(&task_id)?;
                    }
                    if fatal {
                        self.tracker.cancel(&task_id)?;
                    }
                    touched.insert(task_id);
                },
                RuleOutput::Request(request) => {
                    let task_id = request.context.task_id.clone();
                    if !self.tracker.has_task(&task_id) {
                        return Err(Error::internal(format!(
                            "rule emitted a request for unsubmitted task {task_id}"
                        )));
                    }
                    if self.tracker.is_cancelled(&task_id)
                        || self.tracker.is_task_finished(&task_id)
                    {
                        tracing::debug!(%task_id, "dropping follow-up for settled task");
                        continue;
                    }
                    if self.tracker.issued_count(&task_id)
                        >= self.config.max_requests_per_task as u64
                    {
                        self.fail_task(&task_id, &Error::RequestBudgetExceeded).await?;
                        continue;
                    }
                    // Counted from the moment it is queued: the task must
                    // not look finished while follow-ups are still waiting
                    // for a transport slot.
                    self.tracker.request_issued(&task_id)?;
                    self.queue.push(request);
                    touched.insert(task_id);
                },
            }
        }

        for task_id in touched {
            self.settle(&task_id).await?;
        }
        Ok(())
    }

    /// Hand a queued request to the transport, unless its task or source is
    /// no longer eligible. A dropped request gives back the pending count it
    /// acquired at enqueue, so the conservation ledger stays balanced and
    /// the task can finish.
    async fn submit(&mut self, request: RequestDescriptor) -> Result<Option<FetchFuture>> {
        let task_id = request.context.task_id.clone();
        let rule_id = request.context.rule_id.clone();

        if self.tracker.is_cancelled(&task_id) {
            tracing::debug!(%task_id, %rule_id, "dropping request for cancelled task");
            self.tracker.request_completed(&task_id)?;
            self.settle(&task_id).await?;
            return Ok(None);
        }
        if !self.config.is_source_enabled(&rule_id) {
            self.tracker.request_completed(&task_id)?;
            self.fail_task(&task_id, &Error::SourceDisabled(rule_id)).await?;
            return Ok(None);
        }
        if self.poisoned.contains(&rule_id) {
            self.tracker.request_completed(&task_id)?;
            self.fail_task(&task_id, &Error::SourcePoisoned(rule_id)).await?;
            return Ok(None);
        }

        let transport = Arc::clone(&self.transport);
        let context = request.context.clone();
        Ok(Some(Box::pin(async move {
            let outcome = transport.fetch(request).await;
            (context, outcome)
        })))
    }

    /// Record a classified fault against a task and settle it. Fatal faults
    /// also cancel the task's not-yet-issued requests.
    async fn fail_task(&mut self, task_id: &TaskId, fault: &Error) -> Result<()> {
        let marker = fault.to_marker(task_id.clone());
        let fatal = marker.status == ResultStatus::Fatal;
        self.recorder.record(TrackingRecord::Error(marker))?;
        self.tracker.record_terminal(task_id)?;
        if fatal {
            self.tracker.cancel(task_id)?;
        }
        self.settle(task_id).await
    }

    /// Drain and export the task if it just became finished. Safe to call
    /// any number of times; only the finishing call exports.
    async fn settle(&mut self, task_id: &TaskId) -> Result<()> {
        if !self.tracker.try_finish(task_id) {
            return Ok(());
        }

        let result = self.recorder.drain(task_id)?;
        tracing::info!(%task_id, status = %result.status, records = result.records.len(), "exporting task result");
        self.exporter.export(result).await?;
        self.exported += 1;

        if self.tracker.note_task_completion() {
            tracing::info!(batch_id = %self.batch_id, "batch countdown reached zero");
        }
        Ok(())
    }

    fn poison(&mut self, rule_id: &str) {
        if self.poisoned.insert(rule_id.to_string()) {
            tracing::error!(rule_id, "source poisoned for the remainder of the batch");
        }
    }
}
