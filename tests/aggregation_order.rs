//! Arrival-order independence: a task that fans out to five container
//! detail fetches must aggregate to the same result no matter which order
//! the five responses come back in.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

use shiptrace::engine::{Orchestrator, ResultRecorder, Rule, RuleOutput, RuleRegistry};
use shiptrace::error::Result;
use shiptrace::export::{MemoryExporter, TaskResult};
use shiptrace::shared::{ScriptedReply, ScriptedTransport};
use shiptrace::types::{
    ContainerStatusEvent, ContainerSummary, FetchResponse, RequestContext, RequestDescriptor,
    SearchType, ShipmentSummary, TaskDescriptor, TaskId, TrackingRecord,
};

const FANOUT: usize = 5;
const SEARCH_URL: &str = "https://carrier.example.com/search/MBL100";

fn detail_url(index: usize) -> String {
    format!("https://carrier.example.com/container/C{index}")
}

/// Entry rule: emits the shipment summary and five detail fetches.
struct FanOutRule;

#[async_trait]
impl Rule for FanOutRule {
    fn id(&self) -> &str {
        "fan_out"
    }

    fn start(&self, task: &TaskDescriptor) -> Result<Vec<RuleOutput>> {
        let context = RequestContext::new(self.id(), task.task_id.clone())?;
        let url = Url::parse(SEARCH_URL).unwrap();
        Ok(vec![RuleOutput::request(RequestDescriptor::get(
            url, context,
        ))])
    }

    async fn handle(&self, response: FetchResponse) -> Result<Vec<RuleOutput>> {
        let task_id = response.task_id().clone();
        let mut summary = ShipmentSummary::new(task_id.clone());
        summary.vessel = Some("ONE HARMONY".into());
        summary.container_quantity = Some(FANOUT as u32);

        let mut outputs = vec![RuleOutput::record(summary)];
        for index in 0..FANOUT {
            let context = RequestContext::new("leg_detail", task_id.clone())?
                .with_extra("container_key", json!(format!("C{index}")));
            let url = Url::parse(&detail_url(index)).unwrap();
            outputs.push(RuleOutput::request(RequestDescriptor::get(url, context)));
        }
        Ok(outputs)
    }
}

/// Detail rule: one container summary and one event per response.
struct LegDetailRule;

#[async_trait]
impl Rule for LegDetailRule {
    fn id(&self) -> &str {
        "leg_detail"
    }

    async fn handle(&self, response: FetchResponse) -> Result<Vec<RuleOutput>> {
        let task_id = response.task_id().clone();
        let key: String = response.context.extra("container_key").unwrap();

        let summary = ContainerSummary::new(task_id.clone(), &key);
        let mut event = ContainerStatusEvent::new(task_id.clone(), &key, "Loaded on vessel");
        event.vessel = Some("ONE HARMONY".into());
        Ok(vec![
            RuleOutput::record(summary),
            RuleOutput::record(event),
        ])
    }
}

/// Canonical comparison form: record order within a drain depends on
/// first-seen order, which legitimately varies with arrival order, so
/// compare sorted records.
fn canonical(mut result: TaskResult) -> (shiptrace::ResultStatus, Vec<String>) {
    result.records.sort_by_key(|r| format!("{r:?}"));
    let records = result.records.iter().map(|r| format!("{r:?}")).collect();
    (result.status, records)
}

fn detail_response(index: usize) -> FetchResponse {
    let context = RequestContext::new("leg_detail", TaskId::from("1"))
        .unwrap()
        .with_extra("container_key", json!(format!("C{index}")));
    FetchResponse::ok("{}", context)
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn recurse(current: &mut Vec<usize>, remaining: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if remaining.is_empty() {
            out.push(current.clone());
            return;
        }
        for i in 0..remaining.len() {
            let item = remaining.remove(i);
            current.push(item);
            recurse(current, remaining, out);
            current.pop();
            remaining.insert(i, item);
        }
    }

    let mut out = Vec::new();
    recurse(&mut Vec::new(), &mut (0..n).collect::<Vec<_>>(), &mut out);
    out
}

/// All 120 arrival orders of the five detail responses produce identical
/// aggregated output. Runs against the recorder directly so every order is
/// exercised deterministically.
#[tokio::test]
async fn all_permutations_aggregate_identically() {
    let rule = LegDetailRule;
    let task_id = TaskId::from("1");
    let mut baseline: Option<(shiptrace::ResultStatus, Vec<String>)> = None;

    let all = permutations(FANOUT);
    assert_eq!(all.len(), 120);

    for order in all {
        let recorder = ResultRecorder::new();
        recorder.register(task_id.clone());

        let mut summary = ShipmentSummary::new(task_id.clone());
        summary.vessel = Some("ONE HARMONY".into());
        summary.container_quantity = Some(FANOUT as u32);
        recorder.record(summary.into()).unwrap();

        for index in order {
            for output in rule.handle(detail_response(index)).await.unwrap() {
                match output {
                    RuleOutput::Record(record) => recorder.record(record).unwrap(),
                    RuleOutput::Request(_) => panic!("detail rule must not fan out"),
                }
            }
        }

        let result = canonical(recorder.drain(&task_id).unwrap());
        match &baseline {
            None => baseline = Some(result),
            Some(expected) => assert_eq!(&result, expected),
        }
    }

    let (status, records) = baseline.unwrap();
    assert_eq!(status, shiptrace::ResultStatus::Data);
    // 1 shipment summary + 5 container summaries + 5 events.
    assert_eq!(records.len(), 11);
}

/// The same property holds through the whole engine when the transport
/// reorders responses: ascending and descending delivery produce the same
/// aggregate.
#[tokio::test]
async fn engine_output_is_stable_under_reordered_delivery() {
    let mut outputs = Vec::new();

    for reversed in [false, true] {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(
            SEARCH_URL,
            ScriptedReply::ok(json!({"found": true}).to_string()),
        );
        for index in 0..FANOUT {
            let rank = if reversed { FANOUT - 1 - index } else { index };
            transport.reply(
                &detail_url(index),
                ScriptedReply::ok("{}").with_delay_ms(5 + 10 * rank as u64),
            );
        }

        let exporter = Arc::new(MemoryExporter::new());
        let registry = Arc::new(
            RuleRegistry::builder()
                .rule(FanOutRule)
                .rule(LegDetailRule)
                .build()
                .unwrap(),
        );
        let orchestrator = Orchestrator::new(registry, transport, exporter.clone());

        let outcome = orchestrator
            .run_batch(
                "fan_out",
                vec![TaskDescriptor::new("1", "MBL100", SearchType::Mbl)],
            )
            .await
            .unwrap();
        assert!(outcome.batch_finished);
        assert_eq!(outcome.exported, 1);

        let mut results = exporter.take();
        assert_eq!(results.len(), 1);
        let result = results.pop().unwrap();

        // The shipment summary itself must be byte-identical, not just
        // set-equal.
        let summary = result
            .records
            .iter()
            .find_map(|r| match r {
                TrackingRecord::ShipmentSummary(s) => Some(s.clone()),
                _ => None,
            })
            .expect("shipment summary present");
        assert_eq!(summary.vessel.as_deref(), Some("ONE HARMONY"));
        assert_eq!(summary.container_quantity, Some(FANOUT as u32));

        outputs.push(canonical(result));
    }

    assert_eq!(outputs[0], outputs[1]);
}
