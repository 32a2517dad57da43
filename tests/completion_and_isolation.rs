//! Completion accounting and fault isolation across tasks sharing a batch.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

use shiptrace::engine::{Orchestrator, Rule, RuleOutput, RuleRegistry};
use shiptrace::error::{Error, Result};
use shiptrace::export::{MemoryExporter, TaskResult};
use shiptrace::shared::{ScriptedReply, ScriptedTransport, Transport};
use shiptrace::types::{
    ContainerStatusEvent, FetchResponse, RequestContext, RequestDescriptor, ResultStatus,
    SearchType, ShipmentSummary, TaskDescriptor, TrackingRecord,
};

fn search_url(search_no: &str) -> String {
    format!("https://carrier.example.com/search/{search_no}")
}

fn detail_url(search_no: &str, index: usize) -> String {
    format!("https://carrier.example.com/detail/{search_no}/{index}")
}

/// Entry rule searching by number; the search response names how many
/// detail fetches to fan out.
struct SearchRule;

#[async_trait]
impl Rule for SearchRule {
    fn id(&self) -> &str {
        "search"
    }

    fn start(&self, task: &TaskDescriptor) -> Result<Vec<RuleOutput>> {
        let context = RequestContext::new(self.id(), task.task_id.clone())?
            .with_extra("search_no", json!(task.search_no));
        let url = Url::parse(&search_url(&task.search_no)).unwrap();
        Ok(vec![RuleOutput::request(RequestDescriptor::get(
            url, context,
        ))])
    }

    async fn handle(&self, response: FetchResponse) -> Result<Vec<RuleOutput>> {
        #[derive(serde::Deserialize)]
        struct Body {
            detail_count: usize,
        }

        let body: Body = response.json()?;
        let task_id = response.task_id().clone();
        let search_no: String = response.context.extra("search_no").unwrap();

        let mut outputs = vec![RuleOutput::record(ShipmentSummary::new(task_id.clone()))];
        for index in 0..body.detail_count {
            let context = RequestContext::new("detail", task_id.clone())?
                .with_extra("index", json!(index));
            let url = Url::parse(&detail_url(&search_no, index)).unwrap();
            outputs.push(RuleOutput::request(RequestDescriptor::get(url, context)));
        }
        Ok(outputs)
    }
}

/// Detail rule emitting one status event per response.
struct DetailRule;

#[async_trait]
impl Rule for DetailRule {
    fn id(&self) -> &str {
        "detail"
    }

    async fn handle(&self, response: FetchResponse) -> Result<Vec<RuleOutput>> {
        let index: usize = response.context.extra("index").unwrap();
        let task_id = response.task_id().clone();
        Ok(vec![RuleOutput::record(ContainerStatusEvent::new(
            task_id,
            "KEY",
            format!("milestone {index}"),
        ))])
    }
}

fn registry() -> Arc<RuleRegistry> {
    Arc::new(
        RuleRegistry::builder()
            .rule(SearchRule)
            .rule(DetailRule)
            .build()
            .unwrap(),
    )
}

fn script_healthy_task(transport: &ScriptedTransport, search_no: &str, details: usize) {
    transport.reply(
        &search_url(search_no),
        ScriptedReply::ok(json!({"detail_count": details}).to_string()),
    );
    for index in 0..details {
        // Staggered delays so responses land interleaved across tasks.
        transport.reply(
            &detail_url(search_no, index),
            ScriptedReply::ok("{}").with_delay_ms(((details - index) as u64) * 7),
        );
    }
}

/// Every task in a fan-out batch completes exactly once and the batch
/// countdown fires, with no fetch lost or repeated.
#[tokio::test]
async fn fan_out_batch_completes_each_task_exactly_once() {
    let transport = Arc::new(ScriptedTransport::new());
    let details_per_task = 6usize;
    let search_nos = ["MBL-A", "MBL-B", "MBL-C"];
    for search_no in search_nos {
        script_healthy_task(&transport, search_no, details_per_task);
    }

    let exporter = Arc::new(MemoryExporter::new());
    let orchestrator = Orchestrator::new(registry(), transport.clone(), exporter.clone());

    let tasks = search_nos
        .iter()
        .enumerate()
        .map(|(i, no)| TaskDescriptor::new(i as i64 + 1, *no, SearchType::Mbl))
        .collect();
    let outcome = orchestrator.run_batch("search", tasks).await.unwrap();

    assert_eq!(outcome.tasks, 3);
    assert_eq!(outcome.exported, 3);
    assert!(outcome.batch_finished);
    assert_eq!(
        transport.requests_seen().len(),
        search_nos.len() * (1 + details_per_task)
    );

    let results = exporter.take();
    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.status, ResultStatus::Data);
        let events = result
            .records
            .iter()
            .filter(|r| matches!(r, TrackingRecord::ContainerStatusEvent(_)))
            .count();
        assert_eq!(events, details_per_task);
    }
}

/// A FATAL fault in one task's chain leaves sibling tasks byte-identical to
/// a run without the faulty task.
#[tokio::test]
async fn fatal_fault_in_one_task_does_not_disturb_the_others() {
    let run = |with_broken: bool| {
        let registry = registry();
        async move {
            let transport = Arc::new(ScriptedTransport::new());
            script_healthy_task(&transport, "MBL-GOOD", 4);

            let mut tasks = vec![TaskDescriptor::new("good", "MBL-GOOD", SearchType::Mbl)];
            if with_broken {
                // A block page instead of JSON: the rule faults, FATAL.
                transport.reply(
                    &search_url("MBL-BROKEN"),
                    ScriptedReply::ok("<html>captcha</html>"),
                );
                tasks.push(TaskDescriptor::new("broken", "MBL-BROKEN", SearchType::Mbl));
            }

            let exporter = Arc::new(MemoryExporter::new());
            let orchestrator = Orchestrator::new(registry, transport, exporter.clone());
            let outcome = orchestrator.run_batch("search", tasks).await.unwrap();
            assert!(outcome.batch_finished);
            exporter.take()
        }
    };

    let control = run(false).await;
    let mixed = run(true).await;

    let good_control = find(&control, "good").unwrap();
    let good_mixed = find(&mixed, "good").unwrap();
    assert_eq!(good_control, good_mixed);

    let broken = find(&mixed, "broken").unwrap();
    assert_eq!(broken.status, ResultStatus::Fatal);
    match &broken.records[..] {
        [TrackingRecord::Error(marker)] => {
            assert!(marker.detail.starts_with("<format-error>"));
        },
        other => panic!("unexpected records: {other:?}"),
    }
}

fn find<'a>(results: &'a [TaskResult], task_id: &str) -> Option<&'a TaskResult> {
    results.iter().find(|r| r.task_id == task_id.into())
}

/// A systemic failure (anti-bot block) poisons its source: queued requests
/// against that source fail fast instead of being fetched.
#[tokio::test]
async fn systemic_failure_poisons_the_source_for_the_batch() {
    let transport = Arc::new(ScriptedTransport::new());
    // Both tasks fan out to one detail fetch on the shared "detail" source.
    transport.reply(
        &search_url("MBL-A"),
        ScriptedReply::ok(json!({"detail_count": 1}).to_string()),
    );
    transport.reply(
        &search_url("MBL-B"),
        ScriptedReply::ok(json!({"detail_count": 1}).to_string()),
    );
    transport.fail(&detail_url("MBL-A", 0), Error::AccessDenied);
    // MBL-B's detail is scripted healthy, but must never be fetched.
    transport.reply(&detail_url("MBL-B", 0), ScriptedReply::ok("{}"));

    let exporter = Arc::new(MemoryExporter::new());
    let config = shiptrace::EngineConfig {
        // Serialize fetches so the poisoning deterministically precedes the
        // second task's detail submission.
        max_concurrent_fetches: 1,
        ..Default::default()
    };
    let orchestrator =
        Orchestrator::new(registry(), transport.clone(), exporter.clone()).with_config(config);

    let outcome = orchestrator
        .run_batch(
            "search",
            vec![
                TaskDescriptor::new("a", "MBL-A", SearchType::Mbl),
                TaskDescriptor::new("b", "MBL-B", SearchType::Mbl),
            ],
        )
        .await
        .unwrap();
    assert!(outcome.batch_finished);
    assert_eq!(outcome.exported, 2);

    let results = exporter.take();
    let a = find(&results, "a").unwrap();
    assert_eq!(a.status, ResultStatus::Fatal);
    match &a.records[..] {
        [TrackingRecord::Error(marker)] => assert_eq!(marker.detail, "<access-denied>"),
        other => panic!("unexpected records: {other:?}"),
    }

    let b = find(&results, "b").unwrap();
    assert_eq!(b.status, ResultStatus::Fatal);
    match &b.records[..] {
        [TrackingRecord::Error(marker)] => {
            assert!(marker.detail.starts_with("<source-poisoned>"));
        },
        other => panic!("unexpected records: {other:?}"),
    }

    // MBL-B's detail URL was never fetched.
    assert!(!transport
        .requests_seen()
        .iter()
        .any(|r| r.url.as_str() == detail_url("MBL-B", 0)));
}

/// A transport that rewrites echoed context breaks dispatch for the whole
/// cycle and must surface as an operator-visible error, never a silent drop.
#[tokio::test]
async fn tampered_context_aborts_the_batch_loudly() {
    struct TamperingTransport {
        inner: ScriptedTransport,
    }

    #[async_trait]
    impl Transport for TamperingTransport {
        async fn fetch(&self, request: RequestDescriptor) -> Result<FetchResponse> {
            let mut response = self.inner.fetch(request).await?;
            response
                .context
                .extra
                .insert("injected".into(), json!(true));
            Ok(response)
        }
    }

    let inner = ScriptedTransport::new();
    inner.reply(&search_url("MBL-A"), ScriptedReply::ok("{}"));

    let orchestrator = Orchestrator::new(
        registry(),
        Arc::new(TamperingTransport { inner }),
        Arc::new(MemoryExporter::new()),
    );

    let err = orchestrator
        .run_batch(
            "search",
            vec![TaskDescriptor::new("a", "MBL-A", SearchType::Mbl)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CorruptContext(_)));
}

/// A runaway rule chain hits the per-task request budget and fails that
/// task fatally instead of crawling forever.
#[tokio::test]
async fn request_budget_caps_runaway_chains() {
    struct LoopingRule;

    #[async_trait]
    impl Rule for LoopingRule {
        fn id(&self) -> &str {
            "looping"
        }

        fn start(&self, task: &TaskDescriptor) -> Result<Vec<RuleOutput>> {
            let context = RequestContext::new(self.id(), task.task_id.clone())?;
            let url = Url::parse("https://loop.example.com/next").unwrap();
            Ok(vec![RuleOutput::request(RequestDescriptor::get(
                url, context,
            ))])
        }

        async fn handle(&self, response: FetchResponse) -> Result<Vec<RuleOutput>> {
            // Always asks for one more page.
            let context =
                RequestContext::new(self.id(), response.task_id().clone())?;
            let url = Url::parse("https://loop.example.com/next").unwrap();
            Ok(vec![RuleOutput::request(RequestDescriptor::get(
                url, context,
            ))])
        }
    }

    let budget = 5usize;
    let transport = Arc::new(ScriptedTransport::new());
    for _ in 0..=budget {
        transport.reply("https://loop.example.com/next", ScriptedReply::ok("{}"));
    }

    let exporter = Arc::new(MemoryExporter::new());
    let registry = Arc::new(RuleRegistry::builder().rule(LoopingRule).build().unwrap());
    let config = shiptrace::EngineConfig {
        max_requests_per_task: budget,
        ..Default::default()
    };
    let orchestrator =
        Orchestrator::new(registry, transport.clone(), exporter.clone()).with_config(config);

    let outcome = orchestrator
        .run_batch(
            "looping",
            vec![TaskDescriptor::new("a", "X", SearchType::Mbl)],
        )
        .await
        .unwrap();
    assert!(outcome.batch_finished);
    assert_eq!(transport.requests_seen().len(), budget);

    let results = exporter.take();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ResultStatus::Fatal);
    match &results[0].records[..] {
        [TrackingRecord::Error(marker)] => {
            assert_eq!(marker.detail, "<request-budget-exceeded>");
        },
        other => panic!("unexpected records: {other:?}"),
    }
}
