//! # shiptrace
//!
//! Multi-source shipment-tracking crawl orchestration: issue a bounded chain
//! of asynchronous fetches per tracking query, dispatch every response to the
//! handler that understands it, and aggregate whatever comes back - in any
//! order - into one canonical result per task.
//!
//! The crate is the coordination core only. The pieces that talk to the
//! outside world are trait boundaries supplied by the caller:
//!
//! - [`Transport`](shared::Transport) executes [`RequestDescriptor`]s and
//!   echoes each descriptor's opaque context back with the response.
//! - [`Rule`](engine::Rule) implementations interpret one source's response
//!   bodies and emit canonical records and/or follow-up requests.
//! - [`Exporter`](export::Exporter) receives each task's drained record list
//!   exactly once.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shiptrace::engine::{Orchestrator, RuleRegistry};
//! use shiptrace::export::MemoryExporter;
//! use shiptrace::shared::ScriptedTransport;
//! use shiptrace::types::{SearchType, TaskDescriptor};
//!
//! # async fn example(my_rule: Arc<dyn shiptrace::engine::Rule>) -> shiptrace::Result<()> {
//! let registry = RuleRegistry::builder().rule_arc(my_rule).build()?;
//! let exporter = Arc::new(MemoryExporter::new());
//! let orchestrator = Orchestrator::new(
//!     Arc::new(registry),
//!     Arc::new(ScriptedTransport::new()),
//!     exporter.clone(),
//! );
//!
//! let tasks = vec![TaskDescriptor::new("1", "SEGU3474023", SearchType::Container)];
//! let outcome = orchestrator.run_batch("main_info", tasks).await?;
//! assert!(outcome.batch_finished);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod shared;
pub mod types;

#[cfg(feature = "logging")]
pub mod logging;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use types::{
    FetchResponse, RequestContext, RequestDescriptor, ResultStatus, SearchType, TaskDescriptor,
    TaskId, TrackingRecord,
};
