//! The crawl orchestration engine: rule dispatch, per-task aggregation, and
//! completion tracking over an out-of-order response stream.

pub mod orchestrator;
pub mod recorder;
pub mod registry;
pub mod rule;
pub mod tracker;

pub use orchestrator::{BatchOutcome, Orchestrator};
pub use recorder::ResultRecorder;
pub use registry::{DispatchOutcome, RuleRegistry, RuleRegistryBuilder};
pub use rule::{Rule, RuleOutput};
pub use tracker::CompletionTracker;
