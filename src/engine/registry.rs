//! The named-rule registry and response dispatch.
//!
//! Built once at startup, read-only afterwards. Dispatch is total: every
//! response either reaches its rule or becomes a FATAL error record for the
//! owning task - a response is never silently dropped, and one rule's fault
//! never takes down the batch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::task::TaskId;
use crate::types::FetchResponse;

use super::rule::{Rule, RuleOutput};

/// What one dispatch produced.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Task the response belonged to.
    pub task_id: TaskId,
    /// Rule that was addressed.
    pub rule_id: String,
    /// Rule output, or a single error record when the rule faulted.
    pub outputs: Vec<RuleOutput>,
    /// The classified fault, when the rule faulted or was unknown. The
    /// matching error record is already in `outputs`; this carries the
    /// classification for policy decisions (source poisoning).
    pub fault: Option<Error>,
}

/// Maps rule ids to rule instances.
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn Rule>>,
}

impl RuleRegistry {
    /// Start building a registry.
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder { rules: Vec::new() }
    }

    /// Look up a rule by id.
    pub fn get(&self, rule_id: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(rule_id)
    }

    /// Ids of all registered rules.
    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Route a response to the rule named in its echoed context.
    ///
    /// An unknown rule id and a faulting rule both yield an outcome whose
    /// `outputs` contain a FATAL/classified error record for the task, so
    /// the caller's accounting stays uniform.
    ///
    /// # Errors
    ///
    /// Only a context with an empty rule id errors out: there is no way to
    /// know which handler was meant, so the fault cannot be charged to a
    /// task through a rule and must reach the operator.
    pub async fn dispatch(&self, response: FetchResponse) -> Result<DispatchOutcome> {
        let task_id = response.task_id().clone();
        let rule_id = response.rule_id().to_string();

        if rule_id.is_empty() {
            return Err(Error::CorruptContext(format!(
                "response for task {task_id} carries no rule id"
            )));
        }

        let Some(rule) = self.rules.get(&rule_id) else {
            let fault = Error::UnknownRule(rule_id.clone());
            tracing::error!(%task_id, %rule_id, "response addressed to unregistered rule");
            return Ok(DispatchOutcome {
                outputs: vec![RuleOutput::record(fault.to_marker(task_id.clone()))],
                task_id,
                rule_id,
                fault: Some(fault),
            });
        };

        match rule.handle(response).await {
            Ok(outputs) => {
                tracing::debug!(%task_id, %rule_id, outputs = outputs.len(), "dispatched");
                Ok(DispatchOutcome {
                    task_id,
                    rule_id,
                    outputs,
                    fault: None,
                })
            },
            Err(fault) => {
                tracing::warn!(%task_id, %rule_id, %fault, "rule failed; converting to error record");
                Ok(DispatchOutcome {
                    outputs: vec![RuleOutput::record(fault.to_marker(task_id.clone()))],
                    task_id,
                    rule_id,
                    fault: Some(fault),
                })
            },
        }
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder collecting rules before the registry becomes read-only.
pub struct RuleRegistryBuilder {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleRegistryBuilder {
    /// Register a rule.
    #[must_use]
    pub fn rule(self, rule: impl Rule + 'static) -> Self {
        self.rule_arc(Arc::new(rule))
    }

    /// Register an already-shared rule.
    #[must_use]
    pub fn rule_arc(mut self, rule: Arc<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Finalize the registry.
    ///
    /// # Errors
    ///
    /// Duplicate or empty rule ids are configuration bugs and fail here,
    /// before any fetch is issued.
    pub fn build(self) -> Result<RuleRegistry> {
        let mut rules = HashMap::with_capacity(self.rules.len());
        for rule in self.rules {
            let id = rule.id().to_string();
            if id.is_empty() {
                return Err(Error::validation("rule with empty id"));
            }
            if rules.insert(id.clone(), rule).is_some() {
                return Err(Error::validation(format!("duplicate rule id '{id}'")));
            }
            tracing::debug!(rule_id = %id, "registered rule");
        }
        Ok(RuleRegistry { rules })
    }
}
