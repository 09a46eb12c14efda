//! Evaluation output: the per-rule result tree and action results.

use crate::engine::rule::Rule;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// The result of evaluating one rule: success flag, the concrete inputs
/// used, nested child results for composite rules, and any error message or
/// action output attached along the way.
///
/// Created fresh per evaluation call; never mutated after construction
/// except to attach the action result and the formatted error message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleResultTree {
    /// The originating rule definition.
    pub rule: Arc<Rule>,

    pub is_success: bool,

    /// The concrete input values the rule was evaluated with, including
    /// resolved global and local scoped parameters.
    pub inputs: Map<String, Value>,

    /// Child results, present iff the rule is composite. Ordered by
    /// declaration; in short-circuit mode only the children actually
    /// evaluated appear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_results: Option<Vec<RuleResultTree>>,

    /// Human-readable failure or error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,

    /// The rule's success-event label, set when the rule succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_event: Option<String>,

    /// Output of the dispatched on-success/on-failure action, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionResult>,
}

impl RuleResultTree {
    /// Build a leaf or composite result for the given outcome.
    pub(crate) fn new(
        rule: Arc<Rule>,
        is_success: bool,
        inputs: Map<String, Value>,
        child_results: Option<Vec<RuleResultTree>>,
    ) -> Self {
        let success_event = is_success.then(|| rule.success_event_label().to_string());
        Self {
            rule,
            is_success,
            inputs,
            child_results,
            exception_message: None,
            success_event,
            action_result: None,
        }
    }

    /// Build a failing result carrying an error message.
    pub(crate) fn failed(
        rule: Arc<Rule>,
        inputs: Map<String, Value>,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(rule, false, inputs, None);
        result.exception_message = Some(message.into());
        result
    }
}

/// Output of one action invocation. A handler error lands in `exception`;
/// it never aborts result-tree assembly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// Result of executing a single named rule together with its action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionRuleResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// The underlying rule results the action was dispatched for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RuleResultTree>>,
}

/// Success-event labels of the succeeded rules, in declaration order.
pub fn success_events(results: &[RuleResultTree]) -> Vec<&str> {
    results
        .iter()
        .filter(|r| r.is_success)
        .filter_map(|r| r.success_event.as_deref())
        .collect()
}

/// Error messages of the failed rules, in declaration order.
pub fn failure_messages(results: &[RuleResultTree]) -> Vec<&str> {
    results
        .iter()
        .filter(|r| !r.is_success)
        .filter_map(|r| r.exception_message.as_deref())
        .collect()
}
