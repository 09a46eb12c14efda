//! # Action Dispatch Module
//!
//! Actions are named, registry-resolved operations triggered by a rule's
//! success or failure. The registry maps action names to handlers; builtin
//! handlers are registered first and can be overridden by custom handlers
//! with the same name. Handler errors are captured into the action result
//! and never interrupt result-tree assembly.

use crate::engine::RulesEngine;
use crate::engine::error::{Result, RuleError};
use crate::engine::expression;
use crate::engine::parameter::RuleParameter;
use crate::engine::result::RuleResultTree;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Registry of action handlers keyed by action name.
pub type ActionHandlerMap = HashMap<String, Box<dyn ActionHandler + Send + Sync>>;

/// Read access to an action invocation: the static context arguments from
/// the rule definition, the parent rule result, and the call's parameters.
pub struct ActionContext<'a> {
    context: &'a HashMap<String, Value>,
    rule_result: &'a RuleResultTree,
    params: &'a [RuleParameter],
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        context: &'a HashMap<String, Value>,
        rule_result: &'a RuleResultTree,
        params: &'a [RuleParameter],
    ) -> Self {
        Self {
            context,
            rule_result,
            params,
        }
    }

    /// A static context argument by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// A static context argument expected to be a string.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RuleError::Execution(format!("action context is missing string key '{key}'"))
            })
    }

    /// The result of the rule this action was dispatched for.
    pub fn rule_result(&self) -> &RuleResultTree {
        self.rule_result
    }

    /// The runtime parameters of the evaluation call.
    pub fn params(&self) -> &[RuleParameter] {
        self.params
    }
}

/// Interface for action handlers.
///
/// Handlers may perform asynchronous work (for example calling out to
/// another system); the engine awaits them without blocking a dedicated
/// thread. A handler receives the engine so it can chain into further rule
/// evaluation, as the builtin `EvaluateRule` action does.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute the action, returning its output value.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine dispatching the action
    /// * `context` - Static arguments, parent rule result, and call inputs
    async fn run(&self, engine: &RulesEngine, context: &ActionContext<'_>) -> Result<Value>;
}

// Re-export all built-in actions for easier access
pub mod builtins {
    use super::*;

    // Standard action names used for registering built-ins
    pub const OUTPUT_EXPRESSION_ACTION: &str = "OutputExpression";
    pub const EVALUATE_RULE_ACTION: &str = "EvaluateRule";

    // Get all built-in actions with their standard names
    pub fn get_all_actions() -> Vec<(String, Box<dyn ActionHandler + Send + Sync>)> {
        vec![
            (
                OUTPUT_EXPRESSION_ACTION.to_string(),
                Box::new(OutputExpressionAction),
            ),
            (
                EVALUATE_RULE_ACTION.to_string(),
                Box::new(EvaluateRuleAction),
            ),
        ]
    }
}

/// Builtin: evaluates the context's `Expression` against the call's
/// parameters and returns the computed value.
pub struct OutputExpressionAction;

#[async_trait]
impl ActionHandler for OutputExpressionAction {
    async fn run(&self, engine: &RulesEngine, context: &ActionContext<'_>) -> Result<Value> {
        let source = context.get_str("Expression")?;
        let settings = engine.settings();

        let bindings: Vec<String> = context
            .params()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        let compiled = expression::compile(
            source,
            &bindings,
            &settings.helpers,
            settings.case_sensitive_identifiers,
        )?;

        let values: Vec<Value> = context
            .params()
            .iter()
            .map(|p| p.value().clone())
            .collect();
        compiled
            .evaluate(&values, &settings.helpers)
            .map_err(RuleError::from)
    }
}

/// Builtin: evaluates another named rule (in the same or another workflow)
/// with the current inputs, enabling explicit rule chaining. Context keys:
/// `WorkflowName`, `RuleName`, and optionally `InputFilter` (an array of
/// parameter names to pass through).
pub struct EvaluateRuleAction;

#[async_trait]
impl ActionHandler for EvaluateRuleAction {
    async fn run(&self, engine: &RulesEngine, context: &ActionContext<'_>) -> Result<Value> {
        let workflow_name = context.get_str("WorkflowName")?;
        let rule_name = context.get_str("RuleName")?;

        let params: Vec<RuleParameter> = match context.get("InputFilter") {
            Some(Value::Array(names)) => {
                let keep: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
                context
                    .params()
                    .iter()
                    .filter(|p| keep.contains(&p.name()))
                    .cloned()
                    .collect()
            }
            _ => context.params().to_vec(),
        };

        let result = engine
            .execute_rule_action(workflow_name, rule_name, &params)
            .await?;
        serde_json::to_value(&result).map_err(RuleError::from_serde)
    }
}
