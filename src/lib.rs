/*!
# Ruleflow-rs

A lightweight business-rules engine for evaluating workflows of named rules against runtime inputs in Rust.

## Overview

Ruleflow-rs compiles each rule's textual expression into an executable predicate once per input
type signature, caches the compiled form, and evaluates it against supplied parameters to produce
a structured result tree. Rules nest under AND/OR operators with exhaustive or short-circuit
semantics, scoped parameters thread intermediate values through a workflow, and success/failure
actions chain further work off each result.

## Key Components

* **RulesEngine**: The central component that registers workflows and evaluates their rules
* **Workflow**: A named collection of rules, optionally injecting other workflows' rules by name
* **Rule**: A leaf boolean expression or a composite AND/OR group of child rules
* **RuleParameter**: A named runtime input supplied by the caller for one evaluation call
* **RuleResultTree**: The per-rule evaluation output: success flag, inputs used, child results,
  error message, and action output
* **ActionHandler**: A trait implemented by action handlers dispatched on rule success or failure

## Built-in Actions

The engine comes with two pre-registered actions:

* **OutputExpression**: Evaluates an expression from the action context and returns the value
* **EvaluateRule**: Evaluates another named rule with the current inputs, enabling rule chaining

## Usage Example

```rust
use ruleflow_rs::{RuleParameter, RulesEngine, Workflow};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Define a workflow in JSON
    let workflow_json = r#"
    {
        "WorkflowName": "Discount",
        "Rules": [
            {
                "RuleName": "HighValueCustomer",
                "Expression": "input1.totalPurchasesToDate > 5000",
                "ErrorMessage": "purchases $(input1.totalPurchasesToDate) below the threshold"
            }
        ]
    }
    "#;

    // Parse the workflow
    let workflow = Workflow::from_json(workflow_json)?;

    // Create the engine with the workflow (built-in actions are auto-registered)
    let engine = RulesEngine::new(vec![workflow], None)?;

    // Evaluate against a concrete input
    let params = vec![RuleParameter::new("input1", json!({"totalPurchasesToDate": 10000}))];
    let results = engine.execute_all_rules("Discount", &params).await?;

    for result in &results {
        println!(
            "{}: success={} event={:?}",
            result.rule.rule_name, result.is_success, result.success_event
        );
    }

    Ok(())
}
```

## Error Handling

Configuration errors (validation failures, unknown workflow names, missing injected workflows)
are returned as `Err(RuleError)` from the engine's entry points. Data-dependent failures are
encoded per rule instead: a failing rule yields a result node with `is_success == false` and an
`exception_message`, and never aborts the evaluation of its sibling rules.

```rust
use ruleflow_rs::{Result, RuleParameter, RulesEngine, Workflow};
use serde_json::json;

async fn evaluate(engine: &RulesEngine) -> Result<()> {
    let params = vec![RuleParameter::new("input1", json!({}))];

    // A rule whose expression fails against this input still produces a result node.
    let results = engine.execute_all_rules("Discount", &params).await?;
    for result in results.iter().filter(|r| !r.is_success) {
        if let Some(message) = &result.exception_message {
            println!("rule {} failed: {message}", result.rule.rule_name);
        }
    }

    Ok(())
}
```

## Extending with Custom Actions

You can extend the engine with your own action handlers:

```rust
use async_trait::async_trait;
use ruleflow_rs::engine::{ActionContext, ActionHandler, ActionHandlerMap};
use ruleflow_rs::{Result, RulesEngine, Workflow};
use serde_json::{Value, json};

struct WebhookAction;

#[async_trait]
impl ActionHandler for WebhookAction {
    async fn run(&self, _engine: &RulesEngine, context: &ActionContext<'_>) -> Result<Value> {
        // Implement your custom logic here; the context gives access to the
        // action's static arguments, the rule result, and the call inputs.
        let event = context.rule_result().success_event.clone();
        Ok(json!({ "notified": event }))
    }
}

fn main() -> Result<()> {
    let mut custom_actions = ActionHandlerMap::new();
    custom_actions.insert(
        "webhook".to_string(),
        Box::new(WebhookAction) as Box<dyn ActionHandler + Send + Sync>,
    );

    // Create engine with workflows and custom actions
    let engine = RulesEngine::new(vec![/* workflows */], Some(custom_actions))?;

    // Rules may now bind { "Name": "webhook" } as OnSuccess/OnFailure...
    let _ = engine;
    Ok(())
}
```
*/

pub mod engine;

// Re-export all public APIs for easier access
pub use engine::actions::{ActionContext, ActionHandler, ActionHandlerMap};
pub use engine::error::{Result, RuleError};
pub use engine::expression::{CompiledExpression, ExprError, HelperFn, HelperRegistry};
pub use engine::parameter::RuleParameter;
pub use engine::result::{
    ActionResult, ActionRuleResult, RuleResultTree, failure_messages, success_events,
};
pub use engine::rule::{ActionInfo, Rule, RuleActions, RuleOperator, ScopedParam};
pub use engine::settings::{CacheSettings, EngineSettings, NestedExecutionMode};
pub use engine::workflow::Workflow;
pub use engine::RulesEngine;
