use async_trait::async_trait;
use ruleflow_rs::engine::{ActionContext, ActionHandler, ActionHandlerMap};
use ruleflow_rs::{
    ActionInfo, EngineSettings, NestedExecutionMode, Result, Rule, RuleActions, RuleError,
    RuleOperator, RuleParameter, RulesEngine, ScopedParam, Workflow, success_events,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// A custom action that records how often it ran and echoes its context.
struct CountingAction {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionHandler for CountingAction {
    async fn run(&self, _engine: &RulesEngine, context: &ActionContext<'_>) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "rule": context.rule_result().rule.rule_name,
            "succeeded": context.rule_result().is_success,
        }))
    }
}

// An async action that awaits before returning, and can be told to fail.
struct SlowAction {
    fail: bool,
}

#[async_trait]
impl ActionHandler for SlowAction {
    async fn run(&self, _engine: &RulesEngine, _context: &ActionContext<'_>) -> Result<Value> {
        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        if self.fail {
            Err(RuleError::Execution("remote system unavailable".to_string()))
        } else {
            Ok(json!("done"))
        }
    }
}

fn discount_workflow() -> Workflow {
    Workflow::from_json(
        r#"
        {
            "WorkflowName": "Discount",
            "Rules": [
                {
                    "RuleName": "HighValueCustomer",
                    "Expression": "input1.totalPurchasesToDate > 5000"
                }
            ]
        }
        "#,
    )
    .unwrap()
}

fn high_value_params(total: i64) -> Vec<RuleParameter> {
    vec![RuleParameter::new(
        "input1",
        json!({ "totalPurchasesToDate": total }),
    )]
}

#[tokio::test]
async fn test_discount_scenario_succeeds() {
    let engine = RulesEngine::new(vec![discount_workflow()], None).unwrap();
    let results = engine
        .execute_all_rules("Discount", &high_value_params(10_000))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].is_success);
    assert_eq!(
        results[0].success_event.as_deref(),
        Some("HighValueCustomer")
    );
    assert_eq!(success_events(&results), vec!["HighValueCustomer"]);
}

#[tokio::test]
async fn test_evaluation_is_deterministic() {
    let engine = RulesEngine::new(vec![discount_workflow()], None).unwrap();
    let params = high_value_params(10_000);

    let first = engine.execute_all_rules("Discount", &params).await.unwrap();
    let second = engine.execute_all_rules("Discount", &params).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap(),
        "identical inputs must produce structurally identical result trees"
    );
}

#[tokio::test]
async fn test_reregistration_is_replace_not_additive() {
    let engine = RulesEngine::new(vec![discount_workflow()], None).unwrap();
    engine.add_or_update_workflow(discount_workflow()).unwrap();

    let results = engine
        .execute_all_rules("Discount", &high_value_params(10_000))
        .await
        .unwrap();
    assert_eq!(results.len(), 1, "re-registering must not duplicate rules");
    assert_eq!(engine.workflow_names(), vec!["Discount"]);
}

#[tokio::test]
async fn test_recompilation_per_type_signature() {
    let engine = RulesEngine::new(
        vec![Workflow::new(
            "typed",
            vec![Rule::leaf("is_object", "input1 != null")],
        )],
        None,
    )
    .unwrap();

    // Same workflow, two different input kinds: both must evaluate.
    let with_object = vec![RuleParameter::new("input1", json!({"a": 1}))];
    let with_number = vec![RuleParameter::new("input1", json!(42))];

    assert!(
        engine.execute_all_rules("typed", &with_object).await.unwrap()[0].is_success
    );
    assert!(
        engine.execute_all_rules("typed", &with_number).await.unwrap()[0].is_success
    );
}

#[tokio::test]
async fn test_and_composite_exhaustive_end_to_end() {
    let workflow = Workflow::new(
        "composite",
        vec![Rule::composite(
            "both",
            RuleOperator::And,
            vec![
                Rule::leaf("first", "a == true"),
                Rule::leaf("second", "b == false"),
            ],
        )],
    );
    let engine = RulesEngine::new(vec![workflow], None).unwrap();
    let params = vec![
        RuleParameter::new("a", json!(true)),
        RuleParameter::new("b", json!(true)),
    ];

    let results = engine.execute_all_rules("composite", &params).await.unwrap();
    let parent = &results[0];
    assert!(!parent.is_success);
    let children = parent.child_results.as_ref().unwrap();
    assert_eq!(children.len(), 2);
    assert!(children[0].is_success);
    assert!(!children[1].is_success);
}

#[tokio::test]
async fn test_or_composite_short_circuit_end_to_end() {
    let workflow = Workflow::new(
        "composite",
        vec![Rule::composite(
            "either",
            RuleOperator::Or,
            vec![
                Rule::leaf("first", "a == true"),
                Rule::leaf("second", "b == true"),
            ],
        )],
    );
    let settings = EngineSettings {
        nested_execution_mode: NestedExecutionMode::ShortCircuit,
        ..EngineSettings::default()
    };
    let engine = RulesEngine::with_settings(vec![workflow], None, settings).unwrap();
    let params = vec![
        RuleParameter::new("a", json!(true)),
        RuleParameter::new("b", json!(false)),
    ];

    let results = engine.execute_all_rules("composite", &params).await.unwrap();
    let parent = &results[0];
    assert!(parent.is_success);
    assert_eq!(
        parent.child_results.as_ref().unwrap().len(),
        1,
        "OR short-circuits at the first succeeding child"
    );
}

#[tokio::test]
async fn test_disabled_rules_never_appear_at_any_depth() {
    let mut disabled_top = Rule::leaf("top_off", "a == true");
    disabled_top.enabled = false;
    let mut disabled_nested = Rule::leaf("nested_off", "a == false");
    disabled_nested.enabled = false;

    let workflow = Workflow::new(
        "partial",
        vec![
            disabled_top,
            Rule::composite(
                "group",
                RuleOperator::And,
                vec![Rule::leaf("nested_on", "a == true"), disabled_nested],
            ),
        ],
    );
    let engine = RulesEngine::new(vec![workflow], None).unwrap();
    let params = vec![RuleParameter::new("a", json!(true))];

    let results = engine.execute_all_rules("partial", &params).await.unwrap();
    assert_eq!(results.len(), 1, "disabled top-level rule is absent");
    assert_eq!(results[0].rule.rule_name, "group");
    let children = results[0].child_results.as_ref().unwrap();
    assert_eq!(children.len(), 1, "disabled nested rule is absent");
    assert_eq!(children[0].rule.rule_name, "nested_on");
}

#[tokio::test]
async fn test_global_params_visible_to_all_rules() {
    let mut workflow = Workflow::new(
        "global",
        vec![
            Rule::leaf("first", "threshold == 100"),
            Rule::leaf("second", "input1.value > threshold"),
        ],
    );
    workflow.global_params = Some(vec![ScopedParam::new("threshold", "input1.base * 10")]);

    let engine = RulesEngine::new(vec![workflow], None).unwrap();
    let params = vec![RuleParameter::new(
        "input1",
        json!({"base": 10, "value": 150}),
    )];

    let results = engine.execute_all_rules("global", &params).await.unwrap();
    assert!(results[0].is_success);
    assert!(results[1].is_success);
    assert_eq!(results[0].inputs["threshold"], json!(100));
}

#[tokio::test]
async fn test_local_param_chain_and_isolation() {
    let mut chained = Rule::leaf("chained", "p2 == \"xy\"");
    chained.local_params = Some(vec![
        ScopedParam::new("p1", "\"x\""),
        ScopedParam::new("p2", "p1 + \"y\""),
    ]);
    // Sibling rule must not see the other rule's locals.
    let sibling = Rule::leaf("sibling", "p2 == \"xy\"");

    let workflow = Workflow::new("locals", vec![chained, sibling]);
    let engine = RulesEngine::new(vec![workflow], None).unwrap();
    let params = vec![RuleParameter::new("input1", json!({}))];

    let results = engine.execute_all_rules("locals", &params).await.unwrap();
    assert!(results[0].is_success);
    assert!(!results[1].is_success, "locals are invisible to siblings");
    assert!(
        results[1]
            .exception_message
            .as_deref()
            .unwrap()
            .contains("p2")
    );
}

#[tokio::test]
async fn test_forward_reference_fails_lenient_and_strict() {
    let mut rule = Rule::leaf("reversed", "p2 == \"xy\"");
    rule.local_params = Some(vec![
        ScopedParam::new("p2", "p1 + \"y\""),
        ScopedParam::new("p1", "\"x\""),
    ]);
    let workflow = Workflow::new("reversed", vec![rule]);
    let params = vec![RuleParameter::new("input1", json!({}))];

    // Lenient mode: the rule compiles to a failing result naming p2.
    let engine = RulesEngine::new(vec![workflow.clone()], None).unwrap();
    let results = engine.execute_all_rules("reversed", &params).await.unwrap();
    assert!(!results[0].is_success);
    assert!(
        results[0]
            .exception_message
            .as_deref()
            .unwrap()
            .contains("p2")
    );

    // Strict mode: the compile error aborts the call.
    let settings = EngineSettings {
        exceptions_as_error_messages: false,
        ..EngineSettings::default()
    };
    let engine = RulesEngine::with_settings(vec![workflow], None, settings).unwrap();
    let err = engine
        .execute_all_rules("reversed", &params)
        .await
        .unwrap_err();
    assert!(matches!(err, RuleError::ScopedParam { name, .. } if name == "p2"));
}

#[tokio::test]
async fn test_validation_mentions_rules_and_injection() {
    let engine = RulesEngine::new(vec![], None).unwrap();
    let err = engine
        .add_workflows(vec![Workflow::new("empty", vec![])])
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("rule"));
    assert!(message.contains("inject"));
}

#[tokio::test]
async fn test_error_message_formatting() {
    let mut rule = Rule::leaf("low", "input1.totalPurchasesToDate > 5000");
    rule.error_message =
        Some("purchases $(input1.totalPurchasesToDate) below the threshold".to_string());
    let workflow = Workflow::new("formatted", vec![rule]);
    let engine = RulesEngine::new(vec![workflow], None).unwrap();

    let results = engine
        .execute_all_rules("formatted", &high_value_params(100))
        .await
        .unwrap();
    assert_eq!(
        results[0].exception_message.as_deref(),
        Some("purchases 100 below the threshold")
    );
}

#[tokio::test]
async fn test_error_message_left_verbatim_when_formatting_disabled() {
    let mut rule = Rule::leaf("low", "input1.totalPurchasesToDate > 5000");
    rule.error_message = Some("purchases $(input1.totalPurchasesToDate) too low".to_string());
    let workflow = Workflow::new("unformatted", vec![rule]);

    let settings = EngineSettings {
        enable_formatted_error_message: false,
        ..EngineSettings::default()
    };
    let engine = RulesEngine::with_settings(vec![workflow], None, settings).unwrap();

    let results = engine
        .execute_all_rules("unformatted", &high_value_params(100))
        .await
        .unwrap();
    assert_eq!(
        results[0].exception_message.as_deref(),
        Some("purchases $(input1.totalPurchasesToDate) too low")
    );
}

#[tokio::test]
async fn test_custom_action_runs_on_success_only() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut custom_actions = ActionHandlerMap::new();
    custom_actions.insert(
        "count".to_string(),
        Box::new(CountingAction {
            calls: Arc::clone(&calls),
        }) as Box<dyn ActionHandler + Send + Sync>,
    );

    let mut rule = Rule::leaf("gate", "a == true");
    rule.actions = Some(RuleActions {
        on_success: Some(ActionInfo {
            name: "count".to_string(),
            context: Default::default(),
        }),
        on_failure: None,
    });
    let workflow = Workflow::new("actions", vec![rule]);
    let engine = RulesEngine::new(vec![workflow], Some(custom_actions)).unwrap();

    let passing = vec![RuleParameter::new("a", json!(true))];
    let results = engine.execute_all_rules("actions", &passing).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let action = results[0].action_result.as_ref().unwrap();
    assert_eq!(action.output.as_ref().unwrap()["rule"], json!("gate"));
    assert!(action.exception.is_none());

    let failing = vec![RuleParameter::new("a", json!(false))];
    let results = engine.execute_all_rules("actions", &failing).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1, "no on-failure binding");
    assert!(results[0].action_result.is_none());
}

#[tokio::test]
async fn test_action_errors_are_captured_not_thrown() {
    let mut custom_actions = ActionHandlerMap::new();
    custom_actions.insert(
        "flaky".to_string(),
        Box::new(SlowAction { fail: true }) as Box<dyn ActionHandler + Send + Sync>,
    );

    let mut failing_action_rule = Rule::leaf("first", "a == true");
    failing_action_rule.actions = Some(RuleActions {
        on_success: Some(ActionInfo {
            name: "flaky".to_string(),
            context: Default::default(),
        }),
        on_failure: None,
    });
    let sibling = Rule::leaf("second", "a == true");

    let workflow = Workflow::new("flaky", vec![failing_action_rule, sibling]);
    let engine = RulesEngine::new(vec![workflow], Some(custom_actions)).unwrap();
    let params = vec![RuleParameter::new("a", json!(true))];

    let results = engine.execute_all_rules("flaky", &params).await.unwrap();
    let action = results[0].action_result.as_ref().unwrap();
    assert!(action.exception.as_deref().unwrap().contains("unavailable"));
    assert!(results[1].is_success, "sibling evaluation is unaffected");
}

#[tokio::test]
async fn test_unknown_action_name_is_captured() {
    let mut rule = Rule::leaf("gate", "a == true");
    rule.actions = Some(RuleActions {
        on_success: Some(ActionInfo {
            name: "no_such_action".to_string(),
            context: Default::default(),
        }),
        on_failure: None,
    });
    let workflow = Workflow::new("missing_action", vec![rule]);
    let engine = RulesEngine::new(vec![workflow], None).unwrap();
    let params = vec![RuleParameter::new("a", json!(true))];

    let results = engine
        .execute_all_rules("missing_action", &params)
        .await
        .unwrap();
    let action = results[0].action_result.as_ref().unwrap();
    assert!(
        action
            .exception
            .as_deref()
            .unwrap()
            .contains("no_such_action")
    );
}

#[tokio::test]
async fn test_builtin_output_expression_action() {
    let mut rule = Rule::leaf("gate", "input1.value > 10");
    let mut context = std::collections::HashMap::new();
    context.insert("Expression".to_string(), json!("input1.value * 2"));
    rule.actions = Some(RuleActions {
        on_success: Some(ActionInfo {
            name: "OutputExpression".to_string(),
            context,
        }),
        on_failure: None,
    });
    let workflow = Workflow::new("output", vec![rule]);
    let engine = RulesEngine::new(vec![workflow], None).unwrap();
    let params = vec![RuleParameter::new("input1", json!({"value": 21}))];

    let results = engine.execute_all_rules("output", &params).await.unwrap();
    let action = results[0].action_result.as_ref().unwrap();
    assert_eq!(action.output, Some(json!(42)));
}

#[tokio::test]
async fn test_builtin_evaluate_rule_action_chains() {
    // "router" succeeds and chains into evaluating "Discount.HighValueCustomer".
    let mut context = std::collections::HashMap::new();
    context.insert("WorkflowName".to_string(), json!("Discount"));
    context.insert("RuleName".to_string(), json!("HighValueCustomer"));

    let mut router_rule = Rule::leaf("route", "input1.totalPurchasesToDate > 0");
    router_rule.actions = Some(RuleActions {
        on_success: Some(ActionInfo {
            name: "EvaluateRule".to_string(),
            context,
        }),
        on_failure: None,
    });
    let router = Workflow::new("Router", vec![router_rule]);

    let engine = RulesEngine::new(vec![router, discount_workflow()], None).unwrap();
    let results = engine
        .execute_all_rules("Router", &high_value_params(10_000))
        .await
        .unwrap();

    let action = results[0].action_result.as_ref().unwrap();
    assert!(action.exception.is_none());
    let chained = action.output.as_ref().unwrap();
    assert_eq!(chained["Results"][0]["IsSuccess"], json!(true));
}

#[tokio::test]
async fn test_execute_rule_action_entry_point() {
    let engine = RulesEngine::new(vec![discount_workflow()], None).unwrap();

    let result = engine
        .execute_rule_action("Discount", "HighValueCustomer", &high_value_params(10_000))
        .await
        .unwrap();
    let results = result.results.as_ref().unwrap();
    assert!(results[0].is_success);
    assert!(result.output.is_none(), "rule has no action bound");

    let err = engine
        .execute_rule_action("Discount", "NoSuchRule", &high_value_params(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RuleError::RuleNotFound { rule, .. } if rule == "NoSuchRule"));
}

#[tokio::test]
async fn test_workflow_injection_merges_rules_in_order() {
    let base = Workflow::new("base", vec![Rule::leaf("base_rule", "a == true")]);
    let mut extended = Workflow::new("extended", vec![Rule::leaf("own_rule", "a == true")]);
    extended.workflows_to_inject = Some(vec!["base".to_string()]);

    let engine = RulesEngine::new(vec![base, extended], None).unwrap();
    let params = vec![RuleParameter::new("a", json!(true))];

    let results = engine.execute_all_rules("extended", &params).await.unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.rule.rule_name.as_str()).collect();
    assert_eq!(names, vec!["own_rule", "base_rule"]);
}

#[tokio::test]
async fn test_missing_injected_workflow() {
    let mut workflow = Workflow::new("broken", vec![]);
    workflow.workflows_to_inject = Some(vec!["ghost".to_string()]);
    let engine = RulesEngine::new(vec![workflow], None).unwrap();

    let err = engine.execute_all_rules("broken", &[]).await.unwrap_err();
    assert!(matches!(err, RuleError::MissingInjectedWorkflow(name) if name == "ghost"));
}

#[tokio::test]
async fn test_cyclic_injection_fails_fast() {
    let mut first = Workflow::new("first", vec![Rule::leaf("r1", "a == true")]);
    first.workflows_to_inject = Some(vec!["second".to_string()]);
    let mut second = Workflow::new("second", vec![Rule::leaf("r2", "a == true")]);
    second.workflows_to_inject = Some(vec!["first".to_string()]);

    let engine = RulesEngine::new(vec![first, second], None).unwrap();
    let params = vec![RuleParameter::new("a", json!(true))];

    let err = engine.execute_all_rules("first", &params).await.unwrap_err();
    assert!(matches!(err, RuleError::CyclicInjection(_)));
}

#[tokio::test]
async fn test_positional_inputs_helper() {
    let workflow = Workflow::new(
        "positional",
        vec![Rule::leaf("check", "input1.x + input2.y == 3")],
    );
    let engine = RulesEngine::new(vec![workflow], None).unwrap();

    let params = RuleParameter::from_inputs(&[json!({"x": 1}), json!({"y": 2})]);
    let results = engine
        .execute_all_rules("positional", &params)
        .await
        .unwrap();
    assert!(results[0].is_success);
}

#[tokio::test]
async fn test_concurrent_evaluation_and_mutation() {
    let engine = Arc::new(RulesEngine::new(vec![discount_workflow()], None).unwrap());

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let params = high_value_params(5000 + i);
            engine.execute_all_rules("Discount", &params).await
        }));
    }

    // Interleave registry churn on another workflow name.
    for _ in 0..4 {
        engine
            .add_or_update_workflow(Workflow::new(
                "churn",
                vec![Rule::leaf("r", "true == true")],
            ))
            .unwrap();
        engine.remove_workflow("churn");
    }

    for outcome in futures::future::join_all(handles).await {
        let results = outcome.unwrap().unwrap();
        assert_eq!(results.len(), 1);
    }
}
