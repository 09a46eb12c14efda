use ruleflow_rs::engine::expression::{self, ExprError, HelperRegistry};
use serde_json::{Value, json};
use std::sync::Arc;

fn eval(source: &str, names: &[&str], values: &[Value]) -> Result<Value, ExprError> {
    let bindings: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    let helpers = HelperRegistry::with_defaults();
    let compiled = expression::compile(source, &bindings, &helpers, true)?;
    compiled.evaluate(values, &helpers)
}

#[test]
fn test_literals_and_precedence() {
    assert_eq!(eval("1 + 2 * 3", &[], &[]).unwrap(), json!(7));
    assert_eq!(eval("(1 + 2) * 3", &[], &[]).unwrap(), json!(9));
    assert_eq!(eval("-2 * 3", &[], &[]).unwrap(), json!(-6));
    assert_eq!(eval("10 % 3", &[], &[]).unwrap(), json!(1));
    assert_eq!(
        eval("\"a\" + 'b' + \"c\"", &[], &[]).unwrap(),
        json!("abc")
    );
    assert_eq!(eval("!false", &[], &[]).unwrap(), json!(true));
    assert_eq!(eval("null == null", &[], &[]).unwrap(), json!(true));
}

#[test]
fn test_keyword_operators() {
    assert_eq!(
        eval("a AND NOT b", &["a", "b"], &[json!(true), json!(false)]).unwrap(),
        json!(true)
    );
    assert_eq!(
        eval("a or b", &["a", "b"], &[json!(false), json!(true)]).unwrap(),
        json!(true)
    );
}

#[test]
fn test_member_and_index_navigation() {
    let data = json!({
        "user": {
            "tags": ["vip", "beta"],
            "profile": { "age": 44 }
        }
    });
    assert_eq!(
        eval("input1.user.tags[0]", &["input1"], &[data.clone()]).unwrap(),
        json!("vip")
    );
    assert_eq!(
        eval(
            "input1.user.profile.age >= 18",
            &["input1"],
            &[data.clone()]
        )
        .unwrap(),
        json!(true)
    );
    assert_eq!(
        eval("input1[\"user\"].tags.length()", &["input1"], &[data]).unwrap(),
        json!(2)
    );
}

#[test]
fn test_collection_surface() {
    let orders = json!([
        { "total": 120, "open": true },
        { "total": 80, "open": false },
        { "total": 200, "open": true }
    ]);

    assert_eq!(
        eval(
            "orders.where(o => o.open).select(o => o.total).sum()",
            &["orders"],
            &[orders.clone()]
        )
        .unwrap(),
        json!(320)
    );
    assert_eq!(
        eval("orders.any(o => o.total > 150)", &["orders"], &[orders.clone()]).unwrap(),
        json!(true)
    );
    assert_eq!(
        eval("orders.count(o => o.open)", &["orders"], &[orders.clone()]).unwrap(),
        json!(2)
    );
    assert_eq!(
        eval(
            "orders.first(o => o.total < 100).total",
            &["orders"],
            &[orders.clone()]
        )
        .unwrap(),
        json!(80)
    );
    assert_eq!(
        eval(
            "orders.select(o => o.total).max()",
            &["orders"],
            &[orders]
        )
        .unwrap(),
        json!(200)
    );
    assert_eq!(
        eval("values.contains(3)", &["values"], &[json!([1, 2, 3])]).unwrap(),
        json!(true)
    );
}

#[test]
fn test_ternary_and_string_methods() {
    assert_eq!(
        eval(
            "status.to_lower() == \"active\" ? \"keep\" : \"drop\"",
            &["status"],
            &[json!("ACTIVE")]
        )
        .unwrap(),
        json!("keep")
    );
    assert_eq!(
        eval("name.trim().starts_with(\"Jo\")", &["name"], &[json!("  John ")]).unwrap(),
        json!(true)
    );
}

#[test]
fn test_custom_helper_namespace() {
    let mut helpers = HelperRegistry::with_defaults();
    helpers.register(
        "Utils",
        "clamp",
        Arc::new(|args: &[Value]| {
            let (Some(v), Some(lo), Some(hi)) = (
                args.first().and_then(Value::as_f64),
                args.get(1).and_then(Value::as_f64),
                args.get(2).and_then(Value::as_f64),
            ) else {
                return Err("clamp() expects three numbers".to_string());
            };
            Ok(json!(v.max(lo).min(hi)))
        }),
    );

    let bindings = vec!["n".to_string()];
    let compiled = expression::compile("Utils.clamp(n, 0, 10) == 10", &bindings, &helpers, true)
        .unwrap();
    assert_eq!(
        compiled.evaluate(&[json!(42)], &helpers).unwrap(),
        json!(true)
    );

    // Unregistered helpers are rejected at compile time.
    let err = expression::compile("Utils.nope(n)", &bindings, &helpers, true).unwrap_err();
    assert!(matches!(err, ExprError::UnknownFunction { name } if name == "Utils.nope"));
}

#[test]
fn test_case_insensitive_mode() {
    let helpers = HelperRegistry::with_defaults();
    let bindings = vec!["Input1".to_string()];

    // Case-sensitive: 'input1' does not resolve.
    assert!(matches!(
        expression::compile("input1.Count > 1", &bindings, &helpers, true).unwrap_err(),
        ExprError::UnknownIdentifier { .. }
    ));

    // Insensitive: parameter, member, and method lookup all relax.
    let compiled = expression::compile("input1.count > 1", &bindings, &helpers, false).unwrap();
    assert_eq!(
        compiled
            .evaluate(&[json!({"Count": 5})], &helpers)
            .unwrap(),
        json!(true)
    );
}

#[test]
fn test_parse_error_classes() {
    assert!(matches!(
        eval("1 +", &[], &[]),
        Err(ExprError::Parse { .. })
    ));
    assert!(matches!(
        eval("a > 1", &[], &[]),
        Err(ExprError::UnknownIdentifier { .. })
    ));
    assert!(matches!(
        eval("missing_fn(1)", &[], &[]),
        Err(ExprError::UnknownFunction { .. })
    ));
    assert!(matches!(
        eval("1 ? 2 : 3", &[], &[]),
        Err(ExprError::Eval(_))
    ));
}

#[test]
fn test_eval_error_classes() {
    // Ordering across kinds.
    assert!(eval("a > b", &["a", "b"], &[json!(1), json!("x")]).is_err());
    // Unknown method.
    assert!(eval("s.explode()", &["s"], &[json!("x")]).is_err());
    // Null member access.
    let err = eval("a.b", &["a"], &[Value::Null]).unwrap_err();
    assert!(err.to_string().contains("null"));
}

#[test]
fn test_compiled_expression_is_shareable() {
    let bindings = vec!["n".to_string()];
    let helpers = Arc::new(HelperRegistry::with_defaults());
    let compiled = Arc::new(
        expression::compile("n * n == 49", &bindings, &helpers, true).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let compiled = Arc::clone(&compiled);
            let helpers = Arc::clone(&helpers);
            std::thread::spawn(move || {
                compiled.evaluate(&[json!(7)], &helpers).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), json!(true));
    }
}
