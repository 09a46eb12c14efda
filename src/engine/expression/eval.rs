//! Tree-walking evaluator over `serde_json::Value`.
//!
//! Evaluation is synchronous, CPU-bound, and side-effect free. All type
//! errors surface here as [`ExprError::Eval`]; anything name-related was
//! already rejected by the parser.

use super::ast::{Arg, BinaryOp, Expr, Lambda, UnaryOp};
use super::helpers::HelperRegistry;
use super::{ExprError, names_match, value_kind};
use crate::engine::utils::display_value;
use serde_json::{Value, json};

/// Runtime context for one evaluation: the environment values (aligned with
/// the compile-time bindings) plus the helper registry.
pub struct EvalContext<'a> {
    pub values: &'a [Value],
    pub helpers: &'a HelperRegistry,
    pub case_sensitive: bool,
}

/// Evaluate an expression. `locals` is the active lambda-parameter stack,
/// innermost last.
pub fn evaluate(
    expr: &Expr,
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    match expr {
        Expr::Number(n) => Ok(number_value(*n)),
        Expr::StringLit(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Param { name, index } => match ctx.values.get(*index) {
            Some(value) => Ok(value.clone()),
            None => Err(ExprError::Eval(format!(
                "no value supplied for parameter '{name}'"
            ))),
        },
        Expr::LambdaParam { name } => locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| ExprError::Eval(format!("lambda parameter '{name}' out of scope"))),
        Expr::Member { base, field } => {
            let base = evaluate(base, ctx, locals)?;
            member_access(&base, field, ctx.case_sensitive)
        }
        Expr::Index { base, index } => {
            let base = evaluate(base, ctx, locals)?;
            let index = evaluate(index, ctx, locals)?;
            index_access(&base, &index)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx, locals)?;
            match op {
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(ExprError::Eval(format!(
                        "'!' expects a boolean, got {}",
                        value_kind(&other)
                    ))),
                },
                UnaryOp::Neg => {
                    if let Some(i) = value.as_i64() {
                        Ok(json!(-i))
                    } else if let Some(f) = value.as_f64() {
                        Ok(json!(-f))
                    } else {
                        Err(ExprError::Eval(format!(
                            "unary '-' expects a number, got {}",
                            value_kind(&value)
                        )))
                    }
                }
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx, locals),
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = evaluate(cond, ctx, locals)?;
            match cond {
                Value::Bool(true) => evaluate(then_branch, ctx, locals),
                Value::Bool(false) => evaluate(else_branch, ctx, locals),
                other => Err(ExprError::Eval(format!(
                    "ternary condition must be a boolean, got {}",
                    value_kind(&other)
                ))),
            }
        }
        Expr::Method { base, name, args } => {
            let base = evaluate(base, ctx, locals)?;
            eval_method(&base, name, args, ctx, locals)
        }
        Expr::Call {
            namespace,
            name,
            args,
        } => {
            let func = ctx
                .helpers
                .get(namespace.as_deref(), name, ctx.case_sensitive)
                .ok_or_else(|| ExprError::UnknownFunction {
                    name: match namespace {
                        Some(ns) => format!("{ns}.{name}"),
                        None => name.clone(),
                    },
                })?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                match arg {
                    Arg::Value(expr) => values.push(evaluate(expr, ctx, locals)?),
                    Arg::Lambda(_) => {
                        return Err(ExprError::Eval(format!(
                            "helper '{name}' does not accept lambda arguments"
                        )));
                    }
                }
            }
            func(&values).map_err(ExprError::Eval)
        }
    }
}

/// Preserve integer representation for whole numbers so that array indexing
/// and modulo keep exact semantics.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn member_access(base: &Value, field: &str, case_sensitive: bool) -> Result<Value, ExprError> {
    match base {
        Value::Object(map) => {
            if let Some(value) = map.get(field) {
                return Ok(value.clone());
            }
            if !case_sensitive {
                if let Some((_, value)) = map.iter().find(|(key, _)| names_match(key, field, false))
                {
                    return Ok(value.clone());
                }
            }
            Err(ExprError::Eval(format!("object has no field '{field}'")))
        }
        Value::Null => Err(ExprError::Eval(format!(
            "cannot access field '{field}' of null"
        ))),
        other => Err(ExprError::Eval(format!(
            "cannot access field '{field}' of {}",
            value_kind(other)
        ))),
    }
}

fn index_access(base: &Value, index: &Value) -> Result<Value, ExprError> {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) => {
            let idx = n
                .as_u64()
                .ok_or_else(|| ExprError::Eval(format!("invalid array index {n}")))?
                as usize;
            items
                .get(idx)
                .cloned()
                .ok_or_else(|| ExprError::Eval(format!(
                    "array index {idx} out of bounds (length {})",
                    items.len()
                )))
        }
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ExprError::Eval(format!("object has no field '{key}'"))),
        (base, index) => Err(ExprError::Eval(format!(
            "cannot index {} with {}",
            value_kind(base),
            value_kind(index)
        ))),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    // Logical operators short-circuit; everything else is eager.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = expect_bool(op, evaluate(left, ctx, locals)?)?;
        return match (op, lhs) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(expect_bool(op, evaluate(right, ctx, locals)?)?)),
        };
    }

    let lhs = evaluate(left, ctx, locals)?;
    let rhs = evaluate(right, ctx, locals)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare_values(op, &lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == std::cmp::Ordering::Less,
                BinaryOp::Le => ordering != std::cmp::Ordering::Greater,
                BinaryOp::Gt => ordering == std::cmp::Ordering::Greater,
                BinaryOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            }))
        }
        BinaryOp::Add => eval_add(&lhs, &rhs),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            eval_arithmetic(op, &lhs, &rhs)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn expect_bool(op: BinaryOp, value: Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Eval(format!(
            "'{}' expects boolean operands, got {}",
            op.symbol(),
            value_kind(&other)
        ))),
    }
}

/// Deep equality with numeric coercion: `1 == 1.0` holds.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (a, b) => a == b,
    }
}

fn compare_values(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
) -> Result<std::cmp::Ordering, ExprError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).ok_or_else(|| {
                ExprError::Eval(format!("cannot order {a} and {b}"))
            })
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (lhs, rhs) => Err(ExprError::Eval(format!(
            "'{}' cannot compare {} with {}",
            op.symbol(),
            value_kind(lhs),
            value_kind(rhs)
        ))),
    }
}

/// `+` is numeric addition, string concatenation (when either side is a
/// string), or array concatenation.
fn eval_add(lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => eval_arithmetic(BinaryOp::Add, lhs, rhs),
        (Value::String(a), b) => Ok(Value::String(format!("{a}{}", display_value(b)))),
        (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", display_value(a)))),
        (Value::Array(a), Value::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().cloned());
            Ok(Value::Array(merged))
        }
        (lhs, rhs) => Err(ExprError::Eval(format!(
            "'+' cannot combine {} with {}",
            value_kind(lhs),
            value_kind(rhs)
        ))),
    }
}

fn eval_arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(ExprError::Eval(format!(
            "'{}' expects numeric operands, got {} and {}",
            op.symbol(),
            value_kind(lhs),
            value_kind(rhs)
        )));
    };

    // Integer-preserving paths when both operands are integers.
    if let (Some(x), Some(y)) = (lhs.as_i64(), rhs.as_i64()) {
        match op {
            BinaryOp::Add => {
                if let Some(sum) = x.checked_add(y) {
                    return Ok(json!(sum));
                }
            }
            BinaryOp::Sub => {
                if let Some(diff) = x.checked_sub(y) {
                    return Ok(json!(diff));
                }
            }
            BinaryOp::Mul => {
                if let Some(product) = x.checked_mul(y) {
                    return Ok(json!(product));
                }
            }
            BinaryOp::Mod => {
                if y == 0 {
                    return Err(ExprError::Eval("modulo by zero".to_string()));
                }
                return Ok(json!(x % y));
            }
            _ => {}
        }
    }

    match op {
        BinaryOp::Add => Ok(json!(a + b)),
        BinaryOp::Sub => Ok(json!(a - b)),
        BinaryOp::Mul => Ok(json!(a * b)),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ExprError::Eval("division by zero".to_string()));
            }
            Ok(json!(a / b))
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ExprError::Eval("modulo by zero".to_string()));
            }
            Ok(json!(a % b))
        }
        _ => unreachable!(),
    }
}

/// Method dispatch by receiver kind. Collection methods cover the
/// filter/map/aggregate surface; string methods cover the usual predicates
/// and case conversions.
fn eval_method(
    base: &Value,
    name: &str,
    args: &[Arg],
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    let canonical = if ctx.case_sensitive {
        name.to_string()
    } else {
        name.to_ascii_lowercase()
    };

    match base {
        Value::Array(items) => eval_array_method(items, &canonical, name, args, ctx, locals),
        Value::String(s) => eval_string_method(s, &canonical, name, args, ctx, locals),
        Value::Object(map) => match canonical.as_str() {
            "length" | "count" if args.is_empty() => Ok(json!(map.len())),
            "contains" => {
                let key = eval_value_arg(name, args, 0, ctx, locals)?;
                match key {
                    Value::String(key) => Ok(Value::Bool(map.contains_key(&key))),
                    other => Err(ExprError::Eval(format!(
                        "contains() on an object expects a string key, got {}",
                        value_kind(&other)
                    ))),
                }
            }
            _ => Err(unknown_method(name, "object")),
        },
        other => Err(unknown_method(name, value_kind(other))),
    }
}

fn eval_array_method(
    items: &[Value],
    canonical: &str,
    name: &str,
    args: &[Arg],
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    match canonical {
        "where" | "filter" => {
            let lambda = expect_lambda(name, args)?;
            let mut kept = Vec::new();
            for item in items {
                if apply_predicate(lambda, item, ctx, locals)? {
                    kept.push(item.clone());
                }
            }
            Ok(Value::Array(kept))
        }
        "select" | "map" => {
            let lambda = expect_lambda(name, args)?;
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                mapped.push(apply_lambda(lambda, item, ctx, locals)?);
            }
            Ok(Value::Array(mapped))
        }
        "any" => match args {
            [] => Ok(Value::Bool(!items.is_empty())),
            _ => {
                let lambda = expect_lambda(name, args)?;
                for item in items {
                    if apply_predicate(lambda, item, ctx, locals)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
        },
        "all" => {
            let lambda = expect_lambda(name, args)?;
            for item in items {
                if !apply_predicate(lambda, item, ctx, locals)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "count" | "length" => match args {
            [] => Ok(json!(items.len())),
            _ => {
                let lambda = expect_lambda(name, args)?;
                let mut count = 0usize;
                for item in items {
                    if apply_predicate(lambda, item, ctx, locals)? {
                        count += 1;
                    }
                }
                Ok(json!(count))
            }
        },
        "sum" => {
            let mut all_ints = true;
            let mut int_sum = 0i64;
            let mut float_sum = 0.0f64;
            for item in items {
                let n = item.as_f64().ok_or_else(|| {
                    ExprError::Eval(format!(
                        "sum() expects numbers, got {}",
                        value_kind(item)
                    ))
                })?;
                float_sum += n;
                match (all_ints, item.as_i64()) {
                    (true, Some(i)) => match int_sum.checked_add(i) {
                        Some(sum) => int_sum = sum,
                        None => all_ints = false,
                    },
                    _ => all_ints = false,
                }
            }
            Ok(if all_ints { json!(int_sum) } else { json!(float_sum) })
        }
        "min" | "max" => {
            if items.is_empty() {
                return Err(ExprError::Eval(format!("{name}() on an empty array")));
            }
            let mut best = items[0].clone();
            for item in &items[1..] {
                let ordering = compare_values(BinaryOp::Lt, item, &best)?;
                let replace = if canonical == "min" {
                    ordering == std::cmp::Ordering::Less
                } else {
                    ordering == std::cmp::Ordering::Greater
                };
                if replace {
                    best = item.clone();
                }
            }
            Ok(best)
        }
        "first" => match args {
            [] => items
                .first()
                .cloned()
                .ok_or_else(|| ExprError::Eval("first() on an empty array".to_string())),
            _ => {
                let lambda = expect_lambda(name, args)?;
                for item in items {
                    if apply_predicate(lambda, item, ctx, locals)? {
                        return Ok(item.clone());
                    }
                }
                Err(ExprError::Eval(
                    "first() found no matching element".to_string(),
                ))
            }
        },
        "contains" => {
            let needle = eval_value_arg(name, args, 0, ctx, locals)?;
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, &needle))))
        }
        _ => Err(unknown_method(name, "array")),
    }
}

fn eval_string_method(
    s: &str,
    canonical: &str,
    name: &str,
    args: &[Arg],
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    let string_arg = |args: &[Arg], locals: &mut Vec<(String, Value)>| -> Result<String, ExprError> {
        match eval_value_arg(name, args, 0, ctx, locals)? {
            Value::String(s) => Ok(s),
            other => Err(ExprError::Eval(format!(
                "{name}() expects a string argument, got {}",
                value_kind(&other)
            ))),
        }
    };

    match canonical {
        "contains" => Ok(Value::Bool(s.contains(&string_arg(args, locals)?))),
        "starts_with" => Ok(Value::Bool(s.starts_with(&string_arg(args, locals)?))),
        "ends_with" => Ok(Value::Bool(s.ends_with(&string_arg(args, locals)?))),
        "to_upper" => Ok(json!(s.to_uppercase())),
        "to_lower" => Ok(json!(s.to_lowercase())),
        "trim" => Ok(json!(s.trim())),
        "length" | "len" => Ok(json!(s.chars().count())),
        _ => Err(unknown_method(name, "string")),
    }
}

fn unknown_method(name: &str, kind: &str) -> ExprError {
    ExprError::Eval(format!("unknown method '{name}' for {kind}"))
}

fn expect_lambda<'a>(name: &str, args: &'a [Arg]) -> Result<&'a Lambda, ExprError> {
    match args {
        [Arg::Lambda(lambda)] => Ok(lambda),
        _ => Err(ExprError::Eval(format!(
            "{name}() expects a single lambda argument, e.g. {name}(x => ...)"
        ))),
    }
}

fn eval_value_arg(
    name: &str,
    args: &[Arg],
    index: usize,
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    match args.get(index) {
        Some(Arg::Value(expr)) => evaluate(expr, ctx, locals),
        _ => Err(ExprError::Eval(format!(
            "{name}() expects an argument at position {index}"
        ))),
    }
}

fn apply_lambda(
    lambda: &Lambda,
    item: &Value,
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<Value, ExprError> {
    locals.push((lambda.param.clone(), item.clone()));
    let result = evaluate(&lambda.body, ctx, locals);
    locals.pop();
    result
}

fn apply_predicate(
    lambda: &Lambda,
    item: &Value,
    ctx: &EvalContext<'_>,
    locals: &mut Vec<(String, Value)>,
) -> Result<bool, ExprError> {
    match apply_lambda(lambda, item, ctx, locals)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Eval(format!(
            "lambda must return a boolean, got {}",
            value_kind(&other)
        ))),
    }
}
