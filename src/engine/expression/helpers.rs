//! Registry of helper functions callable from expressions.
//!
//! Expressions may only call functions that were explicitly registered,
//! either in the root namespace (`len(x)`) or under a named namespace
//! (`Utils.check(x)`). The registry is the whitelist: an unregistered call
//! is a compile-time error.

use super::names_match;
use crate::engine::utils::display_value;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A helper function: takes evaluated argument values, returns a value or
/// an error message.
pub type HelperFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HelperRegistry {
    root: HashMap<String, HelperFn>,
    namespaces: HashMap<String, HashMap<String, HelperFn>>,
}

impl fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("root", &self.root.keys().collect::<Vec<_>>())
            .field("namespaces", &self.namespaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HelperRegistry {
    /// An empty registry: no helper calls allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the standard root helpers:
    /// `len`, `abs`, `round`, `upper`, `lower`, `str`, `num`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_root("len", Arc::new(helper_len));
        registry.register_root("abs", Arc::new(helper_abs));
        registry.register_root("round", Arc::new(helper_round));
        registry.register_root("upper", Arc::new(helper_upper));
        registry.register_root("lower", Arc::new(helper_lower));
        registry.register_root("str", Arc::new(helper_str));
        registry.register_root("num", Arc::new(helper_num));
        registry
    }

    /// Register a function in the root namespace.
    pub fn register_root(&mut self, name: impl Into<String>, func: HelperFn) {
        self.root.insert(name.into(), func);
    }

    /// Register a function under a namespace, creating the namespace on
    /// first use.
    pub fn register(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        func: HelperFn,
    ) {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(name.into(), func);
    }

    pub fn has_root(&self, name: &str, case_sensitive: bool) -> bool {
        lookup(&self.root, name, case_sensitive).is_some()
    }

    pub fn has_namespace(&self, name: &str, case_sensitive: bool) -> bool {
        resolve_namespace(&self.namespaces, name, case_sensitive).is_some()
    }

    pub fn has_function(&self, namespace: &str, name: &str, case_sensitive: bool) -> bool {
        self.get(Some(namespace), name, case_sensitive).is_some()
    }

    /// Look up a helper by optional namespace and name.
    pub fn get(
        &self,
        namespace: Option<&str>,
        name: &str,
        case_sensitive: bool,
    ) -> Option<&HelperFn> {
        match namespace {
            None => lookup(&self.root, name, case_sensitive),
            Some(ns) => {
                let functions = resolve_namespace(&self.namespaces, ns, case_sensitive)?;
                lookup(functions, name, case_sensitive)
            }
        }
    }

    pub fn namespace_names(&self) -> Vec<&str> {
        self.namespaces.keys().map(String::as_str).collect()
    }
}

fn lookup<'a>(
    map: &'a HashMap<String, HelperFn>,
    name: &str,
    case_sensitive: bool,
) -> Option<&'a HelperFn> {
    if let Some(found) = map.get(name) {
        return Some(found);
    }
    if !case_sensitive {
        return map
            .iter()
            .find(|(key, _)| names_match(key, name, false))
            .map(|(_, func)| func);
    }
    None
}

fn resolve_namespace<'a>(
    namespaces: &'a HashMap<String, HashMap<String, HelperFn>>,
    name: &str,
    case_sensitive: bool,
) -> Option<&'a HashMap<String, HelperFn>> {
    if let Some(found) = namespaces.get(name) {
        return Some(found);
    }
    if !case_sensitive {
        return namespaces
            .iter()
            .find(|(key, _)| names_match(key, name, false))
            .map(|(_, functions)| functions);
    }
    None
}

fn expect_arity(name: &str, args: &[Value], arity: usize) -> Result<(), String> {
    if args.len() != arity {
        return Err(format!(
            "{name}() takes {arity} argument(s), got {}",
            args.len()
        ));
    }
    Ok(())
}

fn expect_number(name: &str, value: &Value) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("{name}() expects a number"))
}

fn expect_string<'a>(name: &str, value: &'a Value) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{name}() expects a string"))
}

fn helper_len(args: &[Value]) -> Result<Value, String> {
    expect_arity("len", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(json!(s.chars().count())),
        Value::Array(items) => Ok(json!(items.len())),
        Value::Object(map) => Ok(json!(map.len())),
        other => Err(format!(
            "len() expects a string, array, or object, got {}",
            super::value_kind(other)
        )),
    }
}

fn helper_abs(args: &[Value]) -> Result<Value, String> {
    expect_arity("abs", args, 1)?;
    if let Some(i) = args[0].as_i64() {
        return Ok(json!(i.abs()));
    }
    Ok(json!(expect_number("abs", &args[0])?.abs()))
}

fn helper_round(args: &[Value]) -> Result<Value, String> {
    expect_arity("round", args, 1)?;
    Ok(json!(expect_number("round", &args[0])?.round()))
}

fn helper_upper(args: &[Value]) -> Result<Value, String> {
    expect_arity("upper", args, 1)?;
    Ok(json!(expect_string("upper", &args[0])?.to_uppercase()))
}

fn helper_lower(args: &[Value]) -> Result<Value, String> {
    expect_arity("lower", args, 1)?;
    Ok(json!(expect_string("lower", &args[0])?.to_lowercase()))
}

fn helper_str(args: &[Value]) -> Result<Value, String> {
    expect_arity("str", args, 1)?;
    Ok(json!(display_value(&args[0])))
}

fn helper_num(args: &[Value]) -> Result<Value, String> {
    expect_arity("num", args, 1)?;
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(n.clone())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|n| json!(n))
            .map_err(|_| format!("num() cannot parse '{s}' as a number")),
        Value::Bool(b) => Ok(json!(if *b { 1 } else { 0 })),
        other => Err(format!(
            "num() cannot convert {}",
            super::value_kind(other)
        )),
    }
}
