//! # Expression Compiler Module
//!
//! Compiles textual infix expressions (`input1.totalPurchasesToDate > 5000`)
//! into an executable form evaluated against named `serde_json::Value`
//! bindings. Compilation does the expensive work once: tokenizing, parsing,
//! and resolving every identifier against the declared binding set and the
//! helper-function whitelist. The resulting [`CompiledExpression`] shares
//! its AST behind an `Arc`, is `Send + Sync`, and is cheap to invoke
//! repeatedly and concurrently.
//!
//! Unknown identifiers, unknown helper functions, and malformed syntax are
//! compile-time errors; type mismatches against concrete values surface at
//! evaluation time.

pub mod ast;
mod eval;
pub mod helpers;
mod lexer;
mod parser;

pub use helpers::{HelperFn, HelperRegistry};

use ast::Expr;
use eval::EvalContext;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors from expression compilation and evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    /// Malformed syntax, reported with a byte offset into the source.
    #[error("parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// An identifier that resolves to no parameter, scoped parameter, or
    /// lambda parameter.
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    /// A call to a function missing from the helper whitelist.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    /// A runtime failure evaluating an otherwise-valid expression.
    #[error("{0}")]
    Eval(String),
}

/// Name of a value's kind, used in error messages and type signatures.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compare two names under the configured case sensitivity.
pub(crate) fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// A compiled expression bound to an ordered set of parameter names.
///
/// Invocation takes the concrete values in the same order the names were
/// given at compile time.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    ast: Arc<Expr>,
    source: Arc<str>,
    case_sensitive: bool,
}

impl CompiledExpression {
    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against concrete values, positionally aligned with the
    /// compile-time bindings.
    pub fn evaluate(&self, values: &[Value], helpers: &HelperRegistry) -> Result<Value, ExprError> {
        let ctx = EvalContext {
            values,
            helpers,
            case_sensitive: self.case_sensitive,
        };
        let mut locals = Vec::new();
        eval::evaluate(&self.ast, &ctx, &mut locals)
    }

    /// Evaluate and require a boolean result, as rule expressions must
    /// produce one.
    pub fn evaluate_bool(
        &self,
        values: &[Value],
        helpers: &HelperRegistry,
    ) -> Result<bool, ExprError> {
        match self.evaluate(values, helpers)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::Eval(format!(
                "expression '{}' must produce a boolean, got {}",
                self.source,
                value_kind(&other)
            ))),
        }
    }
}

/// Compile an expression against an ordered binding set and helper
/// whitelist.
pub fn compile(
    source: &str,
    bindings: &[String],
    helpers: &HelperRegistry,
    case_sensitive: bool,
) -> Result<CompiledExpression, ExprError> {
    let scope = parser::BindingScope {
        bindings,
        helpers,
        case_sensitive,
    };
    let ast = parser::parse(source, &scope)?;
    Ok(CompiledExpression {
        ast: Arc::new(ast),
        source: Arc::from(source),
        case_sensitive,
    })
}
