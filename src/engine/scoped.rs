//! # Scoped-Parameter Resolution Module
//!
//! Compiles an ordered list of `(name, expression)` declarations into an
//! evaluation pipeline. Each declaration is parsed against the bindings
//! visible at its position: the base parameters plus every previously
//! declared scoped parameter. That makes forward references (and unknown
//! names) compile-time errors, and at evaluation time each computed value
//! is threaded into the environment of the declarations after it.

use crate::engine::error::{Result, RuleError};
use crate::engine::expression::{self, CompiledExpression, ExprError, HelperRegistry};
use crate::engine::rule::ScopedParam;
use crate::engine::settings::EngineSettings;
use log::debug;
use serde_json::Value;

/// One compiled scoped-parameter declaration.
struct ScopedStep {
    name: String,
    expression: CompiledExpression,
}

/// A compiled pipeline of scoped-parameter declarations.
pub(crate) struct CompiledScope {
    steps: Vec<ScopedStep>,
}

impl std::fmt::Debug for CompiledScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScope")
            .field("steps", &self.steps.len())
            .finish_non_exhaustive()
    }
}

impl CompiledScope {
    /// Compile declarations in order, extending `bindings` in place with
    /// each declared name so later declarations (and the enclosing rule's
    /// expression) can reference it.
    ///
    /// Fails with [`RuleError::ScopedParam`] naming the offending
    /// declaration when an expression does not parse.
    pub(crate) fn compile(
        params: &[ScopedParam],
        bindings: &mut Vec<String>,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let mut steps = Vec::with_capacity(params.len());

        for param in params {
            debug!("compiling scoped parameter '{}'", param.name);
            let compiled = expression::compile(
                &param.expression,
                bindings,
                &settings.helpers,
                settings.case_sensitive_identifiers,
            )
            .map_err(|source| RuleError::ScopedParam {
                name: param.name.clone(),
                source,
            })?;

            bindings.push(param.name.clone());
            steps.push(ScopedStep {
                name: param.name.clone(),
                expression: compiled,
            });
        }

        Ok(Self { steps })
    }

    /// Evaluate the pipeline, appending each computed value to `values` in
    /// declaration order. Returns the `(name, value)` pairs produced.
    ///
    /// A runtime failure is reported with the offending parameter's name;
    /// values computed before the failure stay appended so the caller can
    /// still report the inputs it actually had.
    pub(crate) fn evaluate(
        &self,
        values: &mut Vec<Value>,
        helpers: &HelperRegistry,
    ) -> std::result::Result<Vec<(String, Value)>, ExprError> {
        let mut resolved = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let value = step.expression.evaluate(values, helpers).map_err(|e| {
                ExprError::Eval(format!("scoped parameter '{}': {e}", step.name))
            })?;
            values.push(value.clone());
            resolved.push((step.name.clone(), value));
        }

        Ok(resolved)
    }
}
