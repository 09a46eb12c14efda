//! # Rule Compilation Module
//!
//! Transforms rule definitions into composed evaluation closures. A leaf
//! rule compiles its scoped parameters and boolean expression; a composite
//! rule recursively compiles its enabled children and combines them with
//! AND/OR semantics under the configured execution mode. Compiled closures
//! are pure with respect to the supplied values and safe to invoke
//! repeatedly and concurrently.

use crate::engine::error::{Result, RuleError};
use crate::engine::expression::{self, CompiledExpression};
use crate::engine::result::RuleResultTree;
use crate::engine::rule::{Rule, RuleOperator, ScopedParam};
use crate::engine::scoped::CompiledScope;
use crate::engine::settings::{EngineSettings, NestedExecutionMode};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A compiled rule: takes the environment values (base parameters plus
/// resolved globals, positionally aligned with the compile-time names) and
/// produces a result tree.
///
/// In the default lenient mode the closure never fails; with
/// `exceptions_as_error_messages` disabled, runtime expression errors
/// propagate as `Err` and abort the evaluation call.
pub(crate) type CompiledRuleFn =
    Arc<dyn Fn(&[Value]) -> Result<RuleResultTree> + Send + Sync>;

/// One compiled top-level rule.
pub(crate) struct CompiledRuleEntry {
    pub rule: Arc<Rule>,
    pub func: CompiledRuleFn,
}

/// A workflow compiled for one input type signature.
impl std::fmt::Debug for CompiledWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledWorkflow")
            .field("env_names", &self.env_names)
            .field("global_error", &self.global_error)
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

pub(crate) struct CompiledWorkflow {
    /// Base + global names, aligned with the environment the rule closures
    /// receive.
    pub env_names: Arc<Vec<String>>,
    /// Global scoped-parameter pipeline, if any.
    pub global_scope: Option<CompiledScope>,
    /// Set when the global pipeline failed to compile in lenient mode;
    /// every rule of the workflow then reports this failure.
    pub global_error: Option<String>,
    /// Enabled top-level rules, in declaration order.
    pub rules: Vec<CompiledRuleEntry>,
}

/// Build the inputs map recorded on a result node from the environment.
pub(crate) fn inputs_map(names: &[String], values: &[Value]) -> Map<String, Value> {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Compiles rules into evaluation closures.
pub(crate) struct RuleCompiler {
    settings: Arc<EngineSettings>,
}

impl RuleCompiler {
    pub(crate) fn new(settings: Arc<EngineSettings>) -> Self {
        Self { settings }
    }

    /// Compile a workflow's effective rule list for one input signature.
    ///
    /// `rules` is the already-resolved effective list (injection applied);
    /// disabled rules are skipped here and appear nowhere downstream.
    pub(crate) fn compile_workflow(
        &self,
        workflow_name: &str,
        rules: &[Arc<Rule>],
        global_params: Option<&[ScopedParam]>,
        base_names: Vec<String>,
    ) -> Result<CompiledWorkflow> {
        let mut env_names = base_names;
        let mut global_scope = None;
        let mut global_error = None;

        if self.settings.enable_scoped_params {
            if let Some(params) = global_params.filter(|p| !p.is_empty()) {
                debug!(
                    "compiling {} global scoped parameter(s) for workflow '{workflow_name}'",
                    params.len()
                );
                let mut extended = env_names.clone();
                match CompiledScope::compile(params, &mut extended, &self.settings) {
                    Ok(scope) => {
                        env_names = extended;
                        global_scope = Some(scope);
                    }
                    Err(e) if self.settings.exceptions_as_error_messages => {
                        warn!(
                            "workflow '{workflow_name}': global scoped parameters failed to \
                             compile: {e}"
                        );
                        global_error = Some(e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let env_names = Arc::new(env_names);
        let mut compiled = Vec::new();
        for rule in rules {
            if !rule.enabled {
                debug!("skipping disabled rule '{}'", rule.rule_name);
                continue;
            }
            let func = self.compile_rule_or_absorb(Arc::clone(rule), &env_names)?;
            compiled.push(CompiledRuleEntry {
                rule: Arc::clone(rule),
                func,
            });
        }

        debug!(
            "compiled workflow '{workflow_name}': {} rule(s), {} binding(s)",
            compiled.len(),
            env_names.len()
        );

        Ok(CompiledWorkflow {
            env_names,
            global_scope,
            global_error,
            rules: compiled,
        })
    }

    /// Compile one rule; in lenient mode a compile failure becomes a
    /// constant failing-result closure instead of an error.
    fn compile_rule_or_absorb(
        &self,
        rule: Arc<Rule>,
        env_names: &Arc<Vec<String>>,
    ) -> Result<CompiledRuleFn> {
        match self.compile_rule(Arc::clone(&rule), env_names) {
            Ok(func) => Ok(func),
            Err(e) if self.settings.exceptions_as_error_messages => {
                warn!(
                    "rule '{}' failed to compile, converting to failing result: {e}",
                    rule.rule_name
                );
                Ok(failing_fn(rule, Arc::clone(env_names), e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn compile_rule(
        &self,
        rule: Arc<Rule>,
        env_names: &Arc<Vec<String>>,
    ) -> Result<CompiledRuleFn> {
        if rule.expression.is_some() {
            self.compile_leaf(rule, env_names)
        } else if let (Some(operator), true) = (rule.operator, rule.rules.is_some()) {
            self.compile_composite(rule, operator, env_names)
        } else {
            Err(RuleError::Validation(vec![format!(
                "rule '{}': must be either a leaf or a composite",
                rule.rule_name
            )]))
        }
    }

    fn compile_leaf(
        &self,
        rule: Arc<Rule>,
        env_names: &Arc<Vec<String>>,
    ) -> Result<CompiledRuleFn> {
        let settings = Arc::clone(&self.settings);
        let mut names = (**env_names).clone();

        let local_scope = match &rule.local_params {
            Some(params) if settings.enable_scoped_params && !params.is_empty() => {
                Some(CompiledScope::compile(params, &mut names, &settings)?)
            }
            _ => None,
        };

        let expression: CompiledExpression = expression::compile(
            rule.expression.as_deref().unwrap_or_default(),
            &names,
            &settings.helpers,
            settings.case_sensitive_identifiers,
        )?;

        let env_names = Arc::clone(env_names);
        Ok(Arc::new(move |values: &[Value]| {
            let mut env = values.to_vec();
            let mut inputs = inputs_map(&env_names, values);

            if let Some(scope) = &local_scope {
                match scope.evaluate(&mut env, &settings.helpers) {
                    Ok(resolved) => {
                        for (name, value) in resolved {
                            inputs.insert(name, value);
                        }
                    }
                    Err(e) => {
                        return Ok(RuleResultTree::failed(
                            Arc::clone(&rule),
                            inputs,
                            e.to_string(),
                        ));
                    }
                }
            }

            match expression.evaluate_bool(&env, &settings.helpers) {
                Ok(success) => Ok(RuleResultTree::new(
                    Arc::clone(&rule),
                    success,
                    inputs,
                    None,
                )),
                Err(e) if settings.exceptions_as_error_messages => Ok(
                    RuleResultTree::failed(Arc::clone(&rule), inputs, e.to_string()),
                ),
                Err(e) => Err(RuleError::Execution(format!(
                    "rule '{}': {e}",
                    rule.rule_name
                ))),
            }
        }))
    }

    fn compile_composite(
        &self,
        rule: Arc<Rule>,
        operator: RuleOperator,
        env_names: &Arc<Vec<String>>,
    ) -> Result<CompiledRuleFn> {
        let children = rule.rules.as_deref().unwrap_or_default();
        let mut compiled_children = Vec::with_capacity(children.len());
        for child in children {
            if !child.enabled {
                debug!(
                    "skipping disabled child rule '{}' of '{}'",
                    child.rule_name, rule.rule_name
                );
                continue;
            }
            let child = Arc::new(child.clone());
            compiled_children.push(self.compile_rule_or_absorb(child, env_names)?);
        }

        let is_and = operator.is_and();
        let mode = self.settings.nested_execution_mode;
        let env_names = Arc::clone(env_names);

        Ok(Arc::new(move |values: &[Value]| {
            let mut child_results = Vec::with_capacity(compiled_children.len());
            let mut success = is_and;

            for child in &compiled_children {
                let result = child(values)?;
                let child_ok = result.is_success;
                child_results.push(result);

                if is_and {
                    success = success && child_ok;
                    if mode == NestedExecutionMode::ShortCircuit && !child_ok {
                        break;
                    }
                } else {
                    success = success || child_ok;
                    if mode == NestedExecutionMode::ShortCircuit && child_ok {
                        break;
                    }
                }
            }

            let inputs = inputs_map(&env_names, values);
            Ok(RuleResultTree::new(
                Arc::clone(&rule),
                success,
                inputs,
                Some(child_results),
            ))
        }))
    }
}

/// A closure producing a constant failing result carrying `message`.
fn failing_fn(
    rule: Arc<Rule>,
    env_names: Arc<Vec<String>>,
    message: String,
) -> CompiledRuleFn {
    Arc::new(move |values: &[Value]| {
        let inputs = inputs_map(&env_names, values);
        Ok(RuleResultTree::failed(
            Arc::clone(&rule),
            inputs,
            message.clone(),
        ))
    })
}
