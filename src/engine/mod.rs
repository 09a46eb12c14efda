//! # Evaluation Engine Module
//!
//! The top-level orchestration: workflow registration with aggregated
//! validation, lazy compilation cached per input type signature, ordered
//! rule evaluation, error-message formatting, and action dispatch.

pub mod actions;
mod cache;
mod compiler;
pub mod error;
pub mod expression;
pub mod parameter;
pub mod result;
pub mod rule;
mod scoped;
pub mod settings;
pub mod utils;
pub mod workflow;

// Re-export key types for easier access
pub use actions::{ActionContext, ActionHandler, ActionHandlerMap};
pub use error::{Result, RuleError};
pub use parameter::RuleParameter;
pub use result::{ActionResult, ActionRuleResult, RuleResultTree};
pub use rule::{ActionInfo, Rule, RuleActions, RuleOperator, ScopedParam};
pub use settings::{CacheSettings, EngineSettings, NestedExecutionMode};
pub use workflow::Workflow;

use cache::{MemCache, RulesCache};
use compiler::{CompiledWorkflow, RuleCompiler};
use log::{debug, info, warn};
use parameter::type_signature;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use utils::format_error_message;
use uuid::Uuid;

/// The rules evaluation engine.
///
/// Registers workflows, compiles their rules lazily per input type
/// signature, evaluates them against supplied parameters, and dispatches
/// post-evaluation actions. All methods take `&self`; the engine is
/// `Send + Sync` and designed to be shared across tasks and threads.
pub struct RulesEngine {
    cache: RulesCache,
    compiler: RuleCompiler,
    actions: Arc<ActionHandlerMap>,
    settings: Arc<EngineSettings>,
    /// Memoizes single-rule compilations for the action-execution path.
    memo: MemCache<Arc<CompiledWorkflow>>,
}

impl RulesEngine {
    /// Creates an engine with default settings.
    ///
    /// # Arguments
    /// * `workflows` - Workflows to register; validated as one batch
    /// * `custom_actions` - Optional action handlers, merged over the
    ///   builtin set (same-name handlers override builtins)
    pub fn new(
        workflows: Vec<Workflow>,
        custom_actions: Option<ActionHandlerMap>,
    ) -> Result<Self> {
        Self::with_settings(workflows, custom_actions, EngineSettings::default())
    }

    /// Creates an engine with explicit settings.
    pub fn with_settings(
        workflows: Vec<Workflow>,
        custom_actions: Option<ActionHandlerMap>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let settings = Arc::new(settings);

        // Build the action registry: builtins first, custom handlers override.
        let mut action_map: ActionHandlerMap = ActionHandlerMap::new();
        for (name, handler) in actions::builtins::get_all_actions() {
            action_map.insert(name, handler);
        }
        if let Some(custom) = custom_actions {
            for (name, handler) in custom {
                action_map.insert(name, handler);
            }
        }

        let engine = Self {
            cache: RulesCache::new(),
            compiler: RuleCompiler::new(Arc::clone(&settings)),
            actions: Arc::new(action_map),
            memo: MemCache::new(settings.cache.memo_size_limit, settings.cache.memo_ttl),
            settings,
        };
        engine.add_workflows(workflows)?;
        Ok(engine)
    }

    pub(crate) fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Register a batch of workflows. The whole batch is validated first
    /// and applied atomically: on any violation nothing is registered and
    /// the error aggregates every violation found.
    ///
    /// Re-registering an existing name replaces its definition and evicts
    /// its compiled variants.
    pub fn add_workflows(&self, workflows: Vec<Workflow>) -> Result<()> {
        let mut violations = Vec::new();
        for workflow in &workflows {
            violations.extend(workflow.validate());
        }
        if !violations.is_empty() {
            return Err(RuleError::Validation(violations));
        }

        for workflow in workflows {
            info!("registering workflow '{}'", workflow.workflow_name);
            self.memo
                .remove_prefix(&format!("{}::", workflow.workflow_name));
            self.cache.put_workflow(workflow);
        }
        Ok(())
    }

    /// Register or replace a single workflow.
    pub fn add_or_update_workflow(&self, workflow: Workflow) -> Result<()> {
        self.add_workflows(vec![workflow])
    }

    /// Remove a workflow and its compiled variants. Returns whether the
    /// name was registered.
    pub fn remove_workflow(&self, workflow_name: &str) -> bool {
        self.memo.remove_prefix(&format!("{workflow_name}::"));
        let removed = self.cache.remove_workflow(workflow_name);
        if removed {
            info!("removed workflow '{workflow_name}'");
        }
        removed
    }

    /// Remove every registered workflow and compiled artifact.
    pub fn clear_workflows(&self) {
        self.cache.clear();
        self.memo.clear();
        info!("cleared all workflows");
    }

    pub fn contains_workflow(&self, workflow_name: &str) -> bool {
        self.cache.contains_workflow(workflow_name)
    }

    pub fn workflow_names(&self) -> Vec<String> {
        self.cache.workflow_names()
    }

    /// Evaluate every rule of a workflow against the supplied parameters.
    ///
    /// Results are returned in declaration order (injected workflows'
    /// rules after the workflow's own). Each result's on-success or
    /// on-failure action, if configured, has been dispatched and its
    /// output attached.
    pub async fn execute_all_rules(
        &self,
        workflow_name: &str,
        params: &[RuleParameter],
    ) -> Result<Vec<RuleResultTree>> {
        self.execute_all_rules_cancellable(workflow_name, params, &CancellationToken::new())
            .await
    }

    /// Like [`execute_all_rules`](Self::execute_all_rules) but honoring a
    /// cancellation token at admission points: before each rule and before
    /// each action. A rule's expression evaluation is never interrupted
    /// mid-flight.
    pub async fn execute_all_rules_cancellable(
        &self,
        workflow_name: &str,
        params: &[RuleParameter],
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleResultTree>> {
        let evaluation_id = Uuid::now_v7();
        debug!(
            "[{evaluation_id}] evaluating workflow '{workflow_name}' with {} parameter(s)",
            params.len()
        );
        if cancel.is_cancelled() {
            return Err(RuleError::Cancelled);
        }

        let compiled = self.get_or_compile(workflow_name, params)?;
        let mut results = self.run_compiled(&compiled, params, cancel)?;

        for result in &mut results {
            apply_error_messages(result, self.settings.enable_formatted_error_message);
        }

        for result in &mut results {
            if cancel.is_cancelled() {
                return Err(RuleError::Cancelled);
            }
            self.dispatch_action(result, params).await;
        }

        debug!(
            "[{evaluation_id}] workflow '{workflow_name}' produced {} result(s)",
            results.len()
        );
        Ok(results)
    }

    /// Evaluate a single named rule and run its action immediately,
    /// returning the action's output together with the underlying rule
    /// results. Used for explicit rule chaining.
    ///
    /// The rule is located anywhere in the workflow's effective rule tree
    /// (injection applied, nested rules addressable by name). Disabled
    /// rules are invisible here as everywhere else.
    pub async fn execute_rule_action(
        &self,
        workflow_name: &str,
        rule_name: &str,
        params: &[RuleParameter],
    ) -> Result<ActionRuleResult> {
        self.execute_rule_action_cancellable(
            workflow_name,
            rule_name,
            params,
            &CancellationToken::new(),
        )
        .await
    }

    /// Cancellable variant of
    /// [`execute_rule_action`](Self::execute_rule_action).
    pub async fn execute_rule_action_cancellable(
        &self,
        workflow_name: &str,
        rule_name: &str,
        params: &[RuleParameter],
        cancel: &CancellationToken,
    ) -> Result<ActionRuleResult> {
        if cancel.is_cancelled() {
            return Err(RuleError::Cancelled);
        }

        let workflow = self
            .cache
            .get_workflow(workflow_name)
            .ok_or_else(|| RuleError::WorkflowNotFound(workflow_name.to_string()))?;

        let signature = type_signature(params);
        let memo_key = format!("{workflow_name}::{rule_name}::{signature}");
        let compiled = match self.memo.get(&memo_key) {
            Some(hit) => {
                debug!("memo cache hit for '{memo_key}'");
                hit
            }
            None => {
                let rules = self.resolve_effective_rules(&workflow)?;
                let rule = find_rule(&rules, rule_name)
                    .filter(|r| r.enabled)
                    .ok_or_else(|| RuleError::RuleNotFound {
                        workflow: workflow_name.to_string(),
                        rule: rule_name.to_string(),
                    })?;
                let base_names = params.iter().map(|p| p.name().to_string()).collect();
                let compiled = Arc::new(self.compiler.compile_workflow(
                    workflow_name,
                    &[rule],
                    workflow.global_params.as_deref(),
                    base_names,
                )?);
                self.memo.insert(memo_key, Arc::clone(&compiled));
                compiled
            }
        };

        let mut results = self.run_compiled(&compiled, params, cancel)?;
        for result in &mut results {
            apply_error_messages(result, self.settings.enable_formatted_error_message);
        }

        let Some(mut result) = results.pop() else {
            return Err(RuleError::RuleNotFound {
                workflow: workflow_name.to_string(),
                rule: rule_name.to_string(),
            });
        };

        if cancel.is_cancelled() {
            return Err(RuleError::Cancelled);
        }
        self.dispatch_action(&mut result, params).await;

        let action = result.action_result.clone();
        Ok(ActionRuleResult {
            output: action.as_ref().and_then(|a| a.output.clone()),
            exception: action.as_ref().and_then(|a| a.exception.clone()),
            results: Some(vec![result]),
        })
    }

    /// Fetch the compiled form for this (workflow, signature) pair,
    /// compiling and caching on first miss.
    fn get_or_compile(
        &self,
        workflow_name: &str,
        params: &[RuleParameter],
    ) -> Result<Arc<CompiledWorkflow>> {
        let signature = type_signature(params);
        let key = RulesCache::compiled_key(workflow_name, &signature);
        if let Some(hit) = self.cache.get_compiled(&key) {
            debug!("compiled cache hit for '{key}'");
            return Ok(hit);
        }

        let workflow = self
            .cache
            .get_workflow(workflow_name)
            .ok_or_else(|| RuleError::WorkflowNotFound(workflow_name.to_string()))?;
        let rules = self.resolve_effective_rules(&workflow)?;
        let base_names = params.iter().map(|p| p.name().to_string()).collect();

        debug!("compiling workflow '{workflow_name}' for signature '{signature}'");
        let compiled = Arc::new(self.compiler.compile_workflow(
            workflow_name,
            &rules,
            workflow.global_params.as_deref(),
            base_names,
        )?);
        self.cache.insert_compiled(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Resolve a workflow's effective rule list: its own rules followed by
    /// the rules of every injected workflow, recursively. A name missing
    /// from the registry fails with `MissingInjectedWorkflow`; a cycle
    /// fails with `CyclicInjection`. A workflow reachable through several
    /// non-cyclic paths is merged once.
    fn resolve_effective_rules(&self, workflow: &Workflow) -> Result<Vec<Arc<Rule>>> {
        let mut rules = Vec::new();
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        self.collect_rules(workflow, &mut path, &mut seen, &mut rules)?;
        Ok(rules)
    }

    fn collect_rules(
        &self,
        workflow: &Workflow,
        path: &mut Vec<String>,
        seen: &mut HashSet<String>,
        out: &mut Vec<Arc<Rule>>,
    ) -> Result<()> {
        if path.iter().any(|name| name == &workflow.workflow_name) {
            return Err(RuleError::CyclicInjection(workflow.workflow_name.clone()));
        }
        if !seen.insert(workflow.workflow_name.clone()) {
            // Already merged through another injection path.
            return Ok(());
        }

        for rule in &workflow.rules {
            out.push(Arc::new(rule.clone()));
        }

        path.push(workflow.workflow_name.clone());
        for name in workflow.injected_names() {
            let injected = self
                .cache
                .get_workflow(name)
                .ok_or_else(|| RuleError::MissingInjectedWorkflow(name.clone()))?;
            self.collect_rules(&injected, path, seen, out)?;
        }
        path.pop();
        Ok(())
    }

    /// Run a compiled workflow against concrete parameter values.
    fn run_compiled(
        &self,
        compiled: &CompiledWorkflow,
        params: &[RuleParameter],
        cancel: &CancellationToken,
    ) -> Result<Vec<RuleResultTree>> {
        if let Some(message) = &compiled.global_error {
            return Ok(self.all_failing(compiled, params, message));
        }

        let mut env: Vec<Value> = params.iter().map(|p| p.value().clone()).collect();
        if let Some(scope) = &compiled.global_scope {
            if let Err(e) = scope.evaluate(&mut env, &self.settings.helpers) {
                warn!("global scoped parameters failed to evaluate: {e}");
                return Ok(self.all_failing(compiled, params, &e.to_string()));
            }
        }

        let mut results = Vec::with_capacity(compiled.rules.len());
        for entry in &compiled.rules {
            if cancel.is_cancelled() {
                return Err(RuleError::Cancelled);
            }
            results.push((entry.func)(&env)?);
        }
        Ok(results)
    }

    /// One failing result per rule, used when the global scope fails: the
    /// failure belongs to every rule of the call, not to the call itself.
    fn all_failing(
        &self,
        compiled: &CompiledWorkflow,
        params: &[RuleParameter],
        message: &str,
    ) -> Vec<RuleResultTree> {
        compiled
            .rules
            .iter()
            .map(|entry| {
                let inputs = params
                    .iter()
                    .map(|p| (p.name().to_string(), p.value().clone()))
                    .collect();
                RuleResultTree::failed(Arc::clone(&entry.rule), inputs, message)
            })
            .collect()
    }

    /// Dispatch the action bound to the result's outcome, if any, and
    /// attach its output. Handler errors and unknown action names are
    /// captured into the action result, never thrown.
    async fn dispatch_action(&self, result: &mut RuleResultTree, params: &[RuleParameter]) {
        let Some(action) = result.rule.action_for(result.is_success) else {
            return;
        };
        let action = action.clone();
        debug!(
            "dispatching action '{}' for rule '{}'",
            action.name, result.rule.rule_name
        );

        let outcome = match self.actions.get(&action.name) {
            None => {
                warn!("action '{}' has no registered handler", action.name);
                ActionResult {
                    output: None,
                    exception: Some(
                        RuleError::ActionNotFound(action.name.clone()).to_string(),
                    ),
                }
            }
            Some(handler) => {
                let context = ActionContext::new(&action.context, result, params);
                match handler.run(self, &context).await {
                    Ok(output) => ActionResult {
                        output: Some(output),
                        exception: None,
                    },
                    Err(e) => {
                        warn!("action '{}' failed: {e}", action.name);
                        ActionResult {
                            output: None,
                            exception: Some(e.to_string()),
                        }
                    }
                }
            }
        };
        result.action_result = Some(outcome);
    }
}

/// Set failure messages from the rules' `ErrorMessage` templates: on a
/// failed node without an evaluation error, the template is attached with
/// `$(name)` placeholders substituted from the node's inputs when
/// formatting is enabled, verbatim otherwise. Evaluation errors already
/// present are never overwritten.
fn apply_error_messages(result: &mut RuleResultTree, format: bool) {
    if !result.is_success && result.exception_message.is_none() {
        if let Some(template) = &result.rule.error_message {
            result.exception_message = Some(if format {
                format_error_message(template, &result.inputs)
            } else {
                template.clone()
            });
        }
    }
    if let Some(children) = &mut result.child_results {
        for child in children {
            apply_error_messages(child, format);
        }
    }
}

/// Depth-first search for a rule by name across the effective rule list,
/// including nested composite children.
fn find_rule(rules: &[Arc<Rule>], name: &str) -> Option<Arc<Rule>> {
    for rule in rules {
        if rule.rule_name == name {
            return Some(Arc::clone(rule));
        }
        if let Some(children) = &rule.rules {
            if let Some(found) = find_rule_nested(children, name) {
                return Some(found);
            }
        }
    }
    None
}

fn find_rule_nested(rules: &[Rule], name: &str) -> Option<Arc<Rule>> {
    for rule in rules {
        if rule.rule_name == name {
            return Some(Arc::new(rule.clone()));
        }
        if let Some(children) = &rule.rules {
            if let Some(found) = find_rule_nested(children, name) {
                return Some(found);
            }
        }
    }
    None
}
