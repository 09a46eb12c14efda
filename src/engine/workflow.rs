//! Workflow definitions: a named collection of rules, optional injected
//! workflows merged in at resolution time, and optional global scoped
//! parameters visible to every rule.

use crate::engine::error::{Result, RuleError};
use crate::engine::rule::{Rule, ScopedParam, check_duplicate_params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Workflow {
    pub workflow_name: String,

    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Names of other workflows whose rules are merged into this one at
    /// resolution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflows_to_inject: Option<Vec<String>>,

    /// Workflow-level scoped parameters, resolved once per evaluation call
    /// and visible to every rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_params: Option<Vec<ScopedParam>>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            workflow_name: name.into(),
            rules,
            workflows_to_inject: None,
            global_params: None,
        }
    }

    /// Load a workflow from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(RuleError::from_serde)
    }

    /// Load a workflow from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json_str = fs::read_to_string(path).map_err(RuleError::from_io)?;
        Self::from_json(&json_str)
    }

    /// Names of injected workflows, empty when none are declared.
    pub fn injected_names(&self) -> &[String] {
        self.workflows_to_inject.as_deref().unwrap_or(&[])
    }

    /// Validate structural invariants, returning every violation found.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let label = if self.workflow_name.trim().is_empty() {
            "<unnamed>"
        } else {
            self.workflow_name.as_str()
        };

        if self.workflow_name.trim().is_empty() {
            violations.push("workflow name must not be empty".to_string());
        }

        if self.rules.is_empty() && self.injected_names().is_empty() {
            violations.push(format!(
                "workflow '{label}': must have at least one rule or at least one \
                 workflow to inject"
            ));
        }

        if let Some(params) = &self.global_params {
            check_duplicate_params(params, label, "global", &mut violations);
        }

        for (i, rule) in self.rules.iter().enumerate() {
            let path = if rule.rule_name.trim().is_empty() {
                format!("{label}.Rules[{i}]")
            } else {
                format!("{label}.{}", rule.rule_name)
            };
            rule.validate(&path, &mut violations);
        }

        violations
    }
}
