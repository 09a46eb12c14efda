//! Rule definitions: leaf expressions, nested AND/OR groups, scoped
//! parameters, and action bindings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Logical operator of a composite rule. `And`/`AndAlso` are both AND-kind,
/// `Or`/`OrElse` both OR-kind; whether evaluation short-circuits is decided
/// by the engine's nested execution mode, not by the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleOperator {
    And,
    AndAlso,
    Or,
    OrElse,
}

impl RuleOperator {
    pub fn is_and(&self) -> bool {
        matches!(self, RuleOperator::And | RuleOperator::AndAlso)
    }
}

/// A named intermediate expression result made available to subsequent
/// expressions in its scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScopedParam {
    pub name: String,
    pub expression: String,
}

impl ScopedParam {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// A named action binding with its static context arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ActionInfo {
    pub name: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

/// Success and failure action bindings of a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuleActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<ActionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<ActionInfo>,
}

/// A rule: either a leaf with an expression, or a composite with an
/// operator and child rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Rule {
    pub rule_name: String,

    /// Leaf rules only: the boolean expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Composite rules only: the logical operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<RuleOperator>,

    /// Composite rules only: the child rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,

    /// Rule-level scoped parameters, visible only within this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_params: Option<Vec<ScopedParam>>,

    /// Disabled rules are skipped entirely, including from result output.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Error-message template; may contain `$(name)` or `$(name.property)`
    /// placeholders resolved against runtime inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Event label reported on success; defaults to the rule name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<RuleActions>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// A leaf rule with just a name and an expression.
    pub fn leaf(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            rule_name: name.into(),
            expression: Some(expression.into()),
            operator: None,
            rules: None,
            local_params: None,
            enabled: true,
            error_message: None,
            success_event: None,
            actions: None,
        }
    }

    /// A composite rule grouping child rules under an operator.
    pub fn composite(
        name: impl Into<String>,
        operator: RuleOperator,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            rule_name: name.into(),
            expression: None,
            operator: Some(operator),
            rules: Some(rules),
            local_params: None,
            enabled: true,
            error_message: None,
            success_event: None,
            actions: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.expression.is_some()
    }

    /// The event label reported when this rule succeeds.
    pub fn success_event_label(&self) -> &str {
        self.success_event.as_deref().unwrap_or(&self.rule_name)
    }

    /// The action bound to the given outcome, if any.
    pub fn action_for(&self, success: bool) -> Option<&ActionInfo> {
        let actions = self.actions.as_ref()?;
        if success {
            actions.on_success.as_ref()
        } else {
            actions.on_failure.as_ref()
        }
    }

    /// Validate structural invariants, appending every violation found.
    /// `path` labels the rule's position for composite nesting.
    pub(crate) fn validate(&self, path: &str, violations: &mut Vec<String>) {
        if self.rule_name.trim().is_empty() {
            violations.push(format!("rule at '{path}': name must not be empty"));
        }

        let has_expression = self.expression.is_some();
        let has_children = self.rules.as_ref().is_some_and(|r| !r.is_empty());
        let has_operator = self.operator.is_some();

        match (has_expression, has_operator || self.rules.is_some()) {
            (true, true) => violations.push(format!(
                "rule '{path}': must be either a leaf (Expression) or a composite \
                 (Operator + Rules), not both"
            )),
            (false, false) => violations.push(format!(
                "rule '{path}': must have an Expression or an Operator with child Rules"
            )),
            (true, false) => {
                if self
                    .expression
                    .as_ref()
                    .is_some_and(|e| e.trim().is_empty())
                {
                    violations.push(format!("rule '{path}': expression must not be empty"));
                }
            }
            (false, true) => {
                if !has_operator {
                    violations.push(format!(
                        "rule '{path}': composite rule requires an Operator"
                    ));
                }
                if !has_children {
                    violations.push(format!(
                        "rule '{path}': composite rule requires at least one child rule"
                    ));
                }
            }
        }

        if let Some(params) = &self.local_params {
            check_duplicate_params(params, path, "local", violations);
        }

        if let Some(children) = &self.rules {
            for (i, child) in children.iter().enumerate() {
                let child_path = format!("{path}.Rules[{i}]");
                child.validate(&child_path, violations);
            }
        }
    }
}

/// Flag duplicate scoped-parameter names within one declaring scope.
pub(crate) fn check_duplicate_params(
    params: &[ScopedParam],
    path: &str,
    scope: &str,
    violations: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for param in params {
        if param.name.trim().is_empty() {
            violations.push(format!(
                "'{path}': {scope} scoped parameter name must not be empty"
            ));
        }
        if !seen.insert(param.name.as_str()) {
            violations.push(format!(
                "'{path}': duplicate {scope} scoped parameter '{}'",
                param.name
            ));
        }
    }
}
