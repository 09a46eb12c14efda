use crate::engine::expression::ExprError;
use thiserror::Error;

/// Main error type for the rules engine
#[derive(Debug, Error, Clone)]
pub enum RuleError {
    /// Structural violations found at registration time, aggregated across
    /// the whole batch
    #[error("workflow validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Evaluation requested against an unregistered workflow name
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A rule name that does not exist in an otherwise-valid workflow
    #[error("rule '{rule}' not found in workflow '{workflow}'")]
    RuleNotFound { workflow: String, rule: String },

    /// A workflow's injection list references a name not in the registry
    #[error("injected workflow not found: {0}")]
    MissingInjectedWorkflow(String),

    /// Workflows inject each other cyclically
    #[error("cyclic workflow injection detected at '{0}'")]
    CyclicInjection(String),

    /// Expression compile or evaluation errors
    #[error("expression error: {0}")]
    Expression(#[from] ExprError),

    /// A scoped parameter whose expression failed to compile
    #[error("scoped parameter '{name}': {source}")]
    ScopedParam {
        name: String,
        #[source]
        source: ExprError,
    },

    /// Runtime failure while evaluating compiled rules
    #[error("execution error: {0}")]
    Execution(String),

    /// An action name with no registered handler
    #[error("action not found: {0}")]
    ActionNotFound(String),

    /// The evaluation call was cancelled before completion
    #[error("evaluation cancelled")]
    Cancelled,

    /// JSON serialization/deserialization errors
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// I/O errors (file reading, etc.)
    #[error("io error: {0}")]
    Io(String),
}

impl RuleError {
    /// Convert from std::io::Error
    pub fn from_io(err: std::io::Error) -> Self {
        RuleError::Io(err.to_string())
    }

    /// Convert from serde_json::Error
    pub fn from_serde(err: serde_json::Error) -> Self {
        RuleError::Deserialization(err.to_string())
    }

    /// Whether this error represents a configuration problem detectable
    /// before any input data is supplied (as opposed to a data-dependent
    /// evaluation failure).
    pub fn is_configuration_error(&self) -> bool {
        match self {
            RuleError::Validation(_)
            | RuleError::WorkflowNotFound(_)
            | RuleError::RuleNotFound { .. }
            | RuleError::MissingInjectedWorkflow(_)
            | RuleError::CyclicInjection(_)
            | RuleError::ScopedParam { .. }
            | RuleError::ActionNotFound(_)
            | RuleError::Deserialization(_)
            | RuleError::Io(_) => true,
            RuleError::Expression(e) => !matches!(e, ExprError::Eval(_)),
            RuleError::Execution(_) | RuleError::Cancelled => false,
        }
    }
}

/// Type alias for Result with RuleError
pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_aggregates_messages() {
        let err = RuleError::Validation(vec![
            "workflow name must not be empty".to_string(),
            "rule 'r1': expression must not be empty".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("workflow name must not be empty"));
        assert!(text.contains("r1"));
    }

    #[test]
    fn test_configuration_error_classification() {
        assert!(RuleError::WorkflowNotFound("x".to_string()).is_configuration_error());
        assert!(
            RuleError::Expression(ExprError::UnknownIdentifier {
                name: "x".to_string()
            })
            .is_configuration_error()
        );
        assert!(!RuleError::Execution("boom".to_string()).is_configuration_error());
        assert!(
            !RuleError::Expression(ExprError::Eval("null deref".to_string()))
                .is_configuration_error()
        );
    }

    #[test]
    fn test_scoped_param_error_names_the_parameter() {
        let err = RuleError::ScopedParam {
            name: "p2".to_string(),
            source: ExprError::UnknownIdentifier {
                name: "p3".to_string(),
            },
        };
        assert!(err.to_string().contains("p2"));
    }
}
