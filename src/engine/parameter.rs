//! Runtime inputs supplied by the caller for one evaluation call.

use crate::engine::expression::value_kind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named runtime input. The name is the binding identifier referenced by
/// expressions; the type is carried by the value itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuleParameter {
    name: String,
    value: Value,
}

impl RuleParameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The parameter's type name, derived from the value's kind.
    pub fn kind(&self) -> &'static str {
        value_kind(&self.value)
    }

    /// Wrap positional inputs as parameters named `input1..inputN`, the
    /// conventional names for callers that do not care about binding names.
    pub fn from_inputs(values: &[Value]) -> Vec<RuleParameter> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| RuleParameter::new(format!("input{}", i + 1), value.clone()))
            .collect()
    }
}

/// Derive the input type signature for a parameter set: the ordered
/// `name:kind` list. Compiled artifacts are keyed by workflow name plus
/// this signature, so a workflow is recompiled independently for each
/// distinct shape of inputs it is evaluated with.
pub(crate) fn type_signature(params: &[RuleParameter]) -> String {
    let mut signature = String::new();
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            signature.push('|');
        }
        signature.push_str(param.name());
        signature.push(':');
        signature.push_str(param.kind());
    }
    signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_inputs_names_positionally() {
        let params = RuleParameter::from_inputs(&[json!({"a": 1}), json!(2)]);
        assert_eq!(params[0].name(), "input1");
        assert_eq!(params[1].name(), "input2");
        assert_eq!(params[0].kind(), "object");
        assert_eq!(params[1].kind(), "number");
    }

    #[test]
    fn test_type_signature_reflects_names_and_kinds() {
        let params = vec![
            RuleParameter::new("user", json!({"id": 1})),
            RuleParameter::new("count", json!(5)),
        ];
        assert_eq!(type_signature(&params), "user:object|count:number");

        let retyped = vec![
            RuleParameter::new("user", json!({"id": 1})),
            RuleParameter::new("count", json!("five")),
        ];
        assert_ne!(type_signature(&params), type_signature(&retyped));
    }

    #[test]
    fn test_empty_signature() {
        assert_eq!(type_signature(&[]), "");
    }
}
