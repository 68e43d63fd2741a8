//! Output artefacts of a single evaluation run: the per-variable record and
//! the whole-evaluation record.

use crate::diagnostics::FormulaDiagnostic;
use crate::error::FormulaError;
use crate::value::{Type, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One declared variable from the composed program, decorated with the
/// formula metadata the evaluator knows about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationVariable {
    pub name: String,
    pub var_type: Type,
    pub is_read_only: bool,
    pub value: Value,
    /// The originating expression text, present iff `name` names a formula
    /// in this evaluator's definition set.
    pub formula_expression: Option<String>,
    /// True iff the rounding rewrite was applied when this variable's
    /// declaration was composed.
    pub is_rounded: bool,
}

/// The full, immutable record of one `Run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationState {
    pub identifier: String,
    pub variables: Vec<EvaluationVariable>,
    pub diagnostics: Vec<FormulaDiagnostic>,
}

impl EvaluationState {
    pub fn new(
        identifier: impl Into<String>,
        variables: Vec<EvaluationVariable>,
        diagnostics: Vec<FormulaDiagnostic>,
    ) -> Self {
        Self { identifier: identifier.into(), variables, diagnostics }
    }

    /// `name -> variable`, built on demand; keys are unique by construction
    /// (the composer never emits the same declared name twice).
    pub fn variables_by_name(&self) -> HashMap<&str, &EvaluationVariable> {
        self.variables.iter().map(|v| (v.name.as_str(), v)).collect()
    }

    /// The target's own computed value.
    pub fn return_value(&self) -> Result<&Value, FormulaError> {
        self.variables
            .iter()
            .find(|v| v.name == self.identifier)
            .map(|v| &v.value)
            .ok_or_else(|| FormulaError::NoFormulaForIdentifier { name: self.identifier.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, value: Value) -> EvaluationVariable {
        EvaluationVariable {
            name: name.to_string(),
            var_type: value.value_type(),
            is_read_only: true,
            value,
            formula_expression: None,
            is_rounded: false,
        }
    }

    #[test]
    fn return_value_matches_target_variable() {
        let state = EvaluationState::new(
            "c",
            vec![var("a", Value::Integer(2)), var("c", Value::Integer(22))],
            vec![],
        );
        assert_eq!(state.return_value().unwrap(), &Value::Integer(22));
        assert_eq!(state.variables_by_name()["c"].value, Value::Integer(22));
    }
}
