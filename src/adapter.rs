//! Expression-compiler adapter: a narrow, fixed-policy façade over the
//! embedded expression language (`dsl`), providing the seven operations the
//! engine composes a program with.
//!
//! Fixed policy, applied uniformly regardless of caller: unsafe operations
//! are never exposed by the expression language at all (there is no pointer
//! or FFI surface to disable), and arithmetic overflow is always checked —
//! see `dsl::evaluator`'s checked-arithmetic arms.

use crate::diagnostics::{has_error, FormulaDiagnostic};
use crate::dsl::ast::{find_denied_name, identifier_references, Expression};
use crate::dsl::evaluator;
use crate::dsl::functions::FunctionRegistry;
use crate::dsl::parser::parse_expression;
use crate::error::{FormulaError, FormulaResult};
use crate::fragment::{Declaration, Fragment};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// Fixed construction-time policy for one adapter instance. The
/// specification's "additional reference-libraries" and "additional import
/// namespaces" have no counterpart in this expression language (there is no
/// host assembly/namespace surface to extend), so this carries only the
/// part of the policy that does: the denied-names set.
#[derive(Debug, Clone, Default)]
pub struct ExpressionAdapter {
    pub denied_names: HashSet<String>,
    pub functions: std::sync::Arc<FunctionRegistry>,
}

impl ExpressionAdapter {
    pub fn new(denied_names: HashSet<String>) -> Self {
        Self { denied_names, functions: std::sync::Arc::new(FunctionRegistry::new()) }
    }

    /// Parse `expression_text` in isolation. Never executes, never touches
    /// the denied-names policy — a pure parser-phase check.
    pub fn validate(&self, expression_text: &str) -> Vec<FormulaDiagnostic> {
        match parse_expression(expression_text) {
            Ok(_) => Vec::new(),
            Err(syntax_error) => vec![FormulaDiagnostic::error(syntax_error.to_string())],
        }
    }

    /// Parse `expression_text` into a standalone fragment bound to no
    /// declaration — the `preParse` step of composition.
    pub fn create_fragment(&self, expression_text: &str) -> FormulaResult<Fragment> {
        let expr = parse_expression(expression_text)
            .map_err(|e| FormulaError::compilation(vec![FormulaDiagnostic::error(e.to_string())]))?;
        Ok(Fragment::from_expression(expression_text, expr))
    }

    /// Chain `source` before `target`, preserving `source`'s declarations.
    pub fn chain(&self, target: Fragment, source: Fragment) -> Fragment {
        target.chain(source)
    }

    /// The distinct identifiers referenced at simple-reference position in
    /// `fragment`'s own expression, in first-seen pre-order.
    pub fn identifier_references(&self, fragment: &Fragment) -> Vec<String> {
        identifier_references(fragment.expression())
    }

    /// Walk every declaration's expression (and the fragment's own, if it
    /// is a bare expression) for a denied spelling.
    pub fn enforce_denied_names(&self, fragment: &Fragment) -> FormulaResult<()> {
        if self.denied_names.is_empty() {
            return Ok(());
        }
        for decl in fragment.declarations() {
            if let Some(name) = find_denied_name(&decl.expr, &self.denied_names) {
                return Err(FormulaError::NameAccessDenied { name });
            }
        }
        if let crate::fragment::FragmentBody::Expression(expr) = &fragment.body {
            if let Some(name) = find_denied_name(expr, &self.denied_names) {
                return Err(FormulaError::NameAccessDenied { name });
            }
        }
        Ok(())
    }

    /// Full semantic analysis: every identifier referenced inside a
    /// declaration that names a *known formula* (per `known_formulas`) must
    /// itself be declared earlier in the same composite — otherwise it was
    /// elided by the cycle-skipping composition rule and is undefined at
    /// its point of use. Names not in `known_formulas` are assumed context
    /// members and are left to resolve at run time.
    pub fn compile(&self, fragment: &Fragment, known_formulas: &HashSet<String>) -> Vec<FormulaDiagnostic> {
        let mut diagnostics = Vec::new();
        let mut declared: HashSet<&str> = HashSet::new();
        for decl in fragment.declarations() {
            for reference in identifier_references(&decl.expr) {
                if known_formulas.contains(&reference) && !declared.contains(reference.as_str()) {
                    diagnostics.push(FormulaDiagnostic::error(format!(
                        "undefined symbol '{reference}' (dependency cycle or missing declaration)"
                    )));
                }
            }
            declared.insert(decl.name.as_str());
        }
        if let crate::fragment::FragmentBody::Expression(expr) = &fragment.body {
            for reference in identifier_references(expr) {
                if known_formulas.contains(&reference) && !declared.contains(reference.as_str()) {
                    diagnostics.push(FormulaDiagnostic::error(format!(
                        "undefined symbol '{reference}' (dependency cycle or missing declaration)"
                    )));
                }
            }
        }
        diagnostics
    }

    /// Execute `fragment`'s declarations in order, binding each into the
    /// environment, then evaluate its own trailing expression as the
    /// return value. Returns `(ordered declared variables, return value)`.
    pub fn run(
        &self,
        fragment: &Fragment,
        lookup: &dyn Fn(&str) -> Option<Value>,
    ) -> FormulaResult<(Vec<(String, Value, Declaration)>, Value)> {
        let mut env: HashMap<String, Value> = HashMap::new();
        let mut ordered = Vec::new();
        for decl in fragment.declarations() {
            let value = evaluator::evaluate(&decl.expr, &env, lookup, &self.functions)?;
            env.insert(decl.name.clone(), value.clone());
            ordered.push((decl.name.clone(), value, decl.clone()));
        }
        let return_value = match &fragment.body {
            crate::fragment::FragmentBody::Declaration(decl) => {
                env.get(&decl.name).cloned().expect("just inserted")
            }
            crate::fragment::FragmentBody::Expression(expr) => {
                evaluator::evaluate(expr, &env, lookup, &self.functions)?
            }
        };
        Ok((ordered, return_value))
    }
}

/// `true` iff any diagnostic in the slice reaches [`DiagnosticSeverity::Error`].
pub fn fails(diagnostics: &[FormulaDiagnostic]) -> bool {
    has_error(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    #[test]
    fn validate_never_executes_and_is_pure() {
        let adapter = ExpressionAdapter::default();
        assert!(adapter.validate("2 + 2").is_empty());
        let first = adapter.validate("2 +");
        let second = adapter.validate("2 +");
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn denied_name_rejected_in_composite() {
        let mut denied = HashSet::new();
        denied.insert("System.IO".to_string());
        let adapter = ExpressionAdapter::new(denied);

        let fragment = Fragment::declare(
            "z",
            Declaration::new(
                "z",
                Type::Integer,
                Expression::field(Expression::field(Expression::var("System"), "IO"), "File"),
            ),
        );
        let result = adapter.enforce_denied_names(&fragment);
        assert!(matches!(result, Err(FormulaError::NameAccessDenied { .. })));
    }

    #[test]
    fn compile_flags_formula_reference_missing_from_composite() {
        let adapter = ExpressionAdapter::default();
        let mut known = HashSet::new();
        known.insert("b".to_string());

        let fragment = Fragment::declare("a", Declaration::new("a", Type::Integer, Expression::var("b")));
        let diagnostics = adapter.compile(&fragment, &known);
        assert!(fails(&diagnostics));
    }

    #[test]
    fn compile_accepts_context_member_reference() {
        let adapter = ExpressionAdapter::default();
        let known: HashSet<String> = HashSet::new();
        let fragment = Fragment::declare("y", Declaration::new("y", Type::Integer, Expression::var("X")));
        let diagnostics = adapter.compile(&fragment, &known);
        assert!(!fails(&diagnostics));
    }
}
