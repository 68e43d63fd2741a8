//! End-to-end scenarios against the public API, one per documented case.

use formulate::{
    DiagnosticSeverity, FormulaDefinition, FormulaError, FormulaEvaluatorFactory, MapContext,
    MidpointRounding, RoundingOptions, Type, Value,
};
use rust_decimal::Decimal;
use std::collections::HashSet;

fn factory() -> FormulaEvaluatorFactory {
    FormulaEvaluatorFactory::new(HashSet::new(), None)
}

#[test]
fn basic_arithmetic_runs_with_no_error_diagnostics() {
    let evaluator = factory().get_evaluator(vec![FormulaDefinition::new("a", Type::Integer, "2 + 3")]);
    let state = evaluator.run(&MapContext::new(), "a").unwrap();
    assert_eq!(state.return_value().unwrap(), &Value::Integer(5));
    assert_eq!(state.variables.len(), 1);
    assert!(state.diagnostics.iter().all(|d| d.severity != DiagnosticSeverity::Error));
}

#[test]
fn dependency_chain_orders_variables_and_reports_identifiers() {
    let definitions = vec![
        FormulaDefinition::new("a", Type::Integer, "2"),
        FormulaDefinition::new("b", Type::Integer, "a * 10"),
        FormulaDefinition::new("c", Type::Integer, "a + b"),
    ];
    let evaluator = factory().get_evaluator(definitions);

    let state = evaluator.run(&MapContext::new(), "c").unwrap();
    assert_eq!(state.return_value().unwrap(), &Value::Integer(22));

    let names: Vec<&str> = state.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    let values: Vec<&Value> = state.variables.iter().map(|v| &v.value).collect();
    assert_eq!(values, vec![&Value::Integer(2), &Value::Integer(20), &Value::Integer(22)]);

    let identifiers = evaluator.contained_identifiers("c").unwrap();
    let names: Vec<&str> = identifiers.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(identifiers.iter().all(|i| i.is_formula()));
}

#[test]
fn context_property_is_readable_through_evaluate() {
    let evaluator = factory().get_evaluator(vec![FormulaDefinition::new("y", Type::Integer, "X * 2")]);
    let context = MapContext::new().with("X", Value::Integer(7));

    let y: i64 = evaluator
        .evaluate(&context, "y", |v| match v {
            Value::Integer(i) => Some(*i),
            _ => None,
        })
        .unwrap();
    assert_eq!(y, 14);
}

#[test]
fn decimal_rounding_flags_the_backing_variable() {
    let opts = RoundingOptions::new(2, MidpointRounding::ToEven);
    let factory = FormulaEvaluatorFactory::new(HashSet::new(), Some(opts));

    // The literals are integers; go through decimal-valued context members
    // so the division actually runs over `Decimal`.
    let definitions = vec![FormulaDefinition::new("p", Type::Decimal, "one / three")];
    let evaluator = factory.get_evaluator(definitions);
    let context = MapContext::new()
        .with("one", Value::Decimal(Decimal::ONE))
        .with("three", Value::Decimal(Decimal::from(3)));

    let state = evaluator.run(&context, "p").unwrap();
    assert_eq!(state.return_value().unwrap(), &Value::Decimal(Decimal::new(33, 2)));
    assert!(state.variables_by_name()["p"].is_rounded);
}

#[test]
fn denied_name_is_rejected_before_execution() {
    let mut denied = HashSet::new();
    denied.insert("System.IO".to_string());
    let factory = FormulaEvaluatorFactory::new(denied, None);

    let evaluator = factory.get_evaluator(vec![FormulaDefinition::new(
        "z",
        Type::Integer,
        "System.IO.File.ReadAllText(\"x\").Length",
    )]);

    let err = evaluator.run(&MapContext::new(), "z").unwrap_err();
    match err {
        FormulaError::NameAccessDenied { name } => assert_eq!(name, "System.IO"),
        other => panic!("expected NameAccessDenied, got {other:?}"),
    }
}

#[test]
fn circular_dependency_surfaces_as_compilation_error() {
    let definitions = vec![
        FormulaDefinition::new("a", Type::Integer, "b + 1"),
        FormulaDefinition::new("b", Type::Integer, "a + 1"),
    ];
    let evaluator = factory().get_evaluator(definitions);

    let err = evaluator.run(&MapContext::new(), "a").unwrap_err();
    assert!(matches!(err, FormulaError::CompilationError { .. }));
}

#[test]
fn return_value_always_matches_the_target_variable() {
    let definitions = vec![
        FormulaDefinition::new("a", Type::Integer, "2"),
        FormulaDefinition::new("b", Type::Integer, "a * 10"),
    ];
    let evaluator = factory().get_evaluator(definitions);
    let state = evaluator.run(&MapContext::new(), "b").unwrap();
    assert_eq!(state.return_value().unwrap(), &state.variables_by_name()["b"].value);
}

#[test]
fn missing_formula_for_target_is_a_typed_error() {
    let evaluator = factory().get_evaluator(vec![FormulaDefinition::new("a", Type::Integer, "1")]);
    let err = evaluator.run(&MapContext::new(), "nonexistent").unwrap_err();
    assert!(matches!(err, FormulaError::NoFormulaForIdentifier { .. }));
}

#[test]
fn empty_target_is_an_argument_missing_error() {
    let evaluator = factory().get_evaluator(vec![FormulaDefinition::new("a", Type::Integer, "1")]);
    let err = evaluator.run(&MapContext::new(), "").unwrap_err();
    assert!(matches!(err, FormulaError::ArgumentMissing { .. }));
}

#[test]
fn diamond_dependency_is_composed_and_evaluated_once() {
    // d depends on both b and c, which both depend on a. a must not be
    // re-declared twice, and every variable still reflects the same value.
    let definitions = vec![
        FormulaDefinition::new("a", Type::Integer, "5"),
        FormulaDefinition::new("b", Type::Integer, "a + 1"),
        FormulaDefinition::new("c", Type::Integer, "a + 2"),
        FormulaDefinition::new("d", Type::Integer, "b + c"),
    ];
    let evaluator = factory().get_evaluator(definitions);
    let state = evaluator.run(&MapContext::new(), "d").unwrap();
    assert_eq!(state.return_value().unwrap(), &Value::Integer(13));

    let names: Vec<&str> = state.variables.iter().map(|v| v.name.as_str()).collect();
    let unique: HashSet<&str> = names.iter().copied().collect();
    assert_eq!(names.len(), unique.len(), "a must not be declared twice");
}

#[test]
fn concurrent_runs_against_the_same_evaluator_are_deterministic() {
    use std::sync::Arc;
    use std::thread;

    let definitions = vec![
        FormulaDefinition::new("a", Type::Integer, "2"),
        FormulaDefinition::new("b", Type::Integer, "a * 10"),
        FormulaDefinition::new("c", Type::Integer, "a + b"),
    ];
    let evaluator = factory().get_evaluator(definitions);
    let evaluator = Arc::new(evaluator);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let evaluator = evaluator.clone();
            thread::spawn(move || evaluator.run(&MapContext::new(), "c").unwrap().return_value().unwrap().clone())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Value::Integer(22));
    }
}
