//! Tree-walking evaluator for the expression language.
//!
//! Grounded on `bingo-core::calculator::evaluator`; extended with a
//! `Decimal` arm throughout and checked integer arithmetic (overflow is a
//! runtime evaluation error, never a silent wrap), per the "no unsafe
//! numeric operations" policy the adapter enforces.

use crate::dsl::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::dsl::functions::FunctionRegistry;
use crate::error::{FormulaError, FormulaResult};
use crate::value::Value;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Evaluate `expr` against a local variable environment (the declarations
/// composed so far) falling back to `lookup` for anything not locally bound.
pub fn evaluate(
    expr: &Expression,
    env: &HashMap<String, Value>,
    lookup: &dyn Fn(&str) -> Option<Value>,
    functions: &FunctionRegistry,
) -> FormulaResult<Value> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::DateLiteral { iso_string } => parse_date(iso_string),
        Expression::Variable(name) => env
            .get(name)
            .cloned()
            .or_else(|| lookup(name))
            .ok_or_else(|| FormulaError::evaluation(format!("unresolved identifier '{name}'"))),
        Expression::BinaryOp { left, operator, right } => {
            let lhs = evaluate(left, env, lookup, functions)?;
            let rhs = evaluate(right, env, lookup, functions)?;
            evaluate_binary(operator, lhs, rhs)
        }
        Expression::UnaryOp { operator, operand } => {
            let value = evaluate(operand, env, lookup, functions)?;
            evaluate_unary(operator, value)
        }
        Expression::FunctionCall { name, args } => {
            let values = args
                .iter()
                .map(|a| evaluate(a, env, lookup, functions))
                .collect::<FormulaResult<Vec<_>>>()?;
            functions.call(name, &values)
        }
        Expression::Conditional { condition, then_expr, else_expr } => {
            if evaluate(condition, env, lookup, functions)?.is_truthy() {
                evaluate(then_expr, env, lookup, functions)
            } else {
                evaluate(else_expr, env, lookup, functions)
            }
        }
        Expression::ConditionalSet { conditions, default_value } => {
            for (condition, value) in conditions {
                if evaluate(condition, env, lookup, functions)?.is_truthy() {
                    return evaluate(value, env, lookup, functions);
                }
            }
            match default_value {
                Some(default) => evaluate(default, env, lookup, functions),
                None => Ok(Value::Null),
            }
        }
        Expression::FieldAccess { object, field } => {
            let value = evaluate(object, env, lookup, functions)?;
            match value {
                Value::Object(fields) => Ok(fields.get(field).cloned().unwrap_or(Value::Null)),
                other => Err(FormulaError::evaluation(format!(
                    "cannot access field '{field}' on a {}",
                    other.value_type()
                ))),
            }
        }
        Expression::ArrayLiteral { elements } => {
            let values = elements
                .iter()
                .map(|e| evaluate(e, env, lookup, functions))
                .collect::<FormulaResult<Vec<_>>>()?;
            Ok(Value::Array(values))
        }
        Expression::ObjectLiteral { fields } => {
            let mut map = HashMap::with_capacity(fields.len());
            for (key, value_expr) in fields {
                map.insert(key.clone(), evaluate(value_expr, env, lookup, functions)?);
            }
            Ok(Value::Object(map))
        }
        Expression::ArrayIndex { array, index } => {
            let array_value = evaluate(array, env, lookup, functions)?;
            let index_value = evaluate(index, env, lookup, functions)?;
            match (array_value, index_value) {
                (Value::Array(items), Value::Integer(i)) => {
                    let idx = usize::try_from(i)
                        .map_err(|_| FormulaError::evaluation(format!("negative array index {i}")))?;
                    items
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| FormulaError::evaluation(format!("array index {idx} out of bounds")))
                }
                (other, _) => {
                    Err(FormulaError::evaluation(format!("cannot index a {}", other.value_type())))
                }
            }
        }
    }
}

fn parse_date(iso_string: &str) -> FormulaResult<Value> {
    DateTime::parse_from_rfc3339(iso_string)
        .map(|dt| Value::Date(dt.with_timezone(&Utc)))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(iso_string, "%Y-%m-%d")
                .map(|d| Value::Date(d.and_hms_opt(0, 0, 0).unwrap().and_utc()))
        })
        .map_err(|_| FormulaError::evaluation(format!("invalid date literal '{iso_string}'")))
}

fn evaluate_unary(operator: &UnaryOperator, value: Value) -> FormulaResult<Value> {
    match (operator, value) {
        (UnaryOperator::Negate, Value::Integer(i)) => {
            i.checked_neg().map(Value::Integer).ok_or_else(|| FormulaError::evaluation("integer overflow in negation"))
        }
        (UnaryOperator::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOperator::Negate, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
        (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOperator::Abs, Value::Integer(i)) => {
            i.checked_abs().map(Value::Integer).ok_or_else(|| FormulaError::evaluation("integer overflow in abs"))
        }
        (UnaryOperator::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
        (UnaryOperator::Abs, Value::Decimal(d)) => Ok(Value::Decimal(d.abs())),
        (op, other) => Err(FormulaError::evaluation(format!(
            "operator {op:?} is not defined for a {}",
            other.value_type()
        ))),
    }
}

fn evaluate_binary(operator: &BinaryOperator, left: Value, right: Value) -> FormulaResult<Value> {
    use BinaryOperator::*;
    match operator {
        Add | Subtract | Multiply | Divide | Modulo | Power => arithmetic(operator, left, right),
        Equal => Ok(Value::Boolean(left == right)),
        NotEqual => Ok(Value::Boolean(left != right)),
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => comparison(operator, left, right),
        And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
        Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
        Concat => concat(left, right),
        Contains | StartsWith | EndsWith => string_predicate(operator, left, right),
        In => membership(left, right),
    }
}

fn arithmetic(operator: &BinaryOperator, left: Value, right: Value) -> FormulaResult<Value> {
    use BinaryOperator::*;
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match operator {
                Add => a.checked_add(b),
                Subtract => a.checked_sub(b),
                Multiply => a.checked_mul(b),
                Divide => {
                    if b == 0 {
                        return Err(FormulaError::evaluation("division by zero"));
                    }
                    a.checked_div(b)
                }
                Modulo => {
                    if b == 0 {
                        return Err(FormulaError::evaluation("modulo by zero"));
                    }
                    a.checked_rem(b)
                }
                Power => {
                    let exp = u32::try_from(b)
                        .map_err(|_| FormulaError::evaluation("negative exponent on integer base"))?;
                    a.checked_pow(exp)
                }
                _ => unreachable!(),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| FormulaError::evaluation("integer overflow in arithmetic"))
        }
        (Value::Decimal(a), Value::Decimal(b)) => decimal_arithmetic(operator, a, b),
        (Value::Decimal(a), Value::Integer(b)) => decimal_arithmetic(operator, a, Decimal::from(b)),
        (Value::Integer(a), Value::Decimal(b)) => decimal_arithmetic(operator, Decimal::from(a), b),
        (a, b) => {
            let (af, bf) = (coerce_f64(&a)?, coerce_f64(&b)?);
            match operator {
                Add => Ok(Value::Float(af + bf)),
                Subtract => Ok(Value::Float(af - bf)),
                Multiply => Ok(Value::Float(af * bf)),
                Divide => {
                    if bf == 0.0 {
                        return Err(FormulaError::evaluation("division by zero"));
                    }
                    Ok(Value::Float(af / bf))
                }
                Modulo => {
                    if bf == 0.0 {
                        return Err(FormulaError::evaluation("modulo by zero"));
                    }
                    Ok(Value::Float(af % bf))
                }
                Power => Ok(Value::Float(af.powf(bf))),
                _ => unreachable!(),
            }
        }
    }
}

fn decimal_arithmetic(operator: &BinaryOperator, a: Decimal, b: Decimal) -> FormulaResult<Value> {
    use BinaryOperator::*;
    match operator {
        Add => a.checked_add(b).map(Value::Decimal).ok_or_else(overflow),
        Subtract => a.checked_sub(b).map(Value::Decimal).ok_or_else(overflow),
        Multiply => a.checked_mul(b).map(Value::Decimal).ok_or_else(overflow),
        Divide => {
            if b.is_zero() {
                return Err(FormulaError::evaluation("division by zero"));
            }
            a.checked_div(b).map(Value::Decimal).ok_or_else(overflow)
        }
        Modulo => {
            if b.is_zero() {
                return Err(FormulaError::evaluation("modulo by zero"));
            }
            a.checked_rem(b).map(Value::Decimal).ok_or_else(overflow)
        }
        Power => Err(FormulaError::evaluation("exponentiation is not defined for decimal operands")),
        _ => unreachable!(),
    }
}

fn overflow() -> FormulaError {
    FormulaError::evaluation("decimal overflow in arithmetic")
}

fn coerce_f64(value: &Value) -> FormulaResult<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Decimal(d) => d
            .to_string()
            .parse()
            .map_err(|_| FormulaError::evaluation("decimal out of f64 range")),
        other => Err(FormulaError::evaluation(format!(
            "arithmetic is not defined for a {}",
            other.value_type()
        ))),
    }
}

fn comparison(operator: &BinaryOperator, left: Value, right: Value) -> FormulaResult<Value> {
    use BinaryOperator::*;
    let ordering = match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            let (a, b) = (coerce_f64(&left)?, coerce_f64(&right)?);
            a.partial_cmp(&b)
                .ok_or_else(|| FormulaError::evaluation("cannot compare NaN"))?
        }
    };
    let result = match operator {
        LessThan => ordering.is_lt(),
        LessThanOrEqual => ordering.is_le(),
        GreaterThan => ordering.is_gt(),
        GreaterThanOrEqual => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

fn concat(left: Value, right: Value) -> FormulaResult<Value> {
    Ok(Value::String(format!("{left}{right}")))
}

fn string_predicate(operator: &BinaryOperator, left: Value, right: Value) -> FormulaResult<Value> {
    use BinaryOperator::*;
    let (haystack, needle) = match (&left, &right) {
        (Value::String(h), Value::String(n)) => (h, n),
        _ => {
            return Err(FormulaError::evaluation(format!(
                "{operator:?} expects two strings, found {} and {}",
                left.value_type(),
                right.value_type()
            )))
        }
    };
    let result = match operator {
        Contains => haystack.contains(needle.as_str()),
        StartsWith => haystack.starts_with(needle.as_str()),
        EndsWith => haystack.ends_with(needle.as_str()),
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

fn membership(left: Value, right: Value) -> FormulaResult<Value> {
    match right {
        Value::Array(items) => Ok(Value::Boolean(items.contains(&left))),
        other => Err(FormulaError::evaluation(format!(
            "'in' expects an array on the right, found {}",
            other.value_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::parse_expression;

    fn eval_str(src: &str, env: &HashMap<String, Value>) -> FormulaResult<Value> {
        let expr = parse_expression(src).unwrap();
        let functions = FunctionRegistry::new();
        evaluate(&expr, env, &|_| None, &functions)
    }

    #[test]
    fn integer_overflow_is_an_error_not_a_wrap() {
        let env = HashMap::new();
        let result = eval_str(&format!("{} + 1", i64::MAX), &env);
        assert!(result.is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let env = HashMap::new();
        assert!(eval_str("1 / 0", &env).is_err());
    }

    #[test]
    fn variable_resolves_from_env_then_context() {
        let mut env = HashMap::new();
        env.insert("a".to_string(), Value::Integer(10));
        assert_eq!(eval_str("a + 1", &env).unwrap(), Value::Integer(11));

        let functions = FunctionRegistry::new();
        let expr = parse_expression("b").unwrap();
        let result = evaluate(&expr, &env, &|name| (name == "b").then_some(Value::Integer(99)), &functions);
        assert_eq!(result.unwrap(), Value::Integer(99));
    }

    #[test]
    fn conditional_set_falls_through_to_default() {
        let env = HashMap::new();
        assert_eq!(
            eval_str("cond when false then 1 default 2", &env).unwrap(),
            Value::Integer(2)
        );
    }

    #[test]
    fn decimal_arithmetic_is_exact() {
        let mut env = HashMap::new();
        env.insert("price".to_string(), Value::Decimal(Decimal::new(1999, 2)));
        assert_eq!(
            eval_str("price * 3", &env).unwrap(),
            Value::Decimal(Decimal::new(5997, 2))
        );
    }
}
