//! Built-in function registry for the expression language.
//!
//! Grounded on `bingo-core::calculator::functions`'s plain-fn-pointer
//! registry shape, seeded with the function set the specification names.

use crate::error::FormulaError;
use crate::value::Value;
use rust_decimal::RoundingStrategy;
use std::collections::HashMap;

pub type BuiltinFn = fn(&[Value]) -> Result<Value, FormulaError>;

/// Name of the hidden built-in the engine emits to wrap a rounding-eligible
/// formula's expression (see `engine::FormulaEvaluator::final_expression`).
/// Not part of the user-facing function surface, but reachable from any
/// formula text that happens to spell it, since this language has no
/// separate "internal-only" namespace.
pub const ROUND_DECIMAL_FN: &str = "__round_decimal";

/// Name-to-implementation table of callable built-ins.
pub struct FunctionRegistry {
    functions: HashMap<&'static str, BuiltinFn>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut functions: HashMap<&'static str, BuiltinFn> = HashMap::new();
        functions.insert("min", builtin_min);
        functions.insert("max", builtin_max);
        functions.insert("round", builtin_round);
        functions.insert("abs", builtin_abs);
        functions.insert("len", builtin_len);
        functions.insert("contains", builtin_contains);
        functions.insert("starts_with", builtin_starts_with);
        functions.insert("ends_with", builtin_ends_with);
        functions.insert(ROUND_DECIMAL_FN, builtin_round_decimal);
        Self { functions }
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, FormulaError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| FormulaError::evaluation(format!("unknown function '{name}'")))?;
        f(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn as_f64(value: &Value, context: &str) -> Result<f64, FormulaError> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Decimal(d) => d
            .to_string()
            .parse()
            .map_err(|_| FormulaError::evaluation(format!("{context}: decimal out of f64 range"))),
        other => Err(FormulaError::evaluation(format!(
            "{context}: expected a number, found {}",
            other.value_type()
        ))),
    }
}

fn numeric_args(args: &[Value], fn_name: &str) -> Result<Vec<f64>, FormulaError> {
    if args.is_empty() {
        return Err(FormulaError::evaluation(format!("{fn_name} requires at least one argument")));
    }
    args.iter().map(|v| as_f64(v, fn_name)).collect()
}

fn builtin_min(args: &[Value]) -> Result<Value, FormulaError> {
    let values = numeric_args(args, "min")?;
    let min = values.into_iter().fold(f64::INFINITY, f64::min);
    Ok(Value::Float(min))
}

fn builtin_max(args: &[Value]) -> Result<Value, FormulaError> {
    let values = numeric_args(args, "max")?;
    let max = values.into_iter().fold(f64::NEG_INFINITY, f64::max);
    Ok(Value::Float(max))
}

fn builtin_round(args: &[Value]) -> Result<Value, FormulaError> {
    if args.is_empty() || args.len() > 2 {
        return Err(FormulaError::evaluation("round expects (value) or (value, decimals)"));
    }
    let value = as_f64(&args[0], "round")?;
    let decimals = match args.get(1) {
        Some(v) => match v {
            Value::Integer(i) => *i as i32,
            other => {
                return Err(FormulaError::evaluation(format!(
                    "round: decimals must be an integer, found {}",
                    other.value_type()
                )))
            }
        },
        None => 0,
    };
    let factor = 10f64.powi(decimals);
    Ok(Value::Float((value * factor).round() / factor))
}

fn builtin_abs(args: &[Value]) -> Result<Value, FormulaError> {
    if args.len() != 1 {
        return Err(FormulaError::evaluation("abs expects exactly one argument"));
    }
    match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
        other => Err(FormulaError::evaluation(format!("abs: expected a number, found {}", other.value_type()))),
    }
}

fn builtin_len(args: &[Value]) -> Result<Value, FormulaError> {
    if args.len() != 1 {
        return Err(FormulaError::evaluation("len expects exactly one argument"));
    }
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        other => {
            return Err(FormulaError::evaluation(format!(
                "len: expected a string, array or object, found {}",
                other.value_type()
            )))
        }
    };
    Ok(Value::Integer(len as i64))
}

fn as_str<'a>(value: &'a Value, fn_name: &str) -> Result<&'a str, FormulaError> {
    match value {
        Value::String(s) => Ok(s.as_str()),
        other => Err(FormulaError::evaluation(format!(
            "{fn_name}: expected a string, found {}",
            other.value_type()
        ))),
    }
}

fn builtin_contains(args: &[Value]) -> Result<Value, FormulaError> {
    if args.len() != 2 {
        return Err(FormulaError::evaluation("contains expects exactly two arguments"));
    }
    let haystack = as_str(&args[0], "contains")?;
    let needle = as_str(&args[1], "contains")?;
    Ok(Value::Boolean(haystack.contains(needle)))
}

fn builtin_starts_with(args: &[Value]) -> Result<Value, FormulaError> {
    if args.len() != 2 {
        return Err(FormulaError::evaluation("starts_with expects exactly two arguments"));
    }
    let haystack = as_str(&args[0], "starts_with")?;
    let needle = as_str(&args[1], "starts_with")?;
    Ok(Value::Boolean(haystack.starts_with(needle)))
}

/// `(value, decimals, mode)` → `value` rounded to `decimals` places using
/// the named midpoint strategy (`"to_even"` or `"away_from_zero"`). The
/// engine is the only caller that constructs this call node; `value` is
/// always a `Decimal` by construction of the rounding-applicability check.
fn builtin_round_decimal(args: &[Value]) -> Result<Value, FormulaError> {
    if args.len() != 3 {
        return Err(FormulaError::evaluation("__round_decimal expects (value, decimals, mode)"));
    }
    let decimal = match &args[0] {
        Value::Decimal(d) => *d,
        other => {
            return Err(FormulaError::evaluation(format!(
                "__round_decimal: expected a decimal, found {}",
                other.value_type()
            )))
        }
    };
    let decimals = match &args[1] {
        Value::Integer(i) if *i >= 0 => *i as u32,
        _ => return Err(FormulaError::evaluation("__round_decimal: decimals must be a non-negative integer")),
    };
    let strategy = match &args[2] {
        Value::String(s) if s == "to_even" => RoundingStrategy::MidpointNearestEven,
        Value::String(s) if s == "away_from_zero" => RoundingStrategy::MidpointAwayFromZero,
        _ => return Err(FormulaError::evaluation("__round_decimal: unrecognised midpoint mode")),
    };
    Ok(Value::Decimal(decimal.round_dp_with_strategy(decimals, strategy)))
}

fn builtin_ends_with(args: &[Value]) -> Result<Value, FormulaError> {
    if args.len() != 2 {
        return Err(FormulaError::evaluation("ends_with expects exactly two arguments"));
    }
    let haystack = as_str(&args[0], "ends_with")?;
    let needle = as_str(&args[1], "ends_with")?;
    Ok(Value::Boolean(haystack.ends_with(needle)))
}
