//! Abstract syntax tree for the embedded formula expression language.
//!
//! Grounded on `bingo-core::calculator::ast`, trimmed to the operator set a
//! formula language needs (array mutation operators like push/filter/map
//! have no place in a read-only expression over a context) and extended
//! with the identifier-reference walk the composer needs (see
//! [`identifier_references`]).

use crate::value::Value;
use std::collections::HashSet;

/// A parsed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// A bare name: either a context member or a sibling formula.
    Variable(String),
    BinaryOp { left: Box<Expression>, operator: BinaryOperator, right: Box<Expression> },
    UnaryOp { operator: UnaryOperator, operand: Box<Expression> },
    FunctionCall { name: String, args: Vec<Expression> },
    Conditional { condition: Box<Expression>, then_expr: Box<Expression>, else_expr: Box<Expression> },
    /// `object.field` — `field` is never treated as an identifier reference.
    FieldAccess { object: Box<Expression>, field: String },
    /// `cond when c1 then v1 when c2 then v2 default vd`.
    ConditionalSet { conditions: Vec<(Expression, Expression)>, default_value: Option<Box<Expression>> },
    ArrayLiteral { elements: Vec<Expression> },
    ObjectLiteral { fields: Vec<(String, Expression)> },
    ArrayIndex { array: Box<Expression>, index: Box<Expression> },
    DateLiteral { iso_string: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Concat,
    Contains,
    StartsWith,
    EndsWith,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOperator {
    Negate,
    Not,
    Abs,
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Self::Literal(Value::Integer(value))
    }
    pub fn float(value: f64) -> Self {
        Self::Literal(Value::Float(value))
    }
    pub fn string(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
    pub fn bool(value: bool) -> Self {
        Self::Literal(Value::Boolean(value))
    }
    pub fn null() -> Self {
        Self::Literal(Value::Null)
    }
    pub fn array(elements: Vec<Expression>) -> Self {
        Self::ArrayLiteral { elements }
    }
    pub fn object(fields: Vec<(String, Expression)>) -> Self {
        Self::ObjectLiteral { fields }
    }
    pub fn date(iso_string: String) -> Self {
        Self::DateLiteral { iso_string }
    }
    pub fn index(array: Expression, index: Expression) -> Self {
        Self::ArrayIndex { array: Box::new(array), index: Box::new(index) }
    }
    pub fn var(name: &str) -> Self {
        Self::Variable(name.to_string())
    }
    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Self::BinaryOp { left: Box::new(left), operator: op, right: Box::new(right) }
    }
    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Self::UnaryOp { operator: op, operand: Box::new(operand) }
    }
    pub fn call(name: &str, args: Vec<Expression>) -> Self {
        Self::FunctionCall { name: name.to_string(), args }
    }
    pub fn conditional(condition: Expression, then_expr: Expression, else_expr: Expression) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }
    pub fn field(object: Expression, field: &str) -> Self {
        Self::FieldAccess { object: Box::new(object), field: field.to_string() }
    }
    pub fn conditional_set(
        conditions: Vec<(Expression, Expression)>,
        default_value: Option<Expression>,
    ) -> Self {
        Self::ConditionalSet { conditions, default_value: default_value.map(Box::new) }
    }
}

impl BinaryOperator {
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => 3,
            BinaryOperator::Contains
            | BinaryOperator::StartsWith
            | BinaryOperator::EndsWith
            | BinaryOperator::In => 4,
            BinaryOperator::Concat => 5,
            BinaryOperator::Add | BinaryOperator::Subtract => 6,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 7,
            BinaryOperator::Power => 8,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, BinaryOperator::Power)
    }
}

/// The distinct names referenced at "simple reference" position: every
/// [`Expression::Variable`] node *except* one that is immediately the
/// `field` of a [`Expression::FieldAccess`] — because that position names a
/// member of whatever `object` evaluates to, not a sibling formula.
///
/// This is the asymmetry the composer relies on: a variable used as
/// `a.b`'s `a` may be a formula dependency; the `b` never is.
pub fn identifier_references(expr: &Expression) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    walk_references(expr, &mut seen, &mut ordered);
    ordered
}

fn walk_references(expr: &Expression, seen: &mut HashSet<String>, ordered: &mut Vec<String>) {
    match expr {
        Expression::Variable(name) => {
            if seen.insert(name.clone()) {
                ordered.push(name.clone());
            }
        }
        Expression::BinaryOp { left, right, .. } => {
            walk_references(left, seen, ordered);
            walk_references(right, seen, ordered);
        }
        Expression::UnaryOp { operand, .. } => walk_references(operand, seen, ordered),
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                walk_references(arg, seen, ordered);
            }
        }
        Expression::Conditional { condition, then_expr, else_expr } => {
            walk_references(condition, seen, ordered);
            walk_references(then_expr, seen, ordered);
            walk_references(else_expr, seen, ordered);
        }
        Expression::FieldAccess { object, .. } => {
            // `field` is deliberately not visited: it names a member, not a sibling.
            walk_references(object, seen, ordered);
        }
        Expression::ConditionalSet { conditions, default_value } => {
            for (condition, value) in conditions {
                walk_references(condition, seen, ordered);
                walk_references(value, seen, ordered);
            }
            if let Some(default) = default_value {
                walk_references(default, seen, ordered);
            }
        }
        Expression::ArrayLiteral { elements } => {
            for element in elements {
                walk_references(element, seen, ordered);
            }
        }
        Expression::ObjectLiteral { fields } => {
            for (_, value) in fields {
                walk_references(value, seen, ordered);
            }
        }
        Expression::ArrayIndex { array, index } => {
            walk_references(array, seen, ordered);
            walk_references(index, seen, ordered);
        }
        Expression::DateLiteral { .. } | Expression::Literal(_) => {}
    }
}

/// The exact textual spelling of the first identifier-name or
/// simple-member-access node whose spelling is contained in `denied`, found
/// via a pre-order walk of `expr` — or `None` if nothing matches.
///
/// A "simple member access" spelling is only formed when the access chain
/// bottoms out at a bare [`Expression::Variable`] (e.g. `a.b.c`); a field
/// access off an arbitrary expression (`f().c`) contributes no member-access
/// spelling, though its subexpressions are still walked.
pub fn find_denied_name(expr: &Expression, denied: &HashSet<String>) -> Option<String> {
    if let Some(spelling) = simple_spelling(expr) {
        if denied.contains(&spelling) {
            return Some(spelling);
        }
    }
    match expr {
        Expression::Variable(_) | Expression::Literal(_) | Expression::DateLiteral { .. } => None,
        Expression::FieldAccess { object, field } => {
            if denied.contains(field) {
                return Some(field.clone());
            }
            find_denied_name(object, denied)
        }
        Expression::BinaryOp { left, right, .. } => {
            find_denied_name(left, denied).or_else(|| find_denied_name(right, denied))
        }
        Expression::UnaryOp { operand, .. } => find_denied_name(operand, denied),
        Expression::FunctionCall { args, .. } => {
            args.iter().find_map(|a| find_denied_name(a, denied))
        }
        Expression::Conditional { condition, then_expr, else_expr } => find_denied_name(condition, denied)
            .or_else(|| find_denied_name(then_expr, denied))
            .or_else(|| find_denied_name(else_expr, denied)),
        Expression::ConditionalSet { conditions, default_value } => conditions
            .iter()
            .find_map(|(c, v)| find_denied_name(c, denied).or_else(|| find_denied_name(v, denied)))
            .or_else(|| default_value.as_ref().and_then(|d| find_denied_name(d, denied))),
        Expression::ArrayLiteral { elements } => elements.iter().find_map(|e| find_denied_name(e, denied)),
        Expression::ObjectLiteral { fields } => {
            fields.iter().find_map(|(_, v)| find_denied_name(v, denied))
        }
        Expression::ArrayIndex { array, index } => {
            find_denied_name(array, denied).or_else(|| find_denied_name(index, denied))
        }
    }
}

/// The dotted spelling of `expr` if it is a bare variable or a chain of
/// field accesses rooted at one (`a`, `a.b`, `a.b.c`, ...); `None` otherwise.
fn simple_spelling(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Variable(name) => Some(name.clone()),
        Expression::FieldAccess { object, field } => {
            simple_spelling(object).map(|base| format!("{base}.{field}"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_access_member_name_is_not_a_reference() {
        let expr = Expression::field(Expression::var("customer"), "age");
        assert_eq!(identifier_references(&expr), vec!["customer".to_string()]);
    }

    #[test]
    fn references_are_deduped_in_first_seen_order() {
        let expr = Expression::binary(
            Expression::var("b"),
            BinaryOperator::Add,
            Expression::binary(Expression::var("a"), BinaryOperator::Add, Expression::var("b")),
        );
        assert_eq!(identifier_references(&expr), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn operator_precedence_orders_power_above_multiply_above_add() {
        assert!(BinaryOperator::Power.precedence() > BinaryOperator::Multiply.precedence());
        assert!(BinaryOperator::Multiply.precedence() > BinaryOperator::Add.precedence());
    }

    #[test]
    fn denied_name_matches_exact_dotted_prefix_only() {
        let mut denied = HashSet::new();
        denied.insert("System.IO".to_string());

        let call = Expression::call(
            "ReadAllText",
            vec![Expression::field(
                Expression::field(Expression::var("System"), "IO"),
                "File",
            )],
        );
        assert_eq!(find_denied_name(&call, &denied).as_deref(), Some("System.IO"));
    }

    #[test]
    fn denied_name_prefix_alone_does_not_deny_longer_sibling_path() {
        let mut denied = HashSet::new();
        denied.insert("System".to_string());

        // "System.Math" is not denied by a rule on "System" alone, but the
        // bare identifier "System" inside it still is.
        let expr = Expression::field(Expression::var("System"), "Math");
        assert_eq!(find_denied_name(&expr, &denied).as_deref(), Some("System"));

        denied.clear();
        assert_eq!(find_denied_name(&expr, &denied), None);
    }
}
