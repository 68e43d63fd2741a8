//! Read-only description of a single named formula, and the rounding policy
//! applied across a definition set.

use crate::value::Type;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A named, typed expression that may reference other formulae by name and
/// read (never write) the host context.
///
/// Identifiers must be unique within a [`crate::factory::FormulaEvaluatorFactory`]'s
/// definition set; `expression` is a single expression, never a statement list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormulaDefinition {
    pub identifier: String,
    pub data_type: Type,
    pub expression: String,
    /// When true, this formula's result is never rewritten by rounding,
    /// even when the evaluator carries `RoundingOptions` and `data_type`
    /// would otherwise qualify.
    pub ignore_rounding_options: bool,
    /// Stable key used to fingerprint a definition set for the evaluator
    /// factory's cache (see [`crate::factory::FormulaDefinitionsKey`]).
    /// The contract is that this reflects everything that should
    /// invalidate a cached evaluator — including `expression` itself.
    pub formula_id: String,
}

impl FormulaDefinition {
    pub fn new(
        identifier: impl Into<String>,
        data_type: Type,
        expression: impl Into<String>,
    ) -> Self {
        let identifier = identifier.into();
        let expression = expression.into();
        let formula_id = format!("{identifier}:{expression}");
        Self { identifier, data_type, expression, ignore_rounding_options: false, formula_id }
    }

    pub fn with_ignore_rounding(mut self, ignore: bool) -> Self {
        self.ignore_rounding_options = ignore;
        self
    }

    pub fn with_formula_id(mut self, formula_id: impl Into<String>) -> Self {
        self.formula_id = formula_id.into();
        self
    }
}

/// Midpoint rounding strategy for [`RoundingOptions`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MidpointRounding {
    ToEven,
    AwayFromZero,
}

impl From<MidpointRounding> for RoundingStrategy {
    fn from(value: MidpointRounding) -> Self {
        match value {
            MidpointRounding::ToEven => RoundingStrategy::MidpointNearestEven,
            MidpointRounding::AwayFromZero => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

/// Optional decimal-rounding policy applied to qualifying formulae during
/// composition (see §4.E.1 step 6 of the specification this crate
/// implements).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundingOptions {
    pub rounded_decimals_count: u32,
    pub midpoint_rounding: MidpointRounding,
}

impl RoundingOptions {
    pub fn new(rounded_decimals_count: u32, midpoint_rounding: MidpointRounding) -> Self {
        Self { rounded_decimals_count, midpoint_rounding }
    }

    /// Round a decimal value per this policy.
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.rounded_decimals_count, self.midpoint_rounding.into())
    }

    /// Whether `def` qualifies for rounding under this policy: its
    /// declared type must be assignable from `decimal` and it must not
    /// have opted out via `ignore_rounding_options`.
    pub fn applies_to(&self, def: &FormulaDefinition) -> bool {
        !def.ignore_rounding_options && def.data_type.decimal_is_assignable_to()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_id_defaults_to_identifier_and_expression() {
        let def = FormulaDefinition::new("a", Type::Integer, "2 + 3");
        assert_eq!(def.formula_id, "a:2 + 3");
    }

    #[test]
    fn rounding_applies_to_decimal_unless_opted_out() {
        let opts = RoundingOptions::new(2, MidpointRounding::ToEven);
        let def = FormulaDefinition::new("p", Type::Decimal, "1 / 3");
        assert!(opts.applies_to(&def));

        let opted_out = def.clone().with_ignore_rounding(true);
        assert!(!opts.applies_to(&opted_out));

        let not_decimal = FormulaDefinition::new("q", Type::Integer, "1 + 2");
        assert!(!opts.applies_to(&not_decimal));
    }

    #[test]
    fn rounding_to_even_matches_midpoint_rule() {
        let opts = RoundingOptions::new(2, MidpointRounding::ToEven);
        // 0.125 at the 2-decimal midpoint rounds to the even neighbor, 0.12.
        let rounded = opts.round(Decimal::new(125, 3));
        assert_eq!(rounded, Decimal::new(12, 2));
    }

    #[test]
    fn rounding_away_from_zero_matches_midpoint_rule() {
        let opts = RoundingOptions::new(2, MidpointRounding::AwayFromZero);
        let rounded = opts.round(Decimal::new(125, 3));
        assert_eq!(rounded, Decimal::new(13, 2));
    }
}
