//! Error taxonomy signalled by the core engine.
//!
//! Structured the way `bingo-core::error::BingoError` structures its
//! variants — one variant per failure kind, with the data a caller needs to
//! act on it, plus a `category()` accessor for logging/metrics. Unlike
//! `BingoError` there is no blanket `From<anyhow::Error>`: every failure
//! site in this crate produces a typed variant directly.

use crate::diagnostics::FormulaDiagnostic;
use thiserror::Error;

/// All ways a `Run`/`Evaluate`/`GetContainedIdentifiers`/`Validate` call can
/// fail.
#[derive(Error, Debug, Clone)]
pub enum FormulaError {
    /// A required argument (context or target) was missing.
    #[error("argument '{param}' is required")]
    ArgumentMissing { param: String },

    /// A referenced or requested name has no formula and is not resolvable
    /// as a context member.
    #[error("no formula for identifier '{name}'")]
    NoFormulaForIdentifier { name: String },

    /// The composite fragment produced at least one `Error`-severity
    /// diagnostic. All diagnostics, including warnings and info, are kept.
    #[error("compilation failed with {} diagnostic(s)", diagnostics.len())]
    CompilationError { diagnostics: Vec<FormulaDiagnostic>, code: Option<String> },

    /// The composite fragment references a denied name.
    #[error("access to '{name}' is denied")]
    NameAccessDenied { name: String },

    /// A wrapped unexpected failure: unknown diagnostic severity, a runtime
    /// failure inside an expression, or a cast failure in `Evaluate<T>`.
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },
}

impl FormulaError {
    /// Stable category tag for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ArgumentMissing { .. } => "argument_missing",
            Self::NoFormulaForIdentifier { .. } => "no_formula_for_identifier",
            Self::CompilationError { .. } => "compilation_error",
            Self::NameAccessDenied { .. } => "name_access_denied",
            Self::Evaluation { .. } => "evaluation",
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation { message: message.into() }
    }

    pub fn compilation(diagnostics: Vec<FormulaDiagnostic>) -> Self {
        Self::CompilationError { diagnostics, code: None }
    }
}

/// Result alias for this crate's fallible operations.
pub type FormulaResult<T> = Result<T, FormulaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSeverity;

    #[test]
    fn category_is_stable_per_variant() {
        let err = FormulaError::NameAccessDenied { name: "System.IO".into() };
        assert_eq!(err.category(), "name_access_denied");
    }

    #[test]
    fn compilation_error_retains_all_diagnostics() {
        let diags = vec![
            FormulaDiagnostic::new(DiagnosticSeverity::Warning, "heads up"),
            FormulaDiagnostic::new(DiagnosticSeverity::Error, "nope"),
        ];
        let err = FormulaError::compilation(diags.clone());
        match err {
            FormulaError::CompilationError { diagnostics, .. } => {
                assert_eq!(diagnostics, diags);
            }
            _ => panic!("expected CompilationError"),
        }
    }
}
