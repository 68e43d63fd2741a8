//! Uniform severity-tagged diagnostics produced at any pipeline stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered diagnostic severity. Ordering matters: `CompilationError` is
/// raised iff any diagnostic reaches [`DiagnosticSeverity::Error`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DiagnosticSeverity {
    Hidden = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hidden => "hidden",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic message produced by the expression adapter or the
/// evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormulaDiagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
}

impl FormulaDiagnostic {
    pub fn new(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Info, message)
    }
}

impl fmt::Display for FormulaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// True iff any diagnostic in the slice has [`DiagnosticSeverity::Error`].
pub fn has_error(diagnostics: &[FormulaDiagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == DiagnosticSeverity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(DiagnosticSeverity::Error > DiagnosticSeverity::Warning);
        assert!(DiagnosticSeverity::Warning > DiagnosticSeverity::Info);
        assert!(DiagnosticSeverity::Info > DiagnosticSeverity::Hidden);
    }

    #[test]
    fn has_error_detects_only_error_severity() {
        let diags = vec![FormulaDiagnostic::warning("careful"), FormulaDiagnostic::info("fyi")];
        assert!(!has_error(&diags));
        let diags = vec![FormulaDiagnostic::error("boom")];
        assert!(has_error(&diags));
    }
}
