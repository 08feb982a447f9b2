//! Diagnostic types for analyzer error/warning reporting.
//!
//! Every anomaly found during analysis becomes a [`Diagnostic`] — the
//! analyzer never aborts on bad input. Each diagnostic carries a
//! four-character code, a severity, the range it refers to and the resource
//! it was found in.

use std::fmt;

use crate::{Range, ResourceLocation};

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Barely worth mentioning (MNOTE levels 0-1).
    Hint,
    /// Informational — not a problem, but worth noting.
    Info,
    /// Warning — analysis continues but something looks suspicious.
    Warning,
    /// Error — the program is not valid HLASM.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hint => write!(f, "hint"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message produced during analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Code tag (e.g., "E031", "A115", "MNOTE").
    pub code: String,
    /// Human-readable message describing the issue.
    pub message: String,
    /// Range the diagnostic refers to.
    pub range: Range,
    /// Resource the range lives in.
    pub resource: ResourceLocation,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(code: impl Into<String>, message: impl Into<String>, range: Range) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            range,
            resource: ResourceLocation::default(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(code: impl Into<String>, message: impl Into<String>, range: Range) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message, range)
        }
    }

    /// Create a new info diagnostic.
    pub fn info(code: impl Into<String>, message: impl Into<String>, range: Range) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::error(code, message, range)
        }
    }

    /// Create a new hint diagnostic.
    pub fn hint(code: impl Into<String>, message: impl Into<String>, range: Range) -> Self {
        Self {
            severity: Severity::Hint,
            ..Self::error(code, message, range)
        }
    }

    /// Attach the resource the diagnostic was found in.
    pub fn with_resource(mut self, resource: ResourceLocation) -> Self {
        self.resource = resource;
        self
    }

    /// Returns `true` if this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Hint < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_diagnostic_error() {
        let d = Diagnostic::error("E031", "symbol already defined", Range::in_line(0, 0, 5));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code, "E031");
        assert!(d.is_error());
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::warning("W016", "multiple TITLE names", Range::default());
        assert_eq!(format!("{d}"), "warning[W016]: multiple TITLE names");
    }

    #[test]
    fn test_diagnostic_with_resource() {
        let d = Diagnostic::hint("MNOTE", "note", Range::default())
            .with_resource(ResourceLocation::new("file:///a.hlasm"));
        assert_eq!(d.resource.as_str(), "file:///a.hlasm");
    }
}
