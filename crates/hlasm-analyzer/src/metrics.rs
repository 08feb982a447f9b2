//! Analysis metrics.

use serde::{Deserialize, Serialize};

/// Counters accumulated during one analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Physical source lines fed to the parser.
    pub lines: u64,
    /// Statements processed.
    pub statements: u64,
    /// Deferred statements reparsed under a concrete status.
    pub reparsed_statements: u64,
    /// Ordinary symbols defined.
    pub defined_symbols: u64,
    /// Macro definitions stored.
    pub macro_definitions: u64,
    /// Copy-member expansions entered.
    pub copy_expansions: u64,
    /// Attribute-lookahead excursions taken.
    pub lookahead_excursions: u64,
    /// Deepest macro/copy nesting observed.
    pub max_nesting: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        let m = Metrics::default();
        assert_eq!(m.lines, 0);
        assert_eq!(m.max_nesting, 0);
    }

    #[test]
    fn test_serializes() {
        let m = Metrics {
            lines: 3,
            statements: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"lines\":3"));
    }
}
