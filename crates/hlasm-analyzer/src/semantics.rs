//! Semantic-token collection for editor highlighting.

use hlasm_lang_core::Range;

/// Token kinds the editor colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Label,
    Instruction,
    Operand,
    String,
    MacroParam,
    VarSymbol,
    SeqSymbol,
    Comment,
    Continuation,
}

/// One highlighted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub range: Range,
    pub kind: TokenKind,
}

/// Collects highlighting tokens during analysis. Disabled collectors drop
/// everything, so the pipeline can add tokens unconditionally.
#[derive(Debug, Default)]
pub struct SourceInfoProcessor {
    enabled: bool,
    tokens: Vec<TokenInfo>,
}

impl SourceInfoProcessor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tokens: Vec::new(),
        }
    }

    pub fn add(&mut self, range: Range, kind: TokenKind) {
        if self.enabled && !range.is_empty() {
            self.tokens.push(TokenInfo { range, kind });
        }
    }

    /// Sort by position and hand the tokens over.
    pub fn finish(&mut self) -> Vec<TokenInfo> {
        let mut tokens = std::mem::take(&mut self.tokens);
        tokens.sort_by_key(|t| (t.range.start, t.range.end));
        tokens
    }
}
