//! Machine expressions.
//!
//! Expressions in assembler operands: absolute and relocatable arithmetic
//! over symbols, self-defining terms, the location counter and attribute
//! references. The AST is a closed sum; traversal goes through
//! [`MachExprVisitor`]. Evaluation lives in the analyzer, which knows the
//! symbol table.

use hlasm_lang_core::{Id, IdPool, Range};

use crate::lexer::{AttrKind, Lexeme, Token};

/// Binary operators, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A machine expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachExpr {
    /// A numeric constant (decimal numbers and self-defining terms).
    Constant { value: i32, range: Range },
    /// An ordinary symbol reference.
    Symbol { name: Id, range: Range },
    /// The location counter `*`.
    LocCtr { range: Range },
    /// An attribute reference on an ordinary symbol: `L'SYM`.
    DataAttr {
        attr: AttrKind,
        name: Id,
        range: Range,
    },
    /// A literal reference: `=F'1'`.
    Literal { text: String, range: Range },
    /// Unary minus (unary plus folds away at parse time).
    Neg { expr: Box<MachExpr>, range: Range },
    /// A binary operation.
    Binary {
        op: BinaryOp,
        lhs: Box<MachExpr>,
        rhs: Box<MachExpr>,
        range: Range,
    },
}

impl MachExpr {
    pub fn range(&self) -> Range {
        match self {
            MachExpr::Constant { range, .. }
            | MachExpr::Symbol { range, .. }
            | MachExpr::LocCtr { range }
            | MachExpr::DataAttr { range, .. }
            | MachExpr::Literal { range, .. }
            | MachExpr::Neg { range, .. }
            | MachExpr::Binary { range, .. } => *range,
        }
    }

    /// The leftmost term of the expression — EQU inherits its length
    /// attribute from here.
    pub fn leftmost_term(&self) -> &MachExpr {
        match self {
            MachExpr::Binary { lhs, .. } => lhs.leftmost_term(),
            MachExpr::Neg { expr, .. } => expr.leftmost_term(),
            other => other,
        }
    }

    /// If the whole expression is a single symbol, its id.
    pub fn as_symbol(&self) -> Option<Id> {
        match self {
            MachExpr::Symbol { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Walk the tree depth-first.
    pub fn apply(&self, v: &mut dyn MachExprVisitor) {
        match self {
            MachExpr::Constant { value, range } => v.visit_constant(*value, *range),
            MachExpr::Symbol { name, range } => v.visit_symbol(*name, *range),
            MachExpr::LocCtr { range } => v.visit_loc_ctr(*range),
            MachExpr::DataAttr { attr, name, range } => v.visit_data_attr(*attr, *name, *range),
            MachExpr::Literal { text, range } => v.visit_literal(text, *range),
            MachExpr::Neg { expr, .. } => expr.apply(v),
            MachExpr::Binary { lhs, rhs, .. } => {
                lhs.apply(v);
                rhs.apply(v);
            }
        }
    }
}

/// Visitor over machine-expression leaves.
pub trait MachExprVisitor {
    fn visit_constant(&mut self, _value: i32, _range: Range) {}
    fn visit_symbol(&mut self, _name: Id, _range: Range) {}
    fn visit_loc_ctr(&mut self, _range: Range) {}
    fn visit_data_attr(&mut self, _attr: AttrKind, _name: Id, _range: Range) {}
    fn visit_literal(&mut self, _text: &str, _range: Range) {}
}

/// Decode a self-defining term to its numeric value.
pub fn self_def_value(kind: char, value: &str) -> Option<i32> {
    match kind {
        'X' => u32::from_str_radix(value, 16).ok().map(|v| v as i32),
        'B' => u32::from_str_radix(value, 2).ok().map(|v| v as i32),
        'C' => {
            // EBCDIC-style character value; bytes fold left to right.
            let mut acc: u32 = 0;
            for b in value.bytes().take(4) {
                acc = (acc << 8) | crate::data_def::ascii_to_ebcdic(b) as u32;
            }
            Some(acc as i32)
        }
        _ => None,
    }
}

/// Parse an expression from a lexeme stream, advancing `pos`.
///
/// Returns `None` when no expression starts at `pos`; the caller decides
/// whether that is an error.
pub fn parse_mach_expr(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<MachExpr> {
    parse_additive(lexemes, pos, ids)
}

fn parse_additive(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<MachExpr> {
    let mut left = parse_multiplicative(lexemes, pos, ids)?;

    while let Some(lx) = lexemes.get(*pos) {
        let op = match lx.token {
            Token::Op('+') => BinaryOp::Add,
            Token::Op('-') => BinaryOp::Sub,
            _ => break,
        };
        *pos += 1;
        let right = parse_multiplicative(lexemes, pos, ids)?;
        let range = left.range().union(right.range());
        left = MachExpr::Binary {
            op,
            lhs: Box::new(left),
            rhs: Box::new(right),
            range,
        };
    }

    Some(left)
}

fn parse_multiplicative(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<MachExpr> {
    let mut left = parse_unary(lexemes, pos, ids)?;

    while let Some(lx) = lexemes.get(*pos) {
        let op = match lx.token {
            Token::Op('*') => BinaryOp::Mul,
            Token::Op('/') => BinaryOp::Div,
            _ => break,
        };
        *pos += 1;
        let right = parse_unary(lexemes, pos, ids)?;
        let range = left.range().union(right.range());
        left = MachExpr::Binary {
            op,
            lhs: Box::new(left),
            rhs: Box::new(right),
            range,
        };
    }

    Some(left)
}

fn parse_unary(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<MachExpr> {
    match lexemes.get(*pos).map(|l| &l.token) {
        Some(Token::Op('-')) => {
            let start = lexemes[*pos].range;
            *pos += 1;
            let expr = parse_primary(lexemes, pos, ids)?;
            let range = start.union(expr.range());
            Some(MachExpr::Neg {
                expr: Box::new(expr),
                range,
            })
        }
        Some(Token::Op('+')) => {
            *pos += 1;
            parse_primary(lexemes, pos, ids)
        }
        _ => parse_primary(lexemes, pos, ids),
    }
}

fn parse_primary(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<MachExpr> {
    let lx = lexemes.get(*pos)?;
    let range = lx.range;
    match &lx.token {
        Token::Number(n) => {
            *pos += 1;
            Some(MachExpr::Constant {
                value: *n as i32,
                range,
            })
        }
        Token::SelfDef(kind, value) => {
            *pos += 1;
            Some(MachExpr::Constant {
                value: self_def_value(*kind, value)?,
                range,
            })
        }
        Token::Symbol(name) => {
            *pos += 1;
            Some(MachExpr::Symbol {
                name: ids.intern(name),
                range,
            })
        }
        Token::LocCtr => {
            *pos += 1;
            Some(MachExpr::LocCtr { range })
        }
        Token::Literal(text) => {
            *pos += 1;
            Some(MachExpr::Literal {
                text: text.clone(),
                range,
            })
        }
        Token::Attr(attr) => {
            let attr = *attr;
            *pos += 1;
            match lexemes.get(*pos).map(|l| &l.token) {
                Some(Token::Symbol(name)) => {
                    let end = lexemes[*pos].range;
                    let name = ids.intern(name);
                    *pos += 1;
                    Some(MachExpr::DataAttr {
                        attr,
                        name,
                        range: range.union(end),
                    })
                }
                _ => None,
            }
        }
        Token::LParen => {
            *pos += 1;
            let inner = parse_additive(lexemes, pos, ids)?;
            if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                *pos += 1;
            }
            Some(inner)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(text: &str) -> Option<MachExpr> {
        let lexemes = tokenize(text, 0, 0);
        let mut pos = 0;
        let mut ids = IdPool::new();
        let e = parse_mach_expr(&lexemes, &mut pos, &mut ids)?;
        assert_eq!(pos, lexemes.len(), "trailing tokens in {text}");
        Some(e)
    }

    fn const_fold(e: &MachExpr) -> Option<i32> {
        match e {
            MachExpr::Constant { value, .. } => Some(*value),
            MachExpr::Neg { expr, .. } => Some(-const_fold(expr)?),
            MachExpr::Binary { op, lhs, rhs, .. } => {
                let (l, r) = (const_fold(lhs)?, const_fold(rhs)?);
                Some(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0 {
                            return None;
                        }
                        l / r
                    }
                })
            }
            _ => None,
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(const_fold(&parse("2+3*4").unwrap()), Some(14));
        assert_eq!(const_fold(&parse("(2+3)*4").unwrap()), Some(20));
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(const_fold(&parse("-5+10").unwrap()), Some(5));
    }

    #[test]
    fn test_self_def_terms() {
        assert_eq!(const_fold(&parse("X'FF'").unwrap()), Some(255));
        assert_eq!(const_fold(&parse("B'1010'").unwrap()), Some(10));
    }

    #[test]
    fn test_char_self_def_is_ebcdic() {
        // C'A' is 0xC1 in EBCDIC.
        assert_eq!(const_fold(&parse("C'A'").unwrap()), Some(0xC1));
    }

    #[test]
    fn test_leftmost_term() {
        let e = parse("SYM+2*3").unwrap();
        let mut ids = IdPool::new();
        let sym = ids.intern("SYM");
        assert_eq!(e.leftmost_term().as_symbol(), Some(sym));
    }

    #[test]
    fn test_attr_ref() {
        let e = parse("L'FIELD+1").unwrap();
        match e.leftmost_term() {
            MachExpr::DataAttr { attr, .. } => assert_eq!(*attr, AttrKind::Length),
            other => panic!("expected DataAttr, got {other:?}"),
        }
    }

    #[test]
    fn test_visitor_collects_symbols() {
        struct Collect(Vec<Id>);
        impl MachExprVisitor for Collect {
            fn visit_symbol(&mut self, name: Id, _r: Range) {
                self.0.push(name);
            }
        }
        let e = parse("A+B*C").unwrap();
        let mut v = Collect(Vec::new());
        e.apply(&mut v);
        assert_eq!(v.0.len(), 3);
    }

    #[test]
    fn test_incomplete_expression() {
        let lexemes = tokenize("1+", 0, 0);
        let mut pos = 0;
        let mut ids = IdPool::new();
        assert!(parse_mach_expr(&lexemes, &mut pos, &mut ids).is_none());
    }
}
