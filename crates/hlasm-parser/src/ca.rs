//! Conditional-assembly syntax.
//!
//! Variable symbols, concatenation chains, and the expression trees behind
//! `SETA`/`SETB`/`SETC`/`AIF`. Evaluation lives in the analyzer; this module
//! only builds closed syntax trees.

use hlasm_lang_core::{Id, IdPool, Range};

use crate::lexer::{AttrKind, Lexeme, Token};

/// A variable symbol reference: `&NAME` or created `&(chain)`, with an
/// optional subscript list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarSymbol {
    pub name: VarName,
    pub subscript: Vec<CaExpr>,
    pub range: Range,
}

/// Plain or created variable-symbol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarName {
    Plain(Id),
    /// `&(A&B)` — the name is assembled from a chain at evaluation time.
    Created(Box<ConcatChain>),
}

/// One element of a concatenation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatElem {
    /// Literal text.
    Str(String, Range),
    /// A variable symbol substitution point.
    Var(VarSymbol),
    /// An explicit concatenation dot.
    Dot(Range),
    /// A parenthesized sublist (macro operand sublists).
    Sublist(Vec<ConcatChain>, Range),
}

/// A concatenation chain: the model form of labels, opcodes and operands
/// that contain variable symbols.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConcatChain(pub Vec<ConcatElem>);

impl ConcatChain {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any element requires substitution.
    pub fn has_variables(&self) -> bool {
        self.0.iter().any(|e| match e {
            ConcatElem::Var(_) => true,
            ConcatElem::Sublist(subs, _) => subs.iter().any(|c| c.has_variables()),
            _ => false,
        })
    }

    pub fn range(&self) -> Range {
        let mut it = self.0.iter().map(|e| match e {
            ConcatElem::Str(_, r) | ConcatElem::Dot(r) | ConcatElem::Sublist(_, r) => *r,
            ConcatElem::Var(v) => v.range,
        });
        match it.next() {
            Some(first) => it.fold(first, Range::union),
            None => Range::default(),
        }
    }
}

/// Binary operators of conditional-assembly expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Xor,
}

impl CaBinaryOp {
    /// Relational/logical word operators as they appear in source.
    pub fn from_word(w: &str) -> Option<Self> {
        match w {
            "EQ" => Some(Self::Eq),
            "NE" => Some(Self::Ne),
            "LT" => Some(Self::Lt),
            "GT" => Some(Self::Gt),
            "LE" => Some(Self::Le),
            "GE" => Some(Self::Ge),
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "XOR" => Some(Self::Xor),
            _ => None,
        }
    }
}

/// A conditional-assembly expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaExpr {
    Num(i32, Range),
    /// A quoted string with substitution points.
    Str(ConcatChain, Range),
    Var(VarSymbol),
    /// An ordinary symbol (arithmetic value of an EQU, or function name).
    Symbol(Id, Range),
    /// Attribute reference: `T'&VAR`, `L'SYM`.
    AttrRef {
        attr: AttrKind,
        target: Box<CaExpr>,
        range: Range,
    },
    /// Substring: `'&S'(start,len)`.
    Substr {
        subject: Box<CaExpr>,
        start: Box<CaExpr>,
        len: Box<CaExpr>,
        range: Range,
    },
    /// Built-in function application: `(UPPER '&X')`, `FIND('&A','&B')`.
    Func {
        name: Id,
        args: Vec<CaExpr>,
        range: Range,
    },
    Not {
        expr: Box<CaExpr>,
        range: Range,
    },
    Neg {
        expr: Box<CaExpr>,
        range: Range,
    },
    Binary {
        op: CaBinaryOp,
        lhs: Box<CaExpr>,
        rhs: Box<CaExpr>,
        range: Range,
    },
}

impl CaExpr {
    pub fn range(&self) -> Range {
        match self {
            CaExpr::Num(_, r) | CaExpr::Str(_, r) | CaExpr::Symbol(_, r) => *r,
            CaExpr::Var(v) => v.range,
            CaExpr::AttrRef { range, .. }
            | CaExpr::Substr { range, .. }
            | CaExpr::Func { range, .. }
            | CaExpr::Not { range, .. }
            | CaExpr::Neg { range, .. }
            | CaExpr::Binary { range, .. } => *range,
        }
    }
}

/// Parse a variable symbol at `pos` (the lexeme there must be `VarSymbol`
/// or `Amp` + `(` for created names).
pub fn parse_var_symbol(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<VarSymbol> {
    let lx = lexemes.get(*pos)?;
    let mut range = lx.range;
    let name = match &lx.token {
        Token::VarSymbol(n) => {
            *pos += 1;
            VarName::Plain(ids.intern(n))
        }
        Token::Amp if matches!(lexemes.get(*pos + 1).map(|l| &l.token), Some(Token::LParen)) => {
            *pos += 2;
            let chain = parse_concat_chain(lexemes, pos, ids, &[Token::RParen]);
            if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                range = range.union(lexemes[*pos].range);
                *pos += 1;
            }
            VarName::Created(Box::new(chain))
        }
        _ => return None,
    };

    let mut subscript = Vec::new();
    if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::LParen)) {
        *pos += 1;
        loop {
            match parse_ca_expr(lexemes, pos, ids) {
                Some(e) => subscript.push(e),
                None => break,
            }
            match lexemes.get(*pos).map(|l| &l.token) {
                Some(Token::Comma) => {
                    *pos += 1;
                }
                _ => break,
            }
        }
        if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
            range = range.union(lexemes[*pos].range);
            *pos += 1;
        }
    }

    Some(VarSymbol {
        name,
        subscript,
        range,
    })
}

/// Parse a concatenation chain until one of `stop` tokens (or end).
pub fn parse_concat_chain(
    lexemes: &[Lexeme],
    pos: &mut usize,
    ids: &mut IdPool,
    stop: &[Token],
) -> ConcatChain {
    let mut chain = ConcatChain::default();

    while let Some(lx) = lexemes.get(*pos) {
        if stop.contains(&lx.token) {
            break;
        }
        match &lx.token {
            Token::VarSymbol(_) => {
                if let Some(vs) = parse_var_symbol(lexemes, pos, ids) {
                    chain.0.push(ConcatElem::Var(vs));
                } else {
                    *pos += 1;
                }
            }
            Token::Amp => {
                if matches!(lexemes.get(*pos + 1).map(|l| &l.token), Some(Token::LParen)) {
                    if let Some(vs) = parse_var_symbol(lexemes, pos, ids) {
                        chain.0.push(ConcatElem::Var(vs));
                        continue;
                    }
                }
                chain.0.push(ConcatElem::Str("&".into(), lx.range));
                *pos += 1;
            }
            Token::Dot => {
                chain.0.push(ConcatElem::Dot(lx.range));
                *pos += 1;
            }
            Token::SeqSymbol(name) => {
                // Inside a chain, `.NAME` is a concatenation dot followed by
                // literal text (`&X.C` renders as the value of &X then "C").
                chain.0.push(ConcatElem::Dot(lx.range));
                chain.0.push(ConcatElem::Str(name.clone(), lx.range));
                *pos += 1;
            }
            Token::LParen => {
                let open = lx.range;
                *pos += 1;
                let mut subs = Vec::new();
                loop {
                    let sub = parse_concat_chain(lexemes, pos, ids, &[Token::Comma, Token::RParen]);
                    subs.push(sub);
                    match lexemes.get(*pos).map(|l| &l.token) {
                        Some(Token::Comma) => {
                            *pos += 1;
                        }
                        _ => break,
                    }
                }
                let close = lexemes
                    .get(*pos)
                    .map(|l| l.range)
                    .unwrap_or(open);
                if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                    *pos += 1;
                }
                chain.0.push(ConcatElem::Sublist(subs, open.union(close)));
            }
            other => {
                chain
                    .0
                    .push(ConcatElem::Str(other.to_string(), lx.range));
                *pos += 1;
            }
        }
    }

    chain
}

/// Parse a conditional-assembly expression.
pub fn parse_ca_expr(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<CaExpr> {
    parse_ca_binary(lexemes, pos, ids, 0)
}

// Precedence levels: 0 = OR/XOR, 1 = AND, 2 = relational, 3 = additive,
// 4 = multiplicative.
fn level_of(op: CaBinaryOp) -> u8 {
    match op {
        CaBinaryOp::Or | CaBinaryOp::Xor => 0,
        CaBinaryOp::And => 1,
        CaBinaryOp::Eq
        | CaBinaryOp::Ne
        | CaBinaryOp::Lt
        | CaBinaryOp::Gt
        | CaBinaryOp::Le
        | CaBinaryOp::Ge => 2,
        CaBinaryOp::Add | CaBinaryOp::Sub => 3,
        CaBinaryOp::Mul | CaBinaryOp::Div => 4,
    }
}

fn peek_op(lexemes: &[Lexeme], pos: usize) -> Option<CaBinaryOp> {
    match lexemes.get(pos).map(|l| &l.token) {
        Some(Token::Op('+')) => Some(CaBinaryOp::Add),
        Some(Token::Op('-')) => Some(CaBinaryOp::Sub),
        Some(Token::Op('*')) => Some(CaBinaryOp::Mul),
        Some(Token::Op('/')) => Some(CaBinaryOp::Div),
        Some(Token::Symbol(w)) => CaBinaryOp::from_word(&w.to_uppercase()),
        _ => None,
    }
}

fn parse_ca_binary(
    lexemes: &[Lexeme],
    pos: &mut usize,
    ids: &mut IdPool,
    min_level: u8,
) -> Option<CaExpr> {
    let mut left = parse_ca_unary(lexemes, pos, ids)?;

    while let Some(op) = peek_op(lexemes, *pos) {
        let level = level_of(op);
        if level < min_level {
            break;
        }
        *pos += 1;
        let right = parse_ca_binary(lexemes, pos, ids, level + 1)?;
        let range = left.range().union(right.range());
        left = CaExpr::Binary {
            op,
            lhs: Box::new(left),
            rhs: Box::new(right),
            range,
        };
    }

    Some(left)
}

fn parse_ca_unary(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<CaExpr> {
    match lexemes.get(*pos).map(|l| (&l.token, l.range)) {
        Some((Token::Op('-'), r)) => {
            *pos += 1;
            let e = parse_ca_unary(lexemes, pos, ids)?;
            let range = r.union(e.range());
            Some(CaExpr::Neg {
                expr: Box::new(e),
                range,
            })
        }
        Some((Token::Op('+'), _)) => {
            *pos += 1;
            parse_ca_unary(lexemes, pos, ids)
        }
        Some((Token::Symbol(w), r)) if w.eq_ignore_ascii_case("NOT") => {
            *pos += 1;
            let e = parse_ca_unary(lexemes, pos, ids)?;
            let range = r.union(e.range());
            Some(CaExpr::Not {
                expr: Box::new(e),
                range,
            })
        }
        _ => parse_ca_primary(lexemes, pos, ids),
    }
}

/// Built-in function names usable in prefix position inside parentheses.
const PREFIX_FUNCS: &[&str] = &["UPPER", "LOWER", "DOUBLE", "SIGNED"];
/// Built-in functions taking an argument list.
const CALL_FUNCS: &[&str] = &["FIND", "INDEX"];

fn parse_ca_primary(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<CaExpr> {
    let lx = lexemes.get(*pos)?;
    let range = lx.range;
    let expr = match &lx.token {
        Token::Number(n) => {
            *pos += 1;
            CaExpr::Num(*n as i32, range)
        }
        Token::SelfDef(kind, value) => {
            *pos += 1;
            CaExpr::Num(crate::expr::self_def_value(*kind, value)?, range)
        }
        Token::QuotedString(s) => {
            // Re-lex the string body as a chain so '&VAR' substitutes.
            *pos += 1;
            let inner = crate::lexer::tokenize(s, range.start.line, range.start.column + 1);
            let mut ipos = 0;
            let chain = if s.contains('&') {
                parse_concat_chain(&inner, &mut ipos, ids, &[])
            } else {
                let mut c = ConcatChain::default();
                if !s.is_empty() {
                    c.0.push(ConcatElem::Str(s.clone(), range));
                }
                c
            };
            CaExpr::Str(chain, range)
        }
        Token::VarSymbol(_) | Token::Amp => {
            let vs = parse_var_symbol(lexemes, pos, ids)?;
            CaExpr::Var(vs)
        }
        Token::Attr(attr) => {
            let attr = *attr;
            *pos += 1;
            let target = match lexemes.get(*pos).map(|l| (&l.token, l.range)) {
                Some((Token::Symbol(name), r)) => {
                    let id = ids.intern(name);
                    *pos += 1;
                    CaExpr::Symbol(id, r)
                }
                Some((Token::VarSymbol(_), _)) => {
                    let vs = parse_var_symbol(lexemes, pos, ids)?;
                    CaExpr::Var(vs)
                }
                _ => return None,
            };
            let range = range.union(target.range());
            CaExpr::AttrRef {
                attr,
                target: Box::new(target),
                range,
            }
        }
        Token::Symbol(w) => {
            let upper = w.to_uppercase();
            if CALL_FUNCS.contains(&upper.as_str())
                && matches!(lexemes.get(*pos + 1).map(|l| &l.token), Some(Token::LParen))
            {
                let name = ids.intern(&upper);
                *pos += 2;
                let mut args = Vec::new();
                loop {
                    match parse_ca_expr(lexemes, pos, ids) {
                        Some(a) => args.push(a),
                        None => break,
                    }
                    if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::Comma)) {
                        *pos += 1;
                    } else {
                        break;
                    }
                }
                let close = lexemes.get(*pos).map(|l| l.range).unwrap_or(range);
                if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                    *pos += 1;
                }
                CaExpr::Func {
                    name,
                    args,
                    range: range.union(close),
                }
            } else {
                *pos += 1;
                CaExpr::Symbol(ids.intern(w), range)
            }
        }
        Token::LParen => {
            *pos += 1;
            // Prefix built-in: (UPPER '&X').
            if let Some(Token::Symbol(w)) = lexemes.get(*pos).map(|l| &l.token) {
                let upper = w.to_uppercase();
                if PREFIX_FUNCS.contains(&upper.as_str()) {
                    let name = ids.intern(&upper);
                    *pos += 1;
                    let arg = parse_ca_expr(lexemes, pos, ids)?;
                    let close = lexemes.get(*pos).map(|l| l.range).unwrap_or(range);
                    if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                        *pos += 1;
                    }
                    return finish_postfix(
                        lexemes,
                        pos,
                        ids,
                        CaExpr::Func {
                            name,
                            args: vec![arg],
                            range: range.union(close),
                        },
                    );
                }
            }
            let inner = parse_ca_expr(lexemes, pos, ids)?;
            if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                *pos += 1;
            }
            inner
        }
        _ => return None,
    };

    finish_postfix(lexemes, pos, ids, expr)
}

/// Attach a substring postfix `(start,len)` to string-valued expressions.
fn finish_postfix(
    lexemes: &[Lexeme],
    pos: &mut usize,
    ids: &mut IdPool,
    expr: CaExpr,
) -> Option<CaExpr> {
    if !matches!(expr, CaExpr::Str(..)) {
        return Some(expr);
    }
    if !matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::LParen)) {
        return Some(expr);
    }
    let save = *pos;
    *pos += 1;
    let start = match parse_ca_expr(lexemes, pos, ids) {
        Some(e) => e,
        None => {
            *pos = save;
            return Some(expr);
        }
    };
    if !matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::Comma)) {
        *pos = save;
        return Some(expr);
    }
    *pos += 1;
    let len = match parse_ca_expr(lexemes, pos, ids) {
        Some(e) => e,
        None => {
            *pos = save;
            return Some(expr);
        }
    };
    let close = lexemes.get(*pos).map(|l| l.range).unwrap_or(expr.range());
    if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
        *pos += 1;
    }
    let range = expr.range().union(close);
    Some(CaExpr::Substr {
        subject: Box::new(expr),
        start: Box::new(start),
        len: Box::new(len),
        range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(text: &str) -> Option<CaExpr> {
        let lexemes = tokenize(text, 0, 0);
        let mut pos = 0;
        let mut ids = IdPool::new();
        parse_ca_expr(&lexemes, &mut pos, &mut ids)
    }

    #[test]
    fn test_arithmetic() {
        let e = parse("&A+2*3").unwrap();
        match e {
            CaExpr::Binary { op, .. } => assert_eq!(op, CaBinaryOp::Add),
            other => panic!("expected Binary, got {other:?}"),
        }
    }

    #[test]
    fn test_relational_words() {
        let e = parse("&A EQ 2").unwrap();
        match e {
            CaExpr::Binary { op, .. } => assert_eq!(op, CaBinaryOp::Eq),
            other => panic!("expected Binary, got {other:?}"),
        }
    }

    #[test]
    fn test_logical_precedence() {
        // AND binds tighter than OR.
        let e = parse("&A OR &B AND &C").unwrap();
        match e {
            CaExpr::Binary { op: CaBinaryOp::Or, rhs, .. } => match *rhs {
                CaExpr::Binary { op: CaBinaryOp::And, .. } => {}
                other => panic!("expected AND on the right, got {other:?}"),
            },
            other => panic!("expected OR at the top, got {other:?}"),
        }
    }

    #[test]
    fn test_not() {
        assert!(matches!(parse("NOT &B").unwrap(), CaExpr::Not { .. }));
    }

    #[test]
    fn test_string_chain() {
        let e = parse("'AB&X.C'").unwrap();
        match e {
            CaExpr::Str(chain, _) => {
                assert!(chain.has_variables());
            }
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn test_substring() {
        let e = parse("'&S'(2,3)").unwrap();
        assert!(matches!(e, CaExpr::Substr { .. }));
    }

    #[test]
    fn test_attr_of_var() {
        let e = parse("T'&P").unwrap();
        match e {
            CaExpr::AttrRef { attr, .. } => assert_eq!(attr, crate::lexer::AttrKind::Type),
            other => panic!("expected AttrRef, got {other:?}"),
        }
    }

    #[test]
    fn test_subscripted_var() {
        let lexemes = tokenize("&TAB(3)", 0, 0);
        let mut pos = 0;
        let mut ids = IdPool::new();
        let vs = parse_var_symbol(&lexemes, &mut pos, &mut ids).unwrap();
        assert_eq!(vs.subscript.len(), 1);
    }

    #[test]
    fn test_created_var_name() {
        let lexemes = tokenize("&(A&B)", 0, 0);
        let mut pos = 0;
        let mut ids = IdPool::new();
        let vs = parse_var_symbol(&lexemes, &mut pos, &mut ids).unwrap();
        assert!(matches!(vs.name, VarName::Created(_)));
    }

    #[test]
    fn test_prefix_upper() {
        let e = parse("(UPPER '&X')").unwrap();
        assert!(matches!(e, CaExpr::Func { .. }));
    }

    #[test]
    fn test_find_call() {
        let e = parse("FIND('&A','B')").unwrap();
        match e {
            CaExpr::Func { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected Func, got {other:?}"),
        }
    }

    #[test]
    fn test_concat_chain_sublist() {
        let lexemes = tokenize("(A,B),C", 0, 0);
        let mut pos = 0;
        let mut ids = IdPool::new();
        let chain = parse_concat_chain(&lexemes, &mut pos, &mut ids, &[Token::Comma]);
        assert_eq!(chain.0.len(), 1);
        assert!(matches!(chain.0[0], ConcatElem::Sublist(ref subs, _) if subs.len() == 2));
    }
}
