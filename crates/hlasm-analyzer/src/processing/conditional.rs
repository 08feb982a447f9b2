//! Conditional-assembly evaluation.
//!
//! Evaluates SETx/AIF expressions, renders concatenation chains (variable
//! substitution), and resolves variable symbols against the scope stack and
//! the system variables. Attribute references to ordinary symbols that are
//! not defined yet surface as [`CaEvalError::NeedLookahead`]; the manager
//! runs the excursion and re-processes the statement.

use std::collections::HashSet;

use hlasm_lang_core::{Diagnostic, Id, Range};
use hlasm_parser::ca::{CaBinaryOp, CaExpr, ConcatChain, ConcatElem, VarName, VarSymbol};
use hlasm_parser::lexer::AttrKind;

use crate::context::variables::{MacroArg, SetValue};
use crate::context::HlasmContext;
use crate::diags;

/// Why evaluation could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaEvalError {
    /// An attribute of a not-yet-defined ordinary symbol was referenced;
    /// run lookahead for the symbol and retry.
    NeedLookahead(Id),
}

/// Evaluation environment for one statement.
pub struct CaEval<'a> {
    pub ctx: &'a HlasmContext,
    /// Lookahead targets already attempted; misses evaluate to defaults.
    pub attempted: &'a HashSet<Id>,
    pub diags: &'a mut Vec<Diagnostic>,
}

impl<'a> CaEval<'a> {
    pub fn new(
        ctx: &'a HlasmContext,
        attempted: &'a HashSet<Id>,
        diags: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            ctx,
            attempted,
            diags,
        }
    }

    // -- variable resolution ------------------------------------------------

    /// The value of a variable symbol: macro parameters first, then SET
    /// variables, then system variables. Unknown variables are empty.
    pub fn var_value(&mut self, vs: &VarSymbol) -> Result<SetValue, CaEvalError> {
        let name = self.var_name(vs)?;
        let sub = self.first_subscript(vs)?;

        if let Some(frame) = self.ctx.cond.macro_frame() {
            if let Some(arg) = frame.params.get(&name) {
                return Ok(SetValue::C(arg_text(arg, sub)));
            }
        }

        if let Some(var) = self.ctx.cond.get_var(name) {
            return Ok(var.get(sub));
        }

        if let Some(v) = self.system_var(name, sub)? {
            return Ok(v);
        }

        Ok(SetValue::C(String::new()))
    }

    /// Resolve a (possibly created) variable name to an id.
    pub fn var_name(&mut self, vs: &VarSymbol) -> Result<Id, CaEvalError> {
        match &vs.name {
            VarName::Plain(id) => Ok(*id),
            VarName::Created(chain) => {
                let text = self.render_chain(chain)?;
                if !hlasm_lang_core::IdPool::is_valid_name(&text) {
                    self.diags.push(diags::e065(vs.range));
                    return Ok(Id::EMPTY);
                }
                // Created names intern through the pool snapshot; the
                // caller must have interned candidates already, so a miss
                // means an unknown (empty) variable.
                Ok(self.ctx.ids.find(&text).unwrap_or(Id::EMPTY))
            }
        }
    }

    fn first_subscript(&mut self, vs: &VarSymbol) -> Result<Option<i64>, CaEvalError> {
        match vs.subscript.first() {
            Some(e) => Ok(Some(self.eval_arith(e)? as i64)),
            None => Ok(None),
        }
    }

    fn system_var(&mut self, name: Id, sub: Option<i64>) -> Result<Option<SetValue>, CaEvalError> {
        let text = self.ctx.ids.text(name);
        let frame = self.ctx.cond.macro_frame();
        Ok(match text {
            "SYSNDX" => frame.map(|f| SetValue::C(format!("{:04}", f.sysndx))),
            "SYSECT" => {
                let sect = self
                    .ctx
                    .ord
                    .current_section()
                    .map(|s| self.ctx.ids.text(s.name).to_string())
                    .unwrap_or_default();
                Some(SetValue::C(sect))
            }
            "SYSLIST" => frame.map(|f| {
                let idx = sub.unwrap_or(0);
                let arg = if idx >= 1 {
                    f.syslist.get(idx as usize - 1)
                } else {
                    None
                };
                SetValue::C(arg.map(|a| a.text.clone()).unwrap_or_default())
            }),
            "SYSPARM" => Some(SetValue::C(self.ctx.options.sysparm.clone())),
            "SYSNEST" => Some(SetValue::A(self.ctx.cond.nesting_depth() as i32)),
            _ => None,
        })
    }

    // -- chain rendering ----------------------------------------------------

    /// Render a concatenation chain: variables substitute, a dot right
    /// after a substitution is consumed, everything else is literal.
    pub fn render_chain(&mut self, chain: &ConcatChain) -> Result<String, CaEvalError> {
        let mut out = String::new();
        let mut after_var = false;
        for elem in &chain.0 {
            match elem {
                ConcatElem::Str(s, _) => {
                    out.push_str(s);
                    after_var = false;
                }
                ConcatElem::Dot(_) => {
                    if !after_var {
                        out.push('.');
                    }
                    after_var = false;
                }
                ConcatElem::Var(vs) => {
                    out.push_str(&self.var_value(vs)?.to_text());
                    after_var = true;
                }
                ConcatElem::Sublist(subs, _) => {
                    out.push('(');
                    for (i, sub) in subs.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str(&self.render_chain(sub)?);
                    }
                    out.push(')');
                    after_var = false;
                }
            }
        }
        Ok(out)
    }

    // -- expression evaluation ----------------------------------------------

    pub fn eval(&mut self, expr: &CaExpr) -> Result<SetValue, CaEvalError> {
        match expr {
            CaExpr::Num(v, _) => Ok(SetValue::A(*v)),
            CaExpr::Str(chain, _) => Ok(SetValue::C(self.render_chain(chain)?)),
            CaExpr::Var(vs) => self.var_value(vs),
            CaExpr::Symbol(id, _) => {
                // An ordinary symbol in arithmetic context contributes its
                // absolute value.
                match self.ctx.ord.get_symbol(*id).and_then(|s| {
                    let v = self.ctx.ord.reduce_value(&s.value);
                    v.abs()
                }) {
                    Some(v) => Ok(SetValue::A(v)),
                    None => Ok(SetValue::C(self.ctx.ids.text(*id).to_string())),
                }
            }
            CaExpr::AttrRef { attr, target, range } => self.eval_attr(*attr, target, *range),
            CaExpr::Substr {
                subject,
                start,
                len,
                ..
            } => {
                let text = self.eval_str(subject)?;
                let start = self.eval_arith(start)?.max(1) as usize;
                let len = self.eval_arith(len)?.max(0) as usize;
                let chars: Vec<char> = text.chars().collect();
                let from = (start - 1).min(chars.len());
                let to = (from + len).min(chars.len());
                Ok(SetValue::C(chars[from..to].iter().collect()))
            }
            CaExpr::Func { name, args, range } => self.eval_func(*name, args, *range),
            CaExpr::Not { expr, .. } => Ok(SetValue::B(self.eval_arith(expr)? == 0)),
            CaExpr::Neg { expr, .. } => Ok(SetValue::A(-self.eval_arith(expr)?)),
            CaExpr::Binary { op, lhs, rhs, .. } => self.eval_binary(*op, lhs, rhs),
        }
    }

    pub fn eval_arith(&mut self, expr: &CaExpr) -> Result<i32, CaEvalError> {
        Ok(to_arith(&self.eval(expr)?))
    }

    pub fn eval_bool(&mut self, expr: &CaExpr) -> Result<bool, CaEvalError> {
        Ok(to_arith(&self.eval(expr)?) != 0)
    }

    pub fn eval_str(&mut self, expr: &CaExpr) -> Result<String, CaEvalError> {
        Ok(self.eval(expr)?.to_text())
    }

    fn eval_binary(
        &mut self,
        op: CaBinaryOp,
        lhs: &CaExpr,
        rhs: &CaExpr,
    ) -> Result<SetValue, CaEvalError> {
        use CaBinaryOp::*;
        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        Ok(match op {
            Add => SetValue::A(to_arith(&l).wrapping_add(to_arith(&r))),
            Sub => SetValue::A(to_arith(&l).wrapping_sub(to_arith(&r))),
            Mul => SetValue::A(to_arith(&l).wrapping_mul(to_arith(&r))),
            Div => {
                let d = to_arith(&r);
                // Division by zero yields zero.
                SetValue::A(if d == 0 { 0 } else { to_arith(&l) / d })
            }
            And => SetValue::B(to_arith(&l) != 0 && to_arith(&r) != 0),
            Or => SetValue::B(to_arith(&l) != 0 || to_arith(&r) != 0),
            Xor => SetValue::B((to_arith(&l) != 0) ^ (to_arith(&r) != 0)),
            Eq | Ne | Lt | Gt | Le | Ge => {
                let ord = compare(&l, &r);
                SetValue::B(match op {
                    Eq => ord == std::cmp::Ordering::Equal,
                    Ne => ord != std::cmp::Ordering::Equal,
                    Lt => ord == std::cmp::Ordering::Less,
                    Gt => ord == std::cmp::Ordering::Greater,
                    Le => ord != std::cmp::Ordering::Greater,
                    _ => ord != std::cmp::Ordering::Less,
                })
            }
        })
    }

    fn eval_func(
        &mut self,
        name: Id,
        args: &[CaExpr],
        range: Range,
    ) -> Result<SetValue, CaEvalError> {
        let fname = self.ctx.ids.text(name).to_string();
        match fname.as_str() {
            "UPPER" => {
                let s = self.arg_str(args, 0)?;
                Ok(SetValue::C(s.to_uppercase()))
            }
            "LOWER" => {
                let s = self.arg_str(args, 0)?;
                Ok(SetValue::C(s.to_lowercase()))
            }
            "DOUBLE" => {
                let s = self.arg_str(args, 0)?;
                Ok(SetValue::C(s.replace('\'', "''").replace('&', "&&")))
            }
            "SIGNED" => {
                let v = match args.first() {
                    Some(e) => self.eval_arith(e)?,
                    None => 0,
                };
                Ok(SetValue::C(v.to_string()))
            }
            "FIND" => {
                let a = self.arg_str(args, 0)?;
                let b = self.arg_str(args, 1)?;
                let pos = a
                    .chars()
                    .position(|c| b.contains(c))
                    .map(|p| p as i32 + 1)
                    .unwrap_or(0);
                Ok(SetValue::A(pos))
            }
            "INDEX" => {
                let a = self.arg_str(args, 0)?;
                let b = self.arg_str(args, 1)?;
                let pos = a.find(&b).map(|p| p as i32 + 1).unwrap_or(0);
                Ok(SetValue::A(pos))
            }
            _ => {
                self.diags.push(diags::a011(&fname, range));
                Ok(SetValue::A(0))
            }
        }
    }

    fn arg_str(&mut self, args: &[CaExpr], idx: usize) -> Result<String, CaEvalError> {
        match args.get(idx) {
            Some(e) => self.eval_str(e),
            None => Ok(String::new()),
        }
    }

    // -- attribute references -----------------------------------------------

    fn eval_attr(
        &mut self,
        attr: AttrKind,
        target: &CaExpr,
        _range: Range,
    ) -> Result<SetValue, CaEvalError> {
        // K' and N' are about the variable itself, not a symbol.
        if let CaExpr::Var(vs) = target {
            match attr {
                AttrKind::Count => {
                    let v = self.var_value(vs)?;
                    return Ok(SetValue::A(v.to_text().chars().count() as i32));
                }
                AttrKind::Number => {
                    let name = self.var_name(vs)?;
                    if let Some(frame) = self.ctx.cond.macro_frame() {
                        if let Some(arg) = frame.params.get(&name) {
                            return Ok(SetValue::A(arg.number_attr()));
                        }
                    }
                    let n = self
                        .ctx
                        .cond
                        .get_var(name)
                        .map(|v| v.number_attr())
                        .unwrap_or(0);
                    return Ok(SetValue::A(n));
                }
                _ => {}
            }
        }

        // Everything else resolves through an ordinary-symbol name.
        let sym_name = match target {
            CaExpr::Symbol(id, _) => Some(*id),
            CaExpr::Var(vs) => {
                let text = self.var_value(vs)?.to_text();
                if text.chars().all(|c| c.is_ascii_digit()) && !text.is_empty() {
                    // A self-defining value: type 'N', length 1.
                    return Ok(match attr {
                        AttrKind::Type => SetValue::C("N".into()),
                        AttrKind::Length => SetValue::A(1),
                        AttrKind::Defined => SetValue::A(0),
                        _ => SetValue::A(0),
                    });
                }
                if text.is_empty() {
                    return Ok(match attr {
                        AttrKind::Type => SetValue::C("O".into()),
                        _ => SetValue::A(0),
                    });
                }
                self.ctx.ids.find(&text)
            }
            _ => None,
        };

        let Some(sym_name) = sym_name else {
            return Ok(match attr {
                AttrKind::Type => SetValue::C("U".into()),
                AttrKind::Defined => SetValue::A(0),
                _ => SetValue::A(if attr == AttrKind::Length { 1 } else { 0 }),
            });
        };

        let sym = self
            .ctx
            .ord
            .get_symbol(sym_name)
            .filter(|s| s.value.is_defined() || s.attrs.length.is_some())
            .or_else(|| self.ctx.ord.get_symbol_reference(sym_name));

        match sym {
            Some(s) => Ok(match attr {
                AttrKind::Type => SetValue::C(ebcdic_to_char(s.attrs.type_attr).to_string()),
                AttrKind::Length => SetValue::A(s.attrs.length_or_default() as i32),
                AttrKind::Scale => SetValue::A(s.attrs.scale_or_default() as i32),
                AttrKind::Integer => SetValue::A(s.attrs.integer.unwrap_or(0) as i32),
                AttrKind::Defined => SetValue::A(1),
                _ => SetValue::A(0),
            }),
            None => {
                if attr == AttrKind::Defined {
                    return Ok(SetValue::A(0));
                }
                if self.attempted.contains(&sym_name) {
                    // Lookahead ran and found nothing.
                    Ok(match attr {
                        AttrKind::Type => SetValue::C("U".into()),
                        AttrKind::Length => SetValue::A(1),
                        _ => SetValue::A(0),
                    })
                } else {
                    Err(CaEvalError::NeedLookahead(sym_name))
                }
            }
        }
    }
}

/// Subscripted access into a macro argument.
fn arg_text(arg: &MacroArg, sub: Option<i64>) -> String {
    match sub {
        None => arg.text.clone(),
        Some(i) if i >= 1 => arg
            .sublist
            .get(i as usize - 1)
            .cloned()
            .unwrap_or_default(),
        Some(_) => String::new(),
    }
}

/// Arithmetic coercion: A as-is, B as 0/1, C parsed as decimal.
fn to_arith(v: &SetValue) -> i32 {
    match v {
        SetValue::A(a) => *a,
        SetValue::B(b) => *b as i32,
        SetValue::C(s) => s.trim().parse().unwrap_or(0),
    }
}

/// Comparison: characters compare as strings, everything else numerically.
fn compare(l: &SetValue, r: &SetValue) -> std::cmp::Ordering {
    match (l, r) {
        (SetValue::C(a), SetValue::C(b)) => a.cmp(b),
        _ => to_arith(l).cmp(&to_arith(r)),
    }
}

/// EBCDIC byte back to the character HLASM shows for T'.
pub fn ebcdic_to_char(b: u8) -> char {
    match b {
        0xC1..=0xC9 => (b'A' + (b - 0xC1)) as char,
        0xD1..=0xD9 => (b'J' + (b - 0xD1)) as char,
        0xE2..=0xE9 => (b'S' + (b - 0xE2)) as char,
        0xF0..=0xF9 => (b'0' + (b - 0xF0)) as char,
        0x5B => '$',
        0x40 => ' ',
        _ => 'U',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::variables::VarKind;
    use crate::options::AsmOptions;
    use hlasm_lang_core::{IdPool, ResourceLocation};
    use hlasm_parser::ca::parse_ca_expr;
    use hlasm_parser::lexer::tokenize;

    fn ctx_with(
        f: impl FnOnce(&mut HlasmContext),
    ) -> (HlasmContext, HashSet<Id>) {
        let mut ctx = HlasmContext::new(
            ResourceLocation::default(),
            AsmOptions::default(),
            IdPool::new(),
        );
        f(&mut ctx);
        (ctx, HashSet::new())
    }

    fn eval_text(ctx: &mut HlasmContext, attempted: &HashSet<Id>, text: &str) -> SetValue {
        let lexemes = tokenize(text, 0, 0);
        let mut pos = 0;
        let expr = parse_ca_expr(&lexemes, &mut pos, &mut ctx.ids).unwrap();
        let mut diags = Vec::new();
        let mut eval = CaEval::new(ctx, attempted, &mut diags);
        eval.eval(&expr).unwrap()
    }

    #[test]
    fn test_arithmetic_with_vars() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let a = ctx.intern("A");
        ctx.cond.set_var(a, None, SetValue::A(40));
        assert_eq!(eval_text(&mut ctx, &attempted, "&A+2"), SetValue::A(42));
    }

    #[test]
    fn test_relational_and_logic() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let i = ctx.intern("I");
        ctx.cond.set_var(i, None, SetValue::A(3));
        assert_eq!(eval_text(&mut ctx, &attempted, "&I LT 5"), SetValue::B(true));
        assert_eq!(
            eval_text(&mut ctx, &attempted, "&I LT 5 AND &I GT 2"),
            SetValue::B(true)
        );
        assert_eq!(eval_text(&mut ctx, &attempted, "NOT &I"), SetValue::B(false));
    }

    #[test]
    fn test_string_concat_and_substr() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let s = ctx.intern("S");
        ctx.cond.set_var(s, None, SetValue::C("WORLD".into()));
        assert_eq!(
            eval_text(&mut ctx, &attempted, "'HELLO &S'"),
            SetValue::C("HELLO WORLD".into())
        );
        assert_eq!(
            eval_text(&mut ctx, &attempted, "'&S'(2,3)"),
            SetValue::C("ORL".into())
        );
    }

    #[test]
    fn test_dot_consumed_after_var() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let x = ctx.intern("X");
        ctx.cond.set_var(x, None, SetValue::C("AB".into()));
        assert_eq!(
            eval_text(&mut ctx, &attempted, "'&X.C'"),
            SetValue::C("ABC".into())
        );
    }

    #[test]
    fn test_k_attr() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let v = ctx.intern("V");
        ctx.cond.set_var(v, None, SetValue::C("ABCDE".into()));
        assert_eq!(eval_text(&mut ctx, &attempted, "K'&V"), SetValue::A(5));
    }

    #[test]
    fn test_upper_and_find() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        assert_eq!(
            eval_text(&mut ctx, &attempted, "(UPPER 'abc')"),
            SetValue::C("ABC".into())
        );
        assert_eq!(
            eval_text(&mut ctx, &attempted, "INDEX('HAYSTACK','STACK')"),
            SetValue::A(4)
        );
        assert_eq!(
            eval_text(&mut ctx, &attempted, "FIND('ABC','CX')"),
            SetValue::A(3)
        );
    }

    #[test]
    fn test_attr_of_undefined_symbol_needs_lookahead() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let lexemes = tokenize("L'FUTURE", 0, 0);
        let mut pos = 0;
        let expr = parse_ca_expr(&lexemes, &mut pos, &mut ctx.ids).unwrap();
        let future = ctx.intern("FUTURE");
        let mut diags = Vec::new();
        let mut eval = CaEval::new(&ctx, &attempted, &mut diags);
        assert_eq!(eval.eval(&expr), Err(CaEvalError::NeedLookahead(future)));
    }

    #[test]
    fn test_attr_after_failed_lookahead_defaults() {
        let (mut ctx, mut attempted) = ctx_with(|_| {});
        let future = ctx.intern("FUTURE");
        attempted.insert(future);
        assert_eq!(
            eval_text_attempted(&mut ctx, &attempted, "T'FUTURE"),
            SetValue::C("U".into())
        );
        assert_eq!(
            eval_text_attempted(&mut ctx, &attempted, "L'FUTURE"),
            SetValue::A(1)
        );
    }

    fn eval_text_attempted(
        ctx: &mut HlasmContext,
        attempted: &HashSet<Id>,
        text: &str,
    ) -> SetValue {
        eval_text(ctx, attempted, text)
    }

    #[test]
    fn test_declared_var_defaults() {
        let (mut ctx, attempted) = ctx_with(|_| {});
        let n = ctx.intern("N");
        ctx.cond.declare_local(n, VarKind::Arithmetic);
        assert_eq!(eval_text(&mut ctx, &attempted, "&N"), SetValue::A(0));
    }

    #[test]
    fn test_sysparm() {
        let mut ctx = HlasmContext::new(
            ResourceLocation::default(),
            AsmOptions {
                sysparm: "DEBUG".into(),
                ..AsmOptions::default()
            },
            IdPool::new(),
        );
        let attempted = HashSet::new();
        assert_eq!(
            eval_text(&mut ctx, &attempted, "'&SYSPARM'"),
            SetValue::C("DEBUG".into())
        );
    }
}
