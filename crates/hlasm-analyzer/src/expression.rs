//! Machine-expression evaluation against the ordinary-assembly context.
//!
//! The parser builds the trees; this module walks them with the symbol
//! table in hand. Evaluation follows HLASM arithmetic: relocatable values
//! add and subtract (same-section differences collapse to absolute),
//! multiplication and division need absolute operands, and division by
//! zero yields zero.

use hlasm_lang_core::{Diagnostic, Id, Range};
use hlasm_parser::expr::{BinaryOp, MachExpr};
use hlasm_parser::lexer::AttrKind;

use crate::context::ordinary::OrdinaryContext;
use crate::context::section::SpaceId;
use crate::context::symbol::{Address, SymbolValue};
use crate::diags;

/// The location-counter value and surroundings an expression evaluates in.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Value of `*` at the statement.
    pub loctr: Address,
}

impl EvalContext {
    pub fn at(loctr: Address) -> Self {
        Self { loctr }
    }
}

/// Unresolved inputs an expression needs before it can evaluate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deps {
    pub symbols: Vec<Id>,
    pub spaces: Vec<SpaceId>,
}

impl Deps {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.spaces.is_empty()
    }

    fn add_symbol(&mut self, id: Id) {
        if !self.symbols.contains(&id) {
            self.symbols.push(id);
        }
    }

    fn add_spaces_of(&mut self, addr: &Address) {
        for &(sp, _) in &addr.spaces {
            if !self.spaces.contains(&sp) {
                self.spaces.push(sp);
            }
        }
    }

    pub fn merge(&mut self, other: Deps) {
        for s in other.symbols {
            self.add_symbol(s);
        }
        for sp in other.spaces {
            if !self.spaces.contains(&sp) {
                self.spaces.push(sp);
            }
        }
    }
}

/// Collect the undefined symbols and unresolved spaces an expression
/// depends on.
pub fn collect_deps(expr: &MachExpr, ord: &OrdinaryContext, ectx: &EvalContext) -> Deps {
    let mut deps = Deps::default();
    collect_into(expr, ord, ectx, &mut deps);
    deps
}

fn collect_into(expr: &MachExpr, ord: &OrdinaryContext, ectx: &EvalContext, deps: &mut Deps) {
    match expr {
        MachExpr::Constant { .. } | MachExpr::Literal { .. } => {}
        MachExpr::Symbol { name, .. } => match ord.get_symbol(*name) {
            Some(sym) if sym.value.is_defined() => {
                if let SymbolValue::Reloc(addr) = &ord.reduce_value(&sym.value) {
                    deps.add_spaces_of(addr);
                }
            }
            _ => deps.add_symbol(*name),
        },
        MachExpr::DataAttr { name, .. } => {
            let known = ord
                .get_symbol(*name)
                .map(|s| s.value.is_defined())
                .unwrap_or(false)
                || ord.get_symbol_reference(*name).is_some();
            if !known {
                deps.add_symbol(*name);
            }
        }
        MachExpr::LocCtr { .. } => {
            let reduced = ord.reduce_address(&ectx.loctr);
            deps.add_spaces_of(&reduced);
        }
        MachExpr::Neg { expr, .. } => collect_into(expr, ord, ectx, deps),
        MachExpr::Binary { lhs, rhs, .. } => {
            collect_into(lhs, ord, ectx, deps);
            collect_into(rhs, ord, ectx, deps);
        }
    }
}

/// Evaluate an expression. Missing inputs yield `Undefined`; arithmetic
/// anomalies become diagnostics.
pub fn evaluate(
    expr: &MachExpr,
    ord: &OrdinaryContext,
    ectx: &EvalContext,
    diags_out: &mut Vec<Diagnostic>,
) -> SymbolValue {
    match expr {
        MachExpr::Constant { value, .. } => SymbolValue::Absolute(*value),
        MachExpr::Symbol { name, .. } => match ord.get_symbol(*name) {
            Some(sym) => ord.reduce_value(&sym.value),
            None => SymbolValue::Undefined,
        },
        MachExpr::DataAttr { attr, name, range } => {
            evaluate_data_attr(*attr, *name, *range, ord, diags_out)
        }
        MachExpr::LocCtr { .. } => {
            let reduced = ord.reduce_address(&ectx.loctr);
            if reduced.bases.is_empty() && reduced.spaces.is_empty() {
                SymbolValue::Absolute(reduced.offset)
            } else {
                SymbolValue::Reloc(reduced)
            }
        }
        // Literal addresses materialize at LTORG; until then the reference
        // has no value.
        MachExpr::Literal { .. } => SymbolValue::Undefined,
        MachExpr::Neg { expr, .. } => {
            SymbolValue::Absolute(0).sub(&evaluate(expr, ord, ectx, diags_out))
        }
        MachExpr::Binary {
            op,
            lhs,
            rhs,
            range,
        } => {
            let l = evaluate(lhs, ord, ectx, diags_out);
            let r = evaluate(rhs, ord, ectx, diags_out);
            match op {
                BinaryOp::Add => l.add(&r),
                BinaryOp::Sub => l.sub(&r),
                BinaryOp::Mul | BinaryOp::Div => {
                    let (Some(a), Some(b)) = (l.abs(), r.abs()) else {
                        if l.is_defined() && r.is_defined() {
                            diags_out.push(diags::a011("expression", *range));
                        }
                        return SymbolValue::Undefined;
                    };
                    SymbolValue::Absolute(match op {
                        BinaryOp::Mul => a.wrapping_mul(b),
                        // Division by zero yields zero.
                        _ if b == 0 => 0,
                        _ => a.wrapping_div(b),
                    })
                }
            }
        }
    }
}

fn evaluate_data_attr(
    attr: AttrKind,
    name: Id,
    _range: Range,
    ord: &OrdinaryContext,
    _diags: &mut Vec<Diagnostic>,
) -> SymbolValue {
    let sym = ord
        .get_symbol(name)
        .filter(|s| s.value.is_defined() || s.attrs.length.is_some())
        .or_else(|| ord.get_symbol_reference(name));
    match attr {
        AttrKind::Defined => SymbolValue::Absolute(sym.is_some() as i32),
        AttrKind::Length => match sym {
            Some(s) => SymbolValue::Absolute(s.attrs.length_or_default() as i32),
            None => SymbolValue::Undefined,
        },
        AttrKind::Scale => match sym {
            Some(s) => SymbolValue::Absolute(s.attrs.scale_or_default() as i32),
            None => SymbolValue::Undefined,
        },
        AttrKind::Integer => match sym {
            Some(s) => SymbolValue::Absolute(s.attrs.integer.unwrap_or(0) as i32),
            None => SymbolValue::Undefined,
        },
        AttrKind::Type => match sym {
            Some(s) => SymbolValue::Absolute(s.attrs.type_attr as i32),
            None => SymbolValue::Undefined,
        },
        _ => SymbolValue::Undefined,
    }
}

/// The absolute value of an expression, when it has one right now.
pub fn try_get_abs(
    expr: &MachExpr,
    ord: &OrdinaryContext,
    ectx: &EvalContext,
) -> Option<i32> {
    if !collect_deps(expr, ord, ectx).is_empty() {
        return None;
    }
    let mut sink = Vec::new();
    evaluate(expr, ord, ectx, &mut sink).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::symbol::SymbolAttributes;
    use hlasm_lang_core::{IdPool, Location};
    use hlasm_parser::expr::parse_mach_expr;
    use hlasm_parser::lexer::tokenize;

    fn parse(text: &str, ids: &mut IdPool) -> MachExpr {
        let lexemes = tokenize(text, 0, 0);
        let mut pos = 0;
        parse_mach_expr(&lexemes, &mut pos, ids).unwrap()
    }

    fn eval(text: &str, ord: &OrdinaryContext, ids: &mut IdPool) -> SymbolValue {
        let mut sink = Vec::new();
        evaluate(&parse(text, ids), ord, &EvalContext::default(), &mut sink)
    }

    #[test]
    fn test_constant_arithmetic() {
        let ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        assert_eq!(eval("2+3*4", &ord, &mut ids).abs(), Some(14));
        assert_eq!(eval("100/4", &ord, &mut ids).abs(), Some(25));
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        let ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        assert_eq!(eval("7/0", &ord, &mut ids).abs(), Some(0));
    }

    #[test]
    fn test_symbol_lookup() {
        let mut ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        let ten = ids.intern("TEN");
        ord.create_symbol(
            ten,
            SymbolValue::Absolute(10),
            SymbolAttributes::org(),
            Location::default(),
            Default::default(),
        );
        assert_eq!(eval("TEN*3", &ord, &mut ids).abs(), Some(30));
    }

    #[test]
    fn test_undefined_symbol_is_dependency() {
        let ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        let e = parse("MISSING+1", &mut ids);
        let deps = collect_deps(&e, &ord, &EvalContext::default());
        assert_eq!(deps.symbols, vec![ids.intern("MISSING")]);
        let mut sink = Vec::new();
        assert_eq!(
            evaluate(&e, &ord, &EvalContext::default(), &mut sink),
            SymbolValue::Undefined
        );
    }

    #[test]
    fn test_length_attr_default() {
        let mut ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        let x = ids.intern("X");
        ord.create_symbol(
            x,
            SymbolValue::Absolute(0),
            SymbolAttributes::new(crate::context::symbol::SymbolOrigin::DataDef, 'C', Some(8)),
            Location::default(),
            Default::default(),
        );
        assert_eq!(eval("L'X", &ord, &mut ids).abs(), Some(8));
    }

    #[test]
    fn test_defined_attr() {
        let mut ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        assert_eq!(eval("D'NOPE", &ord, &mut ids).abs(), Some(0));
        let x = ids.intern("YES");
        ord.create_symbol(
            x,
            SymbolValue::Absolute(0),
            SymbolAttributes::org(),
            Location::default(),
            Default::default(),
        );
        assert_eq!(eval("D'YES", &ord, &mut ids).abs(), Some(1));
    }

    #[test]
    fn test_loctr_reference() {
        let mut ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        ord.reserve_storage(8, hlasm_parser::data_def::Alignment::NONE);
        let ectx = EvalContext::at(ord.current_address());
        let e = parse("*+4", &mut ids);
        let mut sink = Vec::new();
        let v = evaluate(&e, &ord, &ectx, &mut sink);
        assert_eq!(v.reloc().unwrap().offset, 12);
    }

    #[test]
    fn test_try_get_abs() {
        let ord = OrdinaryContext::new();
        let mut ids = IdPool::new();
        let e = parse("2+2", &mut ids);
        assert_eq!(try_get_abs(&e, &ord, &EvalContext::default()), Some(4));
        let dep = parse("NOSUCH", &mut ids);
        assert_eq!(try_get_abs(&dep, &ord, &EvalContext::default()), None);
    }
}
