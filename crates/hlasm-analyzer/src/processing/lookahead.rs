//! Lookahead excursions.
//!
//! A lookahead scans forward through the current provider with ordinary
//! side effects inhibited, either to learn a symbol's attributes before its
//! definition point or to find a forward sequence-symbol target. On return
//! the provider position is restored (attribute lookahead) or kept
//! (a taken forward branch). Diagnostics produced along the way are
//! discarded.

use hlasm_lang_core::Id;
use hlasm_parser::data_def::DataDef;
use hlasm_parser::statement::{Label, Operand, ParsedFields};

use crate::context::symbol::{Symbol, SymbolAttributes, SymbolOrigin, SymbolValue};
use crate::context::HlasmContext;

/// What a lookahead excursion is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookaheadTarget {
    /// Attributes of an ordinary symbol.
    Attr(Id),
    /// A forward sequence symbol (AGO/AIF branch).
    Seq(Id),
}

/// An active excursion.
#[derive(Debug, Clone)]
pub struct LookaheadState {
    pub target: LookaheadTarget,
    /// Provider-stack depth when the excursion started.
    pub depth: usize,
    /// Position to restore in the top provider.
    pub return_position: usize,
}

/// Inspect a statement's label during lookahead; registers attribute
/// references for symbol definitions the scan passes. Returns true when
/// the statement defines `target`.
pub fn scan_statement(
    ctx: &mut HlasmContext,
    fields: &ParsedFields,
    target: LookaheadTarget,
) -> bool {
    match target {
        LookaheadTarget::Seq(seq) => {
            matches!(fields.label, Label::Sequence { name, .. } if name == seq)
        }
        LookaheadTarget::Attr(symbol) => {
            let Label::Ordinary { name, .. } = fields.label else {
                return false;
            };
            register_candidate(ctx, name, fields);
            name == symbol
        }
    }
}

/// Record an attribute-only symbol from a definition the excursion passed.
/// Real definitions later always win over these references.
fn register_candidate(ctx: &mut HlasmContext, name: Id, fields: &ParsedFields) {
    if ctx.ord.get_symbol(name).is_some() || ctx.ord.get_symbol_reference(name).is_some() {
        return;
    }

    let instr = match fields.instruction.id() {
        Some(i) => ctx.ids.text(i).to_string(),
        None => return,
    };

    let attrs = match instr.as_str() {
        "EQU" => {
            // Attribute operands may carry constants; the value itself is
            // not needed during lookahead.
            SymbolAttributes::new(SymbolOrigin::Equ, 'U', Some(1))
        }
        "DC" | "DS" | "DXD" => {
            let lexemes = hlasm_parser::lexer::tokenize(&fields.operand_text, 0, 0);
            let mut pos = 0;
            match hlasm_parser::data_def::parse_data_def(&lexemes, &mut pos, &mut ctx.ids) {
                Some(dd) => data_def_attrs(&dd),
                None => return,
            }
        }
        "CSECT" | "DSECT" | "RSECT" | "COM" | "LOCTR" | "START" => SymbolAttributes::section(),
        "CCW" | "CCW0" | "CCW1" => SymbolAttributes::ccw(),
        _ => return,
    };

    let location = ctx.current_location();
    let stack = ctx.snapshot();
    ctx.ord.add_symbol_reference(Symbol {
        name,
        value: SymbolValue::Undefined,
        attrs,
        location,
        stack,
    });
}

fn data_def_attrs(dd: &DataDef) -> SymbolAttributes {
    let mut attrs = SymbolAttributes::new(
        SymbolOrigin::DataDef,
        dd.type_attr(),
        dd.length_attr().map(|l| l as u16),
    );
    attrs.scale = dd.scale_attr();
    attrs
}

/// Extract the data definitions of an operand list (for tests and the
/// manager's richer scans).
pub fn data_defs(operands: &[Operand]) -> impl Iterator<Item = &DataDef> {
    operands.iter().filter_map(|o| match o {
        Operand::DataDef(dd) => Some(dd.as_ref()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AsmOptions;
    use hlasm_lang_core::{IdPool, ResourceLocation};
    use hlasm_parser::line::{extract_logical_line, IctlColumns};
    use hlasm_parser::split_fields;

    fn ctx() -> HlasmContext {
        HlasmContext::new(
            ResourceLocation::default(),
            AsmOptions::default(),
            IdPool::new(),
        )
    }

    fn fields(line: &str, ids: &mut IdPool) -> ParsedFields {
        let (ll, _) = extract_logical_line(&[line], 0, &IctlColumns::default()).unwrap();
        split_fields(&ll, ids)
    }

    #[test]
    fn test_attr_scan_registers_reference() {
        let mut c = ctx();
        let f = fields("FIELD    DS    CL8", &mut c.ids);
        let target = c.intern("OTHER");
        assert!(!scan_statement(&mut c, &f, LookaheadTarget::Attr(target)));
        let field = c.ids.find("FIELD").unwrap();
        let r = c.ord.get_symbol_reference(field).unwrap();
        assert_eq!(r.attrs.length, Some(8));
    }

    #[test]
    fn test_attr_scan_finds_target() {
        let mut c = ctx();
        let target = c.intern("FIELD");
        let f = fields("FIELD    DS    CL8", &mut c.ids);
        assert!(scan_statement(&mut c, &f, LookaheadTarget::Attr(target)));
    }

    #[test]
    fn test_seq_scan_matches_label() {
        let mut c = ctx();
        let target = c.intern("HERE");
        let f = fields(".HERE    ANOP", &mut c.ids);
        assert!(scan_statement(&mut c, &f, LookaheadTarget::Seq(target)));
        let other = c.intern("ELSEWHERE");
        assert!(!scan_statement(&mut c, &f, LookaheadTarget::Seq(other)));
    }

    #[test]
    fn test_real_definition_wins_over_reference() {
        let mut c = ctx();
        let f = fields("X        DS    F", &mut c.ids);
        let x_id = c.ids.find("X").unwrap();
        scan_statement(&mut c, &f, LookaheadTarget::Attr(x_id));
        // A later real definition is stored in the symbol table proper.
        let x = c.ids.find("X").unwrap();
        assert!(c.ord.get_symbol(x).is_none());
        assert!(c.ord.get_symbol_reference(x).is_some());
    }
}
