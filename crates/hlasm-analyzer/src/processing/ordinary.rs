//! The ordinary processor: assembler directives and machine instructions.
//!
//! Dispatches on the opcode through a fixed match, mutates the ordinary
//! context, and posts every statement to the dependency graph so later
//! symbol facts can finish what the statement could not. Directives that
//! affect the statement stream itself (COPY, AINSERT, ICTL, END) come back
//! to the manager as [`AsmAction`]s.

use hlasm_lang_core::{Diagnostic, Id, Range};
use hlasm_parser::data_def::{parse_data_def, Alignment, DataDef, Modifier};
use hlasm_parser::expr::{MachExpr, MachExprVisitor};
use hlasm_parser::lexer::tokenize;
use hlasm_parser::line::IctlColumns;
use hlasm_parser::statement::{Label, Operand, ResolvedStatement};

use crate::context::dependency::{AddResult, DataLenItem, PendingAttr, SpaceResolver};
use crate::context::section::{SectionKind, SpaceKind};
use crate::context::symbol::{SymbolAttributes, SymbolOrigin, SymbolValue};
use crate::context::HlasmContext;
use crate::diags;
use crate::expression::{collect_deps, evaluate, try_get_abs, EvalContext};
use crate::lsp::{LspIndex, OccurrenceKind};
use crate::processing::providers::AinsertDestination;

/// MNOTE message limit in bytes.
const MNOTE_MAX_MESSAGE: usize = 1020;
/// MNOTE combined operand limit.
const MNOTE_MAX_OPERANDS: usize = 1024;
/// AINSERT record limit.
const AINSERT_MAX_RECORD: usize = 80;

/// Stream-affecting outcomes the manager executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmAction {
    None,
    /// COPY needs a member; the manager checks the cache or fetches.
    Copy {
        member: Id,
        operand_range: Range,
        stmt_range: Range,
    },
    /// AINSERT queues a record on the open-code provider.
    Ainsert {
        record: String,
        dest: AinsertDestination,
    },
    /// ICTL reconfigures the open-code columns.
    Ictl(IctlColumns),
    /// END terminates the assembly.
    End,
}

/// The ordinary processor. Borrows the context for one statement.
pub struct AsmProcessor<'a> {
    pub ctx: &'a mut HlasmContext,
    pub diags: &'a mut Vec<Diagnostic>,
    pub lsp: &'a mut LspIndex,
}

impl<'a> AsmProcessor<'a> {
    pub fn new(
        ctx: &'a mut HlasmContext,
        diags: &'a mut Vec<Diagnostic>,
        lsp: &'a mut LspIndex,
    ) -> Self {
        Self { ctx, diags, lsp }
    }

    /// Process one assembler statement. `opcode` is the resolved base name.
    pub fn process(&mut self, opcode: Id, stmt: &ResolvedStatement) -> AsmAction {
        self.register_literals(stmt);

        let name = self.ctx.ids.text(opcode).to_string();
        let action = match name.as_str() {
            "CSECT" => self.process_sect(SectionKind::Executable, stmt),
            "RSECT" => self.process_sect(SectionKind::ReadOnly, stmt),
            "COM" => self.process_sect(SectionKind::Common, stmt),
            "DSECT" => self.process_sect(SectionKind::Dummy, stmt),
            "LOCTR" => self.process_loctr(stmt),
            "EQU" => self.process_equ(stmt),
            "DC" | "DS" | "DXD" => self.process_data(stmt),
            "COPY" => return self.process_copy(stmt),
            "EXTRN" => self.process_external(stmt, SectionKind::External),
            "WXTRN" => self.process_external(stmt, SectionKind::WeakExternal),
            "ORG" => self.process_org(stmt),
            "OPSYN" => self.process_opsyn(stmt),
            "AINSERT" => return self.process_ainsert(stmt),
            "CCW" | "CCW0" | "CCW1" => self.process_ccw(stmt),
            "CNOP" => self.process_cnop(stmt),
            "START" => self.process_start(stmt),
            "ALIAS" => self.process_alias(stmt),
            "END" => return self.process_end(stmt),
            "LTORG" => self.process_ltorg(stmt),
            "USING" => self.process_using(stmt),
            "DROP" => self.process_drop(stmt),
            "PUSH" => self.process_push(stmt),
            "POP" => self.process_pop(stmt),
            "MNOTE" => self.process_mnote(stmt),
            "CXD" => self.process_cxd(stmt),
            "TITLE" => self.process_title(stmt),
            "SPACE" => self.process_space(stmt),
            "ICTL" => return self.process_ictl(stmt),
            // EJECT, PRINT, AMODE, RMODE, ENTRY, PUNCH: listing/object
            // concerns with no semantic effect here.
            _ => self.postpone_only(stmt),
        };
        self.solve();
        action
    }

    /// Process a machine instruction of a known encoded length.
    pub fn process_machine(&mut self, length: u32, stmt: &ResolvedStatement) {
        self.register_literals(stmt);
        let (addr, _) = self.ctx.ord.align(Alignment::HALFWORD);

        if let Some(label) = stmt.label.ordinary() {
            self.create_symbol(
                label,
                SymbolValue::Reloc(addr),
                SymbolAttributes::machine(length as u16),
                stmt.label.range().unwrap_or(stmt.range),
            );
        }
        self.ctx.ord.reserve_storage(length, Alignment::NONE);

        let exprs: Vec<&MachExpr> = stmt.operands.iter().filter_map(|o| o.expr()).collect();
        let ectx = self.ectx();
        self.ctx
            .deps
            .add_postponed_statement(&exprs, ectx, stmt.range, &self.ctx.ord);
        self.record_expr_references(stmt);
        self.solve();
    }

    // -- helpers ------------------------------------------------------------

    fn resource(&self) -> hlasm_lang_core::ResourceLocation {
        self.ctx.current_location().resource
    }

    fn diag(&mut self, d: Diagnostic) {
        let resource = self.resource();
        self.diags.push(d.with_resource(resource));
    }

    fn ectx(&mut self) -> EvalContext {
        EvalContext::at(self.ctx.ord.current_address())
    }

    fn solve(&mut self) {
        let ctx = &mut *self.ctx;
        ctx.deps.resolve(&mut ctx.ord, self.diags);
    }

    fn find_label(&self, stmt: &ResolvedStatement) -> Id {
        stmt.label.ordinary().unwrap_or(Id::EMPTY)
    }

    fn label_range(&self, stmt: &ResolvedStatement) -> Range {
        stmt.label.range().unwrap_or(stmt.range)
    }

    /// Create a symbol; E031 when the name is taken.
    fn create_symbol(
        &mut self,
        name: Id,
        value: SymbolValue,
        attrs: SymbolAttributes,
        range: Range,
    ) -> bool {
        let location = self.ctx.current_location();
        let stack = self.ctx.snapshot();
        if self.ctx.ord.create_symbol(name, value, attrs, location, stack) {
            self.ctx.metrics.defined_symbols += 1;
            let resource = self.resource();
            self.lsp
                .add(OccurrenceKind::OrdinarySymbol, name, range, resource, true);
            true
        } else {
            self.diag(diags::e031("symbol", range));
            false
        }
    }

    /// Record ordinary-symbol references of every operand expression.
    fn record_expr_references(&mut self, stmt: &ResolvedStatement) {
        struct Refs<'b> {
            lsp: &'b mut LspIndex,
            resource: hlasm_lang_core::ResourceLocation,
        }
        impl MachExprVisitor for Refs<'_> {
            fn visit_symbol(&mut self, name: Id, range: Range) {
                self.lsp.add(
                    OccurrenceKind::OrdinarySymbol,
                    name,
                    range,
                    self.resource.clone(),
                    false,
                );
            }
            fn visit_data_attr(
                &mut self,
                _attr: hlasm_parser::lexer::AttrKind,
                name: Id,
                range: Range,
            ) {
                self.lsp.add(
                    OccurrenceKind::OrdinarySymbol,
                    name,
                    range,
                    self.resource.clone(),
                    false,
                );
            }
        }
        let resource = self.resource();
        let mut refs = Refs {
            lsp: self.lsp,
            resource,
        };
        for op in &stmt.operands {
            if let Some(e) = op.expr() {
                e.apply(&mut refs);
            }
        }
    }

    /// Register every literal the statement mentions.
    fn register_literals(&mut self, stmt: &ResolvedStatement) {
        for text in &stmt.literals {
            let lexemes = tokenize(text, 0, 0);
            let mut pos = 0;
            let (length, alignment) = match parse_data_def(&lexemes, &mut pos, &mut self.ctx.ids) {
                Some(dd) => (
                    dd.item_length().unwrap_or(1) * dd.nominal_count(),
                    dd.alignment(),
                ),
                None => (1, Alignment::NONE),
            };
            self.ctx.ord.literals.register(text, length, alignment);
        }
    }

    /// Post the statement with its expression dependencies and nothing
    /// else.
    fn postpone_only(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let exprs: Vec<&MachExpr> = stmt.operands.iter().filter_map(|o| o.expr()).collect();
        let ectx = self.ectx();
        self.ctx
            .deps
            .add_postponed_statement(&exprs, ectx, stmt.range, &self.ctx.ord);
        self.record_expr_references(stmt);
        AsmAction::None
    }

    // -- sections -----------------------------------------------------------

    fn process_sect(&mut self, kind: SectionKind, stmt: &ResolvedStatement) -> AsmAction {
        let name = self.find_label(stmt);

        let conflict = if !name.is_empty() {
            self.ctx.ord.symbol_defined(name) && !self.ctx.ord.section_defined(name, kind)
        } else {
            kind != SectionKind::Dummy && self.ctx.ord.other_private_section_exists(kind)
        };

        if conflict {
            self.diag(diags::e031("symbol", self.label_range(stmt)));
        } else {
            let mut location = self.ctx.current_location();
            location.pos.column = 0;
            let stack = self.ctx.snapshot();
            let fresh = !self.ctx.ord.section_defined(name, kind);
            self.ctx.ord.set_section(name, kind, location, stack);
            if fresh && !name.is_empty() {
                self.ctx.metrics.defined_symbols += 1;
                let resource = self.resource();
                let range = self.label_range(stmt);
                self.lsp
                    .add(OccurrenceKind::OrdinarySymbol, name, range, resource, true);
            }
        }
        self.postpone_only(stmt)
    }

    fn process_loctr(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let name = self.find_label(stmt);
        if name.is_empty() {
            self.diag(diags::e053(self.label_range(stmt)));
            return AsmAction::None;
        }
        if self.ctx.ord.symbol_defined(name) && !self.ctx.ord.counter_defined(name) {
            self.diag(diags::e031("symbol", self.label_range(stmt)));
        } else {
            let mut location = self.ctx.current_location();
            location.pos.column = 0;
            let stack = self.ctx.snapshot();
            let fresh = !self.ctx.ord.counter_defined(name);
            self.ctx.ord.set_location_counter(name, location, stack);
            if fresh {
                self.ctx.metrics.defined_symbols += 1;
                let resource = self.resource();
                let range = self.label_range(stmt);
                self.lsp
                    .add(OccurrenceKind::OrdinarySymbol, name, range, resource, true);
            }
        }
        self.postpone_only(stmt)
    }

    // -- EQU ----------------------------------------------------------------

    fn process_equ(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::NONE);
        let ectx = EvalContext::at(loctr);

        let name = self.find_label(stmt);
        if name.is_empty() {
            if matches!(stmt.label, Label::Empty) {
                self.diag(diags::e053(self.label_range(stmt)));
            }
            return AsmAction::None;
        }
        if self.ctx.ord.symbol_defined(name) {
            self.diag(diags::e031("symbol", self.label_range(stmt)));
            return AsmAction::None;
        }

        let ops = &stmt.operands;
        if ops.is_empty() || ops.len() > 5 {
            self.diag(diags::a012_from_to("EQU", 1, 5, stmt.range));
            return AsmAction::None;
        }

        // Type attribute operand.
        let mut type_attr: Option<u8> = None;
        if let Some(op) = ops.get(2) {
            if !op.is_empty() {
                match op.expr().and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx)) {
                    Some(v) if (0..=255).contains(&v) => type_attr = Some(v as u8),
                    _ => self.diag(diags::a134_equ_type(op.range())),
                }
            }
        }

        // Length attribute operand.
        let mut length_attr: Option<u16> = None;
        if let Some(op) = ops.get(1) {
            if !op.is_empty() {
                match op.expr().and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx)) {
                    Some(v) if (0..=65535).contains(&v) => length_attr = Some(v as u16),
                    _ => self.diag(diags::a133_equ_length(op.range())),
                }
            }
        }

        // Value operand.
        let Some(expr) = ops[0].expr().cloned() else {
            self.diag(diags::a132_equ_value(ops[0].range()));
            return AsmAction::None;
        };

        // Default length: the leftmost term's symbol, else 1.
        if length_attr.is_none() {
            length_attr = Some(match expr.leftmost_term().as_symbol() {
                Some(term) => match self.ctx.ord.get_symbol(term) {
                    Some(s) if s.value.is_defined() => s.attrs.length_or_default(),
                    _ => 1,
                },
                None => 1,
            });
        }

        let mut attrs = SymbolAttributes::new(SymbolOrigin::Equ, 'U', length_attr);
        if let Some(t) = type_attr {
            attrs.type_attr = t;
        }

        let deps = collect_deps(&expr, &self.ctx.ord, &ectx);
        let range = self.label_range(stmt);
        if deps.is_empty() {
            let value = evaluate(&expr, &self.ctx.ord, &ectx, self.diags);
            self.create_symbol(name, value, attrs, range);
        } else if self.create_symbol(name, SymbolValue::Undefined, attrs, range) {
            let r = self
                .ctx
                .deps
                .add_symbol_dependency(name, expr, ectx, stmt.range, &self.ctx.ord);
            if r == AddResult::Cycle {
                self.diag(diags::e033(stmt.range));
            }
        }
        self.record_expr_references(stmt);
        AsmAction::None
    }

    // -- DC / DS ------------------------------------------------------------

    fn process_data(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let data_ops: Vec<&DataDef> = stmt
            .operands
            .iter()
            .filter_map(|o| match o {
                Operand::DataDef(dd) => Some(dd.as_ref()),
                _ => None,
            })
            .collect();

        if data_ops.is_empty() || stmt.operands.iter().any(|o| o.is_empty()) {
            return self.postpone_only(stmt);
        }

        // First operand's alignment governs the label.
        let (loctr, _) = self.ctx.ord.align(data_ops[0].alignment());
        let ectx = EvalContext::at(loctr.clone());

        // Label handling with the self-reference length path: the symbol is
        // created first (length 1 when self-referring), then the attribute
        // is re-substituted once the remaining inputs arrive.
        let label = self.find_label(stmt);
        let mut self_ref_len: Option<MachExpr> = None;
        if !label.is_empty() {
            if self.ctx.ord.symbol_defined(label) {
                self.diag(diags::e031("symbol", self.label_range(stmt)));
            } else {
                let first = data_ops[0];
                let mut attrs = SymbolAttributes::new(
                    SymbolOrigin::DataDef,
                    first.type_attr(),
                    first.length_attr().map(|l| l as u16),
                );
                attrs.scale = first.scale_attr();

                if let Some(Modifier::Expr(len_expr)) = &first.length {
                    let len_deps = collect_deps(len_expr, &self.ctx.ord, &ectx);
                    if len_deps.symbols.contains(&label) {
                        self_ref_len = Some(len_expr.clone());
                        attrs.length = Some(1);
                    }
                }

                let range = self.label_range(stmt);
                self.create_symbol(label, SymbolValue::Reloc(loctr), attrs, range);

                if let Some(len_expr) = self_ref_len.clone() {
                    self.ctx.deps.add_attr_dependency(
                        label,
                        PendingAttr::Length,
                        len_expr,
                        ectx.clone(),
                        stmt.range,
                        &self.ctx.ord,
                    );
                }
            }
        }

        // Walk operands in alignment-monotonic chunks.
        let mut i = 0;
        while i < data_ops.len() {
            let chunk_start = i;
            let initial = data_ops[i].alignment();
            let (op_loctr, _) = self.ctx.ord.align(initial);
            let op_ectx = EvalContext::at(op_loctr);
            let mut current = initial;
            let mut has_length_deps = false;

            while i < data_ops.len() {
                let op = data_ops[i];
                let align = op.alignment();
                if align.boundary > current.boundary {
                    break;
                }
                current = align;
                has_length_deps |= self.data_op_has_deps(op, &op_ectx);
                i += 1;
            }

            let chunk = &data_ops[chunk_start..i];
            if has_length_deps {
                let items: Vec<DataLenItem> = chunk.iter().map(|op| self.len_item(op)).collect();
                let space = self.ctx.ord.register_current_space(SpaceKind::DataLength);
                self.ctx.deps.add_space_dependency(
                    space,
                    SpaceResolver::DataChunk { items },
                    op_ectx.clone(),
                    stmt.range,
                    &self.ctx.ord,
                );
            } else {
                let mut total = 0u32;
                for op in chunk {
                    total += self.data_op_length(op, &op_ectx);
                }
                self.ctx.ord.reserve_storage(total, Alignment::NONE);
            }
        }

        self.record_expr_references(stmt);
        self.postpone_only(stmt)
    }

    fn data_op_has_deps(&self, op: &DataDef, ectx: &EvalContext) -> bool {
        let dep = |m: &Option<Modifier>| match m {
            Some(Modifier::Expr(e)) => !collect_deps(e, &self.ctx.ord, ectx).is_empty(),
            _ => false,
        };
        dep(&op.dupl) || dep(&op.length)
    }

    fn len_item(&self, op: &DataDef) -> DataLenItem {
        let (dupl, dupl_const) = match &op.dupl {
            Some(Modifier::Expr(e)) => (Some(e.clone()), 0),
            Some(Modifier::Value(v, _)) => (None, *v),
            None => (None, 1),
        };
        let (len, len_const) = match &op.length {
            Some(Modifier::Expr(e)) => (Some(e.clone()), 0),
            _ => (None, op.item_length().unwrap_or(1)),
        };
        DataLenItem {
            dupl,
            dupl_const,
            len,
            len_const,
            count: op.nominal_count(),
        }
    }

    fn data_op_length(&mut self, op: &DataDef, ectx: &EvalContext) -> u32 {
        let dupl = match &op.dupl {
            Some(Modifier::Expr(e)) => try_get_abs(e, &self.ctx.ord, ectx).unwrap_or(0),
            Some(Modifier::Value(v, _)) => *v,
            None => 1,
        };
        let item = match &op.length {
            Some(Modifier::Expr(e)) => try_get_abs(e, &self.ctx.ord, ectx).unwrap_or(0) as u32,
            _ => op.item_length().unwrap_or(1),
        };
        (dupl.max(0) as u32)
            .saturating_mul(op.nominal_count())
            .saturating_mul(item)
    }

    // -- COPY ---------------------------------------------------------------

    fn process_copy(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let single_symbol = match stmt.operands.as_slice() {
            [op] => op.expr().and_then(|e| e.as_symbol()),
            _ => None,
        };
        match single_symbol {
            Some(member) => {
                let resource = self.resource();
                self.lsp.add(
                    OccurrenceKind::CopyMember,
                    member,
                    stmt.operands[0].range(),
                    resource,
                    false,
                );
                AsmAction::Copy {
                    member,
                    operand_range: stmt.operands[0].range(),
                    stmt_range: stmt.range,
                }
            }
            None => {
                self.diag(diags::e058(stmt.operand_range));
                AsmAction::None
            }
        }
    }

    // -- EXTRN / WXTRN ------------------------------------------------------

    fn process_external(&mut self, stmt: &ResolvedStatement, kind: SectionKind) -> AsmAction {
        if !matches!(stmt.label, Label::Empty | Label::Sequence { .. }) {
            self.diag(diags::a249_sequence_symbol_expected(self.label_range(stmt)));
        }

        let mut names: Vec<(Id, Range)> = Vec::new();
        let mut bad = false;
        for op in &stmt.operands {
            match op {
                Operand::Expr(e) => match e.as_symbol() {
                    Some(sym) => names.push((sym, e.range())),
                    None => bad = true,
                },
                Operand::Complex { name, args, range } => {
                    if name.eq_ignore_ascii_case("PART") {
                        for arg in args {
                            let id = self.ctx.ids.intern(arg);
                            names.push((id, *range));
                        }
                    } else {
                        bad = true;
                    }
                }
                Operand::Empty(_) => {}
                _ => bad = true,
            }
        }
        if bad {
            self.diag(diags::a129_extrn_format(stmt.operand_range));
        }

        for (name, range) in names {
            if self.ctx.ord.symbol_defined(name) {
                self.diag(diags::e031("external symbol", range));
            } else {
                let location = self.ctx.current_location();
                let stack = self.ctx.snapshot();
                self.ctx
                    .ord
                    .create_external_section(name, kind, location, stack);
                self.ctx.metrics.defined_symbols += 1;
                let resource = self.resource();
                self.lsp
                    .add(OccurrenceKind::OrdinarySymbol, name, range, resource, true);
            }
        }
        self.postpone_only(stmt)
    }

    // -- ORG ----------------------------------------------------------------

    fn process_org(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::NONE);
        let ectx = EvalContext::at(loctr.clone());

        if let Some(label) = stmt.label.ordinary() {
            if self.ctx.ord.symbol_defined(label) {
                self.diag(diags::e031("symbol", self.label_range(stmt)));
            } else {
                let range = self.label_range(stmt);
                self.create_symbol(
                    label,
                    SymbolValue::Reloc(loctr.clone()),
                    SymbolAttributes::org(),
                    range,
                );
            }
        }

        let ops = &stmt.operands;
        if ops.is_empty() || ops.iter().all(|o| o.is_empty()) {
            self.ctx.ord.set_available_counter_value();
            return AsmAction::None;
        }

        // Operand triple: target, boundary, offset.
        let Some(target) = ops[0].expr().cloned() else {
            self.diag(diags::a245_org_expression(stmt.range));
            return AsmAction::None;
        };

        let mut boundary = 0u32;
        if let Some(op) = ops.get(1) {
            if !op.is_empty() {
                let Some(e) = op.expr() else {
                    self.diag(diags::a115_org_format(stmt.range));
                    return AsmAction::None;
                };
                match try_get_abs(e, &self.ctx.ord, &ectx) {
                    Some(v) if (2..=4096).contains(&v) && (v & (v - 1)) == 0 => {
                        boundary = v as u32;
                    }
                    _ => {
                        self.diag(diags::a116_org_boundary(stmt.range));
                        return AsmAction::None;
                    }
                }
            }
        }
        let mut offset = 0i32;
        if let Some(op) = ops.get(2) {
            if !op.is_empty() {
                match op.expr().and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx)) {
                    Some(v) => offset = v,
                    None => {
                        self.diag(diags::a115_org_format(stmt.range));
                        return AsmAction::None;
                    }
                }
            }
        }

        let deps = collect_deps(&target, &self.ctx.ord, &ectx);
        if deps.is_empty() {
            let value = evaluate(&target, &self.ctx.ord, &ectx, self.diags);
            let current_section = self.ctx.ord.current_section().map(|s| s.id);
            match value {
                SymbolValue::Reloc(addr)
                    if !addr.has_spaces() && addr.simple_base() == current_section =>
                {
                    let mut goal = addr.offset + offset;
                    if boundary > 1 {
                        let rem = goal.rem_euclid(boundary as i32);
                        if rem != 0 {
                            goal += boundary as i32 - rem;
                        }
                    }
                    if goal < 0 || !self.ctx.ord.set_counter_to(goal) {
                        self.diag(diags::e068(stmt.range));
                    }
                }
                _ => {
                    self.diag(diags::a115_org_format(stmt.range));
                }
            }
        } else {
            let space = self.ctx.ord.register_current_space(SpaceKind::OrgTarget);
            self.ctx.deps.add_space_dependency(
                space,
                SpaceResolver::OrgTarget {
                    expr: target,
                    boundary,
                    offset,
                },
                ectx,
                stmt.range,
                &self.ctx.ord,
            );
        }
        self.record_expr_references(stmt);
        AsmAction::None
    }

    // -- OPSYN --------------------------------------------------------------

    fn process_opsyn(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let label = self.find_label(stmt);
        if label.is_empty() {
            if matches!(stmt.label, Label::Empty) {
                self.diag(diags::e053(self.label_range(stmt)));
            }
            return AsmAction::None;
        }

        let operand = match stmt.operands.as_slice() {
            [op] if !op.is_empty() => op.expr().and_then(|e| e.as_symbol()),
            _ => None,
        };

        match operand {
            None => {
                if self.ctx.get_opcode(label).is_some() {
                    self.ctx.remove_mnemonic(label);
                } else {
                    let text = self.ctx.ids.text(label).to_string();
                    self.diag(diags::e049(&text, self.label_range(stmt)));
                }
            }
            Some(target) => {
                if self.ctx.get_opcode(target).is_some() {
                    self.ctx.add_mnemonic(label, target);
                } else {
                    self.diag(diags::a246_opsyn_operand(stmt.operands[0].range()));
                }
            }
        }
        self.postpone_only(stmt)
    }

    // -- AINSERT ------------------------------------------------------------

    fn process_ainsert(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let ops = &stmt.operands;
        if ops.len() != 2 {
            self.diag(diags::a011_exact("AINSERT", 2, stmt.operand_range));
            return AsmAction::None;
        }

        let dest = match ops[1].expr().and_then(|e| e.as_symbol()) {
            Some(id) => match self.ctx.ids.text(id) {
                "FRONT" => AinsertDestination::Front,
                "BACK" => AinsertDestination::Back,
                _ => {
                    self.diag(diags::a156_ainsert_destination(ops[1].range()));
                    return AsmAction::None;
                }
            },
            None => {
                self.diag(diags::a156_ainsert_destination(ops[1].range()));
                return AsmAction::None;
            }
        };

        match &ops[0] {
            Operand::String(record, range) => {
                if record.is_empty() {
                    self.diag(diags::a021_cannot_be_empty("AINSERT", *range));
                } else if record.chars().count() > AINSERT_MAX_RECORD {
                    self.diag(diags::a157_ainsert_record(*range));
                } else {
                    return AsmAction::Ainsert {
                        record: record.clone(),
                        dest,
                    };
                }
            }
            op => {
                self.diag(diags::a301_apostrophes("AINSERT", op.range()));
            }
        }
        AsmAction::None
    }

    // -- storage directives -------------------------------------------------

    fn process_ccw(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::DOUBLEWORD);
        if let Some(label) = stmt.label.ordinary() {
            let range = self.label_range(stmt);
            if self.ctx.ord.symbol_defined(label) {
                self.diag(diags::e031("symbol", range));
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Reloc(loctr),
                    SymbolAttributes::ccw(),
                    range,
                );
            }
        }
        self.ctx.ord.reserve_storage(8, Alignment::NONE);
        self.postpone_only(stmt)
    }

    fn process_cnop(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::HALFWORD);
        let ectx = EvalContext::at(loctr.clone());
        if let Some(label) = stmt.label.ordinary() {
            let range = self.label_range(stmt);
            if self.ctx.ord.symbol_defined(label) {
                self.diag(diags::e031("symbol", range));
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Reloc(loctr),
                    SymbolAttributes::cnop(),
                    range,
                );
            }
        }

        if stmt.operands.len() == 2 {
            let byte = stmt.operands[0]
                .expr()
                .and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx));
            let boundary = stmt.operands[1]
                .expr()
                .and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx));
            // Operands with dependencies leave only the label behind.
            if let (Some(byte), Some(boundary)) = (byte, boundary) {
                if byte >= 0
                    && boundary > 0
                    && (boundary & (boundary - 1)) == 0
                    && byte < boundary
                    && byte % 2 == 0
                {
                    self.ctx.ord.align(Alignment {
                        boundary: boundary as u32,
                    });
                    self.ctx.ord.reserve_storage(byte as u32, Alignment::NONE);
                }
            }
        }
        self.postpone_only(stmt)
    }

    fn process_cxd(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::FULLWORD);
        if let Some(label) = stmt.label.ordinary() {
            let range = self.label_range(stmt);
            if !self.ctx.ord.symbol_defined(label) {
                self.create_symbol(
                    label,
                    SymbolValue::Reloc(loctr),
                    SymbolAttributes::cxd(),
                    range,
                );
            } else {
                self.diag(diags::e031("symbol", range));
            }
        }
        self.ctx.ord.reserve_storage(4, Alignment::NONE);
        AsmAction::None
    }

    // -- START / END --------------------------------------------------------

    fn process_start(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let name = self.find_label(stmt);

        let blocked = self.ctx.ord.sections.iter().any(|s| {
            matches!(s.kind, SectionKind::Executable | SectionKind::ReadOnly)
        });
        if blocked {
            self.diag(diags::e073(stmt.range));
            return AsmAction::None;
        }
        if self.ctx.ord.symbol_defined(name) {
            self.diag(diags::e031("symbol", self.label_range(stmt)));
            return AsmAction::None;
        }

        let mut location = self.ctx.current_location();
        location.pos.column = 0;
        let stack = self.ctx.snapshot();
        self.ctx
            .ord
            .set_section(name, SectionKind::Executable, location, stack);
        if !name.is_empty() {
            self.ctx.metrics.defined_symbols += 1;
            let resource = self.resource();
            let range = self.label_range(stmt);
            self.lsp
                .add(OccurrenceKind::OrdinarySymbol, name, range, resource, true);
        }

        let ops = &stmt.operands;
        if ops.len() != 1 {
            return self.postpone_only(stmt);
        }
        let ectx = self.ectx();
        let Some(initial) = ops[0].expr().and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx))
        else {
            self.diag(diags::a250_absolute_expected(ops[0].range()));
            return AsmAction::None;
        };

        // Round the initial offset up to the section alignment.
        let mask = self.ctx.options.sectalgn.max(1) - 1;
        let offset = ((initial.max(0) as u32) + mask) & !mask;
        self.ctx.ord.reserve_storage(offset, Alignment::NONE);
        AsmAction::None
    }

    fn process_end(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        if !matches!(stmt.label, Label::Empty | Label::Sequence { .. }) {
            self.diag(diags::a249_sequence_symbol_expected(self.label_range(stmt)));
        }
        if let Some(op) = stmt.operands.first() {
            if let Some(e) = op.expr() {
                let ectx = self.ectx();
                let mut sink = Vec::new();
                if let Some(v) = evaluate(e, &self.ctx.ord, &ectx, &mut sink).abs() {
                    self.diag(diags::e032(&v.to_string(), stmt.operand_range));
                }
            }
        }
        self.ctx.end_reached();
        AsmAction::End
    }

    // -- LTORG --------------------------------------------------------------

    fn process_ltorg(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::DOUBLEWORD);
        if let Some(label) = stmt.label.ordinary() {
            let range = self.label_range(stmt);
            if self.ctx.ord.symbol_defined(label) {
                self.diag(diags::e031("symbol", range));
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Reloc(loctr),
                    SymbolAttributes::new(SymbolOrigin::Equ, 'U', Some(1)),
                    range,
                );
            }
        }

        // Flush the pool: largest alignment first.
        for idx in self.ctx.ord.literals.pending() {
            let (length, alignment) = {
                let lit = self.ctx.ord.literals.get(idx);
                (lit.length, lit.alignment)
            };
            self.ctx.ord.reserve_storage(length, alignment);
            self.ctx.ord.literals.mark_defined(idx);
        }
        self.ctx.ord.literals.next_generation();
        self.postpone_only(stmt)
    }

    // -- USING / DROP / PUSH / POP ------------------------------------------

    fn process_using(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::NONE);
        let ectx = EvalContext::at(loctr);

        let label = self.find_label(stmt);
        if !label.is_empty() {
            if !self.ctx.ord.symbol_defined(label) {
                self.ctx.ord.register_using_label(label);
            } else if !self.ctx.ord.is_using_label(label) {
                self.diag(diags::e031("symbol", self.label_range(stmt)));
                return AsmAction::None;
            }
        }

        let ops = &stmt.operands;
        if ops.len() < 2 || ops.len() > 17 {
            self.diag(diags::a012_from_to("USING", 2, 17, stmt.operand_range));
            return AsmAction::None;
        }

        let (base_expr, end_expr) = match &ops[0] {
            Operand::Expr(e) => (e.clone(), None),
            Operand::BaseEnd { base, end, .. } => (base.clone(), Some(end.clone())),
            op => {
                self.diag(diags::a104_using_first(op.range()));
                return AsmAction::None;
            }
        };

        let mut regs = Vec::new();
        for op in &ops[1..] {
            let Some(e) = op.expr() else {
                self.diag(diags::a164_using_mapping(op.range()));
                return AsmAction::None;
            };
            regs.push(try_get_abs(e, &self.ctx.ord, &ectx).unwrap_or(0));
        }

        let base = evaluate(&base_expr, &self.ctx.ord, &ectx, self.diags);
        let end = end_expr.map(|e| evaluate(&e, &self.ctx.ord, &ectx, self.diags));
        self.ctx.usings.add(crate::context::using::UsingEntry {
            label: (!label.is_empty()).then_some(label),
            base,
            end,
            regs,
        });
        self.record_expr_references(stmt);
        self.postpone_only(stmt)
    }

    fn process_drop(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let (loctr, _) = self.ctx.ord.align(Alignment::NONE);
        let ectx = EvalContext::at(loctr.clone());

        if let Some(label) = stmt.label.ordinary() {
            let range = self.label_range(stmt);
            if self.ctx.ord.symbol_defined(label) {
                self.diag(diags::e031("symbol", range));
            } else {
                self.diag(diags::a251_unexpected_label(range));
                self.create_symbol(
                    label,
                    SymbolValue::Reloc(loctr),
                    SymbolAttributes::new(SymbolOrigin::Equ, 'U', Some(1)),
                    range,
                );
            }
        }

        let mut regs = Vec::new();
        let mut labels = Vec::new();
        for op in &stmt.operands {
            if op.is_empty() {
                continue;
            }
            match op.expr() {
                Some(e) => {
                    if let Some(sym) = e.as_symbol() {
                        if self.ctx.ord.is_using_label(sym) {
                            labels.push(sym);
                            continue;
                        }
                    }
                    match try_get_abs(e, &self.ctx.ord, &ectx) {
                        Some(r) => regs.push(r),
                        None => self.diag(diags::a141_drop_format(op.range())),
                    }
                }
                None => self.diag(diags::a141_drop_format(op.range())),
            }
        }
        self.ctx.usings.remove(&regs, &labels);
        self.postpone_only(stmt)
    }

    fn operand_names_using(&self, stmt: &ResolvedStatement) -> bool {
        stmt.operands.iter().any(|op| {
            op.expr()
                .and_then(|e| e.as_symbol())
                .is_some_and(|id| self.ctx.ids.text(id) == "USING")
        })
    }

    fn process_push(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        if self.operand_names_using(stmt) {
            self.ctx.usings.push();
        }
        self.postpone_only(stmt)
    }

    fn process_pop(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        if self.operand_names_using(stmt) && !self.ctx.usings.pop() {
            self.diag(diags::a165_pop_using(stmt.range));
        }
        self.postpone_only(stmt)
    }

    // -- MNOTE / TITLE / SPACE / ALIAS / ICTL -------------------------------

    fn process_mnote(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let ops = &stmt.operands;
        let ectx = self.ectx();

        let (level, first_len): (Option<i32>, usize) = match ops.len() {
            1 => (Some(0), 0),
            2 => match &ops[0] {
                Operand::Empty(_) => (Some(1), 0),
                op => match op.expr() {
                    Some(MachExpr::LocCtr { .. }) => (Some(0), 1),
                    Some(e) => {
                        let text_len = match e {
                            MachExpr::Constant { value, .. } => value.to_string().len(),
                            _ => 1,
                        };
                        (try_get_abs(e, &self.ctx.ord, &ectx), text_len)
                    }
                    None => (None, 0),
                },
            },
            _ => {
                self.diag(diags::a012_from_to("MNOTE", 1, 2, stmt.operand_range));
                return AsmAction::None;
            }
        };

        let Some(level) = level.filter(|l| (0..=255).contains(l)) else {
            self.diag(diags::a119_mnote_level(ops[0].range()));
            return AsmAction::None;
        };

        let last = ops.last().expect("MNOTE has at least one operand");
        let mut text = match last {
            Operand::String(s, _) => s.clone(),
            op => {
                self.diag(diags::a300_apostrophes("MNOTE", op.range()));
                match op.expr() {
                    Some(MachExpr::Symbol { name, .. }) => self.ctx.ids.text(*name).to_string(),
                    _ => String::new(),
                }
            }
        };

        let r = last.range();
        if text.len() > MNOTE_MAX_MESSAGE {
            self.diag(diags::a117_mnote_message(r));
            text.truncate(MNOTE_MAX_MESSAGE);
        } else if text.len() + first_len > MNOTE_MAX_OPERANDS {
            self.diag(diags::a118_mnote_operands(r));
        }

        self.diag(diags::mnote(level as u32, &text, r));
        self.ctx.update_mnote_max(level as u32);
        AsmAction::None
    }

    fn process_title(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let name = match &stmt.label {
            Label::Ordinary { name, .. } => Some(self.ctx.ids.text(*name).to_string()),
            Label::Text(text, _) => Some(text.clone()),
            _ => None,
        };
        if let Some(name) = name {
            if self.ctx.title_name.is_none() {
                self.ctx.title_name = Some(name);
            } else {
                self.diag(diags::w016(self.label_range(stmt)));
            }
        }
        self.postpone_only(stmt)
    }

    fn process_space(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        if let Some(op) = stmt.operands.first() {
            if !op.is_empty() {
                let ectx = self.ectx();
                let v = op.expr().and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx));
                if !matches!(v, Some(v) if v >= 0) {
                    self.diag(diags::a148_space_value(op.range()));
                }
            }
        }
        AsmAction::None
    }

    fn process_alias(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        if self.find_label(stmt).is_empty() {
            self.diag(diags::a163_alias_label(stmt.range));
            return AsmAction::None;
        }
        self.postpone_only(stmt)
    }

    fn process_ictl(&mut self, stmt: &ResolvedStatement) -> AsmAction {
        let ectx = EvalContext::default();
        let mut vals = [None; 3];
        for (i, op) in stmt.operands.iter().take(3).enumerate() {
            vals[i] = op
                .expr()
                .and_then(|e| try_get_abs(e, &self.ctx.ord, &ectx))
                .map(|v| v as usize);
        }
        let begin = vals[0].unwrap_or(1);
        let end = vals[1].unwrap_or(71);
        match IctlColumns::validate(begin, end, vals[2]) {
            Some(cols) => AsmAction::Ictl(cols),
            None => {
                self.diag(diags::a011("ICTL", stmt.operand_range));
                AsmAction::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AsmOptions;
    use hlasm_lang_core::{IdPool, ResourceLocation};
    use hlasm_parser::statement::{
        parse_statement, OperandHint, OperandOccurrence, ProcessingForm, ProcessingKind,
        ProcessingStatus, Statement,
    };
    use hlasm_parser::line::extract_logical_line;

    struct Fixture {
        ctx: HlasmContext,
        diags: Vec<Diagnostic>,
        lsp: LspIndex,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ctx: HlasmContext::new(
                    ResourceLocation::new("file:///t.hlasm"),
                    AsmOptions::default(),
                    IdPool::new(),
                ),
                diags: Vec::new(),
                lsp: LspIndex::new(),
            }
        }

        fn run(&mut self, line: &str) -> AsmAction {
            let (ll, _) =
                extract_logical_line(&[line], 0, &IctlColumns::default()).unwrap();
            let status = ProcessingStatus::new(
                ProcessingForm::Assembler,
                OperandOccurrence::Present,
                ProcessingKind::Ordinary,
            );
            let fields = hlasm_parser::split_fields(&ll, &mut self.ctx.ids);
            let instr = fields.instruction.id().unwrap();
            let hint = match self.ctx.ids.text(instr) {
                "DC" | "DS" | "DXD" => OperandHint::DataDef,
                _ => OperandHint::None,
            };
            let (stmt, mut diags) =
                hlasm_parser::assemble_statement(fields, status, hint, &mut self.ctx.ids);
            self.diags.append(&mut diags);
            let resolved = match stmt {
                Statement::Resolved(r) => r,
                other => panic!("expected resolved statement, got {other:?}"),
            };
            let mut proc = AsmProcessor::new(&mut self.ctx, &mut self.diags, &mut self.lsp);
            proc.process(instr, &resolved)
        }

        fn codes(&self) -> Vec<&str> {
            self.diags.iter().map(|d| d.code.as_str()).collect()
        }
    }

    #[test]
    fn test_equ_defines_symbol() {
        let mut f = Fixture::new();
        f.run("TEN      EQU   10");
        let ten = f.ctx.ids.find("TEN").unwrap();
        assert_eq!(f.ctx.ord.get_symbol(ten).unwrap().value.abs(), Some(10));
        assert!(f.diags.is_empty());
    }

    #[test]
    fn test_equ_duplicate_is_e031() {
        let mut f = Fixture::new();
        f.run("A        EQU   1");
        f.run("A        EQU   2");
        assert_eq!(f.codes(), vec!["E031"]);
        let a = f.ctx.ids.find("A").unwrap();
        assert_eq!(f.ctx.ord.get_symbol(a).unwrap().value.abs(), Some(1));
    }

    #[test]
    fn test_equ_forward_reference_resolves() {
        let mut f = Fixture::new();
        f.run("A        EQU   B+1");
        f.run("B        EQU   41");
        let a = f.ctx.ids.find("A").unwrap();
        assert_eq!(f.ctx.ord.get_symbol(a).unwrap().value.abs(), Some(42));
    }

    #[test]
    fn test_equ_length_inheritance() {
        let mut f = Fixture::new();
        f.run("FIELD    DS    CL8");
        f.run("ALIAS1   EQU   FIELD");
        let alias = f.ctx.ids.find("ALIAS1").unwrap();
        assert_eq!(f.ctx.ord.get_symbol(alias).unwrap().attrs.length, Some(8));
    }

    #[test]
    fn test_dc_reserves_aligned_storage() {
        let mut f = Fixture::new();
        f.run("X        DC    C'ABC'");
        f.run("Y        DC    F'1'");
        let y = f.ctx.ids.find("Y").unwrap();
        // C'ABC' ends at 3; F aligns to 4.
        let addr = f.ctx.ord.get_symbol(y).unwrap().value.reloc().unwrap().clone();
        assert_eq!(addr.offset, 4);
        assert_eq!(f.ctx.ord.current_address().offset, 8);
    }

    #[test]
    fn test_dc_label_attributes() {
        let mut f = Fixture::new();
        f.run("BUF      DC    CL80' '");
        let buf = f.ctx.ids.find("BUF").unwrap();
        let sym = f.ctx.ord.get_symbol(buf).unwrap();
        assert_eq!(sym.attrs.length, Some(80));
        assert_eq!(
            sym.attrs.type_attr,
            crate::context::symbol::ebcdic_type('C')
        );
    }

    #[test]
    fn test_dc_length_dependency_creates_space() {
        let mut f = Fixture::new();
        f.run("A        DC    CL(SIZE)'X'");
        assert_eq!(f.ctx.ord.unresolved_spaces().len(), 1);
        f.run("SIZE     EQU   16");
        assert!(f.ctx.ord.unresolved_spaces().is_empty());
        assert_eq!(f.ctx.ord.current_address().offset, 16);
    }

    #[test]
    fn test_dc_self_referencing_length() {
        let mut f = Fixture::new();
        f.run("HERE     DC    CL(L'HERE+3)'AB'");
        let here = f.ctx.ids.find("HERE").unwrap();
        // Pre-set with 1, then re-substituted: 1+3 = 4.
        assert_eq!(f.ctx.ord.get_symbol(here).unwrap().attrs.length, Some(4));
    }

    #[test]
    fn test_sect_creates_and_reenters() {
        let mut f = Fixture::new();
        f.run("MAIN     CSECT");
        f.run("DATA     DSECT");
        f.run("MAIN     CSECT");
        assert!(f.diags.is_empty());
        assert_eq!(f.ctx.ord.sections.len(), 2);
    }

    #[test]
    fn test_sect_name_collision() {
        let mut f = Fixture::new();
        f.run("X        EQU   1");
        f.run("X        CSECT");
        assert_eq!(f.codes(), vec!["E031"]);
    }

    #[test]
    fn test_loctr_requires_label() {
        let mut f = Fixture::new();
        f.run("         LOCTR");
        assert_eq!(f.codes(), vec!["E053"]);
    }

    #[test]
    fn test_start_after_csect_is_e073() {
        let mut f = Fixture::new();
        f.run("         CSECT");
        f.run("X        START 0");
        assert_eq!(f.codes(), vec!["E073"]);
    }

    #[test]
    fn test_start_rounds_to_sectalgn() {
        let mut f = Fixture::new();
        f.run("MAIN     START 3");
        assert_eq!(f.ctx.ord.current_address().offset, 8);
    }

    #[test]
    fn test_org_backward_and_max() {
        let mut f = Fixture::new();
        f.run("S        CSECT");
        f.run("         DS    XL100");
        f.run("         ORG   S+10");
        assert_eq!(f.ctx.ord.current_address().offset, 10);
        f.run("         ORG");
        assert_eq!(f.ctx.ord.current_address().offset, 100);
    }

    #[test]
    fn test_org_underflow_is_e068() {
        let mut f = Fixture::new();
        f.run("S        CSECT");
        f.run("         ORG   S-1");
        assert!(f.codes().contains(&"E068"));
    }

    #[test]
    fn test_org_without_reloc_is_a115() {
        let mut f = Fixture::new();
        f.run("         ORG   12");
        assert!(f.codes().contains(&"A115"));
    }

    #[test]
    fn test_mnote_severity_and_message() {
        let mut f = Fixture::new();
        f.run("         MNOTE 4,'test message'");
        assert_eq!(f.diags.len(), 1);
        let d = &f.diags[0];
        assert_eq!(d.code, "MNOTE");
        assert_eq!(d.severity, hlasm_lang_core::Severity::Warning);
        assert_eq!(d.message, "test message");
        assert_eq!(f.ctx.mnote_max, 4);
    }

    #[test]
    fn test_mnote_long_message_is_a117() {
        let mut f = Fixture::new();
        let long = "X".repeat(1025);
        f.run(&format!("         MNOTE '{long}'"));
        assert!(f.codes().contains(&"A117"));
    }

    #[test]
    fn test_using_arity() {
        let mut f = Fixture::new();
        f.run("         USING *");
        assert_eq!(f.codes(), vec!["A012"]);
    }

    #[test]
    fn test_using_and_drop() {
        let mut f = Fixture::new();
        f.run("         CSECT");
        f.run("         USING *,12");
        assert_eq!(f.ctx.usings.active().len(), 1);
        f.run("         DROP  12");
        assert!(f.ctx.usings.active().is_empty());
    }

    #[test]
    fn test_push_pop_using() {
        let mut f = Fixture::new();
        f.run("         USING *,12");
        f.run("         PUSH  USING");
        f.run("         USING *,11");
        f.run("         POP   USING");
        assert_eq!(f.ctx.usings.active().len(), 1);
        f.run("         POP   USING");
        assert!(f.codes().contains(&"A165"));
    }

    #[test]
    fn test_drop_label_warning() {
        let mut f = Fixture::new();
        f.run("L1       DROP  12");
        assert!(f.codes().contains(&"A251"));
    }

    #[test]
    fn test_end_with_absolute_operand() {
        let mut f = Fixture::new();
        let action = f.run("         END   42");
        assert_eq!(action, AsmAction::End);
        assert!(f.codes().contains(&"E032"));
        assert!(f.ctx.end_reached);
    }

    #[test]
    fn test_end_label_warning() {
        let mut f = Fixture::new();
        f.run("LBL      END");
        assert!(f.codes().contains(&"A249"));
    }

    #[test]
    fn test_opsyn_alias_and_undefined_removal() {
        let mut f = Fixture::new();
        f.run("LOAD     OPSYN L");
        let load = f.ctx.ids.find("LOAD").unwrap();
        assert!(f.ctx.get_opcode(load).is_some());
        f.run("NOPE     OPSYN");
        assert!(f.codes().contains(&"E049"));
    }

    #[test]
    fn test_extrn_part_form() {
        let mut f = Fixture::new();
        f.run("         EXTRN PART(EXTA,EXTB)");
        let a = f.ctx.ids.find("EXTA").unwrap();
        assert!(f.ctx.ord.symbol_defined(a));
    }

    #[test]
    fn test_title_w016_on_second_name() {
        let mut f = Fixture::new();
        f.run("ONE      TITLE 'first'");
        f.run("TWO      TITLE 'second'");
        assert!(f.codes().contains(&"W016"));
        assert_eq!(f.ctx.title_name.as_deref(), Some("ONE"));
    }

    #[test]
    fn test_ltorg_reserves_literals() {
        let mut f = Fixture::new();
        let (ll, _) = extract_logical_line(
            &["         L     1,=F'5'"],
            0,
            &IctlColumns::default(),
        )
        .unwrap();
        let status = ProcessingStatus::new(
            ProcessingForm::Machine,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let (stmt, _) = parse_statement(&ll, status, OperandHint::None, &mut f.ctx.ids);
        let resolved = match stmt {
            Statement::Resolved(r) => r,
            _ => unreachable!(),
        };
        {
            let mut proc = AsmProcessor::new(&mut f.ctx, &mut f.diags, &mut f.lsp);
            proc.process_machine(4, &resolved);
        }
        // L at 0..4; LTORG aligns to 8 and lays down 4 bytes.
        f.run("         LTORG");
        assert_eq!(f.ctx.ord.current_address().offset, 12);
    }

    #[test]
    fn test_machine_label_attrs() {
        let mut f = Fixture::new();
        let (ll, _) =
            extract_logical_line(&["HERE     LR    1,2"], 0, &IctlColumns::default()).unwrap();
        let status = ProcessingStatus::new(
            ProcessingForm::Machine,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let (stmt, _) = parse_statement(&ll, status, OperandHint::None, &mut f.ctx.ids);
        let resolved = match stmt {
            Statement::Resolved(r) => r,
            _ => unreachable!(),
        };
        let mut proc = AsmProcessor::new(&mut f.ctx, &mut f.diags, &mut f.lsp);
        proc.process_machine(2, &resolved);
        let here = f.ctx.ids.find("HERE").unwrap();
        let sym = f.ctx.ord.get_symbol(here).unwrap();
        assert_eq!(sym.attrs.length, Some(2));
        assert_eq!(sym.attrs.type_attr, crate::context::symbol::ebcdic_type('I'));
    }

    #[test]
    fn test_ainsert_record_queued() {
        let mut f = Fixture::new();
        let action = f.run("         AINSERT ' LR 1,2',BACK");
        assert_eq!(
            action,
            AsmAction::Ainsert {
                record: " LR 1,2".into(),
                dest: AinsertDestination::Back
            }
        );
    }

    #[test]
    fn test_ainsert_bad_destination() {
        let mut f = Fixture::new();
        f.run("         AINSERT 'X',SIDEWAYS");
        assert!(f.codes().contains(&"A156"));
    }

    #[test]
    fn test_copy_action() {
        let mut f = Fixture::new();
        let action = f.run("         COPY  MEMBER");
        match action {
            AsmAction::Copy { member, .. } => {
                assert_eq!(Some(member), f.ctx.ids.find("MEMBER"));
            }
            other => panic!("expected Copy, got {other:?}"),
        }
    }

    #[test]
    fn test_ccw_alignment() {
        let mut f = Fixture::new();
        f.run("         DS    X");
        f.run("W        CCW   0,0,0,0");
        assert_eq!(f.ctx.ord.current_address().offset, 16);
        let w = f.ctx.ids.find("W").unwrap();
        assert_eq!(f.ctx.ord.get_symbol(w).unwrap().attrs.length, Some(8));
    }

    #[test]
    fn test_cnop_reserves() {
        let mut f = Fixture::new();
        f.run("         CNOP  2,8");
        assert_eq!(f.ctx.ord.current_address().offset, 2);
    }

    #[test]
    fn test_space_bad_operand() {
        let mut f = Fixture::new();
        f.run("         SPACE UNDEF1");
        assert!(f.codes().contains(&"A148"));
    }
}
