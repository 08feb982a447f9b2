//! The processing manager.
//!
//! A cooperative step engine: each tick pulls one statement from the active
//! provider, classifies it under the current state (ordinary, macro
//! definition, lookahead), and dispatches. Library fetches suspend the
//! engine; `supply_copy`/`supply_macro` resume it. The manager owns the
//! provider stack, the lookahead excursion state and the collected outputs
//! (diagnostics, semantic tokens, the LSP index).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use hlasm_lang_core::{Diagnostic, Id, Location, Position, Range, ResourceLocation};
use hlasm_parser::ca::{ConcatChain, ConcatElem};
use hlasm_parser::line::LogicalLine;
use hlasm_parser::statement::{
    parse_operand_field, CaOperand, InstrField, Label, Operand, OperandHint, OperandOccurrence,
    ParsedFields, ProcessingForm, ProcessingKind, ProcessingStatus, ResolvedStatement,
};

use crate::context::macros::CopyMember;
use crate::context::variables::{MacroArg, MacroFrame, SetValue, VarKind};
use crate::context::{FrameKind, HlasmContext, ResolvedOpcode};
use crate::diags;
use crate::instructions::CaInstr;
use crate::library::LibraryMember;
use crate::lsp::{LspIndex, OccurrenceKind};
use crate::processing::conditional::{CaEval, CaEvalError};
use crate::processing::lookahead::{scan_statement, LookaheadState, LookaheadTarget};
use crate::processing::macro_def::MacroCollector;
use crate::processing::ordinary::{AsmAction, AsmProcessor};
use crate::processing::providers::{CopyProvider, Document, MacroProvider, OpenCodeProvider, Provider};
use crate::processing::{FetchRequest, StepResult};
use crate::semantics::{SourceInfoProcessor, TokenKind};

/// The manager's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Ordinary,
    MacroDef,
    Lookahead,
    CopyFetch,
    End,
}

/// The step engine of one analysis.
pub struct ProcessingManager {
    ctx: Rc<RefCell<HlasmContext>>,
    providers: Vec<Provider>,
    state: ManagerState,
    collector: Option<MacroCollector>,
    lookahead: Option<LookaheadState>,
    /// Lookahead targets already attempted (hit or miss).
    attempted: HashSet<Id>,
    /// Macro auto-includes already attempted.
    autoinclude_attempted: HashSet<Id>,
    pending_fetch: Option<FetchRequest>,
    /// Where to report E058 when a COPY fetch comes back empty.
    pending_origin: Option<(Range, ResourceLocation)>,
    diags: Vec<Diagnostic>,
    pub tokens: SourceInfoProcessor,
    pub lsp: LspIndex,
    /// Whether this manager owns the assembly's close-out. Reentrant
    /// analyses over a shared context must not settle the dependency graph
    /// mid-assembly.
    owns_closeout: bool,
    finished: bool,
}

impl ProcessingManager {
    pub fn new(
        ctx: Rc<RefCell<HlasmContext>>,
        document: Document,
        resource: ResourceLocation,
        collect_highlighting: bool,
        owns_closeout: bool,
    ) -> Self {
        Self {
            ctx,
            providers: vec![Provider::OpenCode(OpenCodeProvider::new(document, resource))],
            state: ManagerState::Ordinary,
            collector: None,
            lookahead: None,
            attempted: HashSet::new(),
            autoinclude_attempted: HashSet::new(),
            pending_fetch: None,
            pending_origin: None,
            diags: Vec::new(),
            tokens: SourceInfoProcessor::new(collect_highlighting),
            lsp: LspIndex::new(),
            owns_closeout,
            finished: false,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn take_diags(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diags)
    }

    // -- stepping -----------------------------------------------------------

    /// One tick. Returns what the driver must do next.
    pub fn step(&mut self) -> StepResult {
        if self.finished {
            return StepResult::Done;
        }
        if let Some(req) = &self.pending_fetch {
            return StepResult::AwaitLibrary(req.clone());
        }

        let ctx = self.ctx.clone();
        let mut ctx = ctx.borrow_mut();

        if ctx.end_reached || ctx.metrics.statements >= ctx.options.statement_limit as u64 {
            self.finalize(&mut ctx);
            return StepResult::Done;
        }

        // Retire finished providers.
        while self.top_finished() {
            if self.lookahead.is_some() {
                // The excursion ran off its stream; restore and move on.
                self.end_lookahead_missed(&mut ctx);
                return StepResult::Continue;
            }
            if self.providers.len() == 1 {
                self.finalize(&mut ctx);
                return StepResult::Done;
            }
            match self.providers.pop() {
                Some(Provider::Macro(_)) => {
                    ctx.cond.pop_scope();
                    ctx.pop_frame();
                }
                Some(Provider::Copy(_)) => ctx.pop_frame(),
                _ => {}
            }
        }

        let ictl = self.opencode_ictl();
        let top = self.providers.last_mut().expect("provider stack never empty");
        let Some((line, position)) = top.next_logical(&ictl) else {
            return StepResult::Continue;
        };

        ctx.metrics.lines += line.line_count() as u64;
        ctx.current_position = Position::new(line.first_line() as u32, 0);

        if line.is_blank() {
            return StepResult::Continue;
        }
        if line.is_comment() {
            self.emit_comment_tokens(&line);
            return StepResult::Continue;
        }
        self.emit_continuation_tokens(&line);

        let fields = hlasm_parser::split_fields(&line, &mut ctx.ids);
        ctx.metrics.statements += 1;
        self.emit_field_tokens(&fields);

        // Lookahead consumes the stream without ordinary side effects.
        if let Some(state) = self.lookahead.clone() {
            self.lookahead_step(&mut ctx, &fields, state);
            return StepResult::Continue;
        }

        // Sequence labels register as they pass in open code; macro bodies
        // carry their table from definition time.
        if let Label::Sequence { name, range } = &fields.label {
            if !ctx.cond.current_scope().is_macro() {
                ctx.cond
                    .current_scope_mut()
                    .seq_symbols
                    .entry(*name)
                    .or_insert(position);
            }
            let resource = self.top_resource();
            self.lsp
                .add(OccurrenceKind::SequenceSymbol, *name, *range, resource, true);
        }

        match self.state {
            ManagerState::MacroDef => self.macro_def_step(&mut ctx, &line, &fields),
            _ => self.ordinary_step(&mut ctx, &line, &fields, position),
        }
    }

    fn top_finished(&self) -> bool {
        self.providers.last().map(Provider::finished).unwrap_or(true)
    }

    fn opencode_ictl(&self) -> hlasm_parser::line::IctlColumns {
        match &self.providers[0] {
            Provider::OpenCode(p) => p.ictl,
            _ => Default::default(),
        }
    }

    fn top_resource(&self) -> ResourceLocation {
        self.providers
            .last()
            .map(|p| p.resource().clone())
            .unwrap_or_default()
    }

    fn opencode_mut(&mut self) -> &mut OpenCodeProvider {
        match &mut self.providers[0] {
            Provider::OpenCode(p) => p,
            _ => unreachable!("provider 0 is always open code"),
        }
    }

    fn diag(&mut self, d: Diagnostic) {
        let resource = self.top_resource();
        self.diags.push(d.with_resource(resource));
    }

    // -- ordinary dispatch --------------------------------------------------

    fn ordinary_step(
        &mut self,
        ctx: &mut HlasmContext,
        _line: &LogicalLine,
        fields: &ParsedFields,
        position: usize,
    ) -> StepResult {
        // Resolve the instruction; chains substitute first.
        let instr_id = match &fields.instruction {
            InstrField::Empty => return StepResult::Continue,
            InstrField::Id { name, .. } => *name,
            InstrField::Chain(chain) => {
                let mut sink = Vec::new();
                let rendered = {
                    let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
                    eval.render_chain(chain)
                };
                self.extend_diags(sink);
                match rendered {
                    Ok(text) if !text.is_empty() => ctx.ids.intern(&text),
                    _ => return StepResult::Continue,
                }
            }
        };

        match ctx.get_opcode(instr_id) {
            Some(ResolvedOpcode::Ca(instr)) => self.process_ca(ctx, instr, fields, position),
            Some(ResolvedOpcode::Macro(id)) => self.process_macro_call(ctx, id, fields),
            Some(ResolvedOpcode::Asm(base)) => {
                self.process_asm_statement(ctx, base, fields, position)
            }
            Some(ResolvedOpcode::Machine(len)) => {
                self.process_machine_statement(ctx, len, fields, position)
            }
            None => self.process_unknown(ctx, instr_id, fields, position),
        }
    }

    /// Substitute variable symbols in the statement fields. `None` means
    /// the statement needs no substitution (or it could not complete; the
    /// caller then processes the original).
    fn substituted_fields(
        &mut self,
        ctx: &mut HlasmContext,
        fields: &ParsedFields,
    ) -> Option<ParsedFields> {
        let needs_subst = matches!(fields.label, Label::Variable(_))
            || fields.operand_text.contains('&');
        if !needs_subst {
            return None;
        }

        // Parse the operand field as a chain against the real pool first;
        // rendering below only reads the context.
        let lexemes = hlasm_parser::lexer::tokenize(&fields.operand_text, 0, 0);
        let mut pos = 0;
        let chain = hlasm_parser::ca::parse_concat_chain(&lexemes, &mut pos, &mut ctx.ids, &[]);

        let mut sink = Vec::new();
        let rendered = {
            let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
            let label = match &fields.label {
                Label::Variable(c) => eval.render_chain(c),
                Label::Ordinary { name, .. } => Ok(eval.ctx.ids.text(*name).to_string()),
                Label::Sequence { .. } | Label::Empty => Ok(String::new()),
                Label::Text(t, _) => Ok(t.clone()),
            };
            label.and_then(|l| eval.render_chain(&chain).map(|o| (l, o)))
        };
        self.extend_diags(sink);
        let (label_text, operand_text) = rendered.ok()?;

        ctx.metrics.reparsed_statements += 1;

        let start = fields.range.start;
        let mut out = fields.clone();
        out.label = classify_rendered_label(&label_text, fields.label.range(), &mut ctx.ids);
        out.operand_text = operand_text;
        out.operand_positions = vec![start; out.operand_text.chars().count() + 1];
        Some(out)
    }

    fn process_asm_statement(
        &mut self,
        ctx: &mut HlasmContext,
        base: Id,
        fields: &ParsedFields,
        position: usize,
    ) -> StepResult {
        let (fields, cache_pos) = match self.substituted_fields(ctx, fields) {
            Some(f) => (f, None),
            None => (fields.clone(), Some(position)),
        };

        let hint = match ctx.ids.text(base) {
            "DC" | "DS" | "DXD" => OperandHint::DataDef,
            _ => OperandHint::None,
        };
        let status = ProcessingStatus::new(
            ProcessingForm::Assembler,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let stmt = self.assemble_cached(ctx, &fields, status, hint, cache_pos);
        self.emit_operand_tokens(&stmt);

        let action = {
            let mut proc = AsmProcessor::new(ctx, &mut self.diags, &mut self.lsp);
            proc.process(base, &stmt)
        };
        self.handle_asm_action(ctx, action, position)
    }

    fn process_machine_statement(
        &mut self,
        ctx: &mut HlasmContext,
        len: u32,
        fields: &ParsedFields,
        position: usize,
    ) -> StepResult {
        let (fields, cache_pos) = match self.substituted_fields(ctx, fields) {
            Some(f) => (f, None),
            None => (fields.clone(), Some(position)),
        };
        let status = ProcessingStatus::new(
            ProcessingForm::Machine,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let stmt = self.assemble_cached(ctx, &fields, status, OperandHint::None, cache_pos);
        self.emit_operand_tokens(&stmt);
        let mut proc = AsmProcessor::new(ctx, &mut self.diags, &mut self.lsp);
        proc.process_machine(len, &stmt);
        StepResult::Continue
    }

    fn process_unknown(
        &mut self,
        ctx: &mut HlasmContext,
        instr_id: Id,
        fields: &ParsedFields,
        position: usize,
    ) -> StepResult {
        let name = ctx.ids.text(instr_id).to_string();
        if !self.autoinclude_attempted.contains(&instr_id) {
            self.autoinclude_attempted.insert(instr_id);
            // Rewind so the statement is re-read once the member arrives.
            self.providers
                .last_mut()
                .expect("provider stack never empty")
                .rewind(position);
            self.pending_fetch = Some(FetchRequest {
                name,
                member: instr_id,
                kind: ProcessingKind::MacroDef,
            });
            self.state = ManagerState::CopyFetch;
            return StepResult::AwaitLibrary(self.pending_fetch.clone().unwrap());
        }
        let range = fields.instruction.range().unwrap_or(fields.range);
        self.diag(diags::e049(&name, range));
        StepResult::Continue
    }

    fn assemble(
        &mut self,
        ctx: &mut HlasmContext,
        fields: &ParsedFields,
        status: ProcessingStatus,
        hint: OperandHint,
    ) -> ResolvedStatement {
        self.assemble_cached(ctx, fields, status, hint, None)
    }

    /// Assemble a statement; `cache_position` memoizes the operand parse on
    /// the current provider, keyed by processing status.
    fn assemble_cached(
        &mut self,
        ctx: &mut HlasmContext,
        fields: &ParsedFields,
        status: ProcessingStatus,
        hint: OperandHint,
        cache_position: Option<usize>,
    ) -> ResolvedStatement {
        let key = cache_position.map(|p| (p, status.cache_key()));
        let parsed = match key
            .and_then(|k| self.providers.last().and_then(|p| p.cache_get(k)))
        {
            Some(cached) => cached,
            None => {
                let parsed = Rc::new(parse_operand_field(
                    &fields.operand_text,
                    &fields.operand_positions,
                    &status,
                    hint,
                    &mut ctx.ids,
                ));
                if let Some(k) = key {
                    if let Some(p) = self.providers.last_mut() {
                        p.cache_put(k, parsed.clone());
                    }
                }
                parsed
            }
        };
        for d in &parsed.diags {
            self.diag(d.clone());
        }
        let operand_range = fields
            .operand_positions
            .first()
            .zip(fields.operand_positions.last())
            .map(|(a, b)| Range::new(*a, *b))
            .unwrap_or(fields.range);
        ResolvedStatement {
            label: fields.label.clone(),
            instruction: fields.instruction.clone(),
            operands: parsed.operands.clone(),
            operand_range,
            remarks: fields.remarks.clone(),
            literals: parsed.literals.clone(),
            range: fields.range,
            status,
        }
    }

    fn handle_asm_action(
        &mut self,
        ctx: &mut HlasmContext,
        action: AsmAction,
        _position: usize,
    ) -> StepResult {
        match action {
            AsmAction::None => StepResult::Continue,
            AsmAction::End => {
                self.state = ManagerState::End;
                StepResult::Continue
            }
            AsmAction::Ictl(cols) => {
                self.opencode_mut().ictl = cols;
                StepResult::Continue
            }
            AsmAction::Ainsert { record, dest } => {
                self.opencode_mut().ainsert(&record, dest);
                StepResult::Continue
            }
            AsmAction::Copy {
                member,
                operand_range,
                stmt_range,
            } => {
                if ctx.storage.get_copy_member(member).is_some() {
                    self.enter_copy(ctx, member, stmt_range);
                } else {
                    let name = ctx.ids.text(member).to_string();
                    self.pending_origin = Some((operand_range, self.top_resource()));
                    self.pending_fetch = Some(FetchRequest {
                        name,
                        member,
                        kind: ProcessingKind::Copy,
                    });
                    self.state = ManagerState::CopyFetch;
                    return StepResult::AwaitLibrary(self.pending_fetch.clone().unwrap());
                }
                StepResult::Continue
            }
        }
    }

    fn enter_copy(&mut self, ctx: &mut HlasmContext, member: Id, stmt_range: Range) {
        if ctx.whole_copy_stack().contains(&member) {
            self.diag(diags::e062(stmt_range));
            return;
        }
        let Some(cached) = ctx.storage.get_copy_member(member).cloned() else {
            return;
        };
        let location = Location::new(cached.location.clone(), Position::default());
        ctx.push_frame(FrameKind::Copy(member), location);
        ctx.metrics.copy_expansions += 1;
        self.providers.push(Provider::Copy(CopyProvider::new(cached)));
    }

    // -- fetch completion ---------------------------------------------------

    /// Resume after a COPY fetch.
    pub fn supply_copy(&mut self, request: &FetchRequest, member: Option<LibraryMember>) {
        self.pending_fetch = None;
        self.state = ManagerState::Ordinary;
        let origin = self.pending_origin.take();
        match member {
            Some(m) => {
                let ctx = self.ctx.clone();
                let mut ctx = ctx.borrow_mut();
                ctx.storage.add_copy_member(CopyMember {
                    name: request.member,
                    lines: m.text.lines().map(str::to_string).collect(),
                    location: m.location,
                });
                let range = origin.map(|(r, _)| r).unwrap_or_default();
                self.enter_copy(&mut ctx, request.member, range);
            }
            None => {
                if let Some((range, resource)) = origin {
                    self.diags.push(diags::e058(range).with_resource(resource));
                }
            }
        }
    }

    /// Resume after a macro auto-include attempt; the provider has already
    /// been rewound to replay the triggering statement.
    pub fn supply_macro(&mut self, _request: &FetchRequest, _succeeded: bool) {
        self.pending_fetch = None;
        self.state = ManagerState::Ordinary;
    }

    // -- macro definition ---------------------------------------------------

    fn macro_def_step(
        &mut self,
        ctx: &mut HlasmContext,
        line: &LogicalLine,
        fields: &ParsedFields,
    ) -> StepResult {
        let collector = self
            .collector
            .as_mut()
            .expect("collector present in MacroDef state");

        let instr_text = fields
            .instruction
            .id()
            .map(|i| ctx.ids.text(i).to_string())
            .unwrap_or_default();

        match instr_text.as_str() {
            "MACRO" => {
                collector.enter_nested();
                collector.feed_body(line, fields);
            }
            "MEND" => {
                if collector.leave() {
                    let collector = self.collector.take().expect("collector checked above");
                    self.state = ManagerState::Ordinary;
                    if let Some(def) = collector.finish() {
                        let name = def.name;
                        let range = def.location.pos;
                        let resource = def.location.resource.clone();
                        ctx.ord.symbol_mentioned_on_macro(name);
                        ctx.storage.add_macro(def);
                        ctx.metrics.macro_definitions += 1;
                        self.lsp.add(
                            OccurrenceKind::Macro,
                            name,
                            Range::point(range),
                            resource,
                            true,
                        );
                    }
                } else {
                    self.collector
                        .as_mut()
                        .expect("nested collector")
                        .feed_body(line, fields);
                }
            }
            "COPY" => {
                // COPY inlines into the definition being collected.
                let copy_id = ctx.intern("COPY");
                let status = ProcessingStatus::new(
                    ProcessingForm::Assembler,
                    OperandOccurrence::Present,
                    ProcessingKind::MacroDef,
                );
                let stmt = self.assemble(ctx, fields, status, OperandHint::None);
                let action = {
                    let mut proc = AsmProcessor::new(ctx, &mut self.diags, &mut self.lsp);
                    proc.process(copy_id, &stmt)
                };
                return self.handle_asm_action(ctx, action, 0);
            }
            _ => {
                let collector = self
                    .collector
                    .as_mut()
                    .expect("collector present in MacroDef state");
                if !collector.has_prototype() {
                    collector.feed_prototype(fields, &mut ctx.ids);
                    if let (Some(first), Some(last)) = (
                        fields.operand_positions.first(),
                        fields.operand_positions.last(),
                    ) {
                        self.tokens
                            .add(Range::new(*first, *last), TokenKind::MacroParam);
                    }
                } else {
                    collector.feed_body(line, fields);
                }
            }
        }
        StepResult::Continue
    }

    // -- lookahead ----------------------------------------------------------

    fn lookahead_step(
        &mut self,
        ctx: &mut HlasmContext,
        fields: &ParsedFields,
        state: LookaheadState,
    ) {
        let found = scan_statement(ctx, fields, state.target);
        if !found {
            return;
        }
        self.lookahead = None;
        match state.target {
            LookaheadTarget::Attr(id) => {
                self.attempted.insert(id);
                // Back to the triggering statement, attributes in hand.
                self.providers
                    .last_mut()
                    .expect("provider stack never empty")
                    .rewind(state.return_position);
            }
            LookaheadTarget::Seq(_) => {
                // A taken forward branch: processing continues right after
                // the labelled statement, which the scan just consumed —
                // rewinding one statement would re-run the scan, so the
                // label statement itself is treated as processed.
            }
        }
        self.state = ManagerState::Ordinary;
    }

    fn end_lookahead_missed(&mut self, ctx: &mut HlasmContext) {
        let Some(state) = self.lookahead.take() else {
            return;
        };
        match state.target {
            LookaheadTarget::Attr(id) => {
                self.attempted.insert(id);
            }
            LookaheadTarget::Seq(seq) => {
                let name = ctx.ids.text(seq).to_string();
                let range = Range::point(Position::new(ctx.current_position.line, 0));
                self.diag(diags::e047(&name, range));
            }
        }
        self.providers
            .last_mut()
            .expect("provider stack never empty")
            .rewind(state.return_position);
        self.state = ManagerState::Ordinary;
    }

    fn start_lookahead(&mut self, target: LookaheadTarget, return_position: usize) {
        let ctx = self.ctx.clone();
        ctx.borrow_mut().metrics.lookahead_excursions += 1;
        self.lookahead = Some(LookaheadState {
            target,
            depth: self.providers.len(),
            return_position,
        });
        self.state = ManagerState::Lookahead;
    }

    // -- conditional assembly ----------------------------------------------

    fn process_ca(
        &mut self,
        ctx: &mut HlasmContext,
        instr: CaInstr,
        fields: &ParsedFields,
        position: usize,
    ) -> StepResult {
        use CaInstr::*;

        match instr {
            Macro => {
                self.collector = Some(MacroCollector::new(ctx.current_location()));
                self.state = ManagerState::MacroDef;
                return StepResult::Continue;
            }
            Mend | Mexit => {
                if matches!(self.providers.last(), Some(Provider::Macro(_))) {
                    self.providers.pop();
                    ctx.cond.pop_scope();
                    ctx.pop_frame();
                }
                return StepResult::Continue;
            }
            Anop => return StepResult::Continue,
            _ => {}
        }

        let status = ProcessingStatus::new(
            ProcessingForm::ConditionalAssembly,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let stmt = self.assemble(ctx, fields, status, OperandHint::None);
        self.emit_operand_tokens(&stmt);

        let outcome = self.process_ca_resolved(ctx, instr, fields, &stmt, position);
        match outcome {
            Err(CaEvalError::NeedLookahead(target)) => {
                self.start_lookahead(LookaheadTarget::Attr(target), position);
                StepResult::Continue
            }
            Ok(()) => StepResult::Continue,
        }
    }

    fn process_ca_resolved(
        &mut self,
        ctx: &mut HlasmContext,
        instr: CaInstr,
        fields: &ParsedFields,
        stmt: &ResolvedStatement,
        position: usize,
    ) -> Result<(), CaEvalError> {
        use CaInstr::*;
        match instr {
            SetA | SetB | SetC => self.process_set(ctx, instr, fields, stmt),
            LclA => Ok(self.process_decl(ctx, stmt, VarKind::Arithmetic, false)),
            LclB => Ok(self.process_decl(ctx, stmt, VarKind::Boolean, false)),
            LclC => Ok(self.process_decl(ctx, stmt, VarKind::Character, false)),
            GblA => Ok(self.process_decl(ctx, stmt, VarKind::Arithmetic, true)),
            GblB => Ok(self.process_decl(ctx, stmt, VarKind::Boolean, true)),
            GblC => Ok(self.process_decl(ctx, stmt, VarKind::Character, true)),
            Aif => self.process_aif(ctx, stmt, position),
            Ago => self.process_ago(ctx, stmt, position),
            Actr => {
                let mut sink = Vec::new();
                let budget = {
                    let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
                    match stmt.operands.first() {
                        Some(Operand::Ca(CaOperand::Expr(e))) => eval.eval_arith(e)?,
                        _ => crate::context::variables::ACTR_DEFAULT,
                    }
                };
                self.extend_diags(sink);
                ctx.cond.current_scope_mut().branch_budget = budget;
                Ok(())
            }
            Aread => {
                let record = self.opencode_mut().aread();
                self.assign_label_var(ctx, fields, SetValue::C(record.trim_end().to_string()))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn process_set(
        &mut self,
        ctx: &mut HlasmContext,
        instr: CaInstr,
        fields: &ParsedFields,
        stmt: &ResolvedStatement,
    ) -> Result<(), CaEvalError> {
        // The label names the target variable, possibly subscripted.
        let Label::Variable(chain) = &fields.label else {
            self.diag(diags::e053(fields.range));
            return Ok(());
        };
        let Some(ConcatElem::Var(vs)) = chain.0.first() else {
            self.diag(diags::e053(fields.range));
            return Ok(());
        };

        let mut sink = Vec::new();
        let result = {
            let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
            let name = eval.var_name(vs)?;
            let base_sub = match vs.subscript.first() {
                Some(e) => Some(eval.eval_arith(e)? as i64),
                None => None,
            };
            let mut values = Vec::new();
            for op in &stmt.operands {
                let value = match op {
                    Operand::Ca(CaOperand::Expr(e)) => match instr {
                        CaInstr::SetA => SetValue::A(eval.eval_arith(e)?),
                        CaInstr::SetB => SetValue::B(eval.eval_bool(e)?),
                        _ => SetValue::C(eval.eval_str(e)?),
                    },
                    Operand::Ca(CaOperand::Var(v)) => {
                        let raw = eval.var_value(v)?;
                        match instr {
                            CaInstr::SetA => SetValue::A(to_arith_value(&raw)),
                            CaInstr::SetB => SetValue::B(to_arith_value(&raw) != 0),
                            _ => SetValue::C(raw.to_text()),
                        }
                    }
                    _ => set_default(instr),
                };
                values.push(value);
            }
            (name, base_sub, values)
        };
        self.extend_diags(sink);

        let (name, base_sub, values) = result;
        let var_range = vs.range;
        for (i, value) in values.into_iter().enumerate() {
            let sub = match base_sub {
                Some(b) => Some(b + i as i64),
                None if i == 0 => None,
                None => Some(i as i64 + 1),
            };
            ctx.cond.set_var(name, sub, value);
        }
        let resource = self.top_resource();
        self.lsp
            .add(OccurrenceKind::VariableSymbol, name, var_range, resource, true);
        Ok(())
    }

    fn process_decl(
        &mut self,
        ctx: &mut HlasmContext,
        stmt: &ResolvedStatement,
        kind: VarKind,
        global: bool,
    ) {
        for op in &stmt.operands {
            if let Operand::Ca(CaOperand::Var(vs)) = op {
                if let hlasm_parser::ca::VarName::Plain(name) = vs.name {
                    if global {
                        ctx.cond.declare_global(name, kind);
                    } else {
                        ctx.cond.declare_local(name, kind);
                    }
                    let resource = self.top_resource();
                    self.lsp.add(
                        OccurrenceKind::VariableSymbol,
                        name,
                        vs.range,
                        resource,
                        true,
                    );
                }
            }
        }
    }

    fn process_aif(
        &mut self,
        ctx: &mut HlasmContext,
        stmt: &ResolvedStatement,
        position: usize,
    ) -> Result<(), CaEvalError> {
        for op in &stmt.operands {
            let Operand::Ca(CaOperand::Branch {
                condition,
                target,
                range,
            }) = op
            else {
                continue;
            };
            let taken = match condition {
                Some(cond) => {
                    let mut sink = Vec::new();
                    let result = {
                        let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
                        eval.eval_bool(cond)
                    };
                    self.extend_diags(sink);
                    result?
                }
                None => true,
            };
            if taken {
                self.branch(ctx, *target, *range, position);
                return Ok(());
            }
        }
        Ok(())
    }

    fn process_ago(
        &mut self,
        ctx: &mut HlasmContext,
        stmt: &ResolvedStatement,
        position: usize,
    ) -> Result<(), CaEvalError> {
        let branches: Vec<(&Option<hlasm_parser::ca::CaExpr>, Id, Range)> = stmt
            .operands
            .iter()
            .filter_map(|op| match op {
                Operand::Ca(CaOperand::Branch {
                    condition,
                    target,
                    range,
                }) => Some((condition, *target, *range)),
                _ => None,
            })
            .collect();

        match branches.as_slice() {
            [] => Ok(()),
            [(None, target, range)] => {
                self.branch(ctx, *target, *range, position);
                Ok(())
            }
            _ => {
                // Computed AGO: the first operand carries the selector.
                let k = match branches[0].0 {
                    Some(ref expr) => {
                        let mut sink = Vec::new();
                        let result = {
                            let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
                            eval.eval_arith(expr)
                        };
                        self.extend_diags(sink);
                        result?
                    }
                    None => 1,
                };
                if k >= 1 && (k as usize) <= branches.len() {
                    let (_, target, range) = branches[k as usize - 1];
                    self.branch(ctx, target, range, position);
                }
                Ok(())
            }
        }
    }

    /// Take a branch to a sequence symbol.
    fn branch(&mut self, ctx: &mut HlasmContext, target: Id, range: Range, position: usize) {
        let scope = ctx.cond.current_scope_mut();
        scope.branch_budget -= 1;
        if scope.branch_budget < 0 {
            self.diag(diags::w063(range));
            if matches!(self.providers.last(), Some(Provider::Macro(_))) {
                self.providers.pop();
                ctx.cond.pop_scope();
                ctx.pop_frame();
            }
            return;
        }

        let resource = self.top_resource();
        self.lsp
            .add(OccurrenceKind::SequenceSymbol, target, range, resource, false);

        // Macro bodies know their sequence symbols from definition time.
        if let Some(Provider::Macro(p)) = self.providers.last() {
            match p.def.seq_symbols.get(&target) {
                Some(&index) => {
                    self.providers
                        .last_mut()
                        .expect("provider stack never empty")
                        .rewind(index);
                }
                None => {
                    let name = ctx.ids.text(target).to_string();
                    self.diag(diags::e047(&name, range));
                }
            }
            return;
        }

        // Open code: backward targets are registered; forward targets need
        // a lookahead scan.
        match ctx.cond.current_scope().seq_symbols.get(&target) {
            Some(&pos) => {
                self.providers
                    .last_mut()
                    .expect("provider stack never empty")
                    .rewind(pos);
            }
            None => {
                self.start_lookahead(LookaheadTarget::Seq(target), position);
            }
        }
    }

    fn assign_label_var(
        &mut self,
        ctx: &mut HlasmContext,
        fields: &ParsedFields,
        value: SetValue,
    ) -> Result<(), CaEvalError> {
        let Label::Variable(chain) = &fields.label else {
            return Ok(());
        };
        let Some(ConcatElem::Var(vs)) = chain.0.first() else {
            return Ok(());
        };
        let mut sink = Vec::new();
        let name = {
            let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
            eval.var_name(vs)?
        };
        self.extend_diags(sink);
        ctx.cond.set_var(name, None, value);
        Ok(())
    }

    // -- macro invocation ---------------------------------------------------

    fn process_macro_call(
        &mut self,
        ctx: &mut HlasmContext,
        id: Id,
        fields: &ParsedFields,
    ) -> StepResult {
        let Some(def) = ctx.storage.get_macro(id).cloned() else {
            return StepResult::Continue;
        };

        let status = ProcessingStatus::new(
            ProcessingForm::Macro,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let stmt = self.assemble(ctx, fields, status, OperandHint::None);

        // Render arguments with the caller's scope.
        let mut sink = Vec::new();
        let rendered: Vec<MacroArg> = {
            let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
            stmt.operands
                .iter()
                .map(|op| match op {
                    Operand::Model(chain) => render_macro_arg(&mut eval, chain),
                    _ => MacroArg::default(),
                })
                .collect()
        };
        self.extend_diags(sink);

        // Bind: keywords by name, the rest positionally.
        let mut frame = MacroFrame {
            name: id,
            sysndx: ctx.next_sysndx(),
            params: Default::default(),
            syslist: Vec::new(),
        };
        for p in &def.params {
            if let Some(d) = &p.default {
                frame.params.insert(p.name, MacroArg::plain(d.clone()));
            }
        }

        let mut positional = def.positional().map(|p| p.name).collect::<Vec<_>>().into_iter();
        for arg in rendered {
            if let Some((key, value)) = split_keyword(&arg.text) {
                if let Some(param) = ctx.ids.find(key).and_then(|k| def.find_param(k)) {
                    if param.default.is_some() {
                        frame
                            .params
                            .insert(param.name, MacroArg::plain(value.to_string()));
                        continue;
                    }
                }
            }
            frame.syslist.push(arg.clone());
            if let Some(name) = positional.next() {
                frame.params.insert(name, arg);
            }
        }

        // The name-field parameter.
        let label_text = match &fields.label {
            Label::Ordinary { name, .. } => ctx.ids.text(*name).to_string(),
            Label::Variable(chain) => {
                let mut sink = Vec::new();
                let rendered = {
                    let mut eval = CaEval::new(ctx, &self.attempted, &mut sink);
                    eval.render_chain(chain).unwrap_or_default()
                };
                self.extend_diags(sink);
                rendered
            }
            _ => String::new(),
        };
        if let Some(lp) = def.label_param {
            frame.params.insert(lp, MacroArg::plain(label_text.clone()));
        }
        // An ordinary label on a macro call becomes a candidate symbol.
        if !label_text.is_empty() {
            if let Some(label_id) = ctx.ids.find(&label_text) {
                ctx.ord.symbol_mentioned_on_macro(label_id);
            }
        }

        let resource = self.top_resource();
        if let Some(r) = fields.instruction.range() {
            self.lsp.add(OccurrenceKind::Macro, id, r, resource, false);
        }

        let location = def.location.clone();
        ctx.cond.push_scope(frame);
        ctx.push_frame(FrameKind::Macro(id), location);
        self.providers.push(Provider::Macro(MacroProvider::new(def)));
        StepResult::Continue
    }

    // -- tokens -------------------------------------------------------------

    fn emit_comment_tokens(&mut self, line: &LogicalLine) {
        for seg in &line.segments {
            self.tokens.add(
                Range::in_line(seg.lineno as u32, seg.code_start, seg.code_end),
                TokenKind::Comment,
            );
        }
    }

    fn emit_continuation_tokens(&mut self, line: &LogicalLine) {
        for seg in &line.segments {
            if seg.continued {
                let col = 71;
                self.tokens.add(
                    Range::in_line(seg.lineno as u32, col, col + 1),
                    TokenKind::Continuation,
                );
            }
        }
    }

    fn emit_field_tokens(&mut self, fields: &ParsedFields) {
        match &fields.label {
            Label::Ordinary { range, .. } | Label::Text(_, range) => {
                self.tokens.add(*range, TokenKind::Label)
            }
            Label::Sequence { range, .. } => self.tokens.add(*range, TokenKind::SeqSymbol),
            Label::Variable(chain) => self.tokens.add(chain.range(), TokenKind::VarSymbol),
            Label::Empty => {}
        }
        if let Some(r) = fields.instruction.range() {
            self.tokens.add(r, TokenKind::Instruction);
        }
        for r in &fields.remarks {
            self.tokens.add(*r, TokenKind::Comment);
        }
    }

    fn emit_operand_tokens(&mut self, stmt: &ResolvedStatement) {
        for op in &stmt.operands {
            match op {
                Operand::String(_, r) => self.tokens.add(*r, TokenKind::String),
                Operand::Ca(CaOperand::Var(vs)) => {
                    self.tokens.add(vs.range, TokenKind::VarSymbol)
                }
                Operand::Ca(CaOperand::Branch { range, .. }) => {
                    self.tokens.add(*range, TokenKind::SeqSymbol)
                }
                Operand::Model(chain) => {
                    for elem in &chain.0 {
                        if let ConcatElem::Var(vs) = elem {
                            self.tokens.add(vs.range, TokenKind::VarSymbol);
                        }
                    }
                }
                Operand::Empty(_) => {}
                other => self.tokens.add(other.range(), TokenKind::Operand),
            }
        }
    }

    fn extend_diags(&mut self, sink: Vec<Diagnostic>) {
        let resource = self.top_resource();
        for d in sink {
            self.diags.push(d.with_resource(resource.clone()));
        }
    }

    // -- close-out ----------------------------------------------------------

    fn finalize(&mut self, ctx: &mut HlasmContext) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.state = ManagerState::End;
        if !self.owns_closeout {
            return;
        }

        // Implicit literal pool flush at the end of the assembly.
        for idx in ctx.ord.literals.pending() {
            let (length, alignment) = {
                let lit = ctx.ord.literals.get(idx);
                (lit.length, lit.alignment)
            };
            ctx.ord.reserve_storage(length, alignment);
            ctx.ord.literals.mark_defined(idx);
        }

        let ctx = &mut *ctx;
        ctx.deps.close_out(&mut ctx.ord, &mut self.diags);
        tracing::debug!(
            statements = ctx.metrics.statements,
            symbols = ctx.metrics.defined_symbols,
            "analysis finished"
        );
    }
}

/// SETx default for an omitted operand.
fn set_default(instr: CaInstr) -> SetValue {
    match instr {
        CaInstr::SetA => SetValue::A(0),
        CaInstr::SetB => SetValue::B(false),
        _ => SetValue::C(String::new()),
    }
}

fn to_arith_value(v: &SetValue) -> i32 {
    match v {
        SetValue::A(a) => *a,
        SetValue::B(b) => *b as i32,
        SetValue::C(s) => s.trim().parse().unwrap_or(0),
    }
}

/// Split `KEY=VALUE` macro arguments.
fn split_keyword(text: &str) -> Option<(&str, &str)> {
    let idx = text.find('=')?;
    let key = &text[..idx];
    if !key.is_empty() && hlasm_lang_core::IdPool::is_valid_name(key) {
        Some((key, &text[idx + 1..]))
    } else {
        None
    }
}

/// Render one macro-call argument; a parenthesized sublist keeps its
/// entries.
fn render_macro_arg(eval: &mut CaEval<'_>, chain: &ConcatChain) -> MacroArg {
    let text = eval.render_chain(chain).unwrap_or_default();
    let sublist = match chain.0.as_slice() {
        [ConcatElem::Sublist(subs, _)] => subs
            .iter()
            .map(|c| eval.render_chain(c).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    };
    MacroArg { text, sublist }
}

/// Classify a substituted label the way the splitter would have.
fn classify_rendered_label(
    text: &str,
    range: Option<Range>,
    ids: &mut hlasm_lang_core::IdPool,
) -> Label {
    let range = range.unwrap_or_default();
    if text.is_empty() {
        Label::Empty
    } else if let Some(seq) = text.strip_prefix('.') {
        if hlasm_lang_core::IdPool::is_valid_name(seq) {
            Label::Sequence {
                name: ids.intern(seq),
                range,
            }
        } else {
            Label::Text(text.to_string(), range)
        }
    } else if hlasm_lang_core::IdPool::is_valid_name(text) {
        Label::Ordinary {
            name: ids.intern(text),
            range,
        }
    } else {
        Label::Text(text.to_string(), range)
    }
}

