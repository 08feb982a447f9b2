//! Statements and processing-status-driven operand parsing.
//!
//! A statement is one of three things: *resolved* (fields fully parsed),
//! *deferred* (operand field kept raw because the opcode's format is not
//! known yet), or *error*. Deferred statements are reparsed later under a
//! concrete [`ProcessingStatus`]; reparsing with the same status yields the
//! same operand list, so results are cacheable by status key.

use hlasm_lang_core::{Diagnostic, Id, IdPool, Position, Range};

use crate::ca::{parse_ca_expr, parse_concat_chain, parse_var_symbol, CaExpr, ConcatChain, VarSymbol};
use crate::data_def::{parse_data_def, DataDef};
use crate::expr::{parse_mach_expr, MachExpr, MachExprVisitor};
use crate::lexer::{tokenize, Lexeme, Token};
use crate::line::LogicalLine;

// ---------------------------------------------------------------------------
//  Processing status
// ---------------------------------------------------------------------------

/// How a statement's operand field is to be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingForm {
    Machine,
    Assembler,
    Macro,
    ConditionalAssembly,
    Deferred,
    Unknown,
    Ignored,
}

/// Whether the operand field participates at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandOccurrence {
    Present,
    Absent,
}

/// Which processor is consuming the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingKind {
    Ordinary,
    MacroDef,
    Lookahead,
    Copy,
}

/// The complete processing status of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessingStatus {
    pub form: ProcessingForm,
    pub occurrence: OperandOccurrence,
    pub kind: ProcessingKind,
}

/// Cache key for deferred-statement reparses: the kind does not influence
/// the operand format, only form and occurrence do.
pub type StatusKey = (ProcessingForm, OperandOccurrence);

impl ProcessingStatus {
    pub fn new(form: ProcessingForm, occurrence: OperandOccurrence, kind: ProcessingKind) -> Self {
        Self {
            form,
            occurrence,
            kind,
        }
    }

    pub fn cache_key(&self) -> StatusKey {
        (self.form, self.occurrence)
    }
}

// ---------------------------------------------------------------------------
//  Fields
// ---------------------------------------------------------------------------

/// The label field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Empty,
    /// A valid ordinary symbol.
    Ordinary { name: Id, range: Range },
    /// A sequence symbol: `.NAME`.
    Sequence { name: Id, range: Range },
    /// Contains variable symbols; resolved by substitution.
    Variable(ConcatChain),
    /// Anything else (TITLE deck ids and the like).
    Text(String, Range),
}

impl Label {
    /// The ordinary-symbol name, if that is what the label is.
    pub fn ordinary(&self) -> Option<Id> {
        match self {
            Label::Ordinary { name, .. } => Some(*name),
            _ => None,
        }
    }

    pub fn range(&self) -> Option<Range> {
        match self {
            Label::Empty => None,
            Label::Ordinary { range, .. } | Label::Sequence { range, .. } | Label::Text(_, range) => {
                Some(*range)
            }
            Label::Variable(chain) => Some(chain.range()),
        }
    }
}

/// The instruction field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrField {
    Empty,
    Id { name: Id, range: Range },
    /// Contains variable symbols; the opcode is known only after
    /// substitution.
    Chain(ConcatChain),
}

impl InstrField {
    pub fn id(&self) -> Option<Id> {
        match self {
            InstrField::Id { name, .. } => Some(*name),
            _ => None,
        }
    }

    pub fn range(&self) -> Option<Range> {
        match self {
            InstrField::Empty => None,
            InstrField::Id { range, .. } => Some(*range),
            InstrField::Chain(chain) => Some(chain.range()),
        }
    }
}

/// A conditional-assembly operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaOperand {
    Expr(CaExpr),
    /// `(condition).TARGET` or plain `.TARGET`.
    Branch {
        condition: Option<CaExpr>,
        target: Id,
        range: Range,
    },
    /// A bare variable symbol (LCL/GBL declarations, SET targets).
    Var(VarSymbol),
}

impl CaOperand {
    pub fn range(&self) -> Range {
        match self {
            CaOperand::Expr(e) => e.range(),
            CaOperand::Branch { range, .. } => *range,
            CaOperand::Var(v) => v.range,
        }
    }
}

/// A parsed operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Empty(Range),
    /// A machine/assembler expression.
    Expr(MachExpr),
    /// `(base,end)` pair (USING).
    BaseEnd {
        base: MachExpr,
        end: MachExpr,
        range: Range,
    },
    /// `NAME(arg,...)` complex operand (EXTRN PART, preprocessor options).
    Complex {
        name: String,
        args: Vec<String>,
        range: Range,
    },
    /// A quoted string.
    String(String, Range),
    /// A DC/DS data definition.
    DataDef(Box<DataDef>),
    /// A conditional-assembly operand.
    Ca(CaOperand),
    /// Contains variable symbols; substituted and reparsed later.
    Model(ConcatChain),
}

impl Operand {
    pub fn range(&self) -> Range {
        match self {
            Operand::Empty(r) | Operand::String(_, r) => *r,
            Operand::Expr(e) => e.range(),
            Operand::BaseEnd { range, .. } | Operand::Complex { range, .. } => *range,
            Operand::DataDef(dd) => dd.range,
            Operand::Ca(ca) => ca.range(),
            Operand::Model(chain) => chain.range(),
        }
    }

    /// The expression, if this operand is one.
    pub fn expr(&self) -> Option<&MachExpr> {
        match self {
            Operand::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Operand::Empty(_))
    }
}

// ---------------------------------------------------------------------------
//  Statements
// ---------------------------------------------------------------------------

/// A fully parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStatement {
    pub label: Label,
    pub instruction: InstrField,
    pub operands: Vec<Operand>,
    /// Range of the whole operand field.
    pub operand_range: Range,
    /// Remark ranges, one per physical line chunk.
    pub remarks: Vec<Range>,
    /// Literal texts referenced by the operands.
    pub literals: Vec<String>,
    /// Range of the whole statement.
    pub range: Range,
    pub status: ProcessingStatus,
}

/// A statement whose operand field awaits a concrete format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredStatement {
    pub label: Label,
    pub instruction: InstrField,
    pub operand_text: String,
    /// Position of each operand-field character (for reparse ranges).
    pub operand_positions: Vec<Position>,
    pub remarks: Vec<Range>,
    pub range: Range,
}

/// A statement that failed to parse at the field level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStatement {
    pub range: Range,
    pub diags: Vec<Diagnostic>,
}

/// The statement sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Resolved(ResolvedStatement),
    Deferred(DeferredStatement),
    Error(ErrorStatement),
}

// ---------------------------------------------------------------------------
//  Field splitting
// ---------------------------------------------------------------------------

/// Output of [`split_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFields {
    pub label: Label,
    pub instruction: InstrField,
    pub operand_text: String,
    pub operand_positions: Vec<Position>,
    pub remarks: Vec<Range>,
    pub range: Range,
}

/// Concatenated logical-line text plus a map from char index to source
/// position.
fn build_text_map(ll: &LogicalLine) -> (Vec<char>, Vec<Position>) {
    let mut chars = Vec::new();
    let mut map = Vec::new();
    for seg in &ll.segments {
        let line = seg.lineno as u32;
        let mut col = seg.code_start;
        for c in seg.code.chars() {
            chars.push(c);
            map.push(Position::new(line, col));
            col += c.len_utf16() as u32;
        }
    }
    // One-past-the-end anchor.
    let end = ll
        .segments
        .last()
        .map(|s| Position::new(s.lineno as u32, s.code_end))
        .unwrap_or_default();
    map.push(end);
    (chars, map)
}

fn range_of(map: &[Position], from: usize, to: usize) -> Range {
    let start = map.get(from).copied().unwrap_or_default();
    let end = if to > from && to <= map.len() {
        let last = map[to - 1];
        // One past the last char on its own line.
        Position::new(last.line, last.column + 1)
    } else {
        start
    };
    Range::new(start, end)
}

/// Split a logical line into label, instruction, operand field and remarks.
pub fn split_fields(ll: &LogicalLine, ids: &mut IdPool) -> ParsedFields {
    let (chars, map) = build_text_map(ll);
    let len = chars.len();
    let full_range = range_of(&map, 0, len);

    let mut i = 0usize;

    // Label field: non-blank from column one.
    let label_start = i;
    while i < len && chars[i] != ' ' {
        i += 1;
    }
    let label_text: String = chars[label_start..i].iter().collect();
    let label_range = range_of(&map, label_start, i);
    let label = classify_label(&label_text, label_range, ids);

    // Instruction field.
    while i < len && chars[i] == ' ' {
        i += 1;
    }
    let instr_start = i;
    while i < len && chars[i] != ' ' {
        i += 1;
    }
    let instr_text: String = chars[instr_start..i].iter().collect();
    let instr_range = range_of(&map, instr_start, i);
    let instruction = if instr_text.is_empty() {
        InstrField::Empty
    } else if instr_text.contains('&') {
        let lexemes = remap(tokenize(&instr_text, 0, 0), &map[instr_start..]);
        let mut pos = 0;
        InstrField::Chain(parse_concat_chain(&lexemes, &mut pos, ids, &[]))
    } else {
        InstrField::Id {
            name: ids.intern(&instr_text),
            range: instr_range,
        }
    };

    // Operand field: up to the first blank outside quotes.
    while i < len && chars[i] == ' ' {
        i += 1;
    }
    let op_start = i;
    let mut in_quote = false;
    while i < len {
        match chars[i] {
            '\'' => in_quote = !in_quote,
            ' ' if !in_quote => break,
            _ => {}
        }
        i += 1;
    }
    let operand_text: String = chars[op_start..i].iter().collect();
    let operand_positions: Vec<Position> = map[op_start..=i.min(len)].to_vec();

    // Remarks: the rest, one range per physical line.
    while i < len && chars[i] == ' ' {
        i += 1;
    }
    let mut remarks = Vec::new();
    if i < len {
        let mut start = i;
        let mut j = i + 1;
        while j <= len {
            let split = j == len || map[j].line != map[start].line;
            if split {
                remarks.push(range_of(&map, start, j));
                start = j;
            }
            j += 1;
        }
    }

    ParsedFields {
        label,
        instruction,
        operand_text,
        operand_positions,
        remarks,
        range: full_range,
    }
}

fn classify_label(text: &str, range: Range, ids: &mut IdPool) -> Label {
    if text.is_empty() {
        return Label::Empty;
    }
    if let Some(seq) = text.strip_prefix('.') {
        if IdPool::is_valid_name(seq) {
            return Label::Sequence {
                name: ids.intern(seq),
                range,
            };
        }
    }
    if text.contains('&') {
        let lexemes = tokenize(text, range.start.line, range.start.column);
        let mut pos = 0;
        return Label::Variable(parse_concat_chain(&lexemes, &mut pos, ids, &[]));
    }
    if IdPool::is_valid_name(text) {
        return Label::Ordinary {
            name: ids.intern(text),
            range,
        };
    }
    Label::Text(text.to_string(), range)
}

/// Remap synthetic lexeme ranges (line 0, column = char index) through a
/// position map.
fn remap(mut lexemes: Vec<Lexeme>, map: &[Position]) -> Vec<Lexeme> {
    for lx in &mut lexemes {
        let from = lx.range.start.column as usize;
        let to = lx.range.end.column as usize;
        lx.range = range_of(map, from, to);
    }
    lexemes
}

// ---------------------------------------------------------------------------
//  Operand-field parsing
// ---------------------------------------------------------------------------

/// Instruction-specific operand format hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandHint {
    None,
    /// DC/DS: operands are data definitions.
    DataDef,
}

/// Result of operand-field parsing.
#[derive(Debug, Clone, Default)]
pub struct ParsedOperands {
    pub operands: Vec<Operand>,
    pub literals: Vec<String>,
    pub diags: Vec<Diagnostic>,
}

struct LiteralCollector<'a>(&'a mut Vec<String>);

impl MachExprVisitor for LiteralCollector<'_> {
    fn visit_literal(&mut self, text: &str, _range: Range) {
        if !self.0.iter().any(|t| t == text) {
            self.0.push(text.to_string());
        }
    }
}

/// Parse an operand field under a processing status.
///
/// `positions` maps each character of `text` to its source position; pass
/// the slice captured by [`split_fields`] for accurate ranges.
pub fn parse_operand_field(
    text: &str,
    positions: &[Position],
    status: &ProcessingStatus,
    hint: OperandHint,
    ids: &mut IdPool,
) -> ParsedOperands {
    let mut out = ParsedOperands::default();

    if matches!(status.occurrence, OperandOccurrence::Absent)
        || matches!(
            status.form,
            ProcessingForm::Unknown | ProcessingForm::Ignored | ProcessingForm::Deferred
        )
        || text.is_empty()
    {
        return out;
    }

    let lexemes = remap(tokenize(text, 0, 0), positions);

    // Model operands: variable symbols anywhere mean the field needs
    // substitution first (except under the macro-call form, where chains are
    // the normal representation).
    if status.form != ProcessingForm::Macro
        && status.form != ProcessingForm::ConditionalAssembly
        && text.contains('&')
    {
        let mut pos = 0;
        let chain = parse_concat_chain(&lexemes, &mut pos, ids, &[]);
        out.operands.push(Operand::Model(chain));
        return out;
    }

    for group in split_top_level(&lexemes) {
        let operand = match status.form {
            ProcessingForm::ConditionalAssembly => parse_ca_operand(group, ids),
            ProcessingForm::Macro => parse_macro_operand(group, ids),
            ProcessingForm::Machine => parse_machine_operand(group, ids),
            _ => match hint {
                OperandHint::DataDef => parse_data_def_operand(group, ids),
                OperandHint::None => parse_asm_operand(group, ids),
            },
        };
        match operand {
            Ok(op) => {
                if let Operand::Expr(e) = &op {
                    e.apply(&mut LiteralCollector(&mut out.literals));
                }
                out.operands.push(op);
            }
            Err(diag) => {
                out.diags.push(diag);
                let r = group
                    .first()
                    .map(|l| l.range)
                    .unwrap_or_default();
                out.operands.push(Operand::Empty(r));
            }
        }
    }

    out
}

/// Split lexemes into operand groups at top-level commas. Consecutive
/// commas produce empty groups.
fn split_top_level(lexemes: &[Lexeme]) -> Vec<&[Lexeme]> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, lx) in lexemes.iter().enumerate() {
        match lx.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                groups.push(&lexemes[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&lexemes[start..]);
    // A fully empty field means no operands at all.
    if groups.len() == 1 && groups[0].is_empty() {
        return Vec::new();
    }
    groups
}

fn group_range(group: &[Lexeme]) -> Range {
    let mut it = group.iter().map(|l| l.range);
    match it.next() {
        Some(first) => it.fold(first, Range::union),
        None => Range::default(),
    }
}

fn parse_asm_operand(group: &[Lexeme], ids: &mut IdPool) -> Result<Operand, Diagnostic> {
    let range = group_range(group);
    if group.is_empty() {
        return Ok(Operand::Empty(range));
    }

    // 'string'
    if let [Lexeme {
        token: Token::QuotedString(s),
        range,
    }] = group
    {
        return Ok(Operand::String(s.clone(), *range));
    }

    // NAME(args...)
    if group.len() >= 3 {
        if let (Token::Symbol(name), Token::LParen, Token::RParen) = (
            &group[0].token,
            &group[1].token,
            &group[group.len() - 1].token,
        ) {
            let inner = &group[2..group.len() - 1];
            // Only treat as complex when the inner part is a plain list.
            if inner
                .iter()
                .all(|l| matches!(l.token, Token::Symbol(_) | Token::Number(_) | Token::Comma | Token::QuotedString(_)))
                && inner.iter().any(|l| !matches!(l.token, Token::Comma))
                && !matches!(name.to_uppercase().as_str(), "L")
            {
                let mut args = Vec::new();
                for part in inner.split(|l| matches!(l.token, Token::Comma)) {
                    let text: String = part.iter().map(|l| l.token.to_string()).collect();
                    if !text.is_empty() {
                        args.push(text);
                    }
                }
                return Ok(Operand::Complex {
                    name: name.clone(),
                    args,
                    range,
                });
            }
        }
    }

    // (base,end) pair.
    if matches!(group.first().map(|l| &l.token), Some(Token::LParen))
        && matches!(group.last().map(|l| &l.token), Some(Token::RParen))
    {
        let inner = &group[1..group.len() - 1];
        let mut depth = 0usize;
        let split = inner.iter().position(|l| match l.token {
            Token::LParen => {
                depth += 1;
                false
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                false
            }
            Token::Comma => depth == 0,
            _ => false,
        });
        if let Some(comma) = split {
            let mut p1 = 0;
            let base = parse_mach_expr(&inner[..comma], &mut p1, ids);
            let mut p2 = 0;
            let end = parse_mach_expr(&inner[comma + 1..], &mut p2, ids);
            if let (Some(base), Some(end)) = (base, end) {
                return Ok(Operand::BaseEnd { base, end, range });
            }
        }
    }

    let mut pos = 0;
    match parse_mach_expr(group, &mut pos, ids) {
        Some(e) if pos == group.len() => Ok(Operand::Expr(e)),
        _ => Err(Diagnostic::error(
            "A011",
            "invalid operand format",
            range,
        )),
    }
}

/// Machine operands: an address expression, optionally with a
/// `(base[,index])` or `(length)` suffix. The suffix does not take part in
/// semantic analysis; it only has to parse.
fn parse_machine_operand(group: &[Lexeme], ids: &mut IdPool) -> Result<Operand, Diagnostic> {
    let range = group_range(group);
    if group.is_empty() {
        return Ok(Operand::Empty(range));
    }

    let mut pos = 0;
    let Some(first) = parse_mach_expr(group, &mut pos, ids) else {
        return Err(Diagnostic::error("A011", "invalid operand format", range));
    };
    if pos == group.len() {
        return Ok(Operand::Expr(first));
    }

    if matches!(group[pos].token, Token::LParen) {
        pos += 1;
        // Base may be omitted: D(,X).
        if !matches!(group.get(pos).map(|l| &l.token), Some(Token::Comma)) {
            let _ = parse_mach_expr(group, &mut pos, ids);
        }
        if matches!(group.get(pos).map(|l| &l.token), Some(Token::Comma)) {
            pos += 1;
            let _ = parse_mach_expr(group, &mut pos, ids);
        }
        if matches!(group.get(pos).map(|l| &l.token), Some(Token::RParen)) {
            pos += 1;
        }
        if pos == group.len() {
            return Ok(Operand::Expr(first));
        }
    }

    Err(Diagnostic::error("A011", "invalid operand format", range))
}

fn parse_data_def_operand(group: &[Lexeme], ids: &mut IdPool) -> Result<Operand, Diagnostic> {
    let range = group_range(group);
    if group.is_empty() {
        return Ok(Operand::Empty(range));
    }
    let mut pos = 0;
    match parse_data_def(group, &mut pos, ids) {
        Some(dd) if pos == group.len() => Ok(Operand::DataDef(Box::new(dd))),
        _ => Err(Diagnostic::error(
            "A011",
            "invalid data definition operand",
            range,
        )),
    }
}

fn parse_ca_operand(group: &[Lexeme], ids: &mut IdPool) -> Result<Operand, Diagnostic> {
    let range = group_range(group);
    if group.is_empty() {
        return Ok(Operand::Empty(range));
    }

    // .TARGET
    if let [Lexeme {
        token: Token::SeqSymbol(name),
        range,
    }] = group
    {
        return Ok(Operand::Ca(CaOperand::Branch {
            condition: None,
            target: ids.intern(name),
            range: *range,
        }));
    }

    // (condition).TARGET
    if matches!(group.first().map(|l| &l.token), Some(Token::LParen)) {
        if let Some(Lexeme {
            token: Token::SeqSymbol(name),
            ..
        }) = group.last()
        {
            let mut pos = 1;
            if let Some(cond) = parse_ca_expr(&group[..group.len() - 1], &mut pos, ids) {
                let closed = matches!(
                    group.get(pos).map(|l| &l.token),
                    Some(Token::RParen)
                );
                if closed && pos + 2 == group.len() {
                    return Ok(Operand::Ca(CaOperand::Branch {
                        condition: Some(cond),
                        target: ids.intern(name),
                        range,
                    }));
                }
            }
        }
    }

    // Bare variable symbol (declarations, subscripted or not).
    if matches!(
        group.first().map(|l| &l.token),
        Some(Token::VarSymbol(_)) | Some(Token::Amp)
    ) {
        let mut pos = 0;
        if let Some(vs) = parse_var_symbol(group, &mut pos, ids) {
            if pos == group.len() {
                return Ok(Operand::Ca(CaOperand::Var(vs)));
            }
        }
    }

    let mut pos = 0;
    match parse_ca_expr(group, &mut pos, ids) {
        Some(e) if pos == group.len() => Ok(Operand::Ca(CaOperand::Expr(e))),
        _ => Err(Diagnostic::error(
            "A011",
            "invalid conditional assembly operand",
            range,
        )),
    }
}

fn parse_macro_operand(group: &[Lexeme], ids: &mut IdPool) -> Result<Operand, Diagnostic> {
    let range = group_range(group);
    if group.is_empty() {
        return Ok(Operand::Empty(range));
    }
    let mut pos = 0;
    let chain = parse_concat_chain(group, &mut pos, ids, &[]);
    Ok(Operand::Model(chain))
}

// ---------------------------------------------------------------------------
//  Statement assembly
// ---------------------------------------------------------------------------

/// Parse a complete statement from a logical line under a known status.
pub fn parse_statement(
    ll: &LogicalLine,
    status: ProcessingStatus,
    hint: OperandHint,
    ids: &mut IdPool,
) -> (Statement, Vec<Diagnostic>) {
    let fields = split_fields(ll, ids);
    assemble_statement(fields, status, hint, ids)
}

/// Turn split fields into a statement under a known status.
pub fn assemble_statement(
    fields: ParsedFields,
    status: ProcessingStatus,
    hint: OperandHint,
    ids: &mut IdPool,
) -> (Statement, Vec<Diagnostic>) {
    if status.form == ProcessingForm::Deferred {
        return (
            Statement::Deferred(DeferredStatement {
                label: fields.label,
                instruction: fields.instruction,
                operand_text: fields.operand_text,
                operand_positions: fields.operand_positions,
                remarks: fields.remarks,
                range: fields.range,
            }),
            Vec::new(),
        );
    }

    let parsed = parse_operand_field(
        &fields.operand_text,
        &fields.operand_positions,
        &status,
        hint,
        ids,
    );

    let operand_range = if fields.operand_text.is_empty() {
        Range::point(fields.range.end)
    } else {
        range_from_positions(&fields.operand_positions, fields.operand_text.chars().count())
    };

    (
        Statement::Resolved(ResolvedStatement {
            label: fields.label,
            instruction: fields.instruction,
            operands: parsed.operands,
            operand_range,
            remarks: fields.remarks,
            literals: parsed.literals,
            range: fields.range,
            status,
        }),
        parsed.diags,
    )
}

fn range_from_positions(positions: &[Position], char_len: usize) -> Range {
    let start = positions.first().copied().unwrap_or_default();
    let end = positions
        .get(char_len)
        .copied()
        .or_else(|| positions.last().copied())
        .unwrap_or_default();
    Range::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{extract_logical_line, IctlColumns};

    fn logical(text: &str) -> LogicalLine {
        extract_logical_line(&[text], 0, &IctlColumns::default())
            .unwrap()
            .0
    }

    fn asm_status() -> ProcessingStatus {
        ProcessingStatus::new(
            ProcessingForm::Assembler,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        )
    }

    #[test]
    fn test_split_fields_full() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("LABEL    EQU   1+2          A REMARK"), &mut ids);
        assert!(matches!(f.label, Label::Ordinary { .. }));
        assert_eq!(f.instruction.id(), ids.find("EQU"));
        assert_eq!(f.operand_text, "1+2");
        assert_eq!(f.remarks.len(), 1);
    }

    #[test]
    fn test_split_fields_no_label() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         LR    1,2"), &mut ids);
        assert!(matches!(f.label, Label::Empty));
        assert_eq!(f.instruction.id(), ids.find("LR"));
        assert_eq!(f.operand_text, "1,2");
    }

    #[test]
    fn test_sequence_label() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical(".LOOP    ANOP"), &mut ids);
        assert!(matches!(f.label, Label::Sequence { .. }));
    }

    #[test]
    fn test_variable_label() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("&LBL     DS    F"), &mut ids);
        assert!(matches!(f.label, Label::Variable(_)));
    }

    #[test]
    fn test_quoted_space_stays_in_operands() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         MNOTE 4,'A B C'   REM"), &mut ids);
        assert_eq!(f.operand_text, "4,'A B C'");
    }

    #[test]
    fn test_operand_parsing_expressions() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         ORG   *+100"), &mut ids);
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &asm_status(),
            OperandHint::None,
            &mut ids,
        );
        assert_eq!(parsed.operands.len(), 1);
        assert!(matches!(parsed.operands[0], Operand::Expr(_)));
    }

    #[test]
    fn test_empty_operands_between_commas() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         ORG   ,"), &mut ids);
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &asm_status(),
            OperandHint::None,
            &mut ids,
        );
        assert_eq!(parsed.operands.len(), 2);
        assert!(parsed.operands.iter().all(|o| o.is_empty()));
    }

    #[test]
    fn test_data_def_hint() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("X        DC    F'1',CL8'AB'"), &mut ids);
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &asm_status(),
            OperandHint::DataDef,
            &mut ids,
        );
        assert_eq!(parsed.operands.len(), 2);
        assert!(parsed.operands.iter().all(|o| matches!(o, Operand::DataDef(_))));
    }

    #[test]
    fn test_complex_operand() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         EXTRN PART(A,B)"), &mut ids);
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &asm_status(),
            OperandHint::None,
            &mut ids,
        );
        match &parsed.operands[0] {
            Operand::Complex { name, args, .. } => {
                assert_eq!(name, "PART");
                assert_eq!(args, &["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected Complex, got {other:?}"),
        }
    }

    #[test]
    fn test_ca_branch_operand() {
        let mut ids = IdPool::new();
        let status = ProcessingStatus::new(
            ProcessingForm::ConditionalAssembly,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let f = split_fields(&logical("         AIF   (&I LT 5).LOOP"), &mut ids);
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &status,
            OperandHint::None,
            &mut ids,
        );
        match &parsed.operands[0] {
            Operand::Ca(CaOperand::Branch {
                condition: Some(_),
                target,
                ..
            }) => {
                assert_eq!(Some(*target), ids.find("LOOP"));
            }
            other => panic!("expected Branch, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_collection() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         L     1,=F'100'"), &mut ids);
        let status = ProcessingStatus::new(
            ProcessingForm::Machine,
            OperandOccurrence::Present,
            ProcessingKind::Ordinary,
        );
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &status,
            OperandHint::None,
            &mut ids,
        );
        assert_eq!(parsed.literals, vec!["F'100'".to_string()]);
    }

    #[test]
    fn test_reparse_round_trip() {
        // Deferred statements reparse identically under the same status.
        let mut ids = IdPool::new();
        let (stmt, _) = parse_statement(
            &logical("LBL      UNKNOWN A+1,B"),
            ProcessingStatus::new(
                ProcessingForm::Deferred,
                OperandOccurrence::Present,
                ProcessingKind::Ordinary,
            ),
            OperandHint::None,
            &mut ids,
        );
        let deferred = match stmt {
            Statement::Deferred(d) => d,
            other => panic!("expected Deferred, got {other:?}"),
        };
        let status = asm_status();
        let a = parse_operand_field(
            &deferred.operand_text,
            &deferred.operand_positions,
            &status,
            OperandHint::None,
            &mut ids,
        );
        let b = parse_operand_field(
            &deferred.operand_text,
            &deferred.operand_positions,
            &status,
            OperandHint::None,
            &mut ids,
        );
        assert_eq!(a.operands, b.operands);
    }

    #[test]
    fn test_model_operand_with_variables() {
        let mut ids = IdPool::new();
        let f = split_fields(&logical("         LR    &R1,&R2"), &mut ids);
        let parsed = parse_operand_field(
            &f.operand_text,
            &f.operand_positions,
            &ProcessingStatus::new(
                ProcessingForm::Machine,
                OperandOccurrence::Present,
                ProcessingKind::Ordinary,
            ),
            OperandHint::None,
            &mut ids,
        );
        assert_eq!(parsed.operands.len(), 1);
        assert!(matches!(parsed.operands[0], Operand::Model(_)));
    }
}
