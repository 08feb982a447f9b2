#![forbid(unsafe_code)]
//! HLASM statement parser.
//!
//! This crate turns raw fixed-format source into syntactic statements:
//!
//! - **Logical lines** — column-based field layout, continuation merging,
//!   ICTL column overrides ([`line`])
//! - **Operand lexing** — registers, symbols, self-defining terms, literals,
//!   variable and sequence symbols, attribute references ([`lexer`])
//! - **Machine expressions** — closed AST with a visitor, recursive-descent
//!   parser ([`expr`])
//! - **Data definitions** — DC/DS operands with duplication factor, type,
//!   modifiers and nominal values ([`data_def`])
//! - **Conditional assembly** — concatenation chains, variable symbols,
//!   SETx/AIF expression trees ([`ca`])
//! - **Statements** — the resolved/deferred/error statement sum and the
//!   processing-status-driven operand field parser ([`statement`])
//!
//! The parser is pure: it holds no state between calls, and identifier
//! interning happens through an explicit [`hlasm_lang_core::IdPool`]
//! argument. Reparsing a deferred operand field with the same processing
//! status yields an identical operand list.

pub mod ca;
pub mod data_def;
pub mod expr;
pub mod lexer;
pub mod line;
pub mod statement;

pub use statement::{
    assemble_statement, parse_operand_field, parse_statement, split_fields, CaOperand,
    DeferredStatement, ErrorStatement, InstrField, Label, Operand, OperandHint,
    OperandOccurrence, ParsedFields, ParsedOperands, ProcessingForm, ProcessingKind,
    ProcessingStatus, ResolvedStatement, Statement, StatusKey,
};
