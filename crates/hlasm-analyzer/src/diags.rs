//! Diagnostic constructors.
//!
//! One function per code, so call sites read like the messages they emit.
//! Codes follow the HLASM convention: `A...` for operand-format checks,
//! `E...` for semantic errors, `W...` for warnings, `MNOTE` for programmer
//! messages with a level-derived severity.

use hlasm_lang_core::{Diagnostic, Range, Severity};

pub fn a011(instr: &str, range: Range) -> Diagnostic {
    Diagnostic::error("A011", format!("{instr}: operand format is not valid"), range)
}

pub fn a011_exact(instr: &str, expected: usize, range: Range) -> Diagnostic {
    Diagnostic::error(
        "A011",
        format!("{instr} must have exactly {expected} operands"),
        range,
    )
}

pub fn a012_from_to(instr: &str, from: usize, to: usize, range: Range) -> Diagnostic {
    Diagnostic::error(
        "A012",
        format!("{instr} must have {from} to {to} operands"),
        range,
    )
}

pub fn a021_cannot_be_empty(instr: &str, range: Range) -> Diagnostic {
    Diagnostic::error("A021", format!("{instr} operand cannot be empty"), range)
}

pub fn a104_using_first(range: Range) -> Diagnostic {
    Diagnostic::error(
        "A104",
        "USING first operand must be a base address or (base,end)",
        range,
    )
}

pub fn a115_org_format(range: Range) -> Diagnostic {
    Diagnostic::error("A115", "ORG operand format is not valid", range)
}

pub fn a116_org_boundary(range: Range) -> Diagnostic {
    Diagnostic::error(
        "A116",
        "ORG boundary must be a power of 2 between 2 and 4096",
        range,
    )
}

pub fn a117_mnote_message(range: Range) -> Diagnostic {
    Diagnostic::error("A117", "MNOTE message exceeds 1020 bytes", range)
}

pub fn a118_mnote_operands(range: Range) -> Diagnostic {
    Diagnostic::error("A118", "MNOTE operands exceed the permitted length", range)
}

pub fn a119_mnote_level(range: Range) -> Diagnostic {
    Diagnostic::error("A119", "MNOTE level must be * or a value 0 through 255", range)
}

pub fn a129_extrn_format(range: Range) -> Diagnostic {
    Diagnostic::error(
        "A129",
        "EXTRN operand must be a symbol or PART(symbol,...)",
        range,
    )
}

pub fn a132_equ_value(range: Range) -> Diagnostic {
    Diagnostic::error("A132", "EQU value operand format is not valid", range)
}

pub fn a133_equ_length(range: Range) -> Diagnostic {
    Diagnostic::error(
        "A133",
        "EQU length attribute must be an absolute value 0 through 65535",
        range,
    )
}

pub fn a134_equ_type(range: Range) -> Diagnostic {
    Diagnostic::error(
        "A134",
        "EQU type attribute must be an absolute value 0 through 255",
        range,
    )
}

pub fn a141_drop_format(range: Range) -> Diagnostic {
    Diagnostic::error("A141", "DROP operand must be a base register or label", range)
}

pub fn a148_space_value(range: Range) -> Diagnostic {
    Diagnostic::error("A148", "SPACE operand must be a non-negative absolute value", range)
}

pub fn a156_ainsert_destination(range: Range) -> Diagnostic {
    Diagnostic::error("A156", "AINSERT second operand must be BACK or FRONT", range)
}

pub fn a157_ainsert_record(range: Range) -> Diagnostic {
    Diagnostic::error("A157", "AINSERT record exceeds the permitted length", range)
}

pub fn a163_alias_label(range: Range) -> Diagnostic {
    Diagnostic::error("A163", "ALIAS requires a name field", range)
}

pub fn a164_using_mapping(range: Range) -> Diagnostic {
    Diagnostic::error("A164", "USING base operand must be an expression", range)
}

pub fn a165_pop_using(range: Range) -> Diagnostic {
    Diagnostic::error("A165", "POP USING without a previous PUSH", range)
}

pub fn a245_org_expression(range: Range) -> Diagnostic {
    Diagnostic::error("A245", "ORG requires a relocatable expression", range)
}

pub fn a246_opsyn_operand(range: Range) -> Diagnostic {
    Diagnostic::error("A246", "OPSYN operand is not an operation code", range)
}

pub fn a249_sequence_symbol_expected(range: Range) -> Diagnostic {
    Diagnostic::warning("A249", "name field is not a sequence symbol", range)
}

pub fn a250_absolute_expected(range: Range) -> Diagnostic {
    Diagnostic::error(
        "A250",
        "operand must be an absolute value composed of known symbols",
        range,
    )
}

pub fn a251_unexpected_label(range: Range) -> Diagnostic {
    Diagnostic::warning("A251", "label on DROP is not expected", range)
}

pub fn a300_apostrophes(instr: &str, range: Range) -> Diagnostic {
    Diagnostic::warning(
        "A300",
        format!("{instr} operand should be enclosed in apostrophes"),
        range,
    )
}

pub fn a301_apostrophes(instr: &str, range: Range) -> Diagnostic {
    Diagnostic::error(
        "A301",
        format!("{instr} operand must be enclosed in apostrophes"),
        range,
    )
}

pub fn e031(kind: &str, range: Range) -> Diagnostic {
    Diagnostic::error("E031", format!("{kind} is already defined"), range)
}

pub fn e032(value: &str, range: Range) -> Diagnostic {
    Diagnostic::error(
        "E032",
        format!("unexpected absolute END operand value {value}"),
        range,
    )
}

pub fn e033(range: Range) -> Diagnostic {
    Diagnostic::error(
        "E033",
        "cyclic or unresolvable symbol dependency",
        range,
    )
}

pub fn e047(name: &str, range: Range) -> Diagnostic {
    Diagnostic::error("E047", format!("sequence symbol .{name} is not defined"), range)
}

pub fn e049(name: &str, range: Range) -> Diagnostic {
    Diagnostic::error("E049", format!("operation code {name} not found"), range)
}

pub fn e053(range: Range) -> Diagnostic {
    Diagnostic::error("E053", "name field is required", range)
}

pub fn e058(range: Range) -> Diagnostic {
    Diagnostic::error("E058", "unknown COPY member", range)
}

pub fn e062(range: Range) -> Diagnostic {
    Diagnostic::error("E062", "recursive COPY", range)
}

pub fn e065(range: Range) -> Diagnostic {
    Diagnostic::error("E065", "created symbol name is not valid", range)
}

pub fn e068(range: Range) -> Diagnostic {
    Diagnostic::error("E068", "ORG target is before the section origin", range)
}

pub fn e073(range: Range) -> Diagnostic {
    Diagnostic::error(
        "E073",
        "START is not allowed after an executable or read-only section",
        range,
    )
}

pub fn w016(range: Range) -> Diagnostic {
    Diagnostic::warning("W016", "multiple TITLE statements carry a name", range)
}

pub fn w063(range: Range) -> Diagnostic {
    Diagnostic::warning("W063", "ACTR branch limit exceeded", range)
}

/// MNOTE severity from its level.
pub fn mnote_severity(level: u32) -> Severity {
    match level {
        0..=1 => Severity::Hint,
        2..=3 => Severity::Info,
        4..=7 => Severity::Warning,
        _ => Severity::Error,
    }
}

pub fn mnote(level: u32, message: &str, range: Range) -> Diagnostic {
    let d = Diagnostic::error("MNOTE", message, range);
    Diagnostic {
        severity: mnote_severity(level),
        ..d
    }
}
