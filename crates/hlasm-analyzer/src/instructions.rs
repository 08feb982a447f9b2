//! Instruction classification tables.
//!
//! Three fixed tables drive statement classification: assembler directives,
//! conditional-assembly instructions, and z/Architecture machine
//! instructions with their encoded lengths. OPSYN aliases resolve through
//! the context's mnemonic table before these are consulted.

/// Conditional-assembly instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaInstr {
    SetA,
    SetB,
    SetC,
    LclA,
    LclB,
    LclC,
    GblA,
    GblB,
    GblC,
    Aif,
    Ago,
    Actr,
    Anop,
    Aread,
    Mexit,
    Macro,
    Mend,
}

impl CaInstr {
    pub fn from_name(name: &str) -> Option<CaInstr> {
        Some(match name {
            "SETA" => CaInstr::SetA,
            "SETB" => CaInstr::SetB,
            "SETC" => CaInstr::SetC,
            "LCLA" => CaInstr::LclA,
            "LCLB" => CaInstr::LclB,
            "LCLC" => CaInstr::LclC,
            "GBLA" => CaInstr::GblA,
            "GBLB" => CaInstr::GblB,
            "GBLC" => CaInstr::GblC,
            "AIF" => CaInstr::Aif,
            "AGO" => CaInstr::Ago,
            "ACTR" => CaInstr::Actr,
            "ANOP" => CaInstr::Anop,
            "AREAD" => CaInstr::Aread,
            "MEXIT" => CaInstr::Mexit,
            "MACRO" => CaInstr::Macro,
            "MEND" => CaInstr::Mend,
            _ => return None,
        })
    }
}

/// Assembler directives handled by the ordinary processor.
const ASM_DIRECTIVES: &[&str] = &[
    "CSECT", "DSECT", "RSECT", "COM", "LOCTR", "EQU", "DC", "DS", "DXD", "COPY", "EXTRN", "WXTRN",
    "ORG", "OPSYN", "AINSERT", "CCW", "CCW0", "CCW1", "CNOP", "START", "ALIAS", "END", "LTORG",
    "USING", "DROP", "PUSH", "POP", "MNOTE", "CXD", "TITLE", "SPACE", "EJECT", "PRINT", "ICTL",
    "AMODE", "RMODE", "ENTRY", "PUNCH",
];

pub fn is_asm_directive(name: &str) -> bool {
    ASM_DIRECTIVES.contains(&name)
}

/// Machine-instruction mnemonics with their encoded byte lengths, by
/// format family. The analyzer only needs lengths for storage layout; the
/// operand encodings themselves are not its concern.
const MACH_2: &[&str] = &[
    // RR and friends.
    "BALR", "BASR", "BCR", "BCTR", "BER", "BHR", "BLR", "BMR", "BNER", "BNHR", "BNLR", "BNMR",
    "BNOR", "BNPR", "BNZR", "BOR", "BPR", "BR", "BZR", "NOPR", "CLR", "CR", "DR", "LCR", "LNR",
    "LPR", "LR", "LTR", "MR", "NR", "OR", "SLR", "SPM", "SR", "SVC", "XR", "ALR", "AR",
];
const MACH_4: &[&str] = &[
    // RX, RS, SI, RI and friends.
    "A", "AH", "AHI", "AL", "B", "BAL", "BAS", "BC", "BCT", "BCTG", "BE", "BH", "BL", "BM", "BNE",
    "BNH", "BNL", "BNM", "BNO", "BNP", "BNZ", "BO", "BP", "BXH", "BXLE", "BZ", "C", "CH", "CHI",
    "CL", "CLI", "CLM", "CS", "CVB", "CVD", "D", "EX", "IC", "ICM", "L", "LA", "LH", "LHI", "LM",
    "LTG", "M", "MH", "MHI", "MVI", "N", "NI", "NOP", "O", "OI", "S", "SH", "SL", "SLA", "SLDA",
    "SLDL", "SLL", "SRA", "SRDA", "SRDL", "SRL", "ST", "STC", "STCM", "STH", "STM", "TM", "TS",
    "X", "XI", "LG", "STG", "AG", "SG", "LGR", "AGR", "SGR",
];
const MACH_6: &[&str] = &[
    // SS, RIL and friends.
    "AP", "BRASL", "BRCL", "CLC", "CLCL", "CP", "DP", "ED", "EDMK", "JLU", "LARL", "LGRL", "MP",
    "MVC", "MVCL", "MVN", "MVO", "MVZ", "NC", "OC", "PACK", "SP", "SRP", "TR", "TRT", "UNPK",
    "XC", "ZAP", "STRL",
];

/// The encoded length of a machine instruction, when the mnemonic is known.
pub fn machine_instr_length(name: &str) -> Option<u32> {
    if MACH_2.contains(&name) {
        Some(2)
    } else if MACH_4.contains(&name) {
        Some(4)
    } else if MACH_6.contains(&name) {
        Some(6)
    } else {
        None
    }
}

/// How an opcode classifies before OPSYN aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeKind {
    Asm,
    Ca(CaInstr),
    Machine(u32),
}

pub fn classify_opcode(name: &str) -> Option<OpcodeKind> {
    if let Some(ca) = CaInstr::from_name(name) {
        return Some(OpcodeKind::Ca(ca));
    }
    if is_asm_directive(name) {
        return Some(OpcodeKind::Asm);
    }
    machine_instr_length(name).map(OpcodeKind::Machine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives() {
        assert!(is_asm_directive("CSECT"));
        assert!(is_asm_directive("LTORG"));
        assert!(!is_asm_directive("SETA"));
    }

    #[test]
    fn test_ca_instructions() {
        assert_eq!(CaInstr::from_name("AIF"), Some(CaInstr::Aif));
        assert_eq!(CaInstr::from_name("SETC"), Some(CaInstr::SetC));
        assert_eq!(CaInstr::from_name("MVC"), None);
    }

    #[test]
    fn test_machine_lengths() {
        assert_eq!(machine_instr_length("LR"), Some(2));
        assert_eq!(machine_instr_length("L"), Some(4));
        assert_eq!(machine_instr_length("MVC"), Some(6));
        assert_eq!(machine_instr_length("NOSUCH"), None);
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(classify_opcode("MEND"), Some(OpcodeKind::Ca(CaInstr::Mend)));
        assert_eq!(classify_opcode("DC"), Some(OpcodeKind::Asm));
        assert_eq!(classify_opcode("LR"), Some(OpcodeKind::Machine(2)));
        assert_eq!(classify_opcode("ZZZ"), None);
    }
}
