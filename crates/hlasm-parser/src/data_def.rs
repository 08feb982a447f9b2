//! Data-definition operands (DC/DS).
//!
//! Operand form: `dDTLn'nominal'` — duplication factor, type (plus optional
//! extension), modifiers (length `Ln` or bit length `L.n`, scale `Sn`,
//! exponent `En`), and a nominal value in quotes or parentheses.
//!
//! Alignment and implicit length come from the type; an explicit length
//! modifier forces byte alignment.

use hlasm_lang_core::{IdPool, Range};

use crate::expr::{parse_mach_expr, MachExpr};
use crate::lexer::{Lexeme, Token};

/// Storage alignment: number of bytes of the boundary (1 = none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Alignment {
    pub boundary: u32,
}

impl Alignment {
    pub const NONE: Alignment = Alignment { boundary: 1 };
    pub const HALFWORD: Alignment = Alignment { boundary: 2 };
    pub const FULLWORD: Alignment = Alignment { boundary: 4 };
    pub const DOUBLEWORD: Alignment = Alignment { boundary: 8 };
}

/// A modifier or duplication-factor value: a plain number or an expression
/// in parentheses (which may reference symbols).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Value(i32, Range),
    Expr(MachExpr),
}

impl Modifier {
    pub fn range(&self) -> Range {
        match self {
            Modifier::Value(_, r) => *r,
            Modifier::Expr(e) => e.range(),
        }
    }

    /// The constant value, when no symbols are involved.
    pub fn as_const(&self) -> Option<i32> {
        match self {
            Modifier::Value(v, _) => Some(*v),
            Modifier::Expr(_) => None,
        }
    }
}

/// The nominal value of a data definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nominal {
    /// Quoted form: `C'TEXT'`, `F'1,2,3'`.
    String(String, Range),
    /// Parenthesized form: `A(X,Y)`.
    Exprs(Vec<MachExpr>),
}

/// A parsed data-definition operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDef {
    pub dupl: Option<Modifier>,
    pub type_char: char,
    pub type_extension: Option<char>,
    pub length: Option<Modifier>,
    /// `L.n` — length counted in bits.
    pub bit_length: bool,
    pub scale: Option<Modifier>,
    pub exponent: Option<Modifier>,
    pub nominal: Option<Nominal>,
    pub range: Range,
}

impl DataDef {
    /// Required alignment: the type's natural boundary, unless an explicit
    /// length modifier forces byte alignment.
    pub fn alignment(&self) -> Alignment {
        if self.length.is_some() {
            return Alignment::NONE;
        }
        type_alignment(self.type_char)
    }

    /// The type attribute this definition gives to its label.
    pub fn type_attr(&self) -> char {
        self.type_char
    }

    /// Number of nominal items (duplication within the nominal value).
    pub fn nominal_count(&self) -> u32 {
        match &self.nominal {
            Some(Nominal::Exprs(list)) => list.len() as u32,
            Some(Nominal::String(text, _)) => match self.type_char {
                // Numeric quoted nominals hold comma-separated items.
                'F' | 'H' | 'E' | 'D' | 'L' | 'P' | 'Z' | 'Y' => {
                    text.split(',').count() as u32
                }
                _ => 1,
            },
            None => 1,
        }
    }

    /// Length in bytes of a single nominal item, without the duplication
    /// factor, when it is syntactically determined. `None` when a length
    /// modifier expression needs evaluation.
    pub fn item_length(&self) -> Option<u32> {
        if let Some(len) = &self.length {
            let v = len.as_const()?;
            let v = v.max(0) as u32;
            return Some(if self.bit_length { (v + 7) / 8 } else { v });
        }
        Some(implicit_length(
            self.type_char,
            self.nominal.as_ref(),
        ))
    }

    /// The length attribute of the label: explicit length if present, else
    /// the implicit per-item length.
    pub fn length_attr(&self) -> Option<u32> {
        self.item_length()
    }

    /// The scale attribute, when constant.
    pub fn scale_attr(&self) -> Option<i16> {
        match &self.scale {
            Some(m) => m.as_const().map(|v| v as i16),
            None => Some(0),
        }
    }

    /// Whether any modifier carries a symbol-dependent expression.
    pub fn has_modifier_dependencies(&self) -> bool {
        let dep = |m: &Option<Modifier>| matches!(m, Some(Modifier::Expr(_)));
        dep(&self.dupl) || dep(&self.length) || dep(&self.scale) || dep(&self.exponent)
    }
}

/// Natural alignment of a data type.
pub fn type_alignment(type_char: char) -> Alignment {
    match type_char {
        'H' | 'Y' | 'S' => Alignment::HALFWORD,
        'F' | 'E' | 'A' | 'V' | 'J' | 'Q' => Alignment::FULLWORD,
        'D' | 'L' => Alignment::DOUBLEWORD,
        _ => Alignment::NONE,
    }
}

/// Implicit length in bytes for one nominal item of a type.
pub fn implicit_length(type_char: char, nominal: Option<&Nominal>) -> u32 {
    match type_char {
        'C' => match nominal {
            Some(Nominal::String(s, _)) => s.len().max(1) as u32,
            _ => 1,
        },
        'X' => match nominal {
            Some(Nominal::String(s, _)) => {
                let digits = s.split(',').next().unwrap_or("").len() as u32;
                digits.div_ceil(2).max(1)
            }
            _ => 1,
        },
        'B' => match nominal {
            Some(Nominal::String(s, _)) => {
                let bits = s.split(',').next().unwrap_or("").len() as u32;
                bits.div_ceil(8).max(1)
            }
            _ => 1,
        },
        'P' => match nominal {
            Some(Nominal::String(s, _)) => {
                let digits = s
                    .split(',')
                    .next()
                    .unwrap_or("")
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .count() as u32;
                digits / 2 + 1
            }
            _ => 1,
        },
        'Z' => match nominal {
            Some(Nominal::String(s, _)) => s
                .split(',')
                .next()
                .unwrap_or("")
                .chars()
                .filter(|c| c.is_ascii_digit())
                .count()
                .max(1) as u32,
            _ => 1,
        },
        'H' | 'Y' | 'S' => 2,
        'F' | 'E' | 'A' | 'V' | 'J' | 'Q' => 4,
        'D' => 8,
        'L' => 16,
        _ => 1,
    }
}

/// Parse one data-definition operand from a lexeme stream, advancing `pos`.
/// The stream position must sit on the duplication factor or the type.
pub fn parse_data_def(lexemes: &[Lexeme], pos: &mut usize, ids: &mut IdPool) -> Option<DataDef> {
    let start_range = lexemes.get(*pos)?.range;

    // Duplication factor: number or parenthesized expression.
    let mut dupl = None;
    match lexemes.get(*pos).map(|l| &l.token) {
        Some(Token::Number(n)) => {
            dupl = Some(Modifier::Value(*n as i32, lexemes[*pos].range));
            *pos += 1;
        }
        Some(Token::LParen) => {
            let save = *pos;
            *pos += 1;
            if let Some(e) = parse_mach_expr(lexemes, pos, ids) {
                if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                    *pos += 1;
                    dupl = Some(Modifier::Expr(e));
                } else {
                    *pos = save;
                }
            } else {
                *pos = save;
            }
        }
        _ => {}
    }

    // Type character, possibly followed by modifiers glued into one word:
    // the lexer produced a single Symbol like "FL3" or "CA"; split it here.
    let (word, word_range) = match lexemes.get(*pos) {
        Some(Lexeme {
            token: Token::Symbol(w),
            range,
        }) => (w.to_uppercase(), *range),
        // C'..' / X'..' / B'..' lex as self-defining terms; that is a
        // complete data definition with a quoted nominal.
        Some(Lexeme {
            token: Token::SelfDef(kind, value),
            range,
        }) => {
            let dd = DataDef {
                dupl,
                type_char: *kind,
                type_extension: None,
                length: None,
                bit_length: false,
                scale: None,
                exponent: None,
                nominal: Some(Nominal::String(value.clone(), *range)),
                range: start_range.union(*range),
            };
            *pos += 1;
            return Some(dd);
        }
        _ => return None,
    };
    *pos += 1;

    let mut chars = word.chars().peekable();
    let type_char = chars.next()?;
    if !type_char.is_ascii_alphabetic() {
        return None;
    }

    let mut type_extension = None;
    let mut length = None;
    let mut bit_length = false;
    let mut scale = None;
    let mut exponent = None;

    // A second letter that is not a modifier introducer is a type extension
    // (AD, FD, CA, ...).
    if let Some(&c) = chars.peek() {
        if c.is_ascii_alphabetic() && !matches!(c, 'L' | 'S' | 'E') {
            type_extension = Some(c);
            chars.next();
        } else if matches!(c, 'L' | 'S' | 'E') {
            // A modifier introducer must be followed by a digit within the
            // word; a trailing letter is an extension (e.g. "AD"), or the
            // modifier value follows as separate tokens ("CL(", "BL.").
            let mut probe = chars.clone();
            probe.next();
            match probe.peek() {
                Some(d) if d.is_ascii_digit() => {}
                _ => {
                    type_extension = Some(c);
                    chars.next();
                }
            }
        }
    }

    // Inline numeric modifiers: L[.]<n>, S<n>, E<n>.
    let rest: String = chars.collect();
    let mut rest_chars = rest.chars().peekable();
    while let Some(&c) = rest_chars.peek() {
        match c {
            'L' => {
                rest_chars.next();
                if rest_chars.peek() == Some(&'.') {
                    bit_length = true;
                    rest_chars.next();
                }
                let n = take_number(&mut rest_chars)?;
                length = Some(Modifier::Value(n, word_range));
            }
            'S' => {
                rest_chars.next();
                let n = take_signed_number(&mut rest_chars)?;
                scale = Some(Modifier::Value(n, word_range));
            }
            'E' => {
                rest_chars.next();
                let n = take_signed_number(&mut rest_chars)?;
                exponent = Some(Modifier::Value(n, word_range));
            }
            _ => return None,
        }
    }

    // A trailing `L` with the value as separate tokens: `CL(SIZE)` is
    // Symbol("CL") + parenthesized expression, `BL.12` is Symbol("BL") +
    // `.` + number.
    if length.is_none() && type_extension == Some('L') {
        match lexemes.get(*pos).map(|l| &l.token) {
            Some(Token::LParen) => {
                *pos += 1;
                let e = parse_mach_expr(lexemes, pos, ids)?;
                if matches!(lexemes.get(*pos).map(|l| &l.token), Some(Token::RParen)) {
                    *pos += 1;
                }
                length = Some(Modifier::Expr(e));
                type_extension = None;
            }
            Some(Token::Dot) => {
                if let Some(Lexeme {
                    token: Token::Number(n),
                    range,
                }) = lexemes.get(*pos + 1)
                {
                    bit_length = true;
                    length = Some(Modifier::Value(*n as i32, *range));
                    type_extension = None;
                    *pos += 2;
                }
            }
            _ => {}
        }
    }

    // Nominal value: quoted or parenthesized.
    let mut nominal = None;
    let mut end_range = word_range;
    match lexemes.get(*pos).map(|l| (&l.token, l.range)) {
        Some((Token::QuotedString(s), r)) => {
            nominal = Some(Nominal::String(s.clone(), r));
            end_range = r;
            *pos += 1;
        }
        Some((Token::LParen, _)) => {
            *pos += 1;
            let mut list = Vec::new();
            loop {
                let e = parse_mach_expr(lexemes, pos, ids)?;
                end_range = e.range();
                list.push(e);
                match lexemes.get(*pos).map(|l| &l.token) {
                    Some(Token::Comma) => {
                        *pos += 1;
                    }
                    Some(Token::RParen) => {
                        end_range = lexemes[*pos].range;
                        *pos += 1;
                        break;
                    }
                    _ => break,
                }
            }
            nominal = Some(Nominal::Exprs(list));
        }
        _ => {}
    }

    Some(DataDef {
        dupl,
        type_char,
        type_extension,
        length,
        bit_length,
        scale,
        exponent,
        nominal,
        range: start_range.union(end_range),
    })
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<i32> {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    s.parse().ok()
}

fn take_signed_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<i32> {
    let neg = chars.peek() == Some(&'-');
    if neg {
        chars.next();
    }
    take_number(chars).map(|n| if neg { -n } else { n })
}

/// ASCII byte to EBCDIC (code page 037), for character self-defining terms
/// and type attributes.
pub fn ascii_to_ebcdic(b: u8) -> u8 {
    match b {
        b'A'..=b'I' => 0xC1 + (b - b'A'),
        b'J'..=b'R' => 0xD1 + (b - b'J'),
        b'S'..=b'Z' => 0xE2 + (b - b'S'),
        b'a'..=b'i' => 0x81 + (b - b'a'),
        b'j'..=b'r' => 0x91 + (b - b'j'),
        b's'..=b'z' => 0xA2 + (b - b's'),
        b'0'..=b'9' => 0xF0 + (b - b'0'),
        b' ' => 0x40,
        b'.' => 0x4B,
        b'<' => 0x4C,
        b'(' => 0x4D,
        b'+' => 0x4E,
        b'&' => 0x50,
        b'$' => 0x5B,
        b'*' => 0x5C,
        b')' => 0x5D,
        b'-' => 0x60,
        b'/' => 0x61,
        b',' => 0x6B,
        b'%' => 0x6C,
        b'_' => 0x6D,
        b'>' => 0x6E,
        b'?' => 0x6F,
        b':' => 0x7A,
        b'#' => 0x7B,
        b'@' => 0x7C,
        b'\'' => 0x7D,
        b'=' => 0x7E,
        b'"' => 0x7F,
        other => other,
    }
}
