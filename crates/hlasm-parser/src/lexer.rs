//! Operand-field tokenizer.
//!
//! Splits an operand field into tokens with source ranges: symbols,
//! numbers, self-defining terms (`X'..'`, `C'..'`, `B'..'`), literals
//! (`=F'1'`), variable symbols (`&NAME`), sequence symbols (`.NAME`),
//! attribute references (`L'`, `T'`, `S'`, `I'`, `K'`, `N'`, `O'`, `D'`),
//! operators and punctuation.

use std::fmt;

use hlasm_lang_core::Range;

/// Attribute reference kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// T' — type.
    Type,
    /// L' — length.
    Length,
    /// S' — scale.
    Scale,
    /// I' — integer.
    Integer,
    /// K' — character count of a variable's value.
    Count,
    /// N' — number of sublist entries.
    Number,
    /// O' — operation code attribute.
    Operation,
    /// D' — defined.
    Defined,
}

impl AttrKind {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'T' => Some(Self::Type),
            'L' => Some(Self::Length),
            'S' => Some(Self::Scale),
            'I' => Some(Self::Integer),
            'K' => Some(Self::Count),
            'N' => Some(Self::Number),
            'O' => Some(Self::Operation),
            'D' => Some(Self::Defined),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Type => 'T',
            Self::Length => 'L',
            Self::Scale => 'S',
            Self::Integer => 'I',
            Self::Count => 'K',
            Self::Number => 'N',
            Self::Operation => 'O',
            Self::Defined => 'D',
        }
    }
}

/// One operand-field token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An ordinary symbol or keyword.
    Symbol(String),
    /// A variable symbol: `&NAME`. `&(` created names lex as `Amp` + `LParen`.
    VarSymbol(String),
    /// A sequence symbol: `.NAME`.
    SeqSymbol(String),
    /// A decimal self-defining term.
    Number(i64),
    /// A hex/char/binary self-defining term: `X'FF'`, `C'AB'`, `B'101'`.
    SelfDef(char, String),
    /// A literal: `=F'100'`, `=CL8'TEXT'`.
    Literal(String),
    /// An attribute reference prefix: `L'`, `T'`, ...
    Attr(AttrKind),
    /// A quoted string (quotes stripped, doubled quotes collapsed).
    QuotedString(String),
    /// `+ - * /`.
    Op(char),
    LParen,
    RParen,
    Comma,
    Equals,
    /// Concatenation dot.
    Dot,
    /// Lone ampersand of a created variable symbol `&(...)`.
    Amp,
    /// Location counter reference `*`.
    LocCtr,
}

/// A token plus the range it was lexed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub range: Range,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Symbol(s) => write!(f, "{s}"),
            Token::VarSymbol(s) => write!(f, "&{s}"),
            Token::SeqSymbol(s) => write!(f, ".{s}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::SelfDef(k, v) => write!(f, "{k}'{v}'"),
            Token::Literal(l) => write!(f, "={l}"),
            Token::Attr(a) => write!(f, "{}'", a.as_char()),
            Token::QuotedString(s) => write!(f, "'{s}'"),
            Token::Op(o) => write!(f, "{o}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Dot => write!(f, "."),
            Token::Amp => write!(f, "&"),
            Token::LocCtr => write!(f, "*"),
        }
    }
}

fn is_symbol_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '@' | '#' | '$' | '_')
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '#' | '$' | '_')
}

/// Tokenize an operand field. `line` and `start_col` anchor the ranges.
pub fn tokenize(text: &str, line: u32, start_col: u32) -> Vec<Lexeme> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    let col = |i: usize| start_col + i as u32;
    let push = |tokens: &mut Vec<Lexeme>, token, from: usize, to: usize| {
        tokens.push(Lexeme {
            token,
            range: Range::in_line(line, col(from), col(to)),
        });
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '(' => {
                push(&mut tokens, Token::LParen, i, i + 1);
                i += 1;
            }
            ')' => {
                push(&mut tokens, Token::RParen, i, i + 1);
                i += 1;
            }
            ',' => {
                push(&mut tokens, Token::Comma, i, i + 1);
                i += 1;
            }
            '+' | '-' | '/' => {
                push(&mut tokens, Token::Op(c), i, i + 1);
                i += 1;
            }
            '.' => {
                if chars.get(i + 1).copied().is_some_and(is_symbol_start) {
                    let start = i + 1;
                    let mut j = start;
                    while j < chars.len() && is_symbol_char(chars[j]) {
                        j += 1;
                    }
                    let name: String = chars[start..j].iter().collect();
                    push(&mut tokens, Token::SeqSymbol(name), i, j);
                    i = j;
                } else {
                    push(&mut tokens, Token::Dot, i, i + 1);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    // Doubled ampersand: literal '&' in character context.
                    push(&mut tokens, Token::Amp, i, i + 2);
                    i += 2;
                } else if chars.get(i + 1).copied().is_some_and(is_symbol_start) {
                    let start = i + 1;
                    let mut j = start;
                    while j < chars.len() && is_symbol_char(chars[j]) {
                        j += 1;
                    }
                    let name: String = chars[start..j].iter().collect();
                    push(&mut tokens, Token::VarSymbol(name), i, j);
                    i = j;
                } else {
                    push(&mut tokens, Token::Amp, i, i + 1);
                    i += 1;
                }
            }
            '*' => {
                // Multiplication after a term, location counter otherwise.
                let multiply = matches!(
                    tokens.last().map(|l| &l.token),
                    Some(Token::Number(_))
                        | Some(Token::Symbol(_))
                        | Some(Token::VarSymbol(_))
                        | Some(Token::RParen)
                        | Some(Token::LocCtr)
                        | Some(Token::SelfDef(..))
                );
                push(
                    &mut tokens,
                    if multiply { Token::Op('*') } else { Token::LocCtr },
                    i,
                    i + 1,
                );
                i += 1;
            }
            '=' => {
                // A literal when followed by a type character, a plain '='
                // otherwise (keyword parameters).
                let next = chars.get(i + 1).copied();
                if next.is_some_and(|n| n.is_ascii_alphabetic()) {
                    let start = i + 1;
                    let mut j = start;
                    let mut in_quote = false;
                    while j < chars.len() {
                        let cj = chars[j];
                        if cj == '\'' {
                            in_quote = !in_quote;
                        } else if !in_quote && matches!(cj, ',' | ' ' | '(' | ')') {
                            break;
                        }
                        j += 1;
                    }
                    let lit: String = chars[start..j].iter().collect();
                    push(&mut tokens, Token::Literal(lit), i, j);
                    i = j;
                } else {
                    push(&mut tokens, Token::Equals, i, i + 1);
                    i += 1;
                }
            }
            '\'' => {
                let (value, consumed) = lex_quoted(&chars, i);
                push(&mut tokens, Token::QuotedString(value), i, i + consumed);
                i += consumed;
            }
            c if is_symbol_start(c) => {
                let start = i;
                let mut j = i;
                while j < chars.len() && is_symbol_char(chars[j]) {
                    j += 1;
                }
                let word: String = chars[start..j].iter().collect();
                let upper = word.to_uppercase();

                if j - start == 1 && chars.get(j) == Some(&'\'') {
                    match upper.as_str() {
                        // Self-defining terms carry their value inline.
                        "X" | "C" | "B" => {
                            let (value, consumed) = lex_quoted(&chars, j);
                            push(
                                &mut tokens,
                                Token::SelfDef(upper.chars().next().unwrap(), value),
                                start,
                                j + consumed,
                            );
                            i = j + consumed;
                            continue;
                        }
                        _ => {}
                    }
                    if let Some(attr) = AttrKind::from_char(c) {
                        // Attribute prefix: the subject follows as its own
                        // token.
                        push(&mut tokens, Token::Attr(attr), start, j + 1);
                        i = j + 1;
                        continue;
                    }
                }

                push(&mut tokens, Token::Symbol(word), start, j);
                i = j;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut j = i;
                while j < chars.len() && chars[j].is_ascii_digit() {
                    j += 1;
                }
                let num: String = chars[start..j].iter().collect();
                let n = num.parse::<i64>().unwrap_or(0);
                push(&mut tokens, Token::Number(n), start, j);
                i = j;
            }
            _ => i += 1,
        }
    }

    tokens
}

/// Lex a quoted string starting at the opening quote. Doubled quotes stay
/// doubled in self-defining terms; here they collapse to one. Returns the
/// value and the number of chars consumed including both quotes.
fn lex_quoted(chars: &[char], open: usize) -> (String, usize) {
    let mut value = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                value.push('\'');
                i += 2;
                continue;
            }
            return (value, i - open + 1);
        }
        value.push(chars[i]);
        i += 1;
    }
    // Unterminated: consume to end.
    (value, chars.len() - open)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        tokenize(text, 0, 0).into_iter().map(|l| l.token).collect()
    }

    #[test]
    fn test_symbols_and_commas() {
        assert_eq!(
            tokens("R5,MYDATA"),
            vec![
                Token::Symbol("R5".into()),
                Token::Comma,
                Token::Symbol("MYDATA".into())
            ]
        );
    }

    #[test]
    fn test_literal() {
        assert_eq!(
            tokens("1,=F'100'"),
            vec![
                Token::Number(1),
                Token::Comma,
                Token::Literal("F'100'".into())
            ]
        );
    }

    #[test]
    fn test_self_defining_terms() {
        assert_eq!(tokens("X'FF'"), vec![Token::SelfDef('X', "FF".into())]);
        assert_eq!(tokens("C'AB'"), vec![Token::SelfDef('C', "AB".into())]);
        assert_eq!(tokens("B'101'"), vec![Token::SelfDef('B', "101".into())]);
    }

    #[test]
    fn test_attr_ref() {
        assert_eq!(
            tokens("L'FIELD"),
            vec![Token::Attr(AttrKind::Length), Token::Symbol("FIELD".into())]
        );
        assert_eq!(
            tokens("T'&VAR"),
            vec![Token::Attr(AttrKind::Type), Token::VarSymbol("VAR".into())]
        );
    }

    #[test]
    fn test_location_counter_vs_multiply() {
        assert_eq!(tokens("*+4"), vec![Token::LocCtr, Token::Op('+'), Token::Number(4)]);
        assert_eq!(
            tokens("2*3"),
            vec![Token::Number(2), Token::Op('*'), Token::Number(3)]
        );
        assert_eq!(tokens("*,X"), vec![Token::LocCtr, Token::Comma, Token::Symbol("X".into())]);
    }

    #[test]
    fn test_var_and_seq_symbols() {
        assert_eq!(
            tokens("&A(.B)"),
            vec![
                Token::VarSymbol("A".into()),
                Token::LParen,
                Token::SeqSymbol("B".into()),
                Token::RParen
            ]
        );
    }

    #[test]
    fn test_quoted_with_doubled_quote() {
        assert_eq!(tokens("'it''s'"), vec![Token::QuotedString("it's".into())]);
    }

    #[test]
    fn test_keyword_equals() {
        assert_eq!(
            tokens("KEY=1"),
            vec![Token::Symbol("KEY".into()), Token::Equals, Token::Number(1)]
        );
    }

    #[test]
    fn test_ranges_anchored() {
        let lx = tokenize("A,B", 3, 10);
        assert_eq!(lx[0].range, Range::in_line(3, 10, 11));
        assert_eq!(lx[1].range, Range::in_line(3, 11, 12));
        assert_eq!(lx[2].range, Range::in_line(3, 12, 13));
    }

    #[test]
    fn test_created_var_symbol_prefix() {
        assert_eq!(
            tokens("&(A)"),
            vec![
                Token::Amp,
                Token::LParen,
                Token::Symbol("A".into()),
                Token::RParen
            ]
        );
    }
}
