//! CICS preprocessor.
//!
//! - `EXEC CICS ...` command statements are deactivated (comment trail plus
//!   fade message); continuations of the command are swallowed with it
//! - `DFHRESP(name)` and `DFHVALUE(name)` rewrite to their numeric
//!   condition values so surrounding expressions stay parseable

use hlasm_lang_core::Diagnostic;

use crate::library::FadeMessage;
use crate::processing::providers::{Document, DocumentLine};

use super::{IncludedMember, MemberFetcher, Preprocessor, PreprocessorStatement};

/// CICS condition values surfaced through DFHRESP.
const DFHRESP_VALUES: &[(&str, i32)] = &[
    ("NORMAL", 0),
    ("ERROR", 1),
    ("RDATT", 2),
    ("EOF", 4),
    ("EODS", 5),
    ("INVREQ", 16),
    ("NOTOPEN", 19),
    ("ENDFILE", 20),
    ("IOERR", 17),
    ("NOTFND", 13),
    ("DUPREC", 14),
    ("ITEMERR", 26),
    ("QZERO", 23),
    ("LENGERR", 22),
];

/// Rewrite `DFHRESP(name)`/`DFHVALUE(name)` occurrences to numbers.
pub fn replace_dfhresp(text: &str) -> String {
    let mut out = text.to_string();
    for keyword in ["DFHRESP", "DFHVALUE"] {
        loop {
            let upper = out.to_uppercase();
            let Some(start) = upper.find(keyword) else {
                break;
            };
            let after = &out[start + keyword.len()..];
            if !after.starts_with('(') {
                break;
            }
            let Some(close) = after.find(')') else {
                break;
            };
            let name = after[1..close].trim().to_uppercase();
            let value = DFHRESP_VALUES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v)
                .unwrap_or(0);
            out = format!("{}{}{}", &out[..start], value, &after[close + 1..]);
        }
    }
    out
}

pub struct CicsPreprocessor {
    statements: Vec<PreprocessorStatement>,
    included: Vec<IncludedMember>,
    fade: Vec<FadeMessage>,
}

impl CicsPreprocessor {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
            included: Vec::new(),
            fade: Vec::new(),
        }
    }

    fn is_exec_cics(text: &str) -> bool {
        let trimmed = text.trim_start();
        if text.starts_with('*') || !trimmed.to_uppercase().starts_with("EXEC") {
            return false;
        }
        trimmed[4..].trim_start().to_uppercase().starts_with("CICS")
    }

    fn is_continued(text: &str) -> bool {
        text.chars().nth(71).is_some_and(|c| !c.is_whitespace())
    }
}

impl Default for CicsPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for CicsPreprocessor {
    fn generate_replacement(
        &mut self,
        doc: Document,
        _fetcher: &mut dyn MemberFetcher,
        _diags: &mut Vec<Diagnostic>,
    ) -> Document {
        let mut out = Document::default();
        let mut in_command = false;

        for line in &doc.lines {
            let starts = Self::is_exec_cics(&line.text);
            if starts || in_command {
                let origin = line.origin_line.unwrap_or(0);
                if starts {
                    let command = line.text.trim_start()[4..]
                        .trim_start()
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("")
                        .to_string();
                    self.statements.push(PreprocessorStatement {
                        name: command,
                        line: out.lines.len(),
                    });
                }
                out.lines.push(DocumentLine {
                    text: format!("*DFH    {}", line.text),
                    origin_line: line.origin_line,
                });
                self.fade.push(FadeMessage {
                    resource: Default::default(),
                    first_line: origin,
                    last_line: origin,
                });
                in_command = Self::is_continued(&line.text);
                continue;
            }

            let replaced = replace_dfhresp(&line.text);
            out.lines.push(DocumentLine {
                text: replaced,
                origin_line: line.origin_line,
            });
        }

        out
    }

    fn take_statements(&mut self) -> Vec<PreprocessorStatement> {
        std::mem::take(&mut self.statements)
    }

    fn included_members(&self) -> &[IncludedMember] {
        &self.included
    }

    fn take_fade(&mut self) -> Vec<FadeMessage> {
        std::mem::take(&mut self.fade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Document {
        let mut p = CicsPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |_: &str| None;
        p.generate_replacement(Document::from_text(text), &mut fetch, &mut diags)
    }

    #[test]
    fn test_exec_cics_deactivated() {
        let doc = run("         EXEC  CICS SEND TEXT FROM(MSG)\n         LR    1,2\n");
        assert!(doc.lines[0].text.starts_with("*DFH"));
        assert!(doc.lines[1].text.contains("LR"));
    }

    #[test]
    fn test_continued_command_swallowed() {
        let line1 = format!("{:<71}X", "         EXEC  CICS SEND");
        let doc = run(&format!("{line1}\n               TEXT FROM(MSG)\n LR 1,2\n"));
        assert!(doc.lines[0].text.starts_with("*DFH"));
        assert!(doc.lines[1].text.starts_with("*DFH"));
        assert!(doc.lines[2].text.contains("LR"));
    }

    #[test]
    fn test_dfhresp_rewrite() {
        assert_eq!(replace_dfhresp(" CLC 0(4,3),DFHRESP(NOTFND)"), " CLC 0(4,3),13");
        assert_eq!(replace_dfhresp(" DC F'0'"), " DC F'0'");
    }

    #[test]
    fn test_command_name_recorded() {
        let mut p = CicsPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |_: &str| None;
        p.generate_replacement(
            Document::from_text("         EXEC  CICS RETURN\n"),
            &mut fetch,
            &mut diags,
        );
        let stmts = p.take_statements();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].name, "RETURN");
    }
}
