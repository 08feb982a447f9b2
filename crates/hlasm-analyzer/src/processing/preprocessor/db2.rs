//! DB2 preprocessor.
//!
//! Handles embedded SQL in HLASM source:
//!
//! - `EXEC SQL INCLUDE member` pulls the member in (SQLCA and SQLDA fall
//!   back to generated definitions when the library has none)
//! - other `EXEC SQL ...` statements are deactivated and replaced by a
//!   comment trail, with a fade message for the editor
//!
//! Statement classification follows the DB2 precompiler's taxonomy; only
//! the statement kinds matter here, not the SQL itself.

use hlasm_lang_core::Diagnostic;

use crate::library::FadeMessage;
use crate::processing::providers::{Document, DocumentLine};

use super::{IncludedMember, MemberFetcher, Preprocessor, PreprocessorStatement};

/// SQL statement classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlStatementKind {
    Include(String),
    Select,
    Insert,
    Update,
    Delete,
    DeclareCursor,
    Open,
    Fetch,
    Close,
    Commit,
    Rollback,
    Whenever,
    Other,
}

/// Classify the text after `EXEC SQL`.
pub fn classify_sql(text: &str) -> SqlStatementKind {
    let upper = text.trim().to_uppercase();
    let mut words = upper.split_whitespace();
    match words.next() {
        Some("INCLUDE") => {
            SqlStatementKind::Include(words.next().unwrap_or("").trim_end_matches(',').to_string())
        }
        Some("SELECT") => SqlStatementKind::Select,
        Some("INSERT") => SqlStatementKind::Insert,
        Some("UPDATE") => SqlStatementKind::Update,
        Some("DELETE") => SqlStatementKind::Delete,
        Some("DECLARE") => SqlStatementKind::DeclareCursor,
        Some("OPEN") => SqlStatementKind::Open,
        Some("FETCH") => SqlStatementKind::Fetch,
        Some("CLOSE") => SqlStatementKind::Close,
        Some("COMMIT") => SqlStatementKind::Commit,
        Some("ROLLBACK") => SqlStatementKind::Rollback,
        Some("WHENEVER") => SqlStatementKind::Whenever,
        _ => SqlStatementKind::Other,
    }
}

/// A generated SQLCA, used when the library carries none.
const SQLCA_FALLBACK: &[&str] = &[
    "SQLCA    DS    0F",
    "SQLCAID  DC    CL8'SQLCA'",
    "SQLCABC  DC    F'136'",
    "SQLCODE  DS    F",
    "SQLERRM  DS    CL72",
    "SQLERRP  DS    CL8",
    "SQLERRD  DS    6F",
    "SQLWARN  DS    CL8",
    "SQLSTATE DS    CL5",
];

pub struct Db2Preprocessor {
    version: String,
    statements: Vec<PreprocessorStatement>,
    included: Vec<IncludedMember>,
    fade: Vec<FadeMessage>,
}

impl Db2Preprocessor {
    pub fn new(version: String) -> Self {
        Self {
            version,
            statements: Vec::new(),
            included: Vec::new(),
            fade: Vec::new(),
        }
    }

    /// Extract the operand part of an `EXEC SQL` statement line, if the
    /// line is one.
    fn exec_sql_operands(text: &str) -> Option<&str> {
        let trimmed = text.trim_start();
        if text.starts_with('*') || !trimmed.to_uppercase().starts_with("EXEC") {
            return None;
        }
        let after_exec = trimmed[4..].trim_start();
        if !after_exec.to_uppercase().starts_with("SQL") {
            return None;
        }
        Some(after_exec[3..].trim_start())
    }
}

impl Preprocessor for Db2Preprocessor {
    fn generate_replacement(
        &mut self,
        doc: Document,
        fetcher: &mut dyn MemberFetcher,
        _diags: &mut Vec<Diagnostic>,
    ) -> Document {
        let mut out = Document::default();

        for line in &doc.lines {
            let Some(operands) = Self::exec_sql_operands(&line.text) else {
                out.lines.push(line.clone());
                continue;
            };

            let origin = line.origin_line.unwrap_or(0);
            match classify_sql(operands) {
                SqlStatementKind::Include(member) => {
                    self.statements.push(PreprocessorStatement {
                        name: member.clone(),
                        line: out.lines.len(),
                    });
                    match fetcher.fetch(&member) {
                        Some(m) => {
                            self.included.push(IncludedMember {
                                name: member,
                                location: m.location,
                            });
                            for text in m.text.lines() {
                                out.lines.push(DocumentLine {
                                    text: text.to_string(),
                                    origin_line: None,
                                });
                            }
                        }
                        None if member.eq_ignore_ascii_case("SQLCA")
                            || member.eq_ignore_ascii_case("SQLDA") =>
                        {
                            for text in SQLCA_FALLBACK {
                                out.lines.push(DocumentLine {
                                    text: (*text).to_string(),
                                    origin_line: None,
                                });
                            }
                        }
                        None => {
                            // Leave the statement visible; the assembler
                            // will fault the unknown opcode naturally.
                            out.lines.push(line.clone());
                            continue;
                        }
                    }
                    self.fade.push(FadeMessage {
                        resource: Default::default(),
                        first_line: origin,
                        last_line: origin,
                    });
                }
                _ => {
                    // Deactivate the statement; keep the source visible as
                    // a comment so line numbering survives.
                    let comment = format!("*DSNH{}  {}", self.version, line.text);
                    out.lines.push(DocumentLine {
                        text: comment,
                        origin_line: line.origin_line,
                    });
                    self.fade.push(FadeMessage {
                        resource: Default::default(),
                        first_line: origin,
                        last_line: origin,
                    });
                }
            }
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
    use hlasm_lang_core::ResourceLocation;

    fn run(text: &str, fetch: impl FnMut(&str) -> Option<crate::library::LibraryMember>) -> Document {
        let mut p = Db2Preprocessor::new("V13".into());
        let mut diags = Vec::new();
        let mut fetch = fetch;
        p.generate_replacement(Document::from_text(text), &mut fetch, &mut diags)
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify_sql("INCLUDE SQLCA"),
            SqlStatementKind::Include("SQLCA".into())
        );
        assert_eq!(classify_sql("SELECT 1 FROM T"), SqlStatementKind::Select);
        assert_eq!(classify_sql("COMMIT WORK"), SqlStatementKind::Commit);
    }

    #[test]
    fn test_include_sqlca_fallback() {
        let doc = run("         EXEC  SQL INCLUDE SQLCA\n", |_| None);
        assert!(doc.lines.iter().any(|l| l.text.starts_with("SQLCODE")));
        // Generated lines have no origin.
        assert!(doc.lines.iter().all(|l| l.origin_line.is_none()));
    }

    #[test]
    fn test_include_from_library() {
        let doc = run("         EXEC  SQL INCLUDE MYDCL\n", |name| {
            assert_eq!(name, "MYDCL");
            Some(crate::library::LibraryMember {
                text: "MYVAR    DS    F".into(),
                location: ResourceLocation::new("lib://MYDCL"),
            })
        });
        assert_eq!(doc.lines.len(), 1);
        assert!(doc.lines[0].text.starts_with("MYVAR"));
    }

    #[test]
    fn test_exec_sql_deactivated() {
        let doc = run("         EXEC  SQL COMMIT\n         LR    1,2\n", |_| None);
        assert_eq!(doc.lines.len(), 2);
        assert!(doc.lines[0].text.starts_with("*DSNHV13"));
        assert_eq!(doc.lines[1].text.trim(), "LR    1,2");
    }

    #[test]
    fn test_untouched_source_passes_through() {
        let doc = run("LABEL    LR    1,2\n", |_| None);
        assert_eq!(doc.lines[0].text, "LABEL    LR    1,2");
    }

    #[test]
    fn test_fade_and_statements_reported() {
        let mut p = Db2Preprocessor::new(String::new());
        let mut diags = Vec::new();
        let mut fetch = |_: &str| None;
        p.generate_replacement(
            Document::from_text("         EXEC  SQL INCLUDE SQLCA\n"),
            &mut fetch,
            &mut diags,
        );
        assert_eq!(p.take_statements().len(), 1);
        assert_eq!(p.take_fade().len(), 1);
        assert!(p.take_statements().is_empty());
    }
}
