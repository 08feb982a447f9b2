//! ENDEVOR preprocessor.
//!
//! Inlines `-INC member` and `++INCLUDE member` statements, recursively,
//! with cycle protection. A missing member leaves an E058 diagnostic and
//! drops the statement.

use hlasm_lang_core::{Diagnostic, Range};

use crate::diags;
use crate::library::FadeMessage;
use crate::processing::providers::{Document, DocumentLine};

use super::{IncludedMember, MemberFetcher, Preprocessor, PreprocessorStatement};

pub struct EndevorPreprocessor {
    statements: Vec<PreprocessorStatement>,
    included: Vec<IncludedMember>,
    fade: Vec<FadeMessage>,
}

impl EndevorPreprocessor {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
            included: Vec::new(),
            fade: Vec::new(),
        }
    }

    /// `-INC member` / `++INCLUDE member`.
    fn inc_member(text: &str) -> Option<&str> {
        let trimmed = text.trim_start();
        let rest = trimmed
            .strip_prefix("-INC ")
            .or_else(|| trimmed.strip_prefix("++INCLUDE "))?;
        let member = rest.split_whitespace().next()?;
        (!member.is_empty()).then_some(member)
    }

    fn expand(
        &mut self,
        doc: Document,
        fetcher: &mut dyn MemberFetcher,
        diags_out: &mut Vec<Diagnostic>,
        active: &mut Vec<String>,
        out: &mut Document,
    ) {
        for line in &doc.lines {
            let Some(member) = Self::inc_member(&line.text) else {
                out.lines.push(line.clone());
                continue;
            };
            let member = member.to_string();

            if active.iter().any(|m| m.eq_ignore_ascii_case(&member)) {
                diags_out.push(diags::e062(Range::in_line(
                    line.origin_line.unwrap_or(0) as u32,
                    0,
                    line.text.len() as u32,
                )));
                continue;
            }

            self.statements.push(PreprocessorStatement {
                name: member.clone(),
                line: out.lines.len(),
            });

            match fetcher.fetch(&member) {
                Some(m) => {
                    if let Some(origin) = line.origin_line {
                        self.fade.push(FadeMessage {
                            resource: Default::default(),
                            first_line: origin,
                            last_line: origin,
                        });
                    }
                    self.included.push(IncludedMember {
                        name: member.clone(),
                        location: m.location,
                    });
                    let inner = Document {
                        lines: m
                            .text
                            .lines()
                            .map(|t| DocumentLine {
                                text: t.to_string(),
                                origin_line: None,
                            })
                            .collect(),
                    };
                    active.push(member);
                    self.expand(inner, fetcher, diags_out, active, out);
                    active.pop();
                }
                None => {
                    diags_out.push(diags::e058(Range::in_line(
                        line.origin_line.unwrap_or(0) as u32,
                        0,
                        line.text.len() as u32,
                    )));
                }
            }
        }
    }
}

impl Default for EndevorPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for EndevorPreprocessor {
    fn generate_replacement(
        &mut self,
        doc: Document,
        fetcher: &mut dyn MemberFetcher,
        diags_out: &mut Vec<Diagnostic>,
    ) -> Document {
        let mut out = Document::default();
        let mut active = Vec::new();
        self.expand(doc, fetcher, diags_out, &mut active, &mut out);
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
    use crate::library::LibraryMember;
    use hlasm_lang_core::ResourceLocation;

    fn member(text: &str) -> LibraryMember {
        LibraryMember {
            text: text.into(),
            location: ResourceLocation::new("lib://m"),
        }
    }

    #[test]
    fn test_inc_inlined() {
        let mut p = EndevorPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |name: &str| (name == "COMMON").then(|| member("FIELD    DS    F"));
        let out = p.generate_replacement(
            Document::from_text("-INC COMMON\n         LR    1,2\n"),
            &mut fetch,
            &mut diags,
        );
        assert_eq!(out.lines.len(), 2);
        assert!(out.lines[0].text.starts_with("FIELD"));
        assert!(diags.is_empty());
        assert_eq!(p.included_members().len(), 1);
    }

    #[test]
    fn test_plusplus_include() {
        let mut p = EndevorPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |_: &str| Some(member(" LR 1,2"));
        let out = p.generate_replacement(
            Document::from_text("++INCLUDE PIECE\n"),
            &mut fetch,
            &mut diags,
        );
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn test_missing_member_is_e058() {
        let mut p = EndevorPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |_: &str| None;
        p.generate_replacement(Document::from_text("-INC NOPE\n"), &mut fetch, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E058");
    }

    #[test]
    fn test_recursive_include_is_e062() {
        let mut p = EndevorPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |name: &str| (name == "LOOP").then(|| member("-INC LOOP"));
        p.generate_replacement(Document::from_text("-INC LOOP\n"), &mut fetch, &mut diags);
        assert_eq!(diags.iter().filter(|d| d.code == "E062").count(), 1);
    }

    #[test]
    fn test_nested_includes() {
        let mut p = EndevorPreprocessor::new();
        let mut diags = Vec::new();
        let mut fetch = |name: &str| match name {
            "OUTER" => Some(member("-INC INNER")),
            "INNER" => Some(member("DEEP     DS    F")),
            _ => None,
        };
        let out = p.generate_replacement(Document::from_text("-INC OUTER\n"), &mut fetch, &mut diags);
        assert_eq!(out.lines.len(), 1);
        assert!(out.lines[0].text.starts_with("DEEP"));
    }
}
