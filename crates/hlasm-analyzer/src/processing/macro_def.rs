//! The macro-definition processor.
//!
//! Collects statements between MACRO and the matching MEND: the prototype
//! (name-field parameter, macro name, positional and keyword parameters),
//! the raw body lines, and the body's sequence symbols. Nested MACRO/MEND
//! pairs are swallowed into the body.

use hlasm_lang_core::{Id, IdPool, Location};
use hlasm_parser::ca::{ConcatElem, VarName};
use hlasm_parser::line::LogicalLine;
use hlasm_parser::statement::{InstrField, Label, ParsedFields};

use crate::context::macros::{MacroDef, MacroParam, StoredLine};

/// In-progress macro collection.
#[derive(Debug)]
pub struct MacroCollector {
    /// Nesting depth; the MEND matching depth 1 ends the definition.
    pub depth: u32,
    prototype: Option<Prototype>,
    body: Vec<StoredLine>,
    seq_symbols: std::collections::HashMap<Id, usize>,
    location: Location,
}

#[derive(Debug)]
struct Prototype {
    name: Id,
    label_param: Option<Id>,
    params: Vec<MacroParam>,
}

/// What the collector did with a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Statement swallowed; keep feeding.
    Collected,
    /// The matching MEND arrived; the definition is complete.
    Finished,
    /// The prototype was malformed; collection aborted.
    BadPrototype,
}

impl MacroCollector {
    pub fn new(location: Location) -> Self {
        Self {
            depth: 1,
            prototype: None,
            body: Vec::new(),
            seq_symbols: std::collections::HashMap::new(),
            location,
        }
    }

    pub fn has_prototype(&self) -> bool {
        self.prototype.is_some()
    }

    /// Feed the prototype statement (the first statement after MACRO).
    pub fn feed_prototype(&mut self, fields: &ParsedFields, ids: &mut IdPool) -> CollectOutcome {
        let name = match &fields.instruction {
            InstrField::Id { name, .. } => *name,
            _ => return CollectOutcome::BadPrototype,
        };

        let label_param = match &fields.label {
            Label::Variable(chain) => match chain.0.as_slice() {
                [ConcatElem::Var(vs)] => match &vs.name {
                    VarName::Plain(id) => Some(*id),
                    VarName::Created(_) => None,
                },
                _ => None,
            },
            _ => None,
        };

        let mut params = Vec::new();
        let lexemes = hlasm_parser::lexer::tokenize(&fields.operand_text, 0, 0);
        let mut pos = 0;
        let chain = hlasm_parser::ca::parse_concat_chain(&lexemes, &mut pos, ids, &[]);
        // The prototype operand field is a comma-separated parameter list:
        // &POS or &KEY=default.
        let mut current: Option<MacroParam> = None;
        let mut awaiting_default = false;
        for elem in &chain.0 {
            match elem {
                ConcatElem::Var(vs) => {
                    if let VarName::Plain(id) = &vs.name {
                        if let Some(p) = current.take() {
                            params.push(p);
                        }
                        current = Some(MacroParam {
                            name: *id,
                            default: None,
                        });
                        awaiting_default = false;
                    }
                }
                ConcatElem::Str(s, _) => {
                    for part in s.split(',') {
                        if part == "=" {
                            awaiting_default = true;
                            if let Some(p) = &mut current {
                                p.default = Some(String::new());
                            }
                        } else if let Some(rest) = part.strip_prefix('=') {
                            if let Some(p) = &mut current {
                                p.default = Some(rest.to_string());
                            }
                        } else if awaiting_default && !part.is_empty() {
                            if let Some(p) = &mut current {
                                p.default = Some(part.to_string());
                            }
                            awaiting_default = false;
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(p) = current.take() {
            params.push(p);
        }

        self.prototype = Some(Prototype {
            name,
            label_param,
            params,
        });
        CollectOutcome::Collected
    }

    /// Feed a body statement.
    pub fn feed_body(&mut self, ll: &LogicalLine, fields: &ParsedFields) -> CollectOutcome {
        if let Label::Sequence { name, .. } = fields.label {
            self.seq_symbols.entry(name).or_insert(self.body.len());
        }

        self.body.push(StoredLine {
            text: ll.text(),
            lineno: ll.first_line(),
        });
        CollectOutcome::Collected
    }

    /// Note a nested MACRO.
    pub fn enter_nested(&mut self) {
        self.depth += 1;
    }

    /// Note a MEND; true when it closed the outermost definition.
    pub fn leave(&mut self) -> bool {
        self.depth -= 1;
        self.depth == 0
    }

    /// Produce the stored definition.
    pub fn finish(self) -> Option<MacroDef> {
        let proto = self.prototype?;
        Some(MacroDef {
            name: proto.name,
            label_param: proto.label_param,
            params: proto.params,
            body: self.body,
            seq_symbols: self.seq_symbols,
            location: self.location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlasm_parser::line::{extract_logical_line, IctlColumns};
    use hlasm_parser::split_fields;

    fn fields_of(line: &str, ids: &mut IdPool) -> (LogicalLine, ParsedFields) {
        let (ll, _) = extract_logical_line(&[line], 0, &IctlColumns::default()).unwrap();
        let fields = split_fields(&ll, ids);
        (ll, fields)
    }

    #[test]
    fn test_prototype_with_params() {
        let mut ids = IdPool::new();
        let mut col = MacroCollector::new(Location::default());
        let (_, fields) = fields_of("&LBL     GEN   &P1,&KEY=DFLT", &mut ids);
        assert_eq!(col.feed_prototype(&fields, &mut ids), CollectOutcome::Collected);
        let def = col.finish().unwrap();
        assert_eq!(def.name, ids.find("GEN").unwrap());
        assert_eq!(def.label_param, ids.find("LBL"));
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[0].name, ids.find("P1").unwrap());
        assert_eq!(def.params[0].default, None);
        assert_eq!(def.params[1].name, ids.find("KEY").unwrap());
        assert_eq!(def.params[1].default.as_deref(), Some("DFLT"));
    }

    #[test]
    fn test_body_and_seq_symbols() {
        let mut ids = IdPool::new();
        let mut col = MacroCollector::new(Location::default());
        let (_, proto) = fields_of("         SIMPLE", &mut ids);
        col.feed_prototype(&proto, &mut ids);

        let (l1, f1) = fields_of("         LR    1,2", &mut ids);
        col.feed_body(&l1, &f1);
        let (l2, f2) = fields_of(".NEXT    ANOP", &mut ids);
        col.feed_body(&l2, &f2);

        let def = col.finish().unwrap();
        assert_eq!(def.body.len(), 2);
        assert_eq!(def.seq_symbols.get(&ids.find("NEXT").unwrap()), Some(&1));
    }

    #[test]
    fn test_nested_depth() {
        let mut col = MacroCollector::new(Location::default());
        col.enter_nested();
        assert!(!col.leave());
        assert!(col.leave());
    }

    #[test]
    fn test_missing_prototype_yields_nothing() {
        let col = MacroCollector::new(Location::default());
        assert!(col.finish().is_none());
    }
}
