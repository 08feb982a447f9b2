//! Statement providers.
//!
//! Three lazy statement sources share one pull interface: the open-code
//! provider reads the (preprocessed) document and owns the AINSERT deque,
//! the macro provider replays a stored macro body, and the copy provider
//! replays a cached copy member. Each supports position save/rewind for
//! AGO branches and lookahead excursions, and memoizes deferred reparses
//! by processing status.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use hlasm_lang_core::ResourceLocation;
use hlasm_parser::line::{extract_logical_line, IctlColumns, LogicalLine};
use hlasm_parser::statement::{ParsedOperands, StatusKey};

use crate::context::macros::{CopyMember, MacroDef};

/// Where an AINSERT record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AinsertDestination {
    Front,
    Back,
}

/// A document line with its origin, as produced by the preprocessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLine {
    pub text: String,
    /// Line number in the original document, `None` for generated lines.
    pub origin_line: Option<usize>,
}

/// A preprocessed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub lines: Vec<DocumentLine>,
}

impl Document {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .enumerate()
                .map(|(i, l)| DocumentLine {
                    text: l.to_string(),
                    origin_line: Some(i),
                })
                .collect(),
        }
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

/// The open-code statement source.
#[derive(Debug)]
pub struct OpenCodeProvider {
    doc: Document,
    next_line: usize,
    ainsert: VecDeque<String>,
    pub ictl: IctlColumns,
    resource: ResourceLocation,
    reparse_cache: HashMap<(usize, StatusKey), Rc<ParsedOperands>>,
}

impl OpenCodeProvider {
    pub fn new(doc: Document, resource: ResourceLocation) -> Self {
        Self {
            doc,
            next_line: 0,
            ainsert: VecDeque::new(),
            ictl: IctlColumns::default(),
            resource,
            reparse_cache: HashMap::new(),
        }
    }

    pub fn resource(&self) -> &ResourceLocation {
        &self.resource
    }

    pub fn finished(&self) -> bool {
        self.ainsert.is_empty() && self.next_line >= self.doc.lines.len()
    }

    /// Current rewind position.
    pub fn position(&self) -> usize {
        self.next_line
    }

    /// Rewind to a saved position. The AINSERT buffer does not survive a
    /// rewind.
    pub fn rewind(&mut self, position: usize) {
        self.ainsert.clear();
        self.next_line = position.min(self.doc.lines.len());
    }

    /// AINSERT: queue a synthetic record.
    pub fn ainsert(&mut self, record: &str, dest: AinsertDestination) {
        match dest {
            AinsertDestination::Front => self.ainsert.push_front(record.to_string()),
            AinsertDestination::Back => self.ainsert.push_back(record.to_string()),
        }
    }

    /// AREAD: take the next record as raw text, AINSERT buffer first.
    /// Records come back space-padded to 80 columns.
    pub fn aread(&mut self) -> String {
        let mut rec = match self.ainsert.pop_front() {
            Some(r) => r,
            None => {
                if self.next_line >= self.doc.lines.len() {
                    return String::new();
                }
                let line = self.doc.lines[self.next_line].text.clone();
                self.next_line += 1;
                line
            }
        };
        let width = rec.chars().count();
        if width < 80 {
            rec.extend(std::iter::repeat(' ').take(80 - width));
        }
        rec
    }

    /// Next logical line; AINSERT records first, then the document.
    /// Returns the line and the position it started at.
    pub fn next_logical(&mut self) -> Option<(LogicalLine, usize)> {
        if let Some(rec) = self.ainsert.pop_front() {
            let pos = self.next_line;
            let (ll, _) = extract_logical_line(&[rec.as_str()], 0, &self.ictl)?;
            // Anchor generated records at the current document position.
            let mut ll = ll;
            for seg in &mut ll.segments {
                seg.lineno = pos;
            }
            return Some((ll, pos));
        }

        if self.next_line >= self.doc.lines.len() {
            return None;
        }
        let pos = self.next_line;
        let texts: Vec<&str> = self.doc.lines[pos..]
            .iter()
            .map(|l| l.text.as_str())
            .collect();
        let (mut ll, used) = extract_logical_line(&texts, 0, &self.ictl)?;
        for seg in &mut ll.segments {
            seg.lineno += pos;
        }
        self.next_line = pos + used;
        Some((ll, pos))
    }

    pub fn cache_get(&self, key: (usize, StatusKey)) -> Option<Rc<ParsedOperands>> {
        self.reparse_cache.get(&key).cloned()
    }

    pub fn cache_put(&mut self, key: (usize, StatusKey), value: Rc<ParsedOperands>) {
        self.reparse_cache.insert(key, value);
    }
}

/// Replays a macro body.
#[derive(Debug)]
pub struct MacroProvider {
    pub def: Rc<MacroDef>,
    index: usize,
    resource: ResourceLocation,
    reparse_cache: HashMap<(usize, StatusKey), Rc<ParsedOperands>>,
}

impl MacroProvider {
    pub fn new(def: Rc<MacroDef>) -> Self {
        let resource = def.location.resource.clone();
        Self {
            def,
            index: 0,
            resource,
            reparse_cache: HashMap::new(),
        }
    }

    pub fn resource(&self) -> &ResourceLocation {
        &self.resource
    }

    pub fn finished(&self) -> bool {
        self.index >= self.def.body.len()
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn rewind(&mut self, position: usize) {
        self.index = position.min(self.def.body.len());
    }

    pub fn next_logical(&mut self) -> Option<(LogicalLine, usize)> {
        let line = self.def.body.get(self.index)?;
        let pos = self.index;
        self.index += 1;
        let (mut ll, _) = extract_logical_line(
            &[line.text.as_str()],
            0,
            &IctlColumns {
                // Body lines are already merged; no further continuation.
                continuation: None,
                ..IctlColumns::default()
            },
        )?;
        for seg in &mut ll.segments {
            seg.lineno = line.lineno;
        }
        Some((ll, pos))
    }

    pub fn cache_get(&self, key: (usize, StatusKey)) -> Option<Rc<ParsedOperands>> {
        self.reparse_cache.get(&key).cloned()
    }

    pub fn cache_put(&mut self, key: (usize, StatusKey), value: Rc<ParsedOperands>) {
        self.reparse_cache.insert(key, value);
    }
}

/// Replays a cached copy member.
#[derive(Debug)]
pub struct CopyProvider {
    pub member: Rc<CopyMember>,
    index: usize,
}

impl CopyProvider {
    pub fn new(member: Rc<CopyMember>) -> Self {
        Self { member, index: 0 }
    }

    pub fn resource(&self) -> &ResourceLocation {
        &self.member.location
    }

    pub fn finished(&self) -> bool {
        self.index >= self.member.lines.len()
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn rewind(&mut self, position: usize) {
        self.index = position.min(self.member.lines.len());
    }

    pub fn next_logical(&mut self, ictl: &IctlColumns) -> Option<(LogicalLine, usize)> {
        if self.finished() {
            return None;
        }
        let pos = self.index;
        let texts: Vec<&str> = self.member.lines[pos..].iter().map(|s| s.as_str()).collect();
        let (mut ll, used) = extract_logical_line(&texts, 0, ictl)?;
        for seg in &mut ll.segments {
            seg.lineno += pos;
        }
        self.index = pos + used;
        Some((ll, pos))
    }
}

/// The provider stack element.
#[derive(Debug)]
pub enum Provider {
    OpenCode(OpenCodeProvider),
    Macro(MacroProvider),
    Copy(CopyProvider),
}

impl Provider {
    pub fn finished(&self) -> bool {
        match self {
            Provider::OpenCode(p) => p.finished(),
            Provider::Macro(p) => p.finished(),
            Provider::Copy(p) => p.finished(),
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Provider::OpenCode(p) => p.position(),
            Provider::Macro(p) => p.position(),
            Provider::Copy(p) => p.position(),
        }
    }

    pub fn rewind(&mut self, position: usize) {
        match self {
            Provider::OpenCode(p) => p.rewind(position),
            Provider::Macro(p) => p.rewind(position),
            Provider::Copy(p) => p.rewind(position),
        }
    }

    pub fn resource(&self) -> &ResourceLocation {
        match self {
            Provider::OpenCode(p) => p.resource(),
            Provider::Macro(p) => p.resource(),
            Provider::Copy(p) => p.resource(),
        }
    }

    pub fn next_logical(&mut self, ictl: &IctlColumns) -> Option<(LogicalLine, usize)> {
        match self {
            Provider::OpenCode(p) => p.next_logical(),
            Provider::Macro(p) => p.next_logical(),
            Provider::Copy(p) => p.next_logical(ictl),
        }
    }

    /// Status-keyed reparse cache lookup (copy members parse fresh).
    pub fn cache_get(&self, key: (usize, StatusKey)) -> Option<Rc<ParsedOperands>> {
        match self {
            Provider::OpenCode(p) => p.cache_get(key),
            Provider::Macro(p) => p.cache_get(key),
            Provider::Copy(_) => None,
        }
    }

    pub fn cache_put(&mut self, key: (usize, StatusKey), value: Rc<ParsedOperands>) {
        match self {
            Provider::OpenCode(p) => p.cache_put(key, value),
            Provider::Macro(p) => p.cache_put(key, value),
            Provider::Copy(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlasm_lang_core::Location;
    use std::collections::HashMap as Map;

    #[test]
    fn test_document_from_text() {
        let doc = Document::from_text("A\nB\n");
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[1].origin_line, Some(1));
    }

    #[test]
    fn test_opencode_reads_in_order() {
        let doc = Document::from_text(" LR 1,2\n LR 3,4\n");
        let mut p = OpenCodeProvider::new(doc, ResourceLocation::default());
        let (l1, p1) = p.next_logical().unwrap();
        assert_eq!(p1, 0);
        assert_eq!(l1.text(), " LR 1,2");
        let (_, p2) = p.next_logical().unwrap();
        assert_eq!(p2, 1);
        assert!(p.finished());
    }

    #[test]
    fn test_ainsert_front_and_back() {
        let doc = Document::from_text(" END\n");
        let mut p = OpenCodeProvider::new(doc, ResourceLocation::default());
        p.ainsert(" FIRST", AinsertDestination::Back);
        p.ainsert(" ZEROTH", AinsertDestination::Front);
        assert_eq!(p.next_logical().unwrap().0.text(), " ZEROTH");
        assert_eq!(p.next_logical().unwrap().0.text(), " FIRST");
        assert_eq!(p.next_logical().unwrap().0.text(), " END");
    }

    #[test]
    fn test_rewind_clears_ainsert() {
        let doc = Document::from_text(" A\n B\n");
        let mut p = OpenCodeProvider::new(doc, ResourceLocation::default());
        p.next_logical();
        p.ainsert(" X", AinsertDestination::Back);
        p.rewind(0);
        assert_eq!(p.next_logical().unwrap().0.text(), " A");
    }

    #[test]
    fn test_aread_pads_to_80() {
        let doc = Document::from_text("DATA RECORD\n");
        let mut p = OpenCodeProvider::new(doc, ResourceLocation::default());
        let rec = p.aread();
        assert_eq!(rec.len(), 80);
        assert!(rec.starts_with("DATA RECORD"));
    }

    #[test]
    fn test_macro_provider_replays_body() {
        let mut ids = hlasm_lang_core::IdPool::new();
        let def = Rc::new(MacroDef {
            name: ids.intern("M"),
            label_param: None,
            params: Vec::new(),
            body: vec![
                crate::context::macros::StoredLine {
                    text: " LR 1,2".into(),
                    lineno: 5,
                },
                crate::context::macros::StoredLine {
                    text: " MEND".into(),
                    lineno: 6,
                },
            ],
            seq_symbols: Map::new(),
            location: Location::default(),
        });
        let mut p = MacroProvider::new(def);
        let (l, pos) = p.next_logical().unwrap();
        assert_eq!(pos, 0);
        assert_eq!(l.text(), " LR 1,2");
        assert_eq!(l.segments[0].lineno, 5);
        p.rewind(0);
        assert_eq!(p.next_logical().unwrap().1, 0);
    }

    #[test]
    fn test_copy_provider_merges_continuations() {
        let mut ids = hlasm_lang_core::IdPool::new();
        let line1 = format!("{:<71}X", " MVC A,");
        let member = Rc::new(CopyMember {
            name: ids.intern("C"),
            lines: vec![line1, format!("{:<15}B", "")],
            location: ResourceLocation::default(),
        });
        let mut p = CopyProvider::new(member);
        let (l, _) = p.next_logical(&IctlColumns::default()).unwrap();
        assert_eq!(l.text(), " MVC A,B");
        assert!(p.finished());
    }
}
