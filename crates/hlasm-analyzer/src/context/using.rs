//! The USING map.
//!
//! A stack of frames; the active frame maps base addresses (with an
//! optional range end) to register lists. `PUSH USING` saves the active
//! frame, `POP USING` restores it, `DROP` removes entries.

use hlasm_lang_core::Id;

use super::symbol::SymbolValue;

/// One USING entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingEntry {
    /// Qualifier label, for labeled USING.
    pub label: Option<Id>,
    /// The base address expression's value at the USING statement.
    pub base: SymbolValue,
    /// Optional end of the mapped range.
    pub end: Option<SymbolValue>,
    /// Register operands, in order.
    pub regs: Vec<i32>,
}

/// The USING map of one assembly.
#[derive(Debug, Clone, Default)]
pub struct UsingMap {
    active: Vec<UsingEntry>,
    saved: Vec<Vec<UsingEntry>>,
}

impl UsingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// USING: add an entry. A register already mapped is taken over by the
    /// new entry.
    pub fn add(&mut self, entry: UsingEntry) {
        for e in &mut self.active {
            e.regs.retain(|r| !entry.regs.contains(r));
        }
        self.active.retain(|e| !e.regs.is_empty() || e.label.is_some());
        self.active.push(entry);
    }

    /// DROP with registers/labels; an empty list drops everything.
    pub fn remove(&mut self, regs: &[i32], labels: &[Id]) {
        if regs.is_empty() && labels.is_empty() {
            self.active.clear();
            return;
        }
        for e in &mut self.active {
            e.regs.retain(|r| !regs.contains(r));
        }
        self.active
            .retain(|e| !e.regs.is_empty() && !e.label.is_some_and(|l| labels.contains(&l)));
    }

    /// PUSH USING.
    pub fn push(&mut self) {
        self.saved.push(self.active.clone());
    }

    /// POP USING; false when nothing was pushed.
    pub fn pop(&mut self) -> bool {
        match self.saved.pop() {
            Some(frame) => {
                self.active = frame;
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> &[UsingEntry] {
        &self.active
    }

    /// A snapshot index for dependency evaluation contexts: the count of
    /// entries identifies the map state at a point in time well enough for
    /// diagnostics.
    pub fn generation(&self) -> usize {
        self.active.len() + self.saved.len() * 64
    }
}
