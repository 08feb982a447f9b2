//! Shared mutable state of an in-progress assembly.
//!
//! [`HlasmContext`] aggregates the identifier pool, the ordinary-assembly
//! context with its dependency graph, the conditional-assembly variable
//! scopes, macro and copy-member storage, the USING map, the OPSYN mnemonic
//! table and the processing stack of nested macro/copy frames.

pub mod dependency;
pub mod macros;
pub mod ordinary;
pub mod section;
pub mod symbol;
pub mod using;
pub mod variables;

use std::collections::HashMap;

use hlasm_lang_core::{Id, IdPool, Location, Position, ResourceLocation};

use crate::instructions::{classify_opcode, CaInstr, OpcodeKind};
use crate::metrics::Metrics;
use crate::options::AsmOptions;
use dependency::DependencyGraph;
use macros::MacroStorage;
use ordinary::OrdinaryContext;
use using::UsingMap;
use variables::ConditionalContext;

/// One frame of the processing stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingFrame {
    pub kind: FrameKind,
    pub location: Location,
}

/// What kind of source a frame processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    OpenCode,
    Macro(Id),
    Copy(Id),
}

/// A snapshot of the stack, recorded with every first-time symbol
/// definition so diagnostics can point at the use site.
pub type ProcessingSnapshot = Vec<ProcessingFrame>;

/// An opcode after OPSYN and macro resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOpcode {
    /// A defined macro.
    Macro(Id),
    /// An assembler directive (base name after aliasing).
    Asm(Id),
    /// A conditional-assembly instruction.
    Ca(CaInstr),
    /// A machine instruction with its encoded length.
    Machine(u32),
}

/// The shared context of one assembly.
#[derive(Debug)]
pub struct HlasmContext {
    pub ids: IdPool,
    /// Location of the open-code document.
    pub opencode_location: ResourceLocation,
    pub options: AsmOptions,
    pub ord: OrdinaryContext,
    pub deps: DependencyGraph,
    pub usings: UsingMap,
    pub cond: ConditionalContext,
    pub storage: MacroStorage,
    /// OPSYN table: alias to base operation, `None` for removed mnemonics.
    mnemonics: HashMap<Id, Option<Id>>,
    stack: Vec<ProcessingFrame>,
    /// Position of the statement being processed.
    pub current_position: Position,
    pub title_name: Option<String>,
    pub mnote_max: u32,
    pub end_reached: bool,
    pub metrics: Metrics,
    sysndx: u32,
}

impl HlasmContext {
    pub fn new(opencode_location: ResourceLocation, options: AsmOptions, ids: IdPool) -> Self {
        let stack = vec![ProcessingFrame {
            kind: FrameKind::OpenCode,
            location: Location::new(opencode_location.clone(), Position::default()),
        }];
        Self {
            ids,
            opencode_location,
            options,
            ord: OrdinaryContext::new(),
            deps: DependencyGraph::new(),
            usings: UsingMap::new(),
            cond: ConditionalContext::new(),
            storage: MacroStorage::default(),
            mnemonics: HashMap::new(),
            stack,
            current_position: Position::default(),
            title_name: None,
            mnote_max: 0,
            end_reached: false,
            metrics: Metrics::default(),
            sysndx: 0,
        }
    }

    pub fn intern(&mut self, name: &str) -> Id {
        self.ids.intern(name)
    }

    // -- processing stack ---------------------------------------------------

    pub fn processing_stack(&self) -> &[ProcessingFrame] {
        &self.stack
    }

    pub fn snapshot(&self) -> ProcessingSnapshot {
        self.stack.clone()
    }

    pub fn push_frame(&mut self, kind: FrameKind, location: Location) {
        self.stack.push(ProcessingFrame { kind, location });
        let nesting = (self.stack.len() - 1) as u64;
        self.metrics.max_nesting = self.metrics.max_nesting.max(nesting);
    }

    /// Pop a macro/copy frame. The open-code frame never pops; popping it
    /// would be a broken invariant.
    pub fn pop_frame(&mut self) {
        assert!(self.stack.len() > 1, "popped the open-code frame");
        self.stack.pop();
    }

    /// The location of the statement being processed, in the innermost
    /// frame's resource.
    pub fn current_location(&self) -> Location {
        let top = self.stack.last().expect("stack never empty");
        Location::new(top.location.resource.clone(), self.current_position)
    }

    /// Names of every copy member on the stack, outermost first.
    pub fn whole_copy_stack(&self) -> Vec<Id> {
        self.stack
            .iter()
            .filter_map(|f| match f.kind {
                FrameKind::Copy(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    // -- mnemonics (OPSYN) --------------------------------------------------

    /// OPSYN aliasing: `alias` now means what `target` means. The target is
    /// stored pre-resolved, so later redefinitions of the target do not
    /// retroactively change the alias.
    pub fn add_mnemonic(&mut self, alias: Id, target: Id) {
        let base = self.resolve_alias(target);
        self.mnemonics.insert(alias, Some(base));
    }

    /// OPSYN deletion.
    pub fn remove_mnemonic(&mut self, name: Id) {
        self.mnemonics.insert(name, None);
    }

    fn resolve_alias(&self, name: Id) -> Id {
        match self.mnemonics.get(&name) {
            Some(Some(base)) => *base,
            _ => name,
        }
    }

    /// Resolve an operation code through OPSYN, macros and the instruction
    /// tables. `None` means the opcode does not exist (anymore).
    pub fn get_opcode(&self, name: Id) -> Option<ResolvedOpcode> {
        let base = match self.mnemonics.get(&name) {
            Some(Some(b)) => *b,
            Some(None) => return None,
            None => name,
        };
        if self.storage.get_macro(base).is_some() {
            return Some(ResolvedOpcode::Macro(base));
        }
        match classify_opcode(self.ids.text(base)) {
            Some(OpcodeKind::Asm) => Some(ResolvedOpcode::Asm(base)),
            Some(OpcodeKind::Ca(ca)) => Some(ResolvedOpcode::Ca(ca)),
            Some(OpcodeKind::Machine(len)) => Some(ResolvedOpcode::Machine(len)),
            None => None,
        }
    }

    // -- miscellaneous ------------------------------------------------------

    pub fn next_sysndx(&mut self) -> u32 {
        self.sysndx += 1;
        self.sysndx
    }

    pub fn update_mnote_max(&mut self, level: u32) {
        self.mnote_max = self.mnote_max.max(level);
    }

    pub fn end_reached(&mut self) {
        self.end_reached = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> HlasmContext {
        HlasmContext::new(
            ResourceLocation::new("file:///test.hlasm"),
            AsmOptions::default(),
            IdPool::new(),
        )
    }

    #[test]
    fn test_opcode_resolution_tables() {
        let mut c = ctx();
        let dc = c.intern("DC");
        let lr = c.intern("LR");
        let aif = c.intern("AIF");
        assert_eq!(c.get_opcode(dc), Some(ResolvedOpcode::Asm(dc)));
        assert_eq!(c.get_opcode(lr), Some(ResolvedOpcode::Machine(2)));
        assert_eq!(c.get_opcode(aif), Some(ResolvedOpcode::Ca(CaInstr::Aif)));
        let nope = c.intern("NOPE");
        assert_eq!(c.get_opcode(nope), None);
    }

    #[test]
    fn test_opsyn_alias_and_removal() {
        let mut c = ctx();
        let store = c.intern("STORE");
        let st = c.intern("ST");
        c.add_mnemonic(store, st);
        assert_eq!(c.get_opcode(store), Some(ResolvedOpcode::Machine(4)));

        c.remove_mnemonic(st);
        // The alias was resolved at definition time and survives.
        assert_eq!(c.get_opcode(store), Some(ResolvedOpcode::Machine(4)));
        assert_eq!(c.get_opcode(st), None);
    }

    #[test]
    fn test_copy_stack_names() {
        let mut c = ctx();
        let a = c.intern("COPYA");
        let b = c.intern("COPYB");
        let loc = Location::default();
        c.push_frame(FrameKind::Copy(a), loc.clone());
        c.push_frame(FrameKind::Macro(c.ids.find("COPYA").unwrap()), loc.clone());
        c.push_frame(FrameKind::Copy(b), loc);
        assert_eq!(c.whole_copy_stack(), vec![a, b]);
        assert_eq!(c.metrics.max_nesting, 3);
    }

    #[test]
    fn test_current_location_tracks_frame_resource() {
        let mut c = ctx();
        let m = c.intern("MAC");
        c.push_frame(
            FrameKind::Macro(m),
            Location::new(ResourceLocation::new("hlasm://macro/MAC"), Position::default()),
        );
        c.current_position = Position::new(7, 0);
        let loc = c.current_location();
        assert_eq!(loc.resource.as_str(), "hlasm://macro/MAC");
        assert_eq!(loc.pos.line, 7);
    }
}
