//! The LSP occurrence index.
//!
//! Records definitions and references of ordinary symbols, variable
//! symbols, sequence symbols, macros and copy members as analysis runs,
//! then answers go-to-definition / find-references / document-symbol
//! queries positionally.

use hlasm_lang_core::{Id, Location, Position, Range, ResourceLocation};

/// What an occurrence names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    OrdinarySymbol,
    VariableSymbol,
    SequenceSymbol,
    Macro,
    CopyMember,
}

/// One occurrence of a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub kind: OccurrenceKind,
    pub name: Id,
    pub range: Range,
    pub resource: ResourceLocation,
    pub is_definition: bool,
}

/// The index built during one analysis.
#[derive(Debug, Default)]
pub struct LspIndex {
    occurrences: Vec<Occurrence>,
}

impl LspIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        kind: OccurrenceKind,
        name: Id,
        range: Range,
        resource: ResourceLocation,
        is_definition: bool,
    ) {
        if name.is_empty() || range.is_empty() {
            return;
        }
        self.occurrences.push(Occurrence {
            kind,
            name,
            range,
            resource,
            is_definition,
        });
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// The occurrence covering a position, if any.
    pub fn occurrence_at(&self, resource: &ResourceLocation, pos: Position) -> Option<&Occurrence> {
        self.occurrences
            .iter()
            .find(|o| o.resource == *resource && o.range.contains(pos))
    }

    /// Go-to-definition from a position.
    pub fn definition(&self, resource: &ResourceLocation, pos: Position) -> Option<Location> {
        let at = self.occurrence_at(resource, pos)?;
        self.occurrences
            .iter()
            .find(|o| o.name == at.name && o.kind == at.kind && o.is_definition)
            .map(|o| Location::new(o.resource.clone(), o.range.start))
    }

    /// Every reference (and the definition) of the name at a position.
    pub fn references(&self, resource: &ResourceLocation, pos: Position) -> Vec<&Occurrence> {
        match self.occurrence_at(resource, pos) {
            Some(at) => self
                .occurrences
                .iter()
                .filter(|o| o.name == at.name && o.kind == at.kind)
                .collect(),
            None => Vec::new(),
        }
    }

    /// All definitions in a resource (document symbols).
    pub fn document_symbols(&self, resource: &ResourceLocation) -> Vec<&Occurrence> {
        self.occurrences
            .iter()
            .filter(|o| o.is_definition && o.resource == *resource)
            .collect()
    }
}
