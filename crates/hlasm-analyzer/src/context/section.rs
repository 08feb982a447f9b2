//! Sections, location counters and spaces.
//!
//! A section owns an ordered list of location counters (the default one plus
//! any LOCTR-named ones). A counter accumulates known bytes and *spaces* —
//! byte gaps whose length is not known yet (alignment over an unresolved
//! prefix, length-dependent data definitions, ORG to a not-yet-known
//! address). Spaces resolve exactly once, through the dependency solver.

use hlasm_lang_core::Id;

use super::symbol::Address;

/// Arena index of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub usize);

/// Arena index of a location counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoctrId(pub usize);

/// Arena index of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub usize);

/// Section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// CSECT / START.
    Executable,
    /// RSECT.
    ReadOnly,
    /// COM.
    Common,
    /// DSECT.
    Dummy,
    /// EXTRN.
    External,
    /// WXTRN.
    WeakExternal,
}

impl SectionKind {
    /// Control sections take part in the single-private-section rule.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            SectionKind::Executable | SectionKind::ReadOnly | SectionKind::Common
        )
    }
}

/// A section.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,
    pub name: Id,
    pub kind: SectionKind,
    /// Counters in definition order; index 0 is the default counter.
    pub counters: Vec<LoctrId>,
    /// The counter new storage goes to.
    pub current_counter: LoctrId,
}

/// Why a space exists; drives how its length resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Padding to a boundary over an unresolved prefix.
    Alignment { boundary: u32 },
    /// A data-definition chunk with length-dependent operands.
    DataLength,
    /// ORG to an address that is not fully known yet.
    OrgTarget,
    /// ORG with no operand while spaces are pending.
    OrgMax,
}

/// An unresolved byte gap in a counter's chain.
#[derive(Debug, Clone)]
pub struct Space {
    pub id: SpaceId,
    pub counter: LoctrId,
    pub kind: SpaceKind,
    /// Known bytes reserved in the counter before this space.
    pub offset_before: u32,
    /// Spaces created before this one in the same counter.
    pub previous: Vec<SpaceId>,
    /// The resolved length; set exactly once.
    pub resolved_length: Option<u32>,
}

/// A location counter.
#[derive(Debug, Clone)]
pub struct LocationCounter {
    pub id: LoctrId,
    pub name: Id,
    pub section: SectionId,
    /// Known bytes reserved so far (spaces excluded).
    pub offset: u32,
    /// Highest known offset reached (ORG without operand returns here).
    pub max_offset: u32,
    /// Spaces registered in this counter, in order.
    pub spaces: Vec<SpaceId>,
}

impl LocationCounter {
    pub fn new(id: LoctrId, name: Id, section: SectionId) -> Self {
        Self {
            id,
            name,
            section,
            offset: 0,
            max_offset: 0,
            spaces: Vec::new(),
        }
    }

    /// The current address: known offset plus every pending space.
    pub fn current_address(&self) -> Address {
        Address {
            bases: vec![(self.section, 1)],
            offset: self.offset as i32,
            spaces: self.spaces.iter().map(|&s| (s, 1)).collect(),
        }
    }

    /// Whether alignment needs a space (an unresolved prefix makes the
    /// current boundary position unknowable).
    pub fn needs_alignment_space(&self, boundary: u32) -> bool {
        boundary > 1 && !self.spaces.is_empty()
    }

    /// Pad the known offset to a boundary. Only valid without pending
    /// spaces.
    pub fn align_known(&mut self, boundary: u32) {
        if boundary > 1 {
            let rem = self.offset % boundary;
            if rem != 0 {
                self.offset += boundary - rem;
            }
            self.max_offset = self.max_offset.max(self.offset);
        }
    }

    /// Reserve known storage.
    pub fn reserve(&mut self, length: u32) {
        self.offset += length;
        self.max_offset = self.max_offset.max(self.offset);
    }

    /// Set the known offset (ORG with a resolved target).
    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
        self.max_offset = self.max_offset.max(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> LocationCounter {
        LocationCounter::new(LoctrId(0), Id::EMPTY, SectionId(0))
    }

    #[test]
    fn test_reserve_advances() {
        let mut c = counter();
        c.reserve(4);
        c.reserve(2);
        assert_eq!(c.offset, 6);
        assert_eq!(c.max_offset, 6);
    }

    #[test]
    fn test_align_known() {
        let mut c = counter();
        c.reserve(3);
        c.align_known(8);
        assert_eq!(c.offset, 8);
        c.align_known(8);
        assert_eq!(c.offset, 8);
    }

    #[test]
    fn test_max_offset_tracks_backward_org() {
        let mut c = counter();
        c.reserve(100);
        c.set_offset(10);
        assert_eq!(c.offset, 10);
        assert_eq!(c.max_offset, 100);
    }

    #[test]
    fn test_current_address_includes_spaces() {
        let mut c = counter();
        c.reserve(8);
        c.spaces.push(SpaceId(3));
        let addr = c.current_address();
        assert_eq!(addr.offset, 8);
        assert_eq!(addr.spaces, vec![(SpaceId(3), 1)]);
    }

    #[test]
    fn test_alignment_space_needed_only_with_pending() {
        let mut c = counter();
        assert!(!c.needs_alignment_space(8));
        c.spaces.push(SpaceId(0));
        assert!(c.needs_alignment_space(8));
        assert!(!c.needs_alignment_space(1));
    }
}
