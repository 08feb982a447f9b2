//! Ordinary-assembly symbols: values, addresses, attributes.
//!
//! A symbol value is undefined, absolute, or relocatable. Relocatable values
//! carry an [`Address`]: section bases with multiplicity, a byte offset, and
//! the chain of unresolved spaces the offset sits behind. Subtracting two
//! addresses of the same section cancels the base and yields an absolute
//! value; a net base count other than one reports as [`SymbolValueKind::Multiple`].

use hlasm_lang_core::Location;
use hlasm_parser::data_def::ascii_to_ebcdic;

use super::section::{SectionId, SpaceId};
use super::ProcessingSnapshot;
use hlasm_lang_core::Id;

/// A relocatable address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Section bases with multiplicity (normally one entry with count 1).
    pub bases: Vec<(SectionId, i32)>,
    /// Known byte offset.
    pub offset: i32,
    /// Unresolved spaces the offset depends on, with multiplicity.
    pub spaces: Vec<(SpaceId, i32)>,
}

impl Address {
    /// An address at `offset` within a section.
    pub fn in_section(section: SectionId, offset: i32) -> Self {
        Self {
            bases: vec![(section, 1)],
            offset,
            spaces: Vec::new(),
        }
    }

    pub fn has_spaces(&self) -> bool {
        !self.spaces.is_empty()
    }

    /// Net number of section bases.
    pub fn base_count(&self) -> i32 {
        self.bases.iter().map(|(_, n)| n).sum()
    }

    /// The single section this address is relative to, when simple.
    pub fn simple_base(&self) -> Option<SectionId> {
        match self.bases.as_slice() {
            [(sect, 1)] => Some(*sect),
            _ => None,
        }
    }

    fn merge_counts<T: Copy + Eq>(lhs: &[(T, i32)], rhs: &[(T, i32)], sign: i32) -> Vec<(T, i32)> {
        let mut out: Vec<(T, i32)> = lhs.to_vec();
        for &(key, n) in rhs {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing += sign * n,
                None => out.push((key, sign * n)),
            }
        }
        out.retain(|(_, n)| *n != 0);
        out
    }

    pub fn add(&self, other: &Address) -> Address {
        Address {
            bases: Self::merge_counts(&self.bases, &other.bases, 1),
            offset: self.offset.wrapping_add(other.offset),
            spaces: Self::merge_counts(&self.spaces, &other.spaces, 1),
        }
    }

    pub fn sub(&self, other: &Address) -> Address {
        Address {
            bases: Self::merge_counts(&self.bases, &other.bases, -1),
            offset: self.offset.wrapping_sub(other.offset),
            spaces: Self::merge_counts(&self.spaces, &other.spaces, -1),
        }
    }

    pub fn add_offset(&self, delta: i32) -> Address {
        let mut a = self.clone();
        a.offset = a.offset.wrapping_add(delta);
        a
    }
}

/// A symbol's value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolValue {
    #[default]
    Undefined,
    Absolute(i32),
    Reloc(Address),
}

/// The externally visible kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolValueKind {
    Undefined,
    Absolute,
    Relocatable,
    /// Relocatable with a net base count other than one.
    Multiple,
}

impl SymbolValue {
    pub fn kind(&self) -> SymbolValueKind {
        match self {
            SymbolValue::Undefined => SymbolValueKind::Undefined,
            SymbolValue::Absolute(_) => SymbolValueKind::Absolute,
            SymbolValue::Reloc(a) => {
                if a.bases.is_empty() {
                    SymbolValueKind::Absolute
                } else if a.base_count() == 1 && a.bases.len() == 1 {
                    SymbolValueKind::Relocatable
                } else {
                    SymbolValueKind::Multiple
                }
            }
        }
    }

    pub fn abs(&self) -> Option<i32> {
        match self {
            SymbolValue::Absolute(v) => Some(*v),
            SymbolValue::Reloc(a) if a.bases.is_empty() && !a.has_spaces() => Some(a.offset),
            _ => None,
        }
    }

    pub fn reloc(&self) -> Option<&Address> {
        match self {
            SymbolValue::Reloc(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, SymbolValue::Undefined)
    }

    pub fn add(&self, other: &SymbolValue) -> SymbolValue {
        use SymbolValue::*;
        match (self, other) {
            (Absolute(a), Absolute(b)) => Absolute(a.wrapping_add(*b)),
            (Reloc(a), Absolute(b)) => Reloc(a.add_offset(*b)),
            (Absolute(a), Reloc(b)) => Reloc(b.add_offset(*a)),
            (Reloc(a), Reloc(b)) => normalize(a.add(b)),
            _ => Undefined,
        }
    }

    pub fn sub(&self, other: &SymbolValue) -> SymbolValue {
        use SymbolValue::*;
        match (self, other) {
            (Absolute(a), Absolute(b)) => Absolute(a.wrapping_sub(*b)),
            (Reloc(a), Absolute(b)) => Reloc(a.add_offset(-*b)),
            (Absolute(a), Reloc(b)) => {
                let neg = Address::default().sub(b);
                Reloc(neg.add_offset(*a))
            }
            (Reloc(a), Reloc(b)) => normalize(a.sub(b)),
            _ => Undefined,
        }
    }
}

/// Collapse a base-free, space-free address to an absolute value.
fn normalize(a: Address) -> SymbolValue {
    if a.bases.is_empty() && a.spaces.is_empty() {
        SymbolValue::Absolute(a.offset)
    } else {
        SymbolValue::Reloc(a)
    }
}

/// How the symbol came to exist; governs which attributes it defaults to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOrigin {
    Section,
    DataDef,
    Equ,
    Asm,
    MachineLabel,
    External,
}

/// Symbol attributes: EBCDIC type byte, length, scale, integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAttributes {
    pub origin: SymbolOrigin,
    /// Type attribute, an EBCDIC byte ('U' when undefined).
    pub type_attr: u8,
    pub length: Option<u16>,
    pub scale: Option<i16>,
    pub integer: Option<i16>,
}

/// EBCDIC byte of an ASCII type character.
pub fn ebcdic_type(c: char) -> u8 {
    ascii_to_ebcdic(c as u8)
}

impl SymbolAttributes {
    pub fn new(origin: SymbolOrigin, type_attr: char, length: Option<u16>) -> Self {
        Self {
            origin,
            type_attr: ebcdic_type(type_attr),
            length,
            scale: None,
            integer: None,
        }
    }

    /// CSECT/DSECT/... labels and LOCTR names.
    pub fn section() -> Self {
        Self::new(SymbolOrigin::Section, 'J', Some(1))
    }

    /// EXTRN symbols.
    pub fn extrn() -> Self {
        Self::new(SymbolOrigin::External, 'T', Some(1))
    }

    /// WXTRN symbols.
    pub fn wxtrn() -> Self {
        Self::new(SymbolOrigin::External, '$', Some(1))
    }

    /// ORG labels.
    pub fn org() -> Self {
        Self::new(SymbolOrigin::Equ, 'U', Some(1))
    }

    /// CCW labels.
    pub fn ccw() -> Self {
        Self::new(SymbolOrigin::Asm, 'W', Some(8))
    }

    /// CNOP labels.
    pub fn cnop() -> Self {
        Self::new(SymbolOrigin::Asm, 'I', Some(0))
    }

    /// CXD labels.
    pub fn cxd() -> Self {
        Self::new(SymbolOrigin::Asm, 'A', Some(4))
    }

    /// Machine-instruction labels.
    pub fn machine(length: u16) -> Self {
        Self::new(SymbolOrigin::MachineLabel, 'I', Some(length))
    }

    /// The length attribute with the HLASM default of 1.
    pub fn length_or_default(&self) -> u16 {
        self.length.unwrap_or(1)
    }

    pub fn scale_or_default(&self) -> i16 {
        self.scale.unwrap_or(0)
    }
}

/// A defined (or placeholder) ordinary symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Id,
    pub value: SymbolValue,
    pub attrs: SymbolAttributes,
    /// Where the symbol was defined.
    pub location: Location,
    /// The macro/copy nesting active at definition time.
    pub stack: ProcessingSnapshot,
}

impl Symbol {
    /// Set the length attribute after the fact (self-referencing data
    /// definitions only).
    pub fn set_length(&mut self, len: u16) {
        self.attrs.length = Some(len);
    }

    pub fn set_scale(&mut self, scale: i16) {
        self.attrs.scale = Some(scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sect(n: usize) -> SectionId {
        SectionId(n)
    }

    #[test]
    fn test_same_section_difference_is_absolute() {
        let a = SymbolValue::Reloc(Address::in_section(sect(0), 24));
        let b = SymbolValue::Reloc(Address::in_section(sect(0), 8));
        assert_eq!(a.sub(&b), SymbolValue::Absolute(16));
    }

    #[test]
    fn test_cross_section_difference_stays_relocatable() {
        let a = SymbolValue::Reloc(Address::in_section(sect(0), 24));
        let b = SymbolValue::Reloc(Address::in_section(sect(1), 8));
        assert_eq!(a.sub(&b).kind(), SymbolValueKind::Multiple);
    }

    #[test]
    fn test_reloc_plus_abs() {
        let a = SymbolValue::Reloc(Address::in_section(sect(0), 10));
        let r = a.add(&SymbolValue::Absolute(6));
        assert_eq!(r.reloc().unwrap().offset, 16);
        assert_eq!(r.kind(), SymbolValueKind::Relocatable);
    }

    #[test]
    fn test_sum_of_two_relocs_is_multiple() {
        let a = SymbolValue::Reloc(Address::in_section(sect(0), 1));
        let b = SymbolValue::Reloc(Address::in_section(sect(0), 2));
        assert_eq!(a.add(&b).kind(), SymbolValueKind::Multiple);
    }

    #[test]
    fn test_undefined_propagates() {
        let a = SymbolValue::Undefined;
        assert_eq!(a.add(&SymbolValue::Absolute(1)), SymbolValue::Undefined);
    }

    #[test]
    fn test_ebcdic_type_bytes() {
        assert_eq!(ebcdic_type('U'), 0xE4);
        assert_eq!(ebcdic_type('J'), 0xD1);
        assert_eq!(ebcdic_type('I'), 0xC9);
    }

    #[test]
    fn test_space_cancellation() {
        let sp = SpaceId(7);
        let mut a = Address::in_section(sect(0), 8);
        a.spaces.push((sp, 1));
        let mut b = Address::in_section(sect(0), 2);
        b.spaces.push((sp, 1));
        let diff = a.sub(&b);
        assert!(diff.spaces.is_empty());
        assert!(diff.bases.is_empty());
        assert_eq!(diff.offset, 6);
    }
}
