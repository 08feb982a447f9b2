//! Library access interfaces.
//!
//! The analyzer never performs I/O itself; COPY members, macro
//! auto-includes and preprocessor includes all go through a
//! [`LibraryProvider`] borrowed from the host. Synthesized documents are
//! announced to a [`VirtualFileMonitor`].

use hlasm_lang_core::{Id, ResourceLocation};
use hlasm_parser::ProcessingKind;

use crate::AnalyzingContext;

/// Why a library member is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryData {
    pub kind: ProcessingKind,
    pub member: Id,
}

/// A fetched library member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMember {
    pub text: String,
    pub location: ResourceLocation,
}

/// The host's library access.
pub trait LibraryProvider {
    /// Best-effort existence check; used to decide whether an unknown
    /// opcode is worth an auto-include attempt.
    fn has_library(&self, name: &str) -> bool;

    /// Fetch a member's text. `None` when the member does not exist.
    fn get_library(&self, name: &str) -> Option<LibraryMember>;

    /// Reentrant analysis of a macro member against a shared context.
    /// Returns true when the member was analyzed successfully.
    fn parse_library(&self, name: &str, ctx: AnalyzingContext, data: LibraryData) -> bool;
}

/// The process-wide provider that has nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyLibraryProvider;

/// The sentinel instance used when no provider is supplied.
pub static EMPTY_LIBRARY_PROVIDER: EmptyLibraryProvider = EmptyLibraryProvider;

impl LibraryProvider for EmptyLibraryProvider {
    fn has_library(&self, _name: &str) -> bool {
        false
    }

    fn get_library(&self, _name: &str) -> Option<LibraryMember> {
        None
    }

    fn parse_library(&self, _name: &str, _ctx: AnalyzingContext, _data: LibraryData) -> bool {
        false
    }
}

/// A handle to a preprocessor-synthesized document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualFileHandle(pub u64);

/// Receives notifications about synthesized documents.
pub trait VirtualFileMonitor {
    fn file_generated(&self, handle: VirtualFileHandle, location: &ResourceLocation, text: &str);
}

/// A message asking the editor to fade an inactive region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FadeMessage {
    pub resource: ResourceLocation,
    /// Zero-based line range, end inclusive.
    pub first_line: usize,
    pub last_line: usize,
}
