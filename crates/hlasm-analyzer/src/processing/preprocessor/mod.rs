//! The preprocessor chain.
//!
//! Zero or more preprocessors transform the document before the open-code
//! provider reads it; the output of one is the input of the next, and their
//! diagnostics merge in chain order. Preprocessors may pull library members
//! (DB2 `INCLUDE`, ENDEVOR `-INC`) through the fetcher the analyzer
//! supplies. Replaced regions are reported as fade messages; generated
//! statements are kept for the symbol index.

pub mod cics;
pub mod db2;
pub mod endevor;

use hlasm_lang_core::{Diagnostic, ResourceLocation};

use crate::library::{FadeMessage, LibraryMember};
use crate::options::PreprocessorOptions;
use crate::processing::providers::Document;

/// A member another document pulled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedMember {
    pub name: String,
    pub location: ResourceLocation,
}

/// A synthetic statement a preprocessor generated, for the symbol index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorStatement {
    pub name: String,
    /// Line in the output document.
    pub line: usize,
}

/// Fetches a library member on behalf of a preprocessor.
pub trait MemberFetcher {
    fn fetch(&mut self, name: &str) -> Option<LibraryMember>;
}

impl<F> MemberFetcher for F
where
    F: FnMut(&str) -> Option<LibraryMember>,
{
    fn fetch(&mut self, name: &str) -> Option<LibraryMember> {
        self(name)
    }
}

/// One preprocessor.
pub trait Preprocessor {
    /// Transform the document.
    fn generate_replacement(
        &mut self,
        doc: Document,
        fetcher: &mut dyn MemberFetcher,
        diags: &mut Vec<Diagnostic>,
    ) -> Document;

    /// Synthetic statements generated so far (transferred).
    fn take_statements(&mut self) -> Vec<PreprocessorStatement>;

    /// Members the preprocessor inlined.
    fn included_members(&self) -> &[IncludedMember];

    /// Regions replaced or deactivated (transferred).
    fn take_fade(&mut self) -> Vec<FadeMessage>;
}

/// Build the chain configured by the options.
pub fn build_chain(args: &[PreprocessorOptions]) -> Vec<Box<dyn Preprocessor>> {
    args.iter()
        .map(|opt| -> Box<dyn Preprocessor> {
            match opt {
                PreprocessorOptions::Db2 { version } => {
                    Box::new(db2::Db2Preprocessor::new(version.clone()))
                }
                PreprocessorOptions::Cics => Box::new(cics::CicsPreprocessor::new()),
                PreprocessorOptions::Endevor => Box::new(endevor::EndevorPreprocessor::new()),
            }
        })
        .collect()
}

/// Run a chain over a document, merging diagnostics in order.
pub fn run_chain(
    chain: &mut [Box<dyn Preprocessor>],
    mut doc: Document,
    fetcher: &mut dyn MemberFetcher,
    diags: &mut Vec<Diagnostic>,
) -> Document {
    for p in chain.iter_mut() {
        doc = p.generate_replacement(doc, fetcher, diags);
    }
    doc
}
