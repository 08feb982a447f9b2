//! Analyzer configuration.
//!
//! [`AsmOptions`] mirrors the assembler parameters a host passes down;
//! [`AnalyzerOptions`] configures one analysis. Invalid combinations are
//! API errors ([`OptionsError`]), not diagnostics — nothing has been
//! analyzed yet.

use std::rc::Rc;

use hlasm_lang_core::{IdPool, ResourceLocation};
use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::library::{LibraryData, LibraryProvider, VirtualFileMonitor};
use crate::AnalyzingContext;

/// Assembler parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsmOptions {
    /// &SYSPARM value.
    pub sysparm: String,
    /// &SYSTEM_ID value.
    pub system_id: String,
    /// Control-section alignment boundary (START offsets round up to it).
    pub sectalgn: u32,
    /// Statement-count safety limit.
    pub statement_limit: usize,
}

impl Default for AsmOptions {
    fn default() -> Self {
        Self {
            sysparm: String::new(),
            system_id: "z/OS".to_string(),
            sectalgn: 8,
            statement_limit: 10_000_000,
        }
    }
}

/// Preprocessor selection, applied in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessorOptions {
    Db2 {
        /// DB2 version string injected into generated comments.
        version: String,
    },
    Cics,
    Endevor,
}

/// Invalid option combinations.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum OptionsError {
    /// `analyzing_context` continues an existing assembly; a fresh-context
    /// option contradicts it.
    #[error("analyzing_context cannot be combined with {other}")]
    ContextConflict {
        /// The conflicting option's name.
        other: &'static str,
    },
}

/// Options of one analysis. Build with the `with_*` methods; unset options
/// keep their defaults.
#[derive(Default)]
pub struct AnalyzerOptions {
    pub(crate) file_location: ResourceLocation,
    pub(crate) library_provider: Option<Rc<dyn LibraryProvider>>,
    pub(crate) asm_options: Option<AsmOptions>,
    pub(crate) analyzing_context: Option<AnalyzingContext>,
    pub(crate) library_data: Option<LibraryData>,
    pub(crate) collect_highlighting: bool,
    pub(crate) parsing_opencode: bool,
    pub(crate) ids_init: Option<IdPool>,
    pub(crate) preprocessor_args: Vec<PreprocessorOptions>,
    pub(crate) vf_monitor: Option<Rc<dyn VirtualFileMonitor>>,
    pub(crate) fade_messages: bool,
}

impl AnalyzerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_location(mut self, loc: ResourceLocation) -> Self {
        self.file_location = loc;
        self
    }

    pub fn with_library_provider(mut self, provider: Rc<dyn LibraryProvider>) -> Self {
        self.library_provider = Some(provider);
        self
    }

    /// Build a fresh context with these assembler parameters.
    pub fn with_asm_options(mut self, options: AsmOptions) -> Self {
        self.asm_options = Some(options);
        self
    }

    /// Continue an existing assembly (reentrant macro/copy member parsing).
    pub fn with_analyzing_context(mut self, ctx: AnalyzingContext) -> Self {
        self.analyzing_context = Some(ctx);
        self
    }

    pub fn with_library_data(mut self, data: LibraryData) -> Self {
        self.library_data = Some(data);
        self
    }

    pub fn with_highlighting(mut self, collect: bool) -> Self {
        self.collect_highlighting = collect;
        self
    }

    pub fn with_parsing_opencode(mut self, opencode: bool) -> Self {
        self.parsing_opencode = opencode;
        self
    }

    pub fn with_ids_init(mut self, ids: IdPool) -> Self {
        self.ids_init = Some(ids);
        self
    }

    pub fn with_preprocessors(mut self, args: Vec<PreprocessorOptions>) -> Self {
        self.preprocessor_args = args;
        self
    }

    pub fn with_vf_monitor(mut self, monitor: Rc<dyn VirtualFileMonitor>) -> Self {
        self.vf_monitor = Some(monitor);
        self
    }

    pub fn with_fade_messages(mut self, collect: bool) -> Self {
        self.fade_messages = collect;
        self
    }

    /// Check the mutual-exclusion invariant.
    pub(crate) fn validate(&self) -> Result<(), OptionsError> {
        if self.analyzing_context.is_some() {
            if self.asm_options.is_some() {
                return Err(OptionsError::ContextConflict {
                    other: "asm_options",
                });
            }
            if self.ids_init.is_some() {
                return Err(OptionsError::ContextConflict { other: "ids_init" });
            }
            if !self.preprocessor_args.is_empty() {
                return Err(OptionsError::ContextConflict {
                    other: "preprocessor_args",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HlasmContext;
    use std::cell::RefCell;

    #[test]
    fn test_defaults() {
        let opts = AnalyzerOptions::new();
        assert!(opts.validate().is_ok());
        assert!(!opts.collect_highlighting);
        assert!(opts.preprocessor_args.is_empty());
    }

    #[test]
    fn test_context_excludes_fresh_options() {
        let ctx = AnalyzingContext(Rc::new(RefCell::new(HlasmContext::new(
            ResourceLocation::default(),
            AsmOptions::default(),
            IdPool::new(),
        ))));
        let opts = AnalyzerOptions::new()
            .with_analyzing_context(ctx)
            .with_asm_options(AsmOptions::default());
        assert!(matches!(
            opts.validate(),
            Err(OptionsError::ContextConflict {
                other: "asm_options"
            })
        ));
    }

    #[test]
    fn test_asm_options_serde() {
        let opts = AsmOptions::default();
        let json = serde_json::to_string(&opts).unwrap();
        let back: AsmOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }
}
