#![forbid(unsafe_code)]
//! HLASM semantic analyzer.
//!
//! The compile-pipeline core of an HLASM language server. Given source
//! text, a library provider and options, it produces diagnostics, semantic
//! tokens and an LSP occurrence index:
//!
//! - **Context** — the shared state of one assembly: interned identifiers,
//!   sections and location counters, the symbol table with its dependency
//!   graph, SET-variable scopes, macro and copy-member storage ([`context`])
//! - **Processing** — the cooperative step engine: statement providers,
//!   the processing manager's state machine, the ordinary / macro-definition
//!   / lookahead / conditional-assembly processors, and the preprocessor
//!   chain ([`processing`])
//! - **Dependency resolution** — postponed statements, forward references
//!   and unresolved spaces run to a fixed point; leftovers surface as E033
//!   ([`context::dependency`])
//! - **Outputs** — [`Diagnostic`](hlasm_lang_core::Diagnostic) streams,
//!   semantic tokens ([`semantics`]), the occurrence index ([`lsp`]) and
//!   [`metrics::Metrics`]
//!
//! Everything is single-threaded and cooperative: `analyze()` drives the
//! pipeline against the borrowed [`library::LibraryProvider`], and the
//! `step()`/`supply_*` surface suspends at the defined points (COPY
//! members, macro auto-includes, preprocessor includes) for hosts that
//! resolve libraries asynchronously.

pub mod analyzer;
pub mod context;
pub mod diags;
pub mod expression;
pub mod instructions;
pub mod library;
pub mod lsp;
pub mod metrics;
pub mod options;
pub mod processing;
pub mod semantics;

pub use analyzer::{Analyzer, AnalyzingContext};
pub use context::HlasmContext;
pub use library::{
    EmptyLibraryProvider, FadeMessage, LibraryData, LibraryMember, LibraryProvider,
    VirtualFileHandle, VirtualFileMonitor, EMPTY_LIBRARY_PROVIDER,
};
pub use metrics::Metrics;
pub use options::{AnalyzerOptions, AsmOptions, OptionsError, PreprocessorOptions};
pub use processing::{FetchRequest, StepResult};
pub use semantics::{TokenInfo, TokenKind};
