//! The analyzer front door.
//!
//! `Analyzer::new` builds (or continues) a context, runs the preprocessor
//! chain, and sets up the processing manager. `analyze()` drives the
//! pipeline to completion against the borrowed library provider;
//! `step()`/`supply_*` expose the same pipeline cooperatively, suspending
//! at library fetches so a host can fulfil them asynchronously.

use std::cell::RefCell;
use std::rc::Rc;

use hlasm_lang_core::{Diagnostic, ResourceLocation};
use hlasm_parser::ProcessingKind;

use crate::context::HlasmContext;
use crate::library::{
    EmptyLibraryProvider, FadeMessage, LibraryData, LibraryProvider, VirtualFileHandle,
    VirtualFileMonitor,
};
use crate::lsp::LspIndex;
use crate::metrics::Metrics;
use crate::options::{AnalyzerOptions, OptionsError};
use crate::processing::manager::ProcessingManager;
use crate::processing::preprocessor::{build_chain, run_chain, PreprocessorStatement};
use crate::processing::providers::Document;
use crate::processing::{FetchRequest, StepResult};
use crate::semantics::TokenInfo;

/// The shared context of one assembly, cheap to clone and hand to
/// reentrant invocations.
#[derive(Clone)]
pub struct AnalyzingContext(pub Rc<RefCell<HlasmContext>>);

impl AnalyzingContext {
    pub fn new(ctx: HlasmContext) -> Self {
        Self(Rc::new(RefCell::new(ctx)))
    }
}

impl std::fmt::Debug for AnalyzingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzingContext").finish_non_exhaustive()
    }
}

/// The analyzer of one text.
pub struct Analyzer {
    ctx: AnalyzingContext,
    mgr: ProcessingManager,
    lib: Rc<dyn LibraryProvider>,
    vf_monitor: Option<Rc<dyn VirtualFileMonitor>>,
    vf_handles: Vec<(VirtualFileHandle, ResourceLocation)>,
    vf_counter: u64,
    fade: Vec<FadeMessage>,
    collect_fade: bool,
    preprocessor_statements: Vec<PreprocessorStatement>,
    diags: Vec<Diagnostic>,
    file_location: ResourceLocation,
}

impl Analyzer {
    /// Build an analyzer over `text`. Option conflicts are errors, not
    /// diagnostics.
    pub fn new(text: &str, opts: AnalyzerOptions) -> Result<Self, OptionsError> {
        opts.validate()?;

        let AnalyzerOptions {
            file_location,
            library_provider,
            asm_options,
            analyzing_context,
            library_data,
            collect_highlighting,
            parsing_opencode,
            ids_init,
            preprocessor_args,
            vf_monitor,
            fade_messages,
        } = opts;

        // A fresh context makes this analyzer the owner of the assembly's
        // close-out; continuations of an existing context never settle the
        // dependency graph themselves.
        let owns_closeout = analyzing_context.is_none();
        let ctx = match analyzing_context {
            Some(ctx) => ctx,
            None => AnalyzingContext::new(HlasmContext::new(
                file_location.clone(),
                asm_options.unwrap_or_default(),
                ids_init.unwrap_or_default(),
            )),
        };

        let lib: Rc<dyn LibraryProvider> =
            library_provider.unwrap_or_else(|| Rc::new(EmptyLibraryProvider));

        tracing::debug!(
            file = %file_location,
            opencode = parsing_opencode,
            member = ?library_data.map(|l| l.member),
            "analysis starting"
        );

        // Run the preprocessor chain up front; the open-code provider reads
        // its output.
        let mut analyzer = Self {
            ctx: ctx.clone(),
            mgr: ProcessingManager::new(
                ctx.0.clone(),
                Document::default(),
                file_location.clone(),
                collect_highlighting,
                owns_closeout,
            ),
            lib,
            vf_monitor,
            vf_handles: Vec::new(),
            vf_counter: 0,
            fade: Vec::new(),
            collect_fade: fade_messages,
            preprocessor_statements: Vec::new(),
            diags: Vec::new(),
            file_location: file_location.clone(),
        };

        let mut doc = Document::from_text(text);
        if !preprocessor_args.is_empty() {
            let mut chain = build_chain(&preprocessor_args);
            let lib = analyzer.lib.clone();
            let mut fetcher = |name: &str| lib.get_library(name);
            let mut prep_diags = Vec::new();
            doc = run_chain(&mut chain, doc, &mut fetcher, &mut prep_diags);
            for d in prep_diags {
                analyzer
                    .diags
                    .push(d.with_resource(file_location.clone()));
            }
            for p in chain.iter_mut() {
                analyzer
                    .preprocessor_statements
                    .append(&mut p.take_statements());
                if analyzer.collect_fade {
                    for mut f in p.take_fade() {
                        f.resource = file_location.clone();
                        analyzer.fade.push(f);
                    }
                }
            }
            analyzer.announce_virtual_file(&doc);
        }

        analyzer.mgr = ProcessingManager::new(
            ctx.0.clone(),
            doc,
            file_location,
            collect_highlighting,
            owns_closeout,
        );
        Ok(analyzer)
    }

    fn announce_virtual_file(&mut self, doc: &Document) {
        let handle = VirtualFileHandle(self.vf_counter);
        self.vf_counter += 1;
        let location = ResourceLocation::new(format!(
            "hlasm://preprocessed/{}/{}",
            handle.0,
            self.file_location.filename()
        ));
        if let Some(monitor) = &self.vf_monitor {
            monitor.file_generated(handle, &location, &doc.text());
        }
        self.vf_handles.push((handle, location));
    }

    // -- driving ------------------------------------------------------------

    /// Run to completion, resolving library fetches synchronously through
    /// the provider.
    pub fn analyze(&mut self) {
        loop {
            match self.step() {
                StepResult::Done => break,
                StepResult::Continue => {}
                StepResult::AwaitLibrary(req) => self.complete_fetch(req),
            }
        }
    }

    /// One cooperative tick.
    pub fn step(&mut self) -> StepResult {
        self.mgr.step()
    }

    /// Resolve a suspended fetch through the provider.
    pub fn complete_fetch(&mut self, req: FetchRequest) {
        match req.kind {
            ProcessingKind::Copy => {
                let member = self.lib.get_library(&req.name);
                self.mgr.supply_copy(&req, member);
            }
            _ => {
                let ok = self.lib.has_library(&req.name)
                    && self.lib.parse_library(
                        &req.name,
                        self.ctx.clone(),
                        LibraryData {
                            kind: ProcessingKind::MacroDef,
                            member: req.member,
                        },
                    );
                self.mgr.supply_macro(&req, ok);
            }
        }
    }

    /// Supply a COPY member directly (hosts driving `step` themselves).
    pub fn supply_copy(&mut self, req: &FetchRequest, member: Option<crate::library::LibraryMember>) {
        self.mgr.supply_copy(req, member);
    }

    /// Report a macro auto-include attempt's outcome.
    pub fn supply_macro(&mut self, req: &FetchRequest, succeeded: bool) {
        self.mgr.supply_macro(req, succeeded);
    }

    // -- outputs ------------------------------------------------------------

    /// Drain the diagnostics collected so far (preprocessors first, then
    /// the pipeline, in order).
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        let mut out = std::mem::take(&mut self.diags);
        out.append(&mut self.mgr.take_diags());
        out
    }

    /// The semantic tokens, sorted by position (one-shot).
    pub fn take_semantic_tokens(&mut self) -> Vec<TokenInfo> {
        self.mgr.tokens.finish()
    }

    /// Virtual-file handles produced by the preprocessors (transferred).
    pub fn take_vf_handles(&mut self) -> Vec<(VirtualFileHandle, ResourceLocation)> {
        std::mem::take(&mut self.vf_handles)
    }

    /// Fade messages for replaced regions (when enabled).
    pub fn take_fade_messages(&mut self) -> Vec<FadeMessage> {
        std::mem::take(&mut self.fade)
    }

    /// Synthetic statements the preprocessors generated.
    pub fn preprocessor_statements(&self) -> &[PreprocessorStatement] {
        &self.preprocessor_statements
    }

    /// The LSP occurrence index.
    pub fn lsp_index(&self) -> &LspIndex {
        &self.mgr.lsp
    }

    /// The shared context, for reentrant invocations.
    pub fn context(&self) -> AnalyzingContext {
        self.ctx.clone()
    }

    /// Metrics of this analysis.
    pub fn metrics(&self) -> Metrics {
        self.ctx.0.borrow().metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlasm_lang_core::Severity;

    fn analyze(text: &str) -> (Vec<Diagnostic>, Analyzer) {
        let mut a = Analyzer::new(text, AnalyzerOptions::new()).unwrap();
        a.analyze();
        let d = a.take_diagnostics();
        (d, a)
    }

    #[test]
    fn test_empty_source() {
        let (diags, a) = analyze("");
        assert!(diags.is_empty());
        assert_eq!(a.metrics().statements, 0);
    }

    #[test]
    fn test_simple_assembly() {
        let (diags, a) = analyze(
            "MAIN     CSECT\n         LR    1,2\nTEN      EQU   10\n         END\n",
        );
        assert!(diags.is_empty(), "unexpected: {diags:?}");
        let m = a.metrics();
        assert_eq!(m.statements, 4);
        assert!(m.defined_symbols >= 2);
    }

    #[test]
    fn test_duplicate_symbol() {
        let (diags, _) = analyze("A        EQU   1\nA        EQU   2\n");
        assert_eq!(diags.iter().filter(|d| d.code == "E031").count(), 1);
    }

    #[test]
    fn test_mnote_warning() {
        let (diags, _) = analyze("         MNOTE 4,'test message'\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "MNOTE");
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].message, "test message");
    }

    #[test]
    fn test_macro_definition_and_call() {
        let src = "\
         MACRO
&L       DOUBLE &X
&L       EQU   &X+&X
         MEND
RESULT   DOUBLE 21
         END
";
        let (diags, a) = analyze(src);
        assert!(diags.is_empty(), "unexpected: {diags:?}");
        let ctx = a.context();
        let ctx = ctx.0.borrow();
        let result = ctx.ids.find("RESULT").unwrap();
        assert_eq!(ctx.ord.get_symbol(result).unwrap().value.abs(), Some(42));
        assert_eq!(ctx.metrics.macro_definitions, 1);
    }

    #[test]
    fn test_conditional_loop() {
        let src = "\
&I       SETA  0
.LOOP    ANOP
&I       SETA  &I+1
         AIF   (&I LT 3).LOOP
TOTAL    EQU   &I
         END
";
        let (diags, a) = analyze(src);
        assert!(diags.is_empty(), "unexpected: {diags:?}");
        let ctx = a.context();
        let ctx = ctx.0.borrow();
        let total = ctx.ids.find("TOTAL").unwrap();
        assert_eq!(ctx.ord.get_symbol(total).unwrap().value.abs(), Some(3));
    }

    #[test]
    fn test_unknown_opcode_is_e049() {
        let (diags, _) = analyze("         NOSUCH 1,2\n");
        assert_eq!(diags.iter().filter(|d| d.code == "E049").count(), 1);
    }

    #[test]
    fn test_semantic_tokens_collected_when_enabled() {
        let mut a = Analyzer::new(
            "LABEL    LR    1,2       REMARK\n",
            AnalyzerOptions::new().with_highlighting(true),
        )
        .unwrap();
        a.analyze();
        let tokens = a.take_semantic_tokens();
        assert!(!tokens.is_empty());
    }

    #[test]
    fn test_tokens_empty_when_disabled() {
        let mut a = Analyzer::new("LABEL    LR    1,2\n", AnalyzerOptions::new()).unwrap();
        a.analyze();
        assert!(a.take_semantic_tokens().is_empty());
    }

    #[test]
    fn test_idempotent_diagnostics() {
        let src = "A        EQU   1\nA        EQU   2\n X'\n";
        let (d1, _) = analyze(src);
        let (d2, _) = analyze(src);
        assert_eq!(d1, d2);
    }
}
