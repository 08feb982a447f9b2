//! End-to-end analyzer scenarios.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use hlasm_analyzer::{
    Analyzer, AnalyzerOptions, AnalyzingContext, LibraryData, LibraryMember, LibraryProvider,
};
use hlasm_lang_core::{ResourceLocation, Severity};

/// A library backed by an in-memory map. Macro members reenter the
/// analyzer against the shared context, the way a workspace provider
/// would.
struct MapLibrary {
    members: HashMap<String, String>,
    fetches: RefCell<Vec<String>>,
}

impl MapLibrary {
    fn new(members: &[(&str, &str)]) -> Rc<Self> {
        Rc::new(Self {
            members: members
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fetches: RefCell::new(Vec::new()),
        })
    }
}

impl LibraryProvider for MapLibrary {
    fn has_library(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    fn get_library(&self, name: &str) -> Option<LibraryMember> {
        self.fetches.borrow_mut().push(name.to_string());
        Some(LibraryMember {
            text: self.members.get(name)?.clone(),
            location: ResourceLocation::new(format!("lib://{name}")),
        })
    }

    fn parse_library(&self, name: &str, ctx: AnalyzingContext, _data: LibraryData) -> bool {
        let Some(text) = self.members.get(name) else {
            return false;
        };
        let mut nested = Analyzer::new(
            text,
            AnalyzerOptions::new()
                .with_file_location(ResourceLocation::new(format!("lib://{name}")))
                .with_analyzing_context(ctx),
        )
        .expect("nested analyzer options are valid");
        nested.analyze();
        true
    }
}

fn analyze(text: &str) -> Vec<hlasm_lang_core::Diagnostic> {
    let mut a = Analyzer::new(text, AnalyzerOptions::new()).unwrap();
    a.analyze();
    a.take_diagnostics()
}

fn analyze_with(text: &str, lib: Rc<MapLibrary>) -> (Vec<hlasm_lang_core::Diagnostic>, Analyzer) {
    let mut a = Analyzer::new(
        text,
        AnalyzerOptions::new()
            .with_file_location(ResourceLocation::new("file:///open.hlasm"))
            .with_library_provider(lib),
    )
    .unwrap();
    a.analyze();
    let d = a.take_diagnostics();
    (d, a)
}

fn codes(diags: &[hlasm_lang_core::Diagnostic]) -> Vec<&str> {
    diags.iter().map(|d| d.code.as_str()).collect()
}

#[test]
fn org_with_complex_operand_reports_a115() {
    let diags = analyze("         ORG   *,complex(operand)\n");
    assert!(codes(&diags).contains(&"A115"), "got: {diags:?}");
    assert!(!codes(&diags).contains(&"A011"));
}

#[test]
fn mnote_level_four_is_one_warning() {
    let diags = analyze("         MNOTE 4,'test message'\n");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, "MNOTE");
    assert_eq!(diags[0].severity, Severity::Warning);
    assert_eq!(diags[0].message, "test message");
}

#[test]
fn mnote_oversized_message_is_a117() {
    let body = "X".repeat(1025);
    let diags = analyze(&format!("         MNOTE '{body}'\n"));
    assert!(codes(&diags).contains(&"A117"));
}

#[test]
fn duplicate_equ_reports_e031_and_keeps_first() {
    let src = "A        EQU   1\nA        EQU   2\n         END\n";
    let mut a = Analyzer::new(src, AnalyzerOptions::new()).unwrap();
    a.analyze();
    let diags = a.take_diagnostics();
    assert_eq!(codes(&diags), vec!["E031"]);
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    let sym = ctx.ids.find("A").unwrap();
    assert_eq!(ctx.ord.get_symbol(sym).unwrap().value.abs(), Some(1));
}

#[test]
fn start_after_csect_reports_e073() {
    let diags = analyze("         CSECT\nX        START 0\n");
    assert!(codes(&diags).contains(&"E073"));
}

#[test]
fn recursive_copy_reports_e062() {
    let lib = MapLibrary::new(&[("MEMBER", "         COPY  MEMBER\n")]);
    let (diags, _) = analyze_with("         COPY  MEMBER\n         END\n", lib);
    assert!(codes(&diags).contains(&"E062"), "got: {diags:?}");
}

#[test]
fn copy_member_symbols_enter_the_assembly() {
    let lib = MapLibrary::new(&[("DEFS", "FROMCOPY EQU   7\n")]);
    let (diags, a) =
        analyze_with("         COPY  DEFS\nUSE      EQU   FROMCOPY\n         END\n", lib.clone());
    assert!(diags.is_empty(), "unexpected: {diags:?}");
    // The member is fetched once and cached thereafter.
    assert_eq!(*lib.fetches.borrow(), vec!["DEFS".to_string()]);
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    let sym = ctx.ids.find("USE").unwrap();
    assert_eq!(ctx.ord.get_symbol(sym).unwrap().value.abs(), Some(7));
    assert_eq!(ctx.metrics.copy_expansions, 1);
}

#[test]
fn missing_copy_member_reports_e058() {
    let lib = MapLibrary::new(&[]);
    let mut a = Analyzer::new(
        "         COPY  ABSENT\n",
        AnalyzerOptions::new().with_library_provider(lib),
    )
    .unwrap();
    a.analyze();
    let diags = a.take_diagnostics();
    assert!(codes(&diags).contains(&"E058"));
}

#[test]
fn macro_auto_include_defines_and_expands() {
    let lib = MapLibrary::new(&[(
        "GENEQU",
        "         MACRO\n&L       GENEQU &V\n&L       EQU   &V\n         MEND\n",
    )]);
    let (diags, a) = analyze_with("ANSWER   GENEQU 42\n         END\n", lib);
    assert!(diags.is_empty(), "unexpected: {diags:?}");
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    let sym = ctx.ids.find("ANSWER").unwrap();
    assert_eq!(ctx.ord.get_symbol(sym).unwrap().value.abs(), Some(42));
}

#[test]
fn every_unresolved_node_surfaces_as_e033() {
    let diags = analyze("A        EQU   B+1\n         END\n");
    assert!(codes(&diags).contains(&"E033"), "got: {diags:?}");
}

#[test]
fn equ_cycle_reports_e033() {
    let diags = analyze("A        EQU   B\nB        EQU   A\n         END\n");
    assert!(codes(&diags).contains(&"E033"));
}

#[test]
fn sections_and_loctr_layout() {
    let src = "\
MAIN     CSECT
ONE      DC    F'1'
BUFS     LOCTR
BUF      DS    CL80
MAIN     LOCTR
TWO      DC    F'2'
         END
";
    let mut a = Analyzer::new(src, AnalyzerOptions::new()).unwrap();
    a.analyze();
    let diags = a.take_diagnostics();
    assert!(diags.is_empty(), "unexpected: {diags:?}");
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    // TWO continues the first counter right after ONE.
    let two = ctx.ids.find("TWO").unwrap();
    let addr = ctx.ord.get_symbol(two).unwrap().value.reloc().unwrap().clone();
    assert_eq!(addr.offset, 4);
}

#[test]
fn lookahead_resolves_forward_length_attribute() {
    let src = "\
&L       SETA  L'FIELD
LEN      EQU   &L
FIELD    DS    CL24
         END
";
    let mut a = Analyzer::new(src, AnalyzerOptions::new()).unwrap();
    a.analyze();
    let diags = a.take_diagnostics();
    assert!(diags.is_empty(), "unexpected: {diags:?}");
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    let len = ctx.ids.find("LEN").unwrap();
    assert_eq!(ctx.ord.get_symbol(len).unwrap().value.abs(), Some(24));
    assert!(ctx.metrics.lookahead_excursions >= 1);
}

#[test]
fn ago_forward_branch_skips_statements() {
    let src = "\
         AGO   .SKIP
BAD      EQU   1
.SKIP    ANOP
GOOD     EQU   2
         END
";
    let mut a = Analyzer::new(src, AnalyzerOptions::new()).unwrap();
    a.analyze();
    let diags = a.take_diagnostics();
    assert!(diags.is_empty(), "unexpected: {diags:?}");
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    assert!(ctx.ids.find("GOOD").map(|id| ctx.ord.get_symbol(id)).flatten().is_some());
    let bad = ctx.ids.find("BAD");
    assert!(bad.map_or(true, |id| ctx.ord.get_symbol(id).is_none()));
}

#[test]
fn actr_limit_aborts_with_w063() {
    let src = "\
         ACTR  5
.LOOP    ANOP
         AGO   .LOOP
         END
";
    let diags = analyze(src);
    assert!(codes(&diags).contains(&"W063"), "got: {diags:?}");
}

#[test]
fn ainsert_feeds_the_open_code_stream() {
    let src = "\
         AINSERT 'INS      EQU   5',BACK
         END
";
    // END terminates before the buffer drains; insert in front instead.
    let src_front = src.replace("BACK", "FRONT");
    let mut a = Analyzer::new(&src_front, AnalyzerOptions::new()).unwrap();
    a.analyze();
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    let ins = ctx.ids.find("INS").unwrap();
    assert_eq!(ctx.ord.get_symbol(ins).unwrap().value.abs(), Some(5));
}

#[test]
fn idempotent_analysis_yields_identical_diagnostics() {
    let src = "\
A        EQU   1
A        EQU   2
         MNOTE 8,'bad news'
         UNKNOWNOP 1
         END
";
    let d1 = analyze(src);
    let d2 = analyze(src);
    assert_eq!(d1, d2);
    assert!(!d1.is_empty());
}

#[test]
fn db2_preprocessor_include_and_fade() {
    use hlasm_analyzer::PreprocessorOptions;
    let lib = MapLibrary::new(&[("SQLDCL", "SQLROW   DS    CL100\n")]);
    let mut a = Analyzer::new(
        "         EXEC  SQL INCLUDE SQLDCL\nREF      EQU   L'SQLROW\n         END\n",
        AnalyzerOptions::new()
            .with_library_provider(lib)
            .with_preprocessors(vec![PreprocessorOptions::Db2 {
                version: "V13".into(),
            }])
            .with_fade_messages(true),
    )
    .unwrap();
    a.analyze();
    let diags = a.take_diagnostics();
    assert!(diags.is_empty(), "unexpected: {diags:?}");
    let ctx = a.context();
    let ctx = ctx.0.borrow();
    let r = ctx.ids.find("REF").unwrap();
    assert_eq!(ctx.ord.get_symbol(r).unwrap().value.abs(), Some(100));
    drop(ctx);
    assert_eq!(a.take_vf_handles().len(), 1);
}

#[test]
fn options_conflict_is_an_error() {
    let ctx = {
        let mut a = Analyzer::new("", AnalyzerOptions::new()).unwrap();
        a.analyze();
        a.context()
    };
    let result = Analyzer::new(
        "",
        AnalyzerOptions::new()
            .with_analyzing_context(ctx)
            .with_preprocessors(vec![hlasm_analyzer::PreprocessorOptions::Cics]),
    );
    assert!(result.is_err());
}
