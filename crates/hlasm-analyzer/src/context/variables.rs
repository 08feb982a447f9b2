//! SET-variable scopes, sequence symbols and branch counters.
//!
//! One scope exists for open code plus one per active macro frame. SET
//! variables hold arithmetic (i32), boolean, or character values (up to
//! 4096 bytes); subscripted variables are sparse integer-keyed maps.
//! Sequence symbols and the ACTR branch counter are per scope.

use std::collections::{BTreeMap, HashMap};

use hlasm_lang_core::Id;

/// Maximum length of a SETC value in bytes.
pub const SETC_MAX: usize = 4096;

/// Default ACTR branch budget per scope.
pub const ACTR_DEFAULT: i32 = 4096;

/// The kind of a SET variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Arithmetic,
    Boolean,
    Character,
}

/// A SET value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetValue {
    A(i32),
    B(bool),
    C(String),
}

impl SetValue {
    pub fn kind(&self) -> VarKind {
        match self {
            SetValue::A(_) => VarKind::Arithmetic,
            SetValue::B(_) => VarKind::Boolean,
            SetValue::C(_) => VarKind::Character,
        }
    }

    /// Render the value the way substitution does.
    pub fn to_text(&self) -> String {
        match self {
            SetValue::A(v) => v.to_string(),
            SetValue::B(b) => if *b { "1" } else { "0" }.to_string(),
            SetValue::C(s) => s.clone(),
        }
    }

    pub fn default_of(kind: VarKind) -> SetValue {
        match kind {
            VarKind::Arithmetic => SetValue::A(0),
            VarKind::Boolean => SetValue::B(false),
            VarKind::Character => SetValue::C(String::new()),
        }
    }
}

/// A SET variable: scalar or sparse-subscripted.
#[derive(Debug, Clone)]
pub struct SetVariable {
    pub kind: VarKind,
    pub global: bool,
    scalar: Option<SetValue>,
    subscripted: BTreeMap<i64, SetValue>,
}

impl SetVariable {
    pub fn new(kind: VarKind, global: bool) -> Self {
        Self {
            kind,
            global,
            scalar: None,
            subscripted: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, subscript: Option<i64>, mut value: SetValue) {
        if let SetValue::C(s) = &mut value {
            s.truncate(SETC_MAX);
        }
        match subscript {
            None => self.scalar = Some(value),
            Some(i) => {
                self.subscripted.insert(i, value);
            }
        }
    }

    pub fn get(&self, subscript: Option<i64>) -> SetValue {
        match subscript {
            None => self
                .scalar
                .clone()
                .unwrap_or_else(|| SetValue::default_of(self.kind)),
            Some(i) => self
                .subscripted
                .get(&i)
                .cloned()
                .unwrap_or_else(|| SetValue::default_of(self.kind)),
        }
    }

    /// N' — the highest subscript set, 0 for scalars.
    pub fn number_attr(&self) -> i32 {
        self.subscripted.keys().next_back().map_or(0, |&k| k as i32)
    }
}

/// A macro argument: its text plus any parenthesized sublist entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroArg {
    pub text: String,
    pub sublist: Vec<String>,
}

impl MacroArg {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sublist: Vec::new(),
        }
    }

    /// N' of a parameter: sublist entry count, 1 for plain non-empty
    /// values, 0 for omitted ones.
    pub fn number_attr(&self) -> i32 {
        if !self.sublist.is_empty() {
            self.sublist.len() as i32
        } else if self.text.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Frame data of an active macro invocation.
#[derive(Debug, Clone, Default)]
pub struct MacroFrame {
    pub name: Id,
    /// &SYSNDX value of this invocation.
    pub sysndx: u32,
    /// Named parameters (label parameter included) with substituted values.
    pub params: HashMap<Id, MacroArg>,
    /// &SYSLIST — positional arguments by number.
    pub syslist: Vec<MacroArg>,
}

/// One variable scope: open code, or one macro invocation.
#[derive(Debug)]
pub struct CodeScope {
    vars: HashMap<Id, SetVariable>,
    /// Names declared GBLx here, resolving to the global store.
    global_links: HashMap<Id, VarKind>,
    pub seq_symbols: HashMap<Id, usize>,
    /// Remaining conditional-assembly branches (ACTR).
    pub branch_budget: i32,
    pub macro_frame: Option<MacroFrame>,
}

impl CodeScope {
    fn new(macro_frame: Option<MacroFrame>) -> Self {
        Self {
            vars: HashMap::new(),
            global_links: HashMap::new(),
            seq_symbols: HashMap::new(),
            branch_budget: ACTR_DEFAULT,
            macro_frame,
        }
    }

    pub fn is_macro(&self) -> bool {
        self.macro_frame.is_some()
    }
}

/// The conditional-assembly variable context.
#[derive(Debug)]
pub struct ConditionalContext {
    globals: HashMap<Id, SetVariable>,
    scopes: Vec<CodeScope>,
}

impl Default for ConditionalContext {
    fn default() -> Self {
        Self {
            globals: HashMap::new(),
            scopes: vec![CodeScope::new(None)],
        }
    }
}

impl ConditionalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_scope(&self) -> &CodeScope {
        self.scopes.last().expect("open-code scope always exists")
    }

    pub fn current_scope_mut(&mut self) -> &mut CodeScope {
        self.scopes.last_mut().expect("open-code scope always exists")
    }

    /// Enter a macro invocation.
    pub fn push_scope(&mut self, frame: MacroFrame) {
        self.scopes.push(CodeScope::new(Some(frame)));
    }

    /// Leave a macro invocation. The open-code scope never pops.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn nesting_depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// LCLx: declare a local variable.
    pub fn declare_local(&mut self, name: Id, kind: VarKind) {
        self.current_scope_mut()
            .vars
            .entry(name)
            .or_insert_with(|| SetVariable::new(kind, false));
    }

    /// GBLx: declare (and link) a global variable.
    pub fn declare_global(&mut self, name: Id, kind: VarKind) {
        self.globals
            .entry(name)
            .or_insert_with(|| SetVariable::new(kind, true));
        self.current_scope_mut().global_links.insert(name, kind);
    }

    /// Look up a variable visible in the current scope.
    pub fn get_var(&self, name: Id) -> Option<&SetVariable> {
        let scope = self.current_scope();
        if scope.global_links.contains_key(&name) {
            return self.globals.get(&name);
        }
        scope.vars.get(&name)
    }

    /// Assign through SETx, creating an undeclared local implicitly.
    pub fn set_var(&mut self, name: Id, subscript: Option<i64>, value: SetValue) {
        let kind = value.kind();
        if self.current_scope().global_links.contains_key(&name) {
            self.globals
                .entry(name)
                .or_insert_with(|| SetVariable::new(kind, true))
                .set(subscript, value);
            return;
        }
        self.current_scope_mut()
            .vars
            .entry(name)
            .or_insert_with(|| SetVariable::new(kind, false))
            .set(subscript, value);
    }

    /// The macro frame of the current scope, if inside a macro.
    pub fn macro_frame(&self) -> Option<&MacroFrame> {
        self.current_scope().macro_frame.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(pool: &mut hlasm_lang_core::IdPool, s: &str) -> Id {
        pool.intern(s)
    }

    #[test]
    fn test_local_set_and_get() {
        let mut pool = hlasm_lang_core::IdPool::new();
        let mut ctx = ConditionalContext::new();
        let a = id(&mut pool, "A");
        ctx.set_var(a, None, SetValue::A(42));
        assert_eq!(ctx.get_var(a).unwrap().get(None), SetValue::A(42));
    }

    #[test]
    fn test_subscripted_sparse() {
        let mut pool = hlasm_lang_core::IdPool::new();
        let mut ctx = ConditionalContext::new();
        let t = id(&mut pool, "TAB");
        ctx.set_var(t, Some(100), SetValue::A(7));
        let var = ctx.get_var(t).unwrap();
        assert_eq!(var.get(Some(100)), SetValue::A(7));
        assert_eq!(var.get(Some(1)), SetValue::A(0));
        assert_eq!(var.number_attr(), 100);
    }

    #[test]
    fn test_locals_do_not_leak_across_scopes() {
        let mut pool = hlasm_lang_core::IdPool::new();
        let mut ctx = ConditionalContext::new();
        let a = id(&mut pool, "A");
        ctx.set_var(a, None, SetValue::A(1));
        ctx.push_scope(MacroFrame::default());
        assert!(ctx.get_var(a).is_none());
        ctx.pop_scope();
        assert!(ctx.get_var(a).is_some());
    }

    #[test]
    fn test_globals_shared_when_declared() {
        let mut pool = hlasm_lang_core::IdPool::new();
        let mut ctx = ConditionalContext::new();
        let g = id(&mut pool, "G");
        ctx.declare_global(g, VarKind::Arithmetic);
        ctx.set_var(g, None, SetValue::A(5));
        ctx.push_scope(MacroFrame::default());
        // Not visible until declared in this scope.
        assert!(ctx.get_var(g).is_none());
        ctx.declare_global(g, VarKind::Arithmetic);
        assert_eq!(ctx.get_var(g).unwrap().get(None), SetValue::A(5));
        ctx.pop_scope();
    }

    #[test]
    fn test_setc_truncated() {
        let mut var = SetVariable::new(VarKind::Character, false);
        var.set(None, SetValue::C("X".repeat(SETC_MAX + 10)));
        match var.get(None) {
            SetValue::C(s) => assert_eq!(s.len(), SETC_MAX),
            other => panic!("expected C value, got {other:?}"),
        }
    }

    #[test]
    fn test_open_code_scope_never_pops() {
        let mut ctx = ConditionalContext::new();
        ctx.pop_scope();
        assert_eq!(ctx.nesting_depth(), 0);
        ctx.current_scope(); // must not panic
    }

    #[test]
    fn test_macro_arg_number_attr() {
        assert_eq!(MacroArg::plain("").number_attr(), 0);
        assert_eq!(MacroArg::plain("X").number_attr(), 1);
        let arg = MacroArg {
            text: "(A,B,C)".into(),
            sublist: vec!["A".into(), "B".into(), "C".into()],
        };
        assert_eq!(arg.number_attr(), 3);
    }
}
