//! Macro definitions and copy members.

use std::collections::HashMap;
use std::rc::Rc;

use hlasm_lang_core::{Id, Location, ResourceLocation};

/// One stored line of a macro body (continuations already merged).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLine {
    pub text: String,
    /// Zero-based line number in the defining document.
    pub lineno: usize,
}

/// A macro parameter from the prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroParam {
    pub name: Id,
    /// Keyword default; `None` for positional parameters.
    pub default: Option<String>,
}

/// A stored macro definition.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: Id,
    /// The name-field parameter (`&LABEL` before the macro name), if any.
    pub label_param: Option<Id>,
    /// Prototype parameters in order.
    pub params: Vec<MacroParam>,
    /// Body lines between the prototype and MEND.
    pub body: Vec<StoredLine>,
    /// Sequence symbols defined in the body, by body index.
    pub seq_symbols: HashMap<Id, usize>,
    pub location: Location,
}

impl MacroDef {
    /// Positional parameters in prototype order.
    pub fn positional(&self) -> impl Iterator<Item = &MacroParam> {
        self.params.iter().filter(|p| p.default.is_none())
    }

    pub fn find_param(&self, name: Id) -> Option<&MacroParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// An immutable, cached copy member.
#[derive(Debug, Clone)]
pub struct CopyMember {
    pub name: Id,
    pub lines: Vec<String>,
    pub location: ResourceLocation,
}

/// Storage for macro definitions and the copy-member cache.
#[derive(Debug, Default)]
pub struct MacroStorage {
    pub macros: HashMap<Id, Rc<MacroDef>>,
    pub copy_members: HashMap<Id, Rc<CopyMember>>,
}

impl MacroStorage {
    pub fn add_macro(&mut self, def: MacroDef) {
        self.macros.insert(def.name, Rc::new(def));
    }

    pub fn get_macro(&self, name: Id) -> Option<&Rc<MacroDef>> {
        self.macros.get(&name)
    }

    pub fn add_copy_member(&mut self, member: CopyMember) {
        self.copy_members.insert(member.name, Rc::new(member));
    }

    pub fn get_copy_member(&self, name: Id) -> Option<&Rc<CopyMember>> {
        self.copy_members.get(&name)
    }
}
