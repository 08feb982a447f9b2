//! Identifier interning.
//!
//! HLASM identifiers are case-insensitive, 1-63 characters, starting with a
//! letter or one of `@#$_`, continuing with letters, digits and `@#$_`.
//! Every name is folded to upper case and interned once; the rest of the
//! analyzer passes small [`Id`] handles around instead of strings.

use std::collections::HashMap;
use std::fmt;

/// An interned identifier handle.
///
/// Two `Id`s are equal iff their case-folded names are equal within the same
/// [`IdPool`]. [`Id::EMPTY`] is distinguished and compares equal only to
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u32);

impl Id {
    /// The empty identifier — no label, no name.
    pub const EMPTY: Id = Id(0);

    /// Whether this is the empty identifier.
    pub fn is_empty(self) -> bool {
        self == Id::EMPTY
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::EMPTY
    }
}

/// The identifier pool of one assembly.
#[derive(Debug, Clone)]
pub struct IdPool {
    names: Vec<String>,
    index: HashMap<String, Id>,
}

impl Default for IdPool {
    fn default() -> Self {
        let mut pool = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };
        // Slot 0 is reserved for Id::EMPTY.
        pool.names.push(String::new());
        pool.index.insert(String::new(), Id::EMPTY);
        pool
    }
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, folding it to upper case. Empty input yields
    /// [`Id::EMPTY`].
    pub fn intern(&mut self, name: &str) -> Id {
        if name.is_empty() {
            return Id::EMPTY;
        }
        let folded = name.to_uppercase();
        if let Some(&id) = self.index.get(&folded) {
            return id;
        }
        let id = Id(self.names.len() as u32);
        self.names.push(folded.clone());
        self.index.insert(folded, id);
        id
    }

    /// Look up an already-interned name without inserting.
    pub fn find(&self, name: &str) -> Option<Id> {
        self.index.get(&name.to_uppercase()).copied()
    }

    /// The interned (upper-cased) text of an id.
    pub fn text(&self, id: Id) -> &str {
        &self.names[id.0 as usize]
    }

    /// Number of interned names, the empty identifier included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }

    /// Validate an ordinary-symbol name: 1-63 chars, letters `A-Z`, `@#$_`
    /// and digits, not starting with a digit.
    pub fn is_valid_name(name: &str) -> bool {
        if name.is_empty() || name.len() > 63 {
            return false;
        }
        let mut chars = name.chars();
        let first = chars.next().unwrap();
        if !(first.is_ascii_alphabetic() || matches!(first, '@' | '#' | '$' | '_')) {
            return false;
        }
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '#' | '$' | '_'))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_case_folds() {
        let mut pool = IdPool::new();
        let a = pool.intern("label");
        let b = pool.intern("LABEL");
        let c = pool.intern("Label");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(pool.text(a), "LABEL");
    }

    #[test]
    fn test_distinct_names_distinct_ids() {
        let mut pool = IdPool::new();
        assert_ne!(pool.intern("A"), pool.intern("B"));
    }

    #[test]
    fn test_empty_id() {
        let mut pool = IdPool::new();
        assert_eq!(pool.intern(""), Id::EMPTY);
        assert!(Id::EMPTY.is_empty());
        assert_ne!(pool.intern("X"), Id::EMPTY);
    }

    #[test]
    fn test_find_does_not_insert() {
        let mut pool = IdPool::new();
        assert_eq!(pool.find("NOPE"), None);
        let id = pool.intern("nope");
        assert_eq!(pool.find("NoPe"), Some(id));
    }

    #[test]
    fn test_valid_names() {
        assert!(IdPool::is_valid_name("A"));
        assert!(IdPool::is_valid_name("@SYS1"));
        assert!(IdPool::is_valid_name("#X_9$"));
        assert!(!IdPool::is_valid_name(""));
        assert!(!IdPool::is_valid_name("9A"));
        assert!(!IdPool::is_valid_name("A-B"));
        assert!(!IdPool::is_valid_name(&"X".repeat(64)));
    }
}
