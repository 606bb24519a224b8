//! Atoms: small interned-string handles, per spec §3/§4.1.
//!
//! `Atom(0)` always denotes "none". Atoms are immutable and append-only for
//! the lifetime of the owning context, so comparison is just handle
//! equality and lookups from multiple threads are safe once a string has
//! been interned (the table itself still requires external
//! synchronization for writes, per spec §5).

use std::collections::HashMap;
use std::fmt;

/// A 32-bit interned-string handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    /// The atom denoting "no value".
    pub const NONE: Atom = Atom(0);

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Atom::NONE
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom#{}", self.0)
    }
}

/// The process/context-wide string interner. Strings are stored once in an
/// arena `Vec`; the map only ever grows.
#[derive(Debug, Default)]
pub struct AtomTable {
    by_string: HashMap<String, Atom>,
    strings: Vec<String>,
}

impl AtomTable {
    pub fn new() -> Self {
        // index 0 is reserved for Atom::NONE and never resolves to a
        // string.
        AtomTable {
            by_string: HashMap::new(),
            strings: vec![String::new()],
        }
    }

    /// Returns the atom for `s`, interning it if this is the first time it
    /// has been seen.
    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(&atom) = self.by_string.get(s) {
            return atom;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_owned());
        let atom = Atom(idx);
        self.by_string.insert(s.to_owned(), atom);
        atom
    }

    /// Returns the atom for `s` without interning; `Atom::NONE` if absent.
    pub fn lookup(&self, s: &str) -> Atom {
        self.by_string.get(s).copied().unwrap_or(Atom::NONE)
    }

    /// Resolves an atom back to its string, if any (`Atom::NONE` resolves
    /// to `None`).
    pub fn text(&self, atom: Atom) -> Option<&str> {
        if atom.is_none() {
            return None;
        }
        self.strings.get(atom.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_string_returns_same_atom() {
        let mut table = AtomTable::new();
        let a = table.intern("Shift");
        let b = table.intern("Shift");
        assert_eq!(a, b);
        assert_eq!(table.text(a), Some("Shift"));
    }

    #[test]
    fn different_strings_get_different_atoms() {
        let mut table = AtomTable::new();
        let a = table.intern("Shift");
        let b = table.intern("Control");
        assert_ne!(a, b);
    }

    #[test]
    fn lookup_of_absent_string_is_none() {
        let table = AtomTable::new();
        assert_eq!(table.lookup("nope"), Atom::NONE);
    }

    #[test]
    fn none_atom_has_no_text() {
        let table = AtomTable::new();
        assert_eq!(table.text(Atom::NONE), None);
    }
}
