//! Symbol module - String interning for identifier handling.
//!
//! A [`Symbol`] is a compact 4-byte handle to a string stored in a global
//! table. Interning gives O(1) equality and hashing for the names that the
//! middle-end shuffles around constantly: function names, mangled generic
//! instances, field names, operator method names.
//!
//! # Thread Safety
//!
//! The interner is fully thread-safe. Parallel build workers (one compilation
//! unit each) intern concurrently without blocking each other, thanks to
//! DashMap's sharded design.
//!
//! # Memory Model
//!
//! Interned strings are leaked to obtain `'static` lifetime. The table lives
//! for the whole process and strings are never removed, so this is a bounded,
//! deliberate leak.
//!
//! # Examples
//!
//! ```
//! use veldc_util::Symbol;
//!
//! let a = Symbol::intern("counter");
//! let b = Symbol::intern("counter");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "counter");
//! ```

mod interner;

pub use interner::STRING_TABLE;

use std::fmt;

/// An interned string identifier.
///
/// Exactly 4 bytes; comparison and hashing are integer operations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    /// Index into the global string table.
    index: u32,
}

impl Symbol {
    /// Intern a string, returning its symbol.
    ///
    /// Returns the existing symbol if the string was interned before.
    pub fn intern(string: &str) -> Self {
        STRING_TABLE.intern(string)
    }

    /// Get the string value associated with this symbol.
    ///
    /// # Panics
    ///
    /// Panics if the symbol was not produced by [`Symbol::intern`].
    pub fn as_str(&self) -> &'static str {
        STRING_TABLE
            .get(*self)
            .expect("symbol index not present in string table")
    }

    /// Returns true for symbols pre-interned at startup (operator method
    /// names, attribute names, protocol names).
    pub fn is_known(&self) -> bool {
        (self.index as usize) < interner::KNOWN_SYMBOLS.len()
    }

    /// Get the raw index value.
    pub fn as_u32(&self) -> u32 {
        self.index
    }

    pub(crate) fn from_index(index: u32) -> Self {
        Self { index }
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Symbol::intern("")
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics about the string interner for profiling.
#[derive(Clone, Copy, Debug, Default)]
pub struct InternerStats {
    /// Number of interned strings
    pub count: usize,
    /// Number of cache hits (string already interned)
    pub hits: usize,
    /// Number of cache misses (new string allocation)
    pub misses: usize,
}

impl InternerStats {
    /// Fraction of intern calls that hit an existing entry.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_symbol() {
        let a = Symbol::intern("hello");
        let b = Symbol::intern("hello");
        let c = Symbol::intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn as_str_round_trips() {
        let s = Symbol::intern("Vec__I32");
        assert_eq!(s.as_str(), "Vec__I32");
    }

    #[test]
    fn known_symbols_are_flagged() {
        assert!(Symbol::intern("add").is_known());
        assert!(!Symbol::intern("definitely_not_a_keyword_xyz").is_known());
    }

    #[test]
    fn concurrent_interning() {
        let handles: Vec<_> = (0..4)
            .map(|i| std::thread::spawn(move || Symbol::intern(&format!("thread_{i}"))))
            .collect();
        let symbols: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (i, sym) in symbols.iter().enumerate() {
            assert_eq!(sym.as_str(), format!("thread_{i}"));
        }
    }
}
