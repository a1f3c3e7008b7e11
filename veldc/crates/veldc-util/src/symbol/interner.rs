//! String interner implementation using DashMap for concurrent access.

use ahash::AHasher;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::LazyLock;

use super::{InternerStats, Symbol};

/// Symbols pre-interned at startup so they get stable low indices.
///
/// The list covers the names the middle-end itself synthesizes: operator
/// method names for operator-overloading desugaring, attribute names, the
/// iterator protocol, and the handful of well-known functions the OOP passes
/// look for.
pub(crate) const KNOWN_SYMBOLS: &[&str] = &[
    // Operator behavior methods
    "add", "sub", "mul", "div", "rem", "eq", "ne", "lt", "le", "gt", "ge", "and", "or", "bitand",
    "bitor", "bitxor", "shl", "shr", "neg", "not",
    // Iterator protocol
    "iter", "next",
    // Function attributes
    "inline", "noinline", "always_inline", "export", "test", "bench", "fuzz", "extern",
    // Well-known functions and methods
    "main", "drop", "reset", "build", "len", "new",
];

/// Global string table instance.
///
/// Initialized on first use via `LazyLock`, with all known symbols interned
/// up front.
pub static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| {
    let table = StringTable::new();
    for known in KNOWN_SYMBOLS {
        table.intern(known);
    }
    table
});

/// Thread-safe string table.
///
/// Strings are leaked to get `'static` references; the table lives for the
/// whole process and entries are never removed.
pub struct StringTable {
    /// Maps string hash to (string, symbol index).
    map: DashMap<u64, Vec<(&'static str, u32)>>,
    /// Reverse lookup from symbol index to string.
    strings: DashMap<u32, &'static str>,
    /// Counter for the next index.
    next_index: AtomicU32,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl StringTable {
    fn new() -> Self {
        Self {
            map: DashMap::new(),
            strings: DashMap::new(),
            next_index: AtomicU32::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Intern a string, returning its symbol.
    pub fn intern(&self, string: &str) -> Symbol {
        let hash = hash_str(string);

        if let Some(bucket) = self.map.get(&hash) {
            for (existing, index) in bucket.iter() {
                if *existing == string {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Symbol::from_index(*index);
                }
            }
        }

        // Slow path: allocate under the bucket's entry lock so two racing
        // interns of the same string agree on one index.
        let mut bucket = self.map.entry(hash).or_default();
        for (existing, index) in bucket.iter() {
            if *existing == string {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Symbol::from_index(*index);
            }
        }

        let interned: &'static str = Box::leak(string.to_string().into_boxed_str());
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        if index == u32::MAX {
            panic!("symbol table overflow");
        }
        bucket.push((interned, index));
        self.strings.insert(index, interned);
        self.misses.fetch_add(1, Ordering::Relaxed);
        Symbol::from_index(index)
    }

    /// Get the string for a symbol.
    pub fn get(&self, symbol: Symbol) -> Option<&'static str> {
        self.strings.get(&symbol.as_u32()).map(|s| *s)
    }

    /// Snapshot of the interner statistics.
    pub fn stats(&self) -> InternerStats {
        InternerStats {
            count: self.next_index.load(Ordering::Relaxed) as usize,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn hash_str(string: &str) -> u64 {
    let mut hasher = AHasher::default();
    string.hash(&mut hasher);
    hasher.finish()
}
