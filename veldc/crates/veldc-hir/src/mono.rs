//! Monomorphization cache.
//!
//! Tracks which generic instantiations exist and what they are called. The
//! mangling key is the textual form `"Base[Arg1,Arg2,...]"`; the mangled
//! name is `"Base__Arg1_Arg2"` with nested generics flattened by
//! concatenation, so `Vec[Vec[I32]]` becomes `Vec__Vec__I32`.
//!
//! The cache is per-builder. Parallel build workers each carry their own;
//! it is never shared between threads.

use indexmap::IndexMap;
use veldc_sem::Type;
use veldc_util::Symbol;

/// Cache of monomorphized type and function names.
#[derive(Debug, Default)]
pub struct MonomorphizationCache {
    /// Mangling key to mangled name, for types.
    type_instances: IndexMap<String, Symbol>,
    /// Mangling key to mangled name, for functions.
    func_instances: IndexMap<String, Symbol>,
}

impl MonomorphizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical mangling key for an instantiation.
    pub fn key(base: Symbol, args: &[Type]) -> String {
        let mut key = String::from(base.as_str());
        key.push('[');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(&arg.to_string());
        }
        key.push(']');
        key
    }

    /// Whether a type instance exists for this key.
    pub fn has_type(&self, key: &str) -> bool {
        self.type_instances.contains_key(key)
    }

    /// Whether a function instance exists for this key.
    pub fn has_func(&self, key: &str) -> bool {
        self.func_instances.contains_key(key)
    }

    /// Get or create the mangled name for a type instantiation.
    ///
    /// Returns the name and whether it was freshly created (a fresh name
    /// means the caller must enqueue the instance for lowering).
    pub fn get_or_create_type(&mut self, base: Symbol, args: &[Type]) -> (Symbol, bool) {
        let key = Self::key(base, args);
        if let Some(existing) = self.type_instances.get(&key) {
            return (*existing, false);
        }
        let mangled = mangle_name(base, args);
        self.type_instances.insert(key, mangled);
        (mangled, true)
    }

    /// Get or create the mangled name for a function instantiation.
    pub fn get_or_create_func(&mut self, base: Symbol, args: &[Type]) -> (Symbol, bool) {
        let key = Self::key(base, args);
        if let Some(existing) = self.func_instances.get(&key) {
            return (*existing, false);
        }
        let mangled = mangle_name(base, args);
        self.func_instances.insert(key, mangled);
        (mangled, true)
    }

    /// Iterate (key, mangled name) pairs for types, in creation order.
    pub fn type_entries(&self) -> impl Iterator<Item = (&str, Symbol)> {
        self.type_instances.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Iterate (key, mangled name) pairs for functions, in creation order.
    pub fn func_entries(&self) -> impl Iterator<Item = (&str, Symbol)> {
        self.func_instances.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Mangle `Base` + args into `Base__Arg1_Arg2`.
///
/// Nested generic arguments are flattened: every `[`, `]`, and `,` in the
/// argument's display form collapses into the same separators the scheme
/// already uses, so the result stays a flat identifier.
fn mangle_name(base: Symbol, args: &[Type]) -> Symbol {
    let mut name = String::from(base.as_str());
    if !args.is_empty() {
        name.push_str("__");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                name.push('_');
            }
            name.push_str(&flatten(&arg.to_string()));
        }
    }
    Symbol::intern(&name)
}

fn flatten(display: &str) -> String {
    let mut out = String::with_capacity(display.len());
    let mut chars = display.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => out.push_str("__"),
            ']' => {}
            ',' => out.push('_'),
            ' ' => {}
            _ => out.push(c),
        }
        // `[I32; 4]` style arrays keep their count but drop punctuation.
        if c == ';' {
            out.pop();
            out.push('_');
            while chars.peek() == Some(&' ') {
                chars.next();
            }
        }
    }
    out
}
