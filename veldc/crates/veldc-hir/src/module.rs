//! HIR module - the lowered compilation unit.
//!
//! Declarations are stored in separate vectors by category so consumers can
//! iterate one kind without filtering. The module exclusively owns all of
//! its declarations, which transitively own their bodies.

use veldc_util::Symbol;

use crate::decl::{HirBehavior, HirConst, HirEnum, HirFunction, HirImpl, HirStruct};

/// A lowered compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HirModule {
    pub name: Symbol,
    pub source_path: String,
    pub structs: Vec<HirStruct>,
    pub enums: Vec<HirEnum>,
    pub behaviors: Vec<HirBehavior>,
    pub impls: Vec<HirImpl>,
    pub functions: Vec<HirFunction>,
    pub constants: Vec<HirConst>,
    pub imports: Vec<Symbol>,
}

impl HirModule {
    pub fn new(name: Symbol, source_path: impl Into<String>) -> Self {
        Self {
            name,
            source_path: source_path.into(),
            ..Default::default()
        }
    }

    /// Find a function by mangled name. O(n); callers that need repeated
    /// lookups should build their own index.
    pub fn function(&self, mangled_name: Symbol) -> Option<&HirFunction> {
        self.functions
            .iter()
            .find(|f| f.mangled_name == mangled_name)
    }

    /// Find a struct by mangled name.
    pub fn struct_def(&self, mangled_name: Symbol) -> Option<&HirStruct> {
        self.structs.iter().find(|s| s.mangled_name == mangled_name)
    }

    /// Find an enum by mangled name.
    pub fn enum_def(&self, mangled_name: Symbol) -> Option<&HirEnum> {
        self.enums.iter().find(|e| e.mangled_name == mangled_name)
    }

    /// Find a constant by name.
    pub fn constant(&self, name: Symbol) -> Option<&HirConst> {
        self.constants.iter().find(|c| c.name == name)
    }

    /// Total number of declarations across all categories.
    pub fn decl_count(&self) -> usize {
        self.structs.len()
            + self.enums.len()
            + self.behaviors.len()
            + self.impls.len()
            + self.functions.len()
            + self.constants.len()
    }
}
