//! Type environment - the query surface over the type checker's results.
//!
//! The checker populates one [`TypeEnv`] per compilation unit; the middle-end
//! reads it and never writes. Queries cover everything downstream
//! lowering needs: expression types, field and variant ordinals, method
//! tables, the
//! class hierarchy, destructor and copy status, and the iterator-protocol
//! names the for-loop desugaring uses.

use indexmap::IndexMap;
use veldc_util::{FxHashMap, FxHashSet, Symbol};

use crate::ast::AstId;
use crate::solver::ReceiverKind;
use crate::types::Type;

/// Struct definition: ordered fields with resolved types.
///
/// For generic structs the field types mention `Type::Param` and `generics`
/// lists the parameter names in declaration order.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: Symbol,
    pub generics: Vec<Symbol>,
    pub fields: Vec<(Symbol, Type)>,
}

impl StructDef {
    /// Zero-based ordinal of a field, by name.
    pub fn field_index(&self, field: Symbol) -> Option<u32> {
        self.fields
            .iter()
            .position(|(name, _)| *name == field)
            .map(|i| i as u32)
    }

    pub fn field_type(&self, field: Symbol) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, ty)| ty)
    }
}

/// Enum definition: ordered variants with payload types.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: Symbol,
    pub generics: Vec<Symbol>,
    pub variants: Vec<(Symbol, Vec<Type>)>,
}

impl EnumDef {
    /// Zero-based ordinal of a variant, by name.
    pub fn variant_index(&self, variant: Symbol) -> Option<u32> {
        self.variants
            .iter()
            .position(|(name, _)| *name == variant)
            .map(|i| i as u32)
    }
}

/// One method entry in the environment's method table.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// The type whose impl provides the method body.
    pub implementing_type: Symbol,
    /// The behavior the method implements, if any.
    pub behavior: Option<Symbol>,
    /// How the receiver was declared.
    pub receiver_kind: ReceiverKind,
    /// True when the call can be dispatched statically.
    pub is_static_dispatch: bool,
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Class-hierarchy facts for one class.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub base: Option<Symbol>,
    pub interfaces: Vec<Symbol>,
    pub is_sealed: bool,
    pub is_abstract: bool,
    /// Methods that may not be overridden further down the hierarchy.
    pub final_methods: FxHashSet<Symbol>,
}

/// Names used by the for-loop desugaring, supplied here so no surface-
/// language spelling leaks into the IR.
#[derive(Debug, Clone)]
pub struct IteratorProtocol {
    pub iter_method: Symbol,
    pub next_method: Symbol,
    /// The option-like enum `next` returns. Variant 0 carries the item,
    /// variant 1 is empty.
    pub option_enum: Symbol,
}

impl Default for IteratorProtocol {
    fn default() -> Self {
        Self {
            iter_method: Symbol::intern("iter"),
            next_method: Symbol::intern("next"),
            option_enum: Symbol::intern("Option"),
        }
    }
}

/// The populated type environment for one compilation unit.
#[derive(Default)]
pub struct TypeEnv {
    expr_types: FxHashMap<AstId, Type>,
    structs: IndexMap<Symbol, StructDef>,
    enums: IndexMap<Symbol, EnumDef>,
    methods: FxHashMap<(Symbol, Symbol), Vec<MethodInfo>>,
    classes: IndexMap<Symbol, ClassInfo>,
    drop_impls: FxHashSet<Symbol>,
    copy_types: FxHashSet<Symbol>,
    iterator_protocol: IteratorProtocol,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Population (called by the upstream checker, or by tests)
    // ------------------------------------------------------------------

    pub fn set_expr_type(&mut self, id: AstId, ty: Type) {
        self.expr_types.insert(id, ty);
    }

    pub fn register_struct(&mut self, def: StructDef) {
        self.structs.insert(def.name, def);
    }

    pub fn register_enum(&mut self, def: EnumDef) {
        self.enums.insert(def.name, def);
    }

    pub fn register_method(&mut self, on_type: Symbol, method: Symbol, info: MethodInfo) {
        self.methods.entry((on_type, method)).or_default().push(info);
    }

    pub fn register_class(&mut self, name: Symbol, info: ClassInfo) {
        self.classes.insert(name, info);
    }

    pub fn mark_has_drop(&mut self, name: Symbol) {
        self.drop_impls.insert(name);
    }

    pub fn mark_copy(&mut self, name: Symbol) {
        self.copy_types.insert(name);
    }

    pub fn set_iterator_protocol(&mut self, protocol: IteratorProtocol) {
        self.iterator_protocol = protocol;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Resolved type of an AST expression, if the checker recorded one.
    pub fn expr_type(&self, id: AstId) -> Option<&Type> {
        self.expr_types.get(&id)
    }

    pub fn struct_def(&self, name: Symbol) -> Option<&StructDef> {
        self.structs.get(&name)
    }

    pub fn enum_def(&self, name: Symbol) -> Option<&EnumDef> {
        self.enums.get(&name)
    }

    /// Zero-based field ordinal on a struct, by name.
    pub fn field_index(&self, struct_name: Symbol, field: Symbol) -> Option<u32> {
        self.structs.get(&struct_name)?.field_index(field)
    }

    /// Zero-based variant ordinal on an enum, by name.
    pub fn variant_index(&self, enum_name: Symbol, variant: Symbol) -> Option<u32> {
        self.enums.get(&enum_name)?.variant_index(variant)
    }

    /// All method candidates for `on_type.method`, not following the base
    /// chain.
    pub fn methods_on(&self, on_type: Symbol, method: Symbol) -> &[MethodInfo] {
        self.methods
            .get(&(on_type, method))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Method candidates for `on_type.method`, walking up the base-class
    /// chain until any candidate is found.
    pub fn lookup_method(&self, on_type: Symbol, method: Symbol) -> &[MethodInfo] {
        let mut current = Some(on_type);
        while let Some(ty) = current {
            let found = self.methods_on(ty, method);
            if !found.is_empty() {
                return found;
            }
            current = self.classes.get(&ty).and_then(|c| c.base);
        }
        &[]
    }

    pub fn class_info(&self, name: Symbol) -> Option<&ClassInfo> {
        self.classes.get(&name)
    }

    /// Iterate over all classes in registration order.
    pub fn classes(&self) -> impl Iterator<Item = (Symbol, &ClassInfo)> {
        self.classes.iter().map(|(name, info)| (*name, info))
    }

    pub fn parent_class(&self, name: Symbol) -> Option<Symbol> {
        self.classes.get(&name)?.base
    }

    pub fn is_sealed(&self, name: Symbol) -> bool {
        self.classes.get(&name).is_some_and(|c| c.is_sealed)
    }

    pub fn is_final_method(&self, class: Symbol, method: Symbol) -> bool {
        self.classes
            .get(&class)
            .is_some_and(|c| c.final_methods.contains(&method))
    }

    /// Classes whose declared base is exactly `name`.
    pub fn direct_subclasses(&self, name: Symbol) -> Vec<Symbol> {
        self.classes
            .iter()
            .filter(|(_, info)| info.base == Some(name))
            .map(|(sub, _)| *sub)
            .collect()
    }

    /// Whether a named type carries a user-defined destructor.
    pub fn has_drop_impl(&self, name: Symbol) -> bool {
        self.drop_impls.contains(&name)
    }

    /// Whether dropping a value of this type can run any code.
    ///
    /// Primitives never do. Named types do if they (or, recursively, any
    /// field) carry a drop impl. Unknown named types are assumed droppable.
    pub fn needs_drop(&self, ty: &Type) -> bool {
        match ty {
            _ if ty.is_primitive() => false,
            Type::Ptr(_) | Type::Ref(_, _) | Type::Fn(_, _) | Type::Str => false,
            Type::Tuple(tys) => tys.iter().any(|t| self.needs_drop(t)),
            Type::Array(elem, _) | Type::Slice(elem) => self.needs_drop(elem),
            Type::Named { name, .. } => {
                if self.drop_impls.contains(name) {
                    return true;
                }
                match self.structs.get(name) {
                    Some(def) => def.fields.iter().any(|(_, fty)| self.needs_drop(fty)),
                    // Unknown types are kept droppable, conservatively.
                    None => !self.enums.contains_key(name),
                }
            }
            _ => true,
        }
    }

    /// Whether values of this type are copied rather than moved.
    pub fn is_copy(&self, ty: &Type) -> bool {
        match ty {
            _ if ty.is_primitive() => true,
            Type::Ref(_, false) | Type::Ptr(_) => true,
            Type::Tuple(tys) => tys.iter().all(|t| self.is_copy(t)),
            Type::Named { name, .. } => self.copy_types.contains(name),
            _ => false,
        }
    }

    pub fn iterator_protocol(&self) -> &IteratorProtocol {
        &self.iterator_protocol
    }
}
