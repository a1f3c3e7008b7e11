//! Dead method elimination.
//!
//! Method-level reachability over the class hierarchy: direct calls follow
//! their edge; a virtual call on class `C` marks the method on `C` and on
//! every transitive subclass as reachable. Methods (functions named
//! `{Class}_{method}` for a hierarchy class) that stay unmarked are
//! deleted; free functions are the dead-function pass's business.

use veldc_sem::Type;
use veldc_util::{FxHashSet, Symbol};

use crate::mir::{FnAttr, InstKind, Module};
use crate::pass::MirPass;
use crate::passes::devirtualization::ClassHierarchy;

pub struct DeadMethodElimination {
    hierarchy: ClassHierarchy,
}

impl DeadMethodElimination {
    pub fn new(hierarchy: ClassHierarchy) -> Self {
        Self { hierarchy }
    }

    /// `Circle_area` is a method iff `Circle` is a hierarchy class.
    fn method_owner(&self, func_name: Symbol) -> Option<Symbol> {
        let name = func_name.as_str();
        let mut split = name.len();
        while let Some(pos) = name[..split].rfind('_') {
            let class = &name[..pos];
            if self.hierarchy.contains(Symbol::intern(class)) {
                return Some(Symbol::intern(class));
            }
            split = pos;
        }
        None
    }
}

impl MirPass for DeadMethodElimination {
    fn name(&self) -> &'static str {
        "dead-method-elimination"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        if self.hierarchy.is_empty() {
            return false;
        }

        // Roots: everything that is not a method, plus attributed entry
        // points.
        let mut reachable: FxHashSet<Symbol> = FxHashSet::default();
        let mut worklist: Vec<Symbol> = Vec::new();
        for func in &module.functions {
            let is_method = self.method_owner(func.name).is_some();
            let is_root = !is_method
                || func.name.as_str() == "main"
                || func.has_attr(FnAttr::Export)
                || func.has_attr(FnAttr::Test)
                || func.has_attr(FnAttr::Bench)
                || func.has_attr(FnAttr::Fuzz);
            if is_root {
                worklist.push(func.name);
            }
        }

        while let Some(name) = worklist.pop() {
            if !reachable.insert(name) {
                continue;
            }
            let Some(func) = module.function(name) else {
                continue;
            };
            for block in &func.blocks {
                for inst in &block.instructions {
                    match &inst.kind {
                        InstKind::Call { callee, .. } => {
                            if !reachable.contains(callee) {
                                worklist.push(*callee);
                            }
                        }
                        InstKind::MethodCall {
                            receiver_ty,
                            method,
                            ..
                        } => {
                            // Every possible runtime target is reachable.
                            let Some(class) = named_class(receiver_ty) else {
                                continue;
                            };
                            for candidate in self.hierarchy.family_of(class) {
                                let target = Symbol::intern(&format!(
                                    "{}_{}",
                                    candidate.as_str(),
                                    method.as_str()
                                ));
                                if !reachable.contains(&target) {
                                    worklist.push(target);
                                }
                            }
                        }
                        InstKind::ClosureInit { function, .. } => {
                            if !reachable.contains(function) {
                                worklist.push(*function);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let before = module.functions.len();
        module.functions.retain(|f| reachable.contains(&f.name));
        module.functions.len() != before
    }
}

fn named_class(ty: &Type) -> Option<Symbol> {
    match ty {
        Type::Named { name, .. } => Some(*name),
        Type::Ref(inner, _) | Type::Ptr(inner) => named_class(inner),
        _ => None,
    }
}
