//! Alias analysis.
//!
//! Classifies every pointer-typed SSA value by where its memory came from
//! and what constant offsets were applied along the way, then answers
//! pairwise aliasing queries. Passes use the answers to keep loads live
//! across stores (GVN, LICM) and to delete dead stores (LoadStoreOpt).
//!
//! Query rules, applied in order:
//!
//! 1. the same SSA value must alias itself
//! 2. distinct stack allocas, stack vs. global, and distinct heap
//!    allocations never alias
//! 3. pointers with the same ultimate base compare their constant offset
//!    paths: identical paths must alias, one path extending the other
//!    partially aliases, diverging paths do not alias (this is what makes
//!    the analysis field-sensitive)
//! 4. anything else may alias

use std::cell::Cell;

use veldc_sem::Type;
use veldc_util::{FxHashMap, Symbol};

use crate::mir::{Function, GepIndex, InstKind, ValueId};

/// Where a pointer's memory originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOrigin {
    Unknown,
    StackAlloca,
    GlobalVariable,
    HeapAlloc,
    FunctionArg,
    Gep,
    FieldAccess,
}

/// What the analysis knows about one pointer value.
#[derive(Debug, Clone)]
pub struct PointerInfo {
    pub origin: PointerOrigin,
    /// Origin class of the chain's ultimate base; GEPs inherit it.
    pub root_origin: PointerOrigin,
    /// The value that began the chain.
    pub base: ValueId,
    /// Constant offsets applied by GEPs along the chain; `None` once an
    /// unknown offset collapses the chain.
    pub offsets: Option<Vec<u64>>,
    pub pointee: Option<Type>,
    /// Present for completeness; the source language has no noalias marker.
    pub restrict: bool,
}

/// Result of an aliasing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    NoAlias,
    MayAlias,
    MustAlias,
    PartialAlias,
}

/// Query statistics, for diagnostics.
#[derive(Debug, Default, Clone)]
pub struct AliasStats {
    pub queries: u64,
    pub no_alias: u64,
    pub may_alias: u64,
    pub must_alias: u64,
    pub partial_alias: u64,
}

/// Per-function alias analysis.
pub struct AliasAnalysis {
    pointers: FxHashMap<ValueId, PointerInfo>,
    queries: Cell<u64>,
    no_alias: Cell<u64>,
    may_alias: Cell<u64>,
    must_alias: Cell<u64>,
    partial_alias: Cell<u64>,
}

/// Callee names that hand back fresh heap memory.
fn is_heap_allocator(callee: Symbol) -> bool {
    let name = callee.as_str();
    name == "veld_alloc" || name == "malloc" || name.ends_with("_new")
}

impl AliasAnalysis {
    /// Analyze one function.
    pub fn analyze(func: &Function) -> Self {
        let mut pointers: FxHashMap<ValueId, PointerInfo> = FxHashMap::default();

        for (param, ty) in &func.params {
            if ty.is_pointer_like() {
                pointers.insert(
                    *param,
                    PointerInfo {
                        origin: PointerOrigin::FunctionArg,
                        root_origin: PointerOrigin::FunctionArg,
                        base: *param,
                        offsets: Some(vec![]),
                        pointee: pointee_of(ty),
                        restrict: false,
                    },
                );
            }
        }

        // Blocks are walked in layout order; GEP chains reference earlier
        // definitions, so a second sweep picks up forward references
        // through phis conservatively (they stay Unknown).
        for block in &func.blocks {
            for inst in &block.instructions {
                if !inst.result.is_valid() {
                    continue;
                }
                match &inst.kind {
                    InstKind::Alloca { allocated_ty, .. } => {
                        pointers.insert(
                            inst.result,
                            PointerInfo {
                                origin: PointerOrigin::StackAlloca,
                                root_origin: PointerOrigin::StackAlloca,
                                base: inst.result,
                                offsets: Some(vec![]),
                                pointee: Some(allocated_ty.clone()),
                                restrict: false,
                            },
                        );
                    }
                    InstKind::Call { callee, .. } if is_heap_allocator(*callee) => {
                        pointers.insert(
                            inst.result,
                            PointerInfo {
                                origin: PointerOrigin::HeapAlloc,
                                root_origin: PointerOrigin::HeapAlloc,
                                base: inst.result,
                                offsets: Some(vec![]),
                                pointee: pointee_of(&inst.ty),
                                restrict: false,
                            },
                        );
                    }
                    InstKind::Gep { base, indices } => {
                        let parent = pointers.get(base).cloned();
                        let (ultimate, root_origin, parent_offsets) = match parent {
                            Some(info) => (info.base, info.root_origin, info.offsets),
                            None => (*base, PointerOrigin::Unknown, Some(vec![])),
                        };
                        let offsets = parent_offsets.and_then(|mut path| {
                            for index in indices {
                                match index {
                                    GepIndex::Const(c) => path.push(*c),
                                    GepIndex::Value(_) => return None,
                                }
                            }
                            Some(path)
                        });
                        let origin = if offsets.is_some() {
                            PointerOrigin::FieldAccess
                        } else {
                            PointerOrigin::Gep
                        };
                        pointers.insert(
                            inst.result,
                            PointerInfo {
                                origin,
                                root_origin,
                                base: ultimate,
                                offsets,
                                pointee: pointee_of(&inst.ty),
                                restrict: false,
                            },
                        );
                    }
                    _ if inst.ty.is_pointer_like() => {
                        pointers.insert(
                            inst.result,
                            PointerInfo {
                                origin: PointerOrigin::Unknown,
                                root_origin: PointerOrigin::Unknown,
                                base: inst.result,
                                offsets: None,
                                pointee: pointee_of(&inst.ty),
                                restrict: false,
                            },
                        );
                    }
                    _ => {}
                }
            }
        }

        Self {
            pointers,
            queries: Cell::new(0),
            no_alias: Cell::new(0),
            may_alias: Cell::new(0),
            must_alias: Cell::new(0),
            partial_alias: Cell::new(0),
        }
    }

    pub fn pointer_info(&self, value: ValueId) -> Option<&PointerInfo> {
        self.pointers.get(&value)
    }

    /// Pairwise aliasing query. Commutative; `alias(p, p)` is `MustAlias`.
    pub fn alias(&self, p1: ValueId, p2: ValueId) -> AliasResult {
        let result = self.alias_uncounted(p1, p2);
        self.queries.set(self.queries.get() + 1);
        let counter = match result {
            AliasResult::NoAlias => &self.no_alias,
            AliasResult::MayAlias => &self.may_alias,
            AliasResult::MustAlias => &self.must_alias,
            AliasResult::PartialAlias => &self.partial_alias,
        };
        counter.set(counter.get() + 1);
        result
    }

    fn alias_uncounted(&self, p1: ValueId, p2: ValueId) -> AliasResult {
        if p1 == p2 {
            return AliasResult::MustAlias;
        }

        let (Some(a), Some(b)) = (self.pointers.get(&p1), self.pointers.get(&p2)) else {
            return AliasResult::MayAlias;
        };

        // Distinct allocations cannot overlap.
        let distinct_roots = a.base != b.base;
        match (a.origin_root(), b.origin_root()) {
            (PointerOrigin::StackAlloca, PointerOrigin::StackAlloca) if distinct_roots => {
                return AliasResult::NoAlias;
            }
            (PointerOrigin::StackAlloca, PointerOrigin::GlobalVariable)
            | (PointerOrigin::GlobalVariable, PointerOrigin::StackAlloca) => {
                return AliasResult::NoAlias;
            }
            (PointerOrigin::HeapAlloc, PointerOrigin::HeapAlloc) if distinct_roots => {
                return AliasResult::NoAlias;
            }
            // A frame-local allocation is fresh memory: nothing that
            // existed before the frame (arguments, heap cells) can point
            // into it.
            (PointerOrigin::StackAlloca, PointerOrigin::FunctionArg)
            | (PointerOrigin::FunctionArg, PointerOrigin::StackAlloca)
            | (PointerOrigin::StackAlloca, PointerOrigin::HeapAlloc)
            | (PointerOrigin::HeapAlloc, PointerOrigin::StackAlloca) => {
                return AliasResult::NoAlias;
            }
            _ => {}
        }

        if a.base == b.base {
            if let (Some(pa), Some(pb)) = (&a.offsets, &b.offsets) {
                if pa == pb {
                    return AliasResult::MustAlias;
                }
                let shorter = pa.len().min(pb.len());
                if pa[..shorter] == pb[..shorter] {
                    // One access is a sub-object of the other.
                    return AliasResult::PartialAlias;
                }
                // Diverging constant paths reach disjoint fields.
                return AliasResult::NoAlias;
            }
        }

        AliasResult::MayAlias
    }

    /// Snapshot of the query counters.
    pub fn stats(&self) -> AliasStats {
        AliasStats {
            queries: self.queries.get(),
            no_alias: self.no_alias.get(),
            may_alias: self.may_alias.get(),
            must_alias: self.must_alias.get(),
            partial_alias: self.partial_alias.get(),
        }
    }
}

impl PointerInfo {
    /// Origin of the chain's ultimate base for the disjointness rules.
    fn origin_root(&self) -> PointerOrigin {
        self.root_origin
    }
}

fn pointee_of(ty: &Type) -> Option<Type> {
    match ty {
        Type::Ptr(inner) | Type::Ref(inner, _) => Some((**inner).clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use veldc_sem::Type;

    #[test]
    fn pointer_aliases_itself() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let p = b.alloca(Type::I32);
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(p, p), AliasResult::MustAlias);
    }

    #[test]
    fn distinct_allocas_do_not_alias() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let p1 = b.alloca(Type::I32);
        let p2 = b.alloca(Type::I32);
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(p1, p2), AliasResult::NoAlias);
        // Commutative.
        assert_eq!(aa.alias(p2, p1), AliasResult::NoAlias);
    }

    #[test]
    fn distinct_fields_of_one_base_do_not_alias() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let base = b.alloca(Type::Tuple(vec![Type::I32, Type::I32]));
        let f0 = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Const(0)],
            },
        );
        let f1 = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Const(1)],
            },
        );
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(f0, f1), AliasResult::NoAlias);
    }

    #[test]
    fn same_field_path_must_alias() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let base = b.alloca(Type::Tuple(vec![Type::I32, Type::I32]));
        let a = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Const(1)],
            },
        );
        let c = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Const(1)],
            },
        );
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(a, c), AliasResult::MustAlias);
    }

    #[test]
    fn sub_object_partially_aliases_parent() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let base = b.alloca(Type::Tuple(vec![Type::I32, Type::I32]));
        let field = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Const(0)],
            },
        );
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(base, field), AliasResult::PartialAlias);
    }

    #[test]
    fn unknown_offset_collapses_to_may_alias() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let base = b.alloca(Type::Array(Box::new(Type::I32), 8));
        let idx = b.const_i32(3);
        let dynamic = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Value(idx)],
            },
        );
        let fixed = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base,
                indices: vec![GepIndex::Const(0)],
            },
        );
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(dynamic, fixed), AliasResult::MayAlias);
    }

    #[test]
    fn argument_pointers_may_alias_each_other() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let p1 = b.param(Type::Ptr(Box::new(Type::I32)));
        let p2 = b.param(Type::Ptr(Box::new(Type::I32)));
        b.block();
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        assert_eq!(aa.alias(p1, p2), AliasResult::MayAlias);
    }

    #[test]
    fn stats_count_queries() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let p1 = b.alloca(Type::I32);
        let p2 = b.alloca(Type::I32);
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let aa = AliasAnalysis::analyze(&func);
        aa.alias(p1, p2);
        aa.alias(p1, p1);
        let stats = aa.stats();
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.no_alias, 1);
        assert_eq!(stats.must_alias, 1);
    }
}
