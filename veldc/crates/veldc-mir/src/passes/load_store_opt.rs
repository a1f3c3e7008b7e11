//! Block-local load/store optimization.
//!
//! Three rewrites within one block:
//!
//! - store-to-load forwarding: a load from a pointer just stored to reuses
//!   the stored value
//! - dead-store elimination: a store overwritten by a later store to the
//!   same pointer with no intervening load is deleted
//! - redundant-load elimination: a load from a pointer already loaded, with
//!   no intervening store, reuses the first load
//!
//! With alias analysis, stores only invalidate entries they may alias;
//! volatile operations are never touched.

use veldc_util::{FxHashMap, FxHashSet};

use crate::analysis::alias::{AliasAnalysis, AliasResult};
use crate::mir::{Function, InstKind, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct LoadStoreOpt;

impl MirPass for LoadStoreOpt {
    fn name(&self) -> &'static str {
        "load-store-opt"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let alias = AliasAnalysis::analyze(func);
        let mut changed = false;
        let mut replacements: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();

        for block in &mut func.blocks {
            // Known memory contents: pointer -> value currently stored or
            // loaded from it.
            let mut known: FxHashMap<ValueId, ValueId> = FxHashMap::default();
            // Pending store per pointer: (instruction index, had any load
            // since). Used for dead-store elimination.
            let mut pending_store: FxHashMap<ValueId, usize> = FxHashMap::default();
            let mut dead_stores: Vec<usize> = Vec::new();

            for (index, inst) in block.instructions.iter().enumerate() {
                match &inst.kind {
                    InstKind::Store {
                        ptr,
                        value,
                        volatile,
                    } => {
                        if *volatile {
                            known.clear();
                            pending_store.clear();
                            continue;
                        }
                        // A store overwritten with no intervening load
                        // makes the earlier one dead.
                        if let Some(previous) = pending_store.insert(*ptr, index) {
                            dead_stores.push(previous);
                        }
                        // Invalidate everything the store may touch, then
                        // record the new contents.
                        known.retain(|other_ptr, _| {
                            alias.alias(*ptr, *other_ptr) == AliasResult::NoAlias
                        });
                        pending_store.retain(|other_ptr, _| {
                            *other_ptr == *ptr
                                || alias.alias(*ptr, *other_ptr) == AliasResult::NoAlias
                        });
                        known.insert(*ptr, *value);
                    }
                    InstKind::Load { ptr, volatile } => {
                        if *volatile {
                            continue;
                        }
                        // Any load from a may-aliasing pointer keeps
                        // earlier stores alive.
                        pending_store.retain(|other_ptr, _| {
                            alias.alias(*ptr, *other_ptr) == AliasResult::NoAlias
                        });
                        if let Some(value) = known.get(ptr) {
                            if *value != inst.result {
                                replacements.insert(inst.result, *value);
                                doomed.insert(inst.result);
                                changed = true;
                            }
                        } else {
                            known.insert(*ptr, inst.result);
                        }
                    }
                    InstKind::Call { .. }
                    | InstKind::MethodCall { .. }
                    | InstKind::Await { .. } => {
                        // Unknown memory effects: forget everything and
                        // keep all pending stores.
                        known.clear();
                        pending_store.clear();
                    }
                    _ => {}
                }
            }

            if !dead_stores.is_empty() {
                for index in dead_stores.iter().rev() {
                    block.instructions.remove(*index);
                }
                changed = true;
            }
        }

        for (from, to) in &replacements {
            func.replace_uses(*from, *to);
        }
        remove_defs(func, &doomed);
        changed
    }
}
