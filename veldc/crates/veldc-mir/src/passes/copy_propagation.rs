//! Copy propagation.
//!
//! A copy is: a phi whose incoming values are all equal across all
//! predecessors, a select whose branches are equal, or an identity bitcast.
//! The copy map is closed transitively, then all uses are redirected and
//! the copies deleted.
//!
//! A single-incoming phi is deliberately NOT treated as a copy: the
//! incoming value need not dominate the phi's uses.

use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{CastKind, Function, InstKind, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct CopyPropagation;

impl MirPass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut copies: FxHashMap<ValueId, ValueId> = FxHashMap::default();

        for block in &func.blocks {
            for inst in &block.instructions {
                match &inst.kind {
                    InstKind::Phi { incomings } if incomings.len() >= 2 => {
                        let first = incomings[0].0;
                        if incomings.iter().all(|(value, _)| *value == first) {
                            copies.insert(inst.result, first);
                        }
                    }
                    InstKind::Select {
                        true_val,
                        false_val,
                        ..
                    } if true_val == false_val => {
                        copies.insert(inst.result, *true_val);
                    }
                    InstKind::Cast {
                        kind: CastKind::Bitcast,
                        source_ty,
                        target_ty,
                        operand,
                    } if source_ty == target_ty => {
                        copies.insert(inst.result, *operand);
                    }
                    _ => {}
                }
            }
        }

        if copies.is_empty() {
            return false;
        }

        // Close chains: a copy of a copy points at the original.
        let keys: Vec<ValueId> = copies.keys().copied().collect();
        for key in keys {
            let mut target = copies[&key];
            let mut hops = 0;
            while let Some(next) = copies.get(&target) {
                target = *next;
                hops += 1;
                if hops > copies.len() {
                    break;
                }
            }
            copies.insert(key, target);
        }

        let doomed: FxHashSet<ValueId> = copies.keys().copied().collect();
        for (from, to) in &copies {
            func.replace_uses(*from, *to);
        }
        remove_defs(func, &doomed);
        true
    }
}
