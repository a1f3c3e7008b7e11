//! Dead code elimination.
//!
//! Removes instructions whose result is unused and whose execution has no
//! side effects, iterating to a fixpoint so chains of dead values unravel.
//! Calls count as side-effecting unless the callee is on the documented
//! pure-function list.

use crate::mir::Function;
use crate::pass::MirPass;
use crate::passes::{has_side_effects, use_counts};

pub struct Dce;

impl MirPass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;
        loop {
            let uses = use_counts(func);
            let mut removed = false;
            for block in &mut func.blocks {
                let before = block.instructions.len();
                block.instructions.retain(|inst| {
                    if has_side_effects(&inst.kind) {
                        return true;
                    }
                    if !inst.result.is_valid() {
                        return true;
                    }
                    uses.get(&inst.result).copied().unwrap_or(0) > 0
                });
                removed |= block.instructions.len() != before;
            }
            if !removed {
                break;
            }
            changed = true;
        }
        changed
    }
}
