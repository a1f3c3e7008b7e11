//! Loop-invariant code motion.
//!
//! An instruction is loop-invariant when every operand is a constant,
//! defined outside the loop, or itself invariant. Pure invariants move to
//! the loop's unique preheader; when no preheader exists the pass declines
//! rather than synthesize one. Loads are hoistable when no store in the
//! loop may alias their pointer.

use veldc_util::FxHashSet;

use crate::analysis::alias::{AliasAnalysis, AliasResult};
use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::loops::find_natural_loops;
use crate::mir::{Function, InstKind, ValueId};
use crate::pass::MirPass;
use crate::passes::has_side_effects;

pub struct Licm;

impl MirPass for Licm {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let cfg = ControlFlowGraph::new(func);
        let loops = find_natural_loops(func, &cfg);
        if loops.is_empty() {
            return false;
        }
        let alias = AliasAnalysis::analyze(func);

        let mut changed = false;
        for natural_loop in &loops {
            let Some(preheader) = natural_loop.preheader(&cfg) else {
                continue;
            };

            // Values defined inside the loop.
            let mut defined_inside: FxHashSet<ValueId> = FxHashSet::default();
            // Pointers stored to anywhere in the loop.
            let mut stored_pointers: Vec<ValueId> = Vec::new();
            let mut loop_has_call = false;
            for block in &func.blocks {
                if !natural_loop.contains(block.id) {
                    continue;
                }
                for inst in &block.instructions {
                    if inst.result.is_valid() {
                        defined_inside.insert(inst.result);
                    }
                    match &inst.kind {
                        InstKind::Store { ptr, .. } => stored_pointers.push(*ptr),
                        InstKind::Call { .. }
                        | InstKind::MethodCall { .. }
                        | InstKind::Await { .. } => loop_has_call = true,
                        _ => {}
                    }
                }
            }

            // Grow the invariant set to a fixpoint.
            let mut invariant: FxHashSet<ValueId> = FxHashSet::default();
            loop {
                let mut grew = false;
                for block in &func.blocks {
                    if !natural_loop.contains(block.id) {
                        continue;
                    }
                    for inst in &block.instructions {
                        if !inst.result.is_valid()
                            || invariant.contains(&inst.result)
                            || inst.kind.is_phi()
                        {
                            continue;
                        }
                        let hoistable_kind = match &inst.kind {
                            kind if has_side_effects(kind) => false,
                            InstKind::Load { ptr, volatile: false } => {
                                // Hoistable if nothing in the loop may
                                // write through an aliasing pointer and no
                                // call can.
                                !loop_has_call
                                    && stored_pointers.iter().all(|stored| {
                                        alias.alias(*ptr, *stored) == AliasResult::NoAlias
                                    })
                            }
                            InstKind::Load { .. } | InstKind::Alloca { .. } => false,
                            _ => true,
                        };
                        if !hoistable_kind {
                            continue;
                        }
                        let mut all_invariant = true;
                        inst.kind.for_each_operand(|operand| {
                            if defined_inside.contains(&operand)
                                && !invariant.contains(&operand)
                            {
                                all_invariant = false;
                            }
                        });
                        if all_invariant && invariant.insert(inst.result) {
                            grew = true;
                        }
                    }
                }
                if !grew {
                    break;
                }
            }
            if invariant.is_empty() {
                continue;
            }

            // Move the invariants to the preheader, preserving their
            // relative order so operand chains stay defined-before-use.
            let mut hoisted = Vec::new();
            for block in &mut func.blocks {
                if !natural_loop.contains(block.id) {
                    continue;
                }
                let mut index = 0;
                while index < block.instructions.len() {
                    if invariant.contains(&block.instructions[index].result) {
                        hoisted.push(block.instructions.remove(index));
                    } else {
                        index += 1;
                    }
                }
            }
            if hoisted.is_empty() {
                continue;
            }
            let preheader_block = func.block_mut(preheader).expect("preheader exists");
            let insert_at = preheader_block.instructions.len();
            preheader_block
                .instructions
                .splice(insert_at..insert_at, hoisted);
            changed = true;
        }

        changed
    }
}
