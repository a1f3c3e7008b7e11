//! Instruction sinking.
//!
//! The inverse of LICM: a pure instruction whose only use sits in a single
//! successor of its defining block moves into that successor, shortening
//! the live range on the paths that never needed the value. The defining
//! block must dominate the destination so operands stay valid.

use veldc_util::FxHashMap;

use crate::analysis::cfg::ControlFlowGraph;
use crate::mir::{BlockId, Function, ValueId};
use crate::pass::MirPass;
use crate::passes::has_side_effects;

pub struct Sinking;

impl MirPass for Sinking {
    fn name(&self) -> &'static str {
        "sinking"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        func.recompute_cfg();
        let cfg = ControlFlowGraph::new(func);

        // Where each value is used: block of use, count of uses, and
        // whether any use is a phi or terminator (those pin the value).
        #[derive(Default, Clone)]
        struct UseSummary {
            blocks: Vec<BlockId>,
            pinned: bool,
        }
        let mut uses: FxHashMap<ValueId, UseSummary> = FxHashMap::default();
        for block in &func.blocks {
            for inst in &block.instructions {
                let pin = inst.kind.is_phi();
                inst.kind.for_each_operand(|operand| {
                    let summary = uses.entry(operand).or_default();
                    summary.blocks.push(block.id);
                    summary.pinned |= pin;
                });
            }
            if let Some(term) = &block.terminator {
                term.for_each_operand(|operand| {
                    let summary = uses.entry(operand).or_default();
                    summary.blocks.push(block.id);
                    summary.pinned = true;
                });
            }
        }

        let mut changed = false;
        let mut moves: Vec<(BlockId, usize, BlockId)> = Vec::new();
        for block in &func.blocks {
            for (index, inst) in block.instructions.iter().enumerate() {
                if !inst.result.is_valid()
                    || inst.kind.is_phi()
                    || has_side_effects(&inst.kind)
                {
                    continue;
                }
                let Some(summary) = uses.get(&inst.result) else {
                    continue;
                };
                if summary.pinned {
                    continue;
                }
                let use_blocks = dedup(&summary.blocks);
                let [only_use_block] = use_blocks[..] else {
                    continue;
                };
                if only_use_block == block.id {
                    continue;
                }
                // The use must sit in a direct successor this block
                // dominates.
                if !block.succs.contains(&only_use_block)
                    || !cfg.dominates(block.id, only_use_block)
                {
                    continue;
                }
                moves.push((block.id, index, only_use_block));
            }
        }

        // Apply from the highest index down so earlier removals do not
        // shift later ones.
        moves.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        for (from, index, to) in moves {
            let from_index = func.block_index(from).expect("source block exists");
            let inst = func.blocks[from_index].instructions.remove(index);
            let to_block = func.block_mut(to).expect("destination exists");
            let insert_at = to_block.first_non_phi();
            to_block.instructions.insert(insert_at, inst);
            changed = true;
        }

        changed
    }
}

fn dedup(blocks: &[BlockId]) -> Vec<BlockId> {
    let mut out: Vec<BlockId> = Vec::new();
    for &b in blocks {
        if !out.contains(&b) {
            out.push(b);
        }
    }
    out
}
