//! Block merging.
//!
//! The focused subset of CFG simplification: a block ending in an
//! unconditional branch whose successor has exactly one predecessor and no
//! phi nodes absorbs that successor.

use crate::mir::{BlockId, Function, Terminator};
use crate::pass::MirPass;

pub struct BlockMerge;

impl MirPass for BlockMerge {
    fn name(&self) -> &'static str {
        "block-merge"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;
        loop {
            func.recompute_cfg();
            let mut pair: Option<(BlockId, BlockId)> = None;
            for block in &func.blocks {
                let Some(Terminator::Branch { target }) = &block.terminator else {
                    continue;
                };
                if *target == block.id {
                    continue;
                }
                let Some(succ) = func.block(*target) else {
                    continue;
                };
                if succ.preds.len() == 1 && !succ.instructions.iter().any(|i| i.kind.is_phi()) {
                    pair = Some((block.id, *target));
                    break;
                }
            }
            let Some((pred_id, succ_id)) = pair else {
                break;
            };
            let succ_index = func.block_index(succ_id).expect("successor exists");
            let succ = func.blocks.remove(succ_index);
            let pred = func.block_mut(pred_id).expect("predecessor exists");
            pred.instructions.extend(succ.instructions);
            pred.terminator = succ.terminator;
            changed = true;
        }
        if changed {
            func.recompute_cfg();
        }
        changed
    }
}
