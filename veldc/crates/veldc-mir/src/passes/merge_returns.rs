//! Return merging.
//!
//! Functions with more than one `Return` get a unified exit block holding a
//! phi of the return values and the single `Return`; the original return
//! sites branch there instead. Analyses that want a single exit get one.

use crate::mir::{Function, InstKind, Instruction, Terminator, ValueId};
use crate::pass::MirPass;

pub struct MergeReturns;

impl MirPass for MergeReturns {
    fn name(&self) -> &'static str {
        "merge-returns"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let return_sites: Vec<(crate::mir::BlockId, Option<ValueId>)> = func
            .blocks
            .iter()
            .filter_map(|block| match &block.terminator {
                Some(Terminator::Return(value)) => Some((block.id, *value)),
                _ => None,
            })
            .collect();
        if return_sites.len() < 2 {
            return false;
        }

        let returns_value = return_sites.iter().all(|(_, v)| v.is_some());
        let exit = func.new_block();

        let exit_value = if returns_value {
            let phi = func.new_value_id();
            let incomings = return_sites
                .iter()
                .map(|(block, value)| (value.expect("checked above"), *block))
                .collect();
            let ret_ty = func.ret.clone();
            let exit_block = func.block_mut(exit).expect("exit exists");
            exit_block
                .instructions
                .push(Instruction::new(phi, ret_ty, InstKind::Phi { incomings }));
            Some(phi)
        } else {
            None
        };
        let exit_block = func.block_mut(exit).expect("exit exists");
        exit_block.terminator = Some(Terminator::Return(exit_value));

        for (site, _) in &return_sites {
            let block = func.block_mut(*site).expect("return site exists");
            block.terminator = Some(Terminator::Branch { target: exit });
        }

        func.recompute_cfg();
        true
    }
}
