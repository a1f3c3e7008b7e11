//! Tail call marking.
//!
//! A call (or method call) whose result feeds exactly the following
//! `Return`, with no instructions after it in the block, is marked as a
//! tail call; the backend may turn it into a jump.
//!
//! After return merging the pattern is spread over two blocks: the call is
//! last in its block, which branches to the unified exit, and the exit's
//! return phi carries the call result on that edge. That form is marked
//! too; it is the same tail position.

use veldc_util::FxHashMap;

use crate::mir::{BlockId, Function, InstKind, Terminator, ValueId};
use crate::pass::MirPass;

pub struct TailCall;

impl MirPass for TailCall {
    fn name(&self) -> &'static str {
        "tail-call"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        // Unified-exit shape: block -> (phi result, incoming map) when the
        // block is just a phi and a return of it.
        let mut exit_phis: FxHashMap<BlockId, FxHashMap<BlockId, ValueId>> =
            FxHashMap::default();
        for block in &func.blocks {
            let [phi] = block.instructions.as_slice() else {
                continue;
            };
            let InstKind::Phi { incomings } = &phi.kind else {
                continue;
            };
            if block.terminator == Some(Terminator::Return(Some(phi.result))) {
                exit_phis.insert(
                    block.id,
                    incomings.iter().map(|(value, pred)| (*pred, *value)).collect(),
                );
            }
        }

        let mut changed = false;
        for block in &mut func.blocks {
            let block_id = block.id;
            let feeds_return = |result: ValueId, ty: &veldc_sem::Type| match &block.terminator {
                Some(Terminator::Return(Some(value))) => result == *value,
                // A unit-returning call in tail position also qualifies.
                Some(Terminator::Return(None)) => !result.is_valid() || ty.is_unit(),
                Some(Terminator::Branch { target }) => exit_phis
                    .get(target)
                    .and_then(|incomings| incomings.get(&block_id))
                    .is_some_and(|incoming| *incoming == result),
                _ => false,
            };
            let Some(last) = block.instructions.last() else {
                continue;
            };
            if !feeds_return(last.result, &last.ty) {
                continue;
            }
            let last = block.instructions.last_mut().expect("checked above");
            match &mut last.kind {
                InstKind::Call { tail_call, .. } | InstKind::MethodCall { tail_call, .. } => {
                    if !*tail_call {
                        *tail_call = true;
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        changed
    }
}
