//! Unreachable code elimination.
//!
//! Breadth-first reachability from the entry deletes orphaned blocks. On
//! top of that, unreachability propagates: a conditional branch with one
//! edge into a trivially-unreachable block (no side-effecting instructions,
//! `Unreachable` terminator) becomes an unconditional branch to the other
//! side.

use std::collections::VecDeque;

use veldc_util::FxHashSet;

use crate::mir::{BlockId, Function, Terminator};
use crate::pass::MirPass;
use crate::passes::has_side_effects;

pub struct UnreachableCodeElimination;

impl MirPass for UnreachableCodeElimination {
    fn name(&self) -> &'static str {
        "unreachable-code-elimination"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = propagate_unreachable(func);
        changed |= delete_orphans(func);
        if changed {
            func.recompute_cfg();
        }
        changed
    }
}

/// Rewrite conditional branches whose one side can only reach an
/// `Unreachable` terminator through a trivially-empty block.
fn propagate_unreachable(func: &mut Function) -> bool {
    let trivially_unreachable: FxHashSet<BlockId> = func
        .blocks
        .iter()
        .filter(|block| {
            matches!(block.terminator, Some(Terminator::Unreachable))
                && block
                    .instructions
                    .iter()
                    .all(|inst| !has_side_effects(&inst.kind))
        })
        .map(|block| block.id)
        .collect();
    if trivially_unreachable.is_empty() {
        return false;
    }

    let mut changed = false;
    for block in &mut func.blocks {
        let Some(Terminator::CondBranch {
            then_block,
            else_block,
            ..
        }) = &block.terminator
        else {
            continue;
        };
        let then_dead = trivially_unreachable.contains(then_block);
        let else_dead = trivially_unreachable.contains(else_block);
        let new_target = match (then_dead, else_dead) {
            (true, false) => Some(*else_block),
            (false, true) => Some(*then_block),
            _ => None,
        };
        if let Some(target) = new_target {
            block.terminator = Some(Terminator::Branch { target });
            changed = true;
        }
    }
    changed
}

/// Delete blocks unreachable from the entry.
fn delete_orphans(func: &mut Function) -> bool {
    let Some(entry) = func.entry_block() else {
        return false;
    };
    let mut reachable: FxHashSet<BlockId> = FxHashSet::default();
    let mut queue = VecDeque::new();
    queue.push_back(entry);
    while let Some(id) = queue.pop_front() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(block) = func.block(id) {
            if let Some(term) = &block.terminator {
                for target in term.targets() {
                    if !reachable.contains(&target) {
                        queue.push_back(target);
                    }
                }
            }
        }
    }
    let before = func.blocks.len();
    func.blocks.retain(|block| reachable.contains(&block.id));
    func.blocks.len() != before
}
