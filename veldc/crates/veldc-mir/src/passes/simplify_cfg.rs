//! CFG simplification.
//!
//! Four cleanups, iterated until quiet:
//!
//! 1. conditional branches and switches on constants fold to plain
//!    branches
//! 2. empty blocks that only branch unconditionally are removed, with
//!    their predecessors redirected and successor phis fixed up
//! 3. a block with exactly one successor whose successor has exactly one
//!    predecessor and no phis is merged into it
//! 4. blocks unreachable from the entry are deleted
//!
//! A final phi cleanup drops incoming entries from predecessors that no
//! longer exist.

use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{BlockId, ConstValue, Function, InstKind, Terminator};
use crate::pass::MirPass;
use crate::passes::constants;

pub struct SimplifyCfg;

impl MirPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;
        loop {
            let mut round = false;
            round |= fold_constant_branches(func);
            round |= remove_forwarding_blocks(func);
            round |= merge_straight_line(func);
            round |= delete_unreachable(func);
            if !round {
                break;
            }
            changed = true;
        }
        if changed {
            cleanup_phis(func);
            func.recompute_cfg();
        }
        changed
    }
}

/// Constant conditions pick their edge statically.
fn fold_constant_branches(func: &mut Function) -> bool {
    let consts = constants(func);
    let mut changed = false;
    for block in &mut func.blocks {
        let Some(term) = &block.terminator else {
            continue;
        };
        let new_term = match term {
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => match consts.get(cond).and_then(ConstValue::as_bool) {
                Some(true) => Some(Terminator::Branch {
                    target: *then_block,
                }),
                Some(false) => Some(Terminator::Branch {
                    target: *else_block,
                }),
                None => None,
            },
            Terminator::Switch {
                discr,
                cases,
                default,
            } => consts.get(discr).and_then(ConstValue::as_int).map(|v| {
                let target = cases
                    .iter()
                    .find(|(case, _)| *case as i128 == v)
                    .map(|(_, target)| *target)
                    .unwrap_or(*default);
                Terminator::Branch { target }
            }),
            _ => None,
        };
        if let Some(new_term) = new_term {
            block.terminator = Some(new_term);
            changed = true;
        }
    }
    changed
}

/// Remove empty blocks that only forward to another block.
fn remove_forwarding_blocks(func: &mut Function) -> bool {
    func.recompute_cfg();
    let entry = match func.entry_block() {
        Some(e) => e,
        None => return false,
    };

    // Find one removable forwarder per round; restructuring invalidates
    // the data used to find it.
    let mut victim: Option<(BlockId, BlockId)> = None;
    for block in &func.blocks {
        if block.id == entry || !block.instructions.is_empty() {
            continue;
        }
        let Some(Terminator::Branch { target }) = &block.terminator else {
            continue;
        };
        if *target == block.id {
            continue;
        }
        // Redirecting is only sound if the target's phis can absorb the
        // forwarder's predecessors without duplicating an entry.
        let target_block = func.block(*target).expect("branch target exists");
        let has_phi_conflict = target_block.instructions.iter().any(|inst| {
            let InstKind::Phi { incomings } = &inst.kind else {
                return false;
            };
            block.preds.iter().any(|pred| {
                incomings
                    .iter()
                    .any(|(_, incoming_pred)| incoming_pred == pred)
            })
        });
        if has_phi_conflict {
            continue;
        }
        victim = Some((block.id, *target));
        break;
    }

    let Some((victim_id, target_id)) = victim else {
        return false;
    };
    let victim_preds = func.block(victim_id).map(|b| b.preds.clone()).unwrap_or_default();

    // Redirect every predecessor's edge past the forwarder.
    for block in &mut func.blocks {
        if let Some(term) = &mut block.terminator {
            term.retarget(|target| {
                if *target == victim_id {
                    *target = target_id;
                }
            });
        }
    }
    // Phis in the target: the entry for the forwarder becomes one entry
    // per redirected predecessor; without predecessors it just vanishes.
    if let Some(target_block) = func.block_mut(target_id) {
        for inst in &mut target_block.instructions {
            let InstKind::Phi { incomings } = &mut inst.kind else {
                continue;
            };
            if let Some(position) = incomings
                .iter()
                .position(|(_, pred)| *pred == victim_id)
            {
                let (value, _) = incomings.remove(position);
                for pred in &victim_preds {
                    incomings.push((value, *pred));
                }
            }
        }
    }
    func.blocks.retain(|b| b.id != victim_id);
    func.recompute_cfg();
    true
}

/// Merge single-successor blocks into single-predecessor successors.
fn merge_straight_line(func: &mut Function) -> bool {
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
        let succ_has_phi = succ.instructions.iter().any(|i| i.kind.is_phi());
        if succ.preds.len() == 1 && !succ_has_phi {
            pair = Some((block.id, *target));
            break;
        }
    }

    let Some((pred_id, succ_id)) = pair else {
        return false;
    };
    let succ_index = func.block_index(succ_id).expect("successor exists");
    let succ = func.blocks.remove(succ_index);
    let pred = func.block_mut(pred_id).expect("predecessor exists");
    pred.instructions.extend(succ.instructions);
    pred.terminator = succ.terminator;
    func.recompute_cfg();
    true
}

/// Delete blocks unreachable from the entry.
fn delete_unreachable(func: &mut Function) -> bool {
    let entry = match func.entry_block() {
        Some(e) => e,
        None => return false,
    };
    let mut reachable: FxHashSet<BlockId> = FxHashSet::default();
    let mut stack = vec![entry];
    while let Some(id) = stack.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(block) = func.block(id) {
            if let Some(term) = &block.terminator {
                for target in term.targets() {
                    if !reachable.contains(&target) {
                        stack.push(target);
                    }
                }
            }
        }
    }
    let before = func.blocks.len();
    func.blocks.retain(|b| reachable.contains(&b.id));
    let changed = func.blocks.len() != before;
    if changed {
        func.recompute_cfg();
    }
    changed
}

/// Drop phi entries from predecessors that no longer exist.
fn cleanup_phis(func: &mut Function) {
    func.recompute_cfg();
    let preds_of: FxHashMap<BlockId, Vec<BlockId>> = func
        .blocks
        .iter()
        .map(|b| (b.id, b.preds.clone()))
        .collect();
    for block in &mut func.blocks {
        let preds = &preds_of[&block.id];
        for inst in &mut block.instructions {
            if let InstKind::Phi { incomings } = &mut inst.kind {
                incomings.retain(|(_, pred)| preds.contains(pred));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::validate::validate_function;
    use veldc_sem::Type;

    #[test]
    fn constant_branch_folds_and_dead_side_vanishes() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let entry = b.block();
        let then_block = b.block();
        let else_block = b.block();

        b.switch_to(entry);
        let cond = b.const_bool(true);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        });
        b.switch_to(then_block);
        let one = b.const_i32(1);
        b.terminate(Terminator::Return(Some(one)));
        b.switch_to(else_block);
        let two = b.const_i32(2);
        b.terminate(Terminator::Return(Some(two)));
        let mut func = b.build();

        assert!(SimplifyCfg.run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());
        // The else side is unreachable and gone; entry merged with then.
        assert!(func.block(else_block).is_none());
        assert_eq!(func.blocks.len(), 1);
    }

    #[test]
    fn forwarding_block_is_removed() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let entry = b.block();
        let hop = b.block();
        let end = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::Branch { target: hop });
        b.switch_to(hop);
        b.terminate(Terminator::Branch { target: end });
        b.switch_to(end);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        assert!(SimplifyCfg.run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());
        assert_eq!(func.blocks.len(), 1);
    }

    #[test]
    fn straight_line_blocks_merge() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let entry = b.block();
        let tail = b.block();

        b.switch_to(entry);
        let x = b.const_i32(1);
        b.terminate(Terminator::Branch { target: tail });
        b.switch_to(tail);
        let y = b.const_i32(2);
        let sum = b.binary(Type::I32, crate::mir::BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(SimplifyCfg.run_on_function(&mut func));
        assert_eq!(func.blocks.len(), 1);
        assert_eq!(func.blocks[0].instructions.len(), 3);
    }

    #[test]
    fn simplify_cfg_is_idempotent() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let entry = b.block();
        let hop = b.block();
        let end = b.block();
        b.switch_to(entry);
        b.terminate(Terminator::Branch { target: hop });
        b.switch_to(hop);
        b.terminate(Terminator::Branch { target: end });
        b.switch_to(end);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        SimplifyCfg.run_on_function(&mut func);
        let snapshot = func.clone();
        assert!(!SimplifyCfg.run_on_function(&mut func));
        assert_eq!(func, snapshot);
    }

    #[test]
    fn minimal_function_survives_unchanged() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        b.terminate(Terminator::Return(None));
        let mut func = b.build();
        let snapshot = func.clone();

        assert!(!SimplifyCfg.run_on_function(&mut func));
        assert_eq!(func, snapshot);
    }
}
