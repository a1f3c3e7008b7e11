//! Aggressive dead code elimination.
//!
//! Starts from the instructions that must run (side effects, terminator
//! operands) and propagates liveness backward through operands; everything
//! left unmarked is deleted. More thorough than plain DCE because liveness
//! flows through phis and across blocks in one sweep.

use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{Function, ValueId};
use crate::pass::MirPass;
use crate::passes::has_side_effects;

pub struct Adce;

impl MirPass for Adce {
    fn name(&self) -> &'static str {
        "adce"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        // Operand lists per defined value, plus the live roots.
        let mut operands_of: FxHashMap<ValueId, Vec<ValueId>> = FxHashMap::default();
        let mut live: FxHashSet<ValueId> = FxHashSet::default();
        let mut worklist: Vec<ValueId> = Vec::new();

        for block in &func.blocks {
            for inst in &block.instructions {
                if inst.result.is_valid() {
                    let mut operands = Vec::new();
                    inst.kind.for_each_operand(|operand| operands.push(operand));
                    operands_of.insert(inst.result, operands);
                }
                if has_side_effects(&inst.kind) {
                    // The side effect anchors the instruction and all its
                    // operands.
                    if inst.result.is_valid() {
                        live.insert(inst.result);
                    }
                    inst.kind.for_each_operand(|operand| {
                        if live.insert(operand) {
                            worklist.push(operand);
                        }
                    });
                }
            }
            if let Some(term) = &block.terminator {
                term.for_each_operand(|operand| {
                    if live.insert(operand) {
                        worklist.push(operand);
                    }
                });
            }
        }

        while let Some(value) = worklist.pop() {
            if let Some(operands) = operands_of.get(&value) {
                for &operand in operands {
                    if live.insert(operand) {
                        worklist.push(operand);
                    }
                }
            }
        }

        let mut changed = false;
        for block in &mut func.blocks {
            let before = block.instructions.len();
            block.instructions.retain(|inst| {
                has_side_effects(&inst.kind)
                    || !inst.result.is_valid()
                    || live.contains(&inst.result)
            });
            changed |= block.instructions.len() != before;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{BinaryOp, InstKind, Terminator};
    use veldc_sem::Type;

    #[test]
    fn keeps_values_feeding_the_return() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let x = b.const_i32(1);
        let y = b.const_i32(2);
        let sum = b.binary(Type::I32, BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(!Adce.run_on_function(&mut func));
        assert_eq!(func.instruction_count(), 3);
    }

    #[test]
    fn removes_dead_phi_webs() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let entry = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();

        b.switch_to(entry);
        let cond = b.const_bool(true);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: left,
            else_block: right,
        });
        b.switch_to(left);
        let one = b.const_i32(1);
        b.terminate(Terminator::Branch { target: join });
        b.switch_to(right);
        let two = b.const_i32(2);
        b.terminate(Terminator::Branch { target: join });
        b.switch_to(join);
        let phi = b.push(
            Type::I32,
            InstKind::Phi {
                incomings: vec![(one, left), (two, right)],
            },
        );
        let _dead = b.binary(Type::I32, BinaryOp::Add, phi, phi);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        assert!(Adce.run_on_function(&mut func));
        // The whole web (phi, both constants, the add) dies; only the
        // branch condition survives.
        assert_eq!(func.instruction_count(), 1);
    }

    #[test]
    fn store_operands_stay_live() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let slot = b.alloca(Type::I32);
        let v = b.const_i32(42);
        b.push_store(slot, v);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        assert!(!Adce.run_on_function(&mut func));
        assert_eq!(func.instruction_count(), 3);
    }
}
