//! Constant hoisting.
//!
//! Expensive constants (wide integers, floats, strings) materialized inside
//! a loop and referenced more than once move to the preheader, so the
//! materialization happens once instead of every iteration.

use veldc_util::FxHashSet;

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::loops::find_natural_loops;
use crate::mir::{ConstValue, Function, InstKind, ValueId};
use crate::pass::MirPass;

pub struct ConstantHoist;

/// Cheap constants stay put; rematerializing them costs nothing.
fn is_expensive(constant: &ConstValue) -> bool {
    match constant {
        ConstValue::Int { value, width } => width.bits() >= 64 || value.abs() > 0xffff,
        ConstValue::Uint { value, width } => width.bits() >= 64 || *value > 0xffff,
        ConstValue::Float { .. } | ConstValue::Str(_) => true,
        _ => false,
    }
}

impl MirPass for ConstantHoist {
    fn name(&self) -> &'static str {
        "constant-hoist"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let cfg = ControlFlowGraph::new(func);
        let loops = find_natural_loops(func, &cfg);
        if loops.is_empty() {
            return false;
        }

        let mut changed = false;
        for natural_loop in &loops {
            let Some(preheader) = natural_loop.preheader(&cfg) else {
                continue;
            };

            // Expensive constants defined in the loop with 2+ uses in it.
            let mut hoistable: FxHashSet<ValueId> = FxHashSet::default();
            for block in &func.blocks {
                if !natural_loop.contains(block.id) {
                    continue;
                }
                for inst in &block.instructions {
                    if let InstKind::Constant(constant) = &inst.kind {
                        if is_expensive(constant) && func.count_uses(inst.result) >= 2 {
                            hoistable.insert(inst.result);
                        }
                    }
                }
            }
            if hoistable.is_empty() {
                continue;
            }

            let mut moved = Vec::new();
            for block in &mut func.blocks {
                if !natural_loop.contains(block.id) {
                    continue;
                }
                let mut index = 0;
                while index < block.instructions.len() {
                    if hoistable.contains(&block.instructions[index].result) {
                        moved.push(block.instructions.remove(index));
                    } else {
                        index += 1;
                    }
                }
            }
            let preheader_block = func.block_mut(preheader).expect("preheader exists");
            preheader_block.instructions.extend(moved);
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{BinaryOp, Terminator};
    use crate::validate::validate_function;
    use veldc_sem::Type;

    #[test]
    fn wide_constant_with_two_uses_hoists() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let flag = b.param(Type::Bool);
        let x = b.param(Type::I64);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(header);
        b.terminate(Terminator::CondBranch {
            cond: flag,
            then_block: body,
            else_block: exit,
        });
        b.switch_to(body);
        let big = b.const_i64(0x1234_5678_9abc);
        let a = b.binary(Type::I64, BinaryOp::Add, x, big);
        let c = b.binary(Type::I64, BinaryOp::Mul, a, big);
        let _use = b.call(Type::Unit, "sink", vec![c]);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        assert!(ConstantHoist.run_on_function(&mut func));
        func.recompute_cfg();
        assert!(validate_function(&func).is_ok());
        assert!(func.block(entry).unwrap()
            .instructions
            .iter()
            .any(|i| matches!(i.kind, InstKind::Constant(_))));
    }

    #[test]
    fn cheap_or_single_use_constants_stay() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let flag = b.param(Type::Bool);
        let x = b.param(Type::I32);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(header);
        b.terminate(Terminator::CondBranch {
            cond: flag,
            then_block: body,
            else_block: exit,
        });
        b.switch_to(body);
        let one = b.const_i32(1);
        let a = b.binary(Type::I32, BinaryOp::Add, x, one);
        let d = b.binary(Type::I32, BinaryOp::Mul, a, one);
        let _use = b.call(Type::Unit, "sink", vec![d]);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        assert!(!ConstantHoist.run_on_function(&mut func));
    }
}
