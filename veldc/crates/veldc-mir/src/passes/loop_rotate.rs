//! Loop rotation.
//!
//! Rotates a while-style loop toward do-while shape by duplicating the
//! header's condition into the preheader: the preheader then tests before
//! entering, the body runs unconditionally once entered, and the back edge
//! re-tests through the original header. Only simple loops are touched:
//! the header must consist of pure condition instructions plus the
//! conditional branch, and a preheader must exist.

use veldc_util::FxHashMap;

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::loops::find_natural_loops;
use crate::mir::{Function, Instruction, Terminator, ValueId};
use crate::pass::MirPass;
use crate::passes::has_side_effects;

pub struct LoopRotate;

const MAX_HEADER_INSTS: usize = 4;

impl MirPass for LoopRotate {
    fn name(&self) -> &'static str {
        "loop-rotate"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let cfg = ControlFlowGraph::new(func);
        let loops = find_natural_loops(func, &cfg);
        let mut changed = false;

        for natural_loop in &loops {
            let Some(preheader) = natural_loop.preheader(&cfg) else {
                continue;
            };
            let header = natural_loop.header;
            let Some(header_block) = func.block(header) else {
                continue;
            };
            // Simple loop: the header is just the exit test.
            let Some(Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            }) = header_block.terminator.clone()
            else {
                continue;
            };
            let body_entry = if natural_loop.contains(then_block) {
                then_block
            } else {
                else_block
            };
            let exit = if body_entry == then_block {
                else_block
            } else {
                then_block
            };
            if natural_loop.contains(exit) {
                continue;
            }
            if header_block.instructions.len() > MAX_HEADER_INSTS
                || header_block
                    .instructions
                    .iter()
                    .any(|inst| has_side_effects(&inst.kind) || inst.kind.is_phi())
            {
                continue;
            }
            // The duplicated test must be computable in the preheader:
            // every operand has to be defined outside the loop.
            let ok = header_block.instructions.iter().all(|inst| {
                let mut outside = true;
                inst.kind.for_each_operand(|operand| {
                    if defined_in_loop(func, natural_loop, operand) {
                        outside = false;
                    }
                });
                outside
            }) && !defined_in_loop(func, natural_loop, cond);
            if !ok {
                continue;
            }

            // Clone the header's instructions into the preheader with
            // fresh ids, remapping the condition.
            let header_insts: Vec<Instruction> =
                func.block(header).unwrap().instructions.clone();
            let mut remap: FxHashMap<ValueId, ValueId> = FxHashMap::default();
            let mut clones = Vec::with_capacity(header_insts.len());
            for inst in &header_insts {
                let fresh = func.new_value_id();
                remap.insert(inst.result, fresh);
                let mut kind = inst.kind.clone();
                kind.for_each_operand_mut(|operand| {
                    if let Some(mapped) = remap.get(operand) {
                        *operand = *mapped;
                    }
                });
                clones.push(Instruction::new(fresh, inst.ty.clone(), kind));
            }
            let guard_cond = remap.get(&cond).copied().unwrap_or(cond);

            let preheader_block = func.block_mut(preheader).expect("preheader exists");
            preheader_block.instructions.extend(clones);
            preheader_block.terminator = Some(Terminator::CondBranch {
                cond: guard_cond,
                then_block: body_entry,
                else_block: exit,
            });
            func.recompute_cfg();
            changed = true;
        }

        changed
    }
}

fn defined_in_loop(
    func: &Function,
    natural_loop: &crate::analysis::loops::NaturalLoop,
    value: ValueId,
) -> bool {
    for block in &func.blocks {
        if !natural_loop.contains(block.id) {
            continue;
        }
        // The header's own instructions are the ones being duplicated;
        // they do not count as loop-defined for this check.
        if block.id == natural_loop.header {
            continue;
        }
        if block.instructions.iter().any(|inst| inst.result == value) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{BinaryOp, InstKind, Terminator};
    use crate::validate::validate_function;
    use veldc_sem::Type;

    #[test]
    fn while_loop_gets_an_entry_guard() {
        // while (x < y) { sink() }
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let x = b.param(Type::I32);
        let y = b.param(Type::I32);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(header);
        let cond = b.binary(Type::Bool, BinaryOp::Lt, x, y);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: body,
            else_block: exit,
        });

        b.switch_to(body);
        let _effect = b.call(Type::Unit, "sink", vec![]);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();

        assert!(LoopRotate.run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());

        // The preheader now ends in a conditional branch testing a cloned
        // comparison.
        let entry_block = func.block(entry).unwrap();
        assert!(matches!(
            entry_block.terminator,
            Some(Terminator::CondBranch { .. })
        ));
        assert!(entry_block
            .instructions
            .iter()
            .any(|i| matches!(i.kind, InstKind::Binary { op: BinaryOp::Lt, .. })));
    }

    #[test]
    fn header_with_phi_is_not_rotated() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let flag = b.param(Type::Bool);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        let zero = b.const_i32(0);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(header);
        let _iv = b.push(
            Type::I32,
            InstKind::Phi {
                incomings: vec![(zero, entry)],
            },
        );
        b.terminate(Terminator::CondBranch {
            cond: flag,
            then_block: body,
            else_block: exit,
        });

        b.switch_to(body);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();
        if let InstKind::Phi { incomings } =
            &mut func.block_mut(header).unwrap().instructions[0].kind
        {
            incomings.push((zero, body));
        }
        func.recompute_cfg();

        assert!(!LoopRotate.run_on_function(&mut func));
    }
}
