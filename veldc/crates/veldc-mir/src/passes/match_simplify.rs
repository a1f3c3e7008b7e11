//! Switch simplification.
//!
//! Cleanups over `Switch` terminators:
//!
//! - cases that target the default block are dropped
//! - a compile-time-constant discriminant folds the whole switch to one
//!   branch
//! - a switch with a single remaining case becomes a compare plus a
//!   conditional branch

use veldc_sem::{IntWidth, Type};

use crate::mir::{
    BinaryOp, ConstValue, Function, InstKind, Instruction, Terminator,
};
use crate::pass::MirPass;
use crate::passes::constants;

pub struct MatchSimplify;

impl MirPass for MatchSimplify {
    fn name(&self) -> &'static str {
        "match-simplify"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let mut changed = false;

        for block_index in 0..func.blocks.len() {
            let Some(Terminator::Switch {
                discr,
                cases,
                default,
            }) = func.blocks[block_index].terminator.clone()
            else {
                continue;
            };

            // Constant discriminant: the switch is a single branch.
            if let Some(value) = consts.get(&discr).and_then(ConstValue::as_int) {
                let target = cases
                    .iter()
                    .find(|(case, _)| *case as i128 == value)
                    .map(|(_, target)| *target)
                    .unwrap_or(default);
                func.blocks[block_index].terminator =
                    Some(Terminator::Branch { target });
                changed = true;
                continue;
            }

            // Drop cases that go where the default goes anyway.
            let kept: Vec<(i64, crate::mir::BlockId)> = cases
                .iter()
                .copied()
                .filter(|(_, target)| *target != default)
                .collect();
            let dropped_some = kept.len() != cases.len();

            match kept.as_slice() {
                [] if dropped_some => {
                    func.blocks[block_index].terminator =
                        Some(Terminator::Branch { target: default });
                    changed = true;
                }
                [(case, target)] => {
                    // One live case: compare and branch.
                    let case_const = func.new_value_id();
                    let cond = func.new_value_id();
                    let case = *case;
                    let target = *target;
                    let block = &mut func.blocks[block_index];
                    block.instructions.push(Instruction::new(
                        case_const,
                        Type::I64,
                        InstKind::Constant(ConstValue::Int {
                            value: case,
                            width: IntWidth::W64,
                        }),
                    ));
                    block.instructions.push(Instruction::new(
                        cond,
                        Type::Bool,
                        InstKind::Binary {
                            op: BinaryOp::Eq,
                            left: discr,
                            right: case_const,
                        },
                    ));
                    block.terminator = Some(Terminator::CondBranch {
                        cond,
                        then_block: target,
                        else_block: default,
                    });
                    changed = true;
                }
                _ if dropped_some => {
                    func.blocks[block_index].terminator = Some(Terminator::Switch {
                        discr,
                        cases: kept,
                        default,
                    });
                    changed = true;
                }
                _ => {}
            }
        }

        if changed {
            func.recompute_cfg();
        }
        changed
    }
}
