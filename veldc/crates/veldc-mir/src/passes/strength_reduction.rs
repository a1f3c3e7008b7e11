//! Strength reduction.
//!
//! Replaces expensive operations with cheaper equivalents:
//!
//! - `x * 2^n` becomes `x << n`
//! - `x / 2^n` becomes `x >> n` (unsigned only)
//! - `x % 2^n` becomes `x & (2^n - 1)` (unsigned only)
//! - `x * -1` becomes `0 - x`
//! - `x * 3/5/9` becomes `(x << n) + x` (the address-unit friendly forms)

use veldc_sem::{IntWidth, Type};
use veldc_util::FxHashMap;

use crate::mir::{BinaryOp, ConstValue, Function, InstKind, Instruction, ValueId};
use crate::pass::MirPass;
use crate::passes::constants;

pub struct StrengthReduction;

impl MirPass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let mut changed = false;

        for block_index in 0..func.blocks.len() {
            let mut index = 0;
            while index < func.blocks[block_index].instructions.len() {
                if let Some(rewrite) =
                    plan_rewrite(&func.blocks[block_index].instructions[index], &consts)
                {
                    apply_rewrite(func, block_index, index, rewrite);
                    changed = true;
                }
                index += 1;
            }
        }

        changed
    }
}

enum Rewrite {
    /// Replace the instruction kind in place, with a helper constant
    /// inserted just before it.
    WithConstant {
        constant: ConstValue,
        constant_ty: Type,
        make: fn(ValueId, ValueId) -> InstKind,
        operand: ValueId,
    },
    /// `x * (2^n +/- 1)`: shift then add or subtract, needing two
    /// inserted instructions.
    ShiftAdd {
        operand: ValueId,
        shift: u32,
        width: IntWidth,
        signed: bool,
        subtract: bool,
    },
}

fn plan_rewrite(
    inst: &Instruction,
    consts: &FxHashMap<ValueId, ConstValue>,
) -> Option<Rewrite> {
    let InstKind::Binary { op, left, right } = &inst.kind else {
        return None;
    };
    // Only the right operand carries the constant; reassociation has
    // already pushed constants right for commutative ops.
    let constant = consts.get(right)?;

    match (op, constant) {
        (BinaryOp::Mul, ConstValue::Int { value, width }) => {
            if *value == -1 {
                return Some(Rewrite::WithConstant {
                    constant: ConstValue::Int {
                        value: 0,
                        width: *width,
                    },
                    constant_ty: inst.ty.clone(),
                    make: |zero, x| InstKind::Binary {
                        op: BinaryOp::Sub,
                        left: zero,
                        right: x,
                    },
                    operand: *left,
                });
            }
            if *value > 0 && (*value as u64).is_power_of_two() {
                let shift = value.trailing_zeros();
                return Some(Rewrite::WithConstant {
                    constant: ConstValue::Int {
                        value: shift as i64,
                        width: *width,
                    },
                    constant_ty: inst.ty.clone(),
                    make: |amount, x| InstKind::Binary {
                        op: BinaryOp::Shl,
                        left: x,
                        right: amount,
                    },
                    operand: *left,
                });
            }
            // x*3, x*5, x*9: shift and add; x*7: shift and subtract.
            if matches!(value, 3 | 5 | 9) {
                return Some(Rewrite::ShiftAdd {
                    operand: *left,
                    shift: (*value as u64 - 1).trailing_zeros(),
                    width: *width,
                    signed: true,
                    subtract: false,
                });
            }
            if *value == 7 {
                return Some(Rewrite::ShiftAdd {
                    operand: *left,
                    shift: 3,
                    width: *width,
                    signed: true,
                    subtract: true,
                });
            }
            None
        }
        (BinaryOp::Mul, ConstValue::Uint { value, width }) => {
            if value.is_power_of_two() {
                let shift = value.trailing_zeros();
                return Some(Rewrite::WithConstant {
                    constant: ConstValue::Uint {
                        value: shift as u64,
                        width: *width,
                    },
                    constant_ty: inst.ty.clone(),
                    make: |amount, x| InstKind::Binary {
                        op: BinaryOp::Shl,
                        left: x,
                        right: amount,
                    },
                    operand: *left,
                });
            }
            if matches!(value, 3 | 5 | 9) {
                return Some(Rewrite::ShiftAdd {
                    operand: *left,
                    shift: (value - 1).trailing_zeros(),
                    width: *width,
                    signed: false,
                    subtract: false,
                });
            }
            if *value == 7 {
                return Some(Rewrite::ShiftAdd {
                    operand: *left,
                    shift: 3,
                    width: *width,
                    signed: false,
                    subtract: true,
                });
            }
            None
        }
        // Division and modulo reductions are only valid for unsigned
        // operands.
        (BinaryOp::Div, ConstValue::Uint { value, width }) if value.is_power_of_two() => {
            Some(Rewrite::WithConstant {
                constant: ConstValue::Uint {
                    value: value.trailing_zeros() as u64,
                    width: *width,
                },
                constant_ty: inst.ty.clone(),
                make: |amount, x| InstKind::Binary {
                    op: BinaryOp::Shr,
                    left: x,
                    right: amount,
                },
                operand: *left,
            })
        }
        (BinaryOp::Mod, ConstValue::Uint { value, width }) if value.is_power_of_two() => {
            Some(Rewrite::WithConstant {
                constant: ConstValue::Uint {
                    value: value - 1,
                    width: *width,
                },
                constant_ty: inst.ty.clone(),
                make: |mask, x| InstKind::Binary {
                    op: BinaryOp::BitAnd,
                    left: x,
                    right: mask,
                },
                operand: *left,
            })
        }
        _ => None,
    }
}

fn apply_rewrite(func: &mut Function, block_index: usize, inst_index: usize, rewrite: Rewrite) {
    match rewrite {
        Rewrite::WithConstant {
            constant,
            constant_ty,
            make,
            operand,
        } => {
            let helper = func.new_value_id();
            let block = &mut func.blocks[block_index];
            block.instructions.insert(
                inst_index,
                Instruction::new(helper, constant_ty, InstKind::Constant(constant)),
            );
            block.instructions[inst_index + 1].kind = make(helper, operand);
        }
        Rewrite::ShiftAdd {
            operand,
            shift,
            width,
            signed,
            subtract,
        } => {
            let amount = func.new_value_id();
            let shifted = func.new_value_id();
            let ty = func.blocks[block_index].instructions[inst_index].ty.clone();
            let amount_const = if signed {
                ConstValue::Int {
                    value: shift as i64,
                    width,
                }
            } else {
                ConstValue::Uint {
                    value: shift as u64,
                    width,
                }
            };
            let block = &mut func.blocks[block_index];
            block.instructions.insert(
                inst_index,
                Instruction::new(amount, ty.clone(), InstKind::Constant(amount_const)),
            );
            block.instructions.insert(
                inst_index + 1,
                Instruction::new(
                    shifted,
                    ty,
                    InstKind::Binary {
                        op: BinaryOp::Shl,
                        left: operand,
                        right: amount,
                    },
                ),
            );
            block.instructions[inst_index + 2].kind = InstKind::Binary {
                op: if subtract { BinaryOp::Sub } else { BinaryOp::Add },
                left: shifted,
                right: operand,
            };
        }
    }
}
