//! Constant folding.
//!
//! Evaluates binary, unary, and select instructions whose operands are all
//! constants and replaces them with a `Constant` instruction. Unsigned
//! arithmetic wraps; signed overflow is left to the backend and not folded.
//! Division and modulo by zero are never folded.

use veldc_sem::Type;

use crate::mir::{BinaryOp, ConstValue, Function, InstKind, UnaryOp};
use crate::pass::MirPass;
use crate::passes::constants;

pub struct ConstantFolding;

impl MirPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let mut changed = false;

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let folded = match &inst.kind {
                    InstKind::Binary { op, left, right } => {
                        match (consts.get(left), consts.get(right)) {
                            (Some(l), Some(r)) => fold_binary(*op, l, r, &inst.ty),
                            _ => None,
                        }
                    }
                    InstKind::Unary { op, operand } => {
                        consts.get(operand).and_then(|v| fold_unary(*op, v))
                    }
                    InstKind::Select {
                        cond,
                        true_val,
                        false_val,
                    } => match consts.get(cond).and_then(ConstValue::as_bool) {
                        Some(true) => consts.get(true_val).cloned(),
                        Some(false) => consts.get(false_val).cloned(),
                        None => None,
                    },
                    _ => None,
                };
                if let Some(value) = folded {
                    inst.kind = InstKind::Constant(value);
                    changed = true;
                }
            }
        }

        changed
    }
}

fn fold_binary(op: BinaryOp, l: &ConstValue, r: &ConstValue, ty: &Type) -> Option<ConstValue> {
    match (l, r) {
        (
            ConstValue::Int { value: a, width },
            ConstValue::Int { value: b, .. },
        ) => fold_signed(op, *a, *b, *width),
        (
            ConstValue::Uint { value: a, width },
            ConstValue::Uint { value: b, .. },
        ) => fold_unsigned(op, *a, *b, *width),
        (
            ConstValue::Float { value: a, is_f64 },
            ConstValue::Float { value: b, .. },
        ) => fold_float(op, *a, *b, *is_f64),
        (ConstValue::Bool(a), ConstValue::Bool(b)) => fold_bool(op, *a, *b),
        _ => {
            // Mixed-kind comparisons only happen for equality on identical
            // constant kinds; anything else is ill-typed and left alone.
            let _ = ty;
            None
        }
    }
}

fn fold_signed(
    op: BinaryOp,
    a: i64,
    b: i64,
    width: veldc_sem::IntWidth,
) -> Option<ConstValue> {
    let int = |value: i64| Some(ConstValue::Int { value, width });
    let boolean = |value: bool| Some(ConstValue::Bool(value));
    match op {
        // Signed overflow is UB left to the backend: fold only when the
        // checked operation succeeds.
        BinaryOp::Add => a.checked_add(b).and_then(int),
        BinaryOp::Sub => a.checked_sub(b).and_then(int),
        BinaryOp::Mul => a.checked_mul(b).and_then(int),
        BinaryOp::Div => {
            if b == 0 {
                None
            } else {
                a.checked_div(b).and_then(int)
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                None
            } else {
                a.checked_rem(b).and_then(int)
            }
        }
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::Ne => boolean(a != b),
        BinaryOp::Lt => boolean(a < b),
        BinaryOp::Le => boolean(a <= b),
        BinaryOp::Gt => boolean(a > b),
        BinaryOp::Ge => boolean(a >= b),
        BinaryOp::BitAnd => int(a & b),
        BinaryOp::BitOr => int(a | b),
        BinaryOp::BitXor => int(a ^ b),
        BinaryOp::Shl => {
            if (0..64).contains(&b) {
                int(a.wrapping_shl(b as u32))
            } else {
                None
            }
        }
        BinaryOp::Shr => {
            if (0..64).contains(&b) {
                int(a.wrapping_shr(b as u32))
            } else {
                None
            }
        }
        BinaryOp::And | BinaryOp::Or => None,
    }
}

fn fold_unsigned(
    op: BinaryOp,
    a: u64,
    b: u64,
    width: veldc_sem::IntWidth,
) -> Option<ConstValue> {
    let mask = |value: u64| {
        let bits = width.bits();
        let masked = if bits >= 64 {
            value
        } else {
            value & ((1u64 << bits) - 1)
        };
        Some(ConstValue::Uint {
            value: masked,
            width,
        })
    };
    let boolean = |value: bool| Some(ConstValue::Bool(value));
    match op {
        // Unsigned arithmetic wraps.
        BinaryOp::Add => mask(a.wrapping_add(b)),
        BinaryOp::Sub => mask(a.wrapping_sub(b)),
        BinaryOp::Mul => mask(a.wrapping_mul(b)),
        BinaryOp::Div => {
            if b == 0 {
                None
            } else {
                mask(a / b)
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                None
            } else {
                mask(a % b)
            }
        }
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::Ne => boolean(a != b),
        BinaryOp::Lt => boolean(a < b),
        BinaryOp::Le => boolean(a <= b),
        BinaryOp::Gt => boolean(a > b),
        BinaryOp::Ge => boolean(a >= b),
        BinaryOp::BitAnd => mask(a & b),
        BinaryOp::BitOr => mask(a | b),
        BinaryOp::BitXor => mask(a ^ b),
        BinaryOp::Shl => {
            if b < 64 {
                mask(a.wrapping_shl(b as u32))
            } else {
                None
            }
        }
        BinaryOp::Shr => {
            if b < 64 {
                mask(a.wrapping_shr(b as u32))
            } else {
                None
            }
        }
        BinaryOp::And | BinaryOp::Or => None,
    }
}

fn fold_float(op: BinaryOp, a: f64, b: f64, is_f64: bool) -> Option<ConstValue> {
    let float = |value: f64| Some(ConstValue::Float { value, is_f64 });
    let boolean = |value: bool| Some(ConstValue::Bool(value));
    match op {
        BinaryOp::Add => float(a + b),
        BinaryOp::Sub => float(a - b),
        BinaryOp::Mul => float(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                None
            } else {
                float(a / b)
            }
        }
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::Ne => boolean(a != b),
        BinaryOp::Lt => boolean(a < b),
        BinaryOp::Le => boolean(a <= b),
        BinaryOp::Gt => boolean(a > b),
        BinaryOp::Ge => boolean(a >= b),
        _ => None,
    }
}

fn fold_bool(op: BinaryOp, a: bool, b: bool) -> Option<ConstValue> {
    let boolean = |value: bool| Some(ConstValue::Bool(value));
    match op {
        BinaryOp::And => boolean(a && b),
        BinaryOp::Or => boolean(a || b),
        BinaryOp::Eq => boolean(a == b),
        BinaryOp::Ne => boolean(a != b),
        BinaryOp::BitAnd => boolean(a & b),
        BinaryOp::BitOr => boolean(a | b),
        BinaryOp::BitXor => boolean(a ^ b),
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, v: &ConstValue) -> Option<ConstValue> {
    match (op, v) {
        (UnaryOp::Neg, ConstValue::Int { value, width }) => value.checked_neg().map(|value| {
            ConstValue::Int {
                value,
                width: *width,
            }
        }),
        (UnaryOp::Neg, ConstValue::Float { value, is_f64 }) => Some(ConstValue::Float {
            value: -value,
            is_f64: *is_f64,
        }),
        (UnaryOp::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
        (UnaryOp::BitNot, ConstValue::Int { value, width }) => Some(ConstValue::Int {
            value: !value,
            width: *width,
        }),
        (UnaryOp::BitNot, ConstValue::Uint { value, width }) => {
            let bits = width.bits();
            let flipped = if bits >= 64 {
                !value
            } else {
                !value & ((1u64 << bits) - 1)
            };
            Some(ConstValue::Uint {
                value: flipped,
                width: *width,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{Terminator, ValueId};
    use veldc_sem::{IntWidth, Type};

    fn fold(func: &mut Function) -> bool {
        ConstantFolding.run_on_function(func)
    }

    fn const_of(func: &Function, result: ValueId) -> Option<&ConstValue> {
        func.def_of(result).and_then(|inst| match &inst.kind {
            InstKind::Constant(v) => Some(v),
            _ => None,
        })
    }

    #[test]
    fn folds_integer_addition() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let x = b.const_i32(10);
        let y = b.const_i32(20);
        let sum = b.binary(Type::I32, BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(fold(&mut func));
        assert_eq!(
            const_of(&func, sum).and_then(ConstValue::as_int),
            Some(30)
        );
    }

    #[test]
    fn never_folds_division_by_zero() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let x = b.const_i32(1);
        let zero = b.const_i32(0);
        let div = b.binary(Type::I32, BinaryOp::Div, x, zero);
        b.terminate(Terminator::Return(Some(div)));
        let mut func = b.build();

        assert!(!fold(&mut func));
        assert!(matches!(
            func.def_of(div).unwrap().kind,
            InstKind::Binary { .. }
        ));
    }

    #[test]
    fn never_folds_signed_overflow() {
        let mut b = FunctionBuilder::new("f", Type::I64);
        b.block();
        let x = b.const_i64(i64::MAX);
        let y = b.const_i64(1);
        let sum = b.binary(Type::I64, BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(!fold(&mut func));
    }

    #[test]
    fn unsigned_arithmetic_wraps() {
        let mut b = FunctionBuilder::new("f", Type::Uint(IntWidth::W32));
        b.block();
        let x = b.const_u32(u32::MAX as u64);
        let y = b.const_u32(1);
        let sum = b.binary(Type::Uint(IntWidth::W32), BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(fold(&mut func));
        assert_eq!(
            const_of(&func, sum),
            Some(&ConstValue::Uint {
                value: 0,
                width: IntWidth::W32
            })
        );
    }

    #[test]
    fn folds_comparison_to_bool() {
        let mut b = FunctionBuilder::new("f", Type::Bool);
        b.block();
        let x = b.const_i32(3);
        let y = b.const_i32(4);
        let lt = b.binary(Type::Bool, BinaryOp::Lt, x, y);
        b.terminate(Terminator::Return(Some(lt)));
        let mut func = b.build();

        assert!(fold(&mut func));
        assert_eq!(const_of(&func, lt), Some(&ConstValue::Bool(true)));
    }

    #[test]
    fn folds_select_with_constant_condition() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let cond = b.const_bool(false);
        let t = b.const_i32(1);
        let f = b.const_i32(2);
        let sel = b.push(
            Type::I32,
            InstKind::Select {
                cond,
                true_val: t,
                false_val: f,
            },
        );
        b.terminate(Terminator::Return(Some(sel)));
        let mut func = b.build();

        assert!(fold(&mut func));
        assert_eq!(const_of(&func, sel).and_then(ConstValue::as_int), Some(2));
    }

    #[test]
    fn folding_is_idempotent() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let x = b.const_i32(2);
        let y = b.const_i32(3);
        let sum = b.binary(Type::I32, BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(fold(&mut func));
        let snapshot = func.clone();
        assert!(!fold(&mut func));
        assert_eq!(func, snapshot);
    }
}
