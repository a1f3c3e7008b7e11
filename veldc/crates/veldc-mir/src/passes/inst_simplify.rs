//! Instruction simplification.
//!
//! Algebraic identities that either collapse an instruction to one of its
//! operands, to a constant, or to a cheaper form: `x+0`, `x*1`, `x*0`,
//! `x&x`, `x^x`, `x-x`, shifts by zero, self-comparisons, double negation,
//! and the select family (constant condition, equal branches, boolean
//! branches).

use veldc_sem::Type;
use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{BinaryOp, ConstValue, Function, InstKind, UnaryOp, ValueId};
use crate::pass::MirPass;
use crate::passes::{constants, remove_defs};

pub struct InstSimplify;

enum Simplified {
    /// The instruction is equivalent to an existing value.
    Value(ValueId),
    /// The instruction is a constant.
    Constant(ConstValue),
    /// The instruction becomes a different (cheaper) computation.
    Rewrite(InstKind),
}

impl MirPass for InstSimplify {
    fn name(&self) -> &'static str {
        "inst-simplify"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let mut changed = false;
        let mut replacements: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let simplified = match &inst.kind {
                    InstKind::Binary { op, left, right } => {
                        simplify_binary(*op, *left, *right, &inst.ty, &consts)
                    }
                    InstKind::Unary { op, operand } => {
                        simplify_unary(*op, consts.get(operand))
                    }
                    InstKind::Select {
                        cond,
                        true_val,
                        false_val,
                    } => simplify_select(*cond, *true_val, *false_val, &consts),
                    _ => None,
                };
                match simplified {
                    Some(Simplified::Value(v)) => {
                        replacements.insert(inst.result, v);
                        doomed.insert(inst.result);
                        changed = true;
                    }
                    Some(Simplified::Constant(c)) => {
                        inst.kind = InstKind::Constant(c);
                        changed = true;
                    }
                    Some(Simplified::Rewrite(kind)) => {
                        inst.kind = kind;
                        changed = true;
                    }
                    None => {}
                }
            }
        }

        if !replacements.is_empty() {
            // Close replacement chains before applying.
            let targets: Vec<ValueId> = replacements.keys().copied().collect();
            for from in targets {
                let mut to = replacements[&from];
                while let Some(next) = replacements.get(&to) {
                    to = *next;
                }
                replacements.insert(from, to);
            }
            for (from, to) in &replacements {
                func.replace_uses(*from, *to);
            }
            remove_defs(func, &doomed);
        }

        changed
    }
}

fn zero_of(ty: &Type) -> Option<ConstValue> {
    match ty {
        Type::Int(width) => Some(ConstValue::Int { value: 0, width: *width }),
        Type::Uint(width) => Some(ConstValue::Uint { value: 0, width: *width }),
        _ => None,
    }
}

fn simplify_binary(
    op: BinaryOp,
    left: ValueId,
    right: ValueId,
    ty: &Type,
    consts: &FxHashMap<ValueId, ConstValue>,
) -> Option<Simplified> {
    let lconst = consts.get(&left);
    let rconst = consts.get(&right);
    let l_zero = lconst.is_some_and(ConstValue::is_zero);
    let r_zero = rconst.is_some_and(ConstValue::is_zero);
    let l_one = lconst.is_some_and(ConstValue::is_one);
    let r_one = rconst.is_some_and(ConstValue::is_one);
    let l_ones = lconst.is_some_and(ConstValue::is_all_ones);
    let r_ones = rconst.is_some_and(ConstValue::is_all_ones);

    match op {
        BinaryOp::Add => {
            if r_zero {
                return Some(Simplified::Value(left));
            }
            if l_zero {
                return Some(Simplified::Value(right));
            }
        }
        BinaryOp::Sub => {
            if r_zero {
                return Some(Simplified::Value(left));
            }
            if left == right {
                return zero_of(ty).map(Simplified::Constant);
            }
        }
        BinaryOp::Mul => {
            if r_one {
                return Some(Simplified::Value(left));
            }
            if l_one {
                return Some(Simplified::Value(right));
            }
            if r_zero || l_zero {
                return zero_of(ty).map(Simplified::Constant);
            }
        }
        BinaryOp::Div => {
            if r_one {
                return Some(Simplified::Value(left));
            }
        }
        BinaryOp::BitAnd => {
            if r_zero || l_zero {
                return zero_of(ty).map(Simplified::Constant);
            }
            if r_ones {
                return Some(Simplified::Value(left));
            }
            if l_ones {
                return Some(Simplified::Value(right));
            }
            if left == right {
                return Some(Simplified::Value(left));
            }
        }
        BinaryOp::BitOr => {
            if r_zero {
                return Some(Simplified::Value(left));
            }
            if l_zero {
                return Some(Simplified::Value(right));
            }
            if left == right {
                return Some(Simplified::Value(left));
            }
        }
        BinaryOp::BitXor => {
            if r_zero {
                return Some(Simplified::Value(left));
            }
            if l_zero {
                return Some(Simplified::Value(right));
            }
            if left == right {
                return zero_of(ty).map(Simplified::Constant);
            }
        }
        BinaryOp::Shl | BinaryOp::Shr => {
            if r_zero {
                return Some(Simplified::Value(left));
            }
        }
        BinaryOp::Eq | BinaryOp::Le | BinaryOp::Ge => {
            if left == right {
                return Some(Simplified::Constant(ConstValue::Bool(true)));
            }
        }
        BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt => {
            if left == right {
                return Some(Simplified::Constant(ConstValue::Bool(false)));
            }
        }
        BinaryOp::And => {
            if left == right {
                return Some(Simplified::Value(left));
            }
        }
        BinaryOp::Or => {
            if left == right {
                return Some(Simplified::Value(left));
            }
        }
        BinaryOp::Mod => {}
    }
    None
}

fn simplify_unary(op: UnaryOp, constant: Option<&ConstValue>) -> Option<Simplified> {
    // Double negation and double not are handled by the peephole pass,
    // which sees the defining instruction. Here only constant operands.
    match (op, constant?) {
        (UnaryOp::Not, ConstValue::Bool(b)) => Some(Simplified::Constant(ConstValue::Bool(!b))),
        (UnaryOp::Neg, ConstValue::Int { value, width }) => value
            .checked_neg()
            .map(|value| Simplified::Constant(ConstValue::Int { value, width: *width })),
        _ => None,
    }
}

fn simplify_select(
    cond: ValueId,
    true_val: ValueId,
    false_val: ValueId,
    consts: &FxHashMap<ValueId, ConstValue>,
) -> Option<Simplified> {
    // Constant condition.
    if let Some(c) = consts.get(&cond).and_then(ConstValue::as_bool) {
        return Some(Simplified::Value(if c { true_val } else { false_val }));
    }
    // Equal branches.
    if true_val == false_val {
        return Some(Simplified::Value(true_val));
    }
    // Boolean branches: select(c, true, false) = c; the inverted form
    // becomes a not.
    let t = consts.get(&true_val).and_then(ConstValue::as_bool);
    let f = consts.get(&false_val).and_then(ConstValue::as_bool);
    match (t, f) {
        (Some(true), Some(false)) => Some(Simplified::Value(cond)),
        (Some(false), Some(true)) => Some(Simplified::Rewrite(InstKind::Unary {
            op: UnaryOp::Not,
            operand: cond,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use veldc_sem::Type;

    #[test]
    fn add_zero_collapses_to_operand() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        b.block();
        let zero = b.const_i32(0);
        let sum = b.binary(Type::I32, BinaryOp::Add, x, zero);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(InstSimplify.run_on_function(&mut func));
        // The add is gone and the return uses the parameter directly.
        assert!(func.def_of(sum).is_none());
        assert_eq!(
            func.blocks[0].terminator,
            Some(Terminator::Return(Some(x)))
        );
    }

    #[test]
    fn xor_with_self_becomes_zero() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        b.block();
        let xor = b.binary(Type::I32, BinaryOp::BitXor, x, x);
        b.terminate(Terminator::Return(Some(xor)));
        let mut func = b.build();

        assert!(InstSimplify.run_on_function(&mut func));
        assert!(matches!(
            &func.def_of(xor).unwrap().kind,
            InstKind::Constant(c) if c.is_zero()
        ));
    }

    #[test]
    fn self_comparison_folds() {
        let mut b = FunctionBuilder::new("f", Type::Bool);
        let x = b.param(Type::I32);
        b.block();
        let eq = b.binary(Type::Bool, BinaryOp::Eq, x, x);
        let lt = b.binary(Type::Bool, BinaryOp::Lt, x, x);
        let and = b.binary(Type::Bool, BinaryOp::And, eq, lt);
        b.terminate(Terminator::Return(Some(and)));
        let mut func = b.build();

        assert!(InstSimplify.run_on_function(&mut func));
        assert!(matches!(
            &func.def_of(eq).unwrap().kind,
            InstKind::Constant(ConstValue::Bool(true))
        ));
        assert!(matches!(
            &func.def_of(lt).unwrap().kind,
            InstKind::Constant(ConstValue::Bool(false))
        ));
    }

    #[test]
    fn select_with_boolean_branches_becomes_condition() {
        let mut b = FunctionBuilder::new("f", Type::Bool);
        let cond = b.param(Type::Bool);
        b.block();
        let t = b.const_bool(true);
        let f = b.const_bool(false);
        let sel = b.push(
            Type::Bool,
            InstKind::Select {
                cond,
                true_val: t,
                false_val: f,
            },
        );
        b.terminate(Terminator::Return(Some(sel)));
        let mut func = b.build();

        assert!(InstSimplify.run_on_function(&mut func));
        assert_eq!(
            func.blocks[0].terminator,
            Some(Terminator::Return(Some(cond)))
        );
    }

    #[test]
    fn select_with_inverted_booleans_becomes_not() {
        let mut b = FunctionBuilder::new("f", Type::Bool);
        let cond = b.param(Type::Bool);
        b.block();
        let t = b.const_bool(false);
        let f = b.const_bool(true);
        let sel = b.push(
            Type::Bool,
            InstKind::Select {
                cond,
                true_val: t,
                false_val: f,
            },
        );
        b.terminate(Terminator::Return(Some(sel)));
        let mut func = b.build();

        assert!(InstSimplify.run_on_function(&mut func));
        assert!(matches!(
            func.def_of(sel).unwrap().kind,
            InstKind::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn replacement_chains_are_closed() {
        // ((x + 0) + 0) collapses all the way to x.
        let mut b = FunctionBuilder::new("f", Type::I32);
        let x = b.param(Type::I32);
        b.block();
        let z1 = b.const_i32(0);
        let a = b.binary(Type::I32, BinaryOp::Add, x, z1);
        let z2 = b.const_i32(0);
        let c = b.binary(Type::I32, BinaryOp::Add, a, z2);
        b.terminate(Terminator::Return(Some(c)));
        let mut func = b.build();

        assert!(InstSimplify.run_on_function(&mut func));
        assert_eq!(
            func.blocks[0].terminator,
            Some(Terminator::Return(Some(x)))
        );
    }
}
