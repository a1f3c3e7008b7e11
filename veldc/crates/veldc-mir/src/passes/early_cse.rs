//! Early (block-local) common subexpression elimination.
//!
//! Hashes eligible instructions by operation and operand ids, with
//! commutative operand pairs sorted so `a+b` and `b+a` collide. Duplicates
//! reuse the first-seen result. Loads, stores, and calls are never CSE'd;
//! memory-aware reuse is GVN's job.

use veldc_sem::Type;
use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{BinaryOp, CastKind, ConstValue, Function, GepIndex, InstKind, UnaryOp, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct EarlyCse;

/// Hashable shape of a CSE-eligible instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ExprKey {
    Binary(BinaryOp, ValueId, ValueId),
    Unary(UnaryOp, ValueId),
    Cast(CastKind, Type, ValueId),
    Gep(ValueId, Vec<GepIndex>),
    ExtractValue(ValueId, Vec<u32>),
    Constant(ConstKey),
}

/// Constants need a hashable mirror because floats are not `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ConstKey {
    Int(i64, u32),
    Uint(u64, u32),
    Float(u64, bool),
    Bool(bool),
    Char(char),
    Str(veldc_util::Symbol),
    Unit,
}

pub(crate) fn expr_key(kind: &InstKind, target_ty: &Type) -> Option<ExprKey> {
    Some(match kind {
        InstKind::Binary { op, left, right } => {
            let (a, b) = if op.is_commutative() && right < left {
                (*right, *left)
            } else {
                (*left, *right)
            };
            ExprKey::Binary(*op, a, b)
        }
        InstKind::Unary { op, operand } => ExprKey::Unary(*op, *operand),
        InstKind::Cast { kind, operand, .. } => {
            ExprKey::Cast(*kind, target_ty.clone(), *operand)
        }
        InstKind::Gep { base, indices } => ExprKey::Gep(*base, indices.clone()),
        InstKind::ExtractValue { aggregate, indices } => {
            ExprKey::ExtractValue(*aggregate, indices.clone())
        }
        InstKind::Constant(c) => ExprKey::Constant(match c {
            ConstValue::Int { value, width } => ConstKey::Int(*value, width.bits()),
            ConstValue::Uint { value, width } => ConstKey::Uint(*value, width.bits()),
            ConstValue::Float { value, is_f64 } => ConstKey::Float(value.to_bits(), *is_f64),
            ConstValue::Bool(b) => ConstKey::Bool(*b),
            ConstValue::Char(c) => ConstKey::Char(*c),
            ConstValue::Str(s) => ConstKey::Str(*s),
            ConstValue::Unit => ConstKey::Unit,
        }),
        _ => return None,
    })
}

impl MirPass for EarlyCse {
    fn name(&self) -> &'static str {
        "early-cse"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;
        let mut replacements: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();

        for block in &mut func.blocks {
            let mut seen: FxHashMap<ExprKey, ValueId> = FxHashMap::default();
            for inst in &block.instructions {
                if !inst.result.is_valid() {
                    continue;
                }
                let Some(key) = expr_key(&inst.kind, &inst.ty) else {
                    continue;
                };
                match seen.get(&key) {
                    Some(first) => {
                        replacements.insert(inst.result, *first);
                        doomed.insert(inst.result);
                        changed = true;
                    }
                    None => {
                        seen.insert(key, inst.result);
                    }
                }
            }
        }

        for (from, to) in &replacements {
            func.replace_uses(*from, *to);
        }
        remove_defs(func, &doomed);
        changed
    }
}
