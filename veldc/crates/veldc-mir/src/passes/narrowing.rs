//! Narrowing.
//!
//! Folds `trunc(op(zext a, zext b))` back to `op(a, b)` when the truncated
//! width matches the original operand widths: the widening round-trip was
//! pointless for operations whose low bits do not depend on the high bits.

use veldc_util::FxHashMap;

use crate::mir::{BinaryOp, CastKind, Function, InstKind, ValueId};
use crate::pass::MirPass;

pub struct Narrowing;

/// Operations whose low result bits depend only on the low operand bits.
fn narrowable(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
    )
}

impl MirPass for Narrowing {
    fn name(&self) -> &'static str {
        "narrowing"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut defs: FxHashMap<ValueId, InstKind> = FxHashMap::default();
        for block in &func.blocks {
            for inst in &block.instructions {
                if inst.result.is_valid() {
                    defs.insert(inst.result, inst.kind.clone());
                }
            }
        }

        let mut changed = false;

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let InstKind::Cast {
                    kind: CastKind::Trunc,
                    target_ty,
                    operand,
                    ..
                } = &inst.kind
                else {
                    continue;
                };
                let Some(InstKind::Binary { op, left, right }) = defs.get(operand) else {
                    continue;
                };
                if !narrowable(*op) {
                    continue;
                }
                let (Some(l_def), Some(r_def)) = (defs.get(left), defs.get(right)) else {
                    continue;
                };
                let (
                    InstKind::Cast {
                        kind: CastKind::ZExt,
                        source_ty: l_src,
                        operand: l_orig,
                        ..
                    },
                    InstKind::Cast {
                        kind: CastKind::ZExt,
                        source_ty: r_src,
                        operand: r_orig,
                        ..
                    },
                ) = (l_def, r_def)
                else {
                    continue;
                };
                // The truncation must land back on the original width.
                if l_src != target_ty || r_src != target_ty {
                    continue;
                }
                inst.kind = InstKind::Binary {
                    op: *op,
                    left: *l_orig,
                    right: *r_orig,
                };
                changed = true;
            }
        }

        // The widening chain may now be dead; DCE mops it up so other
        // users of the wide values stay intact.
        changed
    }
}
