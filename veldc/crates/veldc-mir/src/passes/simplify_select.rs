//! Select simplification.
//!
//! The select identities from instruction simplification, split out to run
//! again after copy propagation has collapsed the operands and exposed
//! more cases: constant conditions, equal branches, and boolean-branch
//! selects.

use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{ConstValue, Function, InstKind, UnaryOp, ValueId};
use crate::pass::MirPass;
use crate::passes::{constants, remove_defs};

pub struct SimplifySelect;

impl MirPass for SimplifySelect {
    fn name(&self) -> &'static str {
        "simplify-select"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let mut changed = false;
        let mut replacements: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let InstKind::Select {
                    cond,
                    true_val,
                    false_val,
                } = inst.kind
                else {
                    continue;
                };

                if let Some(c) = consts.get(&cond).and_then(ConstValue::as_bool) {
                    let chosen = if c { true_val } else { false_val };
                    replacements.insert(inst.result, chosen);
                    doomed.insert(inst.result);
                    changed = true;
                    continue;
                }
                if true_val == false_val {
                    replacements.insert(inst.result, true_val);
                    doomed.insert(inst.result);
                    changed = true;
                    continue;
                }
                let t = consts.get(&true_val).and_then(ConstValue::as_bool);
                let f = consts.get(&false_val).and_then(ConstValue::as_bool);
                match (t, f) {
                    (Some(true), Some(false)) => {
                        replacements.insert(inst.result, cond);
                        doomed.insert(inst.result);
                        changed = true;
                    }
                    (Some(false), Some(true)) => {
                        inst.kind = InstKind::Unary {
                            op: UnaryOp::Not,
                            operand: cond,
                        };
                        changed = true;
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
