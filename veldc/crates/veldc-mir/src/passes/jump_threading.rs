//! Jump threading.
//!
//! When block A conditionally branches on `%c` to block B, and B is empty
//! and itself conditionally branches on the same `%c`, A's edge is
//! redirected straight to B's matching successor: the condition cannot
//! have changed in between.

use veldc_util::FxHashMap;

use crate::mir::{BlockId, Function, Terminator, ValueId};
use crate::pass::MirPass;

pub struct JumpThreading;

impl MirPass for JumpThreading {
    fn name(&self) -> &'static str {
        "jump-threading"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        // Empty blocks re-testing a condition: block -> (cond, then, else).
        let mut retests: FxHashMap<BlockId, (ValueId, BlockId, BlockId)> = FxHashMap::default();
        for block in &func.blocks {
            if !block.instructions.is_empty() {
                continue;
            }
            if let Some(Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            }) = &block.terminator
            {
                retests.insert(block.id, (*cond, *then_block, *else_block));
            }
        }
        if retests.is_empty() {
            return false;
        }

        let mut changed = false;
        for block in &mut func.blocks {
            let Some(Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            }) = &mut block.terminator
            else {
                continue;
            };
            // On the then edge the condition is known true; on the else
            // edge, known false.
            if let Some((retest_cond, retest_then, _)) = retests.get(then_block) {
                if retest_cond == cond && *retest_then != *then_block {
                    *then_block = *retest_then;
                    changed = true;
                }
            }
            if let Some((retest_cond, _, retest_else)) = retests.get(else_block) {
                if retest_cond == cond && *retest_else != *else_block {
                    *else_block = *retest_else;
                    changed = true;
                }
            }
        }

        if changed {
            func.recompute_cfg();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::validate::validate_function;
    use veldc_sem::Type;

    #[test]
    fn retested_condition_is_threaded() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let cond_param = b.param(Type::Bool);
        let entry = b.block();
        let retest = b.block();
        let truthy = b.block();
        let falsy = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::CondBranch {
            cond: cond_param,
            then_block: retest,
            else_block: falsy,
        });
        // retest re-checks the same condition with no instructions.
        b.switch_to(retest);
        b.terminate(Terminator::CondBranch {
            cond: cond_param,
            then_block: truthy,
            else_block: falsy,
        });
        b.switch_to(truthy);
        let one = b.const_i32(1);
        b.terminate(Terminator::Return(Some(one)));
        b.switch_to(falsy);
        let zero = b.const_i32(0);
        b.terminate(Terminator::Return(Some(zero)));
        let mut func = b.build();

        assert!(JumpThreading.run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());
        // The entry's then edge now skips the retest block.
        let Some(Terminator::CondBranch { then_block, .. }) =
            &func.block(entry).unwrap().terminator
        else {
            panic!("entry lost its conditional branch");
        };
        assert_eq!(*then_block, truthy);
    }

    #[test]
    fn different_condition_is_not_threaded() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let c1 = b.param(Type::Bool);
        let c2 = b.param(Type::Bool);
        let entry = b.block();
        let second = b.block();
        let a = b.block();
        let c = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::CondBranch {
            cond: c1,
            then_block: second,
            else_block: c,
        });
        b.switch_to(second);
        b.terminate(Terminator::CondBranch {
            cond: c2,
            then_block: a,
            else_block: c,
        });
        b.switch_to(a);
        let one = b.const_i32(1);
        b.terminate(Terminator::Return(Some(one)));
        b.switch_to(c);
        let zero = b.const_i32(0);
        b.terminate(Terminator::Return(Some(zero)));
        let mut func = b.build();

        assert!(!JumpThreading.run_on_function(&mut func));
    }

    #[test]
    fn non_empty_retest_block_is_kept() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let cond_param = b.param(Type::Bool);
        let entry = b.block();
        let retest = b.block();
        let a = b.block();
        let c = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::CondBranch {
            cond: cond_param,
            then_block: retest,
            else_block: c,
        });
        b.switch_to(retest);
        let _work = b.call(Type::Unit, "log_line", vec![]);
        b.terminate(Terminator::CondBranch {
            cond: cond_param,
            then_block: a,
            else_block: c,
        });
        b.switch_to(a);
        let one = b.const_i32(1);
        b.terminate(Terminator::Return(Some(one)));
        b.switch_to(c);
        let zero = b.const_i32(0);
        b.terminate(Terminator::Return(Some(zero)));
        let mut func = b.build();

        assert!(!JumpThreading.run_on_function(&mut func));
    }
}
