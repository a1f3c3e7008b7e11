//! Destination propagation.
//!
//! An alloca used exactly once as a store target and exactly once as a load
//! source, with the store preceding the load in the same block and nothing
//! that could touch the slot in between, forwards the stored value and
//! drops all three instructions. Volatile memory operations are never
//! touched, and any call between the store and the load disqualifies the
//! pair, because the address may have escaped through it.

use veldc_util::FxHashSet;

use crate::mir::{Function, InstKind, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct DestinationPropagation;

impl MirPass for DestinationPropagation {
    fn name(&self) -> &'static str {
        "destination-propagation"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;

        // Allocas with exactly one store and one load, both non-volatile.
        let mut candidates: Vec<ValueId> = Vec::new();
        for block in &func.blocks {
            for inst in &block.instructions {
                if matches!(
                    inst.kind,
                    InstKind::Alloca {
                        volatile: false,
                        ..
                    }
                ) {
                    candidates.push(inst.result);
                }
            }
        }

        for alloca in candidates {
            let mut store_site: Option<(usize, usize, ValueId, bool)> = None;
            let mut load_site: Option<(usize, usize, ValueId, bool)> = None;
            let mut other_use = false;
            let mut multiple = false;

            for (block_index, block) in func.blocks.iter().enumerate() {
                for (inst_index, inst) in block.instructions.iter().enumerate() {
                    match &inst.kind {
                        InstKind::Store {
                            ptr,
                            value,
                            volatile,
                        } if *ptr == alloca => {
                            if store_site.is_some() {
                                multiple = true;
                            }
                            store_site = Some((block_index, inst_index, *value, *volatile));
                        }
                        InstKind::Load { ptr, volatile } if *ptr == alloca => {
                            if load_site.is_some() {
                                multiple = true;
                            }
                            load_site = Some((block_index, inst_index, inst.result, *volatile));
                        }
                        other if other_mentions(other, alloca) => other_use = true,
                        _ => {}
                    }
                }
                if let Some(term) = &block.terminator {
                    term.for_each_operand(|operand| {
                        if operand == alloca {
                            other_use = true;
                        }
                    });
                }
            }

            let (Some((store_block, store_index, stored, store_volatile)), Some((
                load_block,
                load_index,
                loaded,
                load_volatile,
            ))) = (store_site, load_site)
            else {
                continue;
            };
            if multiple
                || other_use
                || store_volatile
                || load_volatile
                || store_block != load_block
                || store_index >= load_index
            {
                continue;
            }

            // Nothing between the store and the load may observe or clobber
            // the slot. The conservative line: no calls (the address could
            // have escaped through one earlier), no other stores, no await.
            let between =
                &func.blocks[store_block].instructions[store_index + 1..load_index];
            let blocked = between.iter().any(|inst| {
                matches!(
                    inst.kind,
                    InstKind::Call { .. }
                        | InstKind::MethodCall { .. }
                        | InstKind::Await { .. }
                        | InstKind::Store { .. }
                )
            });
            if blocked {
                continue;
            }

            func.replace_uses(loaded, stored);
            let block = &mut func.blocks[store_block];
            block.instructions.remove(load_index);
            block.instructions.remove(store_index);
            let mut doomed = FxHashSet::default();
            doomed.insert(alloca);
            remove_defs(func, &doomed);
            changed = true;
        }

        changed
    }
}

fn other_mentions(kind: &InstKind, alloca: ValueId) -> bool {
    let mut found = false;
    kind.for_each_operand(|operand| {
        if operand == alloca {
            found = true;
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use veldc_sem::Type;

    #[test]
    fn single_store_load_pair_is_forwarded() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let slot = b.alloca(Type::I32);
        let v = b.const_i32(3);
        b.push_store(slot, v);
        let loaded = b.load(Type::I32, slot);
        b.terminate(Terminator::Return(Some(loaded)));
        let mut func = b.build();

        assert!(DestinationPropagation.run_on_function(&mut func));
        assert_eq!(func.instruction_count(), 1);
        assert_eq!(
            func.blocks[0].terminator,
            Some(Terminator::Return(Some(v)))
        );
    }

    #[test]
    fn call_in_between_blocks_propagation() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let slot = b.alloca(Type::I32);
        let v = b.const_i32(3);
        b.push_store(slot, v);
        let _effect = b.call(Type::Unit, "opaque", vec![]);
        let loaded = b.load(Type::I32, slot);
        b.terminate(Terminator::Return(Some(loaded)));
        let mut func = b.build();

        assert!(!DestinationPropagation.run_on_function(&mut func));
    }

    #[test]
    fn two_loads_disqualify() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let slot = b.alloca(Type::I32);
        let v = b.const_i32(3);
        b.push_store(slot, v);
        let first = b.load(Type::I32, slot);
        let second = b.load(Type::I32, slot);
        let sum = b.binary(Type::I32, crate::mir::BinaryOp::Add, first, second);
        b.terminate(Terminator::Return(Some(sum)));
        let mut func = b.build();

        assert!(!DestinationPropagation.run_on_function(&mut func));
    }

    #[test]
    fn escaped_address_disqualifies() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let slot = b.alloca(Type::I32);
        let _r = b.call(Type::Unit, "stash", vec![slot]);
        let v = b.const_i32(3);
        b.push_store(slot, v);
        let loaded = b.load(Type::I32, slot);
        b.terminate(Terminator::Return(Some(loaded)));
        let mut func = b.build();

        assert!(!DestinationPropagation.run_on_function(&mut func));
    }
}
