//! Builder-pattern optimization.
//!
//! Detects `obj.set_a(..).set_b(..).build()` chains where every
//! intermediate method returns the receiver type. The intermediate
//! allocations those chains spill into are eliminable: a store of one
//! link's result immediately reloaded as the next link's receiver
//! forwards directly, and the slot disappears once nothing else touches
//! it.

use veldc_util::FxHashSet;

use crate::mir::{Function, InstKind, Module, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

#[derive(Default)]
pub struct BuilderOpt {
    /// Chains recognized across the module, for statistics.
    pub chains_optimized: usize,
}

impl MirPass for BuilderOpt {
    fn name(&self) -> &'static str {
        "builder-opt"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let mut changed = false;
        for func in &mut module.functions {
            let (func_changed, chains) = elide_chain_spills(func);
            changed |= func_changed;
            self.chains_optimized += chains;
        }
        changed
    }
}

/// A link in a builder chain: a method call whose result type equals its
/// receiver type.
fn is_chain_link(kind: &InstKind, result_ty: &veldc_sem::Type) -> bool {
    match kind {
        InstKind::MethodCall { receiver_ty, .. } => receiver_ty == result_ty,
        _ => false,
    }
}

fn elide_chain_spills(func: &mut Function) -> (bool, usize) {
    let mut changed = false;
    let mut chains = 0;

    for block_index in 0..func.blocks.len() {
        // Pattern per window: link; store link -> slot; reload slot;
        // next link on the reload.
        loop {
            let mut rewrite: Option<(usize, usize, ValueId, ValueId, ValueId)> = None;
            {
                let block = &func.blocks[block_index];
                for index in 0..block.instructions.len().saturating_sub(2) {
                    let link = &block.instructions[index];
                    if !is_chain_link(&link.kind, &link.ty) {
                        continue;
                    }
                    let InstKind::Store {
                        ptr,
                        value,
                        volatile: false,
                    } = &block.instructions[index + 1].kind
                    else {
                        continue;
                    };
                    if *value != link.result {
                        continue;
                    }
                    let reload = &block.instructions[index + 2];
                    let InstKind::Load {
                        ptr: load_ptr,
                        volatile: false,
                    } = &reload.kind
                    else {
                        continue;
                    };
                    if load_ptr != ptr {
                        continue;
                    }
                    rewrite = Some((
                        index + 1,
                        index + 2,
                        *ptr,
                        link.result,
                        reload.result,
                    ));
                    break;
                }
            }
            let Some((store_index, load_index, slot, link_result, reload_result)) = rewrite
            else {
                break;
            };

            func.replace_uses(reload_result, link_result);
            let block = &mut func.blocks[block_index];
            block.instructions.remove(load_index);
            block.instructions.remove(store_index);
            changed = true;
            chains += 1;

            // With the spill gone the slot may be fully dead.
            if func.count_uses(slot) == 0 {
                let mut doomed = FxHashSet::default();
                doomed.insert(slot);
                remove_defs(func, &doomed);
            }
        }
    }

    (changed, chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use veldc_sem::Type;
    use veldc_util::Symbol;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    #[test]
    fn spilled_builder_chain_forwards_directly() {
        let widget_ty = Type::named(sym("WidgetBuilder"));
        let mut b = FunctionBuilder::new("make", widget_ty.clone());
        let start = b.param(widget_ty.clone());
        b.block();
        let slot = b.alloca(widget_ty.clone());
        let size = b.const_i32(10);
        let with_size = b.push(
            widget_ty.clone(),
            InstKind::MethodCall {
                receiver: start,
                receiver_ty: widget_ty.clone(),
                method: sym("set_size"),
                args: vec![size],
                tail_call: false,
            },
        );
        b.push_store(slot, with_size);
        let reloaded = b.load(widget_ty.clone(), slot);
        let built = b.push(
            widget_ty.clone(),
            InstKind::MethodCall {
                receiver: reloaded,
                receiver_ty: widget_ty.clone(),
                method: sym("build"),
                args: vec![],
                tail_call: false,
            },
        );
        b.terminate(Terminator::Return(Some(built)));
        let mut func = b.build();

        let mut module = Module::new();
        module.functions.push(func);
        let mut pass = BuilderOpt::default();
        assert!(pass.run_on_module(&mut module));
        assert_eq!(pass.chains_optimized, 1);

        func = module.functions.pop().unwrap();
        // The spill is gone: no store, no load, no alloca.
        assert!(!func.blocks[0].instructions.iter().any(|i| matches!(
            i.kind,
            InstKind::Store { .. } | InstKind::Load { .. } | InstKind::Alloca { .. }
        )));
        // The build call's receiver is the setter's result.
        let receiver = func
            .blocks[0]
            .instructions
            .iter()
            .find_map(|i| match &i.kind {
                InstKind::MethodCall { receiver, method, .. }
                    if *method == sym("build") =>
                {
                    Some(*receiver)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(receiver, with_size);
    }

    #[test]
    fn non_chain_store_load_is_untouched() {
        // The stored value is not a chain link, so nothing happens.
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let slot = b.alloca(Type::I32);
        let v = b.const_i32(3);
        b.push_store(slot, v);
        let loaded = b.load(Type::I32, slot);
        b.terminate(Terminator::Return(Some(loaded)));
        let mut module = Module::new();
        module.functions.push(b.build());

        let mut pass = BuilderOpt::default();
        assert!(!pass.run_on_module(&mut module));
    }
}
