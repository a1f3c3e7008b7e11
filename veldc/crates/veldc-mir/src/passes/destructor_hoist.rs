//! Destructor hoisting.
//!
//! A loop that constructs an object at the top of its body and drops it at
//! the bottom re-does allocation work every iteration. When the object
//! never escapes the body and its class has a `reset` method, the
//! construction moves to the preheader, the body calls `reset` where the
//! construction used to be, and a single drop runs after the loop's exit.

use veldc_sem::Type;
use veldc_util::Symbol;

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::loops::find_natural_loops;
use crate::mir::{Function, InstKind, Instruction, Module, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_unneeded_drops::dropped_type_of;

pub struct DestructorHoist;

impl MirPass for DestructorHoist {
    fn name(&self) -> &'static str {
        "destructor-hoist"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        // A class is resettable when its monomorphized reset method is in
        // the module.
        let resettable: Vec<Symbol> = module
            .functions
            .iter()
            .filter_map(|f| f.name.as_str().strip_suffix("_reset"))
            .map(Symbol::intern)
            .collect();
        if resettable.is_empty() {
            return false;
        }

        let mut changed = false;
        for func in &mut module.functions {
            changed |= hoist_in(func, &resettable);
        }
        changed
    }
}

fn hoist_in(func: &mut Function, resettable: &[Symbol]) -> bool {
    let cfg = ControlFlowGraph::new(func);
    let loops = find_natural_loops(func, &cfg);
    let mut changed = false;

    for natural_loop in &loops {
        let Some(preheader) = natural_loop.preheader(&cfg) else {
            continue;
        };
        let exits = natural_loop.exit_targets(&cfg);
        let [exit] = exits.as_slice() else {
            continue;
        };
        let exit = *exit;

        // Find a body block that constructs at its top and drops the same
        // object at its bottom.
        let mut plan: Option<(usize, usize, usize, ValueId, Symbol)> = None;
        for (block_index, block) in func.blocks.iter().enumerate() {
            if !natural_loop.contains(block.id) || block.id == natural_loop.header {
                continue;
            }
            let Some(ctor_index) = block.instructions.iter().position(|inst| {
                matches!(&inst.kind, InstKind::Call { callee, .. }
                    if callee.as_str().ends_with("_new"))
            }) else {
                continue;
            };
            let ctor = &block.instructions[ctor_index];
            let InstKind::Call { callee, .. } = &ctor.kind else {
                continue;
            };
            let class = Symbol::intern(callee.as_str().strip_suffix("_new").unwrap());
            if !resettable.contains(&class) {
                continue;
            }
            let obj = ctor.result;

            let Some(drop_index) = block.instructions.iter().rposition(|inst| {
                matches!(&inst.kind, InstKind::Call { callee, args, .. }
                    if dropped_type_of(*callee) == Some(class) && args.as_slice() == [obj])
            }) else {
                continue;
            };
            if drop_index <= ctor_index {
                continue;
            }

            // The object must stay inside the loop: every use is a load,
            // store, gep, reset-style method, or the drop itself, and
            // nothing passes it onward.
            let escapes = func.blocks.iter().any(|b| {
                b.instructions.iter().any(|inst| match &inst.kind {
                    InstKind::Call { callee, args, .. } => {
                        args.contains(&obj)
                            && dropped_type_of(*callee) != Some(class)
                            && !callee.as_str().ends_with("_new")
                            && *callee != Symbol::intern(&format!("{}_reset", class.as_str()))
                            && !callee.as_str().starts_with(class.as_str())
                    }
                    InstKind::Store { value, .. } => *value == obj,
                    InstKind::ClosureInit { captures, .. } => captures.contains(&obj),
                    _ => false,
                })
            });
            if escapes {
                continue;
            }

            plan = Some((block_index, ctor_index, drop_index, obj, class));
            break;
        }

        let Some((block_index, ctor_index, drop_index, obj, class)) = plan else {
            continue;
        };

        // Move the constructor to the preheader.
        let ctor_inst = func.blocks[block_index].instructions.remove(ctor_index);
        // The drop index shifted down by one.
        let drop_inst = func.blocks[block_index]
            .instructions
            .remove(drop_index - 1);

        // Construction happens once before the loop.
        let preheader_block = func.block_mut(preheader).expect("preheader exists");
        preheader_block.instructions.push(ctor_inst);

        // The body resets instead of reconstructing.
        let reset = Symbol::intern(&format!("{}_reset", class.as_str()));
        let reset_inst = Instruction::new(
            ValueId::INVALID,
            Type::Unit,
            InstKind::Call {
                callee: reset,
                args: vec![obj],
                tail_call: false,
            },
        );
        func.blocks[block_index]
            .instructions
            .insert(ctor_index, reset_inst);

        // One drop after the loop.
        let exit_block = func.block_mut(exit).expect("exit exists");
        let insert_at = exit_block.first_non_phi();
        exit_block.instructions.insert(insert_at, drop_inst);

        changed = true;
    }

    changed
}
