//! Dead argument elimination.
//!
//! An internal function (not exported, not `main`, not extern) whose
//! parameter is never referenced in its body loses that parameter, and
//! every call site drops the matching argument. Only applies when all call
//! sites are visible: a function whose address escapes through a closure
//! or that is the target of virtual dispatch is left alone.

use veldc_util::{FxHashMap, FxHashSet, Symbol};

use crate::mir::{FnAttr, InstKind, Module};
use crate::pass::MirPass;

pub struct DeadArgElimination;

impl MirPass for DeadArgElimination {
    fn name(&self) -> &'static str {
        "dead-arg-elimination"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        // Functions whose call sites are not all visible as direct calls.
        let mut address_taken: FxHashSet<Symbol> = FxHashSet::default();
        for func in &module.functions {
            for block in &func.blocks {
                for inst in &block.instructions {
                    match &inst.kind {
                        InstKind::ClosureInit { function, .. } => {
                            address_taken.insert(*function);
                        }
                        InstKind::MethodCall { method, .. } => {
                            // Any "{Class}_{method}" may be a dispatch
                            // target.
                            let suffix = format!("_{}", method.as_str());
                            for f in &module.functions {
                                if f.name.as_str().ends_with(&suffix) {
                                    address_taken.insert(f.name);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Dead parameter positions per eligible function.
        let mut dead_params: FxHashMap<Symbol, Vec<usize>> = FxHashMap::default();
        for func in &module.functions {
            if func.name.as_str() == "main"
                || func.has_attr(FnAttr::Export)
                || func.has_attr(FnAttr::Extern)
                || address_taken.contains(&func.name)
                || func.blocks.is_empty()
            {
                continue;
            }
            let dead: Vec<usize> = func
                .params
                .iter()
                .enumerate()
                .filter(|(_, (param, _))| func.count_uses(*param) == 0)
                .map(|(position, _)| position)
                .collect();
            if !dead.is_empty() {
                dead_params.insert(func.name, dead);
            }
        }
        if dead_params.is_empty() {
            return false;
        }

        // Shrink the signatures.
        for func in &mut module.functions {
            if let Some(dead) = dead_params.get(&func.name) {
                let mut position = 0;
                func.params.retain(|_| {
                    let keep = !dead.contains(&position);
                    position += 1;
                    keep
                });
            }
        }
        // Shrink every call site.
        for func in &mut module.functions {
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    let InstKind::Call { callee, args, .. } = &mut inst.kind else {
                        continue;
                    };
                    if let Some(dead) = dead_params.get(callee) {
                        let mut position = 0;
                        args.retain(|_| {
                            let keep = !dead.contains(&position);
                            position += 1;
                            keep
                        });
                    }
                }
            }
        }
        true
    }
}
