//! Dead function elimination.
//!
//! Entry points are `main` and anything tagged `test`, `bench`, `fuzz`,
//! `export`, or `inline`. Reachability runs over the call graph built from
//! direct calls (method calls and closure references conservatively keep
//! their targets); everything unreachable is deleted.

use veldc_util::{FxHashSet, Symbol};

use crate::mir::{FnAttr, InstKind, Module};
use crate::pass::MirPass;

pub struct DeadFunctionElimination;

fn is_entry_point(func: &crate::mir::Function) -> bool {
    func.name.as_str() == "main"
        || func.has_attr(FnAttr::Test)
        || func.has_attr(FnAttr::Bench)
        || func.has_attr(FnAttr::Fuzz)
        || func.has_attr(FnAttr::Export)
        || func.has_attr(FnAttr::Inline)
        || func.has_attr(FnAttr::Extern)
}

impl MirPass for DeadFunctionElimination {
    fn name(&self) -> &'static str {
        "dead-function-elimination"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let mut reachable: FxHashSet<Symbol> = FxHashSet::default();
        let mut worklist: Vec<Symbol> = module
            .functions
            .iter()
            .filter(|f| is_entry_point(f))
            .map(|f| f.name)
            .collect();

        while let Some(name) = worklist.pop() {
            if !reachable.insert(name) {
                continue;
            }
            let Some(func) = module.function(name) else {
                continue;
            };
            for block in &func.blocks {
                for inst in &block.instructions {
                    match &inst.kind {
                        InstKind::Call { callee, .. } => {
                            if !reachable.contains(callee) {
                                worklist.push(*callee);
                            }
                        }
                        // A virtual dispatch may land on any "{Class}_{m}"
                        // implementation; method-level pruning is the
                        // dead-method pass's job, so every plausible
                        // target stays reachable here.
                        InstKind::MethodCall { method, .. } => {
                            let suffix = format!("_{}", method.as_str());
                            for f in &module.functions {
                                if f.name.as_str().ends_with(&suffix)
                                    && !reachable.contains(&f.name)
                                {
                                    worklist.push(f.name);
                                }
                            }
                        }
                        InstKind::ClosureInit { function, .. } => {
                            if !reachable.contains(function) {
                                worklist.push(*function);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let before = module.functions.len();
        module.functions.retain(|f| reachable.contains(&f.name));
        module.functions.len() != before
    }
}
