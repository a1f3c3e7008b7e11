//! MIR invariant checker.
//!
//! Verifies the structural invariants every pass must preserve:
//!
//! - SSA: every value is defined exactly once
//! - dominance: every use is dominated by its definition
//! - terminator uniqueness: every block has exactly one terminator
//! - phi placement: phis are contiguous at the top of a block, with exactly
//!   one incoming entry per predecessor
//! - pred/succ consistency with the terminators
//!
//! A violation after a pass means the pass is at fault; tests run the
//! validator after every transformation.

use veldc_util::{FxHashMap, FxHashSet};

use crate::analysis::cfg::ControlFlowGraph;
use crate::mir::{Function, InstKind, Module, ValueId};

/// One invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub function: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.function, self.message)
    }
}

/// Validate a whole module.
pub fn validate_module(module: &Module) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for func in &module.functions {
        if let Err(mut e) = validate_function(func) {
            errors.append(&mut e);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one function.
pub fn validate_function(func: &Function) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let name = func.name.as_str().to_string();
    let mut err = |message: String| {
        errors.push(ValidationError {
            function: name.clone(),
            message,
        });
    };

    // SSA: single definition per value.
    let mut defs: FxHashMap<ValueId, usize> = FxHashMap::default();
    for (param, _) in &func.params {
        *defs.entry(*param).or_default() += 1;
    }
    for block in &func.blocks {
        for inst in &block.instructions {
            if inst.result.is_valid() {
                *defs.entry(inst.result).or_default() += 1;
            } else if !matches!(inst.kind, InstKind::Store { .. }) {
                err(format!("instruction without result is not a store: {:?}", inst.kind));
            }
        }
    }
    for (value, count) in &defs {
        if *count > 1 {
            err(format!("value {value:?} defined {count} times"));
        }
    }

    // Terminators and phi placement.
    for block in &func.blocks {
        match &block.terminator {
            None => err(format!("block {:?} has no terminator", block.id)),
            Some(_) => {}
        }
        let first_non_phi = block.first_non_phi();
        for inst in &block.instructions[first_non_phi..] {
            if inst.kind.is_phi() {
                err(format!(
                    "phi after non-phi instruction in block {:?}",
                    block.id
                ));
            }
        }
    }

    // Pred/succ consistency.
    for block in &func.blocks {
        let targets = block
            .terminator
            .as_ref()
            .map(|t| t.targets())
            .unwrap_or_default();
        for target in &targets {
            let Some(succ) = func.block(*target) else {
                err(format!(
                    "block {:?} targets missing block {:?}",
                    block.id, target
                ));
                continue;
            };
            if !succ.preds.contains(&block.id) {
                err(format!(
                    "edge {:?} -> {:?} missing from predecessor list",
                    block.id, target
                ));
            }
        }
        for succ in &block.succs {
            if !targets.contains(succ) {
                err(format!(
                    "successor list of {:?} mentions {:?} but terminator does not",
                    block.id, succ
                ));
            }
        }
    }

    // Phi incoming entries: one per predecessor, each from a real pred.
    for block in &func.blocks {
        for inst in &block.instructions {
            let InstKind::Phi { incomings } = &inst.kind else {
                continue;
            };
            let mut seen = FxHashSet::default();
            for (_, pred) in incomings {
                if !block.preds.contains(pred) {
                    err(format!(
                        "phi in {:?} has incoming from non-predecessor {:?}",
                        block.id, pred
                    ));
                }
                if !seen.insert(*pred) {
                    err(format!(
                        "phi in {:?} has duplicate incoming for {:?}",
                        block.id, pred
                    ));
                }
            }
            for pred in &block.preds {
                if !seen.contains(pred) {
                    err(format!(
                        "phi in {:?} missing incoming for predecessor {:?}",
                        block.id, pred
                    ));
                }
            }
        }
    }

    // Dominance: every use dominated by its definition.
    let cfg = ControlFlowGraph::new(func);
    let mut def_block: FxHashMap<ValueId, crate::mir::BlockId> = FxHashMap::default();
    let mut def_index: FxHashMap<ValueId, usize> = FxHashMap::default();
    for block in &func.blocks {
        for (idx, inst) in block.instructions.iter().enumerate() {
            if inst.result.is_valid() {
                def_block.insert(inst.result, block.id);
                def_index.insert(inst.result, idx);
            }
        }
    }
    let params: FxHashSet<ValueId> = func.params.iter().map(|(p, _)| *p).collect();
    let reachable = cfg.reachable();

    for block in &func.blocks {
        if !reachable.contains(&block.id) {
            continue;
        }
        for (idx, inst) in block.instructions.iter().enumerate() {
            if let InstKind::Phi { incomings } = &inst.kind {
                // Phi operands must be available at the end of the
                // incoming edge, not at the phi itself.
                for (value, pred) in incomings {
                    if params.contains(value) || !value.is_valid() {
                        continue;
                    }
                    match def_block.get(value) {
                        Some(d) if cfg.dominates(*d, *pred) => {}
                        Some(d) => err(format!(
                            "phi operand {value:?} (defined in {d:?}) does not dominate edge from {pred:?}",
                        )),
                        None => err(format!("phi operand {value:?} has no definition")),
                    }
                }
                continue;
            }
            inst.kind.for_each_operand(|value| {
                if params.contains(&value) || !value.is_valid() {
                    return;
                }
                match def_block.get(&value) {
                    Some(d) if *d == block.id => {
                        if def_index[&value] >= idx {
                            err(format!(
                                "use of {value:?} in {:?} precedes its definition",
                                block.id
                            ));
                        }
                    }
                    Some(d) if cfg.dominates(*d, block.id) => {}
                    Some(d) => err(format!(
                        "use of {value:?} in {:?} not dominated by definition in {d:?}",
                        block.id
                    )),
                    None => err(format!("use of undefined value {value:?}")),
                }
            });
        }
        if let Some(term) = &block.terminator {
            term.for_each_operand(|value| {
                if params.contains(&value) || !value.is_valid() {
                    return;
                }
                match def_block.get(&value) {
                    Some(d) if *d == block.id || cfg.dominates(*d, block.id) => {}
                    Some(d) => err(format!(
                        "terminator of {:?} uses {value:?} not dominated by {d:?}",
                        block.id
                    )),
                    None => err(format!("terminator uses undefined value {value:?}")),
                }
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
