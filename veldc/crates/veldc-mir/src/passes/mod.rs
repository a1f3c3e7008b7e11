//! The optimization pass catalogue, one module per pass.

pub mod adce;
pub mod batch_destruction;
pub mod block_merge;
pub mod builder_opt;
pub mod const_hoist;
pub mod constant_folding;
pub mod constant_propagation;
pub mod constructor_fusion;
pub mod copy_propagation;
pub mod dce;
pub mod dead_arg_elim;
pub mod dead_function_elim;
pub mod dead_method_elim;
pub mod destination_propagation;
pub mod destructor_hoist;
pub mod devirtualization;
pub mod early_cse;
pub mod gvn;
pub mod inlining;
pub mod inst_simplify;
pub mod jump_threading;
pub mod licm;
pub mod load_store_opt;
pub mod loop_rotate;
pub mod loop_unroll;
pub mod match_simplify;
pub mod mem2reg;
pub mod merge_returns;
pub mod narrowing;
pub mod normalize_array_len;
pub mod peephole;
pub mod reassociate;
pub mod remove_unneeded_drops;
pub mod simplify_cfg;
pub mod simplify_select;
pub mod sinking;
pub mod sroa;
pub mod strength_reduction;
pub mod tail_call;
pub mod unreachable_elim;

use veldc_util::{FxHashMap, FxHashSet, Symbol};

use crate::mir::{ConstValue, Function, InstKind, ValueId};

/// Functions known to be free of side effects, so calls to them may be
/// removed when their result is unused.
const PURE_FUNCTIONS: &[&str] = &[
    "abs", "sqrt", "cbrt", "sin", "cos", "tan", "floor", "ceil", "round", "min", "max", "pow",
    "len", "contains", "starts_with", "ends_with", "to_upper", "to_lower", "char_at",
    "to_string", "parse_int", "parse_float",
];

pub(crate) fn is_pure_callee(callee: Symbol) -> bool {
    PURE_FUNCTIONS.contains(&callee.as_str())
}

/// Whether executing this instruction can be observed beyond its result.
///
/// `Await` is opaque: it may suspend and has side effects.
pub(crate) fn has_side_effects(kind: &InstKind) -> bool {
    match kind {
        InstKind::Store { .. } | InstKind::Await { .. } | InstKind::MethodCall { .. } => true,
        InstKind::Call { callee, .. } => !is_pure_callee(*callee),
        InstKind::Load { volatile, .. } => *volatile,
        InstKind::Alloca { volatile, .. } => *volatile,
        _ => false,
    }
}

/// Map from SSA value to its constant, for every `Constant` instruction.
pub(crate) fn constants(func: &Function) -> FxHashMap<ValueId, ConstValue> {
    let mut map = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let InstKind::Constant(value) = &inst.kind {
                map.insert(inst.result, value.clone());
            }
        }
    }
    map
}

/// Remove every instruction whose result is in `doomed`.
pub(crate) fn remove_defs(func: &mut Function, doomed: &FxHashSet<ValueId>) {
    if doomed.is_empty() {
        return;
    }
    for block in &mut func.blocks {
        block
            .instructions
            .retain(|inst| !inst.result.is_valid() || !doomed.contains(&inst.result));
    }
}

/// Use counts for every value in the function.
pub(crate) fn use_counts(func: &Function) -> FxHashMap<ValueId, usize> {
    let mut counts: FxHashMap<ValueId, usize> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            inst.kind.for_each_operand(|operand| {
                *counts.entry(operand).or_default() += 1;
            });
        }
        if let Some(term) = &block.terminator {
            term.for_each_operand(|operand| {
                *counts.entry(operand).or_default() += 1;
            });
        }
    }
    counts
}
