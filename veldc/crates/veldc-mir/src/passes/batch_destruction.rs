//! Batched element destruction.
//!
//! A straight-line run of `<T>_drop(array[i])` calls over consecutive
//! indices of the same base array collapses into one call:
//!
//! - `<T>_batch_drop(array, n)` for runs of at least 3 elements
//! - a single bulk free for runs of at least 4 elements whose destructor
//!   is trivial (no user-defined drop method)

use veldc_sem::{IntWidth, Type};
use veldc_util::{FxHashMap, Symbol};

use crate::mir::{
    ConstValue, Function, GepIndex, InstKind, Instruction, Module, ValueId,
};
use crate::pass::MirPass;
use crate::passes::remove_unneeded_drops::{dropped_type_of, DropInfo};

pub struct BatchDestruction {
    info: DropInfo,
}

impl BatchDestruction {
    pub fn new(info: DropInfo) -> Self {
        Self { info }
    }
}

const BATCH_MIN: usize = 3;
const BULK_FREE_MIN: usize = 4;

struct DropRun {
    /// Index of the first drop call in the block.
    start: usize,
    /// Number of consecutive drop calls.
    len: usize,
    base: ValueId,
    dropped: Symbol,
    callee_base: Symbol,
}

impl MirPass for BatchDestruction {
    fn name(&self) -> &'static str {
        "batch-destruction"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let mut changed = false;
        // Trivial destructor = the type has no user-defined drop method.
        let trivially_destructible: FxHashMap<Symbol, bool> = module
            .structs
            .iter()
            .map(|s| (s.name, !self.info.has_user_drop(s.name)))
            .collect();

        for func in &mut module.functions {
            changed |= rewrite_runs(func, &trivially_destructible);
        }
        changed
    }
}

fn rewrite_runs(
    func: &mut Function,
    trivially_destructible: &FxHashMap<Symbol, bool>,
) -> bool {
    let mut changed = false;

    // Element geps: result -> (base, constant index).
    let mut element_of: FxHashMap<ValueId, (ValueId, u64)> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let InstKind::Gep { base, indices } = &inst.kind {
                if let [GepIndex::Const(i)] = indices.as_slice() {
                    element_of.insert(inst.result, (*base, *i));
                }
            }
        }
    }

    for block_index in 0..func.blocks.len() {
        loop {
            let Some(run) = find_run(&func.blocks[block_index], &element_of) else {
                break;
            };

            let trivial = trivially_destructible
                .get(&run.dropped)
                .copied()
                .unwrap_or(false);

            let replacement_callee = if trivial && run.len >= BULK_FREE_MIN {
                Symbol::intern(&format!("{}_bulk_free", run.callee_base))
            } else if run.len >= BATCH_MIN {
                Symbol::intern(&format!("{}_batch_drop", run.callee_base))
            } else {
                break;
            };

            let count = func.new_value_id();
            let count_inst = Instruction::new(
                count,
                Type::Uint(IntWidth::W64),
                InstKind::Constant(ConstValue::Uint {
                    value: run.len as u64,
                    width: IntWidth::W64,
                }),
            );
            let call = Instruction::new(
                ValueId::INVALID,
                Type::Unit,
                InstKind::Call {
                    callee: replacement_callee,
                    args: vec![run.base, count],
                    tail_call: false,
                },
            );

            let block = &mut func.blocks[block_index];
            block
                .instructions
                .splice(run.start..run.start + run.len, [count_inst, call]);
            changed = true;
        }
    }

    changed
}

/// Longest run of consecutive-index drop calls in the block.
fn find_run(
    block: &crate::mir::BasicBlock,
    element_of: &FxHashMap<ValueId, (ValueId, u64)>,
) -> Option<DropRun> {
    let mut index = 0;
    while index < block.instructions.len() {
        let Some((base, first_elem, dropped, callee_base)) =
            drop_of(&block.instructions[index], element_of)
        else {
            index += 1;
            continue;
        };

        let mut len = 1;
        while index + len < block.instructions.len() {
            match drop_of(&block.instructions[index + len], element_of) {
                Some((next_base, next_elem, next_dropped, _))
                    if next_base == base
                        && next_dropped == dropped
                        && next_elem == first_elem + len as u64 =>
                {
                    len += 1;
                }
                _ => break,
            }
        }

        if len >= BATCH_MIN {
            return Some(DropRun {
                start: index,
                len,
                base,
                dropped,
                callee_base,
            });
        }
        index += len;
    }
    None
}

/// `(base, element index, dropped type, callee base name)` of a drop call
/// on an array element.
fn drop_of(
    inst: &Instruction,
    element_of: &FxHashMap<ValueId, (ValueId, u64)>,
) -> Option<(ValueId, u64, Symbol, Symbol)> {
    let InstKind::Call { callee, args, .. } = &inst.kind else {
        return None;
    };
    let dropped = dropped_type_of(*callee)?;
    let [arg] = args.as_slice() else {
        return None;
    };
    let (base, element) = element_of.get(arg)?;
    Some((*base, *element, dropped, dropped))
}
