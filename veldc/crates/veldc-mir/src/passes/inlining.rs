//! Function inlining.
//!
//! Cost model: `net_cost = instruction_cost - call_overhead_saved`, inlined
//! when `net_cost <= threshold`. The base threshold (250) scales with the
//! optimization level (O1 x1, O2 x2, O3 x4). Bonuses subtract from the
//! cost, applied in this fixed order: devirtualized call site (100), then
//! exact-type devirtualization (150 more), then sealed-class
//! devirtualization (120 more), then constructor calls (200), then
//! base-class constructor chains (250).
//!
//! Hard rules: `always_inline` forces, `noinline` forbids, callees over
//! 500 instructions or without a visible body are rejected, direct
//! self-recursion is never inlined, and the per-caller inlining sweep
//! repeats at most 3 times so chains of inlining cannot recurse deeper.
//! Single-expression callees (at most 3 instructions) are always inlined
//! regardless of threshold.

use veldc_util::{FxHashMap, Symbol};

use crate::mir::{
    BasicBlock, BlockId, FnAttr, Function, InstKind, Instruction, Module, Terminator, ValueId,
};
use crate::pass::{MirPass, OptLevel};
use crate::passes::devirtualization::{DevirtReason, DevirtRecord};

const BASE_THRESHOLD: i64 = 250;
const CALL_OVERHEAD_SAVED: i64 = 5;
const MAX_CALLEE_INSTS: usize = 500;
const TINY_CALLEE_INSTS: usize = 3;
const MAX_INLINE_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InlineMode {
    /// Cost-model inlining without devirtualization bonuses.
    Baseline,
    /// Only `always_inline` and tiny callees.
    AlwaysOnly,
    /// Cost-model inlining with devirtualization bonuses.
    DevirtAware,
}

pub struct Inlining {
    mode: InlineMode,
    threshold: i64,
    record: DevirtRecord,
}

impl Inlining {
    pub fn baseline(opt_level: OptLevel, record: DevirtRecord) -> Self {
        Self {
            mode: InlineMode::Baseline,
            threshold: BASE_THRESHOLD * i64::from(opt_level.inline_scale()),
            record,
        }
    }

    pub fn always_only(record: DevirtRecord) -> Self {
        Self {
            mode: InlineMode::AlwaysOnly,
            threshold: 0,
            record,
        }
    }

    pub fn devirt_aware(opt_level: OptLevel, record: DevirtRecord) -> Self {
        Self {
            mode: InlineMode::DevirtAware,
            threshold: BASE_THRESHOLD * i64::from(opt_level.inline_scale()),
            record,
        }
    }

    fn should_inline(&self, caller: Symbol, callee: &Function) -> bool {
        if callee.has_attr(FnAttr::NoInline) || callee.has_attr(FnAttr::Extern) {
            return false;
        }
        if callee.blocks.is_empty() {
            return false;
        }
        let size = callee.instruction_count();
        if size > MAX_CALLEE_INSTS {
            return callee.has_attr(FnAttr::AlwaysInline);
        }
        if callee.has_attr(FnAttr::AlwaysInline) {
            return true;
        }
        // Typical getters and setters inline unconditionally.
        if size <= TINY_CALLEE_INSTS && callee.blocks.len() == 1 {
            return true;
        }
        if self.mode == InlineMode::AlwaysOnly {
            return false;
        }

        let mut cost = size as i64 - CALL_OVERHEAD_SAVED;
        if self.mode == InlineMode::DevirtAware {
            // Bonus order is fixed: devirtualized, exact-type, sealed,
            // constructor, base-constructor chain.
            if let Some(reason) = self.record.reason_for(caller, callee.name) {
                cost -= 100;
                if reason == DevirtReason::ExactType {
                    cost -= 150;
                }
                if reason == DevirtReason::Sealed {
                    cost -= 120;
                }
            }
        }
        let callee_is_ctor = callee.name.as_str().ends_with("_new");
        if callee_is_ctor {
            cost -= 200;
            if caller.as_str().ends_with("_new") {
                cost -= 250;
            }
        }

        cost <= self.threshold
    }
}

impl MirPass for Inlining {
    fn name(&self) -> &'static str {
        match self.mode {
            InlineMode::Baseline => "inlining",
            InlineMode::AlwaysOnly => "always-inline",
            InlineMode::DevirtAware => "inlining-devirt",
        }
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        // Callee bodies are snapshotted up front; inlining into one caller
        // must not see partially rewritten callees.
        let snapshot: FxHashMap<Symbol, Function> = module
            .functions
            .iter()
            .map(|f| (f.name, f.clone()))
            .collect();

        let mut changed = false;
        for func in &mut module.functions {
            for _round in 0..MAX_INLINE_ROUNDS {
                let Some((block_index, inst_index, callee_name)) =
                    find_candidate(func, &snapshot, self)
                else {
                    break;
                };
                let callee = snapshot[&callee_name].clone();
                inline_call(func, block_index, inst_index, &callee);
                changed = true;
            }
        }
        changed
    }
}

fn find_candidate(
    caller: &Function,
    snapshot: &FxHashMap<Symbol, Function>,
    config: &Inlining,
) -> Option<(usize, usize, Symbol)> {
    for (block_index, block) in caller.blocks.iter().enumerate() {
        for (inst_index, inst) in block.instructions.iter().enumerate() {
            let InstKind::Call { callee, .. } = &inst.kind else {
                continue;
            };
            // Direct self-recursion is never expanded.
            if *callee == caller.name {
                continue;
            }
            let Some(callee_func) = snapshot.get(callee) else {
                continue;
            };
            if config.should_inline(caller.name, callee_func) {
                return Some((block_index, inst_index, *callee));
            }
        }
    }
    None
}

/// Splice `callee`'s blocks into `caller` at the given call site.
fn inline_call(caller: &mut Function, block_index: usize, inst_index: usize, callee: &Function) {
    let call_inst = caller.blocks[block_index].instructions[inst_index].clone();
    let InstKind::Call { args, .. } = &call_inst.kind else {
        panic!("inline_call invoked on a non-call instruction");
    };
    let call_result = call_inst.result;
    let call_block_id = caller.blocks[block_index].id;

    // Fresh id ranges for the clone.
    let mut value_map: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    for ((param, _), arg) in callee.params.iter().zip(args) {
        value_map.insert(*param, *arg);
    }
    for block in &callee.blocks {
        for inst in &block.instructions {
            if inst.result.is_valid() {
                value_map.insert(inst.result, caller.new_value_id());
            }
        }
    }
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    for block in &callee.blocks {
        let fresh = BlockId(caller.next_block_id);
        caller.next_block_id += 1;
        block_map.insert(block.id, fresh);
    }
    let continuation = BlockId(caller.next_block_id);
    caller.next_block_id += 1;

    // Split the call block: everything after the call moves to the
    // continuation, which inherits the old terminator.
    let mut continuation_block = BasicBlock::new(continuation);
    {
        let call_block = &mut caller.blocks[block_index];
        continuation_block.instructions =
            call_block.instructions.split_off(inst_index + 1);
        call_block.instructions.pop(); // the call itself
        continuation_block.terminator = call_block.terminator.take();
        let entry_clone = block_map[&callee.entry_block().expect("callee has blocks")];
        call_block.terminator = Some(Terminator::Branch {
            target: entry_clone,
        });
    }
    // Phis in the old successors still name the call block as their
    // predecessor; those edges now leave the continuation.
    let moved_targets: Vec<BlockId> = continuation_block
        .terminator
        .as_ref()
        .map(|t| t.targets())
        .unwrap_or_default();
    for target in moved_targets {
        if let Some(succ) = caller.block_mut(target) {
            for inst in &mut succ.instructions {
                if let InstKind::Phi { incomings } = &mut inst.kind {
                    for (_, pred) in incomings {
                        if *pred == call_block_id {
                            *pred = continuation;
                        }
                    }
                }
            }
        }
    }

    // Clone the callee body, collecting return sites.
    let mut returns: Vec<(ValueId, BlockId)> = Vec::new();
    let mut clones: Vec<BasicBlock> = Vec::new();
    for block in &callee.blocks {
        let mut clone = BasicBlock::new(block_map[&block.id]);
        clone.name = block.name;
        for inst in &block.instructions {
            let result = value_map.get(&inst.result).copied().unwrap_or(ValueId::INVALID);
            let mut kind = inst.kind.clone();
            kind.for_each_operand_mut(|operand| {
                if let Some(mapped) = value_map.get(operand) {
                    *operand = *mapped;
                }
            });
            if let InstKind::Phi { incomings } = &mut kind {
                for (_, pred) in incomings {
                    *pred = block_map[pred];
                }
            }
            clone.instructions.push(Instruction::new(result, inst.ty.clone(), kind));
        }
        clone.terminator = Some(match block.terminator.clone().expect("terminated callee") {
            Terminator::Return(value) => {
                let value = value.map(|v| value_map.get(&v).copied().unwrap_or(v));
                if let Some(v) = value {
                    returns.push((v, clone.id));
                }
                Terminator::Branch {
                    target: continuation,
                }
            }
            mut other => {
                other.retarget(|target| *target = block_map[target]);
                other.for_each_operand_mut(|operand| {
                    if let Some(mapped) = value_map.get(operand) {
                        *operand = *mapped;
                    }
                });
                other
            }
        });
        clones.push(clone);
    }

    // Wire the call's result to the returned value(s).
    if call_result.is_valid() {
        match returns.as_slice() {
            [] => {
                // The callee only returns unit; any lingering use of the
                // call result reads a unit constant instead.
                let unit = caller.new_value_id();
                continuation_block.instructions.insert(
                    0,
                    Instruction::new(
                        unit,
                        call_inst.ty.clone(),
                        InstKind::Constant(crate::mir::ConstValue::Unit),
                    ),
                );
                replace_after_splice(caller, &mut continuation_block, call_result, unit);
            }
            [(value, _)] => {
                // A single return site dominates the continuation by
                // construction, so the returned value substitutes
                // directly; no phi needed.
                replace_after_splice(caller, &mut continuation_block, call_result, *value);
            }
            many => {
                let phi_result = caller.new_value_id();
                continuation_block.instructions.insert(
                    0,
                    Instruction::new(
                        phi_result,
                        call_inst.ty.clone(),
                        InstKind::Phi {
                            incomings: many.to_vec(),
                        },
                    ),
                );
                replace_after_splice(caller, &mut continuation_block, call_result, phi_result);
            }
        }
    }

    let insert_at = block_index + 1;
    caller
        .blocks
        .splice(insert_at..insert_at, clones.into_iter().chain([continuation_block]));
    caller.recompute_cfg();
}

/// Replace uses of the old call result in the caller and in the detached
/// continuation block.
fn replace_after_splice(
    caller: &mut Function,
    continuation: &mut BasicBlock,
    from: ValueId,
    to: ValueId,
) {
    caller.replace_uses(from, to);
    for inst in &mut continuation.instructions {
        inst.kind.for_each_operand_mut(|operand| {
            if *operand == from {
                *operand = to;
            }
        });
    }
    if let Some(term) = &mut continuation.terminator {
        term.for_each_operand_mut(|operand| {
            if *operand == from {
                *operand = to;
            }
        });
    }
}
