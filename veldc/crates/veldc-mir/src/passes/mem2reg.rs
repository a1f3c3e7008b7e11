//! Memory-to-register promotion.
//!
//! Promotes allocas whose address never escapes (referenced only as the
//! pointer of loads and stores) to SSA values.
//!
//! The simple case: a single store that dominates every load forwards its
//! value directly. The general case places phi nodes at the iterated
//! dominance frontier of the store blocks and renames with a value stack
//! over the dominator tree, the standard construction.

use veldc_sem::Type;
use veldc_util::{FxHashMap, FxHashSet};

use crate::analysis::cfg::ControlFlowGraph;
use crate::mir::{
    BlockId, ConstValue, Function, InstKind, Instruction, ValueId,
};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct Mem2Reg;

impl MirPass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let candidates = promotable_allocas(func);
        if candidates.is_empty() {
            return false;
        }

        // The rename walk reads the materialized successor lists.
        func.recompute_cfg();
        let cfg = ControlFlowGraph::new(func);
        let mut changed = false;

        for alloca in candidates {
            changed |= promote(func, &cfg, alloca);
        }
        changed
    }
}

#[derive(Clone)]
struct AllocaInfo {
    ptr: ValueId,
    ty: Type,
}

/// Allocas used only as the direct pointer of loads and stores.
fn promotable_allocas(func: &Function) -> Vec<AllocaInfo> {
    let mut allocas: FxHashMap<ValueId, AllocaInfo> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let InstKind::Alloca {
                allocated_ty,
                volatile: false,
                ..
            } = &inst.kind
            {
                allocas.insert(
                    inst.result,
                    AllocaInfo {
                        ptr: inst.result,
                        ty: allocated_ty.clone(),
                    },
                );
            }
        }
    }
    if allocas.is_empty() {
        return vec![];
    }

    // Disqualify any alloca whose address shows up outside a load/store
    // pointer position (GEPs, call arguments, stored values, and so on).
    let mut escaped: FxHashSet<ValueId> = FxHashSet::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            match &inst.kind {
                InstKind::Load { ptr, volatile } => {
                    if *volatile && allocas.contains_key(ptr) {
                        escaped.insert(*ptr);
                    }
                }
                InstKind::Store {
                    ptr,
                    value,
                    volatile,
                } => {
                    if *volatile && allocas.contains_key(ptr) {
                        escaped.insert(*ptr);
                    }
                    if allocas.contains_key(value) {
                        escaped.insert(*value);
                    }
                }
                other => {
                    other.for_each_operand(|operand| {
                        if allocas.contains_key(&operand) {
                            escaped.insert(operand);
                        }
                    });
                }
            }
        }
        if let Some(term) = &block.terminator {
            term.for_each_operand(|operand| {
                if allocas.contains_key(&operand) {
                    escaped.insert(operand);
                }
            });
        }
    }

    allocas
        .into_values()
        .filter(|info| !escaped.contains(&info.ptr))
        .collect()
}

fn promote(func: &mut Function, cfg: &ControlFlowGraph, alloca: AllocaInfo) -> bool {
    // Collect loads and stores of this alloca.
    let mut stores: Vec<(BlockId, usize, ValueId)> = Vec::new();
    let mut loads: Vec<(BlockId, usize, ValueId)> = Vec::new();
    for block in &func.blocks {
        for (index, inst) in block.instructions.iter().enumerate() {
            match &inst.kind {
                InstKind::Store { ptr, value, .. } if *ptr == alloca.ptr => {
                    stores.push((block.id, index, *value));
                }
                InstKind::Load { ptr, .. } if *ptr == alloca.ptr => {
                    loads.push((block.id, index, inst.result));
                }
                _ => {}
            }
        }
    }

    // Simple case: one store dominating every load.
    if let [(store_block, store_index, stored)] = stores.as_slice() {
        let all_dominated = loads.iter().all(|(load_block, load_index, _)| {
            if load_block == store_block {
                load_index > store_index
            } else {
                cfg.dominates(*store_block, *load_block)
            }
        });
        if all_dominated {
            for (_, _, load_result) in &loads {
                func.replace_uses(*load_result, *stored);
            }
            erase_alloca(func, alloca.ptr, &loads);
            return true;
        }
    }

    general_promote(func, cfg, &alloca, &stores)
}

fn general_promote(
    func: &mut Function,
    cfg: &ControlFlowGraph,
    alloca: &AllocaInfo,
    stores: &[(BlockId, usize, ValueId)],
) -> bool {
    // The general case only promotes scalars: reads of uninitialized
    // memory rename to a zero of the type, so the rename stack can never
    // run dry. Aggregates stay in memory unless the simple case applied.
    let Some(default) = default_const(&alloca.ty) else {
        return false;
    };
    rename_and_rewrite(func, cfg, alloca, stores, Some(default))
}

fn rename_and_rewrite(
    func: &mut Function,
    cfg: &ControlFlowGraph,
    alloca: &AllocaInfo,
    stores: &[(BlockId, usize, ValueId)],
    default: Option<ConstValue>,
) -> bool {
    // Materialize the default value in the entry block if needed.
    let default_value = default.map(|constant| {
        let id = func.new_value_id();
        let entry = &mut func.blocks[0];
        entry.instructions.insert(
            0,
            Instruction::new(id, alloca.ty.clone(), InstKind::Constant(constant)),
        );
        id
    });

    // Phi placement at the iterated dominance frontier of the store blocks.
    let frontiers = cfg.dominance_frontiers();
    let mut phi_blocks: FxHashSet<BlockId> = FxHashSet::default();
    let mut worklist: Vec<BlockId> = stores.iter().map(|(b, _, _)| *b).collect();
    let mut visited: FxHashSet<BlockId> = worklist.iter().copied().collect();
    while let Some(block) = worklist.pop() {
        let Some(frontier) = frontiers.get(&block) else {
            continue;
        };
        for &join in frontier {
            if phi_blocks.insert(join) {
                if visited.insert(join) {
                    worklist.push(join);
                }
            }
        }
    }

    // Create the phis with empty incoming lists; rename fills them in.
    let mut phi_in: FxHashMap<BlockId, ValueId> = FxHashMap::default();
    for &block_id in &phi_blocks {
        let phi = func.new_value_id();
        let Some(block) = func.block_mut(block_id) else {
            continue;
        };
        block.instructions.insert(
            0,
            Instruction::new(
                phi,
                alloca.ty.clone(),
                InstKind::Phi { incomings: vec![] },
            ),
        );
        phi_in.insert(block_id, phi);
    }

    // Rename over the dominator tree.
    let tree = cfg.dominator_tree();
    let mut stack: Vec<ValueId> = default_value.into_iter().collect();
    let mut load_rewrites: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    let mut phi_incomings: FxHashMap<ValueId, Vec<(ValueId, BlockId)>> = FxHashMap::default();
    let Some(entry) = func.entry_block() else {
        return false;
    };
    rename_block(
        func,
        &tree,
        entry,
        alloca.ptr,
        &phi_in,
        &mut stack,
        &mut load_rewrites,
        &mut phi_incomings,
    );

    // Apply: fill phis, rewrite loads, delete the memory operations.
    for block in &mut func.blocks {
        for inst in &mut block.instructions {
            if let Some(incomings) = phi_incomings.remove(&inst.result) {
                inst.kind = InstKind::Phi { incomings };
            }
        }
    }
    for (from, to) in &load_rewrites {
        func.replace_uses(*from, *to);
    }
    let loads: Vec<(BlockId, usize, ValueId)> = load_rewrites
        .keys()
        .map(|load| (BlockId(0), 0, *load))
        .collect();
    erase_alloca(func, alloca.ptr, &loads);
    true
}

#[allow(clippy::too_many_arguments)]
fn rename_block(
    func: &Function,
    tree: &FxHashMap<BlockId, Vec<BlockId>>,
    block_id: BlockId,
    alloca: ValueId,
    phi_in: &FxHashMap<BlockId, ValueId>,
    stack: &mut Vec<ValueId>,
    load_rewrites: &mut FxHashMap<ValueId, ValueId>,
    phi_incomings: &mut FxHashMap<ValueId, Vec<(ValueId, BlockId)>>,
) {
    let mut pushed = 0usize;

    if let Some(&phi) = phi_in.get(&block_id) {
        stack.push(phi);
        pushed += 1;
    }

    let Some(block) = func.block(block_id) else {
        return;
    };
    for inst in &block.instructions {
        match &inst.kind {
            InstKind::Load { ptr, .. } if *ptr == alloca => {
                if let Some(&current) = stack.last() {
                    load_rewrites.insert(inst.result, current);
                }
            }
            InstKind::Store { ptr, value, .. } if *ptr == alloca => {
                stack.push(*value);
                pushed += 1;
            }
            _ => {}
        }
    }

    // Feed the current value into successor phis.
    for &succ in &block.succs {
        if let Some(&phi) = phi_in.get(&succ) {
            if let Some(&current) = stack.last() {
                phi_incomings
                    .entry(phi)
                    .or_default()
                    .push((current, block_id));
            }
        }
    }

    if let Some(children) = tree.get(&block_id) {
        for &child in children {
            rename_block(
                func,
                tree,
                child,
                alloca,
                phi_in,
                stack,
                load_rewrites,
                phi_incomings,
            );
        }
    }

    stack.truncate(stack.len() - pushed);
}

/// Delete the alloca, its stores, and the (already rewritten) loads.
fn erase_alloca(func: &mut Function, alloca: ValueId, loads: &[(BlockId, usize, ValueId)]) {
    let load_results: FxHashSet<ValueId> = loads.iter().map(|(_, _, r)| *r).collect();
    for block in &mut func.blocks {
        block.instructions.retain(|inst| match &inst.kind {
            InstKind::Alloca { .. } => inst.result != alloca,
            InstKind::Store { ptr, .. } => *ptr != alloca,
            InstKind::Load { ptr, .. } => *ptr != alloca && !load_results.contains(&inst.result),
            _ => true,
        });
    }
    let mut doomed = FxHashSet::default();
    doomed.insert(alloca);
    remove_defs(func, &doomed);
}

/// Zero value used for reads of uninitialized promoted scalars.
fn default_const(ty: &Type) -> Option<ConstValue> {
    Some(match ty {
        Type::Int(width) => ConstValue::Int {
            value: 0,
            width: *width,
        },
        Type::Uint(width) => ConstValue::Uint {
            value: 0,
            width: *width,
        },
        Type::Float(w) => ConstValue::Float {
            value: 0.0,
            is_f64: w.bits() == 64,
        },
        Type::Bool => ConstValue::Bool(false),
        Type::Unit => ConstValue::Unit,
        _ => return None,
    })
}
