//! Global value numbering.
//!
//! Hash-based value numbering across blocks, processed in reverse postorder
//! so definitions are numbered before their dominated uses. Commutative
//! operand pairs are canonicalized by value number. A redundant expression
//! redirects its uses to the earlier value, provided the earlier definition
//! dominates the later block.
//!
//! Load GVN: a later load of a pointer with the same value number reuses
//! the earlier loaded value unless a may-aliasing store intervenes; any
//! call invalidates the whole load table.

use veldc_sem::Type;
use veldc_util::{FxHashMap, FxHashSet};

use crate::analysis::alias::{AliasAnalysis, AliasResult};
use crate::analysis::cfg::ControlFlowGraph;
use crate::mir::{BinaryOp, BlockId, CastKind, Function, GepIndex, InstKind, UnaryOp, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct Gvn;

type ValueNumber = u32;

/// Expression shape keyed by the value numbers of its operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VnKey {
    Binary(BinaryOp, ValueNumber, ValueNumber),
    Unary(UnaryOp, ValueNumber),
    Cast(CastKind, Type, ValueNumber),
    Gep(ValueNumber, Vec<GepKeyIndex>),
    ExtractValue(ValueNumber, Vec<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GepKeyIndex {
    Const(u64),
    Value(ValueNumber),
}

#[derive(Debug, Clone, Copy)]
struct LoadInfo {
    loaded: ValueId,
    ptr: ValueId,
    block: BlockId,
}

struct GvnState {
    numbers: FxHashMap<ValueId, ValueNumber>,
    next: ValueNumber,
    expr_table: FxHashMap<VnKey, (ValueId, BlockId)>,
    load_table: FxHashMap<ValueNumber, LoadInfo>,
}

impl GvnState {
    fn new() -> Self {
        Self {
            numbers: FxHashMap::default(),
            next: 1,
            expr_table: FxHashMap::default(),
            load_table: FxHashMap::default(),
        }
    }

    fn number_of(&mut self, value: ValueId) -> ValueNumber {
        if let Some(vn) = self.numbers.get(&value) {
            return *vn;
        }
        let vn = self.next;
        self.next += 1;
        self.numbers.insert(value, vn);
        vn
    }

    fn key_of(&mut self, kind: &InstKind, ty: &Type) -> Option<VnKey> {
        Some(match kind {
            InstKind::Binary { op, left, right } => {
                let mut a = self.number_of(*left);
                let mut b = self.number_of(*right);
                if op.is_commutative() && b < a {
                    std::mem::swap(&mut a, &mut b);
                }
                VnKey::Binary(*op, a, b)
            }
            InstKind::Unary { op, operand } => VnKey::Unary(*op, self.number_of(*operand)),
            InstKind::Cast { kind, operand, .. } => {
                VnKey::Cast(*kind, ty.clone(), self.number_of(*operand))
            }
            InstKind::Gep { base, indices } => {
                let base_vn = self.number_of(*base);
                let key_indices = indices
                    .iter()
                    .map(|index| match index {
                        GepIndex::Const(c) => GepKeyIndex::Const(*c),
                        GepIndex::Value(v) => GepKeyIndex::Value(self.number_of(*v)),
                    })
                    .collect();
                VnKey::Gep(base_vn, key_indices)
            }
            InstKind::ExtractValue { aggregate, indices } => {
                VnKey::ExtractValue(self.number_of(*aggregate), indices.clone())
            }
            _ => return None,
        })
    }
}

impl MirPass for Gvn {
    fn name(&self) -> &'static str {
        "gvn"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let cfg = ControlFlowGraph::new(func);
        let alias = AliasAnalysis::analyze(func);
        let order = cfg.reverse_postorder();

        let mut state = GvnState::new();
        let mut replacements: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();
        let mut changed = false;

        for block_id in order {
            let Some(block_index) = func.block_index(block_id) else {
                continue;
            };
            for inst_index in 0..func.blocks[block_index].instructions.len() {
                let inst = &func.blocks[block_index].instructions[inst_index];
                let result = inst.result;
                let kind = inst.kind.clone();
                let ty = inst.ty.clone();

                if result.is_valid() {
                    state.number_of(result);
                }

                match &kind {
                    InstKind::Store { ptr, .. } => {
                        // Keep only loads the store certainly leaves alone.
                        let stored_ptr = *ptr;
                        state.load_table.retain(|_, info| {
                            alias.alias(stored_ptr, info.ptr) == AliasResult::NoAlias
                        });
                        continue;
                    }
                    InstKind::Call { .. }
                    | InstKind::MethodCall { .. }
                    | InstKind::Await { .. } => {
                        // Calls may modify any memory.
                        state.load_table.clear();
                        continue;
                    }
                    InstKind::Load { ptr, volatile } => {
                        if *volatile {
                            continue;
                        }
                        let ptr_vn = state.number_of(*ptr);
                        if let Some(info) = state.load_table.get(&ptr_vn) {
                            if cfg.dominates(info.block, block_id) && info.loaded != result {
                                let reused = info.loaded;
                                let reused_vn = state.number_of(reused);
                                state.numbers.insert(result, reused_vn);
                                replacements.insert(result, reused);
                                doomed.insert(result);
                                changed = true;
                                continue;
                            }
                        }
                        state.load_table.insert(
                            ptr_vn,
                            LoadInfo {
                                loaded: result,
                                ptr: *ptr,
                                block: block_id,
                            },
                        );
                        continue;
                    }
                    _ => {}
                }

                let Some(key) = state.key_of(&kind, &ty) else {
                    continue;
                };
                match state.expr_table.get(&key) {
                    Some((existing, def_block))
                        if *existing != result && cfg.dominates(*def_block, block_id) =>
                    {
                        let existing = *existing;
                        let existing_vn = state.number_of(existing);
                        state.numbers.insert(result, existing_vn);
                        replacements.insert(result, existing);
                        doomed.insert(result);
                        changed = true;
                    }
                    _ => {
                        state.expr_table.insert(key, (result, block_id));
                    }
                }
            }
        }

        for (from, to) in &replacements {
            func.replace_uses(*from, *to);
        }
        remove_defs(func, &doomed);
        changed
    }
}
