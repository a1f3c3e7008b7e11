//! Control flow graph facts: reachability, orderings, dominators.
//!
//! Dominators are computed by the classic iterate-to-fixpoint set
//! intersection over predecessors. The graphs involved are small (one
//! function), so the simple algorithm beats the bookkeeping of faster ones.

use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{BlockId, Function};

/// Derived CFG facts for one function.
pub struct ControlFlowGraph {
    pub predecessors: FxHashMap<BlockId, FxHashSet<BlockId>>,
    pub successors: FxHashMap<BlockId, FxHashSet<BlockId>>,
    /// For each block, the set of blocks dominating it (including itself).
    pub dominators: FxHashMap<BlockId, FxHashSet<BlockId>>,
    /// Postorder number per block (reachable blocks only).
    pub postorder: FxHashMap<BlockId, u32>,
    entry: Option<BlockId>,
}

impl ControlFlowGraph {
    pub fn new(func: &Function) -> Self {
        let mut predecessors: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        let mut successors: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();

        for block in &func.blocks {
            predecessors.entry(block.id).or_default();
            successors.entry(block.id).or_default();
        }
        for block in &func.blocks {
            if let Some(term) = &block.terminator {
                for target in term.targets() {
                    successors.entry(block.id).or_default().insert(target);
                    predecessors.entry(target).or_default().insert(block.id);
                }
            }
        }

        let entry = func.entry_block();
        let postorder = match entry {
            Some(entry) => compute_postorder(&successors, entry),
            None => FxHashMap::default(),
        };

        let mut cfg = Self {
            predecessors,
            successors,
            dominators: FxHashMap::default(),
            postorder,
            entry,
        };
        cfg.compute_dominators(func);
        cfg
    }

    fn compute_dominators(&mut self, func: &Function) {
        let Some(entry) = self.entry else {
            return;
        };
        let blocks: Vec<BlockId> = func.blocks.iter().map(|b| b.id).collect();
        let all: FxHashSet<BlockId> = blocks.iter().copied().collect();

        let mut doms: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        for &block in &blocks {
            if block == entry {
                let mut set = FxHashSet::default();
                set.insert(entry);
                doms.insert(block, set);
            } else {
                doms.insert(block, all.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &blocks {
                if block == entry {
                    continue;
                }
                let preds = &self.predecessors[&block];
                let mut new_dom: Option<FxHashSet<BlockId>> = None;
                for pred in preds {
                    let pred_doms = &doms[pred];
                    new_dom = Some(match new_dom {
                        None => pred_doms.clone(),
                        Some(acc) => acc.intersection(pred_doms).copied().collect(),
                    });
                }
                let mut new_dom = new_dom.unwrap_or_default();
                new_dom.insert(block);
                if new_dom != doms[&block] {
                    doms.insert(block, new_dom);
                    changed = true;
                }
            }
        }

        self.dominators = doms;
    }

    /// Whether `a` dominates `b`.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dominators.get(&b).is_some_and(|doms| doms.contains(&a))
    }

    /// Reverse postorder over reachable blocks: dominator-compatible
    /// processing order.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order: Vec<BlockId> = self.postorder.keys().copied().collect();
        order.sort_by_key(|b| std::cmp::Reverse(self.postorder[b]));
        order
    }

    /// Blocks reachable from the entry.
    pub fn reachable(&self) -> FxHashSet<BlockId> {
        self.postorder.keys().copied().collect()
    }

    /// Immediate dominator of each block (entry has none): the unique
    /// strict dominator dominated by every other strict dominator.
    pub fn immediate_dominators(&self) -> FxHashMap<BlockId, BlockId> {
        let mut idom = FxHashMap::default();
        let Some(entry) = self.entry else {
            return idom;
        };
        for (&block, doms) in &self.dominators {
            if block == entry {
                continue;
            }
            let strict: Vec<BlockId> = doms.iter().copied().filter(|d| *d != block).collect();
            let candidate = strict.iter().copied().find(|&c| {
                strict
                    .iter()
                    .all(|&other| other == c || self.dominates(other, c))
            });
            if let Some(c) = candidate {
                idom.insert(block, c);
            }
        }
        idom
    }

    /// Dominance frontiers, computed with the standard two-pointer walk
    /// from each join block's predecessors up to its immediate dominator.
    pub fn dominance_frontiers(&self) -> FxHashMap<BlockId, FxHashSet<BlockId>> {
        let idom = self.immediate_dominators();
        let mut frontiers: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        for (&block, preds) in &self.predecessors {
            if preds.len() < 2 {
                continue;
            }
            let Some(&target_idom) = idom.get(&block) else {
                continue;
            };
            for &pred in preds {
                let mut runner = pred;
                while runner != target_idom {
                    frontiers.entry(runner).or_default().insert(block);
                    match idom.get(&runner) {
                        Some(&up) => runner = up,
                        None => break,
                    }
                }
            }
        }
        frontiers
    }

    /// Children lists of the dominator tree.
    pub fn dominator_tree(&self) -> FxHashMap<BlockId, Vec<BlockId>> {
        let idom = self.immediate_dominators();
        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for (&block, &parent) in &idom {
            children.entry(parent).or_default().push(block);
        }
        for list in children.values_mut() {
            list.sort();
        }
        children
    }
}

fn compute_postorder(
    successors: &FxHashMap<BlockId, FxHashSet<BlockId>>,
    entry: BlockId,
) -> FxHashMap<BlockId, u32> {
    let mut visited = FxHashSet::default();
    let mut postorder = FxHashMap::default();
    let mut counter = 0;
    // Explicit stack with a phase marker, so deep CFGs cannot overflow the
    // call stack.
    let mut stack: Vec<(BlockId, bool)> = vec![(entry, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            postorder.insert(node, counter);
            counter += 1;
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        stack.push((node, true));
        if let Some(succs) = successors.get(&node) {
            let mut ordered: Vec<BlockId> = succs.iter().copied().collect();
            ordered.sort();
            for succ in ordered {
                if !visited.contains(&succ) {
                    stack.push((succ, false));
                }
            }
        }
    }
    postorder
}
