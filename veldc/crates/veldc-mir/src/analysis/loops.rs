//! Natural loop detection.
//!
//! An edge `s -> t` is a back edge iff `t` dominates `s`. The loop body is
//! the header plus every block that reaches the back edge's source without
//! crossing the header.

use veldc_util::FxHashSet;

use crate::analysis::cfg::ControlFlowGraph;
use crate::mir::{BlockId, Function};

/// One natural loop.
#[derive(Debug)]
pub struct NaturalLoop {
    pub header: BlockId,
    /// The source of the back edge.
    pub latch: BlockId,
    /// All blocks in the loop, header included.
    pub blocks: FxHashSet<BlockId>,
}

impl NaturalLoop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// The unique predecessor of the header outside the loop, if exactly
    /// one exists.
    pub fn preheader(&self, cfg: &ControlFlowGraph) -> Option<BlockId> {
        let outside: Vec<BlockId> = cfg.predecessors[&self.header]
            .iter()
            .copied()
            .filter(|p| !self.blocks.contains(p))
            .collect();
        match outside.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Blocks outside the loop that loop blocks branch to.
    pub fn exit_targets(&self, cfg: &ControlFlowGraph) -> Vec<BlockId> {
        let mut exits = Vec::new();
        for block in &self.blocks {
            if let Some(succs) = cfg.successors.get(block) {
                for succ in succs {
                    if !self.blocks.contains(succ) && !exits.contains(succ) {
                        exits.push(*succ);
                    }
                }
            }
        }
        exits
    }
}

/// Find the natural loops of a function, one per back edge.
pub fn find_natural_loops(func: &Function, cfg: &ControlFlowGraph) -> Vec<NaturalLoop> {
    let mut loops = Vec::new();

    for block in &func.blocks {
        let Some(succs) = cfg.successors.get(&block.id) else {
            continue;
        };
        for &target in succs {
            if cfg.dominates(target, block.id) {
                loops.push(collect_loop(cfg, target, block.id));
            }
        }
    }

    loops
}

/// Backward flood fill from the latch, stopping at the header.
fn collect_loop(cfg: &ControlFlowGraph, header: BlockId, latch: BlockId) -> NaturalLoop {
    let mut blocks = FxHashSet::default();
    blocks.insert(header);

    let mut stack = vec![latch];
    while let Some(block) = stack.pop() {
        if !blocks.insert(block) {
            continue;
        }
        if let Some(preds) = cfg.predecessors.get(&block) {
            for &pred in preds {
                if !blocks.contains(&pred) {
                    stack.push(pred);
                }
            }
        }
    }

    NaturalLoop {
        header,
        latch,
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use veldc_sem::Type;

    /// entry -> header <-> body; header -> exit
    fn simple_loop() -> Function {
        let mut b = FunctionBuilder::new("looped", Type::Unit);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(header);
        let cond = b.const_bool(true);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: body,
            else_block: exit,
        });

        b.switch_to(body);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        b.build()
    }

    #[test]
    fn detects_single_back_edge_loop() {
        let func = simple_loop();
        let cfg = ControlFlowGraph::new(&func);
        let loops = find_natural_loops(&func, &cfg);

        assert_eq!(loops.len(), 1);
        let l = &loops[0];
        assert_eq!(l.header, BlockId(1));
        assert_eq!(l.latch, BlockId(2));
        assert!(l.contains(BlockId(1)));
        assert!(l.contains(BlockId(2)));
        assert!(!l.contains(BlockId(0)));
        assert!(!l.contains(BlockId(3)));
    }

    #[test]
    fn preheader_and_exits() {
        let func = simple_loop();
        let cfg = ControlFlowGraph::new(&func);
        let loops = find_natural_loops(&func, &cfg);
        let l = &loops[0];

        assert_eq!(l.preheader(&cfg), Some(BlockId(0)));
        assert_eq!(l.exit_targets(&cfg), vec![BlockId(3)]);
    }

    #[test]
    fn straight_line_function_has_no_loops() {
        let mut b = FunctionBuilder::new("line", Type::Unit);
        b.block();
        b.terminate(Terminator::Return(None));
        let func = b.build();
        let cfg = ControlFlowGraph::new(&func);
        assert!(find_natural_loops(&func, &cfg).is_empty());
    }
}
