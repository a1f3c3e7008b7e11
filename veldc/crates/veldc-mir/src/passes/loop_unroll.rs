//! Loop unrolling.
//!
//! Recognizes counted loops of the canonical shape: a preheader, a header
//! holding the induction phi and the exit test, and a single body block
//! that increments the induction variable and branches back. The induction
//! phi has two incomings, a constant from the preheader and an `add` or
//! `sub` by a constant from the latch.
//!
//! Loops with a known trip count of at most 8 and a body of at most 20
//! instructions unroll fully into straight-line code. Larger loops up to a
//! trip count of 64 unroll partially by a factor of 2 to 4 when the factor
//! divides the trip count evenly.

use veldc_util::{FxHashMap, FxHashSet};

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::loops::{find_natural_loops, NaturalLoop};
use crate::mir::{
    BinaryOp, BlockId, ConstValue, Function, InstKind, Instruction, Terminator, ValueId,
};
use crate::pass::MirPass;
use crate::passes::constants;

pub struct LoopUnroll {
    pub full_trip_limit: u64,
    pub partial_trip_limit: u64,
    pub body_size_limit: usize,
}

impl Default for LoopUnroll {
    fn default() -> Self {
        Self {
            full_trip_limit: 8,
            partial_trip_limit: 64,
            body_size_limit: 20,
        }
    }
}

/// Everything needed to rewrite one counted loop.
struct CountedLoop {
    preheader: BlockId,
    header: BlockId,
    body: BlockId,
    exit: BlockId,
    iv: ValueId,
    init: i128,
    step: i128,
    /// The increment instruction in the body.
    next: ValueId,
    trip_count: u64,
    iv_ty: veldc_sem::Type,
}

impl MirPass for LoopUnroll {
    fn name(&self) -> &'static str {
        "loop-unroll"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;
        // One loop per run; unrolling invalidates the loop analysis.
        loop {
            let cfg = ControlFlowGraph::new(func);
            let loops = find_natural_loops(func, &cfg);
            let Some(counted) = loops
                .iter()
                .find_map(|l| self.recognize(func, &cfg, l))
            else {
                break;
            };
            if counted.trip_count <= self.full_trip_limit {
                self.unroll_fully(func, &counted);
                changed = true;
                continue;
            }
            if counted.trip_count <= self.partial_trip_limit {
                if let Some(factor) = (2..=4u64)
                    .rev()
                    .find(|f| counted.trip_count % f == 0)
                {
                    if self.unroll_partially(func, &counted, factor) {
                        changed = true;
                    }
                }
            }
            break;
        }
        changed
    }
}

impl LoopUnroll {
    fn recognize(
        &self,
        func: &Function,
        cfg: &ControlFlowGraph,
        natural_loop: &NaturalLoop,
    ) -> Option<CountedLoop> {
        // Shape: header + one body block that is also the latch.
        if natural_loop.blocks.len() != 2 {
            return None;
        }
        let header = natural_loop.header;
        let body = natural_loop.latch;
        let preheader = natural_loop.preheader(cfg)?;

        let header_block = func.block(header)?;
        let body_block = func.block(body)?;
        if body_block.instructions.len() > self.body_size_limit {
            return None;
        }
        // The body must fall back to the header unconditionally.
        if body_block.terminator != Some(Terminator::Branch { target: header }) {
            return None;
        }

        // Header: induction phi, comparison, conditional branch.
        let Some(Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        }) = &header_block.terminator
        else {
            return None;
        };
        let (body_edge, exit) = if *then_block == body {
            (*then_block, *else_block)
        } else if *else_block == body {
            (*else_block, *then_block)
        } else {
            return None;
        };
        let _ = body_edge;
        if natural_loop.contains(exit) {
            return None;
        }

        let consts = constants(func);

        // Exactly one phi, the induction variable.
        let phis: Vec<&Instruction> = header_block
            .instructions
            .iter()
            .filter(|i| i.kind.is_phi())
            .collect();
        let [iv_inst] = phis.as_slice() else {
            return None;
        };
        let InstKind::Phi { incomings } = &iv_inst.kind else {
            return None;
        };
        let [(a_val, a_pred), (b_val, b_pred)] = incomings.as_slice() else {
            return None;
        };
        let (init_val, next) = if *a_pred == preheader && *b_pred == body {
            (*a_val, *b_val)
        } else if *b_pred == preheader && *a_pred == body {
            (*b_val, *a_val)
        } else {
            return None;
        };
        let init = consts.get(&init_val)?.as_int()?;

        // The latch increment: add or sub of the phi by a constant.
        let next_inst = body_block
            .instructions
            .iter()
            .find(|i| i.result == next)?;
        let InstKind::Binary { op, left, right } = &next_inst.kind else {
            return None;
        };
        if *left != iv_inst.result {
            return None;
        }
        let raw_step = consts.get(right)?.as_int()?;
        let step = match op {
            BinaryOp::Add => raw_step,
            BinaryOp::Sub => -raw_step,
            _ => return None,
        };
        if step == 0 {
            return None;
        }

        // The exit test compares the phi against a constant bound.
        let cond_inst = header_block
            .instructions
            .iter()
            .find(|i| i.result == *cond)?;
        let InstKind::Binary {
            op: cmp,
            left: cmp_left,
            right: cmp_right,
        } = &cond_inst.kind
        else {
            return None;
        };
        if *cmp_left != iv_inst.result {
            return None;
        }
        let bound = consts.get(cmp_right)?.as_int()?;

        // Trip count by simulation, capped just past the partial limit.
        let continues = |v: i128| -> Option<bool> {
            Some(match cmp {
                BinaryOp::Lt => v < bound,
                BinaryOp::Le => v <= bound,
                BinaryOp::Gt => v > bound,
                BinaryOp::Ge => v >= bound,
                BinaryOp::Ne => v != bound,
                _ => return None,
            })
        };
        let mut v = init;
        let mut trip_count: u64 = 0;
        while continues(v)? {
            trip_count += 1;
            if trip_count > self.partial_trip_limit {
                return None;
            }
            v = v.checked_add(step)?;
        }

        Some(CountedLoop {
            preheader,
            header,
            body,
            exit,
            iv: iv_inst.result,
            init,
            step,
            next,
            trip_count,
            iv_ty: iv_inst.ty.clone(),
        })
    }

    /// Replace the loop with straight-line clones of the body.
    fn unroll_fully(&self, func: &mut Function, counted: &CountedLoop) {
        let body_insts: Vec<Instruction> =
            func.block(counted.body).unwrap().instructions.clone();

        // Values defined inside the loop, for patching external uses.
        let mut last_version: FxHashMap<ValueId, ValueId> = FxHashMap::default();

        let mut appended: Vec<Instruction> = Vec::new();
        let mut current_iv = {
            let id = func.new_value_id();
            appended.push(Instruction::new(
                id,
                counted.iv_ty.clone(),
                InstKind::Constant(int_const(counted.init, &counted.iv_ty)),
            ));
            id
        };
        last_version.insert(counted.iv, current_iv);

        for iteration in 0..counted.trip_count {
            let mut remap: FxHashMap<ValueId, ValueId> = FxHashMap::default();
            remap.insert(counted.iv, current_iv);
            for inst in &body_insts {
                let fresh = if inst.result.is_valid() {
                    let id = func.new_value_id();
                    remap.insert(inst.result, id);
                    id
                } else {
                    ValueId::INVALID
                };
                let mut kind = inst.kind.clone();
                kind.for_each_operand_mut(|operand| {
                    if let Some(mapped) = remap.get(operand) {
                        *operand = *mapped;
                    }
                });
                appended.push(Instruction::new(fresh, inst.ty.clone(), kind));
            }
            current_iv = remap[&counted.next];
            let _ = iteration;
            for (original, clone) in &remap {
                last_version.insert(*original, *clone);
            }
        }
        last_version.insert(counted.iv, current_iv);

        let preheader = func.block_mut(counted.preheader).expect("preheader");
        preheader.instructions.extend(appended);
        preheader.terminator = Some(Terminator::Branch {
            target: counted.exit,
        });

        // Drop the loop blocks, then patch any external uses of loop
        // values with their final versions.
        let doomed: FxHashSet<BlockId> = [counted.header, counted.body].into_iter().collect();
        func.blocks.retain(|b| !doomed.contains(&b.id));
        for (original, latest) in &last_version {
            func.replace_uses(*original, *latest);
        }
        func.recompute_cfg();
    }

    /// Clone the body in place `factor - 1` extra times.
    fn unroll_partially(
        &self,
        func: &mut Function,
        counted: &CountedLoop,
        factor: u64,
    ) -> bool {
        let body_insts: Vec<Instruction> =
            func.block(counted.body).unwrap().instructions.clone();

        let mut new_body: Vec<Instruction> = body_insts.clone();
        let mut current_iv = counted.next;
        let mut final_next = counted.next;
        for _ in 1..factor {
            let mut remap: FxHashMap<ValueId, ValueId> = FxHashMap::default();
            remap.insert(counted.iv, current_iv);
            for inst in &body_insts {
                let fresh = if inst.result.is_valid() {
                    let id = func.new_value_id();
                    remap.insert(inst.result, id);
                    id
                } else {
                    ValueId::INVALID
                };
                let mut kind = inst.kind.clone();
                kind.for_each_operand_mut(|operand| {
                    if let Some(mapped) = remap.get(operand) {
                        *operand = *mapped;
                    }
                });
                new_body.push(Instruction::new(fresh, inst.ty.clone(), kind));
            }
            current_iv = remap[&counted.next];
            final_next = current_iv;
        }

        let body = func.block_mut(counted.body).expect("body");
        body.instructions = new_body;

        // The induction phi's back edge now carries the last increment.
        let header = func.block_mut(counted.header).expect("header");
        for inst in &mut header.instructions {
            if inst.result != counted.iv {
                continue;
            }
            if let InstKind::Phi { incomings } = &mut inst.kind {
                for (value, pred) in incomings {
                    if *pred == counted.body {
                        *value = final_next;
                    }
                }
            }
        }
        true
    }
}

fn int_const(value: i128, ty: &veldc_sem::Type) -> ConstValue {
    match ty {
        veldc_sem::Type::Uint(width) => ConstValue::Uint {
            value: value as u64,
            width: *width,
        },
        veldc_sem::Type::Int(width) => ConstValue::Int {
            value: value as i64,
            width: *width,
        },
        _ => ConstValue::Int {
            value: value as i64,
            width: veldc_sem::IntWidth::W64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::validate::validate_function;
    use veldc_sem::Type;

    /// for i in 0..trip { sink(i) }
    fn counted_loop(trip: i64) -> Function {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        let init = b.const_i32(0);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(header);
        let iv = b.push(
            Type::I32,
            InstKind::Phi {
                incomings: vec![(init, entry)],
            },
        );
        let bound = b.const_i32(trip);
        let cond = b.binary(Type::Bool, BinaryOp::Lt, iv, bound);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: body,
            else_block: exit,
        });

        b.switch_to(body);
        let _use = b.call(Type::Unit, "sink", vec![iv]);
        let one = b.const_i32(1);
        let next = b.binary(Type::I32, BinaryOp::Add, iv, one);
        b.terminate(Terminator::Branch { target: header });

        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();
        if let InstKind::Phi { incomings } =
            &mut func.block_mut(header).unwrap().instructions[0].kind
        {
            incomings.push((next, body));
        }
        func.recompute_cfg();
        func
    }

    #[test]
    fn small_trip_count_unrolls_fully() {
        let mut func = counted_loop(3);
        assert!(LoopUnroll::default().run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());

        // The loop is gone: straight line from entry to return.
        assert_eq!(func.blocks.len(), 2);
        let calls = func.blocks[0]
            .instructions
            .iter()
            .filter(|i| matches!(i.kind, InstKind::Call { .. }))
            .count();
        assert_eq!(calls, 3);
    }

    #[test]
    fn zero_trip_loop_collapses_to_nothing() {
        let mut func = counted_loop(0);
        assert!(LoopUnroll::default().run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());
        let calls: usize = func
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .filter(|i| matches!(i.kind, InstKind::Call { .. }))
            .count();
        assert_eq!(calls, 0);
    }

    #[test]
    fn medium_trip_count_unrolls_partially() {
        let mut func = counted_loop(12);
        assert!(LoopUnroll::default().run_on_function(&mut func));
        assert!(validate_function(&func).is_ok());

        // Still a loop, but the body now holds several copies of the call.
        assert_eq!(func.blocks.len(), 4);
        let body_calls = func.blocks[2]
            .instructions
            .iter()
            .filter(|i| matches!(i.kind, InstKind::Call { .. }))
            .count();
        assert!(body_calls >= 2, "expected a partially unrolled body");
    }

    #[test]
    fn unknown_bound_is_not_unrolled() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        let bound = b.param(Type::I32);
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();

        b.switch_to(entry);
        let init = b.const_i32(0);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(header);
        let iv = b.push(
            Type::I32,
            InstKind::Phi {
                incomings: vec![(init, entry)],
            },
        );
        let cond = b.binary(Type::Bool, BinaryOp::Lt, iv, bound);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: body,
            else_block: exit,
        });
        b.switch_to(body);
        let one = b.const_i32(1);
        let next = b.binary(Type::I32, BinaryOp::Add, iv, one);
        let _use = b.call(Type::Unit, "sink", vec![next]);
        b.terminate(Terminator::Branch { target: header });
        b.switch_to(exit);
        b.terminate(Terminator::Return(None));
        let mut func = b.build();
        if let InstKind::Phi { incomings } =
            &mut func.block_mut(header).unwrap().instructions[0].kind
        {
            incomings.push((next, body));
        }
        func.recompute_cfg();

        assert!(!LoopUnroll::default().run_on_function(&mut func));
    }
}
