//! Scalar replacement of aggregates.
//!
//! An alloca of a struct, tuple, or small array that is only accessed
//! through single-constant-index GEPs (each followed only by loads and
//! stores) is split into one alloca per field. The per-field slots are then
//! plain scalar memory that mem2reg can promote.

use veldc_sem::Type;
use veldc_util::{FxHashMap, FxHashSet};

use crate::mir::{Function, GepIndex, InstKind, Instruction, Module, ValueId};
use crate::pass::MirPass;
use crate::passes::remove_defs;

pub struct Sroa;

const MAX_SPLIT_FIELDS: usize = 16;

impl MirPass for Sroa {
    fn name(&self) -> &'static str {
        "sroa"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let mut changed = false;
        // Field layouts come from the module tables, so this runs as a
        // module pass even though each rewrite is function-local.
        let struct_fields: FxHashMap<_, Vec<Type>> = module
            .structs
            .iter()
            .map(|s| (s.name, s.fields.iter().map(|(_, t)| t.clone()).collect()))
            .collect();
        for func in &mut module.functions {
            changed |= split_aggregates(func, &struct_fields);
        }
        changed
    }
}

fn field_types(
    ty: &Type,
    struct_fields: &FxHashMap<veldc_util::Symbol, Vec<Type>>,
) -> Option<Vec<Type>> {
    let fields = match ty {
        Type::Tuple(tys) => tys.clone(),
        Type::Array(elem, n) if *n as usize <= MAX_SPLIT_FIELDS => {
            vec![(**elem).clone(); *n as usize]
        }
        Type::Named { name, .. } => struct_fields.get(name)?.clone(),
        _ => return None,
    };
    if fields.is_empty() || fields.len() > MAX_SPLIT_FIELDS {
        return None;
    }
    Some(fields)
}

fn split_aggregates(
    func: &mut Function,
    struct_fields: &FxHashMap<veldc_util::Symbol, Vec<Type>>,
) -> bool {
    // Aggregate allocas and their field layouts.
    let mut candidates: FxHashMap<ValueId, Vec<Type>> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let InstKind::Alloca {
                allocated_ty,
                volatile: false,
                ..
            } = &inst.kind
            {
                if let Some(fields) = field_types(allocated_ty, struct_fields) {
                    candidates.insert(inst.result, fields);
                }
            }
        }
    }
    if candidates.is_empty() {
        return false;
    }

    // Geps over candidates with a single constant index; anything else
    // disqualifies the alloca.
    let mut geps: FxHashMap<ValueId, (ValueId, u64)> = FxHashMap::default();
    let mut disqualified: FxHashSet<ValueId> = FxHashSet::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            match &inst.kind {
                InstKind::Gep { base, indices } if candidates.contains_key(base) => {
                    match indices.as_slice() {
                        [GepIndex::Const(field)] => {
                            geps.insert(inst.result, (*base, *field));
                        }
                        _ => {
                            disqualified.insert(*base);
                        }
                    }
                }
                other => {
                    other.for_each_operand(|operand| {
                        if candidates.contains_key(&operand)
                            && !matches!(other, InstKind::Gep { .. })
                        {
                            disqualified.insert(operand);
                        }
                    });
                }
            }
        }
        if let Some(term) = &block.terminator {
            term.for_each_operand(|operand| {
                if candidates.contains_key(&operand) {
                    disqualified.insert(operand);
                }
            });
        }
    }
    // The gep results themselves must only feed loads and stores.
    for block in &func.blocks {
        for inst in &block.instructions {
            match &inst.kind {
                InstKind::Load { ptr, .. } if geps.contains_key(ptr) => {}
                InstKind::Store { ptr, value, .. } => {
                    if geps.contains_key(value) {
                        disqualified.insert(geps[value].0);
                    }
                    let _ = ptr;
                }
                other => {
                    other.for_each_operand(|operand| {
                        if let Some((base, _)) = geps.get(&operand) {
                            if !matches!(
                                other,
                                InstKind::Load { .. } | InstKind::Store { .. }
                            ) {
                                disqualified.insert(*base);
                            }
                        }
                    });
                }
            }
        }
    }

    let chosen: Vec<(ValueId, Vec<Type>)> = candidates
        .into_iter()
        .filter(|(alloca, _)| !disqualified.contains(alloca))
        .collect();
    if chosen.is_empty() {
        return false;
    }

    let mut changed = false;
    for (alloca, fields) in chosen {
        // One fresh alloca per field, placed where the aggregate was.
        let field_slots: Vec<ValueId> = fields.iter().map(|_| func.new_value_id()).collect();
        let mut replaced = false;
        for block in &mut func.blocks {
            if let Some(position) = block
                .instructions
                .iter()
                .position(|inst| inst.result == alloca)
            {
                let replacement: Vec<Instruction> = fields
                    .iter()
                    .zip(&field_slots)
                    .map(|(field_ty, slot)| {
                        Instruction::new(
                            *slot,
                            Type::Ptr(Box::new(field_ty.clone())),
                            InstKind::Alloca {
                                name: None,
                                allocated_ty: field_ty.clone(),
                                volatile: false,
                            },
                        )
                    })
                    .collect();
                block.instructions.splice(position..=position, replacement);
                replaced = true;
                break;
            }
        }
        if !replaced {
            continue;
        }

        // Redirect each gep's users to the matching field slot, then drop
        // the geps.
        let mut doomed: FxHashSet<ValueId> = FxHashSet::default();
        for (gep, (base, field)) in &geps {
            if *base != alloca {
                continue;
            }
            func.replace_uses(*gep, field_slots[*field as usize]);
            doomed.insert(*gep);
        }
        remove_defs(func, &doomed);
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use crate::passes::mem2reg::Mem2Reg;
    use crate::validate::validate_function;

    fn pair_ty() -> Type {
        Type::Tuple(vec![Type::I32, Type::I32])
    }

    #[test]
    fn per_field_geps_are_split() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let agg = b.alloca(pair_ty());
        let f0 = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: agg,
                indices: vec![GepIndex::Const(0)],
            },
        );
        let f1 = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: agg,
                indices: vec![GepIndex::Const(1)],
            },
        );
        let one = b.const_i32(1);
        let two = b.const_i32(2);
        b.push_store(f0, one);
        b.push_store(f1, two);
        let a = b.load(Type::I32, f0);
        b.terminate(Terminator::Return(Some(a)));
        let mut func = b.build();

        let mut module = Module::new();
        module.functions.push(func);
        assert!(Sroa.run_on_module(&mut module));
        func = module.functions.pop().unwrap();
        assert!(validate_function(&func).is_ok());

        // The aggregate alloca became two scalar allocas and the geps are
        // gone.
        let allocas = func.blocks[0]
            .instructions
            .iter()
            .filter(|i| matches!(i.kind, InstKind::Alloca { .. }))
            .count();
        assert_eq!(allocas, 2);
        assert!(!func.blocks[0]
            .instructions
            .iter()
            .any(|i| matches!(i.kind, InstKind::Gep { .. })));
    }

    #[test]
    fn split_slots_promote_afterwards() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let agg = b.alloca(pair_ty());
        let f0 = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: agg,
                indices: vec![GepIndex::Const(0)],
            },
        );
        let v = b.const_i32(7);
        b.push_store(f0, v);
        let loaded = b.load(Type::I32, f0);
        b.terminate(Terminator::Return(Some(loaded)));
        let func = b.build();

        let mut module = Module::new();
        module.functions.push(func);
        assert!(Sroa.run_on_module(&mut module));
        let func = &mut module.functions[0];
        assert!(Mem2Reg.run_on_function(func));
        assert_eq!(
            func.blocks[0].terminator,
            Some(Terminator::Return(Some(v)))
        );
    }

    #[test]
    fn dynamic_index_disqualifies() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let idx = b.param(Type::I32);
        b.block();
        let agg = b.alloca(Type::Array(Box::new(Type::I32), 4));
        let p = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: agg,
                indices: vec![GepIndex::Value(idx)],
            },
        );
        let loaded = b.load(Type::I32, p);
        b.terminate(Terminator::Return(Some(loaded)));
        let func = b.build();

        let mut module = Module::new();
        module.functions.push(func);
        assert!(!Sroa.run_on_module(&mut module));
    }

    #[test]
    fn escaping_aggregate_is_left_alone() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let agg = b.alloca(pair_ty());
        let _r = b.call(Type::Unit, "observe", vec![agg]);
        b.terminate(Terminator::Return(None));
        let func = b.build();

        let mut module = Module::new();
        module.functions.push(func);
        assert!(!Sroa.run_on_module(&mut module));
    }
}
