//! Constructor fusion.
//!
//! After an alloca of a class whose following straight-line code stores to
//! every field through constant GEPs, the per-field stores fuse into a
//! single `StructInit` plus one aggregate store. Separately, when a
//! base-class constructor's vtable store (slot 0) is immediately followed
//! by the derived class's store to the same slot, the first store is
//! deleted; only the last write of the vtable pointer survives.

use veldc_sem::Type;
use veldc_util::{FxHashMap, Symbol};

use crate::mir::{
    Function, GepIndex, InstKind, Instruction, Module, ValueId,
};
use crate::pass::MirPass;

pub struct ConstructorFusion;

impl MirPass for ConstructorFusion {
    fn name(&self) -> &'static str {
        "constructor-fusion"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let field_counts: FxHashMap<Symbol, usize> = module
            .structs
            .iter()
            .map(|s| (s.name, s.fields.len()))
            .collect();

        let mut changed = false;
        for func in &mut module.functions {
            changed |= fuse_field_stores(func, &field_counts);
            changed |= dedup_vtable_stores(func);
        }
        changed
    }
}

fn fuse_field_stores(func: &mut Function, field_counts: &FxHashMap<Symbol, usize>) -> bool {
    let mut changed = false;

    for block_index in 0..func.blocks.len() {
        loop {
            let plan = find_fusion(func, block_index, field_counts);
            let Some((alloca_index, end_index, class, base, values)) = plan else {
                break;
            };

            let init = func.new_value_id();
            let class_ty = Type::named(class);
            let init_inst =
                Instruction::new(init, class_ty, InstKind::StructInit { name: class, fields: values });
            let store_inst = Instruction::new(
                ValueId::INVALID,
                Type::Unit,
                InstKind::Store {
                    ptr: base,
                    value: init,
                    volatile: false,
                },
            );

            // Replace everything after the alloca up to the last field
            // store with the fused pair; stray geps die in DCE.
            let block = &mut func.blocks[block_index];
            block
                .instructions
                .splice(alloca_index + 1..=end_index, [init_inst, store_inst]);
            changed = true;
        }
    }

    changed
}

/// A fusable window: alloca of a known class followed by stores covering
/// every field exactly once through constant GEPs, with only those geps
/// and stores in between.
fn find_fusion(
    func: &Function,
    block_index: usize,
    field_counts: &FxHashMap<Symbol, usize>,
) -> Option<(usize, usize, Symbol, ValueId, Vec<ValueId>)> {
    let block = &func.blocks[block_index];
    for (alloca_index, inst) in block.instructions.iter().enumerate() {
        let InstKind::Alloca {
            allocated_ty: Type::Named { name, .. },
            volatile: false,
            ..
        } = &inst.kind
        else {
            continue;
        };
        let Some(&field_count) = field_counts.get(name) else {
            continue;
        };
        if field_count == 0 {
            continue;
        }
        let base = inst.result;

        let mut fields: Vec<Option<ValueId>> = vec![None; field_count];
        let mut geps: FxHashMap<ValueId, u64> = FxHashMap::default();
        let mut index = alloca_index + 1;
        let mut end_index = None;
        while index < block.instructions.len() {
            match &block.instructions[index].kind {
                InstKind::Gep {
                    base: gep_base,
                    indices,
                } if *gep_base == base => {
                    let [GepIndex::Const(field)] = indices.as_slice() else {
                        break;
                    };
                    geps.insert(block.instructions[index].result, *field);
                }
                InstKind::Store {
                    ptr,
                    value,
                    volatile: false,
                } => {
                    let Some(&field) = geps.get(ptr) else {
                        break;
                    };
                    let slot = fields.get_mut(field as usize)?;
                    if slot.is_some() {
                        // A second write to the same field ends the
                        // window; fuse only simple initialization runs.
                        break;
                    }
                    *slot = Some(*value);
                    if fields.iter().all(Option::is_some) {
                        end_index = Some(index);
                        break;
                    }
                }
                // Pure value computations between the stores are fine as
                // long as they do not touch the object.
                kind if !crate::passes::has_side_effects(kind) => {
                    let mut touches = false;
                    kind.for_each_operand(|operand| {
                        if operand == base || geps.contains_key(&operand) {
                            touches = true;
                        }
                    });
                    if touches {
                        break;
                    }
                }
                _ => break,
            }
            index += 1;
        }

        if let Some(end_index) = end_index {
            let values: Vec<ValueId> = fields.into_iter().map(|v| v.unwrap()).collect();
            // The fused pair sits right after the alloca, so every stored
            // value must already be defined at that point.
            let defined_between: bool = block.instructions[alloca_index..=end_index]
                .iter()
                .any(|inst| values.contains(&inst.result));
            if defined_between {
                continue;
            }
            // The window's geps must not feed anything outside it; each
            // one's single use is its field store.
            if geps.keys().any(|gep| func.count_uses(*gep) != 1) {
                continue;
            }
            return Some((alloca_index, end_index, *name, base, values));
        }
    }
    None
}

/// Delete a vtable store immediately overwritten by another store to the
/// same slot-0 GEP path of the same object.
fn dedup_vtable_stores(func: &mut Function) -> bool {
    let mut changed = false;

    // Slot-0 geps per base.
    let mut slot0: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let InstKind::Gep { base, indices } = &inst.kind {
                if let [GepIndex::Const(0)] = indices.as_slice() {
                    slot0.insert(inst.result, *base);
                }
            }
        }
    }
    if slot0.is_empty() {
        return false;
    }

    for block in &mut func.blocks {
        let mut doomed: Vec<usize> = Vec::new();
        let mut previous: Option<(usize, ValueId)> = None;
        for (index, inst) in block.instructions.iter().enumerate() {
            match &inst.kind {
                InstKind::Store {
                    ptr,
                    volatile: false,
                    ..
                } => {
                    if let Some(&base) = slot0.get(ptr) {
                        if let Some((prev_index, prev_base)) = previous {
                            if prev_base == base {
                                doomed.push(prev_index);
                            }
                        }
                        previous = Some((index, base));
                    } else {
                        previous = None;
                    }
                }
                InstKind::Gep { .. } | InstKind::Constant(_) => {}
                _ => previous = None,
            }
        }
        for index in doomed.iter().rev() {
            block.instructions.remove(*index);
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{StructDef, Terminator};
    use crate::validate::validate_function;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn point_module(func: Function) -> Module {
        let mut module = Module::new();
        module.structs.push(StructDef {
            name: sym("Point"),
            fields: vec![(sym("x"), Type::I32), (sym("y"), Type::I32)],
        });
        module.functions.push(func);
        module
    }

    #[test]
    fn full_field_initialization_fuses() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let x = b.const_i32(1);
        let y = b.const_i32(2);
        let obj = b.alloca(Type::named(sym("Point")));
        let gep_x = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: obj,
                indices: vec![GepIndex::Const(0)],
            },
        );
        b.push_store(gep_x, x);
        let gep_y = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: obj,
                indices: vec![GepIndex::Const(1)],
            },
        );
        b.push_store(gep_y, y);
        b.terminate(Terminator::Return(None));
        let mut module = point_module(b.build());

        assert!(ConstructorFusion.run_on_module(&mut module));
        let func = &module.functions[0];
        assert!(validate_function(func).is_ok());

        let has_init = func.blocks[0]
            .instructions
            .iter()
            .any(|i| matches!(&i.kind, InstKind::StructInit { name, fields }
                if *name == sym("Point") && fields == &vec![x, y]));
        assert!(has_init);
        // Exactly one store remains, the aggregate one.
        let stores = func.blocks[0]
            .instructions
            .iter()
            .filter(|i| matches!(i.kind, InstKind::Store { .. }))
            .count();
        assert_eq!(stores, 1);
    }

    #[test]
    fn partial_initialization_is_left_alone() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let x = b.const_i32(1);
        let obj = b.alloca(Type::named(sym("Point")));
        let gep_x = b.push(
            Type::Ptr(Box::new(Type::I32)),
            InstKind::Gep {
                base: obj,
                indices: vec![GepIndex::Const(0)],
            },
        );
        b.push_store(gep_x, x);
        b.terminate(Terminator::Return(None));
        let mut module = point_module(b.build());

        assert!(!ConstructorFusion.run_on_module(&mut module));
    }

    #[test]
    fn overwritten_vtable_store_is_deleted() {
        let mut b = FunctionBuilder::new("f", Type::Unit);
        b.block();
        let base_vt = b.const_i64(0x1000);
        let derived_vt = b.const_i64(0x2000);
        let obj = b.alloca(Type::named(sym("Derived")));
        let slot = b.push(
            Type::Ptr(Box::new(Type::I64)),
            InstKind::Gep {
                base: obj,
                indices: vec![GepIndex::Const(0)],
            },
        );
        b.push_store(slot, base_vt);
        b.push_store(slot, derived_vt);
        b.terminate(Terminator::Return(None));
        let mut module = Module::new();
        module.functions.push(b.build());

        assert!(ConstructorFusion.run_on_module(&mut module));
        let func = &module.functions[0];
        let stores: Vec<ValueId> = func.blocks[0]
            .instructions
            .iter()
            .filter_map(|i| match &i.kind {
                InstKind::Store { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![derived_vt]);
    }
}
