//! Constant propagation.
//!
//! Builds the value-to-constant map from all `Constant` instructions and
//! uses it to resolve instructions whose value is already determined: phis
//! whose incomings are all the same constant, and selects over a constant
//! condition. Folding of the propagated operands follows in
//! constant-folding.

use crate::mir::{ConstValue, Function, InstKind};
use crate::pass::MirPass;
use crate::passes::constants;

pub struct ConstantPropagation;

impl MirPass for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let consts = constants(func);
        let mut changed = false;
        let mut replacements = Vec::new();

        for block in &func.blocks {
            for inst in &block.instructions {
                match &inst.kind {
                    InstKind::Phi { incomings } if !incomings.is_empty() => {
                        let mut values = incomings
                            .iter()
                            .map(|(value, _)| consts.get(value));
                        let Some(Some(first)) = values.next() else {
                            continue;
                        };
                        if values.all(|v| v == Some(first)) {
                            replacements.push((inst.result, first.clone()));
                        }
                    }
                    InstKind::Select {
                        cond,
                        true_val,
                        false_val,
                    } => {
                        let Some(cond_value) = consts.get(cond).and_then(ConstValue::as_bool)
                        else {
                            continue;
                        };
                        let chosen = if cond_value { true_val } else { false_val };
                        if let Some(constant) = consts.get(chosen) {
                            replacements.push((inst.result, constant.clone()));
                        }
                    }
                    _ => {}
                }
            }
        }

        for (result, constant) in replacements {
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    if inst.result == result {
                        inst.kind = InstKind::Constant(constant.clone());
                        changed = true;
                    }
                }
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{InstKind, Terminator};
    use veldc_sem::Type;

    #[test]
    fn phi_of_equal_constants_becomes_constant() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let entry = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();

        b.switch_to(entry);
        let cond = b.const_bool(true);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: left,
            else_block: right,
        });

        b.switch_to(left);
        let seven_a = b.const_i32(7);
        b.terminate(Terminator::Branch { target: join });

        b.switch_to(right);
        let seven_b = b.const_i32(7);
        b.terminate(Terminator::Branch { target: join });

        b.switch_to(join);
        let phi = b.push(
            Type::I32,
            InstKind::Phi {
                incomings: vec![(seven_a, left), (seven_b, right)],
            },
        );
        b.terminate(Terminator::Return(Some(phi)));
        let mut func = b.build();

        assert!(ConstantPropagation.run_on_function(&mut func));
        assert!(matches!(
            &func.def_of(phi).unwrap().kind,
            InstKind::Constant(c) if c.as_int() == Some(7)
        ));
    }

    #[test]
    fn phi_of_distinct_constants_is_kept() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        let entry = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();

        b.switch_to(entry);
        let cond = b.const_bool(true);
        b.terminate(Terminator::CondBranch {
            cond,
            then_block: left,
            else_block: right,
        });
        b.switch_to(left);
        let one = b.const_i32(1);
        b.terminate(Terminator::Branch { target: join });
        b.switch_to(right);
        let two = b.const_i32(2);
        b.terminate(Terminator::Branch { target: join });
        b.switch_to(join);
        let phi = b.push(
            Type::I32,
            InstKind::Phi {
                incomings: vec![(one, left), (two, right)],
            },
        );
        b.terminate(Terminator::Return(Some(phi)));
        let mut func = b.build();

        assert!(!ConstantPropagation.run_on_function(&mut func));
    }

    #[test]
    fn select_over_constant_condition_resolves() {
        let mut b = FunctionBuilder::new("f", Type::I32);
        b.block();
        let cond = b.const_bool(false);
        let t = b.const_i32(1);
        let f = b.const_i32(2);
        let sel = b.push(
            Type::I32,
            InstKind::Select {
                cond,
                true_val: t,
                false_val: f,
            },
        );
        b.terminate(Terminator::Return(Some(sel)));
        let mut func = b.build();

        assert!(ConstantPropagation.run_on_function(&mut func));
        assert!(matches!(
            &func.def_of(sel).unwrap().kind,
            InstKind::Constant(c) if c.as_int() == Some(2)
        ));
    }
}
