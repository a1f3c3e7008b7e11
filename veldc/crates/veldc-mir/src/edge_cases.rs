//! Boundary behaviors of the optimizer.

use veldc_sem::Type;

use crate::builder::FunctionBuilder;
use crate::mir::{BinaryOp, InstKind, Module, Terminator};
use crate::pass::{OptLevel, PassManager};
use crate::passes::constant_folding::ConstantFolding;
use crate::passes::dce::Dce;
use crate::passes::simplify_cfg::SimplifyCfg;
use crate::pass::MirPass;
use crate::validate::validate_module;

#[test]
fn empty_module_survives_full_o3() {
    let mut module = Module::new();
    PassManager::standard(OptLevel::O3, None).run(&mut module);
    assert!(validate_module(&module).is_ok());
    assert!(module.functions.is_empty());
}

#[test]
fn minimal_function_survives_every_level_unchanged() {
    for level in [OptLevel::O0, OptLevel::O1, OptLevel::O2, OptLevel::O3] {
        let mut b = FunctionBuilder::new("main", Type::Unit);
        b.block();
        b.terminate(Terminator::Return(None));
        let mut module = Module::new();
        module.functions.push(b.build());
        let snapshot = module.clone();

        PassManager::standard(level, None).run(&mut module);
        assert!(validate_module(&module).is_ok());
        assert_eq!(module, snapshot, "level {level:?} must not disturb it");
    }
}

#[test]
fn zero_trip_loop_is_eliminated_after_folding() {
    // while false { sink() }
    let mut b = FunctionBuilder::new("main", Type::Unit);
    let entry = b.block();
    let header = b.block();
    let body = b.block();
    let exit = b.block();

    b.switch_to(entry);
    b.terminate(Terminator::Branch { target: header });
    b.switch_to(header);
    let cond = b.const_bool(false);
    b.terminate(Terminator::CondBranch {
        cond,
        then_block: body,
        else_block: exit,
    });
    b.switch_to(body);
    let _effect = b.call(Type::Unit, "sink", vec![]);
    b.terminate(Terminator::Branch { target: header });
    b.switch_to(exit);
    b.terminate(Terminator::Return(None));
    let mut module = Module::new();
    module.functions.push(b.build());

    PassManager::standard(OptLevel::O1, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let func = &module.functions[0];
    // The loop body is unreachable and gone; no call survives.
    assert!(!func
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .any(|i| matches!(i.kind, InstKind::Call { .. })));
    assert_eq!(func.blocks.len(), 1);
}

#[test]
fn division_by_zero_survives_the_whole_pipeline() {
    let mut b = FunctionBuilder::new("main", Type::I32);
    b.block();
    let one = b.const_i32(1);
    let zero = b.const_i32(0);
    let div = b.binary(Type::I32, BinaryOp::Div, one, zero);
    b.terminate(Terminator::Return(Some(div)));
    let mut module = Module::new();
    module.functions.push(b.build());

    PassManager::standard(OptLevel::O3, None).run(&mut module);
    assert!(validate_module(&module).is_ok());
    // The division is still there, unfolded.
    assert!(module.functions[0]
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .any(|i| matches!(i.kind, InstKind::Binary { op: BinaryOp::Div, .. })));
}

#[test]
fn folding_twice_equals_folding_once() {
    let mut b = FunctionBuilder::new("main", Type::I32);
    b.block();
    let two = b.const_i32(2);
    let three = b.const_i32(3);
    let sum = b.binary(Type::I32, BinaryOp::Add, two, three);
    b.terminate(Terminator::Return(Some(sum)));
    let mut module = Module::new();
    module.functions.push(b.build());

    ConstantFolding.run_on_module(&mut module);
    let once = module.clone();
    ConstantFolding.run_on_module(&mut module);
    assert_eq!(module, once);
}

#[test]
fn simplify_cfg_twice_equals_once() {
    let mut b = FunctionBuilder::new("main", Type::Unit);
    let entry = b.block();
    let hop = b.block();
    let end = b.block();
    b.switch_to(entry);
    b.terminate(Terminator::Branch { target: hop });
    b.switch_to(hop);
    b.terminate(Terminator::Branch { target: end });
    b.switch_to(end);
    b.terminate(Terminator::Return(None));
    let mut module = Module::new();
    module.functions.push(b.build());

    SimplifyCfg.run_on_module(&mut module);
    let once = module.clone();
    SimplifyCfg.run_on_module(&mut module);
    assert_eq!(module, once);
}

#[test]
fn dce_leaves_an_already_clean_function_alone() {
    let mut b = FunctionBuilder::new("main", Type::I32);
    b.block();
    let v = b.const_i32(1);
    b.terminate(Terminator::Return(Some(v)));
    let mut module = Module::new();
    module.functions.push(b.build());

    assert!(!Dce.run_on_module(&mut module));
}

#[test]
fn o0_does_nothing_at_all() {
    let mut b = FunctionBuilder::new("main", Type::I32);
    b.block();
    let two = b.const_i32(2);
    let three = b.const_i32(3);
    let sum = b.binary(Type::I32, BinaryOp::Add, two, three);
    let _dead = b.const_i32(99);
    b.terminate(Terminator::Return(Some(sum)));
    let mut module = Module::new();
    module.functions.push(b.build());
    let snapshot = module.clone();

    assert!(!PassManager::standard(OptLevel::O0, None).run(&mut module));
    assert_eq!(module, snapshot);
}
