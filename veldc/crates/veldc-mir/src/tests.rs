//! End-to-end pipeline tests: source-level intent expressed as MIR via the
//! builder, run through the standard pipelines, checked against the
//! expected shape of the optimized output.

use veldc_sem::env::ClassInfo;
use veldc_sem::{Type, TypeEnv};
use veldc_util::Symbol;

use crate::builder::FunctionBuilder;
use crate::mir::{BinaryOp, ConstValue, InstKind, Module, Terminator};
use crate::pass::{MirPass, OptLevel, PassManager};
use crate::passes::devirtualization::{ClassHierarchy, Devirtualization, DevirtRecord};
use crate::validate::validate_module;

fn sym(s: &str) -> Symbol {
    Symbol::intern(s)
}

/// `(2 + 3) * 4 - 1`, returned.
fn constant_arith_module() -> Module {
    let mut b = FunctionBuilder::new("main", Type::I32);
    b.block();
    let two = b.const_i32(2);
    let three = b.const_i32(3);
    let sum = b.binary(Type::I32, BinaryOp::Add, two, three);
    let four = b.const_i32(4);
    let product = b.binary(Type::I32, BinaryOp::Mul, sum, four);
    let one = b.const_i32(1);
    let result = b.binary(Type::I32, BinaryOp::Sub, product, one);
    b.terminate(Terminator::Return(Some(result)));
    let mut module = Module::new();
    module.functions.push(b.build());
    module
}

#[test]
fn constant_arithmetic_collapses_to_nineteen() {
    let mut module = constant_arith_module();
    PassManager::standard(OptLevel::O2, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let func = &module.functions[0];
    assert_eq!(func.blocks.len(), 1);
    let block = &func.blocks[0];
    // At most one instruction besides the terminator: the constant 19.
    assert!(block.instructions.len() <= 1);
    let Some(Terminator::Return(Some(returned))) = &block.terminator else {
        panic!("expected a value return");
    };
    let returned_const = func.def_of(*returned).expect("returned def");
    assert!(matches!(
        &returned_const.kind,
        InstKind::Constant(c) if c.as_int() == Some(19)
    ));
}

#[test]
fn dead_branch_is_pruned() {
    // if true { f(1) } else { g(2) }
    let mut b = FunctionBuilder::new("main", Type::Unit);
    let entry = b.block();
    let then_block = b.block();
    let else_block = b.block();
    let join = b.block();

    b.switch_to(entry);
    let cond = b.const_bool(true);
    b.terminate(Terminator::CondBranch {
        cond,
        then_block,
        else_block,
    });
    b.switch_to(then_block);
    let one = b.const_i32(1);
    let _f = b.call(Type::Unit, "f", vec![one]);
    b.terminate(Terminator::Branch { target: join });
    b.switch_to(else_block);
    let two = b.const_i32(2);
    let _g = b.call(Type::Unit, "g", vec![two]);
    b.terminate(Terminator::Branch { target: join });
    b.switch_to(join);
    b.terminate(Terminator::Return(None));

    let mut module = Module::new();
    module.functions.push(b.build());
    PassManager::standard(OptLevel::O2, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let callees: Vec<&str> = module.functions[0]
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter_map(|i| match &i.kind {
            InstKind::Call { callee, .. } => Some(callee.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(callees, vec!["f"]);
}

#[test]
fn power_of_two_multiplication_becomes_shift() {
    let mut b = FunctionBuilder::new("main", Type::I32);
    let x = b.param(Type::I32);
    b.block();
    let eight = b.const_i32(8);
    let product = b.binary(Type::I32, BinaryOp::Mul, x, eight);
    b.terminate(Terminator::Return(Some(product)));
    let mut module = Module::new();
    module.functions.push(b.build());

    PassManager::standard(OptLevel::O2, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let func = &module.functions[0];
    let has_shift = func
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .any(|i| {
            matches!(&i.kind, InstKind::Binary { op: BinaryOp::Shl, right, .. }
                if matches!(func.def_of(*right).map(|d| &d.kind),
                    Some(InstKind::Constant(c)) if c.as_int() == Some(3)))
        });
    assert!(has_shift, "expected x*8 to become x<<3");
    assert!(!func
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .any(|i| matches!(i.kind, InstKind::Binary { op: BinaryOp::Mul, .. })));
}

#[test]
fn redundant_load_across_blocks_is_shared() {
    // load *p; branch; use the loaded value again, no intervening store.
    let mut b = FunctionBuilder::new("main", Type::I32);
    let p = b.param(Type::Ptr(Box::new(Type::I32)));
    let entry = b.block();
    let next = b.block();

    b.switch_to(entry);
    let first = b.load(Type::I32, p);
    b.terminate(Terminator::Branch { target: next });
    b.switch_to(next);
    let second = b.load(Type::I32, p);
    let sum = b.binary(Type::I32, BinaryOp::Add, first, second);
    b.terminate(Terminator::Return(Some(sum)));

    let mut module = Module::new();
    module.functions.push(b.build());
    PassManager::standard(OptLevel::O2, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let loads = module.functions[0]
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| matches!(i.kind, InstKind::Load { .. }))
        .count();
    assert_eq!(loads, 1);
}

#[test]
fn sealed_class_dispatch_devirtualizes_at_o3() {
    let mut env = TypeEnv::new();
    env.register_class(
        sym("C"),
        ClassInfo {
            is_sealed: true,
            ..Default::default()
        },
    );

    let class_ty = Type::named(sym("C"));
    let mut b = FunctionBuilder::new("main", Type::I32);
    let receiver = b.param(class_ty.clone());
    b.block();
    let result = b.push(
        Type::I32,
        InstKind::MethodCall {
            receiver,
            receiver_ty: class_ty,
            method: sym("m"),
            args: vec![],
            tail_call: false,
        },
    );
    b.terminate(Terminator::Return(Some(result)));

    // The method body, so the devirtualized call has a target.
    let mut mb = FunctionBuilder::new("C_m", Type::I32);
    let _this = mb.param(Type::named(sym("C")));
    mb.block();
    let seven = mb.const_i32(7);
    mb.terminate(Terminator::Return(Some(seven)));

    let mut module = Module::new();
    module.functions.push(b.build());
    module.functions.push(mb.build());

    PassManager::standard(OptLevel::O3, Some(&env)).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let main = module.function(sym("main")).unwrap();
    let virtual_calls = main
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| matches!(i.kind, InstKind::MethodCall { .. }))
        .count();
    assert_eq!(virtual_calls, 0, "the virtual dispatch must be gone");

    // The stats counter records the reason.
    let hierarchy = ClassHierarchy::from_env(Some(&env));
    let mut devirt = Devirtualization::new(hierarchy, DevirtRecord::shared());
    let mut fresh = Module::new();
    let mut b = FunctionBuilder::new("main", Type::I32);
    let receiver = b.param(Type::named(sym("C")));
    b.block();
    let r = b.push(
        Type::I32,
        InstKind::MethodCall {
            receiver,
            receiver_ty: Type::named(sym("C")),
            method: sym("m"),
            args: vec![],
            tail_call: false,
        },
    );
    b.terminate(Terminator::Return(Some(r)));
    fresh.functions.push(b.build());
    devirt.run_on_module(&mut fresh);
    assert_eq!(devirt.stats().devirtualized_sealed, 1);
}

#[test]
fn tail_recursive_factorial_is_marked_not_inlined() {
    // func fact(n, acc) { if n <= 1 { acc } else { fact(n-1, n*acc) } }
    let mut b = FunctionBuilder::new("fact", Type::I32);
    let n = b.param(Type::I32);
    let acc = b.param(Type::I32);
    let entry = b.block();
    let base = b.block();
    let recurse = b.block();

    b.switch_to(entry);
    let one = b.const_i32(1);
    let le = b.binary(Type::Bool, BinaryOp::Le, n, one);
    b.terminate(Terminator::CondBranch {
        cond: le,
        then_block: base,
        else_block: recurse,
    });
    b.switch_to(base);
    b.terminate(Terminator::Return(Some(acc)));
    b.switch_to(recurse);
    let one_again = b.const_i32(1);
    let next_n = b.binary(Type::I32, BinaryOp::Sub, n, one_again);
    let next_acc = b.binary(Type::I32, BinaryOp::Mul, n, acc);
    let call = b.call(Type::I32, "fact", vec![next_n, next_acc]);
    b.terminate(Terminator::Return(Some(call)));

    // A main so dead-function elimination keeps fact alive.
    let mut mb = FunctionBuilder::new("main", Type::I32);
    mb.block();
    let five = mb.const_i32(5);
    let one = mb.const_i32(1);
    let r = mb.call(Type::I32, "fact", vec![five, one]);
    mb.terminate(Terminator::Return(Some(r)));

    let mut module = Module::new();
    module.functions.push(b.build());
    module.functions.push(mb.build());

    PassManager::standard(OptLevel::O3, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    let fact = module.function(sym("fact")).expect("fact survives");
    let marked = fact
        .blocks
        .iter()
        .filter_map(|block| {
            let last = block.instructions.last()?;
            let InstKind::Call {
                callee, tail_call, ..
            } = &last.kind
            else {
                return None;
            };
            if callee.as_str() != "fact" {
                return None;
            }
            // The call result is the exact return operand, either directly
            // or through the merged exit's phi on this block's edge.
            let feeds = match &block.terminator {
                Some(Terminator::Return(Some(v))) => *v == last.result,
                Some(Terminator::Branch { target }) => {
                    let exit = fact.block(*target)?;
                    let phi = exit.instructions.first()?;
                    let InstKind::Phi { incomings } = &phi.kind else {
                        return None;
                    };
                    exit.terminator == Some(Terminator::Return(Some(phi.result)))
                        && incomings.contains(&(last.result, block.id))
                }
                _ => false,
            };
            feeds.then_some(*tail_call)
        })
        .collect::<Vec<bool>>();
    assert_eq!(marked, vec![true], "the self-recursive call is a tail call");
}

#[test]
fn higher_levels_never_grow_the_ir() {
    for build in [constant_arith_module] {
        let mut at_o1 = build();
        PassManager::standard(OptLevel::O1, None).run(&mut at_o1);
        let mut at_o2 = build();
        PassManager::standard(OptLevel::O2, None).run(&mut at_o2);
        let mut at_o3 = build();
        PassManager::standard(OptLevel::O3, None).run(&mut at_o3);

        assert!(at_o2.instruction_count() <= at_o1.instruction_count());
        assert!(at_o3.instruction_count() <= at_o2.instruction_count());
    }
}

#[test]
fn full_pipeline_is_idempotent_on_its_own_output() {
    let mut module = constant_arith_module();
    PassManager::standard(OptLevel::O2, None).run(&mut module);
    let snapshot = module.clone();
    let changed = PassManager::standard(OptLevel::O2, None).run(&mut module);
    assert!(!changed);
    assert_eq!(module, snapshot);
}

#[test]
fn unsigned_division_strength_reduces_in_pipeline() {
    use veldc_sem::IntWidth;
    let u32_ty = Type::Uint(IntWidth::W32);
    let mut b = FunctionBuilder::new("main", u32_ty.clone());
    let x = b.param(u32_ty.clone());
    b.block();
    let four = b.const_u32(4);
    let q = b.binary(u32_ty, BinaryOp::Div, x, four);
    b.terminate(Terminator::Return(Some(q)));
    let mut module = Module::new();
    module.functions.push(b.build());

    PassManager::standard(OptLevel::O2, None).run(&mut module);
    assert!(module.functions[0]
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .any(|i| matches!(i.kind, InstKind::Binary { op: BinaryOp::Shr, .. })));
}

#[test]
fn o3_runs_loop_passes_without_breaking_invariants() {
    // i = 0; while i < 4 { sink(i); i += 1 }
    let mut b = FunctionBuilder::new("main", Type::Unit);
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
    let bound = b.const_i32(4);
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
    if let InstKind::Phi { incomings } = &mut func.block_mut(header).unwrap().instructions[0].kind
    {
        incomings.push((next, body));
    }
    func.recompute_cfg();

    let mut module = Module::new();
    module.functions.push(func);
    PassManager::standard(OptLevel::O3, None).run(&mut module);
    assert!(validate_module(&module).is_ok());

    // Four calls to sink remain, however the loop was restructured.
    let calls = module.functions[0]
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| matches!(&i.kind, InstKind::Call { callee, .. } if callee.as_str() == "sink"))
        .count();
    assert_eq!(calls, 4);
}

#[test]
fn time_report_lists_passes_in_order() {
    let mut module = constant_arith_module();
    let mut pm = PassManager::standard(OptLevel::O1, None);
    pm.run(&mut module);
    let report = pm.time_report();
    assert!(report.contains("simplify-cfg"));
    assert!(report.contains("constant-folding"));
    assert!(report.contains("dce"));
}

#[test]
fn constant_values_compare_structurally() {
    assert_eq!(
        ConstValue::Bool(true).as_bool(),
        Some(true)
    );
    assert!(ConstValue::Int {
        value: 0,
        width: veldc_sem::IntWidth::W32
    }
    .is_zero());
}
