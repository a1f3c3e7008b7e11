use veldc_hir::{
    BindingKind, HirArm, HirBlock, HirEnum, HirExpr, HirExprKind, HirFunction, HirId, HirModule,
    HirParam, HirPattern, HirPatternKind,
};
use veldc_sem::ast::{BinOp, Lit};
use veldc_sem::env::MethodInfo;
use veldc_sem::{EnvSolver, ReceiverKind, Type, TypeEnv};
use veldc_util::{Span, Symbol};

use super::ThirLower;
use crate::thir::{CoercionKind, ThirExprKind};

fn sym(s: &str) -> Symbol {
    Symbol::intern(s)
}

fn expr(id: u64, ty: Type, kind: HirExprKind) -> HirExpr {
    HirExpr::new(HirId(id), ty, Span::DUMMY, kind)
}

fn int_lit(id: u64, v: i64) -> HirExpr {
    expr(id, Type::I32, HirExprKind::Literal(Lit::Int(v)))
}

fn func_with_body(ret: Type, body: HirExpr) -> HirFunction {
    HirFunction {
        id: HirId(100),
        name: sym("f"),
        mangled_name: sym("f"),
        params: vec![],
        ret,
        body: Some(body),
        attrs: vec![],
        span: Span::DUMMY,
    }
}

fn module_with(functions: Vec<HirFunction>, enums: Vec<HirEnum>) -> HirModule {
    HirModule {
        name: sym("m"),
        source_path: "m.veld".into(),
        functions,
        enums,
        ..Default::default()
    }
}

#[test]
fn widening_coercion_is_inserted_for_return_position() {
    let env = TypeEnv::new();
    let solver = EnvSolver::new(&env);

    // func f() -> I64 { 1_i32 }
    let body = int_lit(1, 1);
    let module = module_with(vec![func_with_body(Type::I64, body)], vec![]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert!(diags.is_empty());
    let lowered = thir.functions[0].body.as_ref().unwrap();
    assert_eq!(lowered.ty, Type::I64);
    let ThirExprKind::Coercion { kind, inner } = &lowered.kind else {
        panic!("expected coercion, got {:?}", lowered.kind);
    };
    assert_eq!(*kind, CoercionKind::NumericWidening);
    assert_eq!(inner.ty, Type::I32);
}

#[test]
fn mismatched_operand_widths_are_unified() {
    let env = TypeEnv::new();
    let solver = EnvSolver::new(&env);

    // I32 + I64: the left side widens.
    let left = int_lit(1, 7);
    let right = expr(2, Type::I64, HirExprKind::Literal(Lit::Int(9)));
    let sum = expr(
        3,
        Type::I64,
        HirExprKind::Binary {
            op: BinOp::Add,
            left: Box::new(left),
            right: Box::new(right),
        },
    );
    let module = module_with(vec![func_with_body(Type::I64, sum)], vec![]);
    let (thir, _) = ThirLower::new(&solver).lower_module(module);

    let lowered = thir.functions[0].body.as_ref().unwrap();
    let ThirExprKind::Binary { left, .. } = &lowered.kind else {
        panic!("expected binary");
    };
    let ThirExprKind::Coercion { kind, .. } = &left.kind else {
        panic!("expected widened left operand, got {:?}", left.kind);
    };
    assert_eq!(*kind, CoercionKind::NumericWidening);
    assert_eq!(left.ty, Type::I64);
}

#[test]
fn overloaded_operator_becomes_method_call() {
    let mut env = TypeEnv::new();
    let vec2 = sym("Vec2");
    env.register_method(
        vec2,
        sym("add"),
        MethodInfo {
            implementing_type: vec2,
            behavior: Some(sym("Add")),
            receiver_kind: ReceiverKind::Behavior,
            is_static_dispatch: true,
            params: vec![Type::named(vec2)],
            ret: Type::named(vec2),
        },
    );
    let solver = EnvSolver::new(&env);

    let left = expr(1, Type::named(vec2), HirExprKind::Var {
        name: sym("a"),
        binding: BindingKind::Param,
    });
    let right = expr(2, Type::named(vec2), HirExprKind::Var {
        name: sym("b"),
        binding: BindingKind::Param,
    });
    let sum = expr(
        3,
        Type::named(vec2),
        HirExprKind::Binary {
            op: BinOp::Add,
            left: Box::new(left),
            right: Box::new(right),
        },
    );
    let module = module_with(vec![func_with_body(Type::named(vec2), sum)], vec![]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert!(diags.is_empty());
    let lowered = thir.functions[0].body.as_ref().unwrap();
    let ThirExprKind::MethodCall {
        method,
        args,
        resolution,
        ..
    } = &lowered.kind
    else {
        panic!("expected method call, got {:?}", lowered.kind);
    };
    assert_eq!(*method, sym("add"));
    assert_eq!(args.len(), 1);
    assert_eq!(resolution.implementing_type, vec2);
    assert_eq!(resolution.receiver_kind, ReceiverKind::Behavior);
}

#[test]
fn primitive_operator_stays_binary() {
    let env = TypeEnv::new();
    let solver = EnvSolver::new(&env);

    let sum = expr(
        3,
        Type::I32,
        HirExprKind::Binary {
            op: BinOp::Add,
            left: Box::new(int_lit(1, 1)),
            right: Box::new(int_lit(2, 2)),
        },
    );
    let module = module_with(vec![func_with_body(Type::I32, sum)], vec![]);
    let (thir, _) = ThirLower::new(&solver).lower_module(module);

    let lowered = thir.functions[0].body.as_ref().unwrap();
    assert!(matches!(lowered.kind, ThirExprKind::Binary { .. }));
}

#[test]
fn ambiguous_dispatch_reports_and_continues() {
    let mut env = TypeEnv::new();
    let widget = sym("Widget");
    for imp in ["WidgetA", "WidgetB"] {
        env.register_method(
            widget,
            sym("draw"),
            MethodInfo {
                implementing_type: sym(imp),
                behavior: None,
                receiver_kind: ReceiverKind::Inherent,
                is_static_dispatch: true,
                params: vec![],
                ret: Type::Unit,
            },
        );
    }
    let solver = EnvSolver::new(&env);

    let receiver = expr(1, Type::named(widget), HirExprKind::Var {
        name: sym("w"),
        binding: BindingKind::Param,
    });
    let call = expr(
        2,
        Type::Unit,
        HirExprKind::MethodCall {
            receiver: Box::new(receiver),
            method: sym("draw"),
            type_args: vec![],
            args: vec![],
        },
    );
    let module = module_with(vec![func_with_body(Type::Unit, call)], vec![]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("ambiguous"));
    // Lowering proceeded with a placeholder.
    let lowered = thir.functions[0].body.as_ref().unwrap();
    assert!(matches!(lowered.kind, ThirExprKind::MethodCall { .. }));
}

fn maybe_enum() -> HirEnum {
    HirEnum {
        id: HirId(50),
        name: sym("Maybe"),
        mangled_name: sym("Maybe__I32"),
        variants: vec![(sym("Just"), vec![Type::I32]), (sym("Nothing"), vec![])],
        span: Span::DUMMY,
    }
}

#[test]
fn non_exhaustive_when_gets_default_arm_and_diagnostic() {
    let env = TypeEnv::new();
    let solver = EnvSolver::new(&env);

    let maybe_ty = Type::named(sym("Maybe__I32"));
    let scrutinee = expr(1, maybe_ty.clone(), HirExprKind::Var {
        name: sym("m"),
        binding: BindingKind::Param,
    });
    let just_arm = HirArm {
        pattern: HirPattern {
            id: HirId(2),
            ty: maybe_ty.clone(),
            span: Span::DUMMY,
            kind: HirPatternKind::Enum {
                enum_name: sym("Maybe__I32"),
                variant: 0,
                payload: vec![HirPattern {
                    id: HirId(3),
                    ty: Type::I32,
                    span: Span::DUMMY,
                    kind: HirPatternKind::Binding {
                        name: sym("v"),
                        mutable: false,
                    },
                }],
            },
        },
        guard: None,
        body: int_lit(4, 1),
    };
    let when = expr(
        5,
        Type::I32,
        HirExprKind::When {
            scrutinee: Box::new(scrutinee),
            arms: vec![just_arm],
        },
    );
    let module = module_with(vec![func_with_body(Type::I32, when)], vec![maybe_enum()]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("non-exhaustive"));
    assert!(diags[0].notes.iter().any(|n| n.contains("Nothing")));

    let lowered = thir.functions[0].body.as_ref().unwrap();
    let ThirExprKind::When { arms, .. } = &lowered.kind else {
        panic!("expected when");
    };
    assert_eq!(arms.len(), 2);
    let default = arms.last().unwrap();
    assert!(matches!(default.pattern.kind, HirPatternKind::Wildcard));
    assert!(matches!(default.body.kind, ThirExprKind::Unreachable));
}

#[test]
fn exhaustive_when_is_left_alone() {
    let env = TypeEnv::new();
    let solver = EnvSolver::new(&env);

    let maybe_ty = Type::named(sym("Maybe__I32"));
    let scrutinee = expr(1, maybe_ty.clone(), HirExprKind::Var {
        name: sym("m"),
        binding: BindingKind::Param,
    });
    let arms = vec![
        HirArm {
            pattern: HirPattern {
                id: HirId(2),
                ty: maybe_ty.clone(),
                span: Span::DUMMY,
                kind: HirPatternKind::Enum {
                    enum_name: sym("Maybe__I32"),
                    variant: 0,
                    payload: vec![HirPattern {
                        id: HirId(3),
                        ty: Type::I32,
                        span: Span::DUMMY,
                        kind: HirPatternKind::Binding {
                            name: sym("v"),
                            mutable: false,
                        },
                    }],
                },
            },
            guard: None,
            body: int_lit(4, 1),
        },
        HirArm {
            pattern: HirPattern {
                id: HirId(5),
                ty: maybe_ty.clone(),
                span: Span::DUMMY,
                kind: HirPatternKind::Enum {
                    enum_name: sym("Maybe__I32"),
                    variant: 1,
                    payload: vec![],
                },
            },
            guard: None,
            body: int_lit(6, 0),
        },
    ];
    let when = expr(
        7,
        Type::I32,
        HirExprKind::When {
            scrutinee: Box::new(scrutinee),
            arms,
        },
    );
    let module = module_with(vec![func_with_body(Type::I32, when)], vec![maybe_enum()]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert!(diags.is_empty());
    let lowered = thir.functions[0].body.as_ref().unwrap();
    let ThirExprKind::When { arms, .. } = &lowered.kind else {
        panic!("expected when");
    };
    assert_eq!(arms.len(), 2);
}

#[test]
fn try_marker_desugars_to_when_with_early_return() {
    let env = TypeEnv::new();
    let solver = EnvSolver::new(&env);

    let result_enum = HirEnum {
        id: HirId(60),
        name: sym("Outcome"),
        mangled_name: sym("Outcome__I32_Str"),
        variants: vec![(sym("Ok"), vec![Type::I32]), (sym("Err"), vec![Type::Str])],
        span: Span::DUMMY,
    };
    let result_ty = Type::named(sym("Outcome__I32_Str"));

    let inner = expr(1, result_ty.clone(), HirExprKind::Call {
        callee: sym("fallible"),
        args: vec![],
    });
    let tried = expr(
        2,
        Type::I32,
        HirExprKind::Try {
            inner: Box::new(inner),
        },
    );
    let mut f = func_with_body(result_ty.clone(), tried);
    f.params = vec![HirParam {
        name: sym("unused"),
        ty: Type::I32,
        span: Span::DUMMY,
    }];
    // The function itself returns the result enum, so the error arm can
    // rebuild into it.
    let wrapped_body = f.body.take().unwrap();
    f.body = Some(expr(
        3,
        result_ty.clone(),
        HirExprKind::EnumInit {
            name: sym("Outcome__I32_Str"),
            variant: 0,
            payload: vec![wrapped_body],
        },
    ));

    let module = module_with(vec![f], vec![result_enum]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert!(diags.is_empty());
    let body = thir.functions[0].body.as_ref().unwrap();
    let ThirExprKind::EnumInit { payload, .. } = &body.kind else {
        panic!("expected wrapping enum init");
    };
    let ThirExprKind::When { arms, .. } = &payload[0].kind else {
        panic!("expected desugared when, got {:?}", payload[0].kind);
    };
    assert_eq!(arms.len(), 2);
    // Ok arm unwraps to the payload value.
    assert!(matches!(arms[0].body.kind, ThirExprKind::Var { .. }));
    // Err arm returns early with the rebuilt error.
    let ThirExprKind::Return(Some(ret)) = &arms[1].body.kind else {
        panic!("expected early return, got {:?}", arms[1].body.kind);
    };
    assert!(matches!(
        ret.kind,
        ThirExprKind::EnumInit { variant: 1, .. }
    ));
}

#[test]
fn receiver_reference_auto_derefs() {
    let mut env = TypeEnv::new();
    let counter = sym("Counter");
    env.register_method(
        counter,
        sym("get"),
        MethodInfo {
            implementing_type: counter,
            behavior: None,
            receiver_kind: ReceiverKind::Inherent,
            is_static_dispatch: true,
            params: vec![],
            ret: Type::I32,
        },
    );
    let solver = EnvSolver::new(&env);

    let receiver = expr(
        1,
        Type::Ref(Box::new(Type::named(counter)), false),
        HirExprKind::Var {
            name: sym("c"),
            binding: BindingKind::Param,
        },
    );
    let call = expr(
        2,
        Type::I32,
        HirExprKind::MethodCall {
            receiver: Box::new(receiver),
            method: sym("get"),
            type_args: vec![],
            args: vec![],
        },
    );
    let module = module_with(vec![func_with_body(Type::I32, call)], vec![]);
    let (thir, diags) = ThirLower::new(&solver).lower_module(module);

    assert!(diags.is_empty());
    let lowered = thir.functions[0].body.as_ref().unwrap();
    let ThirExprKind::MethodCall { receiver, .. } = &lowered.kind else {
        panic!("expected method call");
    };
    let ThirExprKind::Coercion { kind, .. } = &receiver.kind else {
        panic!("expected auto-deref coercion, got {:?}", receiver.kind);
    };
    assert_eq!(*kind, CoercionKind::AutoDeref);
    assert_eq!(receiver.ty, Type::named(counter));
}
