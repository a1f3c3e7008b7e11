use veldc_sem::ast::{self, AstId, AstIdGen, BinOp, Lit};
use veldc_sem::env::{EnumDef, MethodInfo, StructDef};
use veldc_sem::{ReceiverKind, Type, TypeEnv};
use veldc_util::{Span, Symbol};

use super::HirBuilder;
use crate::expr::{BindingKind, CaptureMode, HirExprKind};
use crate::pattern::HirPatternKind;
use crate::stmt::HirStmt;
use crate::HirExpr;

fn sym(s: &str) -> Symbol {
    Symbol::intern(s)
}

/// Builds typed AST nodes and records their types in the environment as it
/// goes, the way the upstream checker would have.
struct TestCx {
    ids: AstIdGen,
    env: TypeEnv,
}

impl TestCx {
    fn new() -> Self {
        Self {
            ids: AstIdGen::new(),
            env: TypeEnv::new(),
        }
    }

    fn expr(&mut self, kind: ast::ExprKind, ty: Type) -> ast::Expr {
        let id = self.ids.next();
        self.env.set_expr_type(id, ty);
        ast::Expr {
            id,
            kind,
            span: Span::DUMMY,
        }
    }

    fn int(&mut self, value: i64) -> ast::Expr {
        self.expr(ast::ExprKind::Literal(Lit::Int(value)), Type::I32)
    }

    fn ident(&mut self, name: &str, ty: Type) -> ast::Expr {
        self.expr(ast::ExprKind::Ident(sym(name)), ty)
    }

    fn pattern(&mut self, kind: ast::PatternKind) -> ast::Pattern {
        ast::Pattern {
            id: self.ids.next(),
            kind,
            span: Span::DUMMY,
        }
    }

    fn binding(&mut self, name: &str) -> ast::Pattern {
        self.pattern(ast::PatternKind::Binding {
            name: sym(name),
            mutable: false,
        })
    }

    fn block(&mut self, stmts: Vec<ast::Stmt>, tail: Option<ast::Expr>) -> ast::Block {
        ast::Block {
            stmts,
            tail: tail.map(Box::new),
            span: Span::DUMMY,
        }
    }

    fn func(&mut self, name: &str, params: Vec<(&str, Type)>, ret: Type, body: ast::Block) -> ast::FuncDecl {
        ast::FuncDecl {
            id: self.ids.next(),
            name: sym(name),
            generics: vec![],
            params: params
                .into_iter()
                .map(|(n, ty)| ast::Param {
                    name: sym(n),
                    ty,
                    span: Span::DUMMY,
                })
                .collect(),
            ret,
            body: Some(body),
            attrs: vec![],
            span: Span::DUMMY,
        }
    }

    fn module(&mut self, decls: Vec<ast::Decl>) -> ast::Module {
        ast::Module {
            name: sym("test_module"),
            source_path: "test.veld".into(),
            decls,
            imports: vec![],
        }
    }

    fn lower(self, module: &ast::Module) -> crate::HirModule {
        HirBuilder::new(&self.env).lower_module(module)
    }
}

fn body_tail(func: &crate::HirFunction) -> &HirExpr {
    let Some(body) = &func.body else {
        panic!("function has no body");
    };
    let HirExprKind::Block(block) = &body.kind else {
        panic!("function body is not a block");
    };
    block.tail.as_ref().expect("block has no tail")
}

#[test]
fn literal_body_resolved() {
    let mut cx = TestCx::new();
    let lit = cx.int(42);
    let body = cx.block(vec![], Some(lit));
    let func = cx.func("answer", vec![], Type::I32, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    assert_eq!(hir.functions.len(), 1);
    let f = &hir.functions[0];
    assert_eq!(f.mangled_name, sym("answer"));
    assert_eq!(f.ret, Type::I32);
    let tail = body_tail(f);
    assert!(tail.id.is_valid());
    assert_eq!(tail.ty, Type::I32);
    assert!(matches!(tail.kind, HirExprKind::Literal(Lit::Int(42))));
}

#[test]
fn var_statement_becomes_let_mut() {
    let mut cx = TestCx::new();
    let init = cx.int(1);
    let body = cx.block(
        vec![ast::Stmt::Var {
            name: sym("x"),
            ty: None,
            init,
            span: Span::DUMMY,
        }],
        None,
    );
    let func = cx.func("f", vec![], Type::Unit, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let f = &hir.functions[0];
    let HirExprKind::Block(block) = &f.body.as_ref().unwrap().kind else {
        panic!("expected block");
    };
    let HirStmt::Let { pattern, .. } = &block.stmts[0] else {
        panic!("expected let");
    };
    assert!(matches!(
        pattern.kind,
        HirPatternKind::Binding { mutable: true, .. }
    ));
}

#[test]
fn ternary_becomes_if() {
    let mut cx = TestCx::new();
    let cond = cx.expr(ast::ExprKind::Literal(Lit::Bool(true)), Type::Bool);
    let a = cx.int(1);
    let b = cx.int(2);
    let ternary = cx.expr(
        ast::ExprKind::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(a),
            else_expr: Box::new(b),
        },
        Type::I32,
    );
    let body = cx.block(vec![], Some(ternary));
    let func = cx.func("pick", vec![], Type::I32, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let tail = body_tail(&hir.functions[0]);
    assert_eq!(tail.ty, Type::I32);
    assert!(matches!(
        &tail.kind,
        HirExprKind::If { else_expr: Some(_), .. }
    ));
}

#[test]
fn if_let_becomes_two_arm_when() {
    let mut cx = TestCx::new();
    cx.env.register_enum(EnumDef {
        name: sym("Maybe"),
        generics: vec![],
        variants: vec![(sym("Just"), vec![Type::I32]), (sym("Nothing"), vec![])],
    });

    let scrutinee = cx.ident("m", Type::named(sym("Maybe")));
    let inner = cx.binding("v");
    let pattern = cx.pattern(ast::PatternKind::Enum {
        enum_name: sym("Maybe"),
        variant: sym("Just"),
        payload: vec![inner],
    });
    let then_tail = cx.int(1);
    let then_block = cx.block(vec![], Some(then_tail));
    let if_let = cx.expr(
        ast::ExprKind::IfLet {
            pattern,
            scrutinee: Box::new(scrutinee),
            then_block,
            else_block: None,
        },
        Type::Unit,
    );
    let body = cx.block(vec![], Some(if_let));
    let func = cx.func(
        "probe",
        vec![("m", Type::named(sym("Maybe")))],
        Type::Unit,
        body,
    );
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let tail = body_tail(&hir.functions[0]);
    let HirExprKind::When { arms, .. } = &tail.kind else {
        panic!("expected when, got {:?}", tail.kind);
    };
    assert_eq!(arms.len(), 2);
    assert!(matches!(
        arms[0].pattern.kind,
        HirPatternKind::Enum { variant: 0, .. }
    ));
    assert!(matches!(arms[1].pattern.kind, HirPatternKind::Wildcard));
}

#[test]
fn for_loop_uses_iterator_protocol() {
    let mut cx = TestCx::new();
    cx.env.register_enum(EnumDef {
        name: sym("Option"),
        generics: vec![sym("T")],
        variants: vec![
            (sym("Some"), vec![Type::Param(sym("T"))]),
            (sym("None"), vec![]),
        ],
    });
    let list_ty = Type::named(sym("IntList"));
    let iter_ty = Type::named(sym("IntListIter"));
    let option_i32 = Type::Named {
        name: sym("Option"),
        args: vec![Type::I32],
    };
    cx.env.register_method(
        sym("IntList"),
        sym("iter"),
        MethodInfo {
            implementing_type: sym("IntList"),
            behavior: None,
            receiver_kind: ReceiverKind::Inherent,
            is_static_dispatch: true,
            params: vec![],
            ret: iter_ty.clone(),
        },
    );
    cx.env.register_method(
        sym("IntListIter"),
        sym("next"),
        MethodInfo {
            implementing_type: sym("IntListIter"),
            behavior: None,
            receiver_kind: ReceiverKind::Inherent,
            is_static_dispatch: true,
            params: vec![],
            ret: option_i32,
        },
    );

    let iterable = cx.ident("xs", list_ty.clone());
    let pattern = cx.binding("x");
    let loop_body = cx.block(vec![], None);
    let for_expr = cx.expr(
        ast::ExprKind::For {
            pattern,
            iterable: Box::new(iterable),
            body: loop_body,
        },
        Type::Unit,
    );
    let body = cx.block(vec![], Some(for_expr));
    let func = cx.func("walk", vec![("xs", list_ty)], Type::Unit, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let tail = body_tail(&hir.functions[0]);
    let HirExprKind::Block(block) = &tail.kind else {
        panic!("expected desugared block");
    };
    // let mut it = xs.iter()
    let HirStmt::Let { init: Some(init), pattern, .. } = &block.stmts[0] else {
        panic!("expected iterator binding");
    };
    assert!(matches!(
        pattern.kind,
        HirPatternKind::Binding { mutable: true, .. }
    ));
    let HirExprKind::MethodCall { method, .. } = &init.kind else {
        panic!("expected iter() call");
    };
    assert_eq!(*method, sym("iter"));

    // loop { when it.next() { Some(x) => .., _ => break } }
    let HirStmt::Expr(loop_expr) = &block.stmts[1] else {
        panic!("expected loop statement");
    };
    let HirExprKind::Loop { body: loop_body } = &loop_expr.kind else {
        panic!("expected loop");
    };
    let HirExprKind::Block(loop_block) = &loop_body.kind else {
        panic!("expected loop body block");
    };
    let when = loop_block.tail.as_ref().expect("loop body tail");
    let HirExprKind::When { scrutinee, arms } = &when.kind else {
        panic!("expected when over next()");
    };
    let HirExprKind::MethodCall { method, .. } = &scrutinee.kind else {
        panic!("expected next() call");
    };
    assert_eq!(*method, sym("next"));
    assert_eq!(arms.len(), 2);
    assert!(matches!(
        arms[0].pattern.kind,
        HirPatternKind::Enum { variant: 0, .. }
    ));
    assert!(matches!(arms[1].body.kind, HirExprKind::Break(None)));
}

#[test]
fn generic_function_monomorphizes_on_call() {
    let mut cx = TestCx::new();

    // func identity[T](x: T) -> T { x }
    let t = sym("T");
    let param_ref = cx.ident("x", Type::I32);
    let template_body = cx.block(vec![], Some(param_ref));
    let mut template = cx.func(
        "identity",
        vec![("x", Type::Param(t))],
        Type::Param(t),
        template_body,
    );
    template.generics = vec![t];

    // func main() -> I32 { identity[I32](7) }
    let arg = cx.int(7);
    let call = cx.expr(
        ast::ExprKind::Call {
            callee: sym("identity"),
            type_args: vec![Type::I32],
            args: vec![arg],
        },
        Type::I32,
    );
    let main_body = cx.block(vec![], Some(call));
    let main = cx.func("main", vec![], Type::I32, main_body);

    let module = cx.module(vec![ast::Decl::Func(template), ast::Decl::Func(main)]);
    let hir = cx.lower(&module);

    // The generic template itself is not emitted; its instance is.
    let names: Vec<&str> = hir
        .functions
        .iter()
        .map(|f| f.mangled_name.as_str())
        .collect();
    assert!(names.contains(&"main"));
    assert!(names.contains(&"identity__I32"));
    assert!(!names.contains(&"identity"));

    let instance = hir.function(sym("identity__I32")).unwrap();
    assert_eq!(instance.params[0].ty, Type::I32);
    assert_eq!(instance.ret, Type::I32);

    // The call site is rewritten to the mangled name.
    let main_fn = hir.function(sym("main")).unwrap();
    let tail = body_tail(main_fn);
    let HirExprKind::Call { callee, .. } = &tail.kind else {
        panic!("expected call");
    };
    assert_eq!(*callee, sym("identity__I32"));
}

#[test]
fn closure_captures_by_ref_and_by_mut_ref() {
    let mut cx = TestCx::new();
    // Accumulator is a non-copy named type so the by-ref modes are visible.
    cx.env.register_struct(StructDef {
        name: sym("Acc"),
        generics: vec![],
        fields: vec![(sym("total"), Type::I32)],
    });
    let acc_ty = Type::named(sym("Acc"));
    let closure_ty = Type::Fn(vec![], Box::new(Type::Unit));

    // Reading closure: captures by-ref.
    let read = cx.ident("acc", acc_ty.clone());
    let read_field = cx.expr(
        ast::ExprKind::Field {
            object: Box::new(read),
            field: sym("total"),
        },
        Type::I32,
    );
    let reader = cx.expr(
        ast::ExprKind::Closure {
            params: vec![],
            body: Box::new(read_field),
        },
        closure_ty.clone(),
    );
    let reader_stmt = {
        let pat = cx.binding("r");
        ast::Stmt::Let {
            pattern: pat,
            ty: Some(closure_ty.clone()),
            init: Some(reader),
            span: Span::DUMMY,
        }
    };

    // Writing closure: captures by-mut-ref.
    let target = cx.ident("acc", acc_ty.clone());
    let target_field = cx.expr(
        ast::ExprKind::Field {
            object: Box::new(target),
            field: sym("total"),
        },
        Type::I32,
    );
    let one = cx.int(1);
    let write = cx.expr(
        ast::ExprKind::CompoundAssign {
            op: BinOp::Add,
            place: Box::new(target_field),
            value: Box::new(one),
        },
        Type::Unit,
    );
    let writer = cx.expr(
        ast::ExprKind::Closure {
            params: vec![],
            body: Box::new(write),
        },
        closure_ty.clone(),
    );
    let writer_stmt = {
        let pat = cx.binding("w");
        ast::Stmt::Let {
            pattern: pat,
            ty: Some(closure_ty),
            init: Some(writer),
            span: Span::DUMMY,
        }
    };

    let body = cx.block(vec![reader_stmt, writer_stmt], None);
    let func = cx.func("run", vec![("acc", acc_ty)], Type::Unit, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let HirExprKind::Block(block) = &hir.functions[0].body.as_ref().unwrap().kind else {
        panic!("expected block");
    };
    let closures: Vec<_> = block
        .stmts
        .iter()
        .filter_map(|s| match s {
            HirStmt::Let { init: Some(init), .. } => match &init.kind {
                HirExprKind::Closure { captures, .. } => Some(captures),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(closures.len(), 2);

    assert_eq!(closures[0].len(), 1);
    assert_eq!(closures[0][0].name, sym("acc"));
    assert_eq!(closures[0][0].mode, CaptureMode::ByRef);

    assert_eq!(closures[1].len(), 1);
    assert_eq!(closures[1][0].mode, CaptureMode::ByMutRef);
}

#[test]
fn escaping_closure_captures_by_value() {
    let mut cx = TestCx::new();
    cx.env.register_struct(StructDef {
        name: sym("Acc"),
        generics: vec![],
        fields: vec![(sym("total"), Type::I32)],
    });
    let acc_ty = Type::named(sym("Acc"));
    let closure_ty = Type::Fn(vec![], Box::new(Type::Unit));

    let read = cx.ident("acc", acc_ty.clone());
    let closure = cx.expr(
        ast::ExprKind::Closure {
            params: vec![],
            body: Box::new(read),
        },
        closure_ty.clone(),
    );
    // Returning the closure makes it escape its defining scope.
    let ret = cx.expr(ast::ExprKind::Return(Some(Box::new(closure))), Type::Never);
    let body = cx.block(vec![ast::Stmt::Expr(ret)], None);
    let func = cx.func("make", vec![("acc", acc_ty)], closure_ty, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let HirExprKind::Block(block) = &hir.functions[0].body.as_ref().unwrap().kind else {
        panic!("expected block");
    };
    let HirStmt::Expr(ret) = &block.stmts[0] else {
        panic!("expected return statement");
    };
    let HirExprKind::Return(Some(value)) = &ret.kind else {
        panic!("expected return with value");
    };
    let HirExprKind::Closure { captures, .. } = &value.kind else {
        panic!("expected closure");
    };
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].mode, CaptureMode::ByValue);
}

#[test]
fn field_access_resolves_index() {
    let mut cx = TestCx::new();
    cx.env.register_struct(StructDef {
        name: sym("Point"),
        generics: vec![],
        fields: vec![(sym("x"), Type::I32), (sym("y"), Type::I32)],
    });
    let point_ty = Type::named(sym("Point"));

    let object = cx.ident("p", point_ty.clone());
    let access = cx.expr(
        ast::ExprKind::Field {
            object: Box::new(object),
            field: sym("y"),
        },
        Type::I32,
    );
    let body = cx.block(vec![], Some(access));
    let func = cx.func("second", vec![("p", point_ty)], Type::I32, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let tail = body_tail(&hir.functions[0]);
    let HirExprKind::Field { index, .. } = &tail.kind else {
        panic!("expected field access");
    };
    assert_eq!(*index, 1);
}

#[test]
fn range_becomes_struct_init() {
    let mut cx = TestCx::new();
    let start = cx.int(0);
    let end = cx.int(10);
    let range = cx.expr(
        ast::ExprKind::Range {
            start: Box::new(start),
            end: Box::new(end),
            inclusive: false,
        },
        Type::Named {
            name: sym("Range"),
            args: vec![Type::I32],
        },
    );
    let body = cx.block(vec![ast::Stmt::Expr(range)], None);
    let func = cx.func("span", vec![], Type::Unit, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let HirExprKind::Block(block) = &hir.functions[0].body.as_ref().unwrap().kind else {
        panic!("expected block");
    };
    let HirStmt::Expr(range) = &block.stmts[0] else {
        panic!("expected expression statement");
    };
    let HirExprKind::StructInit { name, fields } = &range.kind else {
        panic!("expected range struct init");
    };
    assert_eq!(name.as_str(), "Range__I32");
    assert_eq!(fields.len(), 2);
}

#[test]
fn nested_function_is_hoisted_with_qualified_name() {
    let mut cx = TestCx::new();
    let inner_lit = cx.int(3);
    let inner_body = cx.block(vec![], Some(inner_lit));
    let inner = cx.func("helper", vec![], Type::I32, inner_body);

    let call = cx.expr(
        ast::ExprKind::Call {
            callee: sym("helper"),
            type_args: vec![],
            args: vec![],
        },
        Type::I32,
    );
    let body = cx.block(vec![ast::Stmt::Func(inner)], Some(call));
    let outer = cx.func("outer", vec![], Type::I32, body);
    let module = cx.module(vec![ast::Decl::Func(outer)]);
    let hir = cx.lower(&module);

    let names: Vec<&str> = hir
        .functions
        .iter()
        .map(|f| f.mangled_name.as_str())
        .collect();
    assert!(names.contains(&"outer__helper"));

    let outer_fn = hir.function(sym("outer")).unwrap();
    let tail = body_tail(outer_fn);
    let HirExprKind::Call { callee, .. } = &tail.kind else {
        panic!("expected call");
    };
    assert_eq!(callee.as_str(), "outer__helper");
}

#[test]
fn every_lowered_expression_has_a_valid_type() {
    let mut cx = TestCx::new();
    let a = cx.int(1);
    let b = cx.int(2);
    let sum = cx.expr(
        ast::ExprKind::Binary {
            op: BinOp::Add,
            left: Box::new(a),
            right: Box::new(b),
        },
        Type::I32,
    );
    let body = cx.block(vec![], Some(sum));
    let func = cx.func("two", vec![], Type::I32, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    fn check(expr: &HirExpr) {
        assert!(expr.id.is_valid());
        assert_ne!(expr.ty, Type::Error);
        if let HirExprKind::Binary { left, right, .. } = &expr.kind {
            check(left);
            check(right);
        }
    }
    check(body_tail(&hir.functions[0]));
}

#[test]
fn param_references_are_param_bindings() {
    let mut cx = TestCx::new();
    let reference = cx.ident("n", Type::I32);
    let body = cx.block(vec![], Some(reference));
    let func = cx.func("echo", vec![("n", Type::I32)], Type::I32, body);
    let module = cx.module(vec![ast::Decl::Func(func)]);
    let hir = cx.lower(&module);

    let tail = body_tail(&hir.functions[0]);
    assert!(matches!(
        tail.kind,
        HirExprKind::Var {
            binding: BindingKind::Param,
            ..
        }
    ));
}
