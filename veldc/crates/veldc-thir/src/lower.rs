//! HIR to THIR lowering.
//!
//! One pass over the module that makes everything the type checker proved
//! explicit in the tree:
//!
//! - coercion nodes wherever a position's declared type differs from the
//!   expression's type
//! - resolved dispatch records on every method call, via the behavior solver
//! - operator overloads rewritten to method calls
//! - exhaustiveness checking for every `when`, with a synthesized
//!   unreachable default arm (plus a diagnostic) when arms are missing
//! - the `?` marker desugared to a `when` over the result-like enum
//!
//! User-facing problems (ambiguous dispatch, non-exhaustive `when`) become
//! diagnostics and lowering continues with a placeholder; the pass never
//! panics on user error.

use rustc_hash::FxHashMap;
use veldc_hir::{
    HirBlock, HirExpr, HirExprKind, HirId, HirModule, HirPattern, HirPatternKind, HirStmt,
};
use veldc_sem::ast::BinOp;
use veldc_sem::{
    MethodResolution, ReceiverKind, ResolvedMethod, TraitSolver, Type,
};
use veldc_util::{Diagnostic, Span, Symbol};

use crate::exhaustiveness::ExhaustivenessChecker;
use crate::thir::{
    CoercionKind, ThirArm, ThirBlock, ThirConst, ThirExpr, ThirExprKind, ThirFunction, ThirImpl,
    ThirModule, ThirStmt,
};

/// Fixed operator-to-method table for operator overloading.
fn operator_method(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "rem",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
        BinOp::BitAnd => "bitand",
        BinOp::BitOr => "bitor",
        BinOp::BitXor => "bitxor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
        BinOp::And | BinOp::Or => return None,
    })
}

/// Lowers one HIR module to THIR.
pub struct ThirLower<'a> {
    solver: &'a dyn TraitSolver,
    checker: ExhaustivenessChecker,
    diagnostics: Vec<Diagnostic>,
    /// Enum shapes by mangled name, for the `?` desugaring.
    enum_variants: FxHashMap<Symbol, Vec<Vec<Type>>>,
    current_ret: Type,
    /// Ids for synthesized nodes, kept far above the builder's range.
    next_synth_id: u64,
}

impl<'a> ThirLower<'a> {
    pub fn new(solver: &'a dyn TraitSolver) -> Self {
        Self {
            solver,
            checker: ExhaustivenessChecker::new(&[], &[]),
            diagnostics: Vec::new(),
            enum_variants: FxHashMap::default(),
            current_ret: Type::Unit,
            next_synth_id: 1 << 48,
        }
    }

    /// Lower a module. The HIR is consumed; expression children move into
    /// the THIR tree. Returns the module together with the collected
    /// diagnostics.
    pub fn lower_module(mut self, module: HirModule) -> (ThirModule, Vec<Diagnostic>) {
        self.checker = ExhaustivenessChecker::new(&module.structs, &module.enums);
        for e in &module.enums {
            self.enum_variants.insert(
                e.mangled_name,
                e.variants.iter().map(|(_, p)| p.clone()).collect(),
            );
        }

        let functions = module
            .functions
            .into_iter()
            .map(|f| self.lower_function_decl(f))
            .collect();
        let impls = module
            .impls
            .into_iter()
            .map(|i| ThirImpl {
                id: i.id,
                behavior: i.behavior,
                self_ty: i.self_ty,
                methods: i
                    .methods
                    .into_iter()
                    .map(|m| self.lower_function_decl(m))
                    .collect(),
                span: i.span,
            })
            .collect();
        let constants = module
            .constants
            .into_iter()
            .map(|c| ThirConst {
                id: c.id,
                name: c.name,
                ty: c.ty.clone(),
                value: {
                    let value = self.lower_expr(c.value);
                    self.coerce(value, &c.ty)
                },
                span: c.span,
            })
            .collect();

        let thir = ThirModule {
            name: module.name,
            source_path: module.source_path,
            structs: module.structs,
            enums: module.enums,
            behaviors: module.behaviors,
            impls,
            functions,
            constants,
            imports: module.imports,
        };
        (thir, self.diagnostics)
    }

    fn lower_function_decl(&mut self, f: veldc_hir::HirFunction) -> ThirFunction {
        let saved_ret = std::mem::replace(&mut self.current_ret, f.ret.clone());
        let body = f.body.map(|b| {
            let ret = self.current_ret.clone();
            let lowered = self.lower_expr(b);
            self.coerce(lowered, &ret)
        });
        self.current_ret = saved_ret;
        ThirFunction {
            id: f.id,
            name: f.name,
            mangled_name: f.mangled_name,
            params: f.params,
            ret: f.ret,
            body,
            attrs: f.attrs,
            span: f.span,
        }
    }

    fn synth_id(&mut self) -> HirId {
        let id = HirId(self.next_synth_id);
        self.next_synth_id += 1;
        id
    }

    // ==================================================================
    // Coercions
    // ==================================================================

    /// Wrap `expr` so its type becomes `target`, inserting coercion nodes
    /// as needed. Coercions compose by nesting; a mismatch no coercion can
    /// bridge is returned unchanged (the checker already accepted it).
    fn coerce(&mut self, expr: ThirExpr, target: &Type) -> ThirExpr {
        if expr.ty == *target {
            return expr;
        }

        if let Some(kind) = coercion_between(&expr.ty, target) {
            let span = expr.span;
            let id = self.synth_id();
            return ThirExpr::new(
                id,
                target.clone(),
                span,
                ThirExprKind::Coercion {
                    kind,
                    inner: Box::new(expr),
                },
            );
        }

        // Mutable reference to shared reference of the same referent, then
        // keep bridging from there if needed.
        if let (Type::Ref(from, true), Type::Ref(_, false)) = (&expr.ty, target) {
            let shared = Type::Ref(from.clone(), false);
            let span = expr.span;
            let id = self.synth_id();
            let stepped = ThirExpr::new(
                id,
                shared,
                span,
                ThirExprKind::Coercion {
                    kind: CoercionKind::MutToConstRef,
                    inner: Box::new(expr),
                },
            );
            return self.coerce(stepped, target);
        }

        expr
    }

    /// Coerce a receiver into the shape method lookup resolved against:
    /// references auto-deref down to the named receiver type.
    fn coerce_receiver(&mut self, receiver: ThirExpr) -> ThirExpr {
        match receiver.ty.clone() {
            Type::Ref(inner, _) => {
                let span = receiver.span;
                let id = self.synth_id();
                let derefed = ThirExpr::new(
                    id,
                    (*inner).clone(),
                    span,
                    ThirExprKind::Coercion {
                        kind: CoercionKind::AutoDeref,
                        inner: Box::new(receiver),
                    },
                );
                self.coerce_receiver(derefed)
            }
            _ => receiver,
        }
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    fn lower_expr(&mut self, expr: HirExpr) -> ThirExpr {
        let HirExpr { id, ty, span, kind } = expr;
        match kind {
            HirExprKind::Literal(lit) => ThirExpr::new(id, ty, span, ThirExprKind::Literal(lit)),
            HirExprKind::Var { name, binding } => {
                ThirExpr::new(id, ty, span, ThirExprKind::Var { name, binding })
            }
            HirExprKind::Binary { op, left, right } => {
                self.lower_binary(id, ty, span, op, *left, *right)
            }
            HirExprKind::Unary { op, operand } => {
                let operand = self.lower_expr(*operand);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                )
            }
            HirExprKind::Call { callee, args } => {
                let args = args.into_iter().map(|a| self.lower_expr(a)).collect();
                ThirExpr::new(id, ty, span, ThirExprKind::Call { callee, args })
            }
            HirExprKind::MethodCall {
                receiver,
                method,
                type_args: _,
                args,
            } => self.lower_method_call(id, ty, span, *receiver, method, args),
            HirExprKind::Field {
                object,
                field,
                index,
            } => {
                let object = self.lower_expr(*object);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Field {
                        object: Box::new(object),
                        field,
                        index,
                    },
                )
            }
            HirExprKind::Index { object, index } => {
                let object = self.lower_expr(*object);
                let index = self.lower_expr(*index);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Index {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                )
            }
            HirExprKind::Tuple(elems) => {
                let elems = elems.into_iter().map(|e| self.lower_expr(e)).collect();
                ThirExpr::new(id, ty, span, ThirExprKind::Tuple(elems))
            }
            HirExprKind::Array(elems) => {
                let elems = elems.into_iter().map(|e| self.lower_expr(e)).collect();
                ThirExpr::new(id, ty, span, ThirExprKind::Array(elems))
            }
            HirExprKind::ArrayRepeat { elem, count } => {
                let elem = self.lower_expr(*elem);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::ArrayRepeat {
                        elem: Box::new(elem),
                        count,
                    },
                )
            }
            HirExprKind::StructInit { name, fields } => {
                let fields = fields.into_iter().map(|f| self.lower_expr(f)).collect();
                ThirExpr::new(id, ty, span, ThirExprKind::StructInit { name, fields })
            }
            HirExprKind::EnumInit {
                name,
                variant,
                payload,
            } => {
                let payload = payload.into_iter().map(|p| self.lower_expr(p)).collect();
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::EnumInit {
                        name,
                        variant,
                        payload,
                    },
                )
            }
            HirExprKind::Block(block) => {
                let block = self.lower_block(block);
                ThirExpr::new(id, ty, span, ThirExprKind::Block(block))
            }
            HirExprKind::If {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.lower_expr(*cond);
                let then_expr = self.lower_expr(*then_expr);
                let else_expr = else_expr.map(|e| Box::new(self.lower_expr(*e)));
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::If {
                        cond: Box::new(cond),
                        then_expr: Box::new(then_expr),
                        else_expr,
                    },
                )
            }
            HirExprKind::When { scrutinee, arms } => {
                self.lower_when(id, ty, span, *scrutinee, arms)
            }
            HirExprKind::Loop { body } => {
                let body = self.lower_expr(*body);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Loop {
                        body: Box::new(body),
                    },
                )
            }
            HirExprKind::While { cond, body } => {
                let cond = self.lower_expr(*cond);
                let body = self.lower_expr(*body);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::While {
                        cond: Box::new(cond),
                        body: Box::new(body),
                    },
                )
            }
            HirExprKind::Return(value) => {
                let value = value.map(|v| {
                    let lowered = self.lower_expr(*v);
                    let ret = self.current_ret.clone();
                    Box::new(self.coerce(lowered, &ret))
                });
                ThirExpr::new(id, ty, span, ThirExprKind::Return(value))
            }
            HirExprKind::Break(value) => {
                let value = value.map(|v| Box::new(self.lower_expr(*v)));
                ThirExpr::new(id, ty, span, ThirExprKind::Break(value))
            }
            HirExprKind::Continue => ThirExpr::new(id, ty, span, ThirExprKind::Continue),
            HirExprKind::Closure {
                params,
                captures,
                body,
            } => {
                let body = self.lower_expr(*body);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Closure {
                        params,
                        captures,
                        body: Box::new(body),
                    },
                )
            }
            HirExprKind::Cast { operand, target } => {
                let operand = self.lower_expr(*operand);
                // An explicit narrowing cast is the one place a
                // NumericNarrowing coercion appears.
                if operand.ty.is_integer()
                    && target.is_integer()
                    && operand.ty.bit_width() > target.bit_width()
                {
                    let inner = Box::new(operand);
                    ThirExpr::new(
                        id,
                        ty,
                        span,
                        ThirExprKind::Coercion {
                            kind: CoercionKind::NumericNarrowing,
                            inner,
                        },
                    )
                } else {
                    ThirExpr::new(
                        id,
                        ty,
                        span,
                        ThirExprKind::Cast {
                            operand: Box::new(operand),
                            target,
                        },
                    )
                }
            }
            HirExprKind::Try { inner } => self.lower_try(id, ty, span, *inner),
            HirExprKind::Await { inner } => {
                let inner = self.lower_expr(*inner);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Await {
                        inner: Box::new(inner),
                    },
                )
            }
            HirExprKind::Assign { place, value } => {
                let place = self.lower_expr(*place);
                let value = self.lower_expr(*value);
                let place_ty = place.ty.clone();
                let value = self.coerce(value, &place_ty);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::Assign {
                        place: Box::new(place),
                        value: Box::new(value),
                    },
                )
            }
            HirExprKind::CompoundAssign { op, place, value } => {
                let place = self.lower_expr(*place);
                let value = self.lower_expr(*value);
                let place_ty = place.ty.clone();
                let value = self.coerce(value, &place_ty);
                ThirExpr::new(
                    id,
                    ty,
                    span,
                    ThirExprKind::CompoundAssign {
                        op,
                        place: Box::new(place),
                        value: Box::new(value),
                    },
                )
            }
            HirExprKind::Lowlevel { name, args } => {
                let args = args.into_iter().map(|a| self.lower_expr(a)).collect();
                ThirExpr::new(id, ty, span, ThirExprKind::Lowlevel { name, args })
            }
        }
    }

    /// Binary operators: overloaded operators on named types become method
    /// calls; primitive operands get numeric-widening coercions when their
    /// widths differ.
    fn lower_binary(
        &mut self,
        id: HirId,
        ty: Type,
        span: Span,
        op: BinOp,
        left: HirExpr,
        right: HirExpr,
    ) -> ThirExpr {
        let left = self.lower_expr(left);
        let right = self.lower_expr(right);

        if let Type::Named { .. } = &left.ty {
            if let Some(method_name) = operator_method(op) {
                let method = Symbol::intern(method_name);
                match self
                    .solver
                    .resolve_method(&left.ty, method, std::slice::from_ref(&right.ty))
                {
                    MethodResolution::Resolved(resolution) => {
                        return ThirExpr::new(
                            id,
                            ty,
                            span,
                            ThirExprKind::MethodCall {
                                receiver: Box::new(left),
                                method,
                                args: vec![right],
                                resolution,
                            },
                        );
                    }
                    MethodResolution::Ambiguous(candidates) => {
                        self.diagnostics.push(
                            Diagnostic::error(
                                format!("ambiguous overload for operator method `{method}`"),
                                span,
                            )
                            .with_note(format!("candidates: {candidates:?}")),
                        );
                        let resolution = placeholder_resolution(&left.ty, method);
                        return ThirExpr::new(
                            id,
                            ty,
                            span,
                            ThirExprKind::MethodCall {
                                receiver: Box::new(left),
                                method,
                                args: vec![right],
                                resolution,
                            },
                        );
                    }
                    MethodResolution::NotFound => {
                        // No overload; fall through to the primitive form.
                    }
                }
            }
        }

        let (left, right) = self.unify_operands(left, right);
        ThirExpr::new(
            id,
            ty,
            span,
            ThirExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    /// Widen whichever numeric operand is narrower.
    fn unify_operands(&mut self, left: ThirExpr, right: ThirExpr) -> (ThirExpr, ThirExpr) {
        if left.ty == right.ty || !left.ty.is_numeric() || !right.ty.is_numeric() {
            return (left, right);
        }
        let (lw, rw) = (left.ty.bit_width(), right.ty.bit_width());
        if lw < rw {
            let target = right.ty.clone();
            let left = self.coerce(left, &target);
            (left, right)
        } else {
            let target = left.ty.clone();
            let right = self.coerce(right, &target);
            (left, right)
        }
    }

    fn lower_method_call(
        &mut self,
        id: HirId,
        ty: Type,
        span: Span,
        receiver: HirExpr,
        method: Symbol,
        args: Vec<HirExpr>,
    ) -> ThirExpr {
        let receiver = self.lower_expr(receiver);
        let receiver = self.coerce_receiver(receiver);
        let args: Vec<ThirExpr> = args.into_iter().map(|a| self.lower_expr(a)).collect();
        let arg_tys: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();

        let resolution = match self.solver.resolve_method(&receiver.ty, method, &arg_tys) {
            MethodResolution::Resolved(resolution) => resolution,
            MethodResolution::Ambiguous(candidates) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("ambiguous method dispatch for `{method}`"),
                        span,
                    )
                    .with_note(format!("candidates: {candidates:?}")),
                );
                placeholder_resolution(&receiver.ty, method)
            }
            MethodResolution::NotFound => {
                self.diagnostics.push(Diagnostic::error(
                    format!("no method `{method}` found for receiver type `{}`", receiver.ty),
                    span,
                ));
                placeholder_resolution(&receiver.ty, method)
            }
        };

        ThirExpr::new(
            id,
            ty,
            span,
            ThirExprKind::MethodCall {
                receiver: Box::new(receiver),
                method,
                args,
                resolution,
            },
        )
    }

    /// `when`: lower arms, then gate on exhaustiveness. A non-exhaustive
    /// `when` gets a diagnostic and a synthesized unreachable default arm so
    /// downstream lowering always sees total matches.
    fn lower_when(
        &mut self,
        id: HirId,
        ty: Type,
        span: Span,
        scrutinee: HirExpr,
        arms: Vec<veldc_hir::HirArm>,
    ) -> ThirExpr {
        let scrutinee = self.lower_expr(scrutinee);

        let unguarded: Vec<HirPattern> = arms
            .iter()
            .filter(|arm| arm.guard.is_none())
            .map(|arm| arm.pattern.clone())
            .collect();
        let refs: Vec<&HirPattern> = unguarded.iter().collect();
        let missing = self.checker.missing_patterns(&scrutinee.ty, &refs);

        let mut lowered_arms: Vec<ThirArm> = arms
            .into_iter()
            .map(|arm| ThirArm {
                pattern: arm.pattern,
                guard: arm.guard.map(|g| self.lower_expr(g)),
                body: self.lower_expr(arm.body),
            })
            .collect();

        if !missing.is_empty() {
            let mut diagnostic = Diagnostic::error(
                "non-exhaustive when expression".to_string(),
                span,
            );
            for m in &missing {
                diagnostic = diagnostic.with_note(format!("pattern `{m}` not covered"));
            }
            self.diagnostics.push(diagnostic);

            let default_pattern = HirPattern {
                id: self.synth_id(),
                ty: scrutinee.ty.clone(),
                span,
                kind: HirPatternKind::Wildcard,
            };
            let default_body =
                ThirExpr::new(self.synth_id(), ty.clone(), span, ThirExprKind::Unreachable);
            lowered_arms.push(ThirArm {
                pattern: default_pattern,
                guard: None,
                body: default_body,
            });
        }

        ThirExpr::new(
            id,
            ty,
            span,
            ThirExprKind::When {
                scrutinee: Box::new(scrutinee),
                arms: lowered_arms,
            },
        )
    }

    /// `e?` desugars to a `when` over the result-like enum: variant 0
    /// unwraps, variant 1 early-returns rebuilt in the function's result
    /// enum.
    fn lower_try(&mut self, id: HirId, ty: Type, span: Span, inner: HirExpr) -> ThirExpr {
        let inner = self.lower_expr(inner);

        let Some(inner_enum) = inner.ty.named_name() else {
            self.diagnostics.push(Diagnostic::error(
                format!("`?` applied to non-result type `{}`", inner.ty),
                span,
            ));
            return inner;
        };
        let Some(variants) = self.enum_variants.get(&inner_enum).cloned() else {
            self.diagnostics.push(Diagnostic::error(
                format!("`?` applied to unknown enum `{inner_enum}`"),
                span,
            ));
            return inner;
        };
        if variants.len() != 2 {
            self.diagnostics.push(Diagnostic::error(
                format!("`?` requires a two-variant result enum, `{inner_enum}` has {}", variants.len()),
                span,
            ));
            return inner;
        }
        let err_ty = variants[1].first().cloned().unwrap_or(Type::Unit);

        let ok_name = Symbol::intern("__ok");
        let err_name = Symbol::intern("__err");
        let scrutinee_ty = inner.ty.clone();
        let ret_enum = self.current_ret.named_name().unwrap_or(inner_enum);

        let ok_pattern = HirPattern {
            id: self.synth_id(),
            ty: scrutinee_ty.clone(),
            span,
            kind: HirPatternKind::Enum {
                enum_name: inner_enum,
                variant: 0,
                payload: vec![HirPattern {
                    id: self.synth_id(),
                    ty: ty.clone(),
                    span,
                    kind: HirPatternKind::Binding {
                        name: ok_name,
                        mutable: false,
                    },
                }],
            },
        };
        let ok_body = ThirExpr::new(
            self.synth_id(),
            ty.clone(),
            span,
            ThirExprKind::Var {
                name: ok_name,
                binding: veldc_hir::BindingKind::Local,
            },
        );

        let err_pattern = HirPattern {
            id: self.synth_id(),
            ty: scrutinee_ty,
            span,
            kind: HirPatternKind::Enum {
                enum_name: inner_enum,
                variant: 1,
                payload: vec![HirPattern {
                    id: self.synth_id(),
                    ty: err_ty.clone(),
                    span,
                    kind: HirPatternKind::Binding {
                        name: err_name,
                        mutable: false,
                    },
                }],
            },
        };
        let err_var = ThirExpr::new(
            self.synth_id(),
            err_ty,
            span,
            ThirExprKind::Var {
                name: err_name,
                binding: veldc_hir::BindingKind::Local,
            },
        );
        let rebuilt = ThirExpr::new(
            self.synth_id(),
            self.current_ret.clone(),
            span,
            ThirExprKind::EnumInit {
                name: ret_enum,
                variant: 1,
                payload: vec![err_var],
            },
        );
        let err_body = ThirExpr::new(
            self.synth_id(),
            Type::Never,
            span,
            ThirExprKind::Return(Some(Box::new(rebuilt))),
        );

        ThirExpr::new(
            id,
            ty,
            span,
            ThirExprKind::When {
                scrutinee: Box::new(inner),
                arms: vec![
                    ThirArm {
                        pattern: ok_pattern,
                        guard: None,
                        body: ok_body,
                    },
                    ThirArm {
                        pattern: err_pattern,
                        guard: None,
                        body: err_body,
                    },
                ],
            },
        )
    }

    fn lower_block(&mut self, block: HirBlock) -> ThirBlock {
        let stmts = block
            .stmts
            .into_iter()
            .map(|stmt| match stmt {
                HirStmt::Let {
                    pattern,
                    ty,
                    init,
                    span,
                } => {
                    let init = init.map(|e| {
                        let lowered = self.lower_expr(e);
                        match &ty {
                            Some(annotation) => {
                                let annotation = annotation.clone();
                                self.coerce(lowered, &annotation)
                            }
                            None => lowered,
                        }
                    });
                    ThirStmt::Let {
                        pattern,
                        ty,
                        init,
                        span,
                    }
                }
                HirStmt::Expr(e) => ThirStmt::Expr(self.lower_expr(e)),
            })
            .collect();
        let tail = block.tail.map(|t| Box::new(self.lower_expr(*t)));
        ThirBlock { stmts, tail }
    }
}

/// Coercion kind that bridges `from` to `to` in one step, if any.
fn coercion_between(from: &Type, to: &Type) -> Option<CoercionKind> {
    if from.is_never() {
        return Some(CoercionKind::NeverToAny);
    }
    match (from, to) {
        (Type::Int(fw), Type::Int(tw)) | (Type::Uint(fw), Type::Uint(tw)) if tw > fw => {
            Some(CoercionKind::NumericWidening)
        }
        (Type::Float(fw), Type::Float(tw)) if tw > fw => Some(CoercionKind::NumericWidening),
        (Type::Ref(inner, true), Type::Ref(target, false)) if inner == target => {
            Some(CoercionKind::MutToConstRef)
        }
        (Type::Ref(inner, _), _) if **inner == *to => Some(CoercionKind::AutoDeref),
        (_, Type::Ref(target, false)) if **target == *from => Some(CoercionKind::AutoRef),
        _ => None,
    }
}

fn placeholder_resolution(receiver: &Type, method: Symbol) -> ResolvedMethod {
    ResolvedMethod {
        receiver_kind: ReceiverKind::Inherent,
        implementing_type: receiver
            .named_name()
            .unwrap_or_else(|| Symbol::intern("{unresolved}")),
        method_name: method,
        is_static_dispatch: true,
    }
}

#[cfg(test)]
mod tests;
