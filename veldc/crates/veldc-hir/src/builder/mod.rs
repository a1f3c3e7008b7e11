//! HIR builder - lowers the type-checked AST to HIR.
//!
//! The builder performs, in one walk over each declaration:
//!
//! 1. **Type resolution**: every expression gets its resolved type from the
//!    type environment. A missing type is a bug in the upstream checker and
//!    aborts the pass.
//! 2. **Desugaring**: `var` to `let mut`, ternaries to `if`, `if let` to a
//!    two-arm `when`, `for` loops to the iterator protocol, ranges to range
//!    struct construction, nested functions hoisted under scope-qualified
//!    names.
//! 3. **Monomorphization**: each generic use is rewritten to a mangled
//!    concrete instance; newly discovered instances queue up and are lowered
//!    after the top-level walk, re-entrantly.
//! 4. **Index resolution**: field accesses and enum constructors get their
//!    numeric ordinals from the type environment.
//! 5. **Capture analysis**: closures record which enclosing variables they
//!    capture and how.
//!
//! The AST is assumed type-correct. The builder is a lowering pass, not a
//! validator, and does not recover from upstream bugs.

use std::collections::VecDeque;

use indexmap::IndexMap;
use veldc_sem::ast::{self, AstId, Lit};
use veldc_sem::{Type, TypeEnv};
use veldc_util::{FxHashMap, FxHashSet, Span, Symbol};

use crate::decl::{HirConst, HirFnSig, HirFunction, HirImpl, HirParam, HirStruct};
use crate::expr::{
    BindingKind, CaptureMode, HirArm, HirBlock, HirCapture, HirExpr, HirExprKind,
};
use crate::id::HirIdGenerator;
use crate::module::HirModule;
use crate::mono::MonomorphizationCache;
use crate::pattern::{HirPattern, HirPatternKind};
use crate::stmt::HirStmt;
use crate::{HirBehavior, HirEnum};

/// One pending generic instantiation.
#[derive(Debug)]
enum MonoRequest {
    Func {
        base: Symbol,
        mangled: Symbol,
        args: Vec<Type>,
    },
    Struct {
        base: Symbol,
        mangled: Symbol,
        args: Vec<Type>,
    },
    Enum {
        base: Symbol,
        mangled: Symbol,
        args: Vec<Type>,
    },
}

/// Per-capture bookkeeping while a closure body is being lowered.
#[derive(Debug)]
struct CaptureInfo {
    ty: Type,
    written: bool,
}

/// Capture collector for one closure on the lowering stack.
struct CaptureCollector {
    /// Scope depth at closure entry. Names resolved to scopes below this
    /// depth are captures.
    boundary: usize,
    captures: IndexMap<Symbol, CaptureInfo>,
}

/// One lexical scope: bound names plus nested-function renames.
#[derive(Default)]
struct Scope {
    names: FxHashMap<Symbol, BindingKind>,
    renames: FxHashMap<Symbol, Symbol>,
}

/// Builds HIR from a type-checked AST module.
///
/// One builder per compilation unit, owning its own id generator and
/// monomorphization cache. Builders are not shared between threads.
pub struct HirBuilder<'env> {
    env: &'env TypeEnv,
    ids: HirIdGenerator,
    mono: MonomorphizationCache,
    mono_requests: VecDeque<MonoRequest>,
    scopes: Vec<Scope>,
    closures: Vec<CaptureCollector>,
    /// Active generic substitution while lowering an instance.
    subst: FxHashMap<Symbol, Type>,
    current_fn: Option<Symbol>,
    /// True while lowering a position from which a closure would escape its
    /// defining scope (call argument, return value, stored value).
    escape_position: bool,
    generic_funcs: FxHashMap<Symbol, ast::FuncDecl>,
    generic_structs: FxHashMap<Symbol, ast::StructDecl>,
    generic_enums: FxHashMap<Symbol, ast::EnumDecl>,
    const_names: FxHashSet<Symbol>,
    func_names: FxHashSet<Symbol>,
    module: HirModule,
}

impl<'env> HirBuilder<'env> {
    pub fn new(env: &'env TypeEnv) -> Self {
        Self {
            env,
            ids: HirIdGenerator::new(),
            mono: MonomorphizationCache::new(),
            mono_requests: VecDeque::new(),
            scopes: Vec::new(),
            closures: Vec::new(),
            subst: FxHashMap::default(),
            current_fn: None,
            escape_position: false,
            generic_funcs: FxHashMap::default(),
            generic_structs: FxHashMap::default(),
            generic_enums: FxHashMap::default(),
            const_names: FxHashSet::default(),
            func_names: FxHashSet::default(),
            module: HirModule::default(),
        }
    }

    /// Lower a complete module. Consumes the builder.
    pub fn lower_module(mut self, ast_module: &ast::Module) -> HirModule {
        self.module = HirModule::new(ast_module.name, ast_module.source_path.clone());
        self.module.imports = ast_module.imports.clone();

        // First pass: register names and generic templates so uses can be
        // resolved regardless of declaration order.
        for decl in &ast_module.decls {
            match decl {
                ast::Decl::Func(f) => {
                    self.func_names.insert(f.name);
                    if !f.generics.is_empty() {
                        self.generic_funcs.insert(f.name, f.clone());
                    }
                }
                ast::Decl::Struct(s) if !s.generics.is_empty() => {
                    self.generic_structs.insert(s.name, s.clone());
                }
                ast::Decl::Enum(e) if !e.generics.is_empty() => {
                    self.generic_enums.insert(e.name, e.clone());
                }
                ast::Decl::Const(c) => {
                    self.const_names.insert(c.name);
                }
                ast::Decl::Impl(i) => {
                    for m in &i.methods {
                        self.func_names.insert(m.name);
                    }
                }
                _ => {}
            }
        }

        // Second pass: lower every non-generic declaration. Generic
        // templates are lowered on demand via the request queue.
        for decl in &ast_module.decls {
            match decl {
                ast::Decl::Func(f) => {
                    if f.generics.is_empty() {
                        let lowered = self.lower_function(f, f.name);
                        self.module.functions.push(lowered);
                    }
                }
                ast::Decl::Struct(s) => {
                    if s.generics.is_empty() {
                        let lowered = self.lower_struct(s, s.name);
                        self.module.structs.push(lowered);
                    }
                }
                ast::Decl::Enum(e) => {
                    if e.generics.is_empty() {
                        let lowered = self.lower_enum(e, e.name);
                        self.module.enums.push(lowered);
                    }
                }
                ast::Decl::Behavior(b) => {
                    let lowered = self.lower_behavior(b);
                    self.module.behaviors.push(lowered);
                }
                ast::Decl::Impl(i) => {
                    let lowered = self.lower_impl(i);
                    self.module.impls.push(lowered);
                }
                ast::Decl::Const(c) => {
                    let lowered = self.lower_const(c);
                    self.module.constants.push(lowered);
                }
            }
        }

        self.process_monomorphizations();
        self.module
    }

    /// Access the monomorphization cache (after lowering, for audits).
    pub fn mono_cache(&self) -> &MonomorphizationCache {
        &self.mono
    }

    // ======================================================================
    // Declarations
    // ======================================================================

    fn lower_function(&mut self, f: &ast::FuncDecl, mangled: Symbol) -> HirFunction {
        let saved_fn = self.current_fn.replace(mangled);

        let params: Vec<HirParam> = f
            .params
            .iter()
            .map(|p| HirParam {
                name: p.name,
                ty: self.resolve_ty(&p.ty),
                span: p.span,
            })
            .collect();
        let ret = self.resolve_ty(&f.ret);

        self.push_scope();
        for p in &params {
            self.declare(p.name, BindingKind::Param);
        }
        let body = f.body.as_ref().map(|b| {
            let ty = if b.tail.is_some() { ret.clone() } else { Type::Unit };
            self.lower_block_expr(b, ty)
        });
        self.pop_scope();

        self.current_fn = saved_fn;

        HirFunction {
            id: self.ids.next(),
            name: f.name,
            mangled_name: mangled,
            params,
            ret,
            body,
            attrs: f.attrs.clone(),
            span: f.span,
        }
    }

    fn lower_struct(&mut self, s: &ast::StructDecl, mangled: Symbol) -> HirStruct {
        HirStruct {
            id: self.ids.next(),
            name: s.name,
            mangled_name: mangled,
            fields: s
                .fields
                .iter()
                .map(|(name, ty)| (*name, self.resolve_ty(ty)))
                .collect(),
            span: s.span,
        }
    }

    fn lower_enum(&mut self, e: &ast::EnumDecl, mangled: Symbol) -> HirEnum {
        HirEnum {
            id: self.ids.next(),
            name: e.name,
            mangled_name: mangled,
            variants: e
                .variants
                .iter()
                .map(|(name, payload)| {
                    (*name, payload.iter().map(|t| self.resolve_ty(t)).collect())
                })
                .collect(),
            span: e.span,
        }
    }

    fn lower_behavior(&mut self, b: &ast::BehaviorDecl) -> HirBehavior {
        HirBehavior {
            id: self.ids.next(),
            name: b.name,
            methods: b
                .methods
                .iter()
                .map(|m| HirFnSig {
                    name: m.name,
                    params: m.params.iter().map(|p| self.resolve_ty(&p.ty)).collect(),
                    ret: self.resolve_ty(&m.ret),
                })
                .collect(),
            span: b.span,
        }
    }

    fn lower_impl(&mut self, i: &ast::ImplDecl) -> HirImpl {
        HirImpl {
            id: self.ids.next(),
            behavior: i.behavior,
            self_ty: self.resolve_ty(&i.self_ty),
            methods: i
                .methods
                .iter()
                .filter(|m| m.generics.is_empty())
                .map(|m| self.lower_function(m, m.name))
                .collect(),
            span: i.span,
        }
    }

    fn lower_const(&mut self, c: &ast::ConstDecl) -> HirConst {
        HirConst {
            id: self.ids.next(),
            name: c.name,
            ty: self.resolve_ty(&c.ty),
            value: self.lower_expr(&c.value),
            span: c.span,
        }
    }

    // ======================================================================
    // Monomorphization
    // ======================================================================

    fn process_monomorphizations(&mut self) {
        // Newly discovered uses inside just-lowered instances append to the
        // queue, so this drains re-entrantly until quiet.
        while let Some(request) = self.mono_requests.pop_front() {
            match request {
                MonoRequest::Func {
                    base,
                    mangled,
                    args,
                } => {
                    let Some(template) = self.generic_funcs.get(&base).cloned() else {
                        // No visible template; the instance lives in another
                        // unit and only the name rewrite matters here.
                        continue;
                    };
                    let saved = self.enter_subst(&template.generics, &args);
                    let lowered = self.lower_function(&template, mangled);
                    self.module.functions.push(lowered);
                    self.subst = saved;
                }
                MonoRequest::Struct {
                    base,
                    mangled,
                    args,
                } => {
                    let Some(template) = self.generic_structs.get(&base).cloned() else {
                        continue;
                    };
                    let saved = self.enter_subst(&template.generics, &args);
                    let lowered = self.lower_struct(&template, mangled);
                    self.module.structs.push(lowered);
                    self.subst = saved;
                }
                MonoRequest::Enum {
                    base,
                    mangled,
                    args,
                } => {
                    let Some(template) = self.generic_enums.get(&base).cloned() else {
                        continue;
                    };
                    let saved = self.enter_subst(&template.generics, &args);
                    let lowered = self.lower_enum(&template, mangled);
                    self.module.enums.push(lowered);
                    self.subst = saved;
                }
            }
        }
    }

    fn enter_subst(&mut self, generics: &[Symbol], args: &[Type]) -> FxHashMap<Symbol, Type> {
        assert_eq!(
            generics.len(),
            args.len(),
            "monomorphization arity mismatch"
        );
        let mut fresh = FxHashMap::default();
        for (param, arg) in generics.iter().zip(args) {
            fresh.insert(*param, arg.clone());
        }
        std::mem::replace(&mut self.subst, fresh)
    }

    /// Rewrite a semantic type under the active substitution, monomorphizing
    /// every generic named type it mentions.
    fn resolve_ty(&mut self, ty: &Type) -> Type {
        let ty = ty.substitute(&self.subst);
        self.mono_ty(&ty)
    }

    fn mono_ty(&mut self, ty: &Type) -> Type {
        match ty {
            Type::Named { name, args } if !args.is_empty() => {
                let args: Vec<Type> = args.iter().map(|a| self.mono_ty(a)).collect();
                let (mangled, fresh) = self.mono.get_or_create_type(*name, &args);
                if fresh {
                    if self.generic_structs.contains_key(name) {
                        self.mono_requests.push_back(MonoRequest::Struct {
                            base: *name,
                            mangled,
                            args: args.clone(),
                        });
                    } else if self.generic_enums.contains_key(name) {
                        self.mono_requests.push_back(MonoRequest::Enum {
                            base: *name,
                            mangled,
                            args: args.clone(),
                        });
                    }
                }
                Type::named(mangled)
            }
            Type::Tuple(tys) => Type::Tuple(tys.iter().map(|t| self.mono_ty(t)).collect()),
            Type::Array(elem, n) => Type::Array(Box::new(self.mono_ty(elem)), *n),
            Type::Slice(elem) => Type::Slice(Box::new(self.mono_ty(elem))),
            Type::Ptr(inner) => Type::Ptr(Box::new(self.mono_ty(inner))),
            Type::Ref(inner, m) => Type::Ref(Box::new(self.mono_ty(inner)), *m),
            Type::Fn(params, ret) => Type::Fn(
                params.iter().map(|p| self.mono_ty(p)).collect(),
                Box::new(self.mono_ty(ret)),
            ),
            _ => ty.clone(),
        }
    }

    // ======================================================================
    // Expressions
    // ======================================================================

    /// Resolved type of an AST expression; aborts on a missing entry.
    fn expr_ty(&mut self, id: AstId, span: Span) -> Type {
        let Some(ty) = self.env.expr_type(id).cloned() else {
            panic!(
                "missing resolved type for expression at {span} (type checker bug)",
            );
        };
        self.resolve_ty(&ty)
    }

    /// The pre-monomorphization environment type of an expression, used for
    /// name-based lookups (field and variant indices).
    fn raw_expr_ty(&self, id: AstId, span: Span) -> &Type {
        match self.env.expr_type(id) {
            Some(ty) => ty,
            None => panic!(
                "missing resolved type for expression at {span} (type checker bug)",
            ),
        }
    }

    fn mk(&mut self, ty: Type, span: Span, kind: HirExprKind) -> HirExpr {
        HirExpr::new(self.ids.next(), ty, span, kind)
    }

    fn unit_expr(&mut self, span: Span) -> HirExpr {
        self.mk(Type::Unit, span, HirExprKind::Literal(Lit::Unit))
    }

    pub(crate) fn lower_expr(&mut self, expr: &ast::Expr) -> HirExpr {
        let span = expr.span;
        match &expr.kind {
            ast::ExprKind::Literal(lit) => {
                let ty = self.expr_ty(expr.id, span);
                self.mk(ty, span, HirExprKind::Literal(lit.clone()))
            }
            ast::ExprKind::Ident(name) => self.lower_ident(*name, expr.id, span),
            ast::ExprKind::Binary { op, left, right } => {
                let ty = self.expr_ty(expr.id, span);
                let left = Box::new(self.lower_operand(left));
                let right = Box::new(self.lower_operand(right));
                self.mk(ty, span, HirExprKind::Binary { op: *op, left, right })
            }
            ast::ExprKind::Unary { op, operand } => {
                let ty = self.expr_ty(expr.id, span);
                let operand = Box::new(self.lower_operand(operand));
                self.mk(ty, span, HirExprKind::Unary { op: *op, operand })
            }
            ast::ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.lower_call(expr, *callee, type_args, args),
            ast::ExprKind::MethodCall {
                receiver,
                method,
                type_args,
                args,
            } => {
                let ty = self.expr_ty(expr.id, span);
                let receiver = Box::new(self.lower_operand(receiver));
                let type_args: Vec<Type> =
                    type_args.iter().map(|t| self.resolve_ty(t)).collect();
                let args = self.lower_escaping_args(args);
                self.mk(
                    ty,
                    span,
                    HirExprKind::MethodCall {
                        receiver,
                        method: *method,
                        type_args,
                        args,
                    },
                )
            }
            ast::ExprKind::Field { object, field } => {
                let ty = self.expr_ty(expr.id, span);
                let index = self.field_index_of(object, *field, span);
                let object = Box::new(self.lower_operand(object));
                self.mk(
                    ty,
                    span,
                    HirExprKind::Field {
                        object,
                        field: *field,
                        index,
                    },
                )
            }
            ast::ExprKind::Index { object, index } => {
                let ty = self.expr_ty(expr.id, span);
                let object = Box::new(self.lower_operand(object));
                let index = Box::new(self.lower_operand(index));
                self.mk(ty, span, HirExprKind::Index { object, index })
            }
            ast::ExprKind::Tuple(elems) => {
                let ty = self.expr_ty(expr.id, span);
                let elems = self.lower_escaping_args(elems);
                self.mk(ty, span, HirExprKind::Tuple(elems))
            }
            ast::ExprKind::Array(elems) => {
                let ty = self.expr_ty(expr.id, span);
                let elems = self.lower_escaping_args(elems);
                self.mk(ty, span, HirExprKind::Array(elems))
            }
            ast::ExprKind::ArrayRepeat { elem, count } => {
                let ty = self.expr_ty(expr.id, span);
                let elem = Box::new(self.lower_in_escape_position(elem));
                self.mk(
                    ty,
                    span,
                    HirExprKind::ArrayRepeat {
                        elem,
                        count: *count,
                    },
                )
            }
            ast::ExprKind::StructLit {
                name,
                type_args,
                fields,
            } => self.lower_struct_lit(expr, *name, type_args, fields),
            ast::ExprKind::EnumCtor {
                enum_name,
                type_args,
                variant,
                payload,
            } => self.lower_enum_ctor(expr, *enum_name, type_args, *variant, payload),
            ast::ExprKind::Block(block) => {
                let ty = self.expr_ty(expr.id, span);
                self.lower_block_expr_spanned(block, ty, span)
            }
            ast::ExprKind::If {
                cond,
                then_block,
                else_expr,
            } => {
                let ty = self.expr_ty(expr.id, span);
                let cond = Box::new(self.lower_operand(cond));
                let then_ty = if else_expr.is_some() { ty.clone() } else { Type::Unit };
                let then_expr =
                    Box::new(self.lower_block_expr_spanned(then_block, then_ty, then_block.span));
                let else_expr = else_expr
                    .as_ref()
                    .map(|e| Box::new(self.lower_operand(e)));
                self.mk(
                    ty,
                    span,
                    HirExprKind::If {
                        cond,
                        then_expr,
                        else_expr,
                    },
                )
            }
            // `a ? b : c` desugars to `if a { b } else { c }` with the
            // resolved type propagated.
            ast::ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let ty = self.expr_ty(expr.id, span);
                let cond = Box::new(self.lower_operand(cond));
                let then_expr = Box::new(self.lower_operand(then_expr));
                let else_expr = Some(Box::new(self.lower_operand(else_expr)));
                self.mk(
                    ty,
                    span,
                    HirExprKind::If {
                        cond,
                        then_expr,
                        else_expr,
                    },
                )
            }
            ast::ExprKind::IfLet {
                pattern,
                scrutinee,
                then_block,
                else_block,
            } => self.lower_if_let(expr, pattern, scrutinee, then_block, else_block.as_ref()),
            ast::ExprKind::When { scrutinee, arms } => {
                let ty = self.expr_ty(expr.id, span);
                let scrutinee_ty = self.raw_expr_ty(scrutinee.id, scrutinee.span).clone();
                let scrutinee = Box::new(self.lower_operand(scrutinee));
                let arms = arms
                    .iter()
                    .map(|arm| self.lower_arm(arm, &scrutinee_ty))
                    .collect();
                self.mk(ty, span, HirExprKind::When { scrutinee, arms })
            }
            ast::ExprKind::Loop { body } => {
                let ty = self.expr_ty(expr.id, span);
                let body = Box::new(self.lower_block_expr_spanned(body, Type::Unit, body.span));
                self.mk(ty, span, HirExprKind::Loop { body })
            }
            ast::ExprKind::While { cond, body } => {
                let cond = Box::new(self.lower_operand(cond));
                let body = Box::new(self.lower_block_expr_spanned(body, Type::Unit, body.span));
                self.mk(Type::Unit, span, HirExprKind::While { cond, body })
            }
            ast::ExprKind::For {
                pattern,
                iterable,
                body,
            } => self.lower_for(pattern, iterable, body, span),
            ast::ExprKind::Return(value) => {
                let value = value
                    .as_ref()
                    .map(|v| Box::new(self.lower_in_escape_position(v)));
                self.mk(Type::Never, span, HirExprKind::Return(value))
            }
            ast::ExprKind::Break(value) => {
                let value = value.as_ref().map(|v| Box::new(self.lower_operand(v)));
                self.mk(Type::Never, span, HirExprKind::Break(value))
            }
            ast::ExprKind::Continue => self.mk(Type::Never, span, HirExprKind::Continue),
            ast::ExprKind::Closure { params, body } => {
                self.lower_closure(expr, params, body, span)
            }
            // `a..b` and `a..=b` construct the corresponding range struct.
            ast::ExprKind::Range {
                start,
                end,
                inclusive,
            } => {
                let elem_ty = self.expr_ty(start.id, start.span);
                let base = if *inclusive {
                    Symbol::intern("RangeInclusive")
                } else {
                    Symbol::intern("Range")
                };
                let (mangled, fresh) = self.mono.get_or_create_type(base, &[elem_ty.clone()]);
                if fresh && self.generic_structs.contains_key(&base) {
                    self.mono_requests.push_back(MonoRequest::Struct {
                        base,
                        mangled,
                        args: vec![elem_ty],
                    });
                }
                let start = self.lower_operand(start);
                let end = self.lower_operand(end);
                self.mk(
                    Type::named(mangled),
                    span,
                    HirExprKind::StructInit {
                        name: mangled,
                        fields: vec![start, end],
                    },
                )
            }
            ast::ExprKind::Cast { expr: inner, ty } => {
                let target = self.resolve_ty(ty);
                let operand = Box::new(self.lower_operand(inner));
                self.mk(
                    target.clone(),
                    span,
                    HirExprKind::Cast { operand, target },
                )
            }
            ast::ExprKind::Try(inner) => {
                let ty = self.expr_ty(expr.id, span);
                let inner = Box::new(self.lower_operand(inner));
                self.mk(ty, span, HirExprKind::Try { inner })
            }
            ast::ExprKind::Await(inner) => {
                let ty = self.expr_ty(expr.id, span);
                let inner = Box::new(self.lower_operand(inner));
                self.mk(ty, span, HirExprKind::Await { inner })
            }
            ast::ExprKind::Assign { place, value } => {
                let place_expr = self.lower_operand(place);
                let value = Box::new(self.lower_in_escape_position(value));
                self.mark_assignment_target(place);
                self.mk(
                    Type::Unit,
                    span,
                    HirExprKind::Assign {
                        place: Box::new(place_expr),
                        value,
                    },
                )
            }
            ast::ExprKind::CompoundAssign { op, place, value } => {
                let place_expr = self.lower_operand(place);
                let value = Box::new(self.lower_operand(value));
                self.mark_assignment_target(place);
                self.mk(
                    Type::Unit,
                    span,
                    HirExprKind::CompoundAssign {
                        op: *op,
                        place: Box::new(place_expr),
                        value,
                    },
                )
            }
            ast::ExprKind::Lowlevel { name, args } => {
                let ty = self.expr_ty(expr.id, span);
                let args = args.iter().map(|a| self.lower_operand(a)).collect();
                self.mk(ty, span, HirExprKind::Lowlevel { name: *name, args })
            }
        }
    }

    /// Lower a subexpression in a non-escaping position.
    fn lower_operand(&mut self, expr: &ast::Expr) -> HirExpr {
        let saved = std::mem::replace(&mut self.escape_position, false);
        let lowered = self.lower_expr(expr);
        self.escape_position = saved;
        lowered
    }

    /// Lower a subexpression in a position from which closures escape.
    fn lower_in_escape_position(&mut self, expr: &ast::Expr) -> HirExpr {
        let saved = std::mem::replace(&mut self.escape_position, true);
        let lowered = self.lower_expr(expr);
        self.escape_position = saved;
        lowered
    }

    fn lower_escaping_args(&mut self, args: &[ast::Expr]) -> Vec<HirExpr> {
        args.iter()
            .map(|a| self.lower_in_escape_position(a))
            .collect()
    }

    fn lower_ident(&mut self, name: Symbol, id: AstId, span: Span) -> HirExpr {
        let ty = self.expr_ty(id, span);

        if let Some((scope_idx, binding)) = self.lookup_local(name) {
            self.record_capture(name, scope_idx, &ty);
            return self.mk(ty, span, HirExprKind::Var { name, binding });
        }
        if self.const_names.contains(&name) {
            return self.mk(
                ty,
                span,
                HirExprKind::Var {
                    name,
                    binding: BindingKind::Const,
                },
            );
        }
        if self.func_names.contains(&name) {
            return self.mk(
                ty,
                span,
                HirExprKind::Var {
                    name,
                    binding: BindingKind::Func,
                },
            );
        }
        panic!("unresolved name `{name}` at {span} (type checker bug)");
    }

    fn lower_call(
        &mut self,
        expr: &ast::Expr,
        callee: Symbol,
        type_args: &[Type],
        args: &[ast::Expr],
    ) -> HirExpr {
        let span = expr.span;
        let ty = self.expr_ty(expr.id, span);

        let mut callee = self.resolve_nested_rename(callee);
        if !type_args.is_empty() {
            let concrete: Vec<Type> = type_args.iter().map(|t| self.resolve_ty(t)).collect();
            let (mangled, fresh) = self.mono.get_or_create_func(callee, &concrete);
            if fresh && self.generic_funcs.contains_key(&callee) {
                self.mono_requests.push_back(MonoRequest::Func {
                    base: callee,
                    mangled,
                    args: concrete,
                });
            }
            callee = mangled;
        }

        let args = self.lower_escaping_args(args);
        self.mk(ty, span, HirExprKind::Call { callee, args })
    }

    fn lower_struct_lit(
        &mut self,
        expr: &ast::Expr,
        name: Symbol,
        type_args: &[Type],
        fields: &[(Symbol, ast::Expr)],
    ) -> HirExpr {
        let span = expr.span;
        let ty = self.expr_ty(expr.id, span);

        let def = self
            .env
            .struct_def(name)
            .unwrap_or_else(|| panic!("unknown struct `{name}` at {span} (type checker bug)"));

        // Reorder the provided fields into declaration order.
        let order: Vec<Symbol> = def.fields.iter().map(|(n, _)| *n).collect();
        let mut lowered = Vec::with_capacity(order.len());
        for field_name in order {
            let provided = fields
                .iter()
                .find(|(n, _)| *n == field_name)
                .unwrap_or_else(|| {
                    panic!("missing field `{field_name}` in `{name}` literal at {span}")
                });
            lowered.push(self.lower_in_escape_position(&provided.1));
        }

        let mangled = if type_args.is_empty() {
            name
        } else {
            let concrete: Vec<Type> = type_args.iter().map(|t| self.resolve_ty(t)).collect();
            let (mangled, fresh) = self.mono.get_or_create_type(name, &concrete);
            if fresh && self.generic_structs.contains_key(&name) {
                self.mono_requests.push_back(MonoRequest::Struct {
                    base: name,
                    mangled,
                    args: concrete,
                });
            }
            mangled
        };

        self.mk(
            ty,
            span,
            HirExprKind::StructInit {
                name: mangled,
                fields: lowered,
            },
        )
    }

    fn lower_enum_ctor(
        &mut self,
        expr: &ast::Expr,
        enum_name: Symbol,
        type_args: &[Type],
        variant: Symbol,
        payload: &[ast::Expr],
    ) -> HirExpr {
        let span = expr.span;
        let ty = self.expr_ty(expr.id, span);

        let index = self
            .env
            .variant_index(enum_name, variant)
            .unwrap_or_else(|| {
                panic!("unknown variant `{enum_name}::{variant}` at {span} (type checker bug)")
            });

        let mangled = if type_args.is_empty() {
            enum_name
        } else {
            let concrete: Vec<Type> = type_args.iter().map(|t| self.resolve_ty(t)).collect();
            let (mangled, fresh) = self.mono.get_or_create_type(enum_name, &concrete);
            if fresh && self.generic_enums.contains_key(&enum_name) {
                self.mono_requests.push_back(MonoRequest::Enum {
                    base: enum_name,
                    mangled,
                    args: concrete,
                });
            }
            mangled
        };

        let payload = self.lower_escaping_args(payload);
        self.mk(
            ty,
            span,
            HirExprKind::EnumInit {
                name: mangled,
                variant: index,
                payload,
            },
        )
    }

    /// `if let P = e { then } else { alt }` becomes a two-arm `when`.
    fn lower_if_let(
        &mut self,
        expr: &ast::Expr,
        pattern: &ast::Pattern,
        scrutinee: &ast::Expr,
        then_block: &ast::Block,
        else_block: Option<&ast::Block>,
    ) -> HirExpr {
        let span = expr.span;
        let ty = self.expr_ty(expr.id, span);
        let scrutinee_ty = self.raw_expr_ty(scrutinee.id, scrutinee.span).clone();
        let scrutinee = Box::new(self.lower_operand(scrutinee));

        self.push_scope();
        let matched = self.lower_pattern(pattern, &scrutinee_ty);
        let then_body = self.lower_block_expr_spanned(then_block, ty.clone(), then_block.span);
        self.pop_scope();

        let else_body = match else_block {
            Some(block) => self.lower_block_expr_spanned(block, ty.clone(), block.span),
            None => self.unit_expr(span),
        };
        let wildcard_ty = matched.ty.clone();
        let wildcard = HirPattern {
            id: self.ids.next(),
            ty: wildcard_ty,
            span,
            kind: HirPatternKind::Wildcard,
        };

        self.mk(
            ty,
            span,
            HirExprKind::When {
                scrutinee,
                arms: vec![
                    HirArm {
                        pattern: matched,
                        guard: None,
                        body: then_body,
                    },
                    HirArm {
                        pattern: wildcard,
                        guard: None,
                        body: else_body,
                    },
                ],
            },
        )
    }

    /// `for p in e { body }` becomes an iterator-protocol loop:
    ///
    /// ```text
    /// {
    ///     let mut it = e.iter()
    ///     loop {
    ///         when it.next() {
    ///             Item(p) => { body }
    ///             _ => break
    ///         }
    ///     }
    /// }
    /// ```
    ///
    /// The method and enum names come from the type environment's iterator
    /// protocol, so no surface-language spelling is hardcoded here.
    fn lower_for(
        &mut self,
        pattern: &ast::Pattern,
        iterable: &ast::Expr,
        body: &ast::Block,
        span: Span,
    ) -> HirExpr {
        let protocol = self.env.iterator_protocol().clone();

        let iterable_ty = self.raw_expr_ty(iterable.id, iterable.span).clone();
        let iterable_name = iterable_ty
            .named_name()
            .unwrap_or_else(|| panic!("for-loop iterable at {span} has no iterator protocol"));

        let iter_info = self
            .env
            .lookup_method(iterable_name, protocol.iter_method)
            .first()
            .unwrap_or_else(|| {
                panic!("missing iterator method on `{iterable_name}` at {span}")
            })
            .clone();
        let iter_ty_raw = iter_info.ret.clone();
        let iter_name_raw = iter_ty_raw
            .named_name()
            .unwrap_or_else(|| panic!("iterator type at {span} is not a named type"));
        let next_info = self
            .env
            .lookup_method(iter_name_raw, protocol.next_method)
            .first()
            .unwrap_or_else(|| panic!("missing next method on `{iter_name_raw}` at {span}"))
            .clone();
        let option_ty_raw = next_info.ret.clone();

        let iter_ty = self.resolve_ty(&iter_ty_raw);
        let option_ty = self.resolve_ty(&option_ty_raw);
        let option_name = option_ty
            .named_name()
            .unwrap_or_else(|| panic!("iterator item wrapper at {span} is not a named type"));

        // Synthesized loop variable; the leading underscores keep it out of
        // the way of user names.
        let iter_var = Symbol::intern(&format!("__iter{}", self.ids.count() + 1));

        self.push_scope();

        let iterable_expr = self.lower_operand(iterable);
        let iter_call = self.mk(
            iter_ty.clone(),
            span,
            HirExprKind::MethodCall {
                receiver: Box::new(iterable_expr),
                method: protocol.iter_method,
                type_args: vec![],
                args: vec![],
            },
        );

        let iter_pattern = HirPattern {
            id: self.ids.next(),
            ty: iter_ty.clone(),
            span,
            kind: HirPatternKind::Binding {
                name: iter_var,
                mutable: true,
            },
        };
        self.declare(iter_var, BindingKind::Local);
        let let_iter = HirStmt::Let {
            pattern: iter_pattern,
            ty: Some(iter_ty.clone()),
            init: Some(iter_call),
            span,
        };

        // when it.next() { Item(p) => body, _ => break }
        let iter_var_expr = self.mk(
            iter_ty,
            span,
            HirExprKind::Var {
                name: iter_var,
                binding: BindingKind::Local,
            },
        );
        let next_call = self.mk(
            option_ty.clone(),
            span,
            HirExprKind::MethodCall {
                receiver: Box::new(iter_var_expr),
                method: protocol.next_method,
                type_args: vec![],
                args: vec![],
            },
        );

        self.push_scope();
        let item_ty = self.item_type_of(&option_ty_raw, span);
        let item_pattern = self.lower_pattern(pattern, &item_ty);
        let some_pattern = HirPattern {
            id: self.ids.next(),
            ty: option_ty.clone(),
            span,
            kind: HirPatternKind::Enum {
                enum_name: option_name,
                variant: 0,
                payload: vec![item_pattern],
            },
        };
        let body_expr = self.lower_block_expr_spanned(body, Type::Unit, body.span);
        self.pop_scope();

        let none_pattern = HirPattern {
            id: self.ids.next(),
            ty: option_ty,
            span,
            kind: HirPatternKind::Wildcard,
        };
        let break_expr = self.mk(Type::Never, span, HirExprKind::Break(None));

        let when = self.mk(
            Type::Unit,
            span,
            HirExprKind::When {
                scrutinee: Box::new(next_call),
                arms: vec![
                    HirArm {
                        pattern: some_pattern,
                        guard: None,
                        body: body_expr,
                    },
                    HirArm {
                        pattern: none_pattern,
                        guard: None,
                        body: break_expr,
                    },
                ],
            },
        );

        let loop_body = self.mk(
            Type::Unit,
            span,
            HirExprKind::Block(HirBlock {
                stmts: vec![],
                tail: Some(Box::new(when)),
            }),
        );
        let loop_expr = self.mk(Type::Unit, span, HirExprKind::Loop {
            body: Box::new(loop_body),
        });

        self.pop_scope();

        self.mk(
            Type::Unit,
            span,
            HirExprKind::Block(HirBlock {
                stmts: vec![let_iter, HirStmt::Expr(loop_expr)],
                tail: None,
            }),
        )
    }

    /// Payload type of variant 0 of the iterator's option-like enum.
    fn item_type_of(&self, option_ty: &Type, span: Span) -> Type {
        let Type::Named { name, args } = option_ty else {
            panic!("iterator wrapper at {span} is not a named type");
        };
        let def = self
            .env
            .enum_def(*name)
            .unwrap_or_else(|| panic!("unknown iterator wrapper enum `{name}` at {span}"));
        let payload = def
            .variants
            .first()
            .and_then(|(_, payload)| payload.first())
            .unwrap_or_else(|| panic!("iterator wrapper `{name}` has no item payload"));
        if def.generics.is_empty() {
            payload.clone()
        } else {
            let mut subst = FxHashMap::default();
            for (param, arg) in def.generics.iter().zip(args) {
                subst.insert(*param, arg.clone());
            }
            payload.substitute(&subst)
        }
    }

    fn lower_closure(
        &mut self,
        expr: &ast::Expr,
        params: &[ast::Param],
        body: &ast::Expr,
        span: Span,
    ) -> HirExpr {
        let ty = self.expr_ty(expr.id, span);
        let escapes = self.escape_position;

        self.closures.push(CaptureCollector {
            boundary: self.scopes.len(),
            captures: IndexMap::new(),
        });
        self.push_scope();

        let params: Vec<HirParam> = params
            .iter()
            .map(|p| {
                let pty = self.resolve_ty(&p.ty);
                self.declare(p.name, BindingKind::Param);
                HirParam {
                    name: p.name,
                    ty: pty,
                    span: p.span,
                }
            })
            .collect();
        let body = Box::new(self.lower_operand(body));

        self.pop_scope();
        let collector = self.closures.pop().expect("closure stack underflow");

        let captures = collector
            .captures
            .into_iter()
            .map(|(name, info)| {
                let mode = if escapes || self.env.is_copy(&info.ty) {
                    CaptureMode::ByValue
                } else if info.written {
                    CaptureMode::ByMutRef
                } else {
                    CaptureMode::ByRef
                };
                HirCapture {
                    name,
                    ty: info.ty,
                    mode,
                }
            })
            .collect();

        self.mk(
            ty,
            span,
            HirExprKind::Closure {
                params,
                captures,
                body,
            },
        )
    }

    fn lower_arm(&mut self, arm: &ast::WhenArm, scrutinee_ty: &Type) -> HirArm {
        self.push_scope();
        let pattern = self.lower_pattern(&arm.pattern, scrutinee_ty);
        let guard = arm.guard.as_ref().map(|g| self.lower_operand(g));
        let body = self.lower_operand(&arm.body);
        self.pop_scope();
        HirArm {
            pattern,
            guard,
            body,
        }
    }

    // ======================================================================
    // Blocks and statements
    // ======================================================================

    fn lower_block_expr(&mut self, block: &ast::Block, ty: Type) -> HirExpr {
        self.lower_block_expr_spanned(block, ty, block.span)
    }

    fn lower_block_expr_spanned(&mut self, block: &ast::Block, ty: Type, span: Span) -> HirExpr {
        self.push_scope();

        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            if let Some(lowered) = self.lower_stmt(stmt) {
                stmts.push(lowered);
            }
        }
        let tail = block.tail.as_ref().map(|t| Box::new(self.lower_expr(t)));

        self.pop_scope();
        self.mk(ty, span, HirExprKind::Block(HirBlock { stmts, tail }))
    }

    /// Lower one statement. Nested function declarations are hoisted into
    /// the module under scope-qualified names and produce no statement.
    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Option<HirStmt> {
        match stmt {
            ast::Stmt::Let {
                pattern,
                ty,
                init,
                span,
            } => {
                let expected = match (ty, init) {
                    (Some(annotation), _) => annotation.clone(),
                    (None, Some(init)) => self.raw_expr_ty(init.id, init.span).clone(),
                    (None, None) => panic!("let binding without type or initializer at {span}"),
                };
                let init = init.as_ref().map(|e| self.lower_operand(e));
                let pattern = self.lower_pattern(pattern, &expected);
                let ty = ty.as_ref().map(|t| self.resolve_ty(t));
                Some(HirStmt::Let {
                    pattern,
                    ty,
                    init,
                    span: *span,
                })
            }
            // `var x = e` is sugar for `let mut x = e`.
            ast::Stmt::Var {
                name,
                ty,
                init,
                span,
            } => {
                let expected = match ty {
                    Some(annotation) => annotation.clone(),
                    None => self.raw_expr_ty(init.id, init.span).clone(),
                };
                let init_expr = self.lower_operand(init);
                let resolved = self.resolve_ty(&expected);
                let pattern = HirPattern {
                    id: self.ids.next(),
                    ty: resolved,
                    span: *span,
                    kind: HirPatternKind::Binding {
                        name: *name,
                        mutable: true,
                    },
                };
                self.declare(*name, BindingKind::Local);
                Some(HirStmt::Let {
                    pattern,
                    ty: ty.as_ref().map(|t| self.resolve_ty(t)),
                    init: Some(init_expr),
                    span: *span,
                })
            }
            ast::Stmt::Func(nested) => {
                let outer = self.current_fn.expect("nested function outside a function");
                let qualified =
                    Symbol::intern(&format!("{}__{}", outer.as_str(), nested.name.as_str()));
                self.rename_in_scope(nested.name, qualified);
                let lowered = self.lower_function(nested, qualified);
                self.module.functions.push(lowered);
                None
            }
            ast::Stmt::Expr(expr) => Some(HirStmt::Expr(self.lower_expr(expr))),
        }
    }

    // ======================================================================
    // Patterns
    // ======================================================================

    /// Lower a pattern against the (pre-monomorphization) type it matches.
    ///
    /// Binding patterns declare their names into the current scope.
    fn lower_pattern(&mut self, pattern: &ast::Pattern, expected: &Type) -> HirPattern {
        let span = pattern.span;
        let ty = self.resolve_ty(expected);
        let kind = match &pattern.kind {
            ast::PatternKind::Wildcard => HirPatternKind::Wildcard,
            ast::PatternKind::Binding { name, mutable } => {
                self.declare(*name, BindingKind::Local);
                HirPatternKind::Binding {
                    name: *name,
                    mutable: *mutable,
                }
            }
            ast::PatternKind::Literal(lit) => HirPatternKind::Literal(lit.clone()),
            ast::PatternKind::Tuple(pats) => {
                let Type::Tuple(elem_tys) = expected else {
                    panic!("tuple pattern against non-tuple type at {span}");
                };
                HirPatternKind::Tuple(
                    pats.iter()
                        .zip(elem_tys)
                        .map(|(p, t)| self.lower_pattern(p, t))
                        .collect(),
                )
            }
            ast::PatternKind::Struct { name, fields } => {
                let def = self.env.struct_def(*name).unwrap_or_else(|| {
                    panic!("unknown struct `{name}` in pattern at {span} (type checker bug)")
                });
                let generics = def.generics.clone();
                let args = match expected {
                    Type::Named { args, .. } => args.clone(),
                    _ => vec![],
                };
                let mut subst = FxHashMap::default();
                for (param, arg) in generics.iter().zip(&args) {
                    subst.insert(*param, arg.clone());
                }
                let mut lowered = Vec::with_capacity(fields.len());
                for (field_name, sub) in fields {
                    let index = def.field_index(*field_name).unwrap_or_else(|| {
                        panic!("unknown field `{field_name}` in pattern at {span}")
                    });
                    let field_ty = def
                        .field_type(*field_name)
                        .expect("field type follows field index")
                        .substitute(&subst);
                    lowered.push((index, self.lower_pattern(sub, &field_ty)));
                }
                HirPatternKind::Struct {
                    name: ty.named_name().unwrap_or(*name),
                    fields: lowered,
                }
            }
            ast::PatternKind::Enum {
                enum_name,
                variant,
                payload,
            } => {
                let def = self.env.enum_def(*enum_name).unwrap_or_else(|| {
                    panic!("unknown enum `{enum_name}` in pattern at {span} (type checker bug)")
                });
                let index = def.variant_index(*variant).unwrap_or_else(|| {
                    panic!("unknown variant `{enum_name}::{variant}` at {span}")
                });
                let payload_tys = def.variants[index as usize].1.clone();
                let generics = def.generics.clone();
                let args = match expected {
                    Type::Named { args, .. } => args.clone(),
                    _ => vec![],
                };
                let mut subst = FxHashMap::default();
                for (param, arg) in generics.iter().zip(&args) {
                    subst.insert(*param, arg.clone());
                }
                let payload = payload
                    .iter()
                    .zip(&payload_tys)
                    .map(|(p, t)| self.lower_pattern(p, &t.substitute(&subst)))
                    .collect();
                HirPatternKind::Enum {
                    enum_name: ty.named_name().unwrap_or(*enum_name),
                    variant: index,
                    payload,
                }
            }
            ast::PatternKind::Or(pats) => HirPatternKind::Or(
                pats.iter()
                    .map(|p| self.lower_pattern(p, expected))
                    .collect(),
            ),
            ast::PatternKind::Range {
                start,
                end,
                inclusive,
            } => HirPatternKind::Range {
                start: start.clone(),
                end: end.clone(),
                inclusive: *inclusive,
            },
            ast::PatternKind::Array {
                prefix,
                has_rest,
                suffix,
            } => {
                let elem_ty = match expected {
                    Type::Array(elem, _) | Type::Slice(elem) => (**elem).clone(),
                    _ => panic!("array pattern against non-array type at {span}"),
                };
                HirPatternKind::Array {
                    prefix: prefix
                        .iter()
                        .map(|p| self.lower_pattern(p, &elem_ty))
                        .collect(),
                    has_rest: *has_rest,
                    suffix: suffix
                        .iter()
                        .map(|p| self.lower_pattern(p, &elem_ty))
                        .collect(),
                }
            }
        };

        HirPattern {
            id: self.ids.next(),
            ty,
            span,
            kind,
        }
    }

    // ======================================================================
    // Scopes and captures
    // ======================================================================

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: Symbol, kind: BindingKind) {
        self.scopes
            .last_mut()
            .expect("declaration outside any scope")
            .names
            .insert(name, kind);
    }

    fn rename_in_scope(&mut self, from: Symbol, to: Symbol) {
        self.scopes
            .last_mut()
            .expect("rename outside any scope")
            .renames
            .insert(from, to);
    }

    fn resolve_nested_rename(&self, name: Symbol) -> Symbol {
        for scope in self.scopes.iter().rev() {
            if let Some(renamed) = scope.renames.get(&name) {
                return *renamed;
            }
        }
        name
    }

    /// Innermost scope index holding `name`, with its binding kind.
    fn lookup_local(&self, name: Symbol) -> Option<(usize, BindingKind)> {
        for (idx, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(kind) = scope.names.get(&name) {
                return Some((idx, *kind));
            }
        }
        None
    }

    /// Record `name` as a capture in every closure whose boundary it
    /// crosses. Nested closures capture transitively.
    fn record_capture(&mut self, name: Symbol, scope_idx: usize, ty: &Type) {
        for collector in &mut self.closures {
            if scope_idx < collector.boundary {
                collector
                    .captures
                    .entry(name)
                    .or_insert_with(|| CaptureInfo {
                        ty: ty.clone(),
                        written: false,
                    });
            }
        }
    }

    /// Mark the base variable of an assignment target as written, for
    /// capture-mode inference.
    fn mark_assignment_target(&mut self, place: &ast::Expr) {
        let mut current = place;
        loop {
            match &current.kind {
                ast::ExprKind::Ident(name) => {
                    if let Some((scope_idx, _)) = self.lookup_local(*name) {
                        for collector in &mut self.closures {
                            if scope_idx < collector.boundary {
                                if let Some(info) = collector.captures.get_mut(name) {
                                    info.written = true;
                                }
                            }
                        }
                    }
                    return;
                }
                ast::ExprKind::Field { object, .. } => current = object,
                ast::ExprKind::Index { object, .. } => current = object,
                ast::ExprKind::Unary { operand, .. } => current = operand,
                _ => return,
            }
        }
    }

    fn field_index_of(&self, object: &ast::Expr, field: Symbol, span: Span) -> u32 {
        let mut ty = self.raw_expr_ty(object.id, object.span);
        while let Type::Ref(inner, _) = ty {
            ty = inner;
        }
        let name = ty.named_name().unwrap_or_else(|| {
            panic!("field access on non-struct type `{ty}` at {span} (type checker bug)")
        });
        self.env.field_index(name, field).unwrap_or_else(|| {
            panic!("unknown field `{field}` on `{name}` at {span} (type checker bug)")
        })
    }
}

#[cfg(test)]
mod tests;
