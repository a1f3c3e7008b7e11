//! THIR data model.

use veldc_hir::{
    BindingKind, HirBehavior, HirCapture, HirEnum, HirId, HirParam, HirPattern, HirStruct,
};
use veldc_sem::ast::{BinOp, Lit, UnOp};
use veldc_sem::{ResolvedMethod, Type};
use veldc_util::{Span, Symbol};

/// How an implicit conversion bridges a type mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionKind {
    /// Integer widening within one signedness, or F32 to F64
    NumericWidening,
    /// Explicit `as` cast narrowing; never inserted implicitly
    NumericNarrowing,
    /// Reference to referent, in method receiver position
    AutoDeref,
    /// Value to reference, in method receiver position
    AutoRef,
    /// Mutable reference to shared reference
    MutToConstRef,
    /// The uninhabited `never` converts to anything
    NeverToAny,
}

/// A THIR expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirExpr {
    pub id: HirId,
    pub ty: Type,
    pub span: Span,
    pub kind: ThirExprKind,
}

impl ThirExpr {
    pub fn new(id: HirId, ty: Type, span: Span, kind: ThirExprKind) -> Self {
        Self { id, ty, span, kind }
    }
}

/// A block in THIR.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirBlock {
    pub stmts: Vec<ThirStmt>,
    pub tail: Option<Box<ThirExpr>>,
}

/// A THIR statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ThirStmt {
    Let {
        pattern: HirPattern,
        ty: Option<Type>,
        init: Option<ThirExpr>,
        span: Span,
    },
    Expr(ThirExpr),
}

/// One arm of a THIR `when` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirArm {
    pub pattern: HirPattern,
    pub guard: Option<ThirExpr>,
    pub body: ThirExpr,
}

/// THIR expression kinds.
///
/// Mirrors the HIR kinds, with coercions explicit, dispatch resolved, the
/// `?` marker desugared away, and an `Unreachable` kind for synthesized
/// default arms.
#[derive(Debug, Clone, PartialEq)]
pub enum ThirExprKind {
    Literal(Lit),
    Var {
        name: Symbol,
        binding: BindingKind,
    },
    /// An explicit conversion inserted by THIR lowering. The node's own
    /// type is the coercion target.
    Coercion {
        kind: CoercionKind,
        inner: Box<ThirExpr>,
    },
    Binary {
        op: BinOp,
        left: Box<ThirExpr>,
        right: Box<ThirExpr>,
    },
    Unary {
        op: UnOp,
        operand: Box<ThirExpr>,
    },
    Call {
        callee: Symbol,
        args: Vec<ThirExpr>,
    },
    MethodCall {
        receiver: Box<ThirExpr>,
        method: Symbol,
        args: Vec<ThirExpr>,
        resolution: ResolvedMethod,
    },
    Field {
        object: Box<ThirExpr>,
        field: Symbol,
        index: u32,
    },
    Index {
        object: Box<ThirExpr>,
        index: Box<ThirExpr>,
    },
    Tuple(Vec<ThirExpr>),
    Array(Vec<ThirExpr>),
    ArrayRepeat {
        elem: Box<ThirExpr>,
        count: u64,
    },
    StructInit {
        name: Symbol,
        fields: Vec<ThirExpr>,
    },
    EnumInit {
        name: Symbol,
        variant: u32,
        payload: Vec<ThirExpr>,
    },
    Block(ThirBlock),
    If {
        cond: Box<ThirExpr>,
        then_expr: Box<ThirExpr>,
        else_expr: Option<Box<ThirExpr>>,
    },
    When {
        scrutinee: Box<ThirExpr>,
        arms: Vec<ThirArm>,
    },
    Loop {
        body: Box<ThirExpr>,
    },
    While {
        cond: Box<ThirExpr>,
        body: Box<ThirExpr>,
    },
    Return(Option<Box<ThirExpr>>),
    Break(Option<Box<ThirExpr>>),
    Continue,
    Closure {
        params: Vec<HirParam>,
        captures: Vec<HirCapture>,
        body: Box<ThirExpr>,
    },
    Cast {
        operand: Box<ThirExpr>,
        target: Type,
    },
    Await {
        inner: Box<ThirExpr>,
    },
    Assign {
        place: Box<ThirExpr>,
        value: Box<ThirExpr>,
    },
    CompoundAssign {
        op: BinOp,
        place: Box<ThirExpr>,
        value: Box<ThirExpr>,
    },
    Lowlevel {
        name: Symbol,
        args: Vec<ThirExpr>,
    },
    /// Control never reaches here; used for synthesized default arms of
    /// non-exhaustive `when` expressions.
    Unreachable,
}

/// A THIR function.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirFunction {
    pub id: HirId,
    pub name: Symbol,
    pub mangled_name: Symbol,
    pub params: Vec<HirParam>,
    pub ret: Type,
    pub body: Option<ThirExpr>,
    pub attrs: Vec<Symbol>,
    pub span: Span,
}

/// A THIR impl block.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirImpl {
    pub id: HirId,
    pub behavior: Option<Symbol>,
    pub self_ty: Type,
    pub methods: Vec<ThirFunction>,
    pub span: Span,
}

/// A THIR constant.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirConst {
    pub id: HirId,
    pub name: Symbol,
    pub ty: Type,
    pub value: ThirExpr,
    pub span: Span,
}

/// A lowered THIR module. Type declarations carry over from HIR unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThirModule {
    pub name: Symbol,
    pub source_path: String,
    pub structs: Vec<HirStruct>,
    pub enums: Vec<HirEnum>,
    pub behaviors: Vec<HirBehavior>,
    pub impls: Vec<ThirImpl>,
    pub functions: Vec<ThirFunction>,
    pub constants: Vec<ThirConst>,
    pub imports: Vec<Symbol>,
}

impl ThirModule {
    /// Find a function by mangled name.
    pub fn function(&self, mangled_name: Symbol) -> Option<&ThirFunction> {
        self.functions
            .iter()
            .find(|f| f.mangled_name == mangled_name)
    }
}
