//! Type-checked AST - the input contract of the HIR builder.
//!
//! The parser and type checker live upstream of this workspace. What arrives
//! here is their combined output: a syntax tree whose every expression node
//! carries an [`AstId`] that the [`TypeEnv`](crate::TypeEnv) can map to a
//! fully resolved type. The middle-end assumes the tree is type-correct;
//! lowering is not a validator.
//!
//! Field accesses and enum constructors still carry plain names at this
//! stage. Resolving them to numeric indices is the HIR builder's job.

use veldc_util::{Span, Symbol};

use crate::types::Type;

/// Identifier of an AST node within one compilation unit.
///
/// Used as the key for [`TypeEnv`](crate::TypeEnv) expression-type lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AstId(pub u32);

/// Sequential [`AstId`] generator, one per compilation unit.
#[derive(Default)]
pub struct AstIdGen {
    next: u32,
}

impl AstIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> AstId {
        let id = AstId(self.next);
        self.next += 1;
        id
    }
}

/// A complete type-checked compilation unit.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: Symbol,
    pub source_path: String,
    pub decls: Vec<Decl>,
    pub imports: Vec<Symbol>,
}

/// Top-level declaration.
#[derive(Debug, Clone)]
pub enum Decl {
    Func(FuncDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Behavior(BehaviorDecl),
    Impl(ImplDecl),
    Const(ConstDecl),
}

/// Function declaration.
///
/// Generic functions keep their parameter names in `generics`; their types
/// mention `Type::Param` until monomorphization.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub id: AstId,
    pub name: Symbol,
    pub generics: Vec<Symbol>,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Option<Block>,
    pub attrs: Vec<Symbol>,
    pub span: Span,
}

/// Function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Symbol,
    pub ty: Type,
    pub span: Span,
}

/// Struct declaration.
#[derive(Debug, Clone)]
pub struct StructDecl {
    pub id: AstId,
    pub name: Symbol,
    pub generics: Vec<Symbol>,
    pub fields: Vec<(Symbol, Type)>,
    pub span: Span,
}

/// Enum declaration.
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub id: AstId,
    pub name: Symbol,
    pub generics: Vec<Symbol>,
    pub variants: Vec<(Symbol, Vec<Type>)>,
    pub span: Span,
}

/// Behavior (trait) declaration.
#[derive(Debug, Clone)]
pub struct BehaviorDecl {
    pub id: AstId,
    pub name: Symbol,
    pub methods: Vec<FuncDecl>,
    pub span: Span,
}

/// Implementation block.
#[derive(Debug, Clone)]
pub struct ImplDecl {
    pub id: AstId,
    pub behavior: Option<Symbol>,
    pub self_ty: Type,
    pub methods: Vec<FuncDecl>,
    pub span: Span,
}

/// Compile-time constant declaration.
#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub id: AstId,
    pub name: Symbol,
    pub ty: Type,
    pub value: Expr,
    pub span: Span,
}

/// Expression node.
#[derive(Debug, Clone)]
pub struct Expr {
    pub id: AstId,
    pub kind: ExprKind,
    pub span: Span,
}

/// Expression kinds as produced by the parser, before desugaring.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Lit),
    Ident(Symbol),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Symbol,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: Symbol,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    Field {
        object: Box<Expr>,
        field: Symbol,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    ArrayRepeat {
        elem: Box<Expr>,
        count: u64,
    },
    StructLit {
        name: Symbol,
        type_args: Vec<Type>,
        fields: Vec<(Symbol, Expr)>,
    },
    EnumCtor {
        enum_name: Symbol,
        type_args: Vec<Type>,
        variant: Symbol,
        payload: Vec<Expr>,
    },
    Block(Block),
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_expr: Option<Box<Expr>>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    IfLet {
        pattern: Pattern,
        scrutinee: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
    },
    When {
        scrutinee: Box<Expr>,
        arms: Vec<WhenArm>,
    },
    Loop {
        body: Block,
    },
    While {
        cond: Box<Expr>,
        body: Block,
    },
    For {
        pattern: Pattern,
        iterable: Box<Expr>,
        body: Block,
    },
    Return(Option<Box<Expr>>),
    Break(Option<Box<Expr>>),
    Continue,
    Closure {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Cast {
        expr: Box<Expr>,
        ty: Type,
    },
    Try(Box<Expr>),
    Await(Box<Expr>),
    Assign {
        place: Box<Expr>,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: BinOp,
        place: Box<Expr>,
        value: Box<Expr>,
    },
    Lowlevel {
        name: Symbol,
        args: Vec<Expr>,
    },
}

/// When-arm with optional guard.
#[derive(Debug, Clone)]
pub struct WhenArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
}

/// A `{ ... }` block: statements followed by an optional tail expression.
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
    pub span: Span,
}

/// Statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    Let {
        pattern: Pattern,
        ty: Option<Type>,
        init: Option<Expr>,
        span: Span,
    },
    /// `var x = e`; rewritten to `let mut` during HIR lowering.
    Var {
        name: Symbol,
        ty: Option<Type>,
        init: Expr,
        span: Span,
    },
    /// Nested function declaration; hoisted to module level during HIR
    /// lowering under a scope-qualified name.
    Func(FuncDecl),
    Expr(Expr),
}

/// Pattern node.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: AstId,
    pub kind: PatternKind,
    pub span: Span,
}

/// Pattern kinds.
#[derive(Debug, Clone)]
pub enum PatternKind {
    Wildcard,
    Binding {
        name: Symbol,
        mutable: bool,
    },
    Literal(Lit),
    Tuple(Vec<Pattern>),
    Struct {
        name: Symbol,
        fields: Vec<(Symbol, Pattern)>,
    },
    Enum {
        enum_name: Symbol,
        variant: Symbol,
        payload: Vec<Pattern>,
    },
    Or(Vec<Pattern>),
    Range {
        start: Lit,
        end: Lit,
        inclusive: bool,
    },
    Array {
        prefix: Vec<Pattern>,
        has_rest: bool,
        suffix: Vec<Pattern>,
    },
}

/// Literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(Symbol),
    Unit,
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}
