//! HIR declarations: functions, structs, enums, behaviors, impls, constants.
//!
//! All generic items are fully monomorphized before they land here. Each
//! declaration carries both its source name and its `mangled_name`; for
//! non-generic items the two are equal.

use veldc_sem::Type;
use veldc_util::{Span, Symbol};

use crate::expr::HirExpr;
use crate::id::HirId;

/// Function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct HirParam {
    pub name: Symbol,
    pub ty: Type,
    pub span: Span,
}

/// Function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HirFunction {
    pub id: HirId,
    pub name: Symbol,
    pub mangled_name: Symbol,
    pub params: Vec<HirParam>,
    pub ret: Type,
    /// Body block; `None` for extern declarations.
    pub body: Option<HirExpr>,
    /// Attribute names: `inline`, `noinline`, `export`, `test`, `bench`,
    /// `fuzz`, `extern`.
    pub attrs: Vec<Symbol>,
    pub span: Span,
}

impl HirFunction {
    pub fn has_attr(&self, attr: Symbol) -> bool {
        self.attrs.contains(&attr)
    }
}

/// Struct definition with fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct HirStruct {
    pub id: HirId,
    pub name: Symbol,
    pub mangled_name: Symbol,
    pub fields: Vec<(Symbol, Type)>,
    pub span: Span,
}

/// Enum definition with variants in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct HirEnum {
    pub id: HirId,
    pub name: Symbol,
    pub mangled_name: Symbol,
    pub variants: Vec<(Symbol, Vec<Type>)>,
    pub span: Span,
}

/// Method signature inside a behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct HirFnSig {
    pub name: Symbol,
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Behavior (trait) definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HirBehavior {
    pub id: HirId,
    pub name: Symbol,
    pub methods: Vec<HirFnSig>,
    pub span: Span,
}

/// Implementation block.
#[derive(Debug, Clone, PartialEq)]
pub struct HirImpl {
    pub id: HirId,
    pub behavior: Option<Symbol>,
    pub self_ty: Type,
    pub methods: Vec<HirFunction>,
    pub span: Span,
}

/// Compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub struct HirConst {
    pub id: HirId,
    pub name: Symbol,
    pub ty: Type,
    pub value: HirExpr,
    pub span: Span,
}
