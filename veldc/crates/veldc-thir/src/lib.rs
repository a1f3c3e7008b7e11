//! veldc-thir - Typed High-level Intermediate Representation.
//!
//! THIR mirrors HIR one-to-one except that:
//!
//! - every implicit conversion is an explicit [`Coercion`](ThirExprKind::Coercion)
//!   node with a [`CoercionKind`]
//! - method calls carry a resolved dispatch record from the behavior solver
//! - overloaded operators are desugared to method calls
//! - every `when` has passed exhaustiveness checking; non-exhaustive ones get
//!   a diagnostic and a synthesized unreachable default arm
//! - the `?` marker is desugared to a `when` over the result-like enum
//!
//! Patterns and type declarations are structurally unchanged from HIR and
//! reuse its types directly.

pub mod exhaustiveness;
pub mod lower;
pub mod thir;

pub use exhaustiveness::ExhaustivenessChecker;
pub use lower::ThirLower;
pub use thir::{
    CoercionKind, ThirArm, ThirBlock, ThirConst, ThirExpr, ThirExprKind, ThirFunction, ThirImpl,
    ThirModule, ThirStmt,
};

// THIR patterns are HIR patterns; lowering moves them unchanged.
pub use veldc_hir::{HirPattern as ThirPattern, HirPatternKind as ThirPatternKind};
