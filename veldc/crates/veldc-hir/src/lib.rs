//! veldc-hir - High-level Intermediate Representation.
//!
//! HIR is a type-resolved, desugared representation of Veld programs sitting
//! between the type-checked AST and THIR. After lowering:
//!
//! - every expression carries a fully resolved type and a source span
//! - all syntactic sugar is gone (`var`, ternaries, `if let`, `for` loops,
//!   ranges)
//! - every generic use is monomorphized to a concrete instance with a
//!   mangled name
//! - field accesses and enum constructors carry resolved numeric indices
//! - closures carry their capture lists
//!
//! The [`builder::HirBuilder`] produces one [`HirModule`] per compilation
//! unit. The [`serialize`] module implements the build-cache binary format;
//! [`printer`] renders the `--emit-hir` text dump.

pub mod builder;
pub mod decl;
pub mod expr;
pub mod id;
pub mod module;
pub mod mono;
pub mod pass;
pub mod pattern;
pub mod printer;
pub mod serialize;
pub mod stmt;

pub use builder::HirBuilder;
pub use decl::{
    HirBehavior, HirConst, HirEnum, HirFnSig, HirFunction, HirImpl, HirParam, HirStruct,
};
pub use expr::{BindingKind, CaptureMode, HirArm, HirBlock, HirCapture, HirExpr, HirExprKind};
pub use id::{HirId, HirIdGenerator};
pub use module::HirModule;
pub use mono::MonomorphizationCache;
pub use pass::{HirConstFold, HirPass};
pub use pattern::{HirPattern, HirPatternKind};
pub use stmt::HirStmt;

// The operator and literal vocabulary is shared with the typed AST.
pub use veldc_sem::ast::{BinOp, Lit, UnOp};
