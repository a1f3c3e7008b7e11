//! veldc-sem - Shared semantic model and upstream contracts.
//!
//! This crate holds everything the middle-end shares with its upstream
//! collaborators but does not itself compute:
//!
//! - [`Type`]: the semantic type representation produced by the external
//!   type checker and reused unchanged across HIR, THIR, and MIR
//! - [`TypeEnv`]: the query surface over the checker's results (expression
//!   types, field and variant indices, methods, class hierarchy, drop and
//!   copy status)
//! - [`ast`]: the type-checked AST data model the HIR builder consumes
//! - [`TraitSolver`]: the behavior-resolution contract queried during THIR
//!   lowering
//!
//! The middle-end treats all of this as read-only input. Nothing in this
//! crate runs inference or checking; it is the boundary data model.

pub mod ast;
pub mod env;
pub mod solver;
pub mod types;

pub use env::{ClassInfo, EnumDef, MethodInfo, StructDef, TypeEnv};
pub use solver::{EnvSolver, MethodResolution, ReceiverKind, ResolvedMethod, TraitSolver};
pub use types::{FloatWidth, IntWidth, Type};
