//! veldc-util - Core utilities and foundation types.
//!
//! This crate provides the infrastructure types shared by every phase of the
//! Veld compiler middle-end:
//!
//! - [`Symbol`]: interned strings for identifiers, method names, and keywords
//! - [`IndexVec`] / [`Idx`]: vectors with typed indices so ID spaces cannot
//!   be mixed up silently
//! - [`Span`] / [`FileId`] / [`SourceMap`]: source location tracking
//! - [`Diagnostic`] / [`DiagnosticBag`]: diagnostics as data, drained by the
//!   driver
//!
//! All of these are zero-cost abstractions: typed indices compile down to the
//! raw integers they wrap, and symbol comparison is a single `u32` compare.

pub mod diagnostic;
pub mod index_vec;
pub mod span;
pub mod symbol;

pub use diagnostic::{Diagnostic, DiagnosticBag, Level};
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, SourceFile, SourceMap, Span};
pub use symbol::Symbol;

// Re-export the hash collections used throughout the compiler.
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
