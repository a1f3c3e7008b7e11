//! veldc-mir - Mid-level Intermediate Representation and optimizer.
//!
//! MIR is an SSA control-flow graph of typed instructions. A module owns its
//! functions plus struct and enum layout tables; a function owns an ordered
//! list of basic blocks (index 0 is the entry); a block owns a linear
//! instruction sequence, exactly one terminator, and materialized
//! predecessor and successor lists.
//!
//! The crate also carries everything that runs over MIR:
//!
//! - [`builder::FunctionBuilder`]: the construction surface the external
//!   MIR lowering drives, and the test harness
//! - [`analysis`]: CFG facts (dominators, loops) and alias analysis
//! - [`passes`]: the optimization pass catalogue
//! - [`pass::PassManager`]: named pipelines per optimization level, fixpoint
//!   groups, per-pass statistics
//! - [`validate`]: the SSA invariant checker
//! - [`printer`]: the `--emit-mir` dump

pub mod analysis;
pub mod builder;
pub mod mir;
pub mod pass;
pub mod passes;
pub mod printer;
pub mod validate;

pub use builder::FunctionBuilder;
pub use mir::{
    BasicBlock, BinaryOp, BlockId, CastKind, ConstValue, EnumDef, FnAttr, Function, GepIndex,
    InstKind, Instruction, Module, StructDef, Terminator, UnaryOp, ValueId,
};
pub use pass::{MirPass, OptLevel, PassManager, PassStats};

#[cfg(test)]
mod edge_cases;
#[cfg(test)]
mod tests;
