//! Function-level analyses shared by the optimization passes.

pub mod alias;
pub mod cfg;
pub mod loops;

pub use alias::{AliasAnalysis, AliasResult, PointerInfo, PointerOrigin};
pub use cfg::ControlFlowGraph;
pub use loops::{find_natural_loops, NaturalLoop};
