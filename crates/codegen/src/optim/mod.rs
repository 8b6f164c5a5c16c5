pub mod clean;
pub mod constant_folding;
pub mod cse;
pub mod dead_code;
pub mod load_after_store;
pub mod mem2reg;
pub mod pass;
pub mod pipeline;
pub mod remove_add_zero;

pub use pass::{BlockPass, FunctionPass, InstructionPass, ModulePass, PerBlock, PerFunction, PerInsn};
pub use pipeline::{optimize, optimize_with, Pass, PipelineConfig, PipelineError, PipelineStats};
