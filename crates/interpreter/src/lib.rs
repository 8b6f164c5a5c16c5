//! Reference interpreter for quill IR.
//!
//! Instructions evaluate through [`quill_ir::interpret`], the same code the
//! constant folder uses, so a module computes the same results before and
//! after optimization.

mod error;
mod machine;
pub mod memory;

pub use error::EvalError;
pub use machine::{Machine, MachineConfig};
pub use quill_ir::interpret::EvalValue;
