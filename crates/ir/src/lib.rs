pub mod builder;
pub mod cfg;
pub mod dfg;
pub mod domtree;
pub mod func_cursor;
pub mod function;
pub mod insn;
pub mod interpret;
pub mod ir_writer;
pub mod layout;
pub mod module;
pub mod module_linker;
pub mod types;
pub mod value;

pub use builder::{BuilderError, FunctionBuilder, ModuleBuilder};
pub use cfg::ControlFlowGraph;
pub use dfg::{Block, BlockData, DataFlowGraph};
pub use domtree::{DFSet, DomTree, DominatorTreeTraversable};
pub use function::{Function, Signature};
pub use insn::{BinaryOp, Callee, CmpOp, Insn, InsnData, UnaryOp};
pub use layout::Layout;
pub use module::{ExternRef, FuncRef, GlobalData, GlobalRef, Module};
pub use module_linker::{link_modules, LinkError};
pub use types::Type;
pub use value::{Immediate, Value, ValueData};
