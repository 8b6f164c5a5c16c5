use quill_ir::interpret::ArithError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("call to external function `%{0}`")]
    ExternalCall(String),

    #[error(transparent)]
    Arith(#[from] ArithError),

    #[error("out of bounds access of {size} bytes at {addr:#x}")]
    OutOfBounds { addr: u64, size: usize },

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("call depth limit of {0} exceeded")]
    CallDepth(usize),

    #[error("branch on an undefined value")]
    UndefinedCondition,

    #[error("memory access through an undefined pointer")]
    UndefinedAddress,

    #[error("`%{func}` expects {expected} arguments, {found} given")]
    ArgumentCount {
        func: String,
        expected: usize,
        found: usize,
    },

    /// The function is not well formed, e.g. a block has no terminator.
    /// Verified modules never trigger this.
    #[error("malformed function: {0}")]
    Malformed(&'static str),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
