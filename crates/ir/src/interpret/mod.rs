//! Evaluation of instructions on constants.
//!
//! Constant folding and the interpreter both evaluate through this module,
//! so an optimized program computes exactly what the unoptimized one does.
//! Integers wrap modulo `2^width`, floats follow IEEE-754 and casts follow
//! Rust `as` conversions.
use std::fmt;

use crate::{Block, Immediate};

mod arith;
mod cast;

pub use arith::{eval_binary, eval_unary};
pub use cast::eval_cast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArithError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("operand types don't match the operation")]
    TypeMismatch,
}

/// What to do after an instruction was evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Continue,
    JumpTo(Block),
    Return(Option<EvalValue>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvalValue {
    Imm(Immediate),
    #[default]
    Undef,
}

impl EvalValue {
    pub fn with_imm<F, R>(self, f: F) -> Self
    where
        F: FnOnce(Immediate) -> R,
        R: Into<Self>,
    {
        match self {
            EvalValue::Imm(value) => f(value).into(),
            EvalValue::Undef => EvalValue::Undef,
        }
    }

    pub fn zip_with_imm<F, R>(lhs: Self, rhs: Self, f: F) -> Self
    where
        F: FnOnce(Immediate, Immediate) -> R,
        R: Into<Self>,
    {
        match (lhs, rhs) {
            (EvalValue::Imm(l), EvalValue::Imm(r)) => f(l, r).into(),
            _ => EvalValue::Undef,
        }
    }

    pub fn as_imm(&self) -> Option<Immediate> {
        match self {
            Self::Imm(imm) => Some(*imm),
            _ => None,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Self::Undef)
    }
}

impl fmt::Display for EvalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm(imm) => write!(f, "{imm}"),
            Self::Undef => write!(f, "undef"),
        }
    }
}

impl From<Immediate> for EvalValue {
    fn from(imm: Immediate) -> Self {
        Self::Imm(imm)
    }
}
