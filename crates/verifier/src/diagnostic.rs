use std::fmt;

use quill_ir::{Block, FuncRef, Insn, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiagnosticCode {
    InvalidValueRef,
    InvalidBlockRef,
    InvalidCalleeRef,
    InvalidGlobalRef,
    DeadValueRef,
    MissingEntryBlock,
    InvalidSignature,
    InvalidGlobal,
    DuplicateSymbol,
    InvalidName,
    EmptyBlock,
    MissingTerminator,
    TerminatorNotLast,
    BranchToMissingBlock,
    BranchToNonInsertedBlock,
    UnreachableBlock,
    PhiNotAtBlockTop,
    PhiMissingIncoming,
    PhiHasNonPredIncoming,
    PhiDuplicateIncomingBlock,
    UseBeforeDefInBlock,
    DefDoesNotDominateUse,
    PhiIncomingNotAvailableOnEdge,
    InsnOperandTypeMismatch,
    InsnResultTypeMismatch,
    CallArgTypeMismatch,
    CallArityMismatch,
    ReturnTypeMismatch,
    UnstorableTypeInMemoryOp,
}

/// The IR invariant a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Invariant {
    /// Every block ends with its only terminator.
    SingleTerminator,
    /// Value names and block labels are unique.
    NameUniqueness,
    /// Definitions dominate their uses.
    Dominance,
    /// Every block is reachable from the entry.
    Reachability,
    TypeConsistency,
    /// Branches only target blocks of the same function.
    TargetValidity,
    /// References point to existing entities and the entry block exists.
    Structural,
}

impl Invariant {
    pub const fn id(self) -> &'static str {
        match self {
            Self::SingleTerminator => "V1",
            Self::NameUniqueness => "V2",
            Self::Dominance => "V3",
            Self::Reachability => "V4",
            Self::TypeConsistency => "V5",
            Self::TargetValidity => "V6",
            Self::Structural => "structural",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id().fmt(f)
    }
}

impl DiagnosticCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::InvalidValueRef => 1,
            Self::InvalidBlockRef => 2,
            Self::InvalidCalleeRef => 3,
            Self::InvalidGlobalRef => 4,
            Self::DeadValueRef => 5,
            Self::MissingEntryBlock => 100,
            Self::InvalidSignature => 101,
            Self::InvalidGlobal => 102,
            Self::DuplicateSymbol => 103,
            Self::InvalidName => 152,
            Self::EmptyBlock => 200,
            Self::MissingTerminator => 201,
            Self::TerminatorNotLast => 202,
            Self::BranchToMissingBlock => 300,
            Self::BranchToNonInsertedBlock => 301,
            Self::UnreachableBlock => 304,
            Self::PhiNotAtBlockTop => 400,
            Self::PhiMissingIncoming => 402,
            Self::PhiHasNonPredIncoming => 403,
            Self::PhiDuplicateIncomingBlock => 404,
            Self::UseBeforeDefInBlock => 500,
            Self::DefDoesNotDominateUse => 501,
            Self::PhiIncomingNotAvailableOnEdge => 502,
            Self::InsnOperandTypeMismatch => 600,
            Self::InsnResultTypeMismatch => 601,
            Self::CallArgTypeMismatch => 602,
            Self::CallArityMismatch => 603,
            Self::ReturnTypeMismatch => 604,
            Self::UnstorableTypeInMemoryOp => 605,
        }
    }

    pub const fn invariant(self) -> Invariant {
        match self {
            Self::InvalidValueRef
            | Self::InvalidBlockRef
            | Self::InvalidCalleeRef
            | Self::InvalidGlobalRef
            | Self::DeadValueRef
            | Self::MissingEntryBlock
            | Self::InvalidSignature
            | Self::InvalidGlobal
            | Self::DuplicateSymbol => Invariant::Structural,
            Self::InvalidName => Invariant::NameUniqueness,
            Self::EmptyBlock | Self::MissingTerminator | Self::TerminatorNotLast => {
                Invariant::SingleTerminator
            }
            Self::BranchToMissingBlock | Self::BranchToNonInsertedBlock => {
                Invariant::TargetValidity
            }
            Self::UnreachableBlock => Invariant::Reachability,
            Self::PhiNotAtBlockTop
            | Self::PhiMissingIncoming
            | Self::PhiHasNonPredIncoming
            | Self::PhiDuplicateIncomingBlock
            | Self::UseBeforeDefInBlock
            | Self::DefDoesNotDominateUse
            | Self::PhiIncomingNotAvailableOnEdge => Invariant::Dominance,
            Self::InsnOperandTypeMismatch
            | Self::InsnResultTypeMismatch
            | Self::CallArgTypeMismatch
            | Self::CallArityMismatch
            | Self::ReturnTypeMismatch
            | Self::UnstorableTypeInMemoryOp => Invariant::TypeConsistency,
        }
    }

    /// Returns `true` if the rest of the function can't be analyzed once
    /// this is reported.
    pub const fn is_structural(self) -> bool {
        matches!(
            self.invariant(),
            Invariant::Structural
                | Invariant::SingleTerminator
                | Invariant::NameUniqueness
                | Invariant::TargetValidity
        )
    }

    pub fn as_str(self) -> String {
        format!("IR{:04}", self.as_u16())
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Location {
    Module,
    Function(FuncRef),
    Block {
        func: FuncRef,
        block: Block,
    },
    Insn {
        func: FuncRef,
        block: Option<Block>,
        insn: Insn,
    },
    Value {
        func: FuncRef,
        value: Value,
    },
}

impl Location {
    pub fn func(&self) -> Option<FuncRef> {
        match self {
            Self::Module => None,
            Self::Function(func)
            | Self::Block { func, .. }
            | Self::Insn { func, .. }
            | Self::Value { func, .. } => Some(*func),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => "module".fmt(f),
            Self::Function(func) => write!(f, "{func}"),
            Self::Block { func, block } => write!(f, "{func}:{block}"),
            Self::Insn { func, block, insn } => {
                if let Some(block) = block {
                    write!(f, "{func}:{block}:{insn}")
                } else {
                    write!(f, "{func}:{insn}")
                }
            }
            Self::Value { func, value } => write!(f, "{func}:{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Note {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiagnosticContext {
    pub function_name: Option<String>,
    pub insn_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Location,
    pub notes: Vec<Note>,
    pub context: Option<DiagnosticContext>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            code,
            message: message.into(),
            location,
            notes: Vec::new(),
            context: None,
        }
    }

    pub fn with_note(mut self, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            message: message.into(),
        });
        self
    }

    pub fn with_context(mut self, context: DiagnosticContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn invariant(&self) -> Invariant {
        self.code.invariant()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error [{}/{}] {} @ {}",
            self.code,
            self.invariant(),
            self.message,
            self.location
        )?;

        if let Some(context) = &self.context {
            match (&context.function_name, &context.insn_text) {
                (Some(function_name), Some(insn_text)) => {
                    write!(f, " ({function_name}, {insn_text})")?;
                }
                (Some(function_name), None) => {
                    write!(f, " ({function_name})")?;
                }
                (None, Some(insn_text)) => {
                    write!(f, " ({insn_text})")?;
                }
                (None, None) => {}
            }
        }

        writeln!(f)?;

        for note in &self.notes {
            writeln!(f, "  note: {}", note.message)?;
        }

        Ok(())
    }
}
