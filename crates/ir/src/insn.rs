//! This module contains quill IR instructions definitions.

use std::fmt;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use super::{
    module::{ExternRef, FuncRef, GlobalRef},
    Block, DataFlowGraph, Immediate, Type, Value,
};

/// An opaque reference to [`InsnData`]
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insn(pub u32);
entity_impl!(Insn, "insn");

/// An instruction data definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InsnData {
    /// A typed constant.
    Const { imm: Immediate },

    /// An undefined value of `ty`.
    Undef { ty: Type },

    /// Unary instructions.
    Unary { code: UnaryOp, args: [Value; 1] },

    /// Binary instructions.
    Binary { code: BinaryOp, args: [Value; 2] },

    /// Numeric conversion to `ty`.
    Cast { args: [Value; 1], ty: Type },

    /// Load a value from memory.
    Load { args: [Value; 1], ty: Type },

    /// Store a value to memory. `args` is `[addr, value]`.
    Store { args: [Value; 2] },

    /// Allocate a stack slot for a value of `ty`.
    Alloc { ty: Type },

    /// Address of a module global.
    GlobalAddr { gv: GlobalRef },

    /// Function call.
    Call {
        callee: Callee,
        args: SmallVec<[Value; 8]>,
        ret_ty: Type,
    },

    /// Phi funcion.
    Phi {
        values: SmallVec<[Value; 8]>,
        blocks: SmallVec<[Block; 8]>,
        ty: Type,
    },

    /// Unconditional jump instruction.
    Jump { dests: [Block; 1] },

    /// Conditional jump instruction. Jumps to `dests[0]` when `args[0] cond
    /// args[1]` holds, to `dests[1]` otherwise.
    Branch {
        cond: CmpOp,
        args: [Value; 2],
        dests: [Block; 2],
    },

    /// Return a value.
    Return { args: [Value; 1] },

    /// Return from a `void` function.
    Exit,
}

impl InsnData {
    pub fn constant(imm: impl Into<Immediate>) -> Self {
        Self::Const { imm: imm.into() }
    }

    pub fn unary(code: UnaryOp, arg: Value) -> Self {
        Self::Unary { code, args: [arg] }
    }

    pub fn binary(code: BinaryOp, lhs: Value, rhs: Value) -> Self {
        Self::Binary {
            code,
            args: [lhs, rhs],
        }
    }

    pub fn cast(arg: Value, ty: Type) -> Self {
        Self::Cast { args: [arg], ty }
    }

    pub fn load(addr: Value, ty: Type) -> Self {
        Self::Load { args: [addr], ty }
    }

    pub fn store(addr: Value, value: Value) -> Self {
        Self::Store {
            args: [addr, value],
        }
    }

    pub fn jump(dest: Block) -> Self {
        Self::Jump { dests: [dest] }
    }

    pub fn branch(cond: CmpOp, lhs: Value, rhs: Value, then: Block, else_: Block) -> Self {
        Self::Branch {
            cond,
            args: [lhs, rhs],
            dests: [then, else_],
        }
    }

    pub fn ret(arg: Value) -> Self {
        Self::Return { args: [arg] }
    }

    pub fn phi(ty: Type) -> Self {
        Self::Phi {
            values: SmallVec::new(),
            blocks: SmallVec::new(),
            ty,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::Branch { .. } | Self::Return { .. } | Self::Exit
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// Returns `true` if removing the instruction is unobservable once its
    /// result is unused.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Self::Const { .. }
                | Self::Undef { .. }
                | Self::Unary { .. }
                | Self::Binary { .. }
                | Self::Cast { .. }
                | Self::GlobalAddr { .. }
                | Self::Phi { .. }
                | Self::Alloc { .. }
        )
    }

    /// Branch destinations of a terminator.
    pub fn dests(&self) -> &[Block] {
        match self {
            Self::Jump { dests } => dests,
            Self::Branch { dests, .. } => dests,
            _ => &[],
        }
    }

    pub fn rewrite_branch_dest(&mut self, from: Block, to: Block) {
        let dests = match self {
            Self::Jump { dests } => &mut dests[..],
            Self::Branch { dests, .. } => &mut dests[..],
            _ => return,
        };

        for block in dests.iter_mut() {
            if *block == from {
                *block = to;
            }
        }
    }

    pub fn args(&self) -> &[Value] {
        match self {
            Self::Binary { args, .. } | Self::Store { args } | Self::Branch { args, .. } => args,
            Self::Unary { args, .. }
            | Self::Cast { args, .. }
            | Self::Load { args, .. }
            | Self::Return { args } => args,
            Self::Phi { values: args, .. } | Self::Call { args, .. } => args,
            Self::Const { .. }
            | Self::Undef { .. }
            | Self::Alloc { .. }
            | Self::GlobalAddr { .. }
            | Self::Jump { .. }
            | Self::Exit => &[],
        }
    }

    pub fn args_mut(&mut self) -> &mut [Value] {
        match self {
            Self::Binary { args, .. } | Self::Store { args } | Self::Branch { args, .. } => args,
            Self::Unary { args, .. }
            | Self::Cast { args, .. }
            | Self::Load { args, .. }
            | Self::Return { args } => args,
            Self::Phi { values: args, .. } | Self::Call { args, .. } => args,
            Self::Const { .. }
            | Self::Undef { .. }
            | Self::Alloc { .. }
            | Self::GlobalAddr { .. }
            | Self::Jump { .. }
            | Self::Exit => &mut [],
        }
    }

    pub fn append_phi_arg(&mut self, value: Value, block: Block) {
        match self {
            Self::Phi { values, blocks, .. } => {
                values.push(value);
                blocks.push(block)
            }
            _ => panic!("Expects `InsnData::phi` but got `{:?}`", self),
        }
    }

    /// Removes the incoming entry of `block` from a phi and returns its value.
    pub fn remove_phi_arg(&mut self, block: Block) -> Option<Value> {
        let Self::Phi { values, blocks, .. } = self else {
            return None;
        };

        let idx = blocks.iter().position(|b| *b == block)?;
        blocks.remove(idx);
        Some(values.remove(idx))
    }

    /// Returns the incoming pairs of a phi.
    pub fn phi_args(&self) -> impl Iterator<Item = (Value, Block)> + '_ {
        let (values, blocks) = match self {
            Self::Phi { values, blocks, .. } => (values.as_slice(), blocks.as_slice()),
            _ => (&[][..], &[][..]),
        };
        values.iter().copied().zip(blocks.iter().copied())
    }

    pub fn rewrite_phi_block(&mut self, from: Block, to: Block) {
        if let Self::Phi { blocks, .. } = self {
            for block in blocks.iter_mut() {
                if *block == from {
                    *block = to;
                }
            }
        }
    }

    /// Type of the value the instruction produces, `None` if it produces
    /// nothing.
    pub fn result_type(&self, dfg: &DataFlowGraph) -> Option<Type> {
        match self {
            Self::Const { imm } => Some(imm.ty()),
            Self::Unary { args, .. } => Some(dfg.value_ty(args[0]).clone()),
            Self::Binary { args, .. } => Some(dfg.value_ty(args[0]).clone()),
            Self::Undef { ty } | Self::Cast { ty, .. } | Self::Load { ty, .. } => {
                Some(ty.clone())
            }
            Self::Phi { ty, .. } => Some(ty.clone()),
            Self::Alloc { .. } | Self::GlobalAddr { .. } => Some(Type::Ptr),
            Self::Call { ret_ty, .. } => (!ret_ty.is_void()).then(|| ret_ty.clone()),
            Self::Store { .. }
            | Self::Jump { .. }
            | Self::Branch { .. }
            | Self::Return { .. }
            | Self::Exit => None,
        }
    }

    /// The mnemonic used in the textual form.
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::Const { .. } => "const",
            Self::Undef { .. } => "undef",
            Self::Unary { code, .. } => code.as_str(),
            Self::Binary { code, .. } => code.as_str(),
            Self::Cast { .. } => "cast",
            Self::Load { .. } => "load",
            Self::Store { .. } => "store",
            Self::Alloc { .. } => "alloc",
            Self::GlobalAddr { .. } => "gaddr",
            Self::Call { .. } => "call",
            Self::Phi { .. } => "phi",
            Self::Jump { .. } => "jump",
            Self::Branch { .. } => "br",
            Self::Return { .. } => "return",
            Self::Exit => "exit",
        }
    }
}

/// Call target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// A function defined in the module.
    Func(FuncRef),
    /// An external declaration.
    Extern(ExternRef),
}

/// Unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Neg => "neg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "not" => Self::Not,
            "neg" => Self::Neg,
            _ => return None,
        })
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub const ALL: [Self; 10] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Rem,
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Shl,
        Self::Shr,
    ];

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor
        )
    }

    /// Returns `true` for operations defined on integers only.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::And | Self::Or | Self::Xor | Self::Shl | Self::Shr
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparisons of conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    pub const ALL: [Self; 6] = [Self::Eq, Self::Ne, Self::Lt, Self::Gt, Self::Le, Self::Ge];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
            Self::Ge => "ge",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Evaluates the comparison on two constants of the same type. Returns
    /// `None` if the operands are not comparable.
    pub fn eval(self, lhs: Immediate, rhs: Immediate) -> Option<bool> {
        if lhs.ty() != rhs.ty() {
            return None;
        }

        let ord = match (lhs.as_i128(), rhs.as_i128()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
        };

        // Unordered floats only satisfy `ne`.
        let Some(ord) = ord else {
            return Some(self == Self::Ne);
        };

        Some(match self {
            Self::Eq => ord.is_eq(),
            Self::Ne => ord.is_ne(),
            Self::Lt => ord.is_lt(),
            Self::Gt => ord.is_gt(),
            Self::Le => ord.is_le(),
            Self::Ge => ord.is_ge(),
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_eval() {
        assert_eq!(CmpOp::Lt.eval(Immediate::U8(200), Immediate::U8(3)), Some(false));
        assert_eq!(CmpOp::Lt.eval(Immediate::I8(-56), Immediate::I8(3)), Some(true));
        assert_eq!(CmpOp::Le.eval(Immediate::I8(3), Immediate::I32(3)), None);

        let nan = Immediate::f64(f64::NAN);
        assert_eq!(CmpOp::Eq.eval(nan, nan), Some(false));
        assert_eq!(CmpOp::Ne.eval(nan, nan), Some(true));
        assert_eq!(CmpOp::Eq.eval(Immediate::f64(0.0), Immediate::f64(-0.0)), Some(true));
    }

    #[test]
    fn phi_args_edit() {
        let b0 = Block(0);
        let b1 = Block(1);
        let mut phi = InsnData::phi(Type::I32);
        phi.append_phi_arg(Value(0), b0);
        phi.append_phi_arg(Value(1), b1);

        phi.rewrite_phi_block(b0, Block(2));
        assert_eq!(phi.remove_phi_arg(b1), Some(Value(1)));
        assert_eq!(phi.phi_args().collect::<Vec<_>>(), vec![(Value(0), Block(2))]);
        assert_eq!(phi.remove_phi_arg(b1), None);
    }
}
