//! Folds instructions whose operands are all constants.

use quill_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    interpret::{eval_binary, eval_cast, eval_unary, ArithError},
    DataFlowGraph, Function, Immediate, Insn, InsnData,
};
use tracing::{trace, warn};

use super::pass::InstructionPass;

/// An instruction with constant operands that can't be evaluated, e.g. a
/// division by zero. It is left in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldFailure {
    pub insn: Insn,
    pub error: ArithError,
}

#[derive(Debug, Default)]
pub struct ConstantFolder {
    failures: Vec<FoldFailure>,
}

impl ConstantFolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> &[FoldFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<FoldFailure> {
        std::mem::take(&mut self.failures)
    }

    fn record_failure(&mut self, func: &Function, insn: Insn, error: ArithError) {
        if self.failures.iter().any(|failure| failure.insn == insn) {
            return;
        }

        warn!(
            func = func.name(),
            %insn,
            %error,
            "constant operands can't be folded"
        );
        self.failures.push(FoldFailure { insn, error });
    }
}

impl InstructionPass for ConstantFolder {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn run_on_insn(&mut self, func: &mut Function, insn: Insn) -> bool {
        let imm = match fold_constant(&func.dfg, func.dfg.insn_data(insn)) {
            None => return false,
            Some(Ok(imm)) => imm,
            Some(Err(error)) => {
                self.record_failure(func, insn, error);
                return false;
            }
        };
        let Some(result) = func.dfg.insn_result(insn) else {
            return false;
        };

        let mut cursor = InsnInserter::at_location(CursorLocation::At(insn));
        let (_, Some(folded)) = cursor.insert_before_with_result(func, InsnData::Const { imm })
        else {
            unreachable!("constants always have a result");
        };
        func.dfg.replace_uses(result, folded);
        func.remove_insn(insn);

        trace!(func = func.name(), %insn, %imm, "folded");
        true
    }
}

/// Evaluates `insn_data` if all its operands are constants. Returns `None`
/// if the instruction can't be folded at all.
pub fn fold_constant(
    dfg: &DataFlowGraph,
    insn_data: &InsnData,
) -> Option<Result<Immediate, ArithError>> {
    match insn_data {
        InsnData::Unary { code, args } => {
            let arg = dfg.value_imm(args[0])?;
            Some(eval_unary(*code, arg))
        }

        InsnData::Binary { code, args } => {
            let lhs = dfg.value_imm(args[0])?;
            let rhs = dfg.value_imm(args[1])?;
            Some(eval_binary(*code, lhs, rhs))
        }

        InsnData::Cast { args, ty } => {
            let arg = dfg.value_imm(args[0])?;
            Some(eval_cast(arg, ty))
        }

        InsnData::Const { .. }
        | InsnData::Undef { .. }
        | InsnData::Load { .. }
        | InsnData::Store { .. }
        | InsnData::Alloc { .. }
        | InsnData::GlobalAddr { .. }
        | InsnData::Call { .. }
        | InsnData::Phi { .. }
        | InsnData::Jump { .. }
        | InsnData::Branch { .. }
        | InsnData::Return { .. }
        | InsnData::Exit => None,
    }
}
