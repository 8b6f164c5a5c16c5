use quill_ir::InsnData;

use crate::diagnostic::{Diagnostic, DiagnosticCode};

use super::FunctionVerifier;

impl FunctionVerifier<'_> {
    /// Checks that every entity an instruction refers to exists and is live.
    pub(super) fn check_referential_integrity(&mut self) {
        let func = self.func;
        let insns: Vec<_> = self
            .block_order
            .iter()
            .flat_map(|&block| func.layout.iter_insn(block))
            .collect();

        for insn in insns {
            let data = func.dfg.insn_data(insn);

            for &value in data.args() {
                if !func.dfg.has_value(value) {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::InvalidValueRef,
                        format!("operand {value} doesn't exist"),
                        self.insn_location(insn),
                    ));
                } else if !func.is_value_live(value) {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::DeadValueRef,
                        format!(
                            "operand `{}` is defined by a deleted instruction",
                            func.dfg.value_name(value)
                        ),
                        self.insn_location(insn),
                    ));
                }
            }

            for &dest in data.dests() {
                if !func.dfg.has_block(dest) {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::BranchToMissingBlock,
                        format!("branch target {dest} doesn't exist"),
                        self.insn_location(insn),
                    ));
                } else if !func.layout.is_block_inserted(dest) {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::BranchToNonInsertedBlock,
                        format!(
                            "branch target `{}` is not a block of the function",
                            func.dfg.block_label(dest)
                        ),
                        self.insn_location(insn),
                    ));
                }
            }

            for (_, block) in data.phi_args() {
                if !func.dfg.has_block(block) || !func.layout.is_block_inserted(block) {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::InvalidBlockRef,
                        format!("phi incoming block {block} is not a block of the function"),
                        self.insn_location(insn),
                    ));
                }
            }

            match data {
                InsnData::Call { callee, .. } if !self.module.has_callee(*callee) => {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::InvalidCalleeRef,
                        "callee is not declared in the module",
                        self.insn_location(insn),
                    ));
                }
                InsnData::GlobalAddr { gv } if !self.module.globals.is_valid(*gv) => {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::InvalidGlobalRef,
                        format!("global {gv} doesn't exist"),
                        self.insn_location(insn),
                    ));
                }
                _ => {}
            }
        }
    }
}
