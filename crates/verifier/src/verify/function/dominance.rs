use quill_ir::{Block, Insn, Value};

use crate::diagnostic::{Diagnostic, DiagnosticCode};

use super::FunctionVerifier;

impl FunctionVerifier<'_> {
    /// Every use is dominated by its definition. A phi operand only has to
    /// be available at the end of the corresponding predecessor.
    pub(super) fn check_dominance_rules(&mut self) {
        let func = self.func;

        for block in self.block_order.clone() {
            if !self.domtree.is_reachable(block) {
                continue;
            }

            for insn in self.insns_of(block) {
                let data = func.dfg.insn_data(insn);
                if data.is_phi() {
                    for (value, pred) in data.phi_args() {
                        self.check_phi_incoming(insn, value, pred);
                    }
                    continue;
                }

                for &value in data.args() {
                    self.check_use(insn, block, value);
                }
            }
        }
    }

    fn check_use(&mut self, insn: Insn, block: Block, value: Value) {
        let Some(def_insn) = self.func.dfg.value_insn(value) else {
            return;
        };
        let def_block = self.func.layout.insn_block(def_insn);

        if def_block == block {
            let def_idx = self.insn_index_in_block[def_insn];
            let use_idx = self.insn_index_in_block[insn];
            if def_idx >= use_idx {
                self.emit(
                    Diagnostic::error(
                        DiagnosticCode::UseBeforeDefInBlock,
                        format!(
                            "`{}` is used before its definition",
                            self.func.dfg.value_name(value)
                        ),
                        self.insn_location(insn),
                    )
                    .with_note(format!("defined by {def_insn} at index {def_idx}, used at {use_idx}")),
                );
            }
        } else if !self.domtree.dominates(def_block, block) {
            self.emit(
                Diagnostic::error(
                    DiagnosticCode::DefDoesNotDominateUse,
                    format!(
                        "definition of `{}` doesn't dominate its use",
                        self.func.dfg.value_name(value)
                    ),
                    self.insn_location(insn),
                )
                .with_note(format!(
                    "defined in `{}`, used in `{}`",
                    self.func.dfg.block_label(def_block),
                    self.func.dfg.block_label(block)
                )),
            );
        }
    }

    fn check_phi_incoming(&mut self, insn: Insn, value: Value, pred: Block) {
        // Edges from unreachable blocks are reported by the reachability check.
        if !self.domtree.is_reachable(pred) {
            return;
        }
        let Some(def_insn) = self.func.dfg.value_insn(value) else {
            return;
        };

        let def_block = self.func.layout.insn_block(def_insn);
        if !self.domtree.dominates(def_block, pred) {
            self.emit(
                Diagnostic::error(
                    DiagnosticCode::PhiIncomingNotAvailableOnEdge,
                    format!(
                        "phi operand `{}` is not available at the end of `{}`",
                        self.func.dfg.value_name(value),
                        self.func.dfg.block_label(pred)
                    ),
                    self.insn_location(insn),
                )
                .with_note(format!(
                    "defined in `{}`",
                    self.func.dfg.block_label(def_block)
                )),
            );
        }
    }
}
