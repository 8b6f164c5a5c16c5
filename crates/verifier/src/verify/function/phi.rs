use rustc_hash::FxHashSet;

use crate::diagnostic::{Diagnostic, DiagnosticCode};

use super::FunctionVerifier;

impl FunctionVerifier<'_> {
    pub(super) fn check_reachability(&mut self) {
        for block in self.block_order.clone() {
            if !self.domtree.is_reachable(block) {
                self.emit(Diagnostic::error(
                    DiagnosticCode::UnreachableBlock,
                    format!(
                        "block `{}` is unreachable from the entry block",
                        self.func.dfg.block_label(block)
                    ),
                    self.block_location(block),
                ));
            }
        }
    }

    /// Phis lead their block and have exactly one incoming entry per
    /// predecessor.
    pub(super) fn check_phi_rules(&mut self) {
        let func = self.func;

        for block in self.block_order.clone() {
            let preds: Vec<_> = self.cfg_graph.preds_of(block).copied().collect();
            let mut in_phi_prefix = true;

            for insn in self.insns_of(block) {
                if !func.dfg.is_phi(insn) {
                    in_phi_prefix = false;
                    continue;
                }

                if !in_phi_prefix {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::PhiNotAtBlockTop,
                        "phi follows a non-phi instruction",
                        self.insn_location(insn),
                    ));
                }

                let mut incoming = FxHashSet::default();
                for (_, from) in func.dfg.insn_data(insn).phi_args() {
                    if !incoming.insert(from) {
                        self.emit(Diagnostic::error(
                            DiagnosticCode::PhiDuplicateIncomingBlock,
                            format!(
                                "phi lists `{}` more than once",
                                func.dfg.block_label(from)
                            ),
                            self.insn_location(insn),
                        ));
                    } else if !preds.contains(&from) {
                        self.emit(Diagnostic::error(
                            DiagnosticCode::PhiHasNonPredIncoming,
                            format!(
                                "phi lists `{}` which is not a predecessor",
                                func.dfg.block_label(from)
                            ),
                            self.insn_location(insn),
                        ));
                    }
                }

                for &pred in &preds {
                    if !incoming.contains(&pred) {
                        self.emit(Diagnostic::error(
                            DiagnosticCode::PhiMissingIncoming,
                            format!(
                                "phi has no incoming value for predecessor `{}`",
                                func.dfg.block_label(pred)
                            ),
                            self.insn_location(insn),
                        ));
                    }
                }
            }
        }
    }
}
