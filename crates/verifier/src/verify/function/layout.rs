use crate::diagnostic::{Diagnostic, DiagnosticCode, Location};

use super::FunctionVerifier;

impl FunctionVerifier<'_> {
    /// Records the block order and checks the entry block and the terminator
    /// placement of every block.
    pub(super) fn scan_layout(&mut self) {
        if self.func.layout.entry_block().is_none() {
            self.emit(Diagnostic::error(
                DiagnosticCode::MissingEntryBlock,
                "function has no entry block",
                Location::Function(self.func_ref),
            ));
            return;
        }

        let blocks: Vec<_> = self.func.layout.iter_block().collect();
        for block in blocks {
            self.block_order.push(block);
            if !self.func.dfg.has_block(block) {
                self.emit(Diagnostic::error(
                    DiagnosticCode::InvalidBlockRef,
                    "layout contains a block unknown to the function",
                    self.block_location(block),
                ));
                continue;
            }

            let insns = self.insns_of(block);
            let Some(&last) = insns.last() else {
                self.emit(Diagnostic::error(
                    DiagnosticCode::EmptyBlock,
                    format!("block `{}` is empty", self.func.dfg.block_label(block)),
                    self.block_location(block),
                ));
                continue;
            };

            for (idx, &insn) in insns.iter().enumerate() {
                self.insn_index_in_block[insn] = idx;
                if insn != last && self.func.dfg.is_terminator(insn) {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::TerminatorNotLast,
                        "terminator is followed by other instructions",
                        self.insn_location(insn),
                    ));
                }
            }

            if !self.func.dfg.is_terminator(last) {
                self.emit(
                    Diagnostic::error(
                        DiagnosticCode::MissingTerminator,
                        format!(
                            "block `{}` doesn't end with a terminator",
                            self.func.dfg.block_label(block)
                        ),
                        self.block_location(block),
                    )
                    .with_note(format!("last instruction is {last}")),
                );
            }
        }
    }
}
