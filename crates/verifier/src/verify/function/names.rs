use quill_ir::dfg::is_valid_name;

use crate::diagnostic::{Diagnostic, DiagnosticCode};

use super::FunctionVerifier;

impl FunctionVerifier<'_> {
    /// Value names and block labels must be valid identifiers. Uniqueness is
    /// kept by the name tables of the `DataFlowGraph`.
    pub(super) fn check_names(&mut self) {
        let func = self.func;

        let results = self
            .block_order
            .iter()
            .flat_map(|&block| func.layout.iter_insn(block))
            .filter_map(|insn| func.dfg.insn_result(insn));
        let values: Vec<_> = func.arg_values.iter().copied().chain(results).collect();

        for value in values {
            let name = func.dfg.value_name(value);
            if !is_valid_name(name) {
                self.emit(Diagnostic::error(
                    DiagnosticCode::InvalidName,
                    format!("value name `{name}` is not a valid identifier"),
                    self.value_location(value),
                ));
            }
        }

        for &block in &self.block_order.clone() {
            let label = func.dfg.block_label(block);
            if !is_valid_name(label) {
                self.emit(Diagnostic::error(
                    DiagnosticCode::InvalidName,
                    format!("block label `{label}` is not a valid identifier"),
                    self.block_location(block),
                ));
            }
        }
    }
}
