//! Removes pure instructions whose results are never used.

use quill_ir::Function;
use tracing::trace;

use super::pass::FunctionPass;

#[derive(Debug, Default)]
pub struct DeleteUnusedInstructionsPass;

impl DeleteUnusedInstructionsPass {
    pub fn new() -> Self {
        Self
    }
}

impl FunctionPass for DeleteUnusedInstructionsPass {
    fn name(&self) -> &'static str {
        "delete-unused"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let mut changed = false;

        // Removing an instruction can make its operands unused.
        loop {
            let dead: Vec<_> = func
                .insns()
                .filter(|&insn| {
                    func.dfg.insn_data(insn).is_pure()
                        && func
                            .dfg
                            .insn_result(insn)
                            .is_some_and(|result| func.dfg.users_num(result) == 0)
                })
                .collect();
            if dead.is_empty() {
                return changed;
            }

            for insn in dead {
                trace!(func = func.name(), %insn, "deleted unused instruction");
                func.remove_insn(insn);
            }
            changed = true;
        }
    }
}
