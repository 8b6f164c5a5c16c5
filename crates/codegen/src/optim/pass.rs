//! Pass traits at module, function, block and instruction granularity.
//!
//! Every pass returns `true` if it changed the IR. The adapters lift a pass
//! to the next coarser granularity, so any pass can be scheduled on a whole
//! module.

use quill_ir::{Block, Function, Insn, Module};

pub trait ModulePass {
    fn name(&self) -> &'static str;

    fn run_on_module(&mut self, module: &mut Module) -> bool;
}

pub trait FunctionPass {
    fn name(&self) -> &'static str;

    fn run_on_function(&mut self, func: &mut Function) -> bool;
}

pub trait BlockPass {
    fn name(&self) -> &'static str;

    fn run_on_block(&mut self, func: &mut Function, block: Block) -> bool;
}

pub trait InstructionPass {
    fn name(&self) -> &'static str;

    /// Runs on `insn`. The pass may remove `insn` or insert instructions
    /// before it, but must not touch the instructions after it.
    fn run_on_insn(&mut self, func: &mut Function, insn: Insn) -> bool;
}

/// Runs an [`InstructionPass`] on every instruction of a block.
#[derive(Debug, Default)]
pub struct PerInsn<P>(pub P);

/// Runs a [`BlockPass`] on every block of a function.
#[derive(Debug, Default)]
pub struct PerBlock<P>(pub P);

/// Runs a [`FunctionPass`] on every function of a module.
#[derive(Debug, Default)]
pub struct PerFunction<P>(pub P);

impl<P: InstructionPass> BlockPass for PerInsn<P> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn run_on_block(&mut self, func: &mut Function, block: Block) -> bool {
        let mut changed = false;
        let mut next_insn = func.layout.first_insn_of(block);
        while let Some(insn) = next_insn {
            // Prefetch so that the pass can remove `insn`.
            next_insn = func.layout.next_insn_of(insn);
            changed |= self.0.run_on_insn(func, insn);
        }
        changed
    }
}

impl<P: BlockPass> FunctionPass for PerBlock<P> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let blocks: Vec<_> = func.layout.iter_block().collect();
        let mut changed = false;
        for block in blocks {
            if func.layout.is_block_inserted(block) {
                changed |= self.0.run_on_block(func, block);
            }
        }
        changed
    }
}

impl<P: FunctionPass> ModulePass for PerFunction<P> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let funcs: Vec<_> = module.iter_functions().collect();
        let mut changed = false;
        for func_ref in funcs {
            changed |= self.0.run_on_function(&mut module.funcs[func_ref]);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use quill_ir::{builder::test_util::*, Type};

    use super::*;

    /// Removes every constant it sees and counts the visits.
    #[derive(Default)]
    struct DropConsts {
        visited: usize,
    }

    impl InstructionPass for DropConsts {
        fn name(&self) -> &'static str {
            "drop-consts"
        }

        fn run_on_insn(&mut self, func: &mut Function, insn: Insn) -> bool {
            self.visited += 1;
            if matches!(func.dfg.insn_data(insn), quill_ir::InsnData::Const { .. }) {
                func.remove_insn(insn);
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn per_insn_survives_removal_of_the_current_insn() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::Void);
        let entry = builder.append_block();
        builder.switch_to_block(entry);
        builder.constant(1i32);
        builder.constant(2i32);
        builder.exit();
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        let mut pass = PerFunction(PerBlock(PerInsn(DropConsts::default())));
        assert_eq!(pass.name(), "drop-consts");
        assert!(pass.run_on_module(&mut module));
        assert_eq!(pass.0 .0 .0.visited, 3);

        let func = &module.funcs[func_ref];
        assert_eq!(func.layout.iter_insn(entry).count(), 1);
        assert!(!pass.run_on_module(&mut module));
    }
}
