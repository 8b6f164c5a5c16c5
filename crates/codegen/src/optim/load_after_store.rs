//! Forwards stored values to later loads of the same address within a
//! block.

use quill_ir::{Block, Function, GlobalRef, Insn, InsnData, Value};
use tracing::trace;

use super::pass::BlockPass;

#[derive(Debug, Default)]
pub struct LoadAfterStorePass {
    /// `(address, stored value)` pairs known to hold at the current
    /// instruction.
    available: Vec<(Value, Value)>,
}

impl LoadAfterStorePass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockPass for LoadAfterStorePass {
    fn name(&self) -> &'static str {
        "load-after-store"
    }

    fn run_on_block(&mut self, func: &mut Function, block: Block) -> bool {
        self.available.clear();
        let mut changed = false;

        let insns: Vec<_> = func.layout.iter_insn(block).collect();
        for insn in insns {
            match func.dfg.insn_data(insn) {
                InsnData::Store { args: [addr, value] } => {
                    let (addr, value) = (*addr, *value);
                    self.available
                        .retain(|&(known, _)| provably_different(func, known, addr));
                    self.available.push((addr, value));
                }

                InsnData::Call { .. } => self.available.clear(),

                InsnData::Load { args: [addr], ty } => {
                    let stored = self
                        .available
                        .iter()
                        .rev()
                        .find(|&&(known, _)| same_location(func, known, *addr))
                        .map(|&(_, value)| value);
                    let Some(stored) = stored else {
                        continue;
                    };
                    if func.dfg.value_ty(stored) != ty {
                        continue;
                    }
                    let Some(loaded) = func.dfg.insn_result(insn) else {
                        continue;
                    };

                    trace!(func = func.name(), %insn, %stored, "forwarded store to load");
                    func.dfg.replace_uses(loaded, stored);
                    func.remove_insn(insn);
                    changed = true;
                }

                _ => {}
            }
        }

        changed
    }
}

/// Memory an address is known to point to the start of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base {
    Alloc(Insn),
    Global(GlobalRef),
}

fn base_of(func: &Function, addr: Value) -> Option<Base> {
    let insn = func.dfg.value_insn(addr)?;
    match func.dfg.insn_data(insn) {
        InsnData::Alloc { .. } => Some(Base::Alloc(insn)),
        InsnData::GlobalAddr { gv } => Some(Base::Global(*gv)),
        _ => None,
    }
}

fn same_location(func: &Function, lhs: Value, rhs: Value) -> bool {
    lhs == rhs || base_of(func, lhs).is_some_and(|base| base_of(func, rhs) == Some(base))
}

fn provably_different(func: &Function, lhs: Value, rhs: Value) -> bool {
    match (base_of(func, lhs), base_of(func, rhs)) {
        (Some(lhs), Some(rhs)) => lhs != rhs,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use quill_ir::{builder::test_util::*, Callee, GlobalData, Signature, Type};

    use super::*;
    use crate::optim::pass::{FunctionPass, PerBlock};

    fn run(module: &mut quill_ir::Module, func_ref: quill_ir::FuncRef) -> bool {
        PerBlock(LoadAfterStorePass::new()).run_on_function(&mut module.funcs[func_ref])
    }

    #[test]
    fn forwards_through_unrelated_store() {
        let mut mb = TestModuleBuilder::new();
        let gv = mb
            .module_builder()
            .make_global(GlobalData::new("g", Type::I32, None))
            .unwrap();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        let slot = builder.alloc(Type::I32);
        let g = builder.global_addr(gv);
        builder.store(slot, x);
        builder.store(g, x);
        let loaded = builder.load(slot, Type::I32);
        builder.ret(loaded);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(run(&mut module, func_ref));
        let func = &module.funcs[func_ref];
        assert!(!func.is_value_live(loaded));
        let ret = func.layout.last_insn_of(entry).unwrap();
        assert_eq!(func.dfg.insn_data(ret).args(), &[x]);
    }

    #[test]
    fn unknown_address_store_blocks_forwarding() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::Ptr], Type::I32);
        let entry = builder.append_block();
        let (x, p) = (builder.args()[0], builder.args()[1]);

        builder.switch_to_block(entry);
        let slot = builder.alloc(Type::I32);
        builder.store(slot, x);
        builder.store(p, x);
        let loaded = builder.load(slot, Type::I32);
        builder.ret(loaded);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!run(&mut module, func_ref));
    }

    #[test]
    fn call_blocks_forwarding() {
        let mut mb = TestModuleBuilder::new();
        let ext = mb
            .module_builder()
            .declare_external(Signature::new("clobber", &[], Type::Void))
            .unwrap();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        let slot = builder.alloc(Type::I32);
        builder.store(slot, x);
        builder.call(Callee::Extern(ext), &[]);
        let loaded = builder.load(slot, Type::I32);
        builder.ret(loaded);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!run(&mut module, func_ref));
    }

    #[test]
    fn type_mismatch_is_not_forwarded() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I64], Type::I32);
        let entry = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        let slot = builder.alloc(Type::I64);
        builder.store(slot, x);
        let loaded = builder.load(slot, Type::I32);
        builder.ret(loaded);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!run(&mut module, func_ref));
    }
}
