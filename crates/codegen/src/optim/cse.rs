//! Common subexpression elimination over the dominator tree.
//!
//! Blocks are visited in dominator tree preorder with a scoped table of the
//! pure instructions available at the current block. A pure instruction that
//! is already in the table is replaced by the available result.

use quill_ir::{
    Block, ControlFlowGraph, DataFlowGraph, DomTree, DominatorTreeTraversable, Function, Insn,
    InsnData, Value,
};
use rustc_hash::FxHashMap;
use tracing::trace;

use super::pass::FunctionPass;

#[derive(Debug, Default)]
pub struct CsePass {
    cfg: ControlFlowGraph,
    domtree: DomTree,
    dom_children: DominatorTreeTraversable,

    /// Maps a normalized instruction to its available result.
    table: FxHashMap<InsnData, Value>,
    /// Keys inserted into `table`, in insertion order, so that a scope can be
    /// popped.
    scope_log: Vec<InsnData>,
}

enum Visit {
    Enter(Block),
    Exit(usize),
}

impl CsePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cfg.clear();
        self.domtree.clear();
        self.dom_children.clear();
        self.table.clear();
        self.scope_log.clear();
    }

    fn run_on_block(&mut self, func: &mut Function, block: Block) -> bool {
        let mut changed = false;
        let insns: Vec<_> = func.layout.iter_insn(block).collect();

        for insn in insns {
            let Some(key) = cse_key(&func.dfg, insn) else {
                continue;
            };
            let Some(result) = func.dfg.insn_result(insn) else {
                continue;
            };

            if let Some(&avail) = self.table.get(&key) {
                trace!(func = func.name(), %insn, %avail, "eliminated common subexpression");
                func.dfg.replace_uses(result, avail);
                func.remove_insn(insn);
                changed = true;
            } else {
                self.table.insert(key.clone(), result);
                self.scope_log.push(key);
            }
        }

        changed
    }
}

impl FunctionPass for CsePass {
    fn name(&self) -> &'static str {
        "cse"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        self.clear();
        let Some(entry) = func.layout.entry_block() else {
            return false;
        };

        self.cfg.compute(func);
        self.domtree.compute(&self.cfg);
        self.dom_children.compute(&self.domtree);

        let mut changed = false;
        let mut visits = vec![Visit::Enter(entry)];
        while let Some(visit) = visits.pop() {
            match visit {
                Visit::Enter(block) => {
                    let mark = self.scope_log.len();
                    changed |= self.run_on_block(func, block);

                    visits.push(Visit::Exit(mark));
                    for &child in self.dom_children.children_of(block).iter().rev() {
                        visits.push(Visit::Enter(child));
                    }
                }

                Visit::Exit(mark) => {
                    for key in self.scope_log.drain(mark..) {
                        self.table.remove(&key);
                    }
                }
            }
        }

        changed
    }
}

/// Returns the table key of `insn` if it may be merged with an equivalent
/// instruction. Operands of commutative operations are ordered.
fn cse_key(dfg: &DataFlowGraph, insn: Insn) -> Option<InsnData> {
    let data = dfg.insn_data(insn);
    match data {
        InsnData::Binary { code, args } if code.is_commutative() && args[0] > args[1] => {
            Some(InsnData::binary(*code, args[1], args[0]))
        }
        InsnData::Const { .. }
        | InsnData::Binary { .. }
        | InsnData::Unary { .. }
        | InsnData::Cast { .. }
        | InsnData::GlobalAddr { .. } => Some(data.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use quill_ir::{builder::test_util::*, Callee, CmpOp, Signature, Type};

    use super::*;

    #[test]
    fn dominated_duplicate_is_removed() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
        let entry = builder.append_block();
        let next = builder.append_block();
        let (x, y) = (builder.args()[0], builder.args()[1]);

        builder.switch_to_block(entry);
        let first = builder.add(x, y);
        builder.jump(next);

        builder.switch_to_block(next);
        let second = builder.add(y, x);
        let diff = builder.sub(first, second);
        builder.ret(diff);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(CsePass::new().run_on_function(&mut module.funcs[func_ref]));

        let func = &module.funcs[func_ref];
        assert!(!func.is_value_live(second));
        assert_eq!(func.dfg.users_num(first), 1);
        let sub = func.dfg.value_insn(diff).unwrap();
        assert_eq!(func.dfg.insn_data(sub).args(), &[first, first]);
    }

    #[test]
    fn sibling_blocks_are_not_merged() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let then = builder.append_block();
        let else_ = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        builder.br(CmpOp::Eq, x, x, then, else_);

        builder.switch_to_block(then);
        let a = builder.mul(x, x);
        builder.ret(a);

        builder.switch_to_block(else_);
        let b = builder.mul(x, x);
        builder.ret(b);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!CsePass::new().run_on_function(&mut module.funcs[func_ref]));
    }

    #[test]
    fn calls_and_loads_never_merge() {
        let mut mb = TestModuleBuilder::new();
        let ext = mb
            .module_builder()
            .declare_external(Signature::new("tick", &[], Type::I32))
            .unwrap();
        let mut builder = mb.func_builder(&[Type::Ptr], Type::I32);
        let entry = builder.append_block();
        let p = builder.args()[0];

        builder.switch_to_block(entry);
        let c1 = builder.call(Callee::Extern(ext), &[]).unwrap();
        let c2 = builder.call(Callee::Extern(ext), &[]).unwrap();
        let l1 = builder.load(p, Type::I32);
        let l2 = builder.load(p, Type::I32);
        let s1 = builder.add(c1, c2);
        let s2 = builder.add(l1, l2);
        let s = builder.add(s1, s2);
        builder.ret(s);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!CsePass::new().run_on_function(&mut module.funcs[func_ref]));
    }

    #[test]
    fn non_commutative_operands_keep_their_order() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I32], Type::I32);
        let entry = builder.append_block();
        let (x, y) = (builder.args()[0], builder.args()[1]);

        builder.switch_to_block(entry);
        let a = builder.sub(x, y);
        let b = builder.sub(y, x);
        let c = builder.add(a, b);
        builder.ret(c);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!CsePass::new().run_on_function(&mut module.funcs[func_ref]));
    }
}
