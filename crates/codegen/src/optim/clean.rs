//! Control flow cleanup.
//!
//! Repeats the following until nothing changes:
//! * branches with a known outcome become jumps,
//! * blocks unreachable from the entry are removed,
//! * blocks holding nothing but a jump are bypassed,
//! * a block is merged into its only predecessor when that predecessor
//!   jumps to it unconditionally.

use quill_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    Block, CmpOp, ControlFlowGraph, Function, Insn, InsnData, Value,
};
use tracing::trace;

use super::pass::FunctionPass;

#[derive(Debug, Default)]
pub struct CleanPass {
    cfg: ControlFlowGraph,
}

impl CleanPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn fold_branches(&mut self, func: &mut Function) -> bool {
        let mut changed = false;

        let blocks: Vec<_> = func.layout.iter_block().collect();
        for block in blocks {
            let Some(term) = func.layout.last_insn_of(block) else {
                continue;
            };
            let InsnData::Branch { cond, args, dests } = *func.dfg.insn_data(term) else {
                continue;
            };

            let (taken, dropped) = if dests[0] == dests[1] {
                (dests[0], None)
            } else {
                match branch_outcome(func, cond, args) {
                    Some(true) => (dests[0], Some(dests[1])),
                    Some(false) => (dests[1], Some(dests[0])),
                    None => continue,
                }
            };

            trace!(func = func.name(), %block, %taken, "folded branch");
            func.dfg.replace_insn(term, InsnData::jump(taken));
            if let Some(dropped) = dropped {
                for phi in leading_phis(func, dropped) {
                    func.dfg.remove_phi_arg(phi, block);
                }
            }
            changed = true;
        }

        changed
    }

    fn remove_unreachable_blocks(&mut self, func: &mut Function) -> bool {
        self.cfg.compute(func);
        let reachable = self.cfg.reachable_blocks();

        let dead: Vec<_> = func
            .layout
            .iter_block()
            .filter(|&block| !reachable.contains(block))
            .collect();
        for &block in &dead {
            let succs: Vec<_> = self.cfg.succs_of(block).copied().collect();
            for succ in succs {
                for phi in leading_phis(func, succ) {
                    func.dfg.remove_phi_arg(phi, block);
                }
            }

            trace!(func = func.name(), %block, "removed unreachable block");
            InsnInserter::at_location(CursorLocation::BlockTop(block)).remove_block(func);
        }

        !dead.is_empty()
    }

    /// Redirects the predecessors of a block that only jumps elsewhere.
    fn contract_jump_blocks(&mut self, func: &mut Function) -> bool {
        let mut changed = false;

        while let Some((block, dest)) = self.find_jump_block(func) {
            let preds: Vec<_> = self.cfg.preds_of(block).copied().collect();
            for &pred in &preds {
                if let Some(term) = func.layout.last_insn_of(pred) {
                    func.dfg.rewrite_branch_dest(term, block, dest);
                }
            }

            for phi in leading_phis(func, dest) {
                if let Some(value) = func.dfg.remove_phi_arg(phi, block) {
                    for &pred in &preds {
                        func.dfg.append_phi_arg(phi, value, pred);
                    }
                }
            }

            trace!(func = func.name(), %block, %dest, "bypassed jump block");
            InsnInserter::at_location(CursorLocation::BlockTop(block)).remove_block(func);
            changed = true;
        }

        changed
    }

    fn find_jump_block(&mut self, func: &Function) -> Option<(Block, Block)> {
        self.cfg.compute(func);
        let entry = func.layout.entry_block()?;

        func.layout.iter_block().find_map(|block| {
            if block == entry || self.cfg.pred_num_of(block) == 0 {
                return None;
            }
            let first = func.layout.first_insn_of(block)?;
            let InsnData::Jump { dests: [dest] } = *func.dfg.insn_data(first) else {
                return None;
            };
            if dest == block {
                return None;
            }

            // A predecessor already reaching `dest` directly would need two
            // phi entries for the same edge.
            let has_phi = !leading_phis(func, dest).is_empty();
            let shares_pred = self
                .cfg
                .preds_of(block)
                .any(|pred| self.cfg.succs_of(*pred).any(|succ| *succ == dest));
            (!has_phi || !shares_pred).then_some((block, dest))
        })
    }

    /// Appends a block to its unique predecessor when the predecessor jumps
    /// to it unconditionally.
    fn merge_blocks(&mut self, func: &mut Function) -> bool {
        let mut changed = false;

        while let Some((pred, block)) = self.find_mergeable(func) {
            for phi in leading_phis(func, block) {
                let incoming = func.dfg.insn_data(phi).phi_args().next().map(|(v, _)| v);
                if let (Some(result), Some(incoming)) = (func.dfg.insn_result(phi), incoming) {
                    func.dfg.replace_uses(result, incoming);
                }
                func.remove_insn(phi);
            }

            if let Some(term) = func.layout.last_insn_of(pred) {
                func.remove_insn(term);
            }
            let insns: Vec<_> = func.layout.iter_insn(block).collect();
            for insn in insns {
                func.layout.remove_insn(insn);
                func.layout.append_insn(insn, pred);
            }

            let succs: Vec<_> = self.cfg.succs_of(block).copied().collect();
            for succ in succs {
                for phi in leading_phis(func, succ) {
                    func.dfg.rewrite_phi_block(phi, block, pred);
                }
            }

            trace!(func = func.name(), %block, %pred, "merged block into predecessor");
            func.layout.remove_block(block);
            changed = true;
        }

        changed
    }

    fn find_mergeable(&mut self, func: &Function) -> Option<(Block, Block)> {
        self.cfg.compute(func);
        let entry = func.layout.entry_block()?;

        func.layout.iter_block().find_map(|block| {
            if block == entry || self.cfg.pred_num_of(block) != 1 {
                return None;
            }
            let pred = *self.cfg.preds_of(block).next()?;
            if pred == block || self.cfg.succ_num_of(pred) != 1 {
                return None;
            }
            let term = func.layout.last_insn_of(pred)?;
            matches!(func.dfg.insn_data(term), InsnData::Jump { .. }).then_some((pred, block))
        })
    }
}

impl FunctionPass for CleanPass {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        if func.layout.entry_block().is_none() {
            return false;
        }

        let mut changed = false;
        loop {
            let mut round = self.fold_branches(func);
            round |= self.remove_unreachable_blocks(func);
            round |= self.contract_jump_blocks(func);
            round |= self.merge_blocks(func);
            if !round {
                return changed;
            }
            changed = true;
        }
    }
}

/// Outcome of a conditional branch when it does not depend on runtime
/// values.
fn branch_outcome(func: &Function, cond: CmpOp, [lhs, rhs]: [Value; 2]) -> Option<bool> {
    if let (Some(lhs), Some(rhs)) = (func.dfg.value_imm(lhs), func.dfg.value_imm(rhs)) {
        return cond.eval(lhs, rhs);
    }

    // `x cmp x` is only decidable for integers, NaN compares unequal to
    // itself.
    if lhs == rhs && func.dfg.value_ty(lhs).is_integral() {
        return Some(matches!(cond, CmpOp::Eq | CmpOp::Le | CmpOp::Ge));
    }
    None
}

fn leading_phis(func: &Function, block: Block) -> Vec<Insn> {
    func.layout
        .iter_insn(block)
        .take_while(|&insn| func.dfg.is_phi(insn))
        .collect()
}

#[cfg(test)]
mod tests {
    use quill_ir::{builder::test_util::*, Type};

    use super::*;

    #[test]
    fn constant_branch_collapses_to_straight_line() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::I32);
        let entry = builder.append_block();
        let then = builder.append_block();
        let else_ = builder.append_block();
        let join = builder.append_block();

        builder.switch_to_block(entry);
        let one = builder.constant(1i32);
        let two = builder.constant(2i32);
        builder.br(CmpOp::Lt, one, two, then, else_);

        builder.switch_to_block(then);
        builder.jump(join);

        builder.switch_to_block(else_);
        builder.jump(join);

        builder.switch_to_block(join);
        let phi = builder.phi(Type::I32, &[(one, then), (two, else_)]);
        builder.ret(phi);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        let mut pass = CleanPass::new();
        assert!(pass.run_on_function(&mut module.funcs[func_ref]));
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func() -> i32 {
    block0:
        v0.i32 = const 1;
        v1.i32 = const 2;
        return v0;
}
"
        );
        assert!(!pass.run_on_function(&mut module.funcs[func_ref]));
    }

    #[test]
    fn jump_only_block_is_bypassed() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let hop = builder.append_block();
        let other = builder.append_block();
        let join = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        let zero = builder.constant(0i32);
        builder.br(CmpOp::Gt, x, zero, hop, other);

        builder.switch_to_block(hop);
        builder.jump(join);

        builder.switch_to_block(other);
        let y = builder.neg(x);
        builder.jump(join);

        builder.switch_to_block(join);
        let phi = builder.phi(Type::I32, &[(x, hop), (y, other)]);
        builder.ret(phi);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(CleanPass::new().run_on_function(&mut module.funcs[func_ref]));
        let func = &module.funcs[func_ref];
        assert!(!func.layout.is_block_inserted(hop));
        let phi_insn = func.dfg.value_insn(phi).unwrap();
        let mut args: Vec<_> = func.dfg.insn_data(phi_insn).phi_args().collect();
        args.sort_by_key(|(_, block)| *block);
        assert_eq!(args, vec![(x, entry), (y, other)]);
        let br = func.layout.last_insn_of(entry).unwrap();
        assert_eq!(func.dfg.insn_data(br).dests(), &[join, other]);
    }

    #[test]
    fn shared_predecessor_keeps_the_jump_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let hop = builder.append_block();
        let join = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        let zero = builder.constant(0i32);
        builder.br(CmpOp::Gt, x, zero, hop, join);

        builder.switch_to_block(hop);
        builder.jump(join);

        builder.switch_to_block(join);
        let phi = builder.phi(Type::I32, &[(x, hop), (zero, entry)]);
        builder.ret(phi);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!CleanPass::new().run_on_function(&mut module.funcs[func_ref]));
    }

    #[test]
    fn unreachable_block_is_removed_with_its_phi_entries() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let looping = builder.append_block();
        let dead = builder.append_block();
        let x = builder.args()[0];

        builder.switch_to_block(entry);
        builder.jump(looping);

        builder.switch_to_block(dead);
        let d = builder.constant(9i32);
        builder.jump(looping);

        builder.switch_to_block(looping);
        let phi = builder.phi(Type::I32, &[(x, entry), (d, dead)]);
        builder.append_phi_arg(phi, phi, looping).unwrap();
        let zero = builder.constant(0i32);
        builder.br(CmpOp::Ne, phi, zero, looping, looping);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(CleanPass::new().run_on_function(&mut module.funcs[func_ref]));
        let func = &module.funcs[func_ref];
        assert!(!func.layout.is_block_inserted(dead));
        assert!(!func.is_value_live(d));

        let phi_insn = func.dfg.value_insn(phi).unwrap();
        let args: Vec<_> = func.dfg.insn_data(phi_insn).phi_args().collect();
        assert_eq!(args, vec![(x, entry), (phi, looping)]);
        let term = func.layout.last_insn_of(looping).unwrap();
        assert_eq!(func.dfg.insn_data(term), &InsnData::jump(looping));
    }
}
