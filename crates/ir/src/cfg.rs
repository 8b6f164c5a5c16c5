//! Control flow graph derived from block terminators.
use std::collections::BTreeSet;

use cranelift_entity::{packed_option::PackedOption, EntitySet, SecondaryMap};

use crate::{Block, Function, Insn};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    entry: PackedOption<Block>,
    blocks: SecondaryMap<Block, BlockNode>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, func: &Function) {
        self.clear();

        self.entry = func.layout.entry_block().into();

        for block in func.layout.iter_block() {
            if let Some(last_insn) = func.layout.last_insn_of(block) {
                self.analyze_insn(func, last_insn);
            }
        }
    }

    pub fn preds_of(&self, block: Block) -> impl Iterator<Item = &Block> {
        self.blocks[block].preds()
    }

    pub fn succs_of(&self, block: Block) -> impl Iterator<Item = &Block> {
        self.blocks[block].succs()
    }

    pub fn pred_num_of(&self, block: Block) -> usize {
        self.blocks[block].pred_num()
    }

    pub fn succ_num_of(&self, block: Block) -> usize {
        self.blocks[block].succ_num()
    }

    pub fn entry(&self) -> Option<Block> {
        self.entry.expand()
    }

    pub fn post_order(&self) -> CfgPostOrder<'_> {
        CfgPostOrder::new(self)
    }

    /// Blocks reachable from the entry.
    pub fn reachable_blocks(&self) -> EntitySet<Block> {
        let mut reachable = EntitySet::new();
        for block in self.post_order() {
            reachable.insert(block);
        }
        reachable
    }

    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[to].push_pred(from);
        self.blocks[from].push_succ(to);
    }

    pub fn clear(&mut self) {
        self.entry = None.into();
        self.blocks.clear();
    }

    fn analyze_insn(&mut self, func: &Function, insn: Insn) {
        let block = func.layout.insn_block(insn);
        for &dest in func.dfg.insn_data(insn).dests() {
            self.add_edge(block, dest);
        }
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
struct BlockNode {
    preds: BTreeSet<Block>,
    succs: BTreeSet<Block>,
}

impl BlockNode {
    fn push_pred(&mut self, pred: Block) {
        self.preds.insert(pred);
    }

    fn push_succ(&mut self, succ: Block) {
        self.succs.insert(succ);
    }

    fn preds(&self) -> impl Iterator<Item = &Block> {
        self.preds.iter()
    }

    fn succs(&self) -> impl Iterator<Item = &Block> {
        self.succs.iter()
    }

    fn pred_num(&self) -> usize {
        self.preds.len()
    }

    fn succ_num(&self) -> usize {
        self.succs.len()
    }
}

/// Depth-first post order of the blocks reachable from the entry.
pub struct CfgPostOrder<'a> {
    cfg: &'a ControlFlowGraph,
    node_state: SecondaryMap<Block, NodeState>,
    stack: Vec<Block>,
}

impl<'a> CfgPostOrder<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        let mut stack = Vec::new();

        if let Some(entry) = cfg.entry() {
            stack.push(entry);
        }

        Self {
            cfg,
            node_state: SecondaryMap::default(),
            stack,
        }
    }
}

impl Iterator for CfgPostOrder<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        while let Some(&block) = self.stack.last() {
            if self.node_state[block].is_unvisited() {
                self.node_state[block].set_visited();
                for &succ in self.cfg.succs_of(block) {
                    if self.node_state[succ].is_unvisited() {
                        self.stack.push(succ);
                    }
                }
            } else {
                self.stack.pop();
                if !self.node_state[block].has_finished() {
                    self.node_state[block].set_finished();
                    return Some(block);
                }
            }
        }

        None
    }
}

#[derive(Default, Debug, Clone, Copy)]
struct NodeState(u8);

impl NodeState {
    fn is_unvisited(self) -> bool {
        self.0 == 0
    }

    fn has_finished(self) -> bool {
        self.0 == 2
    }

    fn set_visited(&mut self) {
        self.0 = 1;
    }

    fn set_finished(&mut self) {
        self.0 = 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::test_util::*, CmpOp, Type};

    #[test]
    fn diamond() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::Void);
        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let b2 = builder.append_block();
        let b3 = builder.append_block();
        let dead = builder.append_block();
        let arg = builder.args()[0];

        builder.switch_to_block(b0);
        builder.br(CmpOp::Eq, arg, arg, b1, b2);
        builder.switch_to_block(b1);
        builder.jump(b3);
        builder.switch_to_block(b2);
        builder.jump(b3);
        builder.switch_to_block(b3);
        builder.exit();
        builder.switch_to_block(dead);
        builder.jump(b3);
        let func_ref = builder.func_ref();

        let module = mb.build();
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&module.funcs[func_ref]);

        assert_eq!(cfg.entry(), Some(b0));
        assert_eq!(cfg.preds_of(b3).copied().collect::<Vec<_>>(), vec![b1, b2, dead]);
        assert_eq!(cfg.succ_num_of(b0), 2);

        let post_order: Vec<_> = cfg.post_order().collect();
        assert_eq!(post_order.len(), 4);
        assert_eq!(post_order.last(), Some(&b0));
        assert_eq!(post_order.first(), Some(&b3));
        assert!(!cfg.reachable_blocks().contains(dead));
    }
}
