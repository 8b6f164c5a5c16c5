//! Promotes stack slots to SSA values.
//!
//! A slot is promotable when it holds a scalar and its address is only used
//! directly by loads and stores of the slot type. Phis are placed at the
//! iterated dominance frontier of the blocks storing to the slot, then loads
//! and stores are renamed by a walk of the dominator tree.

use std::collections::BTreeSet;

use quill_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    Block, ControlFlowGraph, DomTree, DominatorTreeTraversable, Function, Insn, InsnData, Type,
    Value,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::pass::FunctionPass;

#[derive(Debug, Default)]
pub struct Mem2RegPromotor {
    cfg: ControlFlowGraph,
    domtree: DomTree,
    dom_children: DominatorTreeTraversable,

    slots: Vec<Slot>,
    slot_of_addr: FxHashMap<Value, usize>,
    slot_of_phi: FxHashMap<Insn, usize>,
    /// Current value of each slot during renaming.
    stacks: Vec<Vec<Value>>,
    /// Loads and stores to remove once renaming is done.
    dead: Vec<Insn>,
}

#[derive(Debug)]
struct Slot {
    alloc: Insn,
    ty: Type,
    /// Lazily made value for reads that no store reaches.
    undef: Option<Value>,
}

enum Visit {
    Enter(Block),
    Exit(SmallVec<[usize; 4]>),
}

impl Mem2RegPromotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cfg.clear();
        self.domtree.clear();
        self.dom_children.clear();
        self.slots.clear();
        self.slot_of_addr.clear();
        self.slot_of_phi.clear();
        self.stacks.clear();
        self.dead.clear();
    }

    fn collect_slots(&mut self, func: &Function) {
        for block in func.layout.iter_block() {
            if !self.domtree.is_reachable(block) {
                continue;
            }

            for insn in func.layout.iter_insn(block) {
                let InsnData::Alloc { ty } = func.dfg.insn_data(insn) else {
                    continue;
                };
                let Some(addr) = func.dfg.insn_result(insn) else {
                    continue;
                };
                if ty.is_scalar() && self.is_promotable(func, addr, ty) {
                    self.slot_of_addr.insert(addr, self.slots.len());
                    self.slots.push(Slot {
                        alloc: insn,
                        ty: ty.clone(),
                        undef: None,
                    });
                }
            }
        }
    }

    fn is_promotable(&self, func: &Function, addr: Value, ty: &Type) -> bool {
        func.dfg.users(addr).all(|&user| {
            if !self.domtree.is_reachable(func.layout.insn_block(user)) {
                return false;
            }

            match func.dfg.insn_data(user) {
                InsnData::Load {
                    args: [from],
                    ty: loaded,
                } => *from == addr && loaded == ty,
                InsnData::Store { args: [to, value] } => {
                    *to == addr && *value != addr && func.dfg.value_ty(*value) == ty
                }
                _ => false,
            }
        })
    }

    fn place_phis(&mut self, func: &mut Function) {
        let df = self.domtree.compute_df(&self.cfg);

        for idx in 0..self.slots.len() {
            let addr = self.slot_addr(func, idx);
            let mut worklist: Vec<Block> = func
                .dfg
                .users(addr)
                .filter(|&&user| matches!(func.dfg.insn_data(user), InsnData::Store { .. }))
                .map(|&user| func.layout.insn_block(user))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let mut has_phi = BTreeSet::new();
            while let Some(block) = worklist.pop() {
                for &frontier in df.frontiers(block) {
                    if !has_phi.insert(frontier) {
                        continue;
                    }

                    let phi = func.dfg.make_insn(InsnData::Phi {
                        values: SmallVec::new(),
                        blocks: SmallVec::new(),
                        ty: self.slots[idx].ty.clone(),
                    });
                    func.dfg.make_result(phi, self.slots[idx].ty.clone(), None);
                    func.layout.prepend_insn(phi, frontier);
                    self.slot_of_phi.insert(phi, idx);
                    worklist.push(frontier);
                }
            }
        }
    }

    fn rename(&mut self, func: &mut Function, entry: Block) {
        self.stacks = vec![Vec::new(); self.slots.len()];

        let mut visits = vec![Visit::Enter(entry)];
        while let Some(visit) = visits.pop() {
            match visit {
                Visit::Enter(block) => {
                    let pushed = self.rename_block(func, block);
                    visits.push(Visit::Exit(pushed));
                    for &child in self.dom_children.children_of(block).iter().rev() {
                        visits.push(Visit::Enter(child));
                    }
                }

                Visit::Exit(pushed) => {
                    for idx in pushed {
                        self.stacks[idx].pop();
                    }
                }
            }
        }
    }

    /// Renames the loads and stores of `block` and fills the phi operands of
    /// its successors. Returns the slots whose stack was pushed.
    fn rename_block(&mut self, func: &mut Function, block: Block) -> SmallVec<[usize; 4]> {
        let mut pushed = SmallVec::new();

        let insns: Vec<_> = func.layout.iter_insn(block).collect();
        for insn in insns {
            if let Some(&idx) = self.slot_of_phi.get(&insn) {
                if let Some(result) = func.dfg.insn_result(insn) {
                    self.stacks[idx].push(result);
                    pushed.push(idx);
                }
                continue;
            }

            let (addr, stored) = match func.dfg.insn_data(insn) {
                InsnData::Load { args: [addr], .. } => (*addr, None),
                InsnData::Store {
                    args: [addr, value],
                } => (*addr, Some(*value)),
                _ => continue,
            };
            let Some(&idx) = self.slot_of_addr.get(&addr) else {
                continue;
            };

            match stored {
                Some(value) => {
                    self.stacks[idx].push(value);
                    pushed.push(idx);
                }
                None => {
                    let current = self.current_value(func, idx);
                    if let Some(loaded) = func.dfg.insn_result(insn) {
                        func.dfg.replace_uses(loaded, current);
                    }
                }
            }
            self.dead.push(insn);
        }

        let succs: SmallVec<[Block; 2]> = self.cfg.succs_of(block).copied().collect();
        for succ in succs {
            let phis: SmallVec<[(Insn, usize); 4]> = func
                .layout
                .iter_insn(succ)
                .map_while(|insn| {
                    func.dfg
                        .is_phi(insn)
                        .then(|| self.slot_of_phi.get(&insn).map(|&idx| (insn, idx)))
                })
                .flatten()
                .collect();

            for (phi, idx) in phis {
                let value = self.current_value(func, idx);
                func.dfg.append_phi_arg(phi, value, block);
            }
        }

        pushed
    }

    fn current_value(&mut self, func: &mut Function, idx: usize) -> Value {
        if let Some(&value) = self.stacks[idx].last() {
            return value;
        }

        if let Some(undef) = self.slots[idx].undef {
            return undef;
        }

        let Some(entry) = func.layout.entry_block() else {
            unreachable!("renaming starts at the entry block");
        };
        // The entry block may be a loop header with phis of its own.
        let last_phi = func
            .layout
            .iter_insn(entry)
            .take_while(|&insn| func.dfg.is_phi(insn))
            .last();
        let loc = last_phi.map_or(CursorLocation::BlockTop(entry), CursorLocation::At);
        let mut cursor = InsnInserter::at_location(loc);
        let ty = self.slots[idx].ty.clone();
        let insn = cursor.insert_insn_data(func, InsnData::Undef { ty: ty.clone() });
        let undef = func.dfg.make_result(insn, ty, None);
        self.slots[idx].undef = Some(undef);
        undef
    }

    fn slot_addr(&self, func: &Function, idx: usize) -> Value {
        match func.dfg.insn_result(self.slots[idx].alloc) {
            Some(addr) => addr,
            None => unreachable!("allocs always have a result"),
        }
    }
}

impl FunctionPass for Mem2RegPromotor {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        self.clear();
        let Some(entry) = func.layout.entry_block() else {
            return false;
        };

        self.cfg.compute(func);
        self.domtree.compute(&self.cfg);
        self.collect_slots(func);
        if self.slots.is_empty() {
            return false;
        }

        self.dom_children.compute(&self.domtree);
        self.place_phis(func);
        self.rename(func, entry);

        for insn in std::mem::take(&mut self.dead) {
            func.remove_insn(insn);
        }
        for slot in &self.slots {
            trace!(func = func.name(), alloc = %slot.alloc, ty = %slot.ty, "promoted slot");
            func.remove_insn(slot.alloc);
        }
        debug!(func = func.name(), slots = self.slots.len(), "promoted stack slots");

        true
    }
}
