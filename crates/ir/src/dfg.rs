//! This module contains quill IR data flow graph.
use std::collections::BTreeSet;

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashSet;
use smol_str::{format_smolstr, SmolStr};

use super::{Immediate, Insn, InsnData, Type, Value, ValueData};

/// An opaque reference to [`BlockData`]
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block(pub u32);
entity_impl!(Block, "block");

/// A block data definition.
/// A Block data doesn't hold any information for layout of a program. It is managed by
/// [`super::layout::Layout`].
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub label: SmolStr,
}

#[derive(Debug, Clone, Default)]
pub struct DataFlowGraph {
    blocks: PrimaryMap<Block, BlockData>,
    values: PrimaryMap<Value, ValueData>,
    value_names: SecondaryMap<Value, SmolStr>,
    insns: PrimaryMap<Insn, InsnData>,
    insn_results: SecondaryMap<Insn, PackedOption<Value>>,
    users: SecondaryMap<Value, BTreeSet<Insn>>,

    /// Every value name ever handed out, including names of deleted values.
    used_names: FxHashSet<SmolStr>,
    used_labels: FxHashSet<SmolStr>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a new block. `label` is used if it is still free, otherwise a
    /// fresh label derived from it is chosen.
    pub fn make_block(&mut self, label: Option<&str>) -> Block {
        let label = match label {
            Some(label) => fresh_name(&mut self.used_labels, label),
            None => {
                let base = format_smolstr!("block{}", self.blocks.len());
                fresh_name(&mut self.used_labels, &base)
            }
        };
        self.blocks.push(BlockData { label })
    }

    pub fn make_param(&mut self, idx: usize, ty: Type, name: Option<&str>) -> Value {
        self.make_value(ValueData::Param { idx, ty }, name)
    }

    pub fn make_insn(&mut self, data: InsnData) -> Insn {
        let insn = self.insns.push(data);
        self.attach_user(insn);
        insn
    }

    /// Makes the result value of `insn`.
    pub fn make_result(&mut self, insn: Insn, ty: Type, name: Option<&str>) -> Value {
        debug_assert!(self.insn_results[insn].is_none());
        let value = self.make_value(ValueData::Insn { insn, ty }, name);
        self.insn_results[insn] = value.into();
        value
    }

    fn make_value(&mut self, data: ValueData, name: Option<&str>) -> Value {
        let name = match name {
            Some(name) => fresh_name(&mut self.used_names, name),
            None => {
                let base = format_smolstr!("v{}", self.values.len());
                fresh_name(&mut self.used_names, &base)
            }
        };
        let value = self.values.push(data);
        self.value_names[value] = name;
        value
    }

    /// Renames `value`. Returns `false` and leaves the value untouched if the
    /// name was ever used in this function.
    pub fn rename_value(&mut self, value: Value, name: &str) -> bool {
        if self.value_names[value].as_str() == name {
            return true;
        }
        if !self.used_names.insert(name.into()) {
            return false;
        }
        self.value_names[value] = name.into();
        true
    }

    pub fn replace_insn(&mut self, insn: Insn, new: InsnData) {
        let old = std::mem::replace(&mut self.insns[insn], new);

        // Remove the arguments of the old insn from the user set.
        for &value in old.args() {
            self.remove_user(value, insn);
        }

        self.attach_user(insn);
    }

    /// Rewrites every use of `old` to `new`.
    pub fn replace_uses(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }

        let users = std::mem::take(&mut self.users[old]);
        for &user in &users {
            for arg in self.insns[user].args_mut() {
                if *arg == old {
                    *arg = new;
                }
            }
            self.users[new].insert(user);
        }
        tracing::trace!(%old, %new, users = users.len(), "replaced uses");
    }

    /// Drops the uses of `insn` from the use lists of its operands.
    pub fn detach_user(&mut self, insn: Insn) {
        let args: smallvec::SmallVec<[Value; 8]> = self.insns[insn].args().into();
        for value in args {
            self.remove_user(value, insn);
        }
    }

    pub fn attach_user(&mut self, insn: Insn) {
        let data = &self.insns[insn];
        for &value in data.args() {
            self.users[value].insert(insn);
        }
    }

    /// Returns the all instructions that use the `value`.
    pub fn users(&self, value: Value) -> impl Iterator<Item = &Insn> {
        self.users[value].iter()
    }

    /// Returns the number of instructions that use the `value`.
    pub fn users_num(&self, value: Value) -> usize {
        self.users[value].len()
    }

    pub fn remove_user(&mut self, value: Value, user: Insn) {
        self.users[value].remove(&user);
    }

    pub fn append_phi_arg(&mut self, insn: Insn, value: Value, block: Block) {
        self.insns[insn].append_phi_arg(value, block);
        self.users[value].insert(insn);
    }

    /// Removes the incoming entry of `block` from the phi `insn`.
    pub fn remove_phi_arg(&mut self, insn: Insn, block: Block) -> Option<Value> {
        let value = self.insns[insn].remove_phi_arg(block)?;
        if !self.insns[insn].args().contains(&value) {
            self.remove_user(value, insn);
        }
        Some(value)
    }

    /// Redirects terminator or phi block references without touching use
    /// lists.
    pub fn rewrite_branch_dest(&mut self, insn: Insn, from: Block, to: Block) {
        self.insns[insn].rewrite_branch_dest(from, to);
    }

    pub fn rewrite_phi_block(&mut self, insn: Insn, from: Block, to: Block) {
        self.insns[insn].rewrite_phi_block(from, to);
    }

    pub fn insn_data(&self, insn: Insn) -> &InsnData {
        &self.insns[insn]
    }

    pub fn insn_result(&self, insn: Insn) -> Option<Value> {
        self.insn_results[insn].expand()
    }

    pub fn value_data(&self, value: Value) -> &ValueData {
        &self.values[value]
    }

    pub fn value_ty(&self, value: Value) -> &Type {
        self.values[value].ty()
    }

    pub fn value_name(&self, value: Value) -> &str {
        &self.value_names[value]
    }

    pub fn value_insn(&self, value: Value) -> Option<Insn> {
        match self.values[value] {
            ValueData::Insn { insn, .. } => Some(insn),
            ValueData::Param { .. } => None,
        }
    }

    /// Returns the constant `value` holds if it is defined by `Const`.
    pub fn value_imm(&self, value: Value) -> Option<Immediate> {
        match self.insn_data(self.value_insn(value)?) {
            InsnData::Const { imm } => Some(*imm),
            _ => None,
        }
    }

    pub fn block_label(&self, block: Block) -> &str {
        &self.blocks[block].label
    }

    /// Returns `true` if `name` was ever given to a value of this function.
    pub fn is_name_used(&self, name: &str) -> bool {
        self.used_names.contains(name)
    }

    pub fn is_label_used(&self, label: &str) -> bool {
        self.used_labels.contains(label)
    }

    pub fn is_phi(&self, insn: Insn) -> bool {
        self.insns[insn].is_phi()
    }

    pub fn is_terminator(&self, insn: Insn) -> bool {
        self.insns[insn].is_terminator()
    }

    pub fn has_value(&self, value: Value) -> bool {
        self.values.is_valid(value)
    }

    pub fn has_block(&self, block: Block) -> bool {
        self.blocks.is_valid(block)
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn values(&self) -> impl Iterator<Item = Value> {
        self.values.keys()
    }
}

/// Reserves `base` in `used` or, if it is taken, the first free `base_k`.
fn fresh_name(used: &mut FxHashSet<SmolStr>, base: &str) -> SmolStr {
    if used.insert(base.into()) {
        return base.into();
    }

    let mut k = 1usize;
    loop {
        let candidate = format_smolstr!("{base}_{k}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        k += 1;
    }
}

/// Returns `true` if `name` can be written as a value name or a block label.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_never_reused() {
        let mut dfg = DataFlowGraph::new();
        let x = dfg.make_param(0, Type::I32, Some("x"));
        let y = dfg.make_param(1, Type::I32, Some("x"));
        assert_eq!(dfg.value_name(x), "x");
        assert_eq!(dfg.value_name(y), "x_1");

        assert!(dfg.rename_value(x, "a"));
        // `x` stays reserved after the rename.
        let z = dfg.make_param(2, Type::I32, Some("x"));
        assert_eq!(dfg.value_name(z), "x_2");
        assert!(!dfg.rename_value(z, "a"));
    }

    #[test]
    fn replace_uses_moves_users() {
        let mut dfg = DataFlowGraph::new();
        let a = dfg.make_param(0, Type::I32, None);
        let b = dfg.make_param(1, Type::I32, None);
        let add = dfg.make_insn(InsnData::binary(crate::BinaryOp::Add, a, a));
        let add_res = dfg.make_result(add, Type::I32, None);
        assert_eq!(dfg.users_num(a), 1);

        dfg.replace_uses(a, b);
        assert_eq!(dfg.users_num(a), 0);
        assert_eq!(dfg.users(b).copied().collect::<Vec<_>>(), vec![add]);
        assert_eq!(dfg.insn_data(add).args(), &[b, b]);
        assert_eq!(dfg.value_insn(add_res), Some(add));
    }

    #[test]
    fn valid_names() {
        assert!(is_valid_name("v0"));
        assert!(is_valid_name("_tmp_1"));
        assert!(!is_valid_name("1x"));
        assert!(!is_valid_name("a.b"));
        assert!(!is_valid_name(""));
    }
}
