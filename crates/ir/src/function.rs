use smallvec::SmallVec;
use smol_str::SmolStr;

use super::{Block, DataFlowGraph, Insn, Layout, Type, Value};

#[derive(Debug, Clone)]
pub struct Function {
    /// Signature of the function.
    pub sig: Signature,
    pub arg_values: SmallVec<[Value; 8]>,

    pub dfg: DataFlowGraph,
    pub layout: Layout,
}

impl Function {
    /// Makes an empty function whose parameters get default names.
    pub fn new(sig: Signature) -> Self {
        Self::with_param_names(sig, &[])
    }

    /// Makes an empty function. Parameter `idx` is named `names[idx]` when
    /// that name is given.
    pub fn with_param_names(sig: Signature, names: &[&str]) -> Self {
        let mut dfg = DataFlowGraph::default();
        let arg_values = sig
            .params()
            .iter()
            .enumerate()
            .map(|(idx, ty)| dfg.make_param(idx, ty.clone(), names.get(idx).copied()))
            .collect();

        Self {
            sig,
            arg_values,
            dfg,
            layout: Layout::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.sig.name()
    }

    pub fn ret_ty(&self) -> &Type {
        self.sig.ret_ty()
    }

    /// The entry block is the first block of the layout.
    pub fn entry_block(&self) -> Option<Block> {
        self.layout.entry_block()
    }

    /// Detaches `insn` from the layout and drops its uses. The instruction
    /// and its result stay allocated but are dead.
    pub fn remove_insn(&mut self, insn: Insn) {
        self.dfg.detach_user(insn);
        self.layout.remove_insn(insn);
    }

    /// Returns `true` if `value` is a parameter or the result of an
    /// instruction placed in the layout.
    pub fn is_value_live(&self, value: Value) -> bool {
        match self.dfg.value_insn(value) {
            Some(insn) => self.layout.is_insn_inserted(insn),
            None => self.dfg.has_value(value),
        }
    }

    /// Returns the instructions of the function in layout order.
    pub fn insns(&self) -> impl Iterator<Item = Insn> + '_ {
        self.layout
            .iter_block()
            .flat_map(move |block| self.layout.iter_insn(block))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    name: SmolStr,
    params: SmallVec<[Type; 8]>,
    ret_ty: Type,
}

impl Signature {
    pub fn new(name: &str, params: &[Type], ret_ty: Type) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
            ret_ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn ret_ty(&self) -> &Type {
        &self.ret_ty
    }
}
