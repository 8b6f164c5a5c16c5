use cranelift_entity::{entity_impl, PrimaryMap};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::{insn::Callee, Function, Signature, Type};

/// A translation unit: functions, external declarations and globals.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: SmolStr,

    /// Holds all function defined in the module, in definition order.
    pub funcs: PrimaryMap<FuncRef, Function>,

    /// Functions declared but defined outside of the module.
    pub externals: PrimaryMap<ExternRef, Signature>,

    pub globals: PrimaryMap<GlobalRef, GlobalData>,

    callees: IndexMap<SmolStr, Callee>,
    global_names: IndexMap<SmolStr, GlobalRef>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a function definition. The function is only reachable by name if
    /// no other function or external declaration already uses its name.
    pub fn add_function(&mut self, func: Function) -> FuncRef {
        let name = SmolStr::from(func.name());
        let func_ref = self.funcs.push(func);
        self.callees.entry(name).or_insert(Callee::Func(func_ref));
        func_ref
    }

    pub fn add_external(&mut self, sig: Signature) -> ExternRef {
        let name = SmolStr::from(sig.name());
        let ext_ref = self.externals.push(sig);
        self.callees.entry(name).or_insert(Callee::Extern(ext_ref));
        ext_ref
    }

    pub fn add_global(&mut self, data: GlobalData) -> GlobalRef {
        let name = data.name.clone();
        let gv = self.globals.push(data);
        self.global_names.entry(name).or_insert(gv);
        gv
    }

    /// Returns `func_ref` in the module.
    pub fn iter_functions(&self) -> impl Iterator<Item = FuncRef> {
        self.funcs.keys()
    }

    pub fn lookup_callee(&self, name: &str) -> Option<Callee> {
        self.callees.get(name).copied()
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalRef> {
        self.global_names.get(name).copied()
    }

    pub fn callee_sig(&self, callee: Callee) -> &Signature {
        match callee {
            Callee::Func(func) => &self.funcs[func].sig,
            Callee::Extern(ext) => &self.externals[ext],
        }
    }

    pub fn callee_name(&self, callee: Callee) -> &str {
        self.callee_sig(callee).name()
    }

    pub fn has_callee(&self, callee: Callee) -> bool {
        match callee {
            Callee::Func(func) => self.funcs.is_valid(func),
            Callee::Extern(ext) => self.externals.is_valid(ext),
        }
    }
}

/// A module-level variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalData {
    pub name: SmolStr,
    pub ty: Type,

    /// Little-endian initial contents. Zero-initialized if `None`.
    pub init: Option<Vec<u8>>,
}

impl GlobalData {
    pub fn new(name: &str, ty: Type, init: Option<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            ty,
            init,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "func");

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternRef(u32);
entity_impl!(ExternRef, "extern");

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalRef(u32);
entity_impl!(GlobalRef, "gv");
