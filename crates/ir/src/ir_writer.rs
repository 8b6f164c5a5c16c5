//! Text form of the IR.
use std::io;

use crate::{
    insn::Callee,
    module::{FuncRef, GlobalData},
    Block, Function, Insn, InsnData, Module, Signature, Value,
};

pub struct ModuleWriter<'a> {
    module: &'a Module,
}

impl<'a> ModuleWriter<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self { module }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        writeln!(w, "module {};", self.module.name)?;

        if !self.module.globals.is_empty() || !self.module.externals.is_empty() {
            writeln!(w)?;
        }
        for gv in self.module.globals.values() {
            write_global(gv, &mut w)?;
        }
        for sig in self.module.externals.values() {
            write!(w, "declare ")?;
            write_sig_types(sig, &mut w)?;
            writeln!(w, ";")?;
        }

        for func_ref in self.module.funcs.keys() {
            writeln!(w)?;
            FuncWriter::new(self.module, func_ref).write(&mut w)?;
        }

        Ok(())
    }

    pub fn dump_string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        self.write(&mut s)?;
        String::from_utf8(s).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

pub struct FuncWriter<'a> {
    module: &'a Module,
    func: &'a Function,
    level: u8,
}

impl<'a> FuncWriter<'a> {
    pub fn new(module: &'a Module, func_ref: FuncRef) -> Self {
        Self {
            module,
            func: &module.funcs[func_ref],
            level: 0,
        }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        write!(w, "func %{}(", self.func.name())?;
        let mut delim = "";
        for &arg in &self.func.arg_values {
            write!(w, "{delim}")?;
            self.write_value_with_ty(arg, &mut w)?;
            delim = ", ";
        }
        writeln!(w, ") -> {} {{", self.func.ret_ty())?;

        self.level += 1;
        let mut blocks = self.func.layout.iter_block().peekable();
        while let Some(block) = blocks.next() {
            self.write_block_with_insn(block, &mut w)?;
            if blocks.peek().is_some() {
                self.newline(&mut w)?;
            }
        }
        self.level -= 1;

        writeln!(w, "}}")
    }

    pub fn dump_string(&mut self) -> io::Result<String> {
        let mut s = Vec::new();
        self.write(&mut s)?;
        String::from_utf8(s).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn write_block_with_insn(&mut self, block: Block, mut w: impl io::Write) -> io::Result<()> {
        self.indent(&mut w)?;
        writeln!(w, "{}:", self.func.dfg.block_label(block))?;

        self.level += 1;
        for insn in self.func.layout.iter_insn(block) {
            self.indent(&mut w)?;
            self.write_insn(insn, &mut w)?;
            writeln!(w, ";")?;
        }
        self.level -= 1;

        Ok(())
    }

    pub fn write_insn(&self, insn: Insn, mut w: impl io::Write) -> io::Result<()> {
        if let Some(result) = self.func.dfg.insn_result(insn) {
            self.write_value_with_ty(result, &mut w)?;
            write!(w, " = ")?;
        }

        let data = self.func.dfg.insn_data(insn);
        write!(w, "{}", data.opcode())?;
        match data {
            InsnData::Const { imm } => write!(w, " {imm}")?,
            InsnData::Alloc { ty } => write!(w, " {ty}")?,
            InsnData::GlobalAddr { gv } => write!(w, " @{}", self.module.globals[*gv].name)?,
            InsnData::Call { callee, .. } => write!(w, " %{}", self.callee_name(*callee))?,
            InsnData::Branch { cond, .. } => write!(w, " {cond}")?,
            _ => {}
        }

        if let InsnData::Phi { .. } = data {
            for (value, block) in data.phi_args() {
                write!(
                    w,
                    " ({} {})",
                    self.func.dfg.value_name(value),
                    self.func.dfg.block_label(block)
                )?;
            }
        } else {
            for &arg in data.args() {
                write!(w, " {}", self.func.dfg.value_name(arg))?;
            }
        }

        for &dest in data.dests() {
            write!(w, " {}", self.func.dfg.block_label(dest))?;
        }

        Ok(())
    }

    fn write_value_with_ty(&self, value: Value, mut w: impl io::Write) -> io::Result<()> {
        let dfg = &self.func.dfg;
        write!(w, "{}.{}", dfg.value_name(value), dfg.value_ty(value))
    }

    fn callee_name(&self, callee: Callee) -> &str {
        if self.module.has_callee(callee) {
            self.module.callee_name(callee)
        } else {
            "<unknown>"
        }
    }

    pub fn indent(&self, mut w: impl io::Write) -> io::Result<()> {
        w.write_all(" ".repeat(self.level as usize * 4).as_bytes())
    }

    pub fn newline(&self, mut w: impl io::Write) -> io::Result<()> {
        w.write_all(b"\n")
    }
}

fn write_global(gv: &GlobalData, mut w: impl io::Write) -> io::Result<()> {
    write!(w, "gv @{}: {}", gv.name, gv.ty)?;
    if let Some(init) = &gv.init {
        write!(w, " = 0x{}", hex::encode(init))?;
    }
    writeln!(w, ";")
}

fn write_sig_types(sig: &Signature, mut w: impl io::Write) -> io::Result<()> {
    write!(w, "%{}(", sig.name())?;
    let mut delim = "";
    for ty in sig.params() {
        write!(w, "{delim}{ty}")?;
        delim = ", ";
    }
    write!(w, ") -> {}", sig.ret_ty())
}
