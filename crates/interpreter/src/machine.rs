use cranelift_entity::SecondaryMap;
use quill_ir::{
    insn::Callee,
    interpret::{eval_binary, eval_cast, eval_unary, Action, ArithError, EvalValue},
    module::{FuncRef, GlobalRef},
    Block, Function, Immediate, Insn, InsnData, Module, Value,
};
use tracing::trace;

use crate::{memory::Memory, EvalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Instructions a single [`Machine::run`] may execute, calls included.
    pub step_limit: u64,
    pub max_call_depth: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            step_limit: 1_000_000,
            max_call_depth: 256,
        }
    }
}

pub struct Machine<'m> {
    module: &'m Module,
    config: MachineConfig,
    memory: Memory,
    globals: SecondaryMap<GlobalRef, u64>,
    steps: u64,
    depth: usize,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self::with_config(module, MachineConfig::default())
    }

    pub fn with_config(module: &'m Module, config: MachineConfig) -> Self {
        let mut machine = Self {
            module,
            config,
            memory: Memory::new(),
            globals: SecondaryMap::new(),
            steps: 0,
            depth: 0,
        };
        machine.clear_state();
        machine
    }

    /// Runs `func_ref` to completion. Returns the returned value, or `None`
    /// if the function exits without one.
    ///
    /// Stores to globals are kept across runs until [`Machine::clear_state`].
    pub fn run(
        &mut self,
        func_ref: FuncRef,
        args: Vec<EvalValue>,
    ) -> Result<Option<EvalValue>, EvalError> {
        self.steps = 0;
        self.depth = 0;
        let result = self.call(func_ref, args);
        trace!(
            func = self.module.funcs[func_ref].name(),
            steps = self.steps,
            ok = result.is_ok(),
            "run finished"
        );
        result
    }

    /// Resets memory, laying out globals with their initial contents.
    pub fn clear_state(&mut self) {
        self.memory = Memory::new();
        self.globals.clear();
        for (gv, data) in self.module.globals.iter() {
            self.globals[gv] = self
                .memory
                .alloc_init(data.ty.size_of(), data.init.as_deref());
        }
    }

    pub fn global_addr(&self, gv: GlobalRef) -> u64 {
        self.globals[gv]
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Instructions executed by the last run.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn call(
        &mut self,
        func_ref: FuncRef,
        args: Vec<EvalValue>,
    ) -> Result<Option<EvalValue>, EvalError> {
        let func = &self.module.funcs[func_ref];
        if args.len() != func.arg_values.len() {
            return Err(EvalError::ArgumentCount {
                func: func.name().to_string(),
                expected: func.arg_values.len(),
                found: args.len(),
            });
        }
        if self.depth == self.config.max_call_depth {
            return Err(EvalError::CallDepth(self.depth));
        }

        self.depth += 1;
        let mark = self.memory.mark();
        let mut frame = Frame::new(func, args);
        let result = self.run_on_func(func, &mut frame);
        self.memory.release(mark);
        self.depth -= 1;
        result
    }

    fn run_on_func(
        &mut self,
        func: &'m Function,
        frame: &mut Frame,
    ) -> Result<Option<EvalValue>, EvalError> {
        let layout = &func.layout;
        let entry = layout
            .entry_block()
            .ok_or(EvalError::Malformed("function has no blocks"))?;
        let mut pc = layout.first_insn_of(entry).ok_or(FELL_OFF)?;

        loop {
            self.steps += 1;
            if self.steps > self.config.step_limit {
                return Err(EvalError::StepLimit(self.config.step_limit));
            }

            match self.eval_insn(func, frame, pc)? {
                Action::Continue => {
                    pc = layout.next_insn_of(pc).ok_or(FELL_OFF)?;
                }
                Action::JumpTo(dest) => {
                    let from = layout.insn_block(pc);
                    pc = enter_block(func, frame, from, dest)?;
                }
                Action::Return(value) => return Ok(value),
            }
        }
    }

    fn eval_insn(
        &mut self,
        func: &Function,
        frame: &mut Frame,
        insn: Insn,
    ) -> Result<Action, EvalError> {
        let dfg = &func.dfg;
        let result = match dfg.insn_data(insn) {
            InsnData::Const { imm } => EvalValue::Imm(*imm),
            InsnData::Undef { .. } => EvalValue::Undef,
            InsnData::Unary { code, args } => lift(frame.get(args[0]), |a| eval_unary(*code, a))?,
            InsnData::Binary { code, args } => {
                match (frame.get(args[0]), frame.get(args[1])) {
                    (EvalValue::Imm(l), EvalValue::Imm(r)) => eval_binary(*code, l, r)?.into(),
                    _ => EvalValue::Undef,
                }
            }
            InsnData::Cast { args, ty } => lift(frame.get(args[0]), |a| eval_cast(a, ty))?,
            InsnData::Load { args, ty } => {
                let addr = address(frame.get(args[0]))?;
                self.memory.load(addr, ty)?
            }
            InsnData::Store { args } => {
                let addr = address(frame.get(args[0]))?;
                let ty = dfg.value_ty(args[1]);
                self.memory.store(addr, frame.get(args[1]), ty)?;
                return Ok(Action::Continue);
            }
            InsnData::Alloc { ty } => Immediate::Ptr(self.memory.alloc(ty.size_of())).into(),
            InsnData::GlobalAddr { gv } => Immediate::Ptr(self.globals[*gv]).into(),
            InsnData::Call { callee, args, .. } => {
                let func_ref = match *callee {
                    Callee::Func(func_ref) => func_ref,
                    Callee::Extern(ext) => {
                        let name = self.module.externals[ext].name();
                        return Err(EvalError::ExternalCall(name.to_string()));
                    }
                };
                let args = args.iter().map(|&arg| frame.get(arg)).collect();
                match self.call(func_ref, args)? {
                    Some(value) => value,
                    None => return Ok(Action::Continue),
                }
            }
            InsnData::Phi { .. } => {
                return Err(EvalError::Malformed("phi after a non-phi instruction"))
            }
            InsnData::Jump { dests } => return Ok(Action::JumpTo(dests[0])),
            InsnData::Branch { cond, args, dests } => {
                let (EvalValue::Imm(lhs), EvalValue::Imm(rhs)) =
                    (frame.get(args[0]), frame.get(args[1]))
                else {
                    return Err(EvalError::UndefinedCondition);
                };
                let taken = cond.eval(lhs, rhs).ok_or(ArithError::TypeMismatch)?;
                let dest = if taken { dests[0] } else { dests[1] };
                return Ok(Action::JumpTo(dest));
            }
            InsnData::Return { args } => return Ok(Action::Return(Some(frame.get(args[0])))),
            InsnData::Exit => return Ok(Action::Return(None)),
        };

        if let Some(value) = dfg.insn_result(insn) {
            frame.set(value, result);
        }
        Ok(Action::Continue)
    }
}

const FELL_OFF: EvalError = EvalError::Malformed("block without terminator");

/// Moves control from `from` to `dest`. The phis of `dest` read their
/// incoming values all at once, before any of them is written, and the
/// first non-phi instruction of `dest` is returned.
fn enter_block(
    func: &Function,
    frame: &mut Frame,
    from: Block,
    dest: Block,
) -> Result<Insn, EvalError> {
    let mut incoming = Vec::new();
    let mut next = func.layout.first_insn_of(dest);
    while let Some(insn) = next {
        let data = func.dfg.insn_data(insn);
        if !data.is_phi() {
            break;
        }

        let (value, _) = data
            .phi_args()
            .find(|&(_, block)| block == from)
            .ok_or(EvalError::Malformed("phi has no entry for the predecessor"))?;
        if let Some(result) = func.dfg.insn_result(insn) {
            incoming.push((result, frame.get(value)));
        }
        next = func.layout.next_insn_of(insn);
    }

    for (result, value) in incoming {
        frame.set(result, value);
    }
    next.ok_or(FELL_OFF)
}

fn lift<F>(arg: EvalValue, f: F) -> Result<EvalValue, EvalError>
where
    F: FnOnce(Immediate) -> Result<Immediate, ArithError>,
{
    match arg {
        EvalValue::Imm(imm) => Ok(f(imm)?.into()),
        EvalValue::Undef => Ok(EvalValue::Undef),
    }
}

fn address(value: EvalValue) -> Result<u64, EvalError> {
    match value {
        EvalValue::Imm(imm) => imm
            .as_i128()
            .map(|addr| addr as u64)
            .ok_or(EvalError::Arith(ArithError::TypeMismatch)),
        EvalValue::Undef => Err(EvalError::UndefinedAddress),
    }
}

struct Frame {
    locals: SecondaryMap<Value, EvalValue>,
}

impl Frame {
    fn new(func: &Function, args: Vec<EvalValue>) -> Self {
        let mut locals = SecondaryMap::new();
        for (&value, arg) in func.arg_values.iter().zip(args) {
            locals[value] = arg;
        }
        Self { locals }
    }

    fn get(&self, value: Value) -> EvalValue {
        self.locals[value]
    }

    fn set(&mut self, value: Value, e_val: EvalValue) {
        self.locals[value] = e_val;
    }
}
