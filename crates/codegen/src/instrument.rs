//! Entry tracing.

use quill_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    insn::Callee,
    FuncRef, Function, GlobalData, GlobalRef, InsnData, Module, Signature, Type,
};
use smallvec::smallvec;
use smol_str::{format_smolstr, SmolStr};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    #[error("tracer `%{name}` must have the signature `(ptr) -> void`")]
    TracerSignature { name: SmolStr },
}

/// Makes every function call `%trace_name(ptr) -> void` on entry, passing the
/// address of a global that holds the function's NUL-terminated name.
///
/// The tracer is declared as an external unless the module already declares
/// or defines it. A tracer defined in the module is not traced itself.
/// Returns the number of instrumented functions.
pub fn add_tracer(module: &mut Module, trace_name: &str) -> Result<usize, InstrumentError> {
    let sig = Signature::new(trace_name, &[Type::Ptr], Type::Void);
    let tracer = match module.lookup_callee(trace_name) {
        Some(callee) if module.callee_sig(callee) == &sig => callee,
        Some(_) => {
            return Err(InstrumentError::TracerSignature {
                name: trace_name.into(),
            })
        }
        None => Callee::Extern(module.add_external(sig)),
    };

    let funcs: Vec<FuncRef> = module
        .iter_functions()
        .filter(|&func| tracer != Callee::Func(func))
        .collect();

    let mut instrumented = 0;
    for func_ref in funcs {
        if module.funcs[func_ref].entry_block().is_none() {
            continue;
        }

        let gv = name_global(module, func_ref);
        trace_entry(&mut module.funcs[func_ref], tracer, gv);
        instrumented += 1;
    }

    tracing::debug!(tracer = trace_name, instrumented, "added entry tracing");
    Ok(instrumented)
}

fn name_global(module: &mut Module, func_ref: FuncRef) -> GlobalRef {
    let func_name = module.funcs[func_ref].name();
    let mut bytes = func_name.as_bytes().to_vec();
    bytes.push(0);

    let base = format_smolstr!("__trace_{func_name}");
    let mut name = base.clone();
    let mut k = 1;
    while module.lookup_global(&name).is_some() {
        name = format_smolstr!("{base}_{k}");
        k += 1;
    }

    let ty = Type::make_array(Type::U8, bytes.len());
    module.add_global(GlobalData::new(&name, ty, Some(bytes)))
}

/// Inserts the tracer call below the phis leading the entry block.
fn trace_entry(func: &mut Function, tracer: Callee, gv: GlobalRef) {
    let Some(entry) = func.entry_block() else {
        return;
    };
    let last_phi = func
        .layout
        .iter_insn(entry)
        .take_while(|&insn| func.dfg.is_phi(insn))
        .last();
    let loc = last_phi.map_or(CursorLocation::BlockTop(entry), CursorLocation::At);
    let mut cursor = InsnInserter::at_location(loc);

    let addr_insn = cursor.insert_insn_data(func, InsnData::GlobalAddr { gv });
    let addr = func.dfg.make_result(addr_insn, Type::Ptr, None);
    cursor.set_location(CursorLocation::At(addr_insn));
    cursor.insert_insn_data(
        func,
        InsnData::Call {
            callee: tracer,
            args: smallvec![addr],
            ret_ty: Type::Void,
        },
    );
}
