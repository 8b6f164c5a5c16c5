//! Links several modules into a single module.
//!
//! Functions and globals of every source module are moved into the linked
//! module. An external declaration is resolved to the function another module
//! defines under the same name; declarations nobody defines stay external.

use cranelift_entity::EntityRef;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    insn::Callee,
    module::{ExternRef, FuncRef, GlobalData, GlobalRef},
    Function, InsnData, Module, Signature,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("no modules to link")]
    EmptyModules,

    #[error("function `%{name}` is defined more than once")]
    DuplicateFunction { name: SmolStr },

    #[error("function `%{name}` is declared with inconsistent signatures")]
    InconsistentSignature { name: SmolStr },

    #[error("global `@{name}` is declared with inconsistent types")]
    InconsistentGlobal { name: SmolStr },

    #[error("global `@{name}` has conflicting initializers")]
    ConflictingInitializer { name: SmolStr },
}

/// Maps the references of one source module to the linked module.
#[derive(Debug, Default)]
struct RefMap {
    funcs: FxHashMap<FuncRef, FuncRef>,
    externals: FxHashMap<ExternRef, Callee>,
    globals: FxHashMap<GlobalRef, GlobalRef>,
}

impl RefMap {
    fn lookup_callee(&self, callee: Callee) -> Callee {
        match callee {
            Callee::Func(func) => Callee::Func(self.funcs[&func]),
            Callee::Extern(ext) => self.externals[&ext],
        }
    }

    /// Rewrites the callees and globals `func` refers to.
    fn relocate(&self, func: &mut Function) {
        let insns: Vec<_> = func.insns().collect();
        for insn in insns {
            let mut data = func.dfg.insn_data(insn).clone();
            match &mut data {
                InsnData::Call { callee, .. } => *callee = self.lookup_callee(*callee),
                InsnData::GlobalAddr { gv } => *gv = self.globals[&*gv],
                _ => continue,
            }
            func.dfg.replace_insn(insn, data);
        }
    }
}

/// Links `modules` into a new module called `name`.
pub fn link_modules(name: &str, modules: &[Module]) -> Result<Module, LinkError> {
    if modules.is_empty() {
        return Err(LinkError::EmptyModules);
    }

    let mut linked = Module::new(name);
    let mut ref_maps: Vec<RefMap> = modules.iter().map(|_| RefMap::default()).collect();

    // Functions are appended in module order, so their linked references are
    // known before any body is moved.
    let mut defined: FxHashMap<&str, (FuncRef, &Signature)> = FxHashMap::default();
    for (module, ref_map) in modules.iter().zip(&mut ref_maps) {
        for (func_ref, func) in module.funcs.iter() {
            let linked_ref = FuncRef::new(defined.len());
            if defined.insert(func.name(), (linked_ref, &func.sig)).is_some() {
                return Err(LinkError::DuplicateFunction {
                    name: func.name().into(),
                });
            }
            ref_map.funcs.insert(func_ref, linked_ref);
        }
    }

    for (module, ref_map) in modules.iter().zip(&mut ref_maps) {
        for (gv, data) in module.globals.iter() {
            ref_map.globals.insert(gv, link_global(&mut linked, data)?);
        }

        for (ext, sig) in module.externals.iter() {
            let callee = match defined.get(sig.name()) {
                Some(&(func_ref, def_sig)) => {
                    check_sig(def_sig, sig)?;
                    Callee::Func(func_ref)
                }
                None => match linked.lookup_callee(sig.name()) {
                    Some(callee) => {
                        check_sig(linked.callee_sig(callee), sig)?;
                        callee
                    }
                    None => Callee::Extern(linked.add_external(sig.clone())),
                },
            };
            ref_map.externals.insert(ext, callee);
        }
    }

    for (module, ref_map) in modules.iter().zip(&ref_maps) {
        for (func_ref, func) in module.funcs.iter() {
            let mut func = func.clone();
            ref_map.relocate(&mut func);
            let linked_ref = linked.add_function(func);
            debug_assert_eq!(linked_ref, ref_map.funcs[&func_ref]);
        }
    }

    tracing::debug!(
        module = name,
        sources = modules.len(),
        funcs = linked.funcs.len(),
        externals = linked.externals.len(),
        "linked modules"
    );
    Ok(linked)
}

fn check_sig(expected: &Signature, found: &Signature) -> Result<(), LinkError> {
    if expected == found {
        Ok(())
    } else {
        Err(LinkError::InconsistentSignature {
            name: found.name().into(),
        })
    }
}

/// Globals with the same name are merged. At most one distinct initializer is
/// allowed.
fn link_global(linked: &mut Module, data: &GlobalData) -> Result<GlobalRef, LinkError> {
    let Some(gv) = linked.lookup_global(&data.name) else {
        return Ok(linked.add_global(data.clone()));
    };

    let existing = &mut linked.globals[gv];
    if existing.ty != data.ty {
        return Err(LinkError::InconsistentGlobal {
            name: data.name.clone(),
        });
    }
    match (&existing.init, &data.init) {
        (Some(lhs), Some(rhs)) if lhs != rhs => {
            return Err(LinkError::ConflictingInitializer {
                name: data.name.clone(),
            });
        }
        (None, Some(init)) => existing.init = Some(init.clone()),
        _ => {}
    }
    Ok(gv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::ModuleBuilder, ir_writer::ModuleWriter, Type};

    fn app() -> Module {
        let mut mb = ModuleBuilder::new("app").unwrap();
        let counter = mb
            .make_global(GlobalData::new("counter", Type::I32, None))
            .unwrap();
        let helper = mb
            .declare_external(Signature::new("helper", &[Type::I32], Type::I32))
            .unwrap();
        let run = mb
            .declare_function(Signature::new("run", &[Type::I32], Type::I32))
            .unwrap();

        let mut builder = mb.func_builder(run);
        let entry = builder.append_block();
        builder.switch_to_block(entry);
        let x = builder.args()[0];
        let addr = builder.global_addr(counter);
        let y = builder.call(Callee::Extern(helper), &[x]).unwrap();
        builder.store(addr, y);
        builder.ret(y);
        mb.build()
    }

    fn lib(helper_params: &[Type]) -> Module {
        let mut mb = ModuleBuilder::new("lib").unwrap();
        mb.make_global(GlobalData::new("counter", Type::I32, Some(vec![5, 0, 0, 0])))
            .unwrap();
        let log = mb
            .declare_external(Signature::new("log", &[Type::I32], Type::Void))
            .unwrap();
        let helper = mb
            .declare_function(Signature::new("helper", helper_params, Type::I32))
            .unwrap();

        let mut builder = mb.func_builder(helper);
        let entry = builder.append_block();
        builder.switch_to_block(entry);
        let x = builder.args()[0];
        let arg = if builder.type_of(x) == &Type::I32 {
            x
        } else {
            builder.cast(x, Type::I32)
        };
        builder.call(Callee::Extern(log), &[arg]);
        let twice = builder.add(arg, arg);
        builder.ret(twice);
        mb.build()
    }

    #[test]
    fn externals_resolve_to_definitions() {
        let linked = link_modules("linked", &[app(), lib(&[Type::I32])]).unwrap();

        assert_eq!(linked.externals.len(), 1);
        assert_eq!(
            linked.lookup_callee("helper"),
            Some(Callee::Func(FuncRef::new(1)))
        );
        let text = ModuleWriter::new(&linked).dump_string().unwrap();
        insta::assert_snapshot!(text, @r###"
module linked;

gv @counter: i32 = 0x05000000;
declare %log(i32) -> void;

func %run(v0.i32) -> i32 {
    block0:
        v1.ptr = gaddr @counter;
        v2.i32 = call %helper v0;
        store v1 v2;
        return v2;
}

func %helper(v0.i32) -> i32 {
    block0:
        call %log v0;
        v1.i32 = add v0 v0;
        return v1;
}
"###);
    }

    #[test]
    fn link_errors() {
        assert_eq!(
            link_modules("none", &[]).unwrap_err(),
            LinkError::EmptyModules
        );

        assert_eq!(
            link_modules("twice", &[lib(&[Type::I32]), lib(&[Type::I32])]).unwrap_err(),
            LinkError::DuplicateFunction {
                name: "helper".into()
            }
        );

        assert_eq!(
            link_modules("mismatch", &[app(), lib(&[Type::I64])]).unwrap_err(),
            LinkError::InconsistentSignature {
                name: "helper".into()
            }
        );

        let mut other = Module::new("other");
        other.add_global(GlobalData::new("counter", Type::I32, Some(vec![6, 0, 0, 0])));
        assert_eq!(
            link_modules("clash", &[lib(&[Type::I32]), other]).unwrap_err(),
            LinkError::ConflictingInitializer {
                name: "counter".into()
            }
        );
    }
}
