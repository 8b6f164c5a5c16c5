use super::{BuilderError, FunctionBuilder};
use crate::{
    insn::Callee,
    module::{ExternRef, FuncRef, GlobalData, GlobalRef},
    dfg::is_valid_name,
    Function, Module, Signature,
};

#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    /// Starts an empty module. Module, function, external and global names
    /// must be identifiers so that the module can be written as text.
    pub fn new(name: &str) -> Result<Self, BuilderError> {
        check_name(name)?;
        Ok(Self {
            module: Module::new(name),
        })
    }

    /// Declares a function defined in this module. Its body is built with
    /// [`Self::func_builder`].
    pub fn declare_function(&mut self, sig: Signature) -> Result<FuncRef, BuilderError> {
        self.check_callee_name(sig.name())?;
        Ok(self.module.add_function(Function::new(sig)))
    }

    /// Declares a function defined outside of this module.
    pub fn declare_external(&mut self, sig: Signature) -> Result<ExternRef, BuilderError> {
        self.check_callee_name(sig.name())?;
        Ok(self.module.add_external(sig))
    }

    pub fn make_global(&mut self, data: GlobalData) -> Result<GlobalRef, BuilderError> {
        check_name(&data.name)?;
        if self.module.lookup_global(&data.name).is_some() {
            return Err(BuilderError::NameTaken(data.name));
        }
        Ok(self.module.add_global(data))
    }

    pub fn lookup_callee(&self, name: &str) -> Option<Callee> {
        self.module.lookup_callee(name)
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalRef> {
        self.module.lookup_global(name)
    }

    pub fn func_builder(&mut self, func: FuncRef) -> FunctionBuilder<'_> {
        FunctionBuilder::new(self, func)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub(super) fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn build(self) -> Module {
        self.module
    }

    fn check_callee_name(&self, name: &str) -> Result<(), BuilderError> {
        check_name(name)?;
        if self.module.lookup_callee(name).is_some() {
            Err(BuilderError::NameTaken(name.into()))
        } else {
            Ok(())
        }
    }
}

fn check_name(name: &str) -> Result<(), BuilderError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(BuilderError::InvalidName(name.into()))
    }
}
