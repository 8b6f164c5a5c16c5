mod func_builder;
mod module_builder;

use smol_str::SmolStr;

pub use func_builder::FunctionBuilder;
pub use module_builder::ModuleBuilder;

use crate::{module::GlobalRef, Block, Insn, Value};

/// Misuse of the builder API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuilderError {
    #[error("no insertion block is selected")]
    NoInsertionBlock,

    #[error("`{block}` already ends with a terminator")]
    EmitAfterTerminator { block: SmolStr },

    #[error("`{0}` is not a value of this function")]
    UnknownValue(Value),

    #[error("`{0}` is not a block of this function")]
    UnknownBlock(Block),

    #[error("callee is not declared in the module")]
    UnknownCallee,

    #[error("`{0}` is not a global of the module")]
    UnknownGlobal(GlobalRef),

    #[error("`{0}` is not the result of a phi")]
    NotAPhi(Value),

    #[error("`{0}` is not placed in a block")]
    UnknownInsn(Insn),

    #[error("cannot split a block at the phi `{0}`")]
    SplitAtPhi(Insn),

    #[error("name `{0}` is already used")]
    NameTaken(SmolStr),

    #[error("`{0}` is not a valid name")]
    InvalidName(SmolStr),
}

pub mod test_util {
    use super::*;

    use crate::{ir_writer::FuncWriter, module::FuncRef, Module, Signature, Type};

    pub struct TestModuleBuilder {
        module_builder: ModuleBuilder,
        func_num: usize,
    }

    impl TestModuleBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Declares `test_func`, `test_func1`, ... and returns its builder.
        pub fn func_builder(&mut self, args: &[Type], ret_ty: Type) -> FunctionBuilder<'_> {
            let name = match self.func_num {
                0 => "test_func".to_string(),
                n => format!("test_func{n}"),
            };
            self.func_num += 1;

            let sig = Signature::new(&name, args, ret_ty);
            let func_ref = self
                .module_builder
                .declare_function(sig)
                .expect("test function names are unique");
            self.module_builder.func_builder(func_ref)
        }

        pub fn module_builder(&mut self) -> &mut ModuleBuilder {
            &mut self.module_builder
        }

        pub fn build(self) -> Module {
            self.module_builder.build()
        }
    }

    pub fn dump_func(module: &Module, func_ref: FuncRef) -> String {
        let mut writer = FuncWriter::new(module, func_ref);
        writer.dump_string().unwrap()
    }

    impl Default for TestModuleBuilder {
        fn default() -> Self {
            Self {
                module_builder: ModuleBuilder::new("test_module")
                    .expect("`test_module` is a valid name"),
                func_num: 0,
            }
        }
    }
}
