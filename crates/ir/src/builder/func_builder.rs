use smallvec::SmallVec;
use smol_str::format_smolstr;

use super::{BuilderError, ModuleBuilder};
use crate::{
    dfg::is_valid_name,
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    insn::{BinaryOp, Callee, CmpOp, UnaryOp},
    module::{FuncRef, GlobalRef},
    Block, Function, Immediate, Insn, InsnData, Type, Value,
};

/// Builds the body of one function of the module owned by the
/// [`ModuleBuilder`]. The function is edited in place.
pub struct FunctionBuilder<'a> {
    module_builder: &'a mut ModuleBuilder,
    func_ref: FuncRef,
    cursor: InsnInserter,
}

macro_rules! impl_binary_emitters {
    ($(($name:ident, $code:path),)*) => {
        $(
            #[track_caller]
            pub fn $name(&mut self, lhs: Value, rhs: Value) -> Value {
                self.binary($code, lhs, rhs)
            }
        )*
    };
}

impl<'a> FunctionBuilder<'a> {
    pub(super) fn new(module_builder: &'a mut ModuleBuilder, func_ref: FuncRef) -> Self {
        Self {
            module_builder,
            func_ref,
            cursor: InsnInserter::at_location(CursorLocation::NoWhere),
        }
    }

    pub fn func_ref(&self) -> FuncRef {
        self.func_ref
    }

    pub fn func(&self) -> &Function {
        &self.module_builder.module().funcs[self.func_ref]
    }

    fn func_mut(&mut self) -> &mut Function {
        &mut self.module_builder.module_mut().funcs[self.func_ref]
    }

    pub fn args(&self) -> &[Value] {
        &self.func().arg_values
    }

    pub fn type_of(&self, value: Value) -> &Type {
        self.func().dfg.value_ty(value)
    }

    /// Appends a new block to the layout. The first appended block is the
    /// entry block.
    pub fn append_block(&mut self) -> Block {
        let Self {
            module_builder,
            func_ref,
            cursor,
        } = self;
        let func = &mut module_builder.module_mut().funcs[*func_ref];
        let block = cursor.make_block(func);
        cursor.append_block(func, block);
        block
    }

    pub fn append_block_labeled(&mut self, label: &str) -> Result<Block, BuilderError> {
        if !is_valid_name(label) {
            return Err(BuilderError::InvalidName(label.into()));
        }

        let func = self.func_mut();
        if func.dfg.is_label_used(label) {
            return Err(BuilderError::NameTaken(label.into()));
        }
        let block = func.dfg.make_block(Some(label));
        func.layout.append_block(block);
        Ok(block)
    }

    /// Makes `block` the entry block by moving it to the front of the layout.
    pub fn set_entry_block(&mut self, block: Block) -> Result<(), BuilderError> {
        let func = self.func_mut();
        if !func.layout.is_block_inserted(block) {
            return Err(BuilderError::UnknownBlock(block));
        }
        func.layout.move_block_to_front(block);
        Ok(())
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.cursor.set_location(CursorLocation::BlockBottom(block));
    }

    pub fn current_block(&self) -> Option<Block> {
        self.cursor.block(self.func())
    }

    pub fn name_value(&mut self, value: Value, name: &str) -> Result<(), BuilderError> {
        if !self.func().dfg.has_value(value) {
            return Err(BuilderError::UnknownValue(value));
        }
        if !is_valid_name(name) {
            return Err(BuilderError::InvalidName(name.into()));
        }

        if self.func_mut().dfg.rename_value(value, name) {
            Ok(())
        } else {
            Err(BuilderError::NameTaken(name.into()))
        }
    }

    /// Inserts `data` at the end of the current block, or after the leading
    /// phis of the block if `data` is a phi. Returns the result value if the
    /// instruction produces one.
    pub fn insert_insn(&mut self, data: InsnData) -> Result<Option<Value>, BuilderError> {
        let block = self.current_block().ok_or(BuilderError::NoInsertionBlock)?;
        self.check_insn(block, &data)?;

        let Self {
            module_builder,
            func_ref,
            cursor,
        } = self;
        let func = &mut module_builder.module_mut().funcs[*func_ref];

        let is_phi = data.is_phi();
        let ty = data.result_type(&func.dfg);
        let insn = func.dfg.make_insn(data);
        if is_phi {
            insert_phi(func, block, insn);
        } else {
            cursor.append_insn(func, insn);
        }

        Ok(ty.map(|ty| func.dfg.make_result(insn, ty, None)))
    }

    fn check_insn(&self, block: Block, data: &InsnData) -> Result<(), BuilderError> {
        let func = self.func();
        if !func.layout.is_block_inserted(block) {
            return Err(BuilderError::UnknownBlock(block));
        }

        if !data.is_phi() {
            if let Some(last) = func.layout.last_insn_of(block) {
                if func.dfg.is_terminator(last) {
                    return Err(BuilderError::EmitAfterTerminator {
                        block: func.dfg.block_label(block).into(),
                    });
                }
            }
        }

        if let Some(&value) = data.args().iter().find(|v| !func.dfg.has_value(**v)) {
            return Err(BuilderError::UnknownValue(value));
        }

        let mut blocks = data.dests().iter().copied().chain(data.phi_args().map(|(_, b)| b));
        if let Some(block) = blocks.find(|b| !func.dfg.has_block(*b)) {
            return Err(BuilderError::UnknownBlock(block));
        }

        let module = self.module_builder.module();
        match data {
            InsnData::Call { callee, .. } if !module.has_callee(*callee) => {
                Err(BuilderError::UnknownCallee)
            }
            InsnData::GlobalAddr { gv } if !module.globals.is_valid(*gv) => {
                Err(BuilderError::UnknownGlobal(*gv))
            }
            _ => Ok(()),
        }
    }

    /// Same as [`Self::insert_insn`], but panics on misuse.
    #[track_caller]
    pub fn emit(&mut self, data: InsnData) -> Option<Value> {
        match self.insert_insn(data) {
            Ok(result) => result,
            Err(err) => panic!("{err}"),
        }
    }

    #[track_caller]
    fn emit_value(&mut self, data: InsnData) -> Value {
        match self.emit(data) {
            Some(value) => value,
            None => panic!("instruction produces no value"),
        }
    }

    #[track_caller]
    pub fn constant(&mut self, imm: impl Into<Immediate>) -> Value {
        self.emit_value(InsnData::constant(imm))
    }

    #[track_caller]
    pub fn undef(&mut self, ty: Type) -> Value {
        self.emit_value(InsnData::Undef { ty })
    }

    #[track_caller]
    pub fn unary(&mut self, code: UnaryOp, arg: Value) -> Value {
        self.emit_value(InsnData::unary(code, arg))
    }

    #[track_caller]
    pub fn neg(&mut self, arg: Value) -> Value {
        self.unary(UnaryOp::Neg, arg)
    }

    #[track_caller]
    pub fn not(&mut self, arg: Value) -> Value {
        self.unary(UnaryOp::Not, arg)
    }

    #[track_caller]
    pub fn binary(&mut self, code: BinaryOp, lhs: Value, rhs: Value) -> Value {
        self.emit_value(InsnData::binary(code, lhs, rhs))
    }

    impl_binary_emitters! {
        (add, BinaryOp::Add),
        (sub, BinaryOp::Sub),
        (mul, BinaryOp::Mul),
        (div, BinaryOp::Div),
        (rem, BinaryOp::Rem),
        (and, BinaryOp::And),
        (or, BinaryOp::Or),
        (xor, BinaryOp::Xor),
        (shl, BinaryOp::Shl),
        (shr, BinaryOp::Shr),
    }

    #[track_caller]
    pub fn cast(&mut self, arg: Value, ty: Type) -> Value {
        self.emit_value(InsnData::cast(arg, ty))
    }

    #[track_caller]
    pub fn load(&mut self, addr: Value, ty: Type) -> Value {
        self.emit_value(InsnData::load(addr, ty))
    }

    #[track_caller]
    pub fn store(&mut self, addr: Value, value: Value) {
        self.emit(InsnData::store(addr, value));
    }

    #[track_caller]
    pub fn alloc(&mut self, ty: Type) -> Value {
        self.emit_value(InsnData::Alloc { ty })
    }

    #[track_caller]
    pub fn global_addr(&mut self, gv: GlobalRef) -> Value {
        self.emit_value(InsnData::GlobalAddr { gv })
    }

    /// Emits a call. Returns `None` if the callee returns `void`.
    #[track_caller]
    pub fn call(&mut self, callee: Callee, args: &[Value]) -> Option<Value> {
        let module = self.module_builder.module();
        if !module.has_callee(callee) {
            panic!("{}", BuilderError::UnknownCallee);
        }
        let ret_ty = module.callee_sig(callee).ret_ty().clone();

        self.emit(InsnData::Call {
            callee,
            args: args.into(),
            ret_ty,
        })
    }

    #[track_caller]
    pub fn phi(&mut self, ty: Type, args: &[(Value, Block)]) -> Value {
        let (values, blocks): (SmallVec<_>, SmallVec<_>) = args.iter().copied().unzip();
        self.emit_value(InsnData::Phi { values, blocks, ty })
    }

    /// Adds an incoming `(value, block)` entry to the phi defining `phi`.
    pub fn append_phi_arg(
        &mut self,
        phi: Value,
        value: Value,
        block: Block,
    ) -> Result<(), BuilderError> {
        let dfg = &self.func().dfg;
        for v in [phi, value] {
            if !dfg.has_value(v) {
                return Err(BuilderError::UnknownValue(v));
            }
        }
        if !dfg.has_block(block) {
            return Err(BuilderError::UnknownBlock(block));
        }
        let insn = match dfg.value_insn(phi) {
            Some(insn) if dfg.is_phi(insn) => insn,
            _ => return Err(BuilderError::NotAPhi(phi)),
        };

        self.func_mut().dfg.append_phi_arg(insn, value, block);
        Ok(())
    }

    /// Splits the block holding `at`. `at` and every instruction after it
    /// move to a new block placed right after the old one, which now ends
    /// with a jump to it. Phis in the successors of the moved terminator
    /// name the new block as their predecessor. If the old block was the
    /// insertion block, the new block becomes the insertion block.
    pub fn split_block(&mut self, at: Insn) -> Result<Block, BuilderError> {
        if !self.func().layout.is_insn_inserted(at) {
            return Err(BuilderError::UnknownInsn(at));
        }
        if self.func().dfg.is_phi(at) {
            return Err(BuilderError::SplitAtPhi(at));
        }

        let from = self.func().layout.insn_block(at);
        let was_current = self.current_block() == Some(from);

        let func = self.func_mut();
        let label = format_smolstr!("{}_split", func.dfg.block_label(from));
        let to = func.dfg.make_block(Some(label.as_str()));
        func.layout.insert_block_after(to, from);

        let mut tail = Vec::new();
        let mut next = Some(at);
        while let Some(insn) = next {
            tail.push(insn);
            next = func.layout.next_insn_of(insn);
        }
        for &insn in &tail {
            func.layout.remove_insn(insn);
            func.layout.append_insn(insn, to);
        }

        let jump = func.dfg.make_insn(InsnData::jump(to));
        func.layout.append_insn(jump, from);

        if let Some(&term) = tail.last().filter(|&&insn| func.dfg.is_terminator(insn)) {
            let succs = func.dfg.insn_data(term).dests().to_vec();
            for succ in succs.into_iter().filter(|&b| func.layout.is_block_inserted(b)) {
                let phis: Vec<_> = func
                    .layout
                    .iter_insn(succ)
                    .take_while(|&insn| func.dfg.is_phi(insn))
                    .collect();
                for phi in phis {
                    func.dfg.rewrite_phi_block(phi, from, to);
                }
            }
        }

        tracing::trace!(
            from = func.dfg.block_label(from),
            to = func.dfg.block_label(to),
            moved = tail.len(),
            "split block"
        );
        if was_current {
            self.switch_to_block(to);
        }
        Ok(to)
    }

    #[track_caller]
    pub fn jump(&mut self, dest: Block) {
        self.emit(InsnData::jump(dest));
    }

    #[track_caller]
    pub fn br(&mut self, cond: CmpOp, lhs: Value, rhs: Value, then: Block, else_: Block) {
        self.emit(InsnData::branch(cond, lhs, rhs, then, else_));
    }

    #[track_caller]
    pub fn ret(&mut self, arg: Value) {
        self.emit(InsnData::ret(arg));
    }

    #[track_caller]
    pub fn exit(&mut self) {
        self.emit(InsnData::Exit);
    }
}

/// Places a phi after the phis already leading `block`.
fn insert_phi(func: &mut Function, block: Block, insn: Insn) {
    let last_phi = func
        .layout
        .iter_insn(block)
        .take_while(|insn| func.dfg.is_phi(*insn))
        .last();

    match last_phi {
        Some(after) => func.layout.insert_insn_after(insn, after),
        None => func.layout.prepend_insn(insn, block),
    }
}

#[cfg(test)]
mod tests {
    use super::{super::test_util::*, *};
    use crate::{module::GlobalData, Signature};

    #[test]
    fn entry_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::I8);

        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let v0 = builder.constant(1i8);
        let v1 = builder.constant(2i8);
        let v2 = builder.add(v0, v1);
        let v3 = builder.sub(v2, v0);
        builder.ret(v3);
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func() -> i8 {
    block0:
        v0.i8 = const 1;
        v1.i8 = const 2;
        v2.i8 = add v0 v1;
        v3.i8 = sub v2 v0;
        return v3;
}
"
        );
    }

    #[test]
    fn entry_block_with_args() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32, Type::I64], Type::I64);

        let entry_block = builder.append_block();
        builder.switch_to_block(entry_block);
        let args = builder.args().to_vec();
        assert_eq!(args.len(), 2);
        let v2 = builder.cast(args[0], Type::I64);
        let v3 = builder.mul(v2, args[1]);
        builder.name_value(v3, "prod").unwrap();
        builder.ret(v3);
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func(v0.i32, v1.i64) -> i64 {
    block0:
        v2.i64 = cast v0;
        prod.i64 = mul v2 v1;
        return prod;
}
"
        );
    }

    #[test]
    fn then_else_merge_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I64], Type::I64);

        let entry_block = builder.append_block();
        let then_block = builder.append_block();
        let else_block = builder.append_block();
        let merge_block = builder.append_block_labeled("merge").unwrap();

        let arg0 = builder.args()[0];

        builder.switch_to_block(entry_block);
        let zero = builder.constant(0i64);
        builder.br(CmpOp::Lt, arg0, zero, then_block, else_block);

        builder.switch_to_block(then_block);
        let v2 = builder.constant(1i64);
        builder.jump(merge_block);

        builder.switch_to_block(else_block);
        let v3 = builder.constant(2i64);
        builder.jump(merge_block);

        builder.switch_to_block(merge_block);
        let v4 = builder.phi(Type::I64, &[(v2, then_block), (v3, else_block)]);
        let v5 = builder.add(v4, arg0);
        builder.ret(v5);
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func(v0.i64) -> i64 {
    block0:
        v1.i64 = const 0;
        br lt v0 v1 block1 block2;

    block1:
        v2.i64 = const 1;
        jump merge;

    block2:
        v3.i64 = const 2;
        jump merge;

    merge:
        v4.i64 = phi (v2 block1) (v3 block2);
        v5.i64 = add v4 v0;
        return v5;
}
"
        );
    }

    #[test]
    fn phi_goes_to_block_top() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);

        let entry = builder.append_block();
        let header = builder.append_block();
        let arg0 = builder.args()[0];

        builder.switch_to_block(entry);
        builder.jump(header);

        builder.switch_to_block(header);
        let one = builder.constant(1i32);
        builder.ret(one);
        // A phi can still be added to a terminated block.
        let phi = builder.phi(Type::I32, &[(arg0, entry)]);
        builder.append_phi_arg(phi, one, header).unwrap();
        assert_eq!(
            builder.append_phi_arg(one, one, header),
            Err(BuilderError::NotAPhi(one))
        );
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func(v0.i32) -> i32 {
    block0:
        jump block1;

    block1:
        v2.i32 = phi (v0 block0) (v1 block1);
        v1.i32 = const 1;
        return v1;
}
"
        );
    }

    #[test]
    fn misuse_is_reported() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let arg0 = builder.args()[0];

        assert_eq!(
            builder.insert_insn(InsnData::ret(arg0)),
            Err(BuilderError::NoInsertionBlock)
        );

        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        builder.ret(arg0);
        assert_eq!(
            builder.insert_insn(InsnData::ret(arg0)),
            Err(BuilderError::EmitAfterTerminator {
                block: "block0".into()
            })
        );

        let b1 = builder.append_block();
        builder.switch_to_block(b1);
        assert_eq!(
            builder.insert_insn(InsnData::ret(Value(42))),
            Err(BuilderError::UnknownValue(Value(42)))
        );
        assert_eq!(
            builder.insert_insn(InsnData::jump(Block(42))),
            Err(BuilderError::UnknownBlock(Block(42)))
        );

        assert_eq!(
            builder.name_value(arg0, "1x"),
            Err(BuilderError::InvalidName("1x".into()))
        );
        assert_eq!(
            builder.append_block_labeled("block0"),
            Err(BuilderError::NameTaken("block0".into()))
        );
    }

    #[test]
    fn split_block_moves_tail_and_rewrites_phis() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);

        let entry = builder.append_block();
        let body = builder.append_block_labeled("body").unwrap();
        let done = builder.append_block_labeled("done").unwrap();
        let n = builder.args()[0];

        builder.switch_to_block(entry);
        let zero = builder.constant(0i32);
        builder.jump(body);

        builder.switch_to_block(body);
        let i = builder.phi(Type::I32, &[(zero, entry)]);
        let one = builder.constant(1i32);
        let next = builder.add(i, one);
        builder.append_phi_arg(i, next, body).unwrap();
        builder.br(CmpOp::Lt, next, n, body, done);

        builder.switch_to_block(done);
        builder.ret(next);

        let phi = builder.func().dfg.value_insn(i).unwrap();
        assert_eq!(builder.split_block(phi), Err(BuilderError::SplitAtPhi(phi)));

        let at = builder.func().dfg.value_insn(next).unwrap();
        let tail = builder.split_block(at).unwrap();
        assert_eq!(builder.func().dfg.block_label(tail), "body_split");
        assert_eq!(builder.current_block(), Some(done));
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func(v0.i32) -> i32 {
    block0:
        v1.i32 = const 0;
        jump body;

    body:
        v2.i32 = phi (v1 block0) (v4 body_split);
        v3.i32 = const 1;
        jump body_split;

    body_split:
        v4.i32 = add v2 v3;
        br lt v4 v0 body done;

    done:
        return v4;
}
"
        );
    }

    #[test]
    fn split_insertion_block_keeps_building_in_tail() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::I8);

        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let v0 = builder.constant(1i8);
        let v1 = builder.add(v0, v0);

        let at = builder.func().dfg.value_insn(v1).unwrap();
        let tail = builder.split_block(at).unwrap();
        assert_eq!(builder.current_block(), Some(tail));
        builder.ret(v1);
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func() -> i8 {
    block0:
        v0.i8 = const 1;
        jump block0_split;

    block0_split:
        v1.i8 = add v0 v0;
        return v1;
}
"
        );
    }

    #[test]
    fn module_level_names_must_be_identifiers() {
        assert_eq!(
            ModuleBuilder::new("my module").err(),
            Some(BuilderError::InvalidName("my module".into()))
        );

        let mut mb = TestModuleBuilder::new();
        let module_builder = mb.module_builder();
        assert_eq!(
            module_builder.make_global(GlobalData::new("g-1", Type::I32, None)),
            Err(BuilderError::InvalidName("g-1".into()))
        );
        assert_eq!(
            module_builder.declare_function(Signature::new("my-func", &[], Type::Void)),
            Err(BuilderError::InvalidName("my-func".into()))
        );
        assert_eq!(
            module_builder.declare_external(Signature::new("", &[], Type::Void)),
            Err(BuilderError::InvalidName("".into()))
        );
        assert!(module_builder.module().iter_functions().next().is_none());
    }

    #[test]
    #[should_panic(expected = "already ends with a terminator")]
    fn emit_after_terminator_panics() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::Void);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        builder.exit();
        builder.exit();
    }

    #[test]
    fn set_entry_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[], Type::Void);
        let b0 = builder.append_block();
        let b1 = builder.append_block();

        builder.switch_to_block(b0);
        builder.exit();
        builder.switch_to_block(b1);
        builder.jump(b0);
        builder.set_entry_block(b1).unwrap();

        assert_eq!(builder.func().entry_block(), Some(b1));
    }

    #[test]
    fn calls_and_globals() {
        let mut mb = TestModuleBuilder::new();
        let module_builder = mb.module_builder();
        let ext = module_builder
            .declare_external(Signature::new("print", &[Type::I32], Type::Void))
            .unwrap();
        let gv = module_builder
            .make_global(GlobalData::new("counter", Type::I32, None))
            .unwrap();
        assert!(module_builder
            .make_global(GlobalData::new("counter", Type::I32, None))
            .is_err());

        let mut builder = mb.func_builder(&[], Type::Void);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let addr = builder.global_addr(gv);
        let v1 = builder.load(addr, Type::I32);
        assert_eq!(builder.call(Callee::Extern(ext), &[v1]), None);
        builder.exit();
        let func_ref = builder.func_ref();

        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func() -> void {
    block0:
        v0.ptr = gaddr @counter;
        v1.i32 = load v0;
        call %print v1;
        exit;
}
"
        );
    }
}
