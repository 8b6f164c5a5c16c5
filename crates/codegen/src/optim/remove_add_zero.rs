//! Algebraic identities on integers: `x + 0`, `x * 1`, `x - x` and friends.

use quill_ir::{
    func_cursor::{CursorLocation, FuncCursor, InsnInserter},
    BinaryOp, DataFlowGraph, Function, Immediate, Insn, InsnData, Value,
};
use tracing::trace;

use super::pass::InstructionPass;

#[derive(Debug, Default)]
pub struct RemoveAddZeroPass;

impl RemoveAddZeroPass {
    pub fn new() -> Self {
        Self
    }
}

enum Simplified {
    Value(Value),
    Zero,
}

impl InstructionPass for RemoveAddZeroPass {
    fn name(&self) -> &'static str {
        "remove-add-zero"
    }

    fn run_on_insn(&mut self, func: &mut Function, insn: Insn) -> bool {
        let Some(simplified) = simplify(&func.dfg, insn) else {
            return false;
        };
        let Some(result) = func.dfg.insn_result(insn) else {
            return false;
        };

        let replacement = match simplified {
            Simplified::Value(value) => value,
            Simplified::Zero => {
                let Some(imm) = Immediate::zero(func.dfg.value_ty(result)) else {
                    return false;
                };
                let mut cursor = InsnInserter::at_location(CursorLocation::At(insn));
                match cursor.insert_before_with_result(func, InsnData::Const { imm }) {
                    (_, Some(zero)) => zero,
                    (_, None) => unreachable!("constants always have a result"),
                }
            }
        };

        trace!(func = func.name(), %insn, %replacement, "simplified");
        func.dfg.replace_uses(result, replacement);
        func.remove_insn(insn);
        true
    }
}

fn simplify(dfg: &DataFlowGraph, insn: Insn) -> Option<Simplified> {
    let InsnData::Binary { code, args: [lhs, rhs] } = *dfg.insn_data(insn) else {
        return None;
    };
    // Float zeros are signed, so `x + 0.0` is not `x`.
    if !dfg.value_ty(lhs).is_integral() {
        return None;
    }

    let is_zero = |value| dfg.value_imm(value).is_some_and(Immediate::is_zero);
    let is_one = |value| dfg.value_imm(value).is_some_and(Immediate::is_one);

    let simplified = match code {
        BinaryOp::Add if is_zero(rhs) => Simplified::Value(lhs),
        BinaryOp::Add if is_zero(lhs) => Simplified::Value(rhs),
        BinaryOp::Sub if is_zero(rhs) => Simplified::Value(lhs),
        BinaryOp::Sub if lhs == rhs => Simplified::Zero,
        BinaryOp::Mul if is_one(rhs) => Simplified::Value(lhs),
        BinaryOp::Mul if is_one(lhs) => Simplified::Value(rhs),
        BinaryOp::Div if is_one(rhs) => Simplified::Value(lhs),
        BinaryOp::Or | BinaryOp::Shl | BinaryOp::Shr if is_zero(rhs) => Simplified::Value(lhs),
        BinaryOp::Xor if is_zero(rhs) => Simplified::Value(lhs),
        BinaryOp::Xor if lhs == rhs => Simplified::Zero,
        _ => return None,
    };
    Some(simplified)
}

#[cfg(test)]
mod tests {
    use quill_ir::{builder::test_util::*, Type};

    use super::*;
    use crate::optim::pass::{FunctionPass, PerBlock, PerInsn};

    fn run(module: &mut quill_ir::Module, func_ref: quill_ir::FuncRef) -> bool {
        PerBlock(PerInsn(RemoveAddZeroPass::new())).run_on_function(&mut module.funcs[func_ref])
    }

    #[test]
    fn identities_collapse() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let x = builder.args()[0];
        builder.switch_to_block(entry);
        let zero = builder.constant(0i32);
        let one = builder.constant(1i32);
        let a = builder.add(zero, x);
        let b = builder.mul(a, one);
        let c = builder.shl(b, zero);
        let d = builder.div(c, one);
        builder.ret(d);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(run(&mut module, func_ref));
        let func = &module.funcs[func_ref];
        let ret = func.layout.last_insn_of(entry).unwrap();
        assert_eq!(func.dfg.insn_data(ret).args(), &[x]);
    }

    #[test]
    fn self_difference_is_zero() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::U16], Type::U16);
        let entry = builder.append_block();
        let x = builder.args()[0];
        builder.switch_to_block(entry);
        let diff = builder.xor(x, x);
        builder.ret(diff);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(run(&mut module, func_ref));
        assert_eq!(
            dump_func(&module, func_ref),
            "func %test_func(v0.u16) -> u16 {
    block0:
        v2.u16 = const 0;
        return v2;
}
"
        );
    }

    #[test]
    fn floats_are_untouched() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::F64], Type::F64);
        let entry = builder.append_block();
        let x = builder.args()[0];
        builder.switch_to_block(entry);
        let zero = builder.constant(0.0f64);
        let a = builder.add(x, zero);
        let b = builder.sub(a, a);
        builder.ret(b);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!run(&mut module, func_ref));
    }

    #[test]
    fn zero_minus_x_stays() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I32], Type::I32);
        let entry = builder.append_block();
        let x = builder.args()[0];
        builder.switch_to_block(entry);
        let zero = builder.constant(0i32);
        let a = builder.sub(zero, x);
        builder.ret(a);
        let func_ref = builder.func_ref();
        let mut module = mb.build();

        assert!(!run(&mut module, func_ref));
    }
}
