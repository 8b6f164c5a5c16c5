use std::hash::BuildHasherDefault;

use quill_ir::{
    insn::Callee, module::GlobalRef, BinaryOp, Block, CmpOp, Function, GlobalData, Immediate,
    Insn, InsnData, Module, Signature, Type, UnaryOp, Value,
};
use rustc_hash::{FxHashMap, FxHasher};
use smol_str::SmolStr;
use tracing::debug;

pub mod ast;
mod error;
mod json;
pub mod syntax;
pub use error::{Error, UndefinedKind};
pub use json::{from_json, to_json};
pub use syntax::Span;

use ast::{Expr, Name, TypeName};

type Bimap<K, V> = bimap::BiHashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Reads a module from its text form.
///
/// The result is not verified: bodies may reference values that are defined
/// later, use operands of the wrong type, or lack terminators.
pub fn parse_module(input: &str) -> Result<Module, Vec<Error>> {
    let ast = ast::parse(input)?;
    build_module(&ast)
}

pub(crate) fn build_module(ast: &ast::Module) -> Result<Module, Vec<Error>> {
    let mut ctx = BuildCtx::default();
    // The grammar only admits identifiers; JSON documents may carry anything.
    ctx.check_name(&ast.name);
    let mut module = Module::new(ast.name.as_str());

    for gv in &ast.globals {
        ctx.declare_global(&mut module, gv);
    }
    for decl in &ast.declarations {
        ctx.declare_external(&mut module, decl);
    }

    let mut bodies = Vec::with_capacity(ast.functions.len());
    for func in &ast.functions {
        if let Some(func_ref) = ctx.declare_function(&mut module, func) {
            bodies.push((func_ref, func));
        }
    }

    for (func_ref, func) in bodies {
        ctx.build_func(&mut module.funcs[func_ref], func);
    }

    if ctx.errors.is_empty() {
        debug!(
            module = %module.name,
            funcs = module.funcs.len(),
            "module read"
        );
        Ok(module)
    } else {
        Err(ctx.errors)
    }
}

#[derive(Default)]
struct BuildCtx {
    errors: Vec<Error>,

    /// Module-wide names, in declaration order.
    callees: FxHashMap<SmolStr, (Callee, Type)>,
    globals: FxHashMap<SmolStr, GlobalRef>,

    /// Per-function names.
    blocks: FxHashMap<SmolStr, Block>,
    func_value_names: Bimap<Value, SmolStr>,
}

impl BuildCtx {
    fn declare_global(&mut self, module: &mut Module, gv: &ast::Global) {
        if !self.check_name(&gv.name) {
            return;
        }
        let Some(ty) = self.type_(&gv.ty) else {
            return;
        };
        let init = match &gv.init {
            Some(bytes) => match hex::decode(bytes.as_str()) {
                Ok(bytes) => Some(bytes),
                Err(_) => {
                    self.errors.push(Error::InvalidHex(bytes.span));
                    return;
                }
            },
            None => None,
        };

        if self.globals.contains_key(&gv.name.text) {
            self.errors.push(Error::DuplicatedDeclaration(
                format!("@{}", gv.name.text).into(),
                gv.name.span,
            ));
            return;
        }
        let global = module.add_global(GlobalData::new(gv.name.as_str(), ty, init));
        self.globals.insert(gv.name.text.clone(), global);
    }

    fn declare_external(&mut self, module: &mut Module, decl: &ast::Declaration) {
        let Some(sig) = self.signature(&decl.name, decl.params.iter(), &decl.ret_ty) else {
            return;
        };
        if self.check_free_callee(&decl.name) {
            let ret_ty = sig.ret_ty().clone();
            let ext = module.add_external(sig);
            self.callees
                .insert(decl.name.text.clone(), (Callee::Extern(ext), ret_ty));
        }
    }

    fn declare_function(
        &mut self,
        module: &mut Module,
        func: &ast::Func,
    ) -> Option<quill_ir::FuncRef> {
        let sig = self.signature(
            &func.name,
            func.params.iter().map(|param| &param.ty),
            &func.ret_ty,
        )?;
        if !self.check_free_callee(&func.name) {
            return None;
        }

        let names: Vec<&str> = func.params.iter().map(|p| p.name.as_str()).collect();
        let ret_ty = sig.ret_ty().clone();
        let func_ref = module.add_function(Function::with_param_names(sig, &names));
        self.callees
            .insert(func.name.text.clone(), (Callee::Func(func_ref), ret_ty));
        Some(func_ref)
    }

    fn check_free_callee(&mut self, name: &Name) -> bool {
        if !self.check_name(name) {
            false
        } else if self.callees.contains_key(&name.text) {
            self.errors.push(Error::DuplicatedDeclaration(
                format!("%{}", name.text).into(),
                name.span,
            ));
            false
        } else {
            true
        }
    }

    fn signature<'a>(
        &mut self,
        name: &Name,
        params: impl Iterator<Item = &'a TypeName>,
        ret_ty: &TypeName,
    ) -> Option<Signature> {
        let params: Option<Vec<_>> = params.map(|ty| self.type_(ty)).collect();
        let ret_ty = self.type_(ret_ty)?;
        Some(Signature::new(name.as_str(), &params?, ret_ty))
    }

    fn build_func(&mut self, func: &mut Function, ast_func: &ast::Func) {
        self.blocks.clear();
        self.func_value_names.clear();

        for (i, param) in ast_func.params.iter().enumerate() {
            if self.check_name(&param.name) {
                self.name_value(func.arg_values[i], &param.name);
            }
        }

        let mut layout_blocks = Vec::with_capacity(ast_func.blocks.len());
        for block in &ast_func.blocks {
            let label = &block.label;
            if !self.check_name(label) {
                layout_blocks.push(None);
                continue;
            }
            if self.blocks.contains_key(&label.text) {
                self.errors
                    .push(Error::DuplicateBlockLabel(label.text.clone(), label.span));
                layout_blocks.push(None);
                continue;
            }
            let b = func.dfg.make_block(Some(label.as_str()));
            func.layout.append_block(b);
            self.blocks.insert(label.text.clone(), b);
            layout_blocks.push(Some(b));
        }

        // Results are declared up front so that operands may refer to values
        // defined further down, e.g. by phis on a back edge.
        let placeholders: Vec<_> = ast_func
            .blocks
            .iter()
            .flat_map(|b| b.stmts.iter())
            .map(|stmt| self.declare_result(func, stmt))
            .collect();

        let mut placeholders = placeholders.into_iter();
        for (block, b) in ast_func.blocks.iter().zip(layout_blocks) {
            for stmt in &block.stmts {
                let placeholder = placeholders.next().flatten();
                let Some(b) = b else {
                    continue;
                };
                if let Some(insn) = self.build_stmt(func, stmt, placeholder) {
                    func.layout.append_insn(insn, b);
                }
            }
        }
    }

    /// Makes the result value of `stmt`, defined by a placeholder `undef`
    /// until the statement itself is built.
    fn declare_result(&mut self, func: &mut Function, stmt: &ast::Stmt) -> Option<(Value, Insn)> {
        let decl = stmt.result.as_ref()?;
        let ty = self.type_(&decl.ty)?;
        if !self.check_name(&decl.name) {
            return None;
        }
        if self.func_value_names.contains_right(&decl.name.text) {
            self.errors.push(Error::DuplicateValueName(
                decl.name.text.clone(),
                decl.name.span,
            ));
            return None;
        }

        let insn = func.dfg.make_insn(InsnData::Undef { ty: ty.clone() });
        let value = func.dfg.make_result(insn, ty, Some(decl.name.as_str()));
        self.name_value(value, &decl.name);
        Some((value, insn))
    }

    fn build_stmt(
        &mut self,
        func: &mut Function,
        stmt: &ast::Stmt,
        placeholder: Option<(Value, Insn)>,
    ) -> Option<Insn> {
        let needs_result = match &stmt.expr {
            Expr::Store { .. }
            | Expr::Jump { .. }
            | Expr::Branch { .. }
            | Expr::Return { .. }
            | Expr::Exit => false,
            Expr::Call { callee, .. } => !self.callee(callee)?.1.is_void(),
            _ => true,
        };

        let result = match (&stmt.result, needs_result) {
            // A result that failed to declare was already reported.
            (Some(_), true) => {
                let (value, insn) = placeholder?;
                Some((insn, func.dfg.value_ty(value).clone()))
            }
            (None, false) => None,
            (None, true) => {
                self.errors.push(Error::MissingResult {
                    opcode: stmt.expr.opcode().into(),
                    span: stmt.span,
                });
                return None;
            }
            (Some(decl), false) => {
                self.errors.push(Error::UnexpectedResult {
                    opcode: stmt.expr.opcode().into(),
                    span: decl.name.span,
                });
                return None;
            }
        };
        let result_ty = result.as_ref().map_or(Type::Void, |(_, ty)| ty.clone());

        let data = match &stmt.expr {
            Expr::Const { literal } => match Immediate::parse_literal(literal.as_str(), &result_ty)
            {
                Some(imm) => InsnData::constant(imm),
                None => {
                    self.errors.push(Error::InvalidLiteral {
                        literal: literal.text.clone(),
                        ty: result_ty.to_string().into(),
                        span: literal.span,
                    });
                    return None;
                }
            },
            Expr::Undef => InsnData::Undef { ty: result_ty },
            Expr::Unary { code, arg } => {
                let code = self.opcode(code, UnaryOp::from_name);
                let arg = self.value(arg);
                InsnData::unary(code?, arg?)
            }
            Expr::Binary { code, lhs, rhs } => {
                let code = self.opcode(code, BinaryOp::from_name);
                let lhs = self.value(lhs);
                let rhs = self.value(rhs);
                InsnData::binary(code?, lhs?, rhs?)
            }
            Expr::Cast { arg } => InsnData::cast(self.value(arg)?, result_ty),
            Expr::Load { addr } => InsnData::load(self.value(addr)?, result_ty),
            Expr::Store { addr, value } => {
                let addr = self.value(addr);
                let value = self.value(value);
                InsnData::store(addr?, value?)
            }
            Expr::Alloc { ty } => InsnData::Alloc {
                ty: self.type_(ty)?,
            },
            Expr::GlobalAddr { global } => match self.globals.get(&global.text) {
                Some(&gv) => InsnData::GlobalAddr { gv },
                None => {
                    self.errors.push(Error::Undefined(
                        UndefinedKind::Global(global.text.clone()),
                        global.span,
                    ));
                    return None;
                }
            },
            Expr::Call { callee, args } => {
                let (callee, ret_ty) = self.callee(callee)?;
                let args: Vec<_> = args.iter().map(|arg| self.value(arg)).collect();
                InsnData::Call {
                    callee,
                    args: args.into_iter().collect::<Option<_>>()?,
                    ret_ty,
                }
            }
            Expr::Phi { args } => {
                let mut data = InsnData::phi(result_ty);
                let mut ok = true;
                for ast::PhiArg(value, block) in args {
                    match (self.value(value), self.block(block)) {
                        (Some(value), Some(block)) => data.append_phi_arg(value, block),
                        _ => ok = false,
                    }
                }
                if !ok {
                    return None;
                }
                data
            }
            Expr::Jump { dest } => InsnData::jump(self.block(dest)?),
            Expr::Branch {
                cond,
                lhs,
                rhs,
                then,
                else_,
            } => {
                let cond = self.opcode(cond, CmpOp::from_name);
                let lhs = self.value(lhs);
                let rhs = self.value(rhs);
                let then = self.block(then);
                let else_ = self.block(else_);
                InsnData::branch(cond?, lhs?, rhs?, then?, else_?)
            }
            Expr::Return { arg } => InsnData::ret(self.value(arg)?),
            Expr::Exit => InsnData::Exit,
        };

        match result {
            Some((insn, _)) => {
                func.dfg.replace_insn(insn, data);
                Some(insn)
            }
            None => Some(func.dfg.make_insn(data)),
        }
    }

    fn check_name(&mut self, name: &Name) -> bool {
        let valid = quill_ir::dfg::is_valid_name(name.as_str());
        if !valid {
            self.errors
                .push(Error::InvalidName(name.text.clone(), name.span));
        }
        valid
    }

    fn name_value(&mut self, value: Value, name: &Name) {
        if self
            .func_value_names
            .insert_no_overwrite(value, name.text.clone())
            .is_err()
        {
            self.errors
                .push(Error::DuplicateValueName(name.text.clone(), name.span));
        }
    }

    fn value(&mut self, name: &Name) -> Option<Value> {
        let value = self.func_value_names.get_by_right(&name.text).copied();
        if value.is_none() {
            self.errors.push(Error::Undefined(
                UndefinedKind::Value(name.text.clone()),
                name.span,
            ));
        }
        value
    }

    fn block(&mut self, label: &Name) -> Option<Block> {
        let block = self.blocks.get(&label.text).copied();
        if block.is_none() {
            self.errors.push(Error::Undefined(
                UndefinedKind::Block(label.text.clone()),
                label.span,
            ));
        }
        block
    }

    fn callee(&mut self, name: &Name) -> Option<(Callee, Type)> {
        let callee = self.callees.get(&name.text).cloned();
        if callee.is_none() {
            self.errors.push(Error::Undefined(
                UndefinedKind::Func(name.text.clone()),
                name.span,
            ));
        }
        callee
    }

    fn opcode<T>(&mut self, name: &Name, from_name: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let code = from_name(name.as_str());
        if code.is_none() {
            self.errors
                .push(Error::UnknownOpcode(name.text.clone(), name.span));
        }
        code
    }

    fn type_(&mut self, ty: &TypeName) -> Option<Type> {
        match ty {
            TypeName::Scalar(name) => {
                let ty = Type::from_scalar_name(name.as_str());
                if ty.is_none() {
                    self.errors
                        .push(Error::UnknownType(name.text.clone(), name.span));
                }
                ty
            }
            TypeName::Array(elem, len) => Some(Type::make_array(self.type_(elem)?, *len)),
        }
    }
}

#[cfg(test)]
mod tests {
    use quill_ir::ir_writer::ModuleWriter;

    use super::*;

    fn write(module: &Module) -> String {
        ModuleWriter::new(module).dump_string().unwrap()
    }

    #[test]
    fn forward_references() {
        let src = "module loops;

func %count(n.i32) -> i32 {
    entry:
        zero.i32 = const 0;
        jump header;

    header:
        i.i32 = phi (zero entry) (next body);
        br lt i n body done;

    body:
        one.i32 = const 1;
        next.i32 = add i one;
        jump header;

    done:
        return i;
}
";
        let module = parse_module(src).unwrap();
        assert_eq!(write(&module), src);

        let func = &module.funcs[module.iter_functions().next().unwrap()];
        let phi = func.insns().find(|&insn| func.dfg.is_phi(insn)).unwrap();
        let users: Vec<_> = func
            .dfg
            .insn_data(phi)
            .phi_args()
            .map(|(value, _)| func.dfg.users_num(value))
            .collect();
        assert_eq!(users, vec![1, 1]);
    }

    #[test]
    fn globals_and_calls() {
        let src = "module io;

gv @seed: i32 = 0x2a000000;
gv @buf: [u8; 16];
declare %print(i32) -> void;

func %main() -> void {
    entry:
        p.ptr = gaddr @seed;
        s.i32 = load p;
        call %print s;
        r.i32 = call %twice s;
        exit;
}

func %twice(x.i32) -> i32 {
    b0:
        y.i32 = add x x;
        return y;
}
";
        let module = parse_module(src).unwrap();
        assert_eq!(write(&module), src);
        let seed = module.lookup_global("seed").unwrap();
        assert_eq!(module.globals[seed].init, Some(vec![0x2a, 0, 0, 0]));
    }

    #[test]
    fn malformed_bodies_are_accepted() {
        // No terminator, and an operand of the wrong type.
        let src = "module m;

func %f(x.i64) -> i32 {
    b0:
        c.i32 = const 1;
        y.i32 = add x c;
}
";
        let module = parse_module(src).unwrap();
        assert_eq!(write(&module), src);
    }

    #[test]
    fn errors_are_collected() {
        let src = "module m;

func %f(x.i32) -> i32 {
    b0:
        y.i32 = add x z;
        x.i32 = const 300000000000;
        store x x;
        w.i8 = const 300;
        jump nowhere;
}
";
        let errs = parse_module(src).unwrap_err();
        assert_eq!(errs.len(), 4, "{errs:?}");

        let at = src.find("x.i32 = const").unwrap() as u32;
        assert_eq!(errs[0], Error::DuplicateValueName("x".into(), Span(at, at + 1)));
        assert!(matches!(
            &errs[1],
            Error::Undefined(UndefinedKind::Value(name), _) if name == "z"
        ));
        assert!(matches!(&errs[2], Error::InvalidLiteral { literal, .. } if literal == "300"));
        assert_eq!(errs[3].to_string(), "undefined block: `nowhere`");
    }

    #[test]
    fn result_arity() {
        let src = "module m;
declare %log(i32) -> void;
func %f(x.i32) -> void {
    b0:
        r.i32 = call %log x;
        add x x;
        exit;
}
";
        let errs = parse_module(src).unwrap_err();
        assert_eq!(errs.len(), 2, "{errs:?}");
        assert!(matches!(&errs[0], Error::UnexpectedResult { opcode, .. } if opcode == "call"));
        assert!(matches!(&errs[1], Error::MissingResult { opcode, .. } if opcode == "add"));
    }

    #[test]
    fn duplicate_declarations() {
        let src = "module m;
declare %f() -> void;
gv @g: i8;
gv @g: i8;
func %f() -> void {
    b0:
        exit;
}
";
        let errs = parse_module(src).unwrap_err();
        let msgs: Vec<_> = errs.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            msgs,
            vec!["`@g` is already declared", "`%f` is already declared"]
        );
    }
}
