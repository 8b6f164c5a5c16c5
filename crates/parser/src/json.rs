//! Structured JSON form of a module.
//!
//! The document is the serialized [`ast::Module`], so a JSON module carries
//! exactly what the text form does and is read back by the same builder.

use quill_ir::{Function, InsnData, Module, Type, Value};

use crate::{
    ast::{self, Expr, Name, PhiArg, TypeName, ValueDecl},
    build_module, Error,
};

pub fn to_json(module: &Module) -> String {
    let doc = lower_module(module);
    match serde_json::to_string_pretty(&doc) {
        Ok(json) => json,
        Err(err) => unreachable!("document model always serializes: {err}"),
    }
}

pub fn from_json(input: &str) -> Result<Module, Vec<Error>> {
    let doc: ast::Module = serde_json::from_str(input).map_err(|err| vec![err.into()])?;
    build_module(&doc)
}

fn lower_module(module: &Module) -> ast::Module {
    let globals = module
        .globals
        .values()
        .map(|gv| ast::Global {
            name: Name::new(gv.name.clone()),
            ty: type_name(&gv.ty),
            init: gv.init.as_ref().map(|bytes| Name::new(hex::encode(bytes))),
        })
        .collect();

    let declarations = module
        .externals
        .values()
        .map(|sig| ast::Declaration {
            name: Name::new(sig.name()),
            params: sig.params().iter().map(type_name).collect(),
            ret_ty: type_name(sig.ret_ty()),
        })
        .collect();

    let functions = module
        .funcs
        .values()
        .map(|func| lower_func(module, func))
        .collect();

    ast::Module {
        name: Name::new(module.name.clone()),
        globals,
        declarations,
        functions,
    }
}

fn lower_func(module: &Module, func: &Function) -> ast::Func {
    let dfg = &func.dfg;
    let value = |v: Value| Name::new(dfg.value_name(v));
    let block = |b| Name::new(dfg.block_label(b));

    let blocks = func
        .layout
        .iter_block()
        .map(|b| {
            let stmts = func
                .layout
                .iter_insn(b)
                .map(|insn| {
                    let expr = match dfg.insn_data(insn) {
                        InsnData::Const { imm } => Expr::Const {
                            literal: Name::new(imm.to_string()),
                        },
                        InsnData::Undef { .. } => Expr::Undef,
                        InsnData::Unary { code, args } => Expr::Unary {
                            code: Name::new(code.as_str()),
                            arg: value(args[0]),
                        },
                        InsnData::Binary { code, args } => Expr::Binary {
                            code: Name::new(code.as_str()),
                            lhs: value(args[0]),
                            rhs: value(args[1]),
                        },
                        InsnData::Cast { args, .. } => Expr::Cast {
                            arg: value(args[0]),
                        },
                        InsnData::Load { args, .. } => Expr::Load {
                            addr: value(args[0]),
                        },
                        InsnData::Store { args } => Expr::Store {
                            addr: value(args[0]),
                            value: value(args[1]),
                        },
                        InsnData::Alloc { ty } => Expr::Alloc { ty: type_name(ty) },
                        InsnData::GlobalAddr { gv } => Expr::GlobalAddr {
                            global: Name::new(module.globals[*gv].name.clone()),
                        },
                        InsnData::Call { callee, args, .. } => Expr::Call {
                            callee: Name::new(module.callee_name(*callee)),
                            args: args.iter().map(|&arg| value(arg)).collect(),
                        },
                        data @ InsnData::Phi { .. } => Expr::Phi {
                            args: data
                                .phi_args()
                                .map(|(v, b)| PhiArg(value(v), block(b)))
                                .collect(),
                        },
                        InsnData::Jump { dests } => Expr::Jump {
                            dest: block(dests[0]),
                        },
                        InsnData::Branch { cond, args, dests } => Expr::Branch {
                            cond: Name::new(cond.as_str()),
                            lhs: value(args[0]),
                            rhs: value(args[1]),
                            then: block(dests[0]),
                            else_: block(dests[1]),
                        },
                        InsnData::Return { args } => Expr::Return {
                            arg: value(args[0]),
                        },
                        InsnData::Exit => Expr::Exit,
                    };

                    ast::Stmt {
                        result: dfg.insn_result(insn).map(|v| ValueDecl {
                            name: value(v),
                            ty: type_name(dfg.value_ty(v)),
                        }),
                        expr,
                        span: Default::default(),
                    }
                })
                .collect();

            ast::BlockDef {
                label: block(b),
                stmts,
            }
        })
        .collect();

    ast::Func {
        name: Name::new(func.name()),
        params: func
            .arg_values
            .iter()
            .map(|&arg| ValueDecl {
                name: value(arg),
                ty: type_name(dfg.value_ty(arg)),
            })
            .collect(),
        ret_ty: type_name(func.ret_ty()),
        blocks,
    }
}

fn type_name(ty: &Type) -> TypeName {
    match ty {
        Type::Array { elem_ty, len } => TypeName::Array(Box::new(type_name(elem_ty)), *len),
        _ => TypeName::Scalar(Name::new(ty.to_string())),
    }
}
