use quill_ir::{Insn, InsnData, Type, UnaryOp, Value};

use crate::diagnostic::{Diagnostic, DiagnosticCode};

use super::FunctionVerifier;

impl<'a> FunctionVerifier<'a> {
    pub(super) fn check_type_rules(&mut self) {
        for block in self.block_order.clone() {
            for insn in self.insns_of(block) {
                self.check_result_type(insn);
                self.check_operand_types(insn);
            }
        }
    }

    fn check_result_type(&mut self, insn: Insn) {
        let dfg = &self.func.dfg;
        let expected = dfg.insn_data(insn).result_type(dfg);
        let actual = dfg.insn_result(insn).map(|value| dfg.value_ty(value).clone());

        if expected != actual {
            let show = |ty: &Option<Type>| ty.as_ref().map_or("nothing".to_string(), Type::to_string);
            self.emit(
                Diagnostic::error(
                    DiagnosticCode::InsnResultTypeMismatch,
                    "instruction result doesn't match the instruction",
                    self.insn_location(insn),
                )
                .with_note(format!("expected {}, found {}", show(&expected), show(&actual))),
            );
        } else if let Some(ty) = expected {
            if !ty.is_scalar() {
                self.emit(Diagnostic::error(
                    DiagnosticCode::InsnResultTypeMismatch,
                    format!("instruction result has non scalar type {ty}"),
                    self.insn_location(insn),
                ));
            }
        }
    }

    fn check_operand_types(&mut self, insn: Insn) {
        let func = self.func;
        match func.dfg.insn_data(insn) {
            InsnData::Const { .. }
            | InsnData::Undef { .. }
            | InsnData::GlobalAddr { .. }
            | InsnData::Jump { .. } => {}

            InsnData::Unary { code, args } => {
                let ty = self.value_ty(args[0]);
                let ok = match code {
                    UnaryOp::Not => ty.is_integral(),
                    UnaryOp::Neg => ty.is_numeric(),
                };
                if !ok {
                    self.operand_mismatch(insn, format!("`{code}` is not defined on {ty}"));
                }
            }

            InsnData::Binary { code, args } => {
                let (lhs, rhs) = (self.value_ty(args[0]), self.value_ty(args[1]));
                if lhs != rhs {
                    self.operand_mismatch(insn, format!("operands have types {lhs} and {rhs}"));
                } else if (code.is_bitwise() && !lhs.is_integral()) || !lhs.is_numeric() {
                    self.operand_mismatch(insn, format!("`{code}` is not defined on {lhs}"));
                }
            }

            InsnData::Cast { args, .. } => {
                let from = self.value_ty(args[0]);
                if !from.is_scalar() {
                    self.operand_mismatch(insn, format!("can't cast from {from}"));
                }
            }

            InsnData::Load { args, ty } => {
                self.check_address(insn, args[0]);
                if let Some(pointee) = self.pointee_of(args[0]) {
                    if pointee != ty {
                        self.emit(
                            Diagnostic::error(
                                DiagnosticCode::UnstorableTypeInMemoryOp,
                                "loaded type doesn't match the slot type",
                                self.insn_location(insn),
                            )
                            .with_note(format!("slot holds {pointee}, loaded as {ty}")),
                        );
                    }
                }
            }

            InsnData::Store { args } => {
                self.check_address(insn, args[0]);
                let stored = self.value_ty(args[1]);
                if let Some(pointee) = self.pointee_of(args[0]) {
                    if pointee != stored {
                        self.emit(
                            Diagnostic::error(
                                DiagnosticCode::UnstorableTypeInMemoryOp,
                                "stored type doesn't match the slot type",
                                self.insn_location(insn),
                            )
                            .with_note(format!("slot holds {pointee}, stored {stored}")),
                        );
                    }
                }
            }

            InsnData::Alloc { ty } => {
                if ty.is_void() || ty.size_of() == 0 {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::UnstorableTypeInMemoryOp,
                        format!("can't allocate a slot of type {ty}"),
                        self.insn_location(insn),
                    ));
                }
            }

            InsnData::Call {
                callee,
                args,
                ret_ty,
            } => {
                let sig = self.module.callee_sig(*callee);
                if sig.params().len() != args.len() {
                    self.emit(
                        Diagnostic::error(
                            DiagnosticCode::CallArityMismatch,
                            format!("call of `%{}` has the wrong number of arguments", sig.name()),
                            self.insn_location(insn),
                        )
                        .with_note(format!(
                            "expected {}, found {}",
                            sig.params().len(),
                            args.len()
                        )),
                    );
                } else {
                    for (idx, (&arg, param)) in args.iter().zip(sig.params()).enumerate() {
                        let arg_ty = self.value_ty(arg);
                        if arg_ty != param {
                            self.emit(
                                Diagnostic::error(
                                    DiagnosticCode::CallArgTypeMismatch,
                                    format!("argument {idx} of `%{}` has the wrong type", sig.name()),
                                    self.insn_location(insn),
                                )
                                .with_note(format!("expected {param}, found {arg_ty}")),
                            );
                        }
                    }
                }

                if ret_ty != sig.ret_ty() {
                    self.emit(
                        Diagnostic::error(
                            DiagnosticCode::InsnResultTypeMismatch,
                            format!("call of `%{}` expects the wrong return type", sig.name()),
                            self.insn_location(insn),
                        )
                        .with_note(format!("callee returns {}, call expects {ret_ty}", sig.ret_ty())),
                    );
                }
            }

            InsnData::Phi { values, ty, .. } => {
                for &value in values {
                    let value_ty = self.value_ty(value);
                    if value_ty != ty {
                        self.operand_mismatch(
                            insn,
                            format!(
                                "incoming `{}` has type {value_ty}, phi has type {ty}",
                                func.dfg.value_name(value)
                            ),
                        );
                    }
                }
            }

            InsnData::Branch { args, .. } => {
                let (lhs, rhs) = (self.value_ty(args[0]), self.value_ty(args[1]));
                if lhs != rhs || !lhs.is_scalar() {
                    self.operand_mismatch(
                        insn,
                        format!("compared operands have types {lhs} and {rhs}"),
                    );
                }
            }

            InsnData::Return { args } => {
                let ret_ty = func.ret_ty();
                let ty = self.value_ty(args[0]);
                if ret_ty.is_void() {
                    self.emit(Diagnostic::error(
                        DiagnosticCode::ReturnTypeMismatch,
                        "void function returns a value; use `exit`",
                        self.insn_location(insn),
                    ));
                } else if ty != ret_ty {
                    self.emit(
                        Diagnostic::error(
                            DiagnosticCode::ReturnTypeMismatch,
                            "returned value has the wrong type",
                            self.insn_location(insn),
                        )
                        .with_note(format!("expected {ret_ty}, found {ty}")),
                    );
                }
            }

            InsnData::Exit => {
                if !func.ret_ty().is_void() {
                    self.emit(
                        Diagnostic::error(
                            DiagnosticCode::ReturnTypeMismatch,
                            "`exit` in a function that returns a value",
                            self.insn_location(insn),
                        )
                        .with_note(format!("function returns {}", func.ret_ty())),
                    );
                }
            }
        }
    }

    fn check_address(&mut self, insn: Insn, addr: Value) {
        let ty = self.value_ty(addr);
        if *ty != Type::Ptr {
            self.operand_mismatch(insn, format!("address has type {ty}, expected ptr"));
        }
    }

    /// Scalar type of the slot `addr` points to, if it is known.
    fn pointee_of(&self, addr: Value) -> Option<&'a Type> {
        let dfg = &self.func.dfg;
        let pointee = match dfg.insn_data(dfg.value_insn(addr)?) {
            InsnData::Alloc { ty } => ty,
            InsnData::GlobalAddr { gv } => &self.module.globals[*gv].ty,
            _ => return None,
        };
        pointee.is_scalar().then_some(pointee)
    }

    fn operand_mismatch(&mut self, insn: Insn, note: String) {
        self.emit(
            Diagnostic::error(
                DiagnosticCode::InsnOperandTypeMismatch,
                "operand types don't match the instruction",
                self.insn_location(insn),
            )
            .with_note(note),
        );
    }
}
