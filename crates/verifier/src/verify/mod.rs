use quill_ir::{dfg::is_valid_name, FuncRef, Module};
use rustc_hash::FxHashSet;

use crate::{
    diagnostic::{Diagnostic, DiagnosticCode, Location},
    report::VerificationReport,
    VerifierConfig,
};

mod function;

/// Verifies every function of `module` and the module level declarations.
/// Never mutates the module and never panics on malformed IR.
pub fn verify_module(module: &Module, cfg: &VerifierConfig) -> VerificationReport {
    let mut report = VerificationReport::default();
    check_module_symbols(module, cfg, &mut report);

    for func_ref in module.iter_functions() {
        if report.is_full(cfg.max_diagnostics) {
            break;
        }
        let func_report = verify_function(module, func_ref, cfg);
        report.extend_with_limit(func_report.diagnostics, cfg.max_diagnostics);
    }

    report
}

/// Verifies `module` with the default configuration.
pub fn verify(module: &Module) -> VerificationReport {
    verify_module(module, &VerifierConfig::default())
}

pub fn verify_function(module: &Module, func_ref: FuncRef, cfg: &VerifierConfig) -> VerificationReport {
    function::verify_function(module, func_ref, cfg)
}

fn check_module_symbols(module: &Module, cfg: &VerifierConfig, report: &mut VerificationReport) {
    let mut check_name = |kind: &str, sigil: &str, name: &str| {
        if !is_valid_name(name) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidName,
                    format!("{kind} `{sigil}{name}` is not a valid name"),
                    Location::Module,
                ),
                cfg.max_diagnostics,
            );
        }
    };
    check_name("module", "", &module.name);
    for func in module.funcs.values() {
        check_name("function", "%", func.sig.name());
    }
    for sig in module.externals.values() {
        check_name("declaration", "%", sig.name());
    }
    for gv in module.globals.values() {
        check_name("global", "@", &gv.name);
    }

    let mut callee_names = FxHashSet::default();
    let sigs = module
        .funcs
        .values()
        .map(|func| &func.sig)
        .chain(module.externals.values());
    for sig in sigs {
        if !callee_names.insert(sig.name()) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::DuplicateSymbol,
                    format!("function `%{}` is declared more than once", sig.name()),
                    Location::Module,
                ),
                cfg.max_diagnostics,
            );
        }
    }

    for sig in module.externals.values() {
        let bad_param = sig.params().iter().any(|ty| !ty.is_scalar());
        if bad_param || sig.ret_ty().is_array() {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidSignature,
                    format!("declaration `%{}` has a non scalar parameter or return type", sig.name()),
                    Location::Module,
                ),
                cfg.max_diagnostics,
            );
        }
    }

    let mut global_names = FxHashSet::default();
    for gv in module.globals.values() {
        if !global_names.insert(gv.name.as_str()) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::DuplicateSymbol,
                    format!("global `@{}` is declared more than once", gv.name),
                    Location::Module,
                ),
                cfg.max_diagnostics,
            );
        }

        if gv.ty.is_void() {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidGlobal,
                    format!("global `@{}` has type void", gv.name),
                    Location::Module,
                ),
                cfg.max_diagnostics,
            );
        } else if let Some(init) = &gv.init {
            if init.len() != gv.ty.size_of() {
                report.push(
                    Diagnostic::error(
                        DiagnosticCode::InvalidGlobal,
                        format!("initializer of global `@{}` has the wrong size", gv.name),
                        Location::Module,
                    )
                    .with_note(format!(
                        "expected {} bytes, found {}",
                        gv.ty.size_of(),
                        init.len()
                    )),
                    cfg.max_diagnostics,
                );
            }
        }
    }
}
