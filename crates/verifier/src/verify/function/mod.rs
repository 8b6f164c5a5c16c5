use quill_ir::{
    ir_writer::FuncWriter, Block, ControlFlowGraph, DomTree, FuncRef, Function, Insn, Module,
    Type, Value,
};
use cranelift_entity::SecondaryMap;

use crate::{
    diagnostic::{Diagnostic, DiagnosticCode, DiagnosticContext, Invariant, Location},
    report::VerificationReport,
    VerifierConfig,
};

mod dominance;
mod layout;
mod names;
mod phi;
mod referential;
mod type_rules;

pub(super) fn verify_function(
    module: &Module,
    func_ref: FuncRef,
    cfg: &VerifierConfig,
) -> VerificationReport {
    let mut verifier = FunctionVerifier::new(module, func_ref, cfg);
    verifier.run();
    verifier.report
}

pub(super) struct FunctionVerifier<'a> {
    pub(super) module: &'a Module,
    pub(super) func_ref: FuncRef,
    pub(super) func: &'a Function,
    pub(super) cfg: &'a VerifierConfig,
    pub(super) report: VerificationReport,

    /// Set once a violation makes the remaining analyses meaningless.
    structural_failure: bool,

    pub(super) block_order: Vec<Block>,
    pub(super) insn_index_in_block: SecondaryMap<Insn, usize>,

    pub(super) cfg_graph: ControlFlowGraph,
    pub(super) domtree: DomTree,
}

trait FunctionPass {
    fn enabled(_cfg: &VerifierConfig) -> bool {
        true
    }

    fn run(verifier: &mut FunctionVerifier<'_>);
}

struct SignaturePass;
struct LayoutPass;
struct ReferentialPass;
struct NamePass;
struct ReachabilityPass;
struct PhiPass;
struct TypePass;
struct DominancePass;

impl FunctionPass for SignaturePass {
    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_signature();
    }
}

impl FunctionPass for LayoutPass {
    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.scan_layout();
    }
}

impl FunctionPass for ReferentialPass {
    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_referential_integrity();
    }
}

impl FunctionPass for NamePass {
    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_names();
    }
}

impl FunctionPass for ReachabilityPass {
    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_reachability();
    }
}

impl FunctionPass for PhiPass {
    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_phi_rules();
    }
}

impl FunctionPass for TypePass {
    fn enabled(cfg: &VerifierConfig) -> bool {
        cfg.should_check_types()
    }

    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_type_rules();
    }
}

impl FunctionPass for DominancePass {
    fn enabled(cfg: &VerifierConfig) -> bool {
        cfg.should_check_dominance()
    }

    fn run(verifier: &mut FunctionVerifier<'_>) {
        verifier.check_dominance_rules();
    }
}

impl<'a> FunctionVerifier<'a> {
    fn new(module: &'a Module, func_ref: FuncRef, cfg: &'a VerifierConfig) -> Self {
        Self {
            module,
            func_ref,
            func: &module.funcs[func_ref],
            cfg,
            report: VerificationReport::default(),
            structural_failure: false,
            block_order: Vec::new(),
            insn_index_in_block: SecondaryMap::new(),
            cfg_graph: ControlFlowGraph::default(),
            domtree: DomTree::default(),
        }
    }

    fn run(&mut self) {
        self.run_pass::<SignaturePass>();
        self.run_pass::<LayoutPass>();
        self.run_pass::<ReferentialPass>();
        self.run_pass::<NamePass>();
        if self.structural_failure {
            return;
        }

        self.cfg_graph.compute(self.func);
        self.domtree.compute(&self.cfg_graph);

        self.run_pass::<ReachabilityPass>();
        self.run_pass::<PhiPass>();
        self.run_pass::<TypePass>();
        self.run_pass::<DominancePass>();
    }

    fn run_pass<P: FunctionPass>(&mut self) {
        if P::enabled(self.cfg) {
            P::run(self);
        }
    }

    pub(super) fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.code.is_structural() {
            self.structural_failure = true;
        }

        let diagnostic = self.with_diagnostic_context(diagnostic);
        self.report.push(diagnostic, self.cfg.max_diagnostics);
    }

    fn with_diagnostic_context(&self, diagnostic: Diagnostic) -> Diagnostic {
        let mut context = DiagnosticContext {
            function_name: Some(format!("%{}", self.func.name())),
            insn_text: None,
        };

        // Reference errors can't be printed.
        let printable = !matches!(
            diagnostic.invariant(),
            Invariant::Structural | Invariant::TargetValidity
        );
        if let Location::Insn { insn, .. } = diagnostic.location {
            if printable {
                context.insn_text = self.insn_text(insn);
            }
        }

        diagnostic.with_context(context)
    }

    fn insn_text(&self, insn: Insn) -> Option<String> {
        let mut text = Vec::new();
        FuncWriter::new(self.module, self.func_ref)
            .write_insn(insn, &mut text)
            .ok()?;
        String::from_utf8(text).ok()
    }

    pub(super) fn insn_location(&self, insn: Insn) -> Location {
        let block = self
            .func
            .layout
            .is_insn_inserted(insn)
            .then(|| self.func.layout.insn_block(insn));
        Location::Insn {
            func: self.func_ref,
            block,
            insn,
        }
    }

    pub(super) fn block_location(&self, block: Block) -> Location {
        Location::Block {
            func: self.func_ref,
            block,
        }
    }

    pub(super) fn value_location(&self, value: Value) -> Location {
        Location::Value {
            func: self.func_ref,
            value,
        }
    }

    pub(super) fn value_ty(&self, value: Value) -> &'a Type {
        self.func.dfg.value_ty(value)
    }

    /// Layout instructions of `block`.
    pub(super) fn insns_of(&self, block: Block) -> Vec<Insn> {
        self.func.layout.iter_insn(block).collect()
    }

    fn check_signature(&mut self) {
        let sig = &self.func.sig;
        for (idx, ty) in sig.params().iter().enumerate() {
            if !ty.is_scalar() {
                self.emit(
                    Diagnostic::error(
                        DiagnosticCode::InvalidSignature,
                        "parameter type must be scalar",
                        Location::Function(self.func_ref),
                    )
                    .with_note(format!("parameter {idx} has type {ty}")),
                );
            }
        }
        if sig.ret_ty().is_array() {
            self.emit(Diagnostic::error(
                DiagnosticCode::InvalidSignature,
                "return type must be scalar or void",
                Location::Function(self.func_ref),
            ));
        }

        if self.func.arg_values.len() != sig.params().len() {
            self.emit(
                Diagnostic::error(
                    DiagnosticCode::InvalidSignature,
                    "parameter values don't match the signature",
                    Location::Function(self.func_ref),
                )
                .with_note(format!(
                    "signature has {} parameters, function has {} parameter values",
                    sig.params().len(),
                    self.func.arg_values.len()
                )),
            );
        }
    }
}
