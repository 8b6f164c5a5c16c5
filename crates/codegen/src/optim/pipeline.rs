//! Optimization pipeline.
//!
//! [`optimize`] turns an optimization level into an ordered list of
//! [`Pass`]es and reruns the whole list over the module until a round
//! changes nothing or the round cap is hit.

use quill_ir::Module;
use quill_verifier::{verify_module, VerificationLevel, VerificationReport, VerifierConfig};
use tracing::debug;

use super::{
    clean::CleanPass,
    constant_folding::ConstantFolder,
    cse::CsePass,
    dead_code::DeleteUnusedInstructionsPass,
    load_after_store::LoadAfterStorePass,
    mem2reg::Mem2RegPromotor,
    pass::{ModulePass, PerBlock, PerFunction, PerInsn},
    remove_add_zero::RemoveAddZeroPass,
};

/// The passes the pipeline knows how to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Promote non-escaping stack slots to SSA values.
    Mem2Reg,
    /// Fold known branches and simplify the block graph.
    Clean,
    /// Forward stores to loads of the same address within a block.
    LoadAfterStore,
    ConstantFold,
    Cse,
    /// Integer identities like `x + 0` and `x - x`.
    RemoveAddZero,
    DeleteUnused,
}

impl Pass {
    /// The ordered pass list of an optimization level.
    pub fn for_level(level: u8) -> Vec<Self> {
        match level {
            0 => vec![],
            1 => vec![
                Self::Clean,
                Self::LoadAfterStore,
                Self::ConstantFold,
                Self::RemoveAddZero,
                Self::DeleteUnused,
            ],
            _ => vec![
                Self::Mem2Reg,
                Self::Clean,
                Self::LoadAfterStore,
                Self::ConstantFold,
                Self::Cse,
                Self::RemoveAddZero,
                Self::DeleteUnused,
            ],
        }
    }

    pub fn build(self) -> Box<dyn ModulePass> {
        match self {
            Self::Mem2Reg => Box::new(PerFunction(Mem2RegPromotor::new())),
            Self::Clean => Box::new(PerFunction(CleanPass::new())),
            Self::LoadAfterStore => Box::new(PerFunction(PerBlock(LoadAfterStorePass::new()))),
            Self::ConstantFold => {
                Box::new(PerFunction(PerBlock(PerInsn(ConstantFolder::new()))))
            }
            Self::Cse => Box::new(PerFunction(CsePass::new())),
            Self::RemoveAddZero => {
                Box::new(PerFunction(PerBlock(PerInsn(RemoveAddZeroPass::new()))))
            }
            Self::DeleteUnused => Box::new(PerFunction(DeleteUnusedInstructionsPass::new())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub level: u8,
    /// Upper bound on the number of rounds. Hitting it is not an error.
    pub max_rounds: usize,
    /// Verify the module after every round and stop at the first failure.
    pub verify_each_round: bool,
}

impl PipelineConfig {
    pub fn for_level(level: u8) -> Self {
        Self {
            level,
            max_rounds: 16,
            verify_each_round: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_level(2)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Rounds run, including the final round that changed nothing.
    pub rounds: usize,
    /// `true` if any pass changed the module.
    pub changed: bool,
    pub hit_round_cap: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("module failed verification after round {round}:\n{report}")]
    Verification {
        round: usize,
        report: VerificationReport,
    },
}

/// Optimizes `module` at `level` with the default round cap.
pub fn optimize(module: &mut Module, level: u8) -> PipelineStats {
    let config = PipelineConfig::for_level(level);
    match optimize_with(module, &config) {
        Ok(stats) => stats,
        Err(_) => unreachable!("verification is off"),
    }
}

pub fn optimize_with(
    module: &mut Module,
    config: &PipelineConfig,
) -> Result<PipelineStats, PipelineError> {
    let mut passes: Vec<_> = Pass::for_level(config.level)
        .into_iter()
        .map(Pass::build)
        .collect();
    let mut stats = PipelineStats::default();
    if passes.is_empty() {
        return Ok(stats);
    }

    let verifier_config = VerifierConfig::for_level(VerificationLevel::Full);
    loop {
        if stats.rounds == config.max_rounds {
            debug!(rounds = stats.rounds, "round cap hit");
            stats.hit_round_cap = true;
            return Ok(stats);
        }
        stats.rounds += 1;

        let mut changed_passes = 0;
        for pass in passes.iter_mut() {
            if pass.run_on_module(module) {
                debug!(round = stats.rounds, pass = pass.name(), "pass changed the module");
                changed_passes += 1;
            }
        }
        debug!(round = stats.rounds, changed_passes, "finished round");

        if config.verify_each_round {
            let report = verify_module(module, &verifier_config);
            if !report.is_ok() {
                return Err(PipelineError::Verification {
                    round: stats.rounds,
                    report,
                });
            }
        }

        if changed_passes == 0 {
            return Ok(stats);
        }
        stats.changed = true;
    }
}
