//! Stage graph construction.
//!
//! The chain is always three ordinary stages, optionally followed by one
//! LTO stage and then three PGO stages. Stage numbers are positions in the
//! chain, starting at 1.

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::core::build_conf::BuildConf;
use crate::core::error::ConfigError;
use crate::core::stage::{Stage, StageRole};

/// Number of stages that build the full toolchain.
pub const NUM_ORDINARY_STAGES: usize = 3;

/// Stages appended when PGO is enabled.
pub const PGO_ROLES: [StageRole; 3] = [
    StageRole::PgoInstrumented,
    StageRole::PgoTraining,
    StageRole::PgoFinal,
];

/// Number of stages a run with these switches has.
pub fn stage_count(lto: bool, pgo: bool) -> usize {
    NUM_ORDINARY_STAGES + usize::from(lto) + if pgo { PGO_ROLES.len() } else { 0 }
}

/// The ordered chain of stages for a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    /// Build the chain. PGO without LTO is rejected.
    pub fn build(conf: &BuildConf) -> Result<Self, ConfigError> {
        let flags = conf.flags();
        if flags.pgo && !flags.lto {
            return Err(ConfigError::PgoWithoutLto);
        }

        let mut roles = Vec::with_capacity(stage_count(flags.lto, flags.pgo));
        roles.extend(std::iter::repeat(StageRole::Ordinary).take(NUM_ORDINARY_STAGES - 1));
        roles.push(StageRole::FinalOrdinary);
        if flags.lto {
            roles.push(StageRole::Lto);
        }
        if flags.pgo {
            roles.extend(PGO_ROLES);
        }

        let build_parent_dir = conf.build_parent_dir();
        let final_install_dir = conf.final_install_dir();
        let mut stages: Vec<Stage> = Vec::with_capacity(roles.len());
        for (index, role) in roles.into_iter().enumerate() {
            let predecessor = stages.last().map(Stage::link);
            stages.push(Stage::new(
                index + 1,
                role,
                predecessor,
                &build_parent_dir,
                &final_install_dir,
            ));
        }

        Ok(StageGraph { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage by 1-based number.
    pub fn get(&self, number: usize) -> Option<&Stage> {
        number.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    /// Validate a `[min_stage, max_stage]` window against this chain.
    ///
    /// `max_stage` defaults to the last stage.
    pub fn window(
        &self,
        min_stage: usize,
        max_stage: Option<usize>,
        conf: &BuildConf,
    ) -> Result<RangeInclusive<usize>, ConfigError> {
        validate_window(min_stage, max_stage, self.len(), conf.flags().lto, conf.flags().pgo)
    }

    /// Stages inside `window`, in order.
    pub fn select(&self, window: &RangeInclusive<usize>) -> impl Iterator<Item = &Stage> + '_ {
        let window = window.clone();
        self.stages
            .iter()
            .filter(move |s| window.contains(&s.number()))
    }
}

/// Check a stage window against a chain of `num_stages` stages.
pub fn validate_window(
    min_stage: usize,
    max_stage: Option<usize>,
    num_stages: usize,
    lto: bool,
    pgo: bool,
) -> Result<RangeInclusive<usize>, ConfigError> {
    let max_stage = max_stage.unwrap_or(num_stages);
    if min_stage < 1 {
        return Err(ConfigError::MinStageTooLow { min_stage });
    }
    if max_stage > num_stages {
        return Err(ConfigError::MaxStageTooHigh {
            max_stage,
            num_stages,
            lto: enabled_str(lto),
            pgo: enabled_str(pgo),
        });
    }
    if min_stage > max_stage {
        return Err(ConfigError::InvertedStageRange {
            min_stage,
            max_stage,
        });
    }
    Ok(min_stage..=max_stage)
}

fn enabled_str(b: bool) -> &'static str {
    if b {
        "enabled"
    } else {
        "disabled"
    }
}
