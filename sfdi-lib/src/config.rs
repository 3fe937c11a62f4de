// SPDX-License-Identifier: MPL-2.0

//! Experiment configuration, read from JSON files.

use crate::calibration::Strategies;
use crate::crop::Crop;
use crate::error::Result;
use crate::phase::{PhaseShift, PhaseUnwrap};
use crate::plan::{HeightSweep, PatternPlan};
use crate::profilometry::Profilometry;
use crate::registry::{Registry, StrategySpec};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Pattern plan, optional height sweep and strategies of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub plan: PatternPlan,
    #[serde(default)]
    pub heights: Option<HeightSweep>,
    pub phase_shift: StrategySpec,
    pub phase_unwrap: StrategySpec,
    pub profilometry: StrategySpec,
    #[serde(default)]
    pub crop: Option<Crop>,
}

/// Strategies built from a configuration, borrowed as [`Strategies`].
pub struct StrategySet {
    pub phase_shift: Box<dyn PhaseShift>,
    pub phase_unwrap: Box<dyn PhaseUnwrap>,
    pub profilometry: Box<dyn Profilometry>,
}

impl StrategySet {
    pub fn strategies(&self) -> Strategies<'_> {
        Strategies {
            phase_shift: &*self.phase_shift,
            phase_unwrap: &*self.phase_unwrap,
            profilometry: &*self.profilometry,
        }
    }
}

impl ExperimentConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.plan.validate()?;
        Ok(config)
    }

    pub fn strategies(&self, registry: &Registry) -> Result<StrategySet> {
        Ok(StrategySet {
            phase_shift: registry.phase_shift(&self.phase_shift)?,
            phase_unwrap: registry.phase_unwrap(&self.phase_unwrap)?,
            profilometry: registry.profilometry(&self.profilometry)?,
        })
    }
}
