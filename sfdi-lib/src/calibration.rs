// SPDX-License-Identifier: MPL-2.0

//! Calibration: reference plane captures turned into a persisted
//! phase to height model.

use crate::crop::Crop;
use crate::error::{Error, Result};
use crate::phase::{PhasePipeline, PhaseShift, PhaseUnwrap};
use crate::plan::{HeightSweep, PatternPlan};
use crate::profilometry::{Profilometry, ProfilometryModel};
use crate::registry::StrategySpec;
use crate::repository::ExperimentRepository;
use crate::sequencer::CaptureSequencer;
use crate::tensor::CaptureTensor;
use serde::{Deserialize, Serialize};

/// Version of the persisted artifact format.
pub const FORMAT_VERSION: u32 = 1;

/// Everything needed to reconstruct height maps with a given rig.
///
/// Only created by a [`CalibrationBuilder`] (or loaded from a repository)
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    name: String,
    version: u32,
    pattern_plan: PatternPlan,
    height_sweep: Option<HeightSweep>,
    phase_shift: StrategySpec,
    phase_unwrap: StrategySpec,
    profilometry_model: ProfilometryModel,
    /// (rows, columns) of the calibrated camera, after cropping.
    resolution: (usize, usize),
    /// Region of interest the reference frames were cropped to.
    #[serde(default)]
    crop: Option<Crop>,
}

impl CalibrationArtifact {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn pattern_plan(&self) -> &PatternPlan {
        &self.pattern_plan
    }

    pub fn height_sweep(&self) -> Option<&HeightSweep> {
        self.height_sweep.as_ref()
    }

    pub fn phase_shift(&self) -> &StrategySpec {
        &self.phase_shift
    }

    pub fn phase_unwrap(&self) -> &StrategySpec {
        &self.phase_unwrap
    }

    pub fn profilometry_model(&self) -> &ProfilometryModel {
        &self.profilometry_model
    }

    pub fn resolution(&self) -> (usize, usize) {
        self.resolution
    }

    /// Crop to apply to subject frames before reconstruction.
    pub fn crop(&self) -> Option<Crop> {
        self.crop
    }

    /// Fail on artifacts written by an incompatible version of this crate.
    pub fn check_version(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: self.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(())
    }
}

/// The three strategies of a calibration.
#[derive(Clone, Copy)]
pub struct Strategies<'a> {
    pub phase_shift: &'a dyn PhaseShift,
    pub phase_unwrap: &'a dyn PhaseUnwrap,
    pub profilometry: &'a dyn Profilometry,
}

pub struct CalibrationBuilder<'r> {
    repository: &'r mut dyn ExperimentRepository,
    crop: Option<Crop>,
}

impl<'r> CalibrationBuilder<'r> {
    pub fn new(repository: &'r mut dyn ExperimentRepository) -> Self {
        Self {
            repository,
            crop: None,
        }
    }

    /// Record that the captured frames are cropped to `crop`.
    pub fn with_crop(mut self, crop: Option<Crop>) -> Self {
        self.crop = crop;
        self
    }

    /// Checks that need no device: the name is free,
    /// and a motor stage is available if the profilometry needs one.
    pub fn preflight(
        &self,
        name: &str,
        profilometry: &dyn Profilometry,
        has_stage: bool,
    ) -> Result<()> {
        if self.repository.exists(name)? {
            return Err(Error::DuplicateCalibrationName(name.to_string()));
        }
        if profilometry.needs_motor_stage() && !has_stage {
            return Err(Error::MissingHardware(format!(
                "{} profilometry needs a motor stage height sweep",
                profilometry.spec().name
            )));
        }
        Ok(())
    }

    /// Acquire the reference captures with `sequencer` and build the calibration.
    /// Nothing is captured if the preflight checks fail.
    pub fn calibrate(
        &mut self,
        name: &str,
        plan: &PatternPlan,
        sweep: Option<&HeightSweep>,
        sequencer: &mut CaptureSequencer<'_>,
        strategies: &Strategies<'_>,
    ) -> Result<CalibrationArtifact> {
        self.preflight(
            name,
            strategies.profilometry,
            sequencer.has_stage() && sweep.is_some(),
        )?;
        let tensor = sequencer.acquire(plan, sweep)?;
        self.build(name, plan, sweep, &tensor, strategies)
    }

    /// Fit and persist a calibration from already captured reference frames.
    /// Without sweep, the captured plane is the reference at height 0.
    pub fn build(
        &mut self,
        name: &str,
        plan: &PatternPlan,
        sweep: Option<&HeightSweep>,
        tensor: &CaptureTensor,
        strategies: &Strategies<'_>,
    ) -> Result<CalibrationArtifact> {
        self.preflight(name, strategies.profilometry, sweep.is_some())?;
        check_tensor(plan, sweep, tensor)?;

        let pipeline = PhasePipeline::new(strategies.phase_shift, strategies.phase_unwrap);
        let phase_maps = (0..tensor.height_count())
            .map(|h| pipeline.continuous_phases(tensor, h))
            .collect::<Result<Vec<_>>>()?;
        let heights = sweep.map_or_else(|| vec![0.0], |s| s.heights().to_vec());
        log::info!(
            "Fitting {} profilometry on {} heights",
            strategies.profilometry.spec().name,
            heights.len()
        );
        let profilometry_model = strategies.profilometry.fit(&heights, &phase_maps)?;

        let artifact = CalibrationArtifact {
            name: name.to_string(),
            version: FORMAT_VERSION,
            pattern_plan: plan.clone(),
            height_sweep: sweep.cloned(),
            phase_shift: strategies.phase_shift.spec(),
            phase_unwrap: strategies.phase_unwrap.spec(),
            profilometry_model,
            resolution: tensor.resolution(),
            crop: self.crop,
        };
        self.repository.save(&artifact)?;
        log::info!("Saved calibration \"{}\"", name);
        Ok(artifact)
    }
}

fn check_tensor(plan: &PatternPlan, sweep: Option<&HeightSweep>, tensor: &CaptureTensor) -> Result<()> {
    if tensor.plan() != plan {
        return Err(Error::IncompatiblePlan(
            "tensor was captured with another pattern plan".to_string(),
        ));
    }
    match sweep {
        Some(s) if !tensor.is_swept() || tensor.height_count() != s.len() => {
            Err(Error::IncompatiblePlan(format!(
                "sweep of {} heights, tensor of {} unswept positions",
                s.len(),
                tensor.height_count()
            )))
        }
        None if tensor.is_swept() => Err(Error::IncompatiblePlan(
            "swept tensor without height sweep".to_string(),
        )),
        _ => Ok(()),
    }
}
