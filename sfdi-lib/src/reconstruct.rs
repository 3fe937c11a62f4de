// SPDX-License-Identifier: MPL-2.0

//! Height maps from a calibration and a single capture of the subject.

use crate::calibration::CalibrationArtifact;
use crate::error::{Error, Result};
use crate::phase::PhasePipeline;
use crate::registry::Registry;
use crate::tensor::CaptureTensor;
use nalgebra::DMatrix;

/// Rebuilds the calibrated strategies from a registry.
pub struct Reconstructor<'r> {
    registry: &'r Registry,
}

impl<'r> Reconstructor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Height map of the subject captured in `tensor`, an unswept capture
    /// with the same pattern plan layout and resolution as the calibration.
    /// Pure: the same inputs always give the same height map.
    pub fn reconstruct(
        &self,
        artifact: &CalibrationArtifact,
        tensor: &CaptureTensor,
    ) -> Result<DMatrix<f32>> {
        artifact.check_version()?;
        if tensor.is_swept() {
            return Err(Error::IncompatiblePlan(format!(
                "expected a single capture, got a sweep of {} heights",
                tensor.height_count()
            )));
        }
        let calibrated = artifact.pattern_plan();
        let captured = tensor.plan();
        if !calibrated.same_layout(captured) {
            return Err(Error::IncompatiblePlan(format!(
                "calibrated with {} stripe counts × {} phases × {} rotations on {} channels (multiplexed: {}), \
                 captured {} × {} × {} on {} channels (multiplexed: {})",
                calibrated.stripe_counts.len(),
                calibrated.phases.len(),
                calibrated.rotations.len(),
                calibrated.channels,
                calibrated.multiplexed,
                captured.stripe_counts.len(),
                captured.phases.len(),
                captured.rotations.len(),
                captured.channels,
                captured.multiplexed,
            )));
        }
        if calibrated != captured {
            log::warn!("Pattern plan values differ from the calibration \"{}\"", artifact.name());
        }
        if tensor.resolution() != artifact.resolution() {
            return Err(Error::IncompatiblePlan(format!(
                "calibrated at resolution {:?}, captured at {:?}",
                artifact.resolution(),
                tensor.resolution()
            )));
        }

        let shift = self.registry.phase_shift(artifact.phase_shift())?;
        let unwrap = self.registry.phase_unwrap(artifact.phase_unwrap())?;
        let phase_maps = PhasePipeline::new(&*shift, &*unwrap).continuous_phases(tensor, 0)?;
        artifact.profilometry_model().evaluate(&phase_maps)
    }
}

/// Reconstruct with the built-in strategies.
pub fn reconstruct(artifact: &CalibrationArtifact, tensor: &CaptureTensor) -> Result<DMatrix<f32>> {
    Reconstructor::new(&Registry::default()).reconstruct(artifact, tensor)
}
