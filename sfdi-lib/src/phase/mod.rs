// SPDX-License-Identifier: MPL-2.0

//! From fringe images to continuous phase maps.
//!
//! A phase shift strategy decodes the N phase-offset frames of one
//! (stripe count, rotation) group into a wrapped phase map in [-π, π],
//! then a phase unwrap strategy removes its 2π discontinuities.

mod nstep;
mod unwrap;

pub use nstep::NStepPhaseShift;
pub use unwrap::{ItohUnwrap, ReliabilityUnwrap};

use crate::error::Result;
use crate::registry::StrategySpec;
use crate::tensor::CaptureTensor;
use nalgebra::DMatrix;

pub trait PhaseShift {
    /// Description of the strategy, enough to rebuild it from a registry.
    fn spec(&self) -> StrategySpec;
    /// Number of frames expected in each decoded group.
    fn phase_count(&self) -> usize;
    /// Decode one group of frames, projected with phase offsets `shifts`,
    /// into a wrapped phase map.
    fn decode(&self, frames: &[DMatrix<f32>], shifts: &[f32]) -> Result<DMatrix<f32>>;
}

pub trait PhaseUnwrap {
    fn spec(&self) -> StrategySpec;
    fn unwrap_phase(&self, wrapped: &DMatrix<f32>) -> Result<DMatrix<f32>>;
}

/// Phase shift followed by phase unwrapping.
#[derive(Clone, Copy)]
pub struct PhasePipeline<'a> {
    pub shift: &'a dyn PhaseShift,
    pub unwrap: &'a dyn PhaseUnwrap,
}

impl<'a> PhasePipeline<'a> {
    pub fn new(shift: &'a dyn PhaseShift, unwrap: &'a dyn PhaseUnwrap) -> Self {
        Self { shift, unwrap }
    }

    /// One continuous phase map per (stripe, rotation) group at a height index.
    /// Groups are ordered by rotation, then stripe count.
    pub fn continuous_phases(
        &self,
        tensor: &CaptureTensor,
        height: usize,
    ) -> Result<Vec<DMatrix<f32>>> {
        let plan = tensor.plan();
        let mut maps = Vec::with_capacity(plan.group_count());
        for rotation in 0..plan.rotations.len() {
            for stripe in 0..plan.stripe_counts.len() {
                let frames = tensor.phase_frames(height, stripe, rotation)?;
                let wrapped = self.shift.decode(&frames, &plan.phases)?;
                maps.push(self.unwrap.unwrap_phase(&wrapped)?);
            }
        }
        Ok(maps)
    }
}
