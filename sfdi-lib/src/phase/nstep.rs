// SPDX-License-Identifier: MPL-2.0

use super::PhaseShift;
use crate::error::{Error, Result};
use crate::registry::StrategySpec;
use nalgebra::DMatrix;

pub const MIN_PHASE_COUNT: usize = 3;
pub const MAX_PHASE_COUNT: usize = 32;

/// Smallest determinant of the normal equations for shifts to determine the phase.
const MIN_DETERMINANT: f64 = 1e-9;

/// N-step phase shifting.
///
/// Each pixel follows `In = A + B cos(φ + δn) = A + C cos δn - S sin δn`
/// with `C = B cos φ` and `S = B sin φ`, solved by least squares
/// for the shifts `δn` of the pattern plan, and `φ = atan2(S, C)`.
/// With evenly spaced shifts `δn = 2πn/N` this is the classic
/// `φ = atan2(-Σ In sin δn, Σ In cos δn)`.
#[derive(Debug, Clone)]
pub struct NStepPhaseShift {
    phase_count: usize,
}

impl NStepPhaseShift {
    pub const NAME: &'static str = "n-step";

    pub fn new(phase_count: usize) -> Result<Self> {
        if !(MIN_PHASE_COUNT..=MAX_PHASE_COUNT).contains(&phase_count) {
            return Err(Error::InvalidOption(format!(
                "phase_count must be in [{}, {}], got {}",
                MIN_PHASE_COUNT, MAX_PHASE_COUNT, phase_count
            )));
        }
        Ok(Self { phase_count })
    }

    pub fn from_spec(spec: &StrategySpec) -> Result<Self> {
        Self::new(spec.usize("phase_count", MIN_PHASE_COUNT)?)
    }
}

impl PhaseShift for NStepPhaseShift {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(Self::NAME).with("phase_count", self.phase_count)
    }

    fn phase_count(&self) -> usize {
        self.phase_count
    }

    fn decode(&self, frames: &[DMatrix<f32>], shifts: &[f32]) -> Result<DMatrix<f32>> {
        if frames.len() != self.phase_count {
            return Err(Error::InvalidFrameCount {
                expected: self.phase_count,
                actual: frames.len(),
            });
        }
        if shifts.len() != frames.len() {
            return Err(Error::IncompatiblePlan(format!(
                "{} phase shifts for {} frames",
                shifts.len(),
                frames.len()
            )));
        }
        let shape = frames[0].shape();
        if let Some(f) = frames.iter().find(|f| f.shape() != shape) {
            return Err(Error::IncompatiblePlan(format!(
                "frames of shapes {:?} and {:?} in one group",
                shape,
                f.shape()
            )));
        }

        // Rows of the least squares solver give the weight of each frame in C and S.
        let design = DMatrix::from_fn(shifts.len(), 3, |n, j| {
            let delta = shifts[n] as f64;
            match j {
                0 => 1.0,
                1 => delta.cos(),
                _ => -delta.sin(),
            }
        });
        let normal = design.tr_mul(&design);
        let inverse = Some(normal)
            .filter(|m| m.determinant().abs() > MIN_DETERMINANT)
            .and_then(|m| m.try_inverse())
            .ok_or_else(|| {
                Error::InvalidPlan(format!(
                    "phase shifts {:?} do not determine the phase",
                    shifts
                ))
            })?;
        let solver = inverse * design.transpose();

        let mut cos_part: DMatrix<f32> = DMatrix::zeros(shape.0, shape.1);
        let mut sin_part: DMatrix<f32> = DMatrix::zeros(shape.0, shape.1);
        for (n, frame) in frames.iter().enumerate() {
            cos_part += frame * solver[(1, n)] as f32;
            sin_part += frame * solver[(2, n)] as f32;
        }
        Ok(sin_part.zip_map(&cos_part, |y, x| y.atan2(x)))
    }
}
