// SPDX-License-Identifier: MPL-2.0

//! Profilometry: from continuous phase maps to physical height.
//!
//! A strategy fits a [`ProfilometryModel`] on the phase maps of a reference
//! plane captured at known heights. The model keeps the phase maps of the lowest
//! height as reference, and per pixel coefficients mapping the phase difference
//! `Δφ = φ - φ_ref` to height. Each (stripe count, rotation) group has its own
//! reference and coefficients; the heights of all groups are averaged.
//!
//! Unwrapped phase maps are only known up to a multiple of 2π.
//! A model fitted on a sweep remembers the range of mean phase differences
//! it was calibrated on, and a measured phase difference is shifted
//! by the multiple of 2π bringing its mean nearest to the center of that range.
//! This is unambiguous as long as the calibrated range spans less than one turn.

mod classic;
mod inverse;
mod polynomial;

pub use classic::{ClassicModel, ClassicProfilometry};
pub use inverse::{LinearInverseModel, LinearInverseProfilometry};
pub use polynomial::{PolynomialModel, PolynomialProfilometry};

use crate::error::{Error, Result};
use crate::registry::StrategySpec;
use crate::utils::{mean_of, mean_value, TWO_PI};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

pub trait Profilometry {
    fn spec(&self) -> StrategySpec;

    /// Whether fitting needs captures at several heights of a motor stage.
    fn needs_motor_stage(&self) -> bool;

    /// Fit a model from `phase_maps[h][g]`, the continuous phase map of group `g`
    /// captured with the reference plane at `heights[h]`.
    /// Heights are strictly increasing.
    fn fit(&self, heights: &[f32], phase_maps: &[Vec<DMatrix<f32>>]) -> Result<ProfilometryModel>;
}

/// Fitted model, tagged by the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ProfilometryModel {
    Classic(ClassicModel),
    LinearInverse(LinearInverseModel),
    Polynomial(PolynomialModel),
}

impl ProfilometryModel {
    /// Name of the strategy that fitted this model.
    pub fn strategy(&self) -> &'static str {
        match self {
            ProfilometryModel::Classic(_) => ClassicProfilometry::NAME,
            ProfilometryModel::LinearInverse(_) => LinearInverseProfilometry::NAME,
            ProfilometryModel::Polynomial(_) => PolynomialProfilometry::NAME,
        }
    }

    fn references(&self) -> &[DMatrix<f32>] {
        match self {
            ProfilometryModel::Classic(m) => &m.reference,
            ProfilometryModel::LinearInverse(m) => &m.reference,
            ProfilometryModel::Polynomial(m) => &m.reference,
        }
    }

    /// Center of the calibrated phase difference range of a group.
    fn phase_center(&self, group: usize) -> f32 {
        let range = match self {
            ProfilometryModel::Classic(_) => None,
            ProfilometryModel::LinearInverse(m) => m.phase_range.get(group),
            ProfilometryModel::Polynomial(m) => m.phase_range.get(group),
        };
        range.map_or(0.0, |&(low, high)| 0.5 * (low + high))
    }

    /// Number of (stripe count, rotation) groups the model was fitted on.
    pub fn group_count(&self) -> usize {
        self.references().len()
    }

    /// Height map of the subject from one continuous phase map per group.
    pub fn evaluate(&self, phase_maps: &[DMatrix<f32>]) -> Result<DMatrix<f32>> {
        let references = self.references();
        if phase_maps.len() != references.len() {
            return Err(Error::IncompatiblePlan(format!(
                "model fitted on {} groups, got {} phase maps",
                references.len(),
                phase_maps.len()
            )));
        }
        let mut heights = Vec::with_capacity(phase_maps.len());
        for (group, (phase, reference)) in phase_maps.iter().zip(references).enumerate() {
            if phase.shape() != reference.shape() {
                return Err(Error::IncompatiblePlan(format!(
                    "phase map of shape {:?}, model fitted on {:?}",
                    phase.shape(),
                    reference.shape()
                )));
            }
            let delta = phase_delta(phase, reference, self.phase_center(group));
            heights.push(match self {
                ProfilometryModel::Classic(m) => m.height(&delta),
                ProfilometryModel::LinearInverse(m) => m.height(group, &delta),
                ProfilometryModel::Polynomial(m) => m.height(group, &delta),
            });
        }
        mean_of(&heights).ok_or_else(|| Error::IncompatiblePlan("no phase map".to_string()))
    }
}

/// `measured - reference`, shifted by the multiple of 2π
/// bringing its mean nearest to `center`.
pub fn phase_delta(measured: &DMatrix<f32>, reference: &DMatrix<f32>, center: f32) -> DMatrix<f32> {
    let mut delta = measured - reference;
    let turns = ((mean_value(&delta) - center) / TWO_PI).round();
    delta.add_scalar_mut(-TWO_PI * turns);
    delta
}

/// Check the calibration data and return (group count, shape).
fn check_fit_input(
    heights: &[f32],
    phase_maps: &[Vec<DMatrix<f32>>],
    min_heights: usize,
) -> Result<(usize, (usize, usize))> {
    if heights.len() != phase_maps.len() {
        return Err(Error::Fit(format!(
            "{} heights but {} sets of phase maps",
            heights.len(),
            phase_maps.len()
        )));
    }
    if heights.len() < min_heights {
        return Err(Error::Fit(format!(
            "at least {} heights are needed, got {}",
            min_heights,
            heights.len()
        )));
    }
    if heights.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Fit("heights must be strictly increasing".to_string()));
    }
    let groups = phase_maps[0].len();
    let shape = phase_maps[0]
        .first()
        .map(|m| m.shape())
        .ok_or_else(|| Error::Fit("no phase map at the reference height".to_string()))?;
    for maps in phase_maps {
        if maps.len() != groups || maps.iter().any(|m| m.shape() != shape) {
            return Err(Error::Fit(
                "phase maps differ in count or shape between heights".to_string(),
            ));
        }
    }
    Ok((groups, shape))
}

/// Phase differences of one group at every height, relative to the lowest one.
/// Consecutive heights are chained, so the total phase change
/// of a sweep may exceed 2π as long as each step stays below π.
fn sweep_deltas(phase_maps: &[Vec<DMatrix<f32>>], group: usize) -> Vec<DMatrix<f32>> {
    let mut deltas: Vec<DMatrix<f32>> = Vec::with_capacity(phase_maps.len());
    for (h, maps) in phase_maps.iter().enumerate() {
        let delta = match deltas.last() {
            None => DMatrix::zeros(maps[group].nrows(), maps[group].ncols()),
            Some(previous) => previous + phase_delta(&maps[group], &phase_maps[h - 1][group], 0.0),
        };
        deltas.push(delta);
    }
    deltas
}

/// Range of the mean phase differences of a sweep.
fn phase_range(deltas: &[DMatrix<f32>]) -> (f32, f32) {
    let means = deltas.iter().map(mean_value);
    let range = means.fold((f32::INFINITY, f32::NEG_INFINITY), |(low, high), m| {
        (low.min(m), high.max(m))
    });
    if range.1 - range.0 >= TWO_PI {
        log::warn!(
            "Calibrated phase range [{}, {}] spans a full turn, heights beyond one turn are ambiguous",
            range.0,
            range.1
        );
    }
    range
}

/// Replace non-finite coefficients by 0, logging how many were replaced.
fn finite_coefficients(mut m: DMatrix<f32>, what: &str) -> DMatrix<f32> {
    let mut replaced = 0;
    for x in m.iter_mut() {
        if !x.is_finite() {
            *x = 0.0;
            replaced += 1;
        }
    }
    if replaced > 0 {
        log::warn!("{} non-finite {} coefficients replaced by 0", replaced, what);
    }
    m
}
