// SPDX-License-Identifier: MPL-2.0

use super::{
    check_fit_input, finite_coefficients, phase_range, sweep_deltas, Profilometry,
    ProfilometryModel,
};
use crate::error::{Error, Result};
use crate::registry::StrategySpec;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub const MAX_DEGREE: usize = 8;
pub const DEFAULT_DEGREE: usize = 5;

/// Per pixel polynomial `h = Σ cj Δφ^j`, fitted by least squares
/// over the heights of a sweep.
#[derive(Debug, Clone)]
pub struct PolynomialProfilometry {
    degree: usize,
}

impl PolynomialProfilometry {
    pub const NAME: &'static str = "polynomial";

    pub fn new(degree: usize) -> Result<Self> {
        if !(1..=MAX_DEGREE).contains(&degree) {
            return Err(Error::InvalidOption(format!(
                "degree must be in [1, {}], got {}",
                MAX_DEGREE, degree
            )));
        }
        Ok(Self { degree })
    }

    pub fn from_spec(spec: &StrategySpec) -> Result<Self> {
        Self::new(spec.usize("degree", DEFAULT_DEGREE)?)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl Profilometry for PolynomialProfilometry {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(Self::NAME).with("degree", self.degree)
    }

    fn needs_motor_stage(&self) -> bool {
        true
    }

    fn fit(&self, heights: &[f32], phase_maps: &[Vec<DMatrix<f32>>]) -> Result<ProfilometryModel> {
        let (groups, (rows, cols)) = check_fit_input(heights, phase_maps, self.degree + 1)?;
        let targets = DVector::from_iterator(heights.len(), heights.iter().map(|&h| h as f64));
        let mut coefficients = Vec::with_capacity(groups);
        let mut ranges = Vec::with_capacity(groups);
        for group in 0..groups {
            let deltas = sweep_deltas(phase_maps, group);
            ranges.push(phase_range(&deltas));
            // One vec per power, each holding every pixel in column-major order.
            let mut powers = vec![Vec::with_capacity(rows * cols); self.degree + 1];
            for i in 0..rows * cols {
                let vandermonde = DMatrix::from_fn(heights.len(), self.degree + 1, |k, j| {
                    (deltas[k][i] as f64).powi(j as i32)
                });
                let solution = vandermonde
                    .svd(true, true)
                    .solve(&targets, 1e-12)
                    .unwrap_or_else(|_| DVector::from_element(self.degree + 1, f64::NAN));
                for (j, c) in solution.iter().enumerate() {
                    powers[j].push(*c as f32);
                }
            }
            coefficients.push(
                powers
                    .into_iter()
                    .map(|p| finite_coefficients(DMatrix::from_vec(rows, cols, p), "polynomial"))
                    .collect(),
            );
        }
        Ok(ProfilometryModel::Polynomial(PolynomialModel {
            reference: phase_maps[0].clone(),
            coefficients,
            phase_range: ranges,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialModel {
    pub reference: Vec<DMatrix<f32>>,
    /// `coefficients[group][j]` multiplies `Δφ^j`.
    pub coefficients: Vec<Vec<DMatrix<f32>>>,
    /// Range of mean phase differences seen during calibration, per group.
    pub phase_range: Vec<(f32, f32)>,
}

impl PolynomialModel {
    pub(super) fn height(&self, group: usize, delta: &DMatrix<f32>) -> DMatrix<f32> {
        let coefficients = &self.coefficients[group];
        // Horner scheme, highest power first.
        DMatrix::from_fn(delta.nrows(), delta.ncols(), |r, c| {
            let d = delta[(r, c)];
            coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, cj| acc * d + cj[(r, c)])
        })
    }
}
