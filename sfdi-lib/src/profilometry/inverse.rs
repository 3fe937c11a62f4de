// SPDX-License-Identifier: MPL-2.0

use super::{
    check_fit_input, finite_coefficients, phase_range, sweep_deltas, Profilometry,
    ProfilometryModel,
};
use crate::error::Result;
use crate::registry::StrategySpec;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Per pixel linear inverse model `1 / (h - h0) = a + b / Δφ`,
/// fitted by least squares over the heights of a sweep.
#[derive(Debug, Clone, Default)]
pub struct LinearInverseProfilometry;

impl LinearInverseProfilometry {
    pub const NAME: &'static str = "linear-inverse";
}

impl Profilometry for LinearInverseProfilometry {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(Self::NAME)
    }

    fn needs_motor_stage(&self) -> bool {
        true
    }

    fn fit(&self, heights: &[f32], phase_maps: &[Vec<DMatrix<f32>>]) -> Result<ProfilometryModel> {
        let (groups, (rows, cols)) = check_fit_input(heights, phase_maps, 3)?;
        let base_height = heights[0];
        let mut a = Vec::with_capacity(groups);
        let mut b = Vec::with_capacity(groups);
        let mut ranges = Vec::with_capacity(groups);
        for group in 0..groups {
            let deltas = sweep_deltas(phase_maps, group);
            ranges.push(phase_range(&deltas));
            let mut a_g = Vec::with_capacity(rows * cols);
            let mut b_g = Vec::with_capacity(rows * cols);
            for i in 0..rows * cols {
                // Fit v = a + b u on the points above the reference height.
                let points = heights[1..].iter().zip(&deltas[1..]).map(|(&h, d)| {
                    (1.0 / d[i] as f64, 1.0 / (h - base_height) as f64)
                });
                let (n, su, sv, suu, suv) = points.fold(
                    (0.0, 0.0, 0.0, 0.0, 0.0),
                    |(n, su, sv, suu, suv), (u, v)| (n + 1.0, su + u, sv + v, suu + u * u, suv + u * v),
                );
                let slope = (n * suv - su * sv) / (n * suu - su * su);
                let intercept = (sv - slope * su) / n;
                a_g.push(intercept as f32);
                b_g.push(slope as f32);
            }
            a.push(finite_coefficients(DMatrix::from_vec(rows, cols, a_g), "linear inverse"));
            b.push(finite_coefficients(DMatrix::from_vec(rows, cols, b_g), "linear inverse"));
        }
        Ok(ProfilometryModel::LinearInverse(LinearInverseModel {
            base_height,
            reference: phase_maps[0].clone(),
            a,
            b,
            phase_range: ranges,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearInverseModel {
    pub base_height: f32,
    pub reference: Vec<DMatrix<f32>>,
    pub a: Vec<DMatrix<f32>>,
    pub b: Vec<DMatrix<f32>>,
    /// Range of mean phase differences seen during calibration, per group.
    pub phase_range: Vec<(f32, f32)>,
}

impl LinearInverseModel {
    pub(super) fn height(&self, group: usize, delta: &DMatrix<f32>) -> DMatrix<f32> {
        // h - h0 = Δφ / (a Δφ + b), defined at Δφ = 0.
        let (a, b) = (&self.a[group], &self.b[group]);
        DMatrix::from_fn(delta.nrows(), delta.ncols(), |r, c| {
            let d = delta[(r, c)];
            self.base_height + d / (a[(r, c)] * d + b[(r, c)])
        })
    }
}
