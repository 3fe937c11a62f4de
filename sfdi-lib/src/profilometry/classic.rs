// SPDX-License-Identifier: MPL-2.0

use super::{check_fit_input, Profilometry, ProfilometryModel};
use crate::error::{Error, Result};
use crate::registry::StrategySpec;
use crate::utils::TWO_PI;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Triangulation from the capture geometry, without motor stage:
/// `h = L Δφ / (Δφ - 2π f d)` with `f` the spatial frequency of the fringes
/// on the reference plane, `d` the camera to projector distance
/// and `L` the camera to reference plane distance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicProfilometry {
    pub spatial_frequency: f32,
    pub projector_distance: f32,
    pub reference_distance: f32,
}

impl ClassicProfilometry {
    pub const NAME: &'static str = "classic";

    pub fn new(
        spatial_frequency: f32,
        projector_distance: f32,
        reference_distance: f32,
    ) -> Result<Self> {
        for (name, value) in &[
            ("spatial_frequency", spatial_frequency),
            ("projector_distance", projector_distance),
            ("reference_distance", reference_distance),
        ] {
            if !(value.is_finite() && *value > 0.0) {
                return Err(Error::InvalidOption(format!(
                    "{} must be strictly positive, got {}",
                    name, value
                )));
            }
        }
        Ok(Self {
            spatial_frequency,
            projector_distance,
            reference_distance,
        })
    }

    pub fn from_spec(spec: &StrategySpec) -> Result<Self> {
        Self::new(
            spec.f32("spatial_frequency", 1.0)?,
            spec.f32("projector_distance", 1.0)?,
            spec.f32("reference_distance", 0.5)?,
        )
    }
}

impl Profilometry for ClassicProfilometry {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(Self::NAME)
            .with("spatial_frequency", self.spatial_frequency)
            .with("projector_distance", self.projector_distance)
            .with("reference_distance", self.reference_distance)
    }

    fn needs_motor_stage(&self) -> bool {
        false
    }

    /// Only the lowest height is used, as reference plane.
    fn fit(&self, heights: &[f32], phase_maps: &[Vec<DMatrix<f32>>]) -> Result<ProfilometryModel> {
        check_fit_input(heights, phase_maps, 1)?;
        Ok(ProfilometryModel::Classic(ClassicModel {
            base_height: heights[0],
            reference: phase_maps[0].clone(),
            spatial_frequency: self.spatial_frequency,
            projector_distance: self.projector_distance,
            reference_distance: self.reference_distance,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicModel {
    pub base_height: f32,
    pub reference: Vec<DMatrix<f32>>,
    pub spatial_frequency: f32,
    pub projector_distance: f32,
    pub reference_distance: f32,
}

impl ClassicModel {
    pub(super) fn height(&self, delta: &DMatrix<f32>) -> DMatrix<f32> {
        let fd = TWO_PI * self.spatial_frequency * self.projector_distance;
        let l = self.reference_distance;
        delta.map(|d| self.base_height + l * d / (d - fd))
    }
}
