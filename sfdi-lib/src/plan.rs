// SPDX-License-Identifier: MPL-2.0

//! Pattern plans and height sweeps: what to project, and where.

use crate::error::{Error, Result};
use crate::utils::TWO_PI;
use serde::{Deserialize, Serialize};

/// Cross product of stripe counts × phases × rotations to project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPlan {
    pub stripe_counts: Vec<f32>,
    /// Phase offsets in radians.
    pub phases: Vec<f32>,
    /// Pattern rotations in radians.
    pub rotations: Vec<f32>,
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default)]
    pub multiplexed: bool,
}

fn default_channels() -> usize {
    1
}

/// Coordinates of one physical capture inside a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shot {
    pub rotation: usize,
    pub stripe: usize,
    /// Index along the shot axis, equal to the phase index when not multiplexed.
    pub shot: usize,
}

impl PatternPlan {
    pub fn new(stripe_counts: Vec<f32>, phases: Vec<f32>, rotations: Vec<f32>) -> Self {
        Self {
            stripe_counts,
            phases,
            rotations,
            channels: 1,
            multiplexed: false,
        }
    }

    /// Multiplex up to `channels` phases into one RGB frame.
    pub fn multiplexed(mut self, channels: usize) -> Self {
        self.channels = channels;
        self.multiplexed = true;
        self
    }

    /// `n` phase offsets evenly spaced in [0, 2π).
    pub fn evenly_spaced_phases(n: usize) -> Vec<f32> {
        (0..n).map(|k| TWO_PI * k as f32 / n as f32).collect()
    }

    /// Check the plan invariants.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidPlan(msg));
        if self.stripe_counts.is_empty() {
            return invalid("no stripe count".to_string());
        }
        if let Some(s) = self.stripe_counts.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return invalid(format!("stripe count {} is not strictly positive", s));
        }
        if self.phases.is_empty() {
            return invalid("no phase".to_string());
        }
        if self.phases.iter().any(|p| !p.is_finite()) {
            return invalid("phases must be finite".to_string());
        }
        for (i, a) in self.phases.iter().enumerate() {
            if self.phases[i + 1..].contains(a) {
                return invalid(format!("phase {} appears twice", a));
            }
        }
        if self.rotations.is_empty() {
            return invalid("no rotation".to_string());
        }
        if self.rotations.iter().any(|r| !r.is_finite()) {
            return invalid("rotations must be finite".to_string());
        }
        if self.channels != 1 && self.channels != 3 {
            return invalid(format!("{} channels, expected 1 or 3", self.channels));
        }
        if self.multiplexed && self.phases.len() % self.channels != 0 {
            return invalid(format!(
                "{} phases cannot be multiplexed evenly on {} channels",
                self.phases.len(),
                self.channels
            ));
        }
        Ok(())
    }

    /// Number of phases packed into one capture.
    pub fn phases_per_shot(&self) -> usize {
        if self.multiplexed {
            self.channels
        } else {
            1
        }
    }

    /// Physical captures for one (stripe, rotation) group.
    pub fn shots_per_group(&self) -> usize {
        self.phases.len() / self.phases_per_shot()
    }

    /// Number of (stripe, rotation) groups, each decoded into one phase map.
    pub fn group_count(&self) -> usize {
        self.stripe_counts.len() * self.rotations.len()
    }

    /// Physical captures per reference position (height).
    pub fn frames_per_position(&self) -> usize {
        self.group_count() * self.shots_per_group()
    }

    /// Captures in acquisition order: rotation, then stripe count, then phase.
    pub fn shots(&self) -> impl Iterator<Item = Shot> + '_ {
        let stripes = self.stripe_counts.len();
        let shots = self.shots_per_group();
        (0..self.rotations.len()).flat_map(move |rotation| {
            (0..stripes).flat_map(move |stripe| {
                (0..shots).map(move |shot| Shot {
                    rotation,
                    stripe,
                    shot,
                })
            })
        })
    }

    /// True when two plans produce tensors of the same layout.
    pub fn same_layout(&self, other: &PatternPlan) -> bool {
        self.stripe_counts.len() == other.stripe_counts.len()
            && self.phases.len() == other.phases.len()
            && self.rotations.len() == other.rotations.len()
            && self.channels == other.channels
            && self.multiplexed == other.multiplexed
    }
}

/// Physical heights of a reference plane, strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct HeightSweep(Vec<f32>);

impl HeightSweep {
    pub fn new(heights: Vec<f32>) -> Result<Self> {
        if heights.len() < 2 {
            return Err(Error::InvalidPlan(format!(
                "a height sweep needs at least 2 heights, got {}",
                heights.len()
            )));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(Error::InvalidPlan("heights must be finite".to_string()));
        }
        if heights.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidPlan(
                "heights must be strictly increasing".to_string(),
            ));
        }
        Ok(HeightSweep(heights))
    }

    /// `steps` heights evenly spaced from `min` to `max` included,
    /// as described by a motor stage.
    pub fn linspace(min: f32, max: f32, steps: usize) -> Result<Self> {
        if steps < 2 {
            return Self::new(vec![min]);
        }
        let step = (max - min) / (steps - 1) as f32;
        Self::new((0..steps).map(|i| min + step * i as f32).collect())
    }

    pub fn heights(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<f32>> for HeightSweep {
    type Error = Error;
    fn try_from(heights: Vec<f32>) -> Result<Self> {
        Self::new(heights)
    }
}

impl From<HeightSweep> for Vec<f32> {
    fn from(sweep: HeightSweep) -> Self {
        sweep.0
    }
}
