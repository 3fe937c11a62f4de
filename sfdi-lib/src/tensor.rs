// SPDX-License-Identifier: MPL-2.0

//! Capture tensors: every frame of an acquisition, indexed by
//! `[height?][stripe][phase][rotation]`.

use crate::crop::Crop;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::plan::PatternPlan;
use nalgebra::DMatrix;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTensor {
    plan: PatternPlan,
    heights: usize,
    swept: bool,
    /// Stored in [height][stripe][shot][rotation] order.
    frames: Vec<Frame>,
}

impl CaptureTensor {
    /// Build a tensor from frames listed in acquisition order
    /// (height, rotation, stripe count, phase).
    /// `heights` is `None` for a capture at a single, unswept position.
    pub fn from_capture_order(
        plan: &PatternPlan,
        heights: Option<usize>,
        frames: Vec<Frame>,
    ) -> Result<Self> {
        plan.validate()?;
        let height_count = heights.unwrap_or(1);
        let expected = height_count * plan.frames_per_position();
        if frames.len() != expected {
            return Err(Error::InvalidFrameCount {
                expected,
                actual: frames.len(),
            });
        }
        let mut builder = TensorBuilder::new(plan, heights);
        let coordinates = (0..height_count)
            .flat_map(|h| plan.shots().map(move |shot| (h, shot)))
            .collect::<Vec<_>>();
        for ((h, shot), frame) in coordinates.into_iter().zip(frames) {
            builder.insert(h, shot.stripe, shot.shot, shot.rotation, frame)?;
        }
        builder.finish()
    }

    pub fn plan(&self) -> &PatternPlan {
        &self.plan
    }

    pub fn is_swept(&self) -> bool {
        self.swept
    }

    /// Number of height positions, 1 when unswept.
    pub fn height_count(&self) -> usize {
        self.heights
    }

    /// Axis lengths: `[height, stripe, phase, rotation]`, without the height axis
    /// when unswept. When multiplexed the phase axis counts physical shots.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(4);
        if self.swept {
            shape.push(self.heights);
        }
        shape.push(self.plan.stripe_counts.len());
        shape.push(self.plan.shots_per_group());
        shape.push(self.plan.rotations.len());
        shape
    }

    /// (rows, columns) shared by every frame.
    pub fn resolution(&self) -> (usize, usize) {
        self.frames[0].shape()
    }

    pub fn channels(&self) -> usize {
        self.frames[0].channels()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, height: usize, stripe: usize, shot: usize, rotation: usize) -> Option<&Frame> {
        if height >= self.heights
            || stripe >= self.plan.stripe_counts.len()
            || shot >= self.plan.shots_per_group()
            || rotation >= self.plan.rotations.len()
        {
            return None;
        }
        self.frames
            .get(index(&self.plan, height, stripe, shot, rotation))
    }

    /// One gray frame per phase of a (stripe, rotation) group, in phase order.
    /// Multiplexed shots are split into their channels here.
    pub fn phase_frames(
        &self,
        height: usize,
        stripe: usize,
        rotation: usize,
    ) -> Result<Vec<DMatrix<f32>>> {
        let per_shot = self.plan.phases_per_shot();
        let mut frames = Vec::with_capacity(self.plan.phases.len());
        for shot in 0..self.plan.shots_per_group() {
            let frame = self
                .frame(height, stripe, shot, rotation)
                .ok_or_else(|| {
                    Error::IncompatiblePlan(format!(
                        "no frame at height {} stripe {} shot {} rotation {}",
                        height, stripe, shot, rotation
                    ))
                })?;
            if self.plan.multiplexed {
                frames.extend((0..per_shot).map(|c| frame.channel(c)));
            } else {
                frames.push(frame.channel(0));
            }
        }
        Ok(frames)
    }

    /// Restrict every frame to a region of interest.
    pub fn crop(&self, crop: &Crop) -> Result<Self> {
        let frames = self
            .frames
            .iter()
            .map(|f| crop.apply(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            plan: self.plan.clone(),
            heights: self.heights,
            swept: self.swept,
            frames,
        })
    }
}

fn index(plan: &PatternPlan, height: usize, stripe: usize, shot: usize, rotation: usize) -> usize {
    let stripes = plan.stripe_counts.len();
    let shots = plan.shots_per_group();
    let rotations = plan.rotations.len();
    ((height * stripes + stripe) * shots + shot) * rotations + rotation
}

/// Incrementally filled tensor, checking that all frames share one layout.
pub(crate) struct TensorBuilder {
    plan: PatternPlan,
    heights: usize,
    swept: bool,
    layout: Option<((usize, usize), usize)>,
    frames: Vec<Option<Frame>>,
}

impl TensorBuilder {
    pub(crate) fn new(plan: &PatternPlan, heights: Option<usize>) -> Self {
        let height_count = heights.unwrap_or(1);
        Self {
            plan: plan.clone(),
            heights: height_count,
            swept: heights.is_some(),
            layout: None,
            frames: vec![None; height_count * plan.frames_per_position()],
        }
    }

    pub(crate) fn insert(
        &mut self,
        height: usize,
        stripe: usize,
        shot: usize,
        rotation: usize,
        frame: Frame,
    ) -> Result<()> {
        let layout = (frame.shape(), frame.channels());
        match self.layout {
            None => self.layout = Some(layout),
            Some(expected) if expected != layout => {
                return Err(Error::IncompatiblePlan(format!(
                    "frame of shape {:?} with {} channels, expected {:?} with {} channels",
                    layout.0, layout.1, expected.0, expected.1
                )));
            }
            Some(_) => {}
        }
        let i = index(&self.plan, height, stripe, shot, rotation);
        self.frames[i] = Some(frame);
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<CaptureTensor> {
        let missing = self.frames.iter().filter(|f| f.is_none()).count();
        let frames = self
            .frames
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                Error::IncompatiblePlan(format!("{} frames are missing from the tensor", missing))
            })?;
        Ok(CaptureTensor {
            plan: self.plan,
            heights: self.heights,
            swept: self.swept,
            frames,
        })
    }
}
