// SPDX-License-Identifier: MPL-2.0

//! Devices replaying a recorded acquisition, so that image files
//! go through the same capture sequencer as a live rig.

use sfdi_lib::crop::Crop;
use sfdi_lib::frame::Frame;
use sfdi_lib::hardware::{
    Camera, DeviceError, DeviceKind, DeviceResult, FringeChannel, MotorStage, Projector,
};
use sfdi_lib::interop;
use sfdi_lib::plan::HeightSweep;
use std::path::PathBuf;

/// Camera returning recorded images, in the order of the files.
pub struct ReplayCamera {
    frames: std::vec::IntoIter<Frame>,
    resolution: (usize, usize),
    channels: usize,
}

impl ReplayCamera {
    /// Load all images into memory.
    /// Color images are converted to gray unless `color` is set.
    pub fn load(paths: &[PathBuf], crop: Option<Crop>, color: bool) -> anyhow::Result<Self> {
        if paths.is_empty() {
            anyhow::bail!("There is no such image. Use --help to know how to use this tool.");
        }
        eprintln!("Loading {} images ...", paths.len());
        let pb = indicatif::ProgressBar::new(paths.len() as u64);
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            log::debug!("Loading {}", path.display());
            let mut frame = interop::frame_from_image(image::open(path)?);
            if !color {
                frame = Frame::Gray(frame.to_gray());
            }
            if let Some(crop) = crop {
                frame = crop.apply(&frame)?;
            }
            frames.push(frame);
            pb.inc(1);
        }
        pb.finish();
        let (rows, cols) = frames[0].shape();
        let channels = frames[0].channels();
        Ok(Self {
            frames: frames.into_iter(),
            resolution: (cols, rows),
            channels,
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Camera for ReplayCamera {
    fn resolution(&self) -> (usize, usize) {
        self.resolution
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn capture(&mut self) -> DeviceResult<Frame> {
        self.frames.next().ok_or_else(|| {
            DeviceError::new(
                DeviceKind::Camera,
                "not enough recorded images for the pattern plan",
            )
        })
    }
}

/// Projector of the recording rig, only keeping track of its configuration.
pub struct ReplayProjector {
    channels: Vec<FringeChannel>,
    displayed: usize,
}

impl ReplayProjector {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![FringeChannel::default(); channels],
            displayed: 0,
        }
    }
}

impl Projector for ReplayProjector {
    fn resolution(&self) -> (usize, usize) {
        (1920, 1080)
    }

    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn channel(&self, index: usize) -> DeviceResult<FringeChannel> {
        self.channels
            .get(index)
            .copied()
            .ok_or_else(|| DeviceError::new(DeviceKind::Projector, format!("no channel {}", index)))
    }

    fn set_channel(&mut self, index: usize, settings: FringeChannel) -> DeviceResult<()> {
        let channel = self.channels.get_mut(index).ok_or_else(|| {
            DeviceError::new(DeviceKind::Projector, format!("no channel {}", index))
        })?;
        *channel = settings;
        Ok(())
    }

    fn display(&mut self) -> DeviceResult<()> {
        self.displayed += 1;
        let c = &self.channels[0];
        log::debug!(
            "Pattern {}: {} stripes, phase {:.3}, rotation {:.3}",
            self.displayed,
            c.stripe_count,
            c.phase,
            c.rotation
        );
        Ok(())
    }
}

/// Motor stage whose range is the recorded height sweep.
pub struct ReplayStage {
    min: f32,
    max: f32,
    steps: usize,
    height: f32,
}

impl ReplayStage {
    pub fn new(sweep: &HeightSweep) -> Self {
        let heights = sweep.heights();
        let min = heights[0];
        let max = heights[heights.len() - 1];
        Self {
            min,
            max,
            steps: heights.len(),
            height: min,
        }
    }
}

impl MotorStage for ReplayStage {
    fn min_height(&self) -> f32 {
        self.min
    }

    fn max_height(&self) -> f32 {
        self.max
    }

    fn steps(&self) -> usize {
        self.steps
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn set_height(&mut self, value: f32) -> DeviceResult<()> {
        self.height = value;
        Ok(())
    }
}
