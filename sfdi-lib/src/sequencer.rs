// SPDX-License-Identifier: MPL-2.0

//! Capture sequencer: drives a camera and projector through a pattern plan,
//! optionally at every height of a motor stage sweep.
//!
//! Iteration order is fixed: height, then rotation, then stripe count,
//! then phase. Phase is the fastest varying axis within a group,
//! which is what phase shift decoders expect.
//!
//! Device state is mutated during a run (displayed pattern, stage height).
//! On every exit path the projector channels are restored,
//! the stage is homed to its initial height, and the subject is shown again,
//! in that order. The projector keeps displaying the last pattern
//! until its next `display()`.

use crate::error::{Error, Result};
use crate::hardware::{
    Camera, DeviceError, DeviceKind, FringeChannel, HiddenSubject, MotorStage, Projector,
    ProjectorSession, StageSession, Visibility,
};
use crate::plan::{HeightSweep, PatternPlan, Shot};
use crate::tensor::{CaptureTensor, TensorBuilder};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct CaptureSequencer<'a> {
    camera: &'a mut dyn Camera,
    projector: &'a mut dyn Projector,
    stage: Option<&'a mut dyn MotorStage>,
    visibility: Option<&'a mut dyn Visibility>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> CaptureSequencer<'a> {
    pub fn new(camera: &'a mut dyn Camera, projector: &'a mut dyn Projector) -> Self {
        Self {
            camera,
            projector,
            stage: None,
            visibility: None,
            cancel: None,
        }
    }

    pub fn with_stage(mut self, stage: &'a mut dyn MotorStage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Hide the subject for the whole acquisition.
    pub fn with_visibility(mut self, visibility: &'a mut dyn Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Abort the acquisition between two frames once `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn has_stage(&self) -> bool {
        self.stage.is_some()
    }

    /// Capture every frame of `plan`, at every height of `sweep` if any.
    ///
    /// Nothing is returned unless all frames were captured.
    pub fn acquire(
        &mut self,
        plan: &PatternPlan,
        sweep: Option<&HeightSweep>,
    ) -> Result<CaptureTensor> {
        self.check(plan, sweep)?;
        log::info!(
            "Acquiring {} frames ({} per position)",
            plan.frames_per_position() * sweep.map_or(1, |s| s.len()),
            plan.frames_per_position()
        );

        let cancel = self.cancel;
        let camera = &mut *self.camera;
        let hidden = HiddenSubject::hide(self.visibility.as_deref_mut())?;
        let mut stage = self.stage.as_deref_mut().map(StageSession::new);
        let mut projector = ProjectorSession::new(&mut *self.projector)?;

        let mut builder = TensorBuilder::new(plan, sweep.map(|s| s.len()));
        let heights: Vec<Option<f32>> = match sweep {
            Some(s) => s.heights().iter().map(|&h| Some(h)).collect(),
            None => vec![None],
        };
        for (h_idx, height) in heights.into_iter().enumerate() {
            if let (Some(h), Some(stage)) = (height, stage.as_mut()) {
                stage.move_to(h)?;
            }
            for shot in plan.shots() {
                if cancel.map_or(false, |c| c.load(Ordering::SeqCst)) {
                    log::warn!("Acquisition cancelled");
                    return Err(Error::Cancelled);
                }
                configure(&mut projector, plan, shot)?;
                projector.display()?;
                let frame = camera.capture()?;
                builder
                    .insert(h_idx, shot.stripe, shot.shot, shot.rotation, frame)
                    .map_err(|err| match err {
                        Error::IncompatiblePlan(msg) => {
                            Error::Device(DeviceError::new(DeviceKind::Camera, msg))
                        }
                        err => err,
                    })?;
            }
            log::debug!("Captured position {}", h_idx);
        }
        let tensor = builder.finish()?;

        projector.release()?;
        if let Some(stage) = stage {
            stage.release()?;
        }
        hidden.release()?;
        Ok(tensor)
    }

    /// Fail fast, before touching any device.
    fn check(&self, plan: &PatternPlan, sweep: Option<&HeightSweep>) -> Result<()> {
        plan.validate()?;
        let needed = if plan.multiplexed { plan.channels } else { 1 };
        if self.projector.channels() < needed {
            return Err(Error::InvalidPlan(format!(
                "plan needs {} projector channels, projector has {}",
                needed,
                self.projector.channels()
            )));
        }
        if plan.multiplexed && self.camera.channels() < plan.channels {
            return Err(Error::InvalidPlan(format!(
                "multiplexing on {} channels with a {} channel camera",
                plan.channels,
                self.camera.channels()
            )));
        }
        if let Some(sweep) = sweep {
            let stage = self.stage.as_deref().ok_or_else(|| {
                Error::MissingHardware("a height sweep needs a motor stage".to_string())
            })?;
            let (min, max) = (stage.min_height(), stage.max_height());
            if let Some(h) = sweep.heights().iter().find(|&&h| h < min || h > max) {
                return Err(Error::InvalidPlan(format!(
                    "height {} is outside of the stage range [{}, {}]",
                    h, min, max
                )));
            }
        }
        Ok(())
    }
}

/// Write the pattern of one shot on the projector channels.
/// Without multiplexing, channel 0 carries the pattern and the others are dimmed.
fn configure<P: Projector + ?Sized>(
    projector: &mut ProjectorSession<'_, P>,
    plan: &PatternPlan,
    shot: Shot,
) -> Result<()> {
    let stripe_count = plan.stripe_counts[shot.stripe];
    let rotation = plan.rotations[shot.rotation];
    let per_shot = plan.phases_per_shot();
    for channel in 0..projector.channels() {
        let saved = projector.saved(channel).copied().unwrap_or_default();
        let settings = if channel < per_shot {
            FringeChannel {
                stripe_count,
                phase: plan.phases[shot.shot * per_shot + channel],
                rotation,
                ..saved
            }
        } else {
            FringeChannel {
                intensity: 0.0,
                ..saved
            }
        };
        projector.set_channel(channel, settings)?;
    }
    Ok(())
}
