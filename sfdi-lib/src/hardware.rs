// SPDX-License-Identifier: MPL-2.0

//! Device capabilities consumed by the capture sequencer.
//!
//! Cameras, projectors and motor stages are implemented outside of this crate
//! (a renderer, physical hardware, recorded files...).
//! The sequencer only borrows them for the duration of one acquisition.
//! The session types below restore what an acquisition changed,
//! on every exit path including early returns and panics.

use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Camera,
    Projector,
    MotorStage,
    Visibility,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Camera => write!(f, "camera"),
            DeviceKind::Projector => write!(f, "projector"),
            DeviceKind::MotorStage => write!(f, "motor stage"),
            DeviceKind::Visibility => write!(f, "visibility guard"),
        }
    }
}

/// Failure reported by a device capability.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Device error ({device}): {message}")]
pub struct DeviceError {
    pub device: DeviceKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(device: DeviceKind, message: impl Into<String>) -> Self {
        Self {
            device,
            message: message.into(),
        }
    }
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FringeType {
    Sinusoidal,
    Binary,
}

/// Configuration of one projector channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FringeChannel {
    pub stripe_count: f32,
    pub phase: f32,
    pub rotation: f32,
    pub intensity: f32,
    pub noise: f32,
    pub fringe_type: FringeType,
}

impl Default for FringeChannel {
    fn default() -> Self {
        Self {
            stripe_count: 16.0,
            phase: 0.0,
            rotation: 0.0,
            intensity: 1.0,
            noise: 0.0,
            fringe_type: FringeType::Sinusoidal,
        }
    }
}

pub trait Camera {
    /// (width, height) in pixels.
    fn resolution(&self) -> (usize, usize);
    fn channels(&self) -> usize;
    /// Blocking capture of one frame with values normalized in [0,1].
    fn capture(&mut self) -> DeviceResult<Frame>;
}

pub trait Projector {
    /// (width, height) in pixels.
    fn resolution(&self) -> (usize, usize);
    fn channels(&self) -> usize;
    fn channel(&self, index: usize) -> DeviceResult<FringeChannel>;
    fn set_channel(&mut self, index: usize, settings: FringeChannel) -> DeviceResult<()>;
    /// Apply the current configuration.
    /// May be a no-op if the backend reads the configuration live.
    fn display(&mut self) -> DeviceResult<()>;
}

pub trait MotorStage {
    fn min_height(&self) -> f32;
    fn max_height(&self) -> f32;
    fn steps(&self) -> usize;
    /// Current height of the stage.
    fn height(&self) -> f32;
    fn set_height(&mut self, value: f32) -> DeviceResult<()>;
}

/// Makes the measured subject absent from reference captures.
pub trait Visibility {
    fn hide(&mut self) -> DeviceResult<()>;
    fn show(&mut self) -> DeviceResult<()>;
}

/// Visibility guard built from a pair of closures.
pub struct FnVisibility<H, S> {
    hide: H,
    show: S,
}

impl<H, S> FnVisibility<H, S>
where
    H: FnMut() -> DeviceResult<()>,
    S: FnMut() -> DeviceResult<()>,
{
    pub fn new(hide: H, show: S) -> Self {
        Self { hide, show }
    }
}

impl<H, S> Visibility for FnVisibility<H, S>
where
    H: FnMut() -> DeviceResult<()>,
    S: FnMut() -> DeviceResult<()>,
{
    fn hide(&mut self) -> DeviceResult<()> {
        (self.hide)()
    }
    fn show(&mut self) -> DeviceResult<()> {
        (self.show)()
    }
}

// Sessions --------------------------------------------------------------------
// -----------------------------------------------------------------------------

/// Subject hidden for the lifetime of the session.
///
/// `release` shows it again and reports failures,
/// dropping an unreleased session shows it and only logs failures.
pub struct HiddenSubject<'a, V: Visibility + ?Sized> {
    guard: Option<&'a mut V>,
}

impl<'a, V: Visibility + ?Sized> HiddenSubject<'a, V> {
    /// Hide the subject. If hiding fails, `show` is still called
    /// so that calls stay paired, and the hiding error is returned.
    pub fn hide(guard: Option<&'a mut V>) -> DeviceResult<Self> {
        match guard {
            None => Ok(Self { guard: None }),
            Some(g) => match g.hide() {
                Ok(()) => Ok(Self { guard: Some(g) }),
                Err(err) => {
                    if let Err(show_err) = g.show() {
                        log::error!("Restoring visibility failed: {}", show_err);
                    }
                    Err(err)
                }
            },
        }
    }

    pub fn release(mut self) -> DeviceResult<()> {
        match self.guard.take() {
            Some(g) => g.show(),
            None => Ok(()),
        }
    }
}

impl<V: Visibility + ?Sized> Drop for HiddenSubject<'_, V> {
    fn drop(&mut self) {
        if let Some(g) = self.guard.take() {
            if let Err(err) = g.show() {
                log::error!("Restoring visibility failed: {}", err);
            }
        }
    }
}

/// Motor stage borrowed for a sweep, homed to its initial height on release.
pub struct StageSession<'a, S: MotorStage + ?Sized> {
    stage: Option<&'a mut S>,
    home: f32,
}

impl<'a, S: MotorStage + ?Sized> StageSession<'a, S> {
    pub fn new(stage: &'a mut S) -> Self {
        let home = stage.height();
        Self {
            stage: Some(stage),
            home,
        }
    }

    pub fn move_to(&mut self, height: f32) -> DeviceResult<()> {
        match self.stage.as_deref_mut() {
            Some(stage) => {
                log::info!("Moving stage to {}", height);
                stage.set_height(height)
            }
            None => Ok(()),
        }
    }

    pub fn release(mut self) -> DeviceResult<()> {
        match self.stage.take() {
            Some(stage) => stage.set_height(self.home),
            None => Ok(()),
        }
    }
}

impl<S: MotorStage + ?Sized> Drop for StageSession<'_, S> {
    fn drop(&mut self) {
        if let Some(stage) = self.stage.take() {
            if let Err(err) = stage.set_height(self.home) {
                log::error!("Homing the motor stage failed: {}", err);
            }
        }
    }
}

/// Projector whose channel configurations are restored on release.
pub struct ProjectorSession<'a, P: Projector + ?Sized> {
    projector: &'a mut P,
    saved: Vec<FringeChannel>,
    released: bool,
}

impl<'a, P: Projector + ?Sized> ProjectorSession<'a, P> {
    pub fn new(projector: &'a mut P) -> DeviceResult<Self> {
        let saved = (0..projector.channels())
            .map(|i| projector.channel(i))
            .collect::<DeviceResult<Vec<_>>>()?;
        Ok(Self {
            projector,
            saved,
            released: false,
        })
    }

    /// Configuration of the channel before the session started.
    pub fn saved(&self, index: usize) -> Option<&FringeChannel> {
        self.saved.get(index)
    }

    /// Restore every channel, even after a failure, and return the first error.
    fn restore(&mut self) -> DeviceResult<()> {
        self.released = true;
        let mut first_error = None;
        for (i, settings) in self.saved.iter().enumerate() {
            if let Err(err) = self.projector.set_channel(i, *settings) {
                log::error!("Restoring projector channel {} failed: {}", i, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn release(mut self) -> DeviceResult<()> {
        self.restore()
    }
}

impl<P: Projector + ?Sized> Deref for ProjectorSession<'_, P> {
    type Target = P;
    fn deref(&self) -> &P {
        &*self.projector
    }
}

impl<P: Projector + ?Sized> DerefMut for ProjectorSession<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut *self.projector
    }
}

impl<P: Projector + ?Sized> Drop for ProjectorSession<'_, P> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.restore() {
                log::error!("Restoring projector channels failed: {}", err);
            }
        }
    }
}
