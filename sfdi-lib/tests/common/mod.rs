// SPDX-License-Identifier: MPL-2.0

//! Virtual rig: a projector, camera, motor stage and visibility guard
//! sharing one scene, recording every device call.

#![allow(dead_code)]

use nalgebra::DMatrix;
use sfdi_lib::frame::Frame;
use sfdi_lib::hardware::{
    Camera, DeviceError, DeviceKind, DeviceResult, FringeChannel, FringeType, MotorStage,
    Projector, Visibility,
};
use sfdi_lib::utils::TWO_PI;
use std::cell::RefCell;
use std::rc::Rc;

/// Phase change per unit of height.
pub const PHASE_PER_HEIGHT: f32 = 10.0;
pub const ROWS: usize = 24;
pub const COLS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Hide,
    Show,
    Move(f32),
    SetChannel(usize),
    Display,
    Capture,
}

pub struct Scene {
    pub stage_height: f32,
    pub subject_visible: bool,
    /// Height of the subject above the stage plane.
    pub subject: DMatrix<f32>,
    pub channels: Vec<FringeChannel>,
    pub displayed: Vec<FringeChannel>,
    pub events: Vec<Event>,
}

pub type SharedScene = Rc<RefCell<Scene>>;

pub fn scene(subject: DMatrix<f32>) -> SharedScene {
    let channels = vec![FringeChannel::default(); 3];
    Rc::new(RefCell::new(Scene {
        stage_height: 0.0,
        subject_visible: true,
        subject,
        displayed: channels.clone(),
        channels,
        events: Vec::new(),
    }))
}

pub fn flat_scene() -> SharedScene {
    scene(DMatrix::zeros(ROWS, COLS))
}

/// Smooth bump, small enough to keep phase gradients unwrappable.
pub fn bump(amplitude: f32) -> DMatrix<f32> {
    let (r0, c0) = (ROWS as f32 / 2.0, COLS as f32 / 2.0);
    DMatrix::from_fn(ROWS, COLS, |r, c| {
        let d2 = (r as f32 - r0).powi(2) + (c as f32 - c0).powi(2);
        amplitude * (-d2 / 60.0).exp()
    })
}

impl Scene {
    pub fn count(&self, event: &Event) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    fn z(&self, r: usize, c: usize) -> f32 {
        let subject = if self.subject_visible {
            self.subject[(r, c)]
        } else {
            0.0
        };
        self.stage_height + subject
    }

    fn intensity(&self, channel: usize, r: usize, c: usize) -> f32 {
        let s = &self.displayed[channel];
        let u = (c as f32 * s.rotation.cos() + r as f32 * s.rotation.sin()) / COLS as f32;
        let phase = TWO_PI * s.stripe_count * u + s.phase + PHASE_PER_HEIGHT * self.z(r, c);
        match s.fringe_type {
            FringeType::Sinusoidal => 0.5 * s.intensity * (1.0 + phase.cos()),
            FringeType::Binary if phase.cos() >= 0.0 => s.intensity,
            FringeType::Binary => 0.0,
        }
    }
}

pub struct VirtualProjector {
    pub scene: SharedScene,
}

impl Projector for VirtualProjector {
    fn resolution(&self) -> (usize, usize) {
        (1280, 720)
    }
    fn channels(&self) -> usize {
        3
    }
    fn channel(&self, index: usize) -> DeviceResult<FringeChannel> {
        self.scene
            .borrow()
            .channels
            .get(index)
            .copied()
            .ok_or_else(|| DeviceError::new(DeviceKind::Projector, "no such channel"))
    }
    fn set_channel(&mut self, index: usize, settings: FringeChannel) -> DeviceResult<()> {
        let mut scene = self.scene.borrow_mut();
        scene.events.push(Event::SetChannel(index));
        scene.channels[index] = settings;
        Ok(())
    }
    fn display(&mut self) -> DeviceResult<()> {
        let mut scene = self.scene.borrow_mut();
        scene.events.push(Event::Display);
        scene.displayed = scene.channels.clone();
        Ok(())
    }
}

pub struct VirtualCamera {
    pub scene: SharedScene,
    pub rgb: bool,
    /// Fail the capture with this index (counting from 0).
    pub fail_at: Option<usize>,
    pub captured: usize,
}

impl VirtualCamera {
    pub fn gray(scene: &SharedScene) -> Self {
        Self {
            scene: scene.clone(),
            rgb: false,
            fail_at: None,
            captured: 0,
        }
    }

    pub fn rgb(scene: &SharedScene) -> Self {
        Self {
            rgb: true,
            ..Self::gray(scene)
        }
    }

    pub fn failing_at(scene: &SharedScene, frame: usize) -> Self {
        Self {
            fail_at: Some(frame),
            ..Self::gray(scene)
        }
    }
}

impl Camera for VirtualCamera {
    fn resolution(&self) -> (usize, usize) {
        (COLS, ROWS)
    }
    fn channels(&self) -> usize {
        if self.rgb {
            3
        } else {
            1
        }
    }
    fn capture(&mut self) -> DeviceResult<Frame> {
        let index = self.captured;
        self.captured += 1;
        let mut scene = self.scene.borrow_mut();
        scene.events.push(Event::Capture);
        if self.fail_at == Some(index) {
            return Err(DeviceError::new(DeviceKind::Camera, "sensor unplugged"));
        }
        let scene = &*scene;
        Ok(if self.rgb {
            Frame::Rgb(DMatrix::from_fn(ROWS, COLS, |r, c| {
                (
                    scene.intensity(0, r, c),
                    scene.intensity(1, r, c),
                    scene.intensity(2, r, c),
                )
            }))
        } else {
            Frame::Gray(DMatrix::from_fn(ROWS, COLS, |r, c| scene.intensity(0, r, c)))
        })
    }
}

pub struct VirtualStage {
    pub scene: SharedScene,
}

impl MotorStage for VirtualStage {
    fn min_height(&self) -> f32 {
        0.0
    }
    fn max_height(&self) -> f32 {
        0.5
    }
    fn steps(&self) -> usize {
        11
    }
    fn height(&self) -> f32 {
        self.scene.borrow().stage_height
    }
    fn set_height(&mut self, value: f32) -> DeviceResult<()> {
        let mut scene = self.scene.borrow_mut();
        scene.events.push(Event::Move(value));
        scene.stage_height = value;
        Ok(())
    }
}

pub struct SubjectGuard {
    pub scene: SharedScene,
}

impl Visibility for SubjectGuard {
    fn hide(&mut self) -> DeviceResult<()> {
        let mut scene = self.scene.borrow_mut();
        scene.events.push(Event::Hide);
        scene.subject_visible = false;
        Ok(())
    }
    fn show(&mut self) -> DeviceResult<()> {
        let mut scene = self.scene.borrow_mut();
        scene.events.push(Event::Show);
        scene.subject_visible = true;
        Ok(())
    }
}
