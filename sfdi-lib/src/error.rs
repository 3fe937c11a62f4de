// SPDX-License-Identifier: MPL-2.0

//! Error kinds surfaced by every operation of the crate.

use crate::hardware::DeviceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid pattern plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Invalid frame count: expected {expected} frames per group but got {actual}")]
    InvalidFrameCount { expected: usize, actual: usize },
    #[error("A calibration named \"{0}\" already exists")]
    DuplicateCalibrationName(String),
    #[error("No entry named \"{0}\"")]
    NotFound(String),
    #[error("Missing hardware: {0}")]
    MissingHardware(String),
    #[error("Incompatible plan: {0}")]
    IncompatiblePlan(String),
    #[error("Acquisition cancelled")]
    Cancelled,
    #[error("Unknown {kind} strategy \"{name}\"")]
    UnknownStrategy { kind: &'static str, name: String },
    #[error("Invalid strategy option: {0}")]
    InvalidOption(String),
    #[error("Model fitting failed: {0}")]
    Fit(String),
    #[error("Invalid name \"{0}\": names must be non-empty and contain no path separator")]
    InvalidName(String),
    #[error("Unsupported artifact version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Invalid crop frame coordinates: {0}")]
    InvalidCrop(String),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Error (de)serializing json")]
    Serde(#[from] serde_json::Error),
    #[error("Error reading or writing image")]
    Image(#[from] image::ImageError),
}
