// SPDX-License-Identifier: MPL-2.0

//! # Structured-light (SFDI) acquisition and calibration
//!
//! Drives a projector/camera pair through a fringe pattern plan,
//! decodes the captured images into phase maps,
//! and maps phase to physical height with a calibrated model.

// #![warn(missing_docs)]

pub mod calibration;
pub mod config;
pub mod crop;
pub mod error;
pub mod frame;
pub mod hardware;
pub mod interop;
pub mod phase;
pub mod plan;
pub mod profilometry;
pub mod reconstruct;
pub mod registry;
pub mod repository;
pub mod sequencer;
pub mod tensor;
pub mod utils;

pub use error::{Error, Result};
