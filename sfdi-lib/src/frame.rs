// SPDX-License-Identifier: MPL-2.0

//! Captured images, stored as column-major matrices of `f32` in [0,1].

use nalgebra::DMatrix;

pub type Rgb = (f32, f32, f32);

/// One captured image, gray (H×W) or color (H×W×3).
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Gray(DMatrix<f32>),
    Rgb(DMatrix<Rgb>),
}

impl Frame {
    /// (rows, columns) of the image, i.e. (height, width).
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Frame::Gray(m) => m.shape(),
            Frame::Rgb(m) => m.shape(),
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Frame::Gray(_) => 1,
            Frame::Rgb(_) => 3,
        }
    }

    /// Extract a single channel as a gray matrix.
    /// A gray frame returns itself for any channel index.
    pub fn channel(&self, index: usize) -> DMatrix<f32> {
        match self {
            Frame::Gray(m) => m.clone(),
            Frame::Rgb(m) => m.map(|(r, g, b)| match index {
                0 => r,
                1 => g,
                _ => b,
            }),
        }
    }

    /// Luminance of the frame (Rec.ITU-R BT.601-7).
    pub fn to_gray(&self) -> DMatrix<f32> {
        match self {
            Frame::Gray(m) => m.clone(),
            Frame::Rgb(m) => crate::utils::rgb_to_gray(m),
        }
    }
}

impl From<DMatrix<f32>> for Frame {
    fn from(m: DMatrix<f32>) -> Self {
        Frame::Gray(m)
    }
}

impl From<DMatrix<Rgb>> for Frame {
    fn from(m: DMatrix<Rgb>) -> Self {
        Frame::Rgb(m)
    }
}
