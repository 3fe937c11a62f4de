// SPDX-License-Identifier: MPL-2.0

//! Region of interest applied to frames before decoding.

use crate::error::{Error, Result};
use crate::frame::Frame;
use nalgebra::{DMatrix, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl Crop {
    /// Centered region of `width × height` pixels
    /// inside an image of `shape` (rows, columns).
    pub fn centered(width: usize, height: usize, shape: (usize, usize)) -> Result<Self> {
        let (rows, cols) = shape;
        if width == 0 || height == 0 || width > cols || height > rows {
            return Err(Error::InvalidCrop(format!(
                "centered {}x{} region does not fit in {}x{}",
                width, height, cols, rows
            )));
        }
        let left = (cols - width) / 2;
        let top = (rows - height) / 2;
        Ok(Crop {
            left,
            top,
            right: left + width,
            bottom: top + height,
        })
    }

    pub fn apply(&self, frame: &Frame) -> Result<Frame> {
        Ok(match frame {
            Frame::Gray(m) => Frame::Gray(crop(*self, m)?),
            Frame::Rgb(m) => Frame::Rgb(crop(*self, m)?),
        })
    }
}

/// Parse "x1,y1,x2,y2" parts.
impl TryFrom<Vec<&str>> for Crop {
    type Error = Error;
    fn try_from(vs: Vec<&str>) -> Result<Self> {
        if vs.len() != 4 {
            return Err(Error::InvalidCrop(format!(
                "expected 4 coordinates but got {}",
                vs.len()
            )));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|e| Error::InvalidCrop(format!("\"{}\": {}", s, e)))
        };
        Ok(Crop {
            left: parse(vs[0])?,
            top: parse(vs[1])?,
            right: parse(vs[2])?,
            bottom: parse(vs[3])?,
        })
    }
}

pub fn crop<T: Scalar>(frame: Crop, img: &DMatrix<T>) -> Result<DMatrix<T>> {
    let Crop {
        left,
        top,
        right,
        bottom,
    } = frame;
    let (height, width) = img.shape();

    // Check that the frame coordinates make sense.
    let invalid = |msg: String| Err(Error::InvalidCrop(msg));
    if right > width {
        return invalid(format!("right > width ({} > {})", right, width));
    }
    if bottom > height {
        return invalid(format!("bottom > height ({} > {})", bottom, height));
    }
    if left >= right {
        return invalid(format!("left >= right ({} >= {})", left, right));
    }
    if top >= bottom {
        return invalid(format!("top >= bottom ({} >= {})", top, bottom));
    }
    let nrows = bottom - top;
    let ncols = right - left;
    Ok(img.slice((top, left), (nrows, ncols)).into_owned())
}
