// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper module for functions that didn't fit anywhere else.

use nalgebra::DMatrix;
use std::f32::consts::PI;

pub const TWO_PI: f32 = 2.0 * PI;

/// Same as rgb2gray matlab function, for f32 values in [0,1].
pub fn rgb_to_gray(rgb: &DMatrix<(f32, f32, f32)>) -> DMatrix<f32> {
    rgb.map(|(r, g, b)| 0.2989 * r + 0.5870 * g + 0.1140 * b)
}

/// Wrap a phase value into [-π, π].
pub fn wrap_phase(x: f32) -> f32 {
    x - TWO_PI * (x / TWO_PI).round()
}

/// Pixel-wise mean of matrices sharing one shape.
/// Returns `None` for an empty slice.
pub fn mean_of(matrices: &[DMatrix<f32>]) -> Option<DMatrix<f32>> {
    let (first, rest) = matrices.split_first()?;
    let mut sum = first.clone();
    for m in rest {
        sum += m;
    }
    Some(sum / matrices.len() as f32)
}

/// Mean of all the values of a matrix (0 when empty).
pub fn mean_value(m: &DMatrix<f32>) -> f32 {
    if m.is_empty() {
        0.0
    } else {
        (m.iter().map(|&x| x as f64).sum::<f64>() / m.len() as f64) as f32
    }
}
