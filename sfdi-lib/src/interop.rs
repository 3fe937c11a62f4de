// SPDX-License-Identifier: MPL-2.0

//! Interoperability conversions between the image, matrix and frame types.

use crate::frame::Frame;
use image::{DynamicImage, ImageBuffer, Luma, Primitive, Rgb};
use nalgebra::{DMatrix, Scalar};

// Convert a DMatrix into an Image ---------------------------------------------
// -----------------------------------------------------------------------------

/// Convert a matrix into a gray level image.
/// Inverse operation of `matrix_from_image`.
///
/// This performs a transposition to accomodate for the
/// column major matrix into the row major image.
#[allow(clippy::cast_possible_truncation)]
pub fn image_from_matrix<T: Scalar + Primitive>(mat: &DMatrix<T>) -> ImageBuffer<Luma<T>, Vec<T>> {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = ImageBuffer::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        *pixel = Luma([mat[(y as usize, x as usize)]]);
    }
    img_buf
}

/// Convert a `(T,T,T)` RGB matrix into an RGB image.
/// Inverse operation of matrix_from_rgb_image.
#[allow(clippy::cast_possible_truncation)]
pub fn rgb_from_matrix<T: Scalar + Primitive>(
    mat: &DMatrix<(T, T, T)>,
) -> ImageBuffer<Rgb<T>, Vec<T>> {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = ImageBuffer::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        let (r, g, b) = mat[(y as usize, x as usize)];
        *pixel = Rgb([r, g, b]);
    }
    img_buf
}

pub trait ToImage {
    fn to_image(&self) -> DynamicImage;
}

impl ToImage for DMatrix<u16> {
    fn to_image(&self) -> DynamicImage {
        DynamicImage::ImageLuma16(image_from_matrix(self))
    }
}

impl ToImage for DMatrix<(u16, u16, u16)> {
    fn to_image(&self) -> DynamicImage {
        DynamicImage::ImageRgb16(rgb_from_matrix(self))
    }
}

/// Frames are written with 16 bits per channel,
/// values outside of [0,1] are clamped.
impl ToImage for Frame {
    fn to_image(&self) -> DynamicImage {
        match self {
            Frame::Gray(m) => m.map(to_u16).to_image(),
            Frame::Rgb(m) => m.map(|(r, g, b)| (to_u16(r), to_u16(g), to_u16(b))).to_image(),
        }
    }
}

fn to_u16(x: f32) -> u16 {
    (x.max(0.0).min(1.0) * 65535.0).round() as u16
}

/// Rescale a matrix linearly such that its values span [0,1].
/// A constant matrix maps to zeros.
pub fn normalized(mat: &DMatrix<f32>) -> DMatrix<f32> {
    let min = mat.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = mat.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return DMatrix::zeros(mat.nrows(), mat.ncols());
    }
    mat.map(|x| (x - min) / range)
}

// Convert an Image into a DMatrix ---------------------------------------------
// -----------------------------------------------------------------------------

/// Convert a gray image into a matrix.
/// Inverse operation of `image_from_matrix`.
pub fn matrix_from_image<T: Scalar + Primitive>(img: ImageBuffer<Luma<T>, Vec<T>>) -> DMatrix<T> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Convert an RGB image into a `(T, T, T)` RGB matrix.
/// Inverse operation of `rgb_from_matrix`.
pub fn matrix_from_rgb_image<T: Scalar + Primitive>(
    img: ImageBuffer<Rgb<T>, Vec<T>>,
) -> DMatrix<(T, T, T)> {
    // TODO: avoid the intermediate allocation of the transposition.
    let (width, height) = img.dimensions();
    DMatrix::from_iterator(
        width as usize,
        height as usize,
        img.as_raw().chunks_exact(3).map(|s| (s[0], s[1], s[2])),
    )
    .transpose()
}

/// Convert any image into a frame with values in [0,1].
/// Images with color become RGB frames, the others gray frames.
pub fn frame_from_image(img: DynamicImage) -> Frame {
    let scale = 1.0 / 65535.0;
    if img.color().has_color() {
        let mat = matrix_from_rgb_image(img.into_rgb16());
        Frame::Rgb(mat.map(|(r, g, b)| (r as f32 * scale, g as f32 * scale, b as f32 * scale)))
    } else {
        let mat = matrix_from_image(img.into_luma16());
        Frame::Gray(mat.map(|v| v as f32 * scale))
    }
}
