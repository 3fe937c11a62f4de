// SPDX-License-Identifier: MPL-2.0

use super::PhaseUnwrap;
use crate::error::Result;
use crate::registry::StrategySpec;
use crate::utils::{wrap_phase, TWO_PI};
use nalgebra::DMatrix;
use std::cmp::Ordering;

/// Reliability guided unwrapping, merging pixels along the most reliable
/// edges first. Reliability is based on second differences of the wrapped phase
/// (Herráez et al., 2002).
///
/// With `wrap_around`, the first and last columns are neighbours,
/// for captures known to be continuous across the image border.
#[derive(Debug, Clone, Default)]
pub struct ReliabilityUnwrap {
    pub wrap_around: bool,
}

impl ReliabilityUnwrap {
    pub const NAME: &'static str = "reliability";

    pub fn new(wrap_around: bool) -> Self {
        Self { wrap_around }
    }

    pub fn from_spec(spec: &StrategySpec) -> Result<Self> {
        Ok(Self::new(spec.bool("wrap_around", false)?))
    }

    /// Second difference magnitude, infinite on borders.
    fn discontinuity(&self, phi: &DMatrix<f32>, r: usize, c: usize) -> f32 {
        let (rows, cols) = phi.shape();
        if r == 0 || r + 1 >= rows || cols < 3 {
            return f32::INFINITY;
        }
        let (left, right) = if c > 0 && c + 1 < cols {
            (c - 1, c + 1)
        } else if self.wrap_around {
            ((c + cols - 1) % cols, (c + 1) % cols)
        } else {
            return f32::INFINITY;
        };
        let p = phi[(r, c)];
        let second = |a: f32, b: f32| wrap_phase(a - p) - wrap_phase(p - b);
        let h = second(phi[(r, left)], phi[(r, right)]);
        let v = second(phi[(r - 1, c)], phi[(r + 1, c)]);
        let d1 = second(phi[(r - 1, left)], phi[(r + 1, right)]);
        let d2 = second(phi[(r - 1, right)], phi[(r + 1, left)]);
        (h * h + v * v + d1 * d1 + d2 * d2).sqrt()
    }
}

impl PhaseUnwrap for ReliabilityUnwrap {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(Self::NAME).with("wrap_around", self.wrap_around)
    }

    fn unwrap_phase(&self, wrapped: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        let (rows, cols) = wrapped.shape();
        if rows * cols == 0 {
            return Ok(wrapped.clone());
        }
        // Column-major indices, same as the matrix storage.
        let idx = |r: usize, c: usize| c * rows + r;
        let phi: Vec<f32> = wrapped.iter().cloned().collect();
        let disc: Vec<f32> = (0..cols)
            .flat_map(|c| (0..rows).map(move |r| (r, c)))
            .map(|(r, c)| self.discontinuity(wrapped, r, c))
            .collect();

        let mut edges = Vec::with_capacity(2 * rows * cols);
        for c in 0..cols {
            for r in 0..rows {
                if c + 1 < cols {
                    edges.push((idx(r, c), idx(r, c + 1)));
                } else if self.wrap_around && cols > 2 {
                    edges.push((idx(r, c), idx(r, 0)));
                }
                if r + 1 < rows {
                    edges.push((idx(r, c), idx(r + 1, c)));
                }
            }
        }
        // Lowest discontinuity first, stable for reproducible merges.
        edges.sort_by(|&(a1, b1), &(a2, b2)| {
            (disc[a1] + disc[b1])
                .partial_cmp(&(disc[a2] + disc[b2]))
                .unwrap_or(Ordering::Equal)
        });

        let mut group_of: Vec<usize> = (0..phi.len()).collect();
        let mut members: Vec<Vec<usize>> = (0..phi.len()).map(|i| vec![i]).collect();
        let mut turns = vec![0_i32; phi.len()];
        for (a, b) in edges {
            let (ga, gb) = (group_of[a], group_of[b]);
            if ga == gb {
                continue;
            }
            let va = phi[a] + TWO_PI * turns[a] as f32;
            let vb = phi[b] + TWO_PI * turns[b] as f32;
            let n = ((va - vb) / TWO_PI).round() as i32;
            // Move the smaller group into the larger one.
            let (keep, moved, shift) = if members[ga].len() >= members[gb].len() {
                (ga, gb, n)
            } else {
                (gb, ga, -n)
            };
            let moved_members = std::mem::take(&mut members[moved]);
            for &p in &moved_members {
                turns[p] += shift;
                group_of[p] = keep;
            }
            members[keep].extend(moved_members);
        }

        Ok(DMatrix::from_iterator(
            rows,
            cols,
            phi.iter()
                .zip(turns.iter())
                .map(|(&p, &k)| p + TWO_PI * k as f32),
        ))
    }
}

/// Scan line unwrapping: down the first column, then along every row.
/// Fast but sensitive to noise, suitable for clean captures.
#[derive(Debug, Clone, Default)]
pub struct ItohUnwrap;

impl ItohUnwrap {
    pub const NAME: &'static str = "itoh";
}

impl PhaseUnwrap for ItohUnwrap {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(Self::NAME)
    }

    fn unwrap_phase(&self, wrapped: &DMatrix<f32>) -> Result<DMatrix<f32>> {
        let (rows, cols) = wrapped.shape();
        let mut out = wrapped.clone();
        if cols == 0 {
            return Ok(out);
        }
        for r in 1..rows {
            out[(r, 0)] = out[(r - 1, 0)] + wrap_phase(wrapped[(r, 0)] - wrapped[(r - 1, 0)]);
        }
        for r in 0..rows {
            for c in 1..cols {
                out[(r, c)] =
                    out[(r, c - 1)] + wrap_phase(wrapped[(r, c)] - wrapped[(r, c - 1)]);
            }
        }
        Ok(out)
    }
}
