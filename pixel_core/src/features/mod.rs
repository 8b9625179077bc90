//! Feature calculators: the capability interface and shared plane math.
//!
//! Every feature in the catalog implements [`FeatureCalculator`]. The
//! three temporal flavors share one `calc` contract:
//!
//! - per-frame calculators derive a value from the current frame alone;
//! - whole-clip calculators carry state across frames (previous frame,
//!   running counts) and are therefore order-dependent;
//! - pairwise calculators require a reference/distorted pair and fail
//!   with a configuration error when fed single frames.
//!
//! One calculator instance is owned by exactly one extraction run; it is
//! never shared across videos.

pub mod fullref;
pub mod image;
pub mod registry;
pub mod temporal;

use std::path::PathBuf;

use crate::cache::CacheSlot;
use crate::errors::Result;
use crate::frame::FrameInput;

pub use registry::{catalog, create_calculator, is_full_reference_feature, ModelVariant};

/// Uniform capability set of every feature calculator.
pub trait FeatureCalculator: Send {
    /// Incremental step, invoked once per frame (or frame pair) in
    /// stream order. Appends exactly one value to the sequence.
    fn calc(&mut self, input: &FrameInput) -> Result<f64>;

    /// Accumulated per-frame value sequence, read-only.
    fn values(&self) -> &[f64];

    /// Replace the sequence with a previously cached one.
    fn restore(&mut self, values: Vec<f64>);

    /// Hydrate from the feature cache; true means the full sequence was
    /// recovered and computation can be skipped for this feature.
    fn load(&mut self, slot: &CacheSlot) -> bool {
        match slot.load() {
            Some(values) => {
                self.restore(values);
                true
            }
            None => false,
        }
    }

    /// Persist the current sequence to the feature cache.
    fn store(&self, slot: &CacheSlot) -> Result<PathBuf> {
        slot.store(self.values())
    }
}

/// Implements the sequence accessors for calculators that keep their
/// per-frame values in a `seq: Vec<f64>` field.
macro_rules! sequence_accessors {
    () => {
        fn values(&self) -> &[f64] {
            &self.seq
        }

        fn restore(&mut self, values: Vec<f64>) {
            self.seq = values;
        }
    };
}
pub(crate) use sequence_accessors;

// ---------------------------------------------------------------------------
// Shared plane math
// ---------------------------------------------------------------------------

pub(crate) fn plane_mean(plane: &[u8]) -> f64 {
    if plane.is_empty() {
        return 0.0;
    }
    plane.iter().map(|&p| p as f64).sum::<f64>() / plane.len() as f64
}

/// Population mean and standard deviation of a plane.
pub(crate) fn plane_stats(plane: &[u8]) -> (f64, f64) {
    if plane.is_empty() {
        return (0.0, 0.0);
    }
    let mean = plane_mean(plane);
    let var = plane
        .iter()
        .map(|&p| (p as f64 - mean).powi(2))
        .sum::<f64>()
        / plane.len() as f64;
    (mean, var.sqrt())
}

pub(crate) fn mean_f64(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub(crate) fn std_f64(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(xs);
    (xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

pub(crate) fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum::<f64>()
        / a.len() as f64
}

pub(crate) fn mse(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
        .sum::<f64>()
        / a.len() as f64
}

/// Normalized 256-bin histogram of a plane.
pub(crate) fn histogram256(plane: &[u8]) -> [f64; 256] {
    let mut hist = [0.0f64; 256];
    for &p in plane {
        hist[p as usize] += 1.0;
    }
    if !plane.is_empty() {
        let n = plane.len() as f64;
        for bin in hist.iter_mut() {
            *bin /= n;
        }
    }
    hist
}

/// Shannon entropy in bits of a normalized histogram.
pub(crate) fn entropy(hist: &[f64]) -> f64 {
    -hist
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.log2())
        .sum::<f64>()
}

/// 3x3 box blur of the luma plane, borders clamped.
pub(crate) fn box_blur3(y: &[u8], width: usize, height: usize) -> Vec<f64> {
    let mut out = vec![0.0; y.len()];
    for row in 0..height {
        for col in 0..width {
            let mut sum = 0.0;
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let r = (row as i64 + dr).clamp(0, height as i64 - 1) as usize;
                    let c = (col as i64 + dc).clamp(0, width as i64 - 1) as usize;
                    sum += y[r * width + c] as f64;
                }
            }
            out[row * width + col] = sum / 9.0;
        }
    }
    out
}

/// 3x3 Laplacian response of the luma plane (interior pixels only on the
/// border are clamped).
pub(crate) fn laplacian(y: &[u8], width: usize, height: usize) -> Vec<f64> {
    let at = |r: i64, c: i64| -> f64 {
        let r = r.clamp(0, height as i64 - 1) as usize;
        let c = c.clamp(0, width as i64 - 1) as usize;
        y[r * width + c] as f64
    };
    let mut out = vec![0.0; y.len()];
    for row in 0..height as i64 {
        for col in 0..width as i64 {
            out[(row as usize) * width + col as usize] = at(row - 1, col)
                + at(row + 1, col)
                + at(row, col - 1)
                + at(row, col + 1)
                - 4.0 * at(row, col);
        }
    }
    out
}

/// Sobel gradient magnitude of the luma plane.
pub(crate) fn sobel_magnitude(y: &[u8], width: usize, height: usize) -> Vec<f64> {
    let at = |r: i64, c: i64| -> f64 {
        let r = r.clamp(0, height as i64 - 1) as usize;
        let c = c.clamp(0, width as i64 - 1) as usize;
        y[r * width + c] as f64
    };
    let mut out = vec![0.0; y.len()];
    for row in 0..height as i64 {
        for col in 0..width as i64 {
            let gx = at(row - 1, col + 1) + 2.0 * at(row, col + 1) + at(row + 1, col + 1)
                - at(row - 1, col - 1)
                - 2.0 * at(row, col - 1)
                - at(row + 1, col - 1);
            let gy = at(row + 1, col - 1) + 2.0 * at(row + 1, col) + at(row + 1, col + 1)
                - at(row - 1, col - 1)
                - 2.0 * at(row - 1, col)
                - at(row - 1, col + 1);
            out[(row as usize) * width + col as usize] = (gx * gx + gy * gy).sqrt();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_stats_flat() {
        let plane = vec![100u8; 16];
        let (mean, std) = plane_stats(&plane);
        assert_eq!(mean, 100.0);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn test_mean_abs_diff() {
        assert_eq!(mean_abs_diff(&[0, 10], &[10, 0]), 10.0);
        assert_eq!(mean_abs_diff(&[5, 5], &[5, 5]), 0.0);
    }

    #[test]
    fn test_entropy_bounds() {
        // single-value plane: zero entropy
        let flat = histogram256(&vec![42u8; 64]);
        assert_eq!(entropy(&flat), 0.0);
        // two equally likely values: one bit
        let two = histogram256(&[0, 255, 0, 255]);
        assert!((entropy(&two) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_laplacian_flat_is_zero() {
        let lap = laplacian(&vec![7u8; 9], 3, 3);
        assert!(lap.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sobel_detects_vertical_edge() {
        // left half dark, right half bright
        #[rustfmt::skip]
        let y = vec![
            0, 0, 255, 255,
            0, 0, 255, 255,
            0, 0, 255, 255,
            0, 0, 255, 255,
        ];
        let mag = sobel_magnitude(&y, 4, 4);
        assert!(mag.iter().any(|&v| v > 0.0));
    }
}
