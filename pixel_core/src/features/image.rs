//! Per-frame image features.
//!
//! Each calculator here is a pure function of a single (distorted)
//! frame, lifted into the calculator interface by [`ImageFeature`]. In
//! full-reference runs these operate on the distorted side of the pair.

use super::{
    box_blur3, entropy, histogram256, laplacian, mean_f64, mse, plane_mean, plane_stats,
    sequence_accessors, sobel_magnitude, std_f64, FeatureCalculator,
};
use crate::errors::Result;
use crate::frame::{Frame, FrameInput};

/// Wraps a per-frame scalar function as a feature calculator.
pub struct ImageFeature {
    f: fn(&Frame) -> f64,
    seq: Vec<f64>,
}

impl ImageFeature {
    pub fn new(f: fn(&Frame) -> f64) -> Self {
        Self { f, seq: Vec::new() }
    }
}

impl FeatureCalculator for ImageFeature {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let value = (self.f)(input.distorted());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Mean luma level.
pub fn calc_tone(frame: &Frame) -> f64 {
    plane_mean(&frame.y)
}

/// RMS contrast: population standard deviation of luma.
pub fn calc_contrast(frame: &Frame) -> f64 {
    plane_stats(&frame.y).1
}

/// Mean chroma magnitude around the neutral point.
pub fn calc_saturation(frame: &Frame) -> f64 {
    if frame.u.is_empty() {
        return 0.0;
    }
    frame
        .u
        .iter()
        .zip(&frame.v)
        .map(|(&u, &v)| {
            let cu = u as f64 - 128.0;
            let cv = v as f64 - 128.0;
            (cu * cu + cv * cv).sqrt()
        })
        .sum::<f64>()
        / frame.u.len() as f64
}

/// Colorfulness in the Hasler/Suesstrunk spirit, computed on the chroma
/// planes: spread plus weighted offset of the chroma distribution.
pub fn calc_color_fulness(frame: &Frame) -> f64 {
    let (mean_u, std_u) = plane_stats(&frame.u);
    let (mean_v, std_v) = plane_stats(&frame.v);
    let cu = mean_u - 128.0;
    let cv = mean_v - 128.0;
    (std_u * std_u + std_v * std_v).sqrt() + 0.3 * (cu * cu + cv * cv).sqrt()
}

/// Sharpness via the variance of the Laplacian response.
pub fn calc_blur(frame: &Frame) -> f64 {
    let lap = laplacian(&frame.y, frame.width, frame.height);
    let mean = mean_f64(&lap);
    lap.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / lap.len() as f64
}

/// High-frequency energy share: residual energy against a low-pass
/// filtered frame, relative to total AC energy.
pub fn calc_fft(frame: &Frame) -> f64 {
    let blurred = box_blur3(&frame.y, frame.width, frame.height);
    let residual_energy: f64 = frame
        .y
        .iter()
        .zip(&blurred)
        .map(|(&p, &b)| (p as f64 - b).powi(2))
        .sum();
    let (mean, _) = plane_stats(&frame.y);
    let ac_energy: f64 = frame.y.iter().map(|&p| (p as f64 - mean).powi(2)).sum();
    if ac_energy <= 0.0 {
        0.0
    } else {
        residual_energy / ac_energy
    }
}

/// Spatial information: standard deviation of the Sobel magnitude.
pub fn calc_si(frame: &Frame) -> f64 {
    std_f64(&sobel_magnitude(&frame.y, frame.width, frame.height))
}

/// Similarity of the frame to its half-resolution rendition, as a proxy
/// for how much detail survives a UHD→HD downscale. 1.0 means the frame
/// carries no detail beyond HD.
pub fn calc_uhdhdsim(frame: &Frame) -> f64 {
    let down_up = downscale2_upscale(frame);
    1.0 - mse(&frame.y, &down_up) / (255.0 * 255.0)
}

fn downscale2_upscale(frame: &Frame) -> Vec<u8> {
    let (w, h) = (frame.width, frame.height);
    let mut out = vec![0u8; w * h];
    for row in 0..h {
        for col in 0..w {
            // 2x2 block average, then nearest-neighbour back up
            let r0 = (row / 2) * 2;
            let c0 = (col / 2) * 2;
            let r1 = (r0 + 1).min(h - 1);
            let c1 = (c0 + 1).min(w - 1);
            let sum = frame.y[r0 * w + c0] as u32
                + frame.y[r0 * w + c1] as u32
                + frame.y[r1 * w + c0] as u32
                + frame.y[r1 * w + c1] as u32;
            out[row * w + col] = (sum / 4) as u8;
        }
    }
    out
}

/// Blockiness: luma gradient energy on the 8x8 coding grid relative to
/// gradient energy off the grid. Values above 1 indicate visible
/// block boundaries.
pub fn calc_blockiness(frame: &Frame) -> f64 {
    let (w, h) = (frame.width, frame.height);
    let mut on_grid = Vec::new();
    let mut off_grid = Vec::new();
    for row in 0..h {
        for col in 1..w {
            let grad =
                (frame.y[row * w + col] as f64 - frame.y[row * w + col - 1] as f64).abs();
            if col % 8 == 0 {
                on_grid.push(grad);
            } else {
                off_grid.push(grad);
            }
        }
    }
    for col in 0..w {
        for row in 1..h {
            let grad =
                (frame.y[row * w + col] as f64 - frame.y[(row - 1) * w + col] as f64).abs();
            if row % 8 == 0 {
                on_grid.push(grad);
            } else {
                off_grid.push(grad);
            }
        }
    }
    let off = mean_f64(&off_grid);
    if off <= 0.0 {
        0.0
    } else {
        mean_f64(&on_grid) / off
    }
}

/// Noise level: mean absolute high-pass residual.
pub fn calc_noise(frame: &Frame) -> f64 {
    let blurred = box_blur3(&frame.y, frame.width, frame.height);
    frame
        .y
        .iter()
        .zip(&blurred)
        .map(|(&p, &b)| (p as f64 - b).abs())
        .sum::<f64>()
        / frame.y.len() as f64
}

/// Naturalness index: excess kurtosis of the normalized luma
/// distribution. Natural scenes are near zero, heavily processed
/// content drifts away.
pub fn calc_niqe(frame: &Frame) -> f64 {
    let z = normalized_luma(frame);
    let std = std_f64(&z);
    if std <= 0.0 {
        return 0.0;
    }
    let mean = mean_f64(&z);
    let m4 = z.iter().map(|v| ((v - mean) / std).powi(4)).sum::<f64>() / z.len() as f64;
    m4 - 3.0
}

/// Contrast-entropy image quality: Shannon entropy of the luma
/// histogram.
pub fn calc_ceiq(frame: &Frame) -> f64 {
    entropy(&histogram256(&frame.y))
}

/// Spatial naturalness: variance of the normalized luma distribution.
pub fn calc_brisque(frame: &Frame) -> f64 {
    let z = normalized_luma(frame);
    let mean = mean_f64(&z);
    z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / z.len() as f64
}

fn normalized_luma(frame: &Frame) -> Vec<f64> {
    let (mean, std) = plane_stats(&frame.y);
    frame
        .y
        .iter()
        .map(|&p| (p as f64 - mean) / (std + 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame() -> Frame {
        let mut frame = Frame::flat(16, 16, 0);
        for row in 0..16 {
            for col in 0..16 {
                frame.y[row * 16 + col] = (col * 16) as u8;
            }
        }
        frame
    }

    #[test]
    fn test_tone_and_contrast_flat_frame() {
        let frame = Frame::flat(16, 16, 128);
        assert_eq!(calc_tone(&frame), 128.0);
        assert_eq!(calc_contrast(&frame), 0.0);
    }

    #[test]
    fn test_contrast_positive_on_gradient() {
        assert!(calc_contrast(&gradient_frame()) > 0.0);
    }

    #[test]
    fn test_saturation_neutral_chroma_is_zero() {
        let frame = Frame::flat(16, 16, 128);
        assert_eq!(calc_saturation(&frame), 0.0);
        assert_eq!(calc_color_fulness(&frame), 0.0);
    }

    #[test]
    fn test_blur_flat_frame_is_zero() {
        assert_eq!(calc_blur(&Frame::flat(16, 16, 77)), 0.0);
        assert!(calc_blur(&gradient_frame()) > 0.0);
    }

    #[test]
    fn test_uhdhdsim_flat_frame_is_perfect() {
        assert_eq!(calc_uhdhdsim(&Frame::flat(16, 16, 50)), 1.0);
    }

    #[test]
    fn test_ceiq_flat_frame_zero_entropy() {
        assert_eq!(calc_ceiq(&Frame::flat(16, 16, 9)), 0.0);
        assert!(calc_ceiq(&gradient_frame()) > 0.0);
    }

    #[test]
    fn test_image_feature_accumulates_per_frame() {
        let mut feature = ImageFeature::new(calc_tone);
        for luma in [10u8, 20, 30] {
            let input = FrameInput::Single(Frame::flat(8, 8, luma));
            feature.calc(&input).unwrap();
        }
        assert_eq!(feature.values(), &[10.0, 20.0, 30.0]);
    }
}
