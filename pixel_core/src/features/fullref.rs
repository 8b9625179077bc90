//! Full-reference calculators: frame-pair comparisons.
//!
//! These require a time-aligned reference/distorted pair per step;
//! feeding them single frames is a configuration error (the registry
//! only hands them out for full-reference model variants).

use super::{mean_abs_diff, plane_stats, sequence_accessors, FeatureCalculator};
use crate::errors::{PixelError, Result};
use crate::frame::{Frame, FrameInput};

/// PSNR value reported for a bit-exact frame pair.
const PSNR_CAP: f64 = 100.0;

fn require_pair<'a>(input: &'a FrameInput, feature: &str) -> Result<(&'a Frame, &'a Frame)> {
    input.pair().ok_or_else(|| {
        PixelError::Configuration(format!(
            "feature '{feature}' requires a reference stream"
        ))
    })
}

/// Per-frame luma PSNR in dB, capped for identical frames.
pub struct Psnr {
    seq: Vec<f64>,
}

impl Psnr {
    pub fn new() -> Self {
        Self { seq: Vec::new() }
    }
}

impl FeatureCalculator for Psnr {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let (reference, distorted) = require_pair(input, "psnr")?;
        let mse = super::mse(&reference.y, &distorted.y);
        let value = if mse <= 0.0 {
            PSNR_CAP
        } else {
            (10.0 * (255.0f64 * 255.0 / mse).log10()).min(PSNR_CAP)
        };
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Per-frame global structural similarity on luma (single-window SSIM
/// with the standard stabilization constants).
pub struct Ssim {
    seq: Vec<f64>,
}

impl Ssim {
    pub fn new() -> Self {
        Self { seq: Vec::new() }
    }

    fn global_ssim(reference: &Frame, distorted: &Frame) -> f64 {
        const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
        const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

        let (mean_r, std_r) = plane_stats(&reference.y);
        let (mean_d, std_d) = plane_stats(&distorted.y);
        let var_r = std_r * std_r;
        let var_d = std_d * std_d;

        let n = reference.y.len().min(distorted.y.len());
        if n == 0 {
            return 0.0;
        }
        let cov = reference
            .y
            .iter()
            .zip(&distorted.y)
            .map(|(&r, &d)| (r as f64 - mean_r) * (d as f64 - mean_d))
            .sum::<f64>()
            / n as f64;

        ((2.0 * mean_r * mean_d + C1) * (2.0 * cov + C2))
            / ((mean_r * mean_r + mean_d * mean_d + C1) * (var_r + var_d + C2))
    }
}

impl FeatureCalculator for Ssim {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let (reference, distorted) = require_pair(input, "ssim")?;
        let value = Self::global_ssim(reference, distorted);
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Pixel-domain visual information fidelity, single scale. 1.0 means
/// all reference information survives in the distorted frame.
pub struct Vifp {
    seq: Vec<f64>,
}

impl Vifp {
    pub fn new() -> Self {
        Self { seq: Vec::new() }
    }

    fn vifp(reference: &Frame, distorted: &Frame) -> f64 {
        // neural noise floor of the VIF model
        const SIGMA_N: f64 = 2.0;
        const EPS: f64 = 1e-10;

        let (mean_r, std_r) = plane_stats(&reference.y);
        let (mean_d, std_d) = plane_stats(&distorted.y);
        let var_r = std_r * std_r;
        let var_d = std_d * std_d;

        if var_r <= EPS {
            // no reference information to lose
            return 1.0;
        }

        let n = reference.y.len().min(distorted.y.len());
        let cov = reference
            .y
            .iter()
            .zip(&distorted.y)
            .map(|(&r, &d)| (r as f64 - mean_r) * (d as f64 - mean_d))
            .sum::<f64>()
            / n as f64;

        let g = cov / (var_r + EPS);
        let sv = (var_d - g * cov).max(0.0);

        let num = (1.0 + g * g * var_r / (sv + SIGMA_N)).log2();
        let den = (1.0 + var_r / SIGMA_N).log2();
        (num / den).clamp(0.0, 1.0)
    }
}

impl FeatureCalculator for Vifp {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let (reference, distorted) = require_pair(input, "vifp")?;
        let value = Self::vifp(reference, distorted);
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Frame-rate consistency: flags frames that actually changed against
/// the previous distorted frame. Frame-doubled upsampled content pools
/// to a mean well below 1.
pub struct FpsConsistency {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl FpsConsistency {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for FpsConsistency {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => {
                if mean_abs_diff(&frame.y, &prev.y) > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            None => 1.0,
        };
        self.prev = Some(frame.clone());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(reference_luma: u8, distorted_luma: u8) -> FrameInput {
        FrameInput::Pair {
            reference: Frame::flat(32, 32, reference_luma),
            distorted: Frame::flat(32, 32, distorted_luma),
        }
    }

    #[test]
    fn test_psnr_identical_frames_capped() {
        let mut psnr = Psnr::new();
        let value = psnr.calc(&pair(90, 90)).unwrap();
        assert_eq!(value, PSNR_CAP);
    }

    #[test]
    fn test_psnr_known_value() {
        let mut psnr = Psnr::new();
        // uniform offset of 10: mse = 100, psnr = 10*log10(255^2/100)
        let value = psnr.calc(&pair(100, 110)).unwrap();
        let expected = 10.0 * (255.0f64 * 255.0 / 100.0).log10();
        assert!((value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_ssim_identical_frames_is_one() {
        let mut ssim = Ssim::new();
        let value = ssim.calc(&pair(120, 120)).unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ssim_degrades_with_distortion() {
        let mut ssim = Ssim::new();
        let close = ssim.calc(&pair(120, 122)).unwrap();
        let far = ssim.calc(&pair(120, 200)).unwrap();
        assert!(far < close);
    }

    #[test]
    fn test_vifp_flat_reference_is_one() {
        let mut vifp = Vifp::new();
        assert_eq!(vifp.calc(&pair(50, 60)).unwrap(), 1.0);
    }

    #[test]
    fn test_pairwise_rejects_single_frames() {
        let single = FrameInput::Single(Frame::flat(32, 32, 10));
        assert!(Psnr::new().calc(&single).is_err());
        assert!(Ssim::new().calc(&single).is_err());
        assert!(Vifp::new().calc(&single).is_err());
    }

    #[test]
    fn test_fps_flags_duplicated_frames() {
        let mut fps = FpsConsistency::new();
        for luma in [10u8, 10, 20, 20] {
            fps.calc(&pair(0, luma)).unwrap();
        }
        assert_eq!(fps.values(), &[1.0, 0.0, 1.0, 0.0]);
    }
}
