//! Whole-clip calculators: motion, temporal activity, scene structure.
//!
//! These carry state (usually the previous frame) across `calc` calls,
//! which is why the extraction pass must feed frames strictly in stream
//! order and never in parallel. The first frame of a clip has no
//! predecessor; motion-type features emit 0 for it by convention.

use super::{
    entropy, histogram256, mean_abs_diff, sequence_accessors, std_f64, FeatureCalculator,
};
use crate::errors::Result;
use crate::frame::{Frame, FrameInput};

/// Luma histogram L1 distance above which a frame counts as a cut.
const CUT_THRESHOLD: f64 = 0.5;
/// Mean absolute luma difference below which a frame counts as static.
const STATIC_THRESHOLD: f64 = 1.0;
/// Block edge for the block-motion estimator.
const MOTION_BLOCK: usize = 16;

/// Mean absolute luma difference to the previous frame.
pub struct MovementFeatures {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl MovementFeatures {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for MovementFeatures {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => mean_abs_diff(&frame.y, &prev.y),
            None => 0.0,
        };
        self.prev = Some(frame.clone());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Mean squared luma difference to the previous frame.
pub struct TemporalFeatures {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl TemporalFeatures {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for TemporalFeatures {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => super::mse(&frame.y, &prev.y),
            None => 0.0,
        };
        self.prev = Some(frame.clone());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// ITU-style temporal information: standard deviation of the frame
/// difference signal.
pub struct TiFeatures {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl TiFeatures {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for TiFeatures {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => {
                let diff: Vec<f64> = frame
                    .y
                    .iter()
                    .zip(&prev.y)
                    .map(|(&a, &b)| a as f64 - b as f64)
                    .collect();
                std_f64(&diff)
            }
            None => 0.0,
        };
        self.prev = Some(frame.clone());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Peak block motion: maximum mean absolute difference over the 16x16
/// block grid. Catches local motion that frame-global averages miss.
pub struct BlockMotion {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl BlockMotion {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }

    fn peak_block_diff(a: &Frame, b: &Frame) -> f64 {
        let mut peak = 0.0f64;
        let mut row = 0;
        while row < a.height {
            let mut col = 0;
            while col < a.width {
                let mut sum = 0.0;
                let mut count = 0;
                for r in row..(row + MOTION_BLOCK).min(a.height) {
                    for c in col..(col + MOTION_BLOCK).min(a.width) {
                        sum += (a.luma(c, r) as f64 - b.luma(c, r) as f64).abs();
                        count += 1;
                    }
                }
                if count > 0 {
                    peak = peak.max(sum / count as f64);
                }
                col += MOTION_BLOCK;
            }
            row += MOTION_BLOCK;
        }
        peak
    }
}

impl FeatureCalculator for BlockMotion {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => Self::peak_block_diff(frame, prev),
            None => 0.0,
        };
        self.prev = Some(frame.clone());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Scene-cut detection: 1.0 when the luma histogram jumps by more than
/// the cut threshold against the previous frame.
pub struct CutDetectionFeatures {
    prev_hist: Option<[f64; 256]>,
    seq: Vec<f64>,
}

impl CutDetectionFeatures {
    pub fn new() -> Self {
        Self {
            prev_hist: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for CutDetectionFeatures {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let hist = histogram256(&input.distorted().y);
        let value = match &self.prev_hist {
            Some(prev) => {
                let distance: f64 = hist.iter().zip(prev.iter()).map(|(a, b)| (a - b).abs()).sum();
                if distance > CUT_THRESHOLD {
                    1.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.prev_hist = Some(hist);
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Staticness flag per frame: 1.0 while the clip shows no motion. The
/// first frame counts as static. Pooled mean is the static ratio.
pub struct Staticness {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl Staticness {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for Staticness {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => {
                if mean_abs_diff(&frame.y, &prev.y) < STATIC_THRESHOLD {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuboidAxis {
    Row,
    Col,
}

/// Cuboid feature: motion energy of one spatial slice (a row or column
/// band at a relative position) read through time. The slice position is
/// part of the feature name ("cubrow.0.3" is the row at 30% height).
pub struct Cuboid {
    axis: CuboidAxis,
    position: f64,
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl Cuboid {
    pub fn row(position: f64) -> Self {
        Self::new(CuboidAxis::Row, position)
    }

    pub fn col(position: f64) -> Self {
        Self::new(CuboidAxis::Col, position)
    }

    fn new(axis: CuboidAxis, position: f64) -> Self {
        Self {
            axis,
            position: position.clamp(0.0, 1.0),
            prev: None,
            seq: Vec::new(),
        }
    }

    fn slice(&self, frame: &Frame) -> Vec<u8> {
        match self.axis {
            CuboidAxis::Row => {
                let row = (self.position * (frame.height - 1) as f64).round() as usize;
                frame.y[row * frame.width..(row + 1) * frame.width].to_vec()
            }
            CuboidAxis::Col => {
                let col = (self.position * (frame.width - 1) as f64).round() as usize;
                (0..frame.height).map(|row| frame.luma(col, row)).collect()
            }
        }
    }
}

impl FeatureCalculator for Cuboid {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => mean_abs_diff(&self.slice(frame), &self.slice(prev)),
            None => 0.0,
        };
        self.prev = Some(frame.clone());
        self.seq.push(value);
        Ok(value)
    }

    sequence_accessors!();
}

/// Spatio-temporal entropy of the frame difference signal, the
/// reduced-reference style temporal descriptor of the catalog.
pub struct Strred {
    prev: Option<Frame>,
    seq: Vec<f64>,
}

impl Strred {
    pub fn new() -> Self {
        Self {
            prev: None,
            seq: Vec::new(),
        }
    }
}

impl FeatureCalculator for Strred {
    fn calc(&mut self, input: &FrameInput) -> Result<f64> {
        let frame = input.distorted();
        let value = match &self.prev {
            Some(prev) => {
                let diff: Vec<u8> = frame
                    .y
                    .iter()
                    .zip(&prev.y)
                    .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs().min(255) as u8)
                    .collect();
                entropy(&histogram256(&diff))
            }
            None => 0.0,
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
    use crate::features::mean_f64;

    fn feed(calc: &mut dyn FeatureCalculator, lumas: &[u8]) {
        for &luma in lumas {
            let input = FrameInput::Single(Frame::flat(32, 32, luma));
            calc.calc(&input).unwrap();
        }
    }

    #[test]
    fn test_movement_tracks_luma_steps() {
        let mut movement = MovementFeatures::new();
        feed(&mut movement, &[10, 10, 20, 20]);
        assert_eq!(movement.values(), &[0.0, 0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_sequence_length_matches_frame_count() {
        let mut ti = TiFeatures::new();
        feed(&mut ti, &[5, 6, 7, 8, 9]);
        assert_eq!(ti.values().len(), 5);
    }

    #[test]
    fn test_scene_cut_fires_on_hard_cut() {
        let mut cuts = CutDetectionFeatures::new();
        feed(&mut cuts, &[10, 10, 250, 250]);
        assert_eq!(cuts.values(), &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_staticness_flags_still_frames() {
        let mut staticness = Staticness::new();
        feed(&mut staticness, &[40, 40, 200, 200]);
        assert_eq!(staticness.values(), &[1.0, 1.0, 0.0, 1.0]);
        assert_eq!(mean_f64(staticness.values()), 0.75);
    }

    #[test]
    fn test_cuboid_rows_and_cols_detect_motion() {
        let mut row0 = Cuboid::row(0.0);
        let mut col_last = Cuboid::col(1.0);
        feed(&mut row0, &[0, 100]);
        feed(&mut col_last, &[0, 100]);
        assert_eq!(row0.values(), &[0.0, 100.0]);
        assert_eq!(col_last.values(), &[0.0, 100.0]);
    }

    #[test]
    fn test_blkmotion_zero_on_static_clip() {
        let mut blk = BlockMotion::new();
        feed(&mut blk, &[50, 50, 50]);
        assert!(blk.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_strred_zero_on_static_clip() {
        let mut strred = Strred::new();
        feed(&mut strred, &[70, 70]);
        // constant difference signal has zero entropy
        assert_eq!(strred.values(), &[0.0, 0.0]);
    }
}
