//! Decoded frame representation in the normalized comparison space.
//!
//! Frames arrive as planar YUV 4:2:0 from the frame source. Calculators
//! only ever see frames after rescale/crop normalization, so width and
//! height are uniform within one extraction pass.

use crate::errors::{PixelError, Result};

/// One decoded video frame, planar YUV 4:2:0, 8 bit.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl Frame {
    /// Byte size of one yuv420p frame at the given dimensions.
    pub fn buffer_len(width: usize, height: usize) -> usize {
        width * height + 2 * ((width / 2) * (height / 2))
    }

    /// Split a raw yuv420p buffer into planes.
    pub fn from_yuv420(width: usize, height: usize, buf: &[u8]) -> Result<Self> {
        let expected = Self::buffer_len(width, height);
        if buf.len() != expected {
            return Err(PixelError::Decode(format!(
                "yuv420p buffer has {} bytes, expected {} for {}x{}",
                buf.len(),
                expected,
                width,
                height
            )));
        }
        let luma = width * height;
        let chroma = (width / 2) * (height / 2);
        Ok(Self {
            width,
            height,
            y: buf[..luma].to_vec(),
            u: buf[luma..luma + chroma].to_vec(),
            v: buf[luma + chroma..].to_vec(),
        })
    }

    /// Uniform gray frame, mostly useful for tests and synthetic sources.
    pub fn flat(width: usize, height: usize, luma: u8) -> Self {
        let chroma = (width / 2) * (height / 2);
        Self {
            width,
            height,
            y: vec![luma; width * height],
            u: vec![128; chroma],
            v: vec![128; chroma],
        }
    }

    /// Luma sample at pixel (x, y).
    pub fn luma(&self, x: usize, y: usize) -> u8 {
        self.y[y * self.width + x]
    }
}

/// What one step of the frame stream hands to calculators: a single
/// distorted frame, or a time-aligned reference/distorted pair.
#[derive(Debug, Clone)]
pub enum FrameInput {
    Single(Frame),
    Pair { reference: Frame, distorted: Frame },
}

impl FrameInput {
    /// The distorted frame; no-reference calculators work on this one
    /// regardless of extraction mode.
    pub fn distorted(&self) -> &Frame {
        match self {
            FrameInput::Single(f) => f,
            FrameInput::Pair { distorted, .. } => distorted,
        }
    }

    /// Reference/distorted pair, if this is a full-reference input.
    pub fn pair(&self) -> Option<(&Frame, &Frame)> {
        match self {
            FrameInput::Single(_) => None,
            FrameInput::Pair {
                reference,
                distorted,
            } => Some((reference, distorted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_len() {
        assert_eq!(Frame::buffer_len(1280, 720), 1280 * 720 * 3 / 2);
        assert_eq!(Frame::buffer_len(2, 2), 6);
    }

    #[test]
    fn test_from_yuv420_splits_planes() {
        let buf: Vec<u8> = (0..6).collect();
        let frame = Frame::from_yuv420(2, 2, &buf).unwrap();
        assert_eq!(frame.y, vec![0, 1, 2, 3]);
        assert_eq!(frame.u, vec![4]);
        assert_eq!(frame.v, vec![5]);
    }

    #[test]
    fn test_luma_indexes_row_major() {
        let buf: Vec<u8> = (0..6).collect();
        let frame = Frame::from_yuv420(2, 2, &buf).unwrap();
        assert_eq!(frame.luma(0, 0), 0);
        assert_eq!(frame.luma(1, 0), 1);
        assert_eq!(frame.luma(0, 1), 2);
        assert_eq!(frame.luma(1, 1), 3);
    }

    #[test]
    fn test_from_yuv420_rejects_short_buffer() {
        assert!(Frame::from_yuv420(2, 2, &[0u8; 5]).is_err());
    }

    #[test]
    fn test_input_distorted() {
        let reference = Frame::flat(2, 2, 10);
        let distorted = Frame::flat(2, 2, 20);
        let input = FrameInput::Pair {
            reference,
            distorted,
        };
        assert_eq!(input.distorted().y[0], 20);
        assert!(input.pair().is_some());
        assert!(FrameInput::Single(Frame::flat(2, 2, 0)).pair().is_none());
    }
}
