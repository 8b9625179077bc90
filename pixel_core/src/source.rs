//! Frame source: lazy, single-pass iteration over normalized frames.
//!
//! Decoding and normalization is by far the most expensive step of an
//! extraction, so the orchestrator pulls every frame exactly once and
//! feeds it to all pending calculators in the same pass. Normalization
//! rescales to a common comparison space and center-crops, so that
//! per-pixel features and full-reference comparisons are computed on
//! aligned geometry regardless of source resolution.
//!
//! `FfmpegSource` streams rawvideo yuv420p from an ffmpeg child process;
//! no intermediate video file is written and the decoder is torn down on
//! every exit path, including calculator failure mid-pass.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use crate::errors::{PixelError, Result};
use crate::frame::{Frame, FrameInput};

/// Comparison-space geometry. All frames are rescaled to this size and
/// then center-cropped before any calculator sees them. Changing these
/// silently invalidates trained models, so they are versioned constants.
pub const NORM_WIDTH: usize = 1920;
pub const NORM_HEIGHT: usize = 1080;
pub const CROP_WIDTH: usize = 1280;
pub const CROP_HEIGHT: usize = 720;

/// Produces one finite, non-restartable frame stream per call.
pub trait FrameSource {
    fn open(&self, video: &Path, reference: Option<&Path>) -> Result<Box<dyn FrameStream>>;
}

/// Single-pass stream of frames (or aligned frame pairs).
pub trait FrameStream {
    /// Next frame input, or `Ok(None)` when both streams are cleanly
    /// exhausted. A reference/distorted length divergence is fatal.
    fn next_input(&mut self) -> Result<Option<FrameInput>>;
}

/// Frame source backed by an ffmpeg child process per stream.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    filter: String,
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self {
            filter: format!(
                "scale={NORM_WIDTH}:{NORM_HEIGHT}:flags=lanczos,crop={CROP_WIDTH}:{CROP_HEIGHT}"
            ),
        }
    }
}

impl FfmpegSource {
    fn spawn_decoder(&self, video: &Path) -> Result<RawFrameReader> {
        if which::which("ffmpeg").is_err() {
            return Err(PixelError::Decode(
                "ffmpeg not found in PATH; install ffmpeg".to_string(),
            ));
        }
        let path_str = video.to_str().ok_or_else(|| {
            PixelError::Decode(format!("Invalid path encoding: {}", video.display()))
        })?;

        debug!(video = %video.display(), filter = %self.filter, "spawning ffmpeg decoder");
        let child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                path_str,
                "-vf",
                &self.filter,
                "-f",
                "rawvideo",
                "-pix_fmt",
                "yuv420p",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PixelError::Decode(format!("failed to spawn ffmpeg: {e}")))?;

        Ok(RawFrameReader {
            child,
            buf: vec![0u8; Frame::buffer_len(CROP_WIDTH, CROP_HEIGHT)],
        })
    }
}

impl FrameSource for FfmpegSource {
    fn open(&self, video: &Path, reference: Option<&Path>) -> Result<Box<dyn FrameStream>> {
        let distorted = self.spawn_decoder(video)?;
        match reference {
            None => Ok(Box::new(SingleStream { reader: distorted })),
            Some(r) => Ok(Box::new(PairStream {
                reference: self.spawn_decoder(r)?,
                distorted,
                frames: 0,
            })),
        }
    }
}

/// Reads fixed-size yuv420p frames from one ffmpeg stdout.
struct RawFrameReader {
    child: Child,
    buf: Vec<u8>,
}

impl RawFrameReader {
    /// Reads one full frame; `Ok(None)` on clean EOF, error on a
    /// truncated trailing frame.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| PixelError::Decode("ffmpeg stdout not captured".to_string()))?;

        let mut filled = 0;
        while filled < self.buf.len() {
            match stdout.read(&mut self.buf[filled..]) {
                Ok(0) => {
                    if filled == 0 {
                        return Ok(None);
                    }
                    return Err(PixelError::Decode(format!(
                        "truncated frame: got {} of {} bytes",
                        filled,
                        self.buf.len()
                    )));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PixelError::Decode(format!("frame read failed: {e}"))),
            }
        }
        Frame::from_yuv420(CROP_WIDTH, CROP_HEIGHT, &self.buf).map(Some)
    }
}

impl Drop for RawFrameReader {
    fn drop(&mut self) {
        // decoder may still be running if the pass was aborted early
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct SingleStream {
    reader: RawFrameReader,
}

impl FrameStream for SingleStream {
    fn next_input(&mut self) -> Result<Option<FrameInput>> {
        Ok(self.reader.next_frame()?.map(FrameInput::Single))
    }
}

struct PairStream {
    reference: RawFrameReader,
    distorted: RawFrameReader,
    frames: usize,
}

impl FrameStream for PairStream {
    fn next_input(&mut self) -> Result<Option<FrameInput>> {
        let reference = self.reference.next_frame()?;
        let distorted = self.distorted.next_frame()?;
        match (reference, distorted) {
            (Some(reference), Some(distorted)) => {
                self.frames += 1;
                Ok(Some(FrameInput::Pair {
                    reference,
                    distorted,
                }))
            }
            (None, None) => Ok(None),
            // one stream ended early: fatal, never silently truncated
            _ => Err(PixelError::FrameCountMismatch {
                frames: self.frames,
            }),
        }
    }
}
