use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PixelError {
    /// Fatal for the current video, never retried: bad feature set,
    /// unsupported codec, missing reference and similar caller mistakes.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A calculator raised during `calc`; extraction for the video is
    /// aborted and nothing is cached for unfinished calculators.
    #[error("Feature '{feature}' failed on frame {frame}: {message}")]
    Calculator {
        feature: String,
        frame: usize,
        message: String,
    },

    /// Reference and distorted streams yielded different frame counts.
    #[error("Reference/distorted frame count diverged after {frames} frames")]
    FrameCountMismatch { frames: usize },

    #[error("FFprobe failed: {0}")]
    Probe(String),

    #[error("Frame decoding failed: {0}")]
    Decode(String),

    #[error("Model artifact error in {path}: {message}")]
    Model { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PixelError>;
