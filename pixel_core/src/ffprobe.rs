//! FFprobe wrapper module
//!
//! Bitstream metadata probing for the hybrid (mode0) feature extractor.
//! Only the fields the metadata derivation needs are parsed.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::errors::{PixelError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Average frame rate in frames per second.
    pub avg_frame_rate: f64,
    /// Container bitrate in bit/s.
    pub bitrate: u64,
    /// Bit depth as reported by `bits_per_raw_sample`; ffprobe reports
    /// "unknown" for many encodes, in which case 8 is assumed.
    pub bits_per_raw_sample: u8,
    pub duration: f64,
    pub frame_count: u64,
}

pub fn is_ffprobe_available() -> bool {
    which::which("ffprobe").is_ok()
}

pub fn probe_video(path: &Path) -> Result<ProbeResult> {
    if !is_ffprobe_available() {
        return Err(PixelError::Probe(
            "ffprobe not found in PATH; install ffmpeg".to_string(),
        ));
    }

    if !path.is_file() {
        return Err(PixelError::Probe(format!(
            "Not a file: {}",
            path.display()
        )));
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| PixelError::Probe(format!("Invalid path encoding: {}", path.display())))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "--",
            path_str,
        ])
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PixelError::Probe(format!(
            "ffprobe error for '{}': {}",
            path.display(),
            stderr.trim()
        )));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| PixelError::Probe(format!("ffprobe output not parseable: {e}")))?;

    parse_probe_json(&json, path)
}

fn parse_probe_json(json: &serde_json::Value, path: &Path) -> Result<ProbeResult> {
    let format = &json["format"];
    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let duration = format["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| PixelError::Probe(format!("No streams in {}", path.display())))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| PixelError::Probe(format!("No video stream in {}", path.display())))?;

    let codec = video_stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();
    let width = video_stream["width"].as_u64().unwrap_or(0) as u32;
    let height = video_stream["height"].as_u64().unwrap_or(0) as u32;

    let avg_frame_rate = parse_frame_rate(video_stream["avg_frame_rate"].as_str().unwrap_or(""))
        .ok_or_else(|| {
            PixelError::Probe(format!("No usable frame rate in {}", path.display()))
        })?;

    // many encodes report "unknown" here; the model treats those as 8 bit
    let bits_per_raw_sample = video_stream["bits_per_raw_sample"]
        .as_str()
        .and_then(|s| s.parse::<u8>().ok())
        .unwrap_or(8);

    let frame_count = video_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or((duration * avg_frame_rate) as u64);

    Ok(ProbeResult {
        codec,
        width,
        height,
        avg_frame_rate,
        bitrate,
        bits_per_raw_sample,
        duration,
        frame_count,
    })
}

/// Parse ffprobe rational frame rates ("30000/1001") or plain numbers.
/// Returns None for zero, negative or malformed rates.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num = num.parse::<f64>().ok()?;
        let den = den.parse::<f64>().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    match s.parse::<f64>() {
        Ok(v) if v > 0.0 => Some(v),
        _ => None,
    }
}
