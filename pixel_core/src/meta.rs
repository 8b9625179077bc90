//! Bitstream (mode0) metadata features for the hybrid model variants.
//!
//! Everything here is a pure function of the container/stream metadata
//! reported by ffprobe; nothing is cached. Derived fields normalize
//! against fixed references (60 fps, 4K area) so models trained on one
//! catalog of resolutions transfer to another.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{PixelError, Result};
use crate::ffprobe::{probe_video, ProbeResult};

/// Reference area for resolution normalization: 4K UHD.
const REFERENCE_AREA: f64 = 3840.0 * 2160.0;
/// Reference frame rate for framerate normalization.
const REFERENCE_FRAMERATE: f64 = 60.0;

/// Map a codec identifier to the model's closed integer enumeration.
///
/// The supported codec set is closed; anything else is a configuration
/// error rather than a guessed value, because an unseen codec index
/// would silently shift the model input.
pub fn unify_codec(codec: &str) -> Result<u32> {
    if codec.contains("h264") {
        return Ok(0);
    }
    if codec.contains("hevc") {
        return Ok(1);
    }
    if codec.contains("vp9") {
        return Ok(2);
    }
    Err(PixelError::Configuration(format!(
        "video codec '{codec}' is not supported by this model"
    )))
}

/// Extract the mode0 feature set for one video.
pub fn extract_mode0_features(video: &Path) -> Result<BTreeMap<String, f64>> {
    let probe = probe_video(video)?;
    mode0_from_probe(&probe)
}

/// Derivation split out from the probing so it stays a pure, testable
/// function of the metadata.
pub fn mode0_from_probe(probe: &ProbeResult) -> Result<BTreeMap<String, f64>> {
    let framerate = probe.avg_frame_rate;
    let bitrate_kbit = probe.bitrate as f64 / 1024.0;
    let resolution = (probe.width as f64) * (probe.height as f64);
    let codec = unify_codec(&probe.codec)?;

    if framerate <= 0.0 || resolution <= 0.0 {
        return Err(PixelError::Configuration(format!(
            "degenerate metadata: framerate={framerate}, resolution={resolution}"
        )));
    }

    let mut features = BTreeMap::new();
    features.insert("framerate".to_string(), framerate);
    features.insert("bitrate".to_string(), bitrate_kbit);
    features.insert("bitdepth".to_string(), probe.bits_per_raw_sample as f64);
    features.insert("codec".to_string(), codec as f64);
    features.insert("resolution".to_string(), resolution);

    // canonical bits-per-pixel formula; bitrate is in kbit/s here
    features.insert(
        "bpp".to_string(),
        1024.0 * bitrate_kbit / (framerate * resolution),
    );
    features.insert("bitrate_log".to_string(), bitrate_kbit.ln());
    features.insert(
        "framerate_norm".to_string(),
        framerate / REFERENCE_FRAMERATE,
    );
    features.insert("framerate_log".to_string(), framerate.ln());
    features.insert("resolution_log".to_string(), resolution.ln());
    features.insert("resolution_norm".to_string(), resolution / REFERENCE_AREA);

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn probe_1080p30() -> ProbeResult {
        ProbeResult {
            codec: "h264".to_string(),
            width: 1920,
            height: 1080,
            avg_frame_rate: 30.0,
            bitrate: 1024000,
            bits_per_raw_sample: 8,
            duration: 10.0,
            frame_count: 300,
        }
    }

    #[test]
    fn test_unify_codec_closed_set() {
        assert_eq!(unify_codec("h264").unwrap(), 0);
        assert_eq!(unify_codec("x264 / h264 variant").unwrap(), 0);
        assert_eq!(unify_codec("hevc").unwrap(), 1);
        assert_eq!(unify_codec("vp9").unwrap(), 2);
        assert!(matches!(
            unify_codec("av1"),
            Err(PixelError::Configuration(_))
        ));
        assert!(unify_codec("").is_err());
    }

    #[test]
    fn test_mode0_derivation_closed_form() {
        let features = mode0_from_probe(&probe_1080p30()).unwrap();

        let bitrate_kbit = 1024000.0 / 1024.0; // 1000 kbit/s
        let resolution = 1920.0 * 1080.0;

        assert!((features["bitrate"] - bitrate_kbit).abs() < EPS);
        assert!((features["framerate_norm"] - 0.5).abs() < EPS);
        assert!((features["resolution_norm"] - 0.25).abs() < EPS);
        assert!(
            (features["bpp"] - 1024.0 * bitrate_kbit / (30.0 * resolution)).abs() < EPS
        );
        assert!((features["bitrate_log"] - bitrate_kbit.ln()).abs() < EPS);
        assert!((features["resolution_log"] - resolution.ln()).abs() < EPS);
        assert_eq!(features["codec"], 0.0);
        assert_eq!(features["bitdepth"], 8.0);
    }

    #[test]
    fn test_mode0_rejects_unsupported_codec() {
        let mut probe = probe_1080p30();
        probe.codec = "av1".to_string();
        assert!(mode0_from_probe(&probe).is_err());
    }

    #[test]
    fn test_mode0_rejects_zero_framerate() {
        let mut probe = probe_1080p30();
        probe.avg_frame_rate = 0.0;
        assert!(mode0_from_probe(&probe).is_err());
    }
}
