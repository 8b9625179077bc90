//! pixel_core: feature extraction and score prediction for pixel-based
//! video quality models.
//!
//! The crate backs four model variants (nofu, fume, hyfu, hyfr) with a
//! shared pipeline:
//! - a closed feature registry with per-variant feature subsets
//! - a disk-backed feature cache keyed by (model, feature, video)
//! - a single-pass frame iteration feeding all uncached calculators
//! - deterministic statistical pooling into a per-video vector
//! - bitstream metadata features for the hybrid variants
//! - serialized random-forest score prediction
//!
//! Video decoding is delegated to ffmpeg/ffprobe child processes; the
//! rest of the pipeline is pure and reproducible: identical inputs give
//! identical pooled vectors, with or without a warm cache.

pub mod batch;
pub mod cache;
pub mod errors;
pub mod extract;
pub mod features;
pub mod ffprobe;
pub mod frame;
pub mod meta;
pub mod pooling;
pub mod predict;
pub mod source;

pub use batch::{
    default_cpu_count, read_database, report_file_name, run_batch, BatchSummary, DatabaseEntry,
};
pub use cache::{CacheSlot, FeatureCache};
pub use errors::{PixelError, Result};
pub use extract::{dump_json, Extractor, FullReport, PooledFeatures};
pub use features::{catalog, create_calculator, FeatureCalculator, ModelVariant};
pub use ffprobe::{probe_video, ProbeResult};
pub use frame::{Frame, FrameInput};
pub use meta::{extract_mode0_features, unify_codec};
pub use pooling::{pool, FeatureVectorBuilder, POOLING_STATS};
pub use predict::{predict_video_score, Prediction};
pub use source::{FfmpegSource, FrameSource, FrameStream};

/// Crate version reported in prediction results.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
