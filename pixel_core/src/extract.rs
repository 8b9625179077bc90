//! Extraction orchestrator: cache partitioning, the single decode pass,
//! pooling and assembly of the final feature vector.
//!
//! Decoding is the expensive step, so the orchestrator iterates the
//! frame stream exactly once and feeds every frame to every calculator
//! that missed the cache in that same pass. Calculator order inside the
//! pass is irrelevant; frame order is not, because whole-clip features
//! carry state across frames.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::cache::FeatureCache;
use crate::errors::{PixelError, Result};
use crate::features::{
    catalog, create_calculator, is_full_reference_feature, FeatureCalculator, ModelVariant,
};
use crate::meta::extract_mode0_features;
use crate::pooling::{pool, FeatureVectorBuilder};
use crate::source::FrameSource;

/// Pooled per-video feature vector, keyed `{feature}_{statistic}`.
pub type PooledFeatures = BTreeMap<String, f64>;

/// The durable, inspectable extraction record. The pooled vector is
/// always derivable from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullReport {
    pub video_name: String,
    pub per_frame: BTreeMap<String, Vec<f64>>,
    pub per_video: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, f64>>,
}

impl FullReport {
    pub fn write(&self, path: &Path) -> Result<()> {
        dump_json(path, self)
    }
}

/// Serialize a value as pretty JSON, creating parent directories.
pub fn dump_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// Drives feature extraction for one model variant.
pub struct Extractor<S: FrameSource> {
    variant: ModelVariant,
    cache: FeatureCache,
    source: S,
}

impl<S: FrameSource> Extractor<S> {
    pub fn new(variant: ModelVariant, features_dir: impl Into<std::path::PathBuf>, source: S) -> Self {
        Self {
            variant,
            cache: FeatureCache::new(features_dir),
            source,
        }
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Extract the variant's default feature set.
    pub fn extract_default(
        &self,
        video: &Path,
        reference: Option<&Path>,
    ) -> Result<(PooledFeatures, FullReport)> {
        let names = self.variant.features();
        self.extract(video, reference, &names, self.variant.hybrid())
    }

    /// Extract `feature_names` for one video.
    ///
    /// Preconditions: a non-empty subset of the registry catalog, and a
    /// reference stream exactly when the variant is full-reference.
    /// Violations are configuration errors before any decode work.
    pub fn extract(
        &self,
        video: &Path,
        reference: Option<&Path>,
        feature_names: &BTreeSet<String>,
        include_meta: bool,
    ) -> Result<(PooledFeatures, FullReport)> {
        if feature_names.is_empty() {
            return Err(PixelError::Configuration(
                "requested feature set is empty".to_string(),
            ));
        }
        let universe = catalog();
        let unknown: Vec<&str> = feature_names
            .iter()
            .filter(|n| !universe.contains(n.as_str()))
            .map(|n| n.as_str())
            .collect();
        if !unknown.is_empty() {
            return Err(PixelError::Configuration(format!(
                "unknown features requested: {}",
                unknown.join(", ")
            )));
        }
        if self.variant.full_reference() && reference.is_none() {
            return Err(PixelError::Configuration(format!(
                "model '{}' is full-reference and needs a reference video",
                self.variant.name()
            )));
        }
        if !self.variant.full_reference() && reference.is_some() {
            return Err(PixelError::Configuration(format!(
                "model '{}' is no-reference but a reference video was given",
                self.variant.name()
            )));
        }
        if reference.is_none() {
            if let Some(name) = feature_names
                .iter()
                .find(|n| is_full_reference_feature(n))
            {
                return Err(PixelError::Configuration(format!(
                    "feature '{name}' requires a reference video"
                )));
            }
        }

        let calculators: Vec<(String, Box<dyn FeatureCalculator>)> = feature_names
            .iter()
            .map(|name| {
                // membership was checked against the catalog above
                let calc = create_calculator(name).ok_or_else(|| {
                    PixelError::Configuration(format!("feature '{name}' has no calculator"))
                })?;
                Ok((name.clone(), calc))
            })
            .collect::<Result<_>>()?;

        self.run(video, reference, calculators, include_meta)
    }

    /// Core pipeline, split from the name resolution so tests can drive
    /// it with handcrafted calculators.
    pub(crate) fn run(
        &self,
        video: &Path,
        reference: Option<&Path>,
        mut calculators: Vec<(String, Box<dyn FeatureCalculator>)>,
        include_meta: bool,
    ) -> Result<(PooledFeatures, FullReport)> {
        let model = self.variant.name();
        info!(video = %video.display(), model, "extracting features");

        // partition into cached and to-compute via cache hydration
        let mut to_compute: Vec<usize> = Vec::new();
        for (idx, (name, calc)) in calculators.iter_mut().enumerate() {
            let slot = self.cache.slot(model, name, video, reference);
            if calc.load(&slot) {
                debug!(feature = %name, "cache hit");
            } else {
                to_compute.push(idx);
            }
        }

        if !to_compute.is_empty() {
            debug!(
                missing = to_compute.len(),
                total = calculators.len(),
                "computing missing features in one pass"
            );
            let mut stream = self.source.open(video, reference)?;
            let mut frame_no = 0usize;
            while let Some(input) = stream.next_input()? {
                for &idx in &to_compute {
                    let (name, calc) = &mut calculators[idx];
                    let value = calc.calc(&input).map_err(|e| PixelError::Calculator {
                        feature: name.clone(),
                        frame: frame_no,
                        message: e.to_string(),
                    })?;
                    trace!(frame = frame_no, feature = %name, value, "calculated");
                }
                frame_no += 1;
            }

            // store only after the full pass finished; an aborted pass
            // must not leave partial sequences behind
            for &idx in &to_compute {
                let (name, calc) = &calculators[idx];
                let slot = self.cache.slot(model, name, video, reference);
                calc.store(&slot)?;
            }
        }

        let mut builder = FeatureVectorBuilder::new();
        let mut per_frame = BTreeMap::new();
        for (name, calc) in &calculators {
            let values = calc.values().to_vec();
            builder.extend(pool(&values, name));
            per_frame.insert(name.clone(), values);
        }

        let meta = if include_meta {
            let meta = extract_mode0_features(video)?;
            for (key, value) in &meta {
                builder.insert(format!("meta_{key}"), *value);
            }
            Some(meta)
        } else {
            None
        };

        let pooled = builder.build();
        let report = FullReport {
            video_name: video.to_string_lossy().to_string(),
            per_frame,
            per_video: pooled.clone(),
            meta,
        };
        Ok((pooled, report))
    }
}
