//! Score prediction: maps a pooled feature vector to quality targets.
//!
//! Each model variant ships up to three serialized artifacts under its
//! base path: `model_mos` (continuous score), `model_class` (quality
//! class votes) and `model_rating_dist` (rating distribution). The
//! artifacts are random-forest models stored as JSON. A missing
//! artifact downgrades the result (the target is omitted with a
//! warning); a present but unreadable artifact is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{PixelError, Result};
use crate::extract::PooledFeatures;

pub const MOS_MIN: f64 = 1.0;
pub const MOS_MAX: f64 = 5.0;

/// Columns that identify or label a sample; never fed to a model.
const EXCLUDED_COLUMNS: &[&str] = &[
    "video",
    "video_name",
    "src_video",
    "mos",
    "mos_class",
    "rating_dist",
];

const MODEL_FILES: [(&str, Target); 3] = [
    ("model_mos", Target::Mos),
    ("model_class", Target::Class),
    ("model_rating_dist", Target::RatingDist),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Mos,
    Class,
    RatingDist,
}

/// Per-call prediction record. Targets whose artifact is missing stay
/// `None` and are skipped during serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mos: Option<f64>,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_dist: Option<Vec<f64>>,
    pub model: String,
    pub date: String,
    pub version: String,
}

/// One decision tree in node-array form; index 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// Serialized random forest. `columns` records the training-time
/// feature order; when absent, the lexicographic order of the input
/// vector is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestModel {
    #[serde(default)]
    columns: Vec<String>,
    trees: Vec<Tree>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> Result<&[f64]> {
        let mut idx = 0usize;
        // A well-formed tree reaches a leaf within nodes.len() hops;
        // anything longer means the split indices form a cycle.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if x <= *threshold { *left } else { *right };
                }
                Some(Node::Leaf { value }) => return Ok(value),
                None => {
                    return Err(PixelError::Model {
                        path: PathBuf::new(),
                        message: format!("tree node index {idx} out of range"),
                    })
                }
            }
        }
        Err(PixelError::Model {
            path: PathBuf::new(),
            message: format!("tree walk exceeded {} nodes, split cycle", self.nodes.len()),
        })
    }
}

impl ForestModel {
    fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| PixelError::Model {
            path: path.to_path_buf(),
            message: format!("cannot read artifact: {e}"),
        })?;
        let model: ForestModel = serde_json::from_slice(&data).map_err(|e| PixelError::Model {
            path: path.to_path_buf(),
            message: format!("invalid model JSON: {e}"),
        })?;
        if model.trees.is_empty() {
            return Err(PixelError::Model {
                path: path.to_path_buf(),
                message: "model has no trees".to_string(),
            });
        }
        Ok(model)
    }

    /// Mean leaf vector over all trees.
    fn predict(&self, row: &[f64]) -> Result<Vec<f64>> {
        let width = match self.trees[0].predict(row)? {
            [] => {
                return Err(PixelError::Model {
                    path: PathBuf::new(),
                    message: "empty leaf value".to_string(),
                })
            }
            leaf => leaf.len(),
        };
        let mut sum = vec![0.0; width];
        for tree in &self.trees {
            let leaf = tree.predict(row)?;
            for (acc, v) in sum.iter_mut().zip(leaf) {
                *acc += v;
            }
        }
        for acc in sum.iter_mut() {
            *acc /= self.trees.len() as f64;
        }
        Ok(sum)
    }
}

/// Explicit sanitization step: non-finite feature values become 0
/// before prediction. This is a documented model contract, not an
/// incidental side effect.
pub fn sanitize_features(row: &mut [f64]) {
    for value in row.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
}

/// Build the model input row from the pooled vector: identity/label
/// columns dropped, remaining keys in lexicographic order (or the
/// model's recorded column order when it has one), non-finite values
/// zeroed.
fn build_row(features: &PooledFeatures, model: &ForestModel, path: &Path) -> Result<Vec<f64>> {
    let mut row = if model.columns.is_empty() {
        features
            .iter()
            .filter(|(key, _)| !EXCLUDED_COLUMNS.contains(&key.as_str()))
            .map(|(_, value)| *value)
            .collect::<Vec<f64>>()
    } else {
        model
            .columns
            .iter()
            .map(|column| {
                features.get(column).copied().ok_or_else(|| PixelError::Model {
                    path: path.to_path_buf(),
                    message: format!("input vector is missing model column '{column}'"),
                })
            })
            .collect::<Result<Vec<f64>>>()?
    };
    sanitize_features(&mut row);
    Ok(row)
}

/// Predict all available targets for one pooled feature vector.
pub fn predict_video_score(
    features: &PooledFeatures,
    model_base_path: &Path,
    clipping: bool,
) -> Result<Prediction> {
    let mut prediction = Prediction {
        mos: None,
        class: None,
        rating_dist: None,
        model: model_base_path.to_string_lossy().to_string(),
        date: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    for (file, target) in MODEL_FILES {
        let path = model_base_path.join(file);
        if !path.is_file() {
            warn!(path = %path.display(), "model artifact missing, skipping target");
            continue;
        }
        let model = ForestModel::load(&path)?;
        let row = build_row(features, &model, &path)?;
        let output = model.predict(&row)?;

        match target {
            Target::Mos => {
                let mut mos = output[0];
                if clipping {
                    mos = mos.clamp(MOS_MIN, MOS_MAX);
                }
                prediction.mos = Some(mos);
            }
            Target::Class => {
                // vote vector: class index of the strongest vote,
                // 1-based; a single-output forest is a regression on
                // the class label
                let class = if output.len() == 1 {
                    output[0].round()
                } else {
                    let argmax = output
                        .iter()
                        .enumerate()
                        .max_by(|a, b| {
                            a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    (argmax + 1) as f64
                };
                prediction.class = Some(class);
            }
            Target::RatingDist => {
                let sum: f64 = output.iter().sum();
                let dist = if sum > 0.0 {
                    output.iter().map(|v| v / sum).collect()
                } else {
                    output
                };
                prediction.rating_dist = Some(dist);
            }
        }
    }

    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_model(dir: &Path, file: &str, json: serde_json::Value) {
        std::fs::write(dir.join(file), serde_json::to_vec(&json).unwrap()).unwrap();
    }

    fn stump(columns: Vec<&str>, feature: usize, threshold: f64, lo: f64, hi: f64) -> serde_json::Value {
        serde_json::json!({
            "columns": columns,
            "trees": [{
                "nodes": [
                    { "feature": feature, "threshold": threshold, "left": 1, "right": 2 },
                    { "value": [lo] },
                    { "value": [hi] }
                ]
            }]
        })
    }

    fn features(pairs: &[(&str, f64)]) -> PooledFeatures {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_cyclic_split_indices_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // two split nodes pointing at each other, no leaf reachable
        write_model(
            dir.path(),
            "model_mos",
            serde_json::json!({
                "columns": ["tone_mean"],
                "trees": [{
                    "nodes": [
                        { "feature": 0, "threshold": 0.5, "left": 1, "right": 1 },
                        { "feature": 0, "threshold": 0.5, "left": 0, "right": 0 }
                    ]
                }]
            }),
        );
        let err = predict_video_score(&features(&[("tone_mean", 1.0)]), dir.path(), true)
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_missing_artifacts_are_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let prediction =
            predict_video_score(&features(&[("tone_mean", 1.0)]), dir.path(), true).unwrap();
        assert!(prediction.mos.is_none());
        assert!(prediction.class.is_none());
        assert!(prediction.rating_dist.is_none());
        assert!(!prediction.version.is_empty());
    }

    #[test]
    fn test_mos_prediction_and_clipping() {
        let dir = tempfile::tempdir().unwrap();
        // leaf values outside the MOS range must be clipped
        write_model(
            dir.path(),
            "model_mos",
            stump(vec!["blur_mean"], 0, 0.5, 0.2, 7.0),
        );

        let low = predict_video_score(&features(&[("blur_mean", 0.0)]), dir.path(), true).unwrap();
        assert_eq!(low.mos, Some(MOS_MIN));

        let high = predict_video_score(&features(&[("blur_mean", 1.0)]), dir.path(), true).unwrap();
        assert_eq!(high.mos, Some(MOS_MAX));

        let unclipped =
            predict_video_score(&features(&[("blur_mean", 1.0)]), dir.path(), false).unwrap();
        assert_eq!(unclipped.mos, Some(7.0));
    }

    #[test]
    fn test_class_argmax_is_one_based() {
        let dir = tempfile::tempdir().unwrap();
        write_model(
            dir.path(),
            "model_class",
            serde_json::json!({
                "columns": ["x"],
                "trees": [{ "nodes": [ { "value": [0.1, 0.2, 0.6, 0.1, 0.0] } ] }]
            }),
        );
        let prediction = predict_video_score(&features(&[("x", 0.0)]), dir.path(), true).unwrap();
        assert_eq!(prediction.class, Some(3.0));
    }

    #[test]
    fn test_rating_dist_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        write_model(
            dir.path(),
            "model_rating_dist",
            serde_json::json!({
                "columns": ["x"],
                "trees": [{ "nodes": [ { "value": [1.0, 1.0, 2.0] } ] }]
            }),
        );
        let prediction = predict_video_score(&features(&[("x", 0.0)]), dir.path(), true).unwrap();
        let dist = prediction.rating_dist.unwrap();
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((dist[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_features_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        write_model(
            dir.path(),
            "model_mos",
            stump(vec!["a_mean"], 0, 0.5, 2.0, 4.0),
        );
        // NaN sanitizes to 0, which falls on the low branch
        let prediction =
            predict_video_score(&features(&[("a_mean", f64::NAN)]), dir.path(), true).unwrap();
        assert_eq!(prediction.mos, Some(2.0));
    }

    #[test]
    fn test_forest_averages_trees() {
        let dir = tempfile::tempdir().unwrap();
        write_model(
            dir.path(),
            "model_mos",
            serde_json::json!({
                "columns": ["x"],
                "trees": [
                    { "nodes": [ { "value": [2.0] } ] },
                    { "nodes": [ { "value": [4.0] } ] }
                ]
            }),
        );
        let prediction = predict_video_score(&features(&[("x", 0.0)]), dir.path(), true).unwrap();
        assert_eq!(prediction.mos, Some(3.0));
    }

    #[test]
    fn test_missing_model_column_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_model(
            dir.path(),
            "model_mos",
            stump(vec!["does_not_exist"], 0, 0.5, 2.0, 4.0),
        );
        let err = predict_video_score(&features(&[("x", 0.0)]), dir.path(), true).unwrap_err();
        assert!(matches!(err, PixelError::Model { .. }));
    }

    #[test]
    fn test_sanitize_features() {
        let mut row = [1.0, f64::NAN, f64::INFINITY, -2.0, f64::NEG_INFINITY];
        sanitize_features(&mut row);
        assert_eq!(row, [1.0, 0.0, 0.0, -2.0, 0.0]);
    }
}
