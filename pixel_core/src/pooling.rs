//! Pooling engine: per-frame sequences to fixed per-video statistics.
//!
//! Pooling is a pure function of the input sequence. The statistic set is
//! a versioned constant shared by every feature; training and inference
//! rely on the output shape never changing per feature.

use std::collections::BTreeMap;

use tracing::warn;

/// Statistic names emitted for every pooled sequence, in output order.
/// Changing this set changes the shape of every trained model's input
/// vector, so treat it as frozen per model generation.
pub const POOLING_STATS: &[&str] = &[
    "mean", "std", "min", "max", "median", "p5", "p25", "p75", "p95", "iqr", "skew", "kurtosis",
];

/// Pool one per-frame sequence into `{feature}_{stat}` scalars.
///
/// Degenerate inputs do not raise: an empty sequence pools to all zeros,
/// a single element has std 0 and all order statistics equal to it.
pub fn pool(values: &[f64], feature: &str) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();

    if values.is_empty() {
        for stat in POOLING_STATS {
            out.insert(format!("{feature}_{stat}"), 0.0);
        }
        return out;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let p5 = percentile(&sorted, 0.05);
    let p25 = percentile(&sorted, 0.25);
    let median = percentile(&sorted, 0.5);
    let p75 = percentile(&sorted, 0.75);
    let p95 = percentile(&sorted, 0.95);

    // standardized moments; zero for constant sequences
    let (skew, kurtosis) = if std > 0.0 {
        let m3 = values.iter().map(|v| ((v - mean) / std).powi(3)).sum::<f64>() / n;
        let m4 = values.iter().map(|v| ((v - mean) / std).powi(4)).sum::<f64>() / n;
        (m3, m4 - 3.0)
    } else {
        (0.0, 0.0)
    };

    out.insert(format!("{feature}_mean"), mean);
    out.insert(format!("{feature}_std"), std);
    out.insert(format!("{feature}_min"), sorted[0]);
    out.insert(format!("{feature}_max"), sorted[sorted.len() - 1]);
    out.insert(format!("{feature}_median"), median);
    out.insert(format!("{feature}_p5"), p5);
    out.insert(format!("{feature}_p25"), p25);
    out.insert(format!("{feature}_p75"), p75);
    out.insert(format!("{feature}_p95"), p95);
    out.insert(format!("{feature}_iqr"), p75 - p25);
    out.insert(format!("{feature}_skew"), skew);
    out.insert(format!("{feature}_kurtosis"), kurtosis);
    out
}

/// Linear-interpolated percentile over an already sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Assembles the final feature vector from namespaced insertions.
///
/// Every source (pooled features, `meta_*` bitstream features) inserts
/// through here; a key collision is overwritten with a warning instead
/// of disappearing inside a silent map merge.
#[derive(Debug, Default)]
pub struct FeatureVectorBuilder {
    map: BTreeMap<String, f64>,
}

impl FeatureVectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: f64) {
        if let Some(previous) = self.map.insert(key.clone(), value) {
            warn!(key, previous, value, "feature vector key collision, overwriting");
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, f64)>) {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    pub fn build(self) -> BTreeMap<String, f64> {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_pool_known_sequence() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let pooled = pool(&values, "idx");

        assert!((pooled["idx_mean"] - 4.5).abs() < EPS);
        assert!((pooled["idx_min"] - 0.0).abs() < EPS);
        assert!((pooled["idx_max"] - 9.0).abs() < EPS);
        assert!((pooled["idx_median"] - 4.5).abs() < EPS);
        // population std of 0..9
        assert!((pooled["idx_std"] - (8.25f64).sqrt()).abs() < EPS);
        // symmetric ramp has zero skew
        assert!(pooled["idx_skew"].abs() < EPS);
        assert_eq!(pooled.len(), POOLING_STATS.len());
    }

    #[test]
    fn test_pool_single_element() {
        let pooled = pool(&[7.5], "x");
        assert!((pooled["x_mean"] - 7.5).abs() < EPS);
        assert_eq!(pooled["x_std"], 0.0);
        for stat in ["min", "max", "median", "p5", "p25", "p75", "p95"] {
            assert!(
                (pooled[&format!("x_{stat}")] - 7.5).abs() < EPS,
                "stat {stat} should equal the single element"
            );
        }
        assert_eq!(pooled["x_iqr"], 0.0);
        assert_eq!(pooled["x_skew"], 0.0);
        assert_eq!(pooled["x_kurtosis"], 0.0);
    }

    #[test]
    fn test_pool_empty_does_not_panic() {
        let pooled = pool(&[], "e");
        assert_eq!(pooled.len(), POOLING_STATS.len());
        assert!(pooled.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_pool_is_pure() {
        let values = vec![3.0, 1.0, 2.0, 5.0, 4.0];
        assert_eq!(pool(&values, "f"), pool(&values, "f"));
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = vec![0.0, 10.0];
        assert!((percentile(&sorted, 0.5) - 5.0).abs() < EPS);
        assert!((percentile(&sorted, 0.25) - 2.5).abs() < EPS);
    }

    #[test]
    fn test_builder_collision_overwrites() {
        let mut builder = FeatureVectorBuilder::new();
        builder.insert("a_mean".to_string(), 1.0);
        builder.insert("a_mean".to_string(), 2.0);
        let map = builder.build();
        assert_eq!(map["a_mean"], 2.0);
        assert_eq!(map.len(), 1);
    }
}
