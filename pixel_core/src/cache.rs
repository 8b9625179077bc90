//! Feature cache: per (model, feature, video) persistent sequences.
//!
//! Layout: `{features_dir}/{model}/{feature}/{stem}_{hash}.json`, where
//! `hash` is a short blake3 digest of the video identity (distorted path
//! plus, for full-reference runs, the reference path). Entries are plain
//! JSON so external training tooling can read them directly. Entries are
//! never mutated in place; a recompute overwrites the file wholesale via
//! a same-directory rename.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::Result;

const HASH_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    video: String,
    values: Vec<f64>,
}

/// Root of the on-disk feature cache.
#[derive(Debug, Clone)]
pub struct FeatureCache {
    root: PathBuf,
}

impl FeatureCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the slot for one (model, feature, video identity) triple.
    pub fn slot(
        &self,
        model: &str,
        feature: &str,
        video: &Path,
        reference: Option<&Path>,
    ) -> CacheSlot {
        let mut hasher = blake3::Hasher::new();
        hasher.update(video.to_string_lossy().as_bytes());
        if let Some(reference) = reference {
            hasher.update(b"\0");
            hasher.update(reference.to_string_lossy().as_bytes());
        }
        let hash = hasher.finalize().to_hex();

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let path = self
            .root
            .join(model)
            .join(feature)
            .join(format!("{}_{}.json", stem, &hash.as_str()[..HASH_LEN]));

        CacheSlot {
            path,
            video: video.to_string_lossy().to_string(),
        }
    }
}

/// One addressable cache location. Distinct slots never collide, so
/// concurrent extraction of different videos does not contend.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    path: PathBuf,
    video: String,
}

impl CacheSlot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hydrate a previously stored sequence. A missing file means the
    /// feature has to be computed; a corrupt file is treated the same
    /// way (with a warning) rather than poisoning the extraction.
    pub fn load(&self) -> Option<Vec<f64>> {
        let data = fs::read(&self.path).ok()?;
        match serde_json::from_slice::<CacheEntry>(&data) {
            Ok(entry) => Some(entry.values),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding corrupt cache entry");
                None
            }
        }
    }

    /// Persist a sequence. Idempotent: storing the same sequence again
    /// rewrites identical content.
    pub fn store(&self, values: &[f64]) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entry = CacheEntry {
            video: self.video.clone(),
            values: values.to_vec(),
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path());
        let slot = cache.slot("nofu", "contrast", Path::new("/videos/a.mp4"), None);

        assert!(slot.load().is_none());
        let values = vec![0.5, 1.5, 2.5];
        let stored = slot.store(&values).unwrap();
        assert!(stored.exists());
        assert_eq!(slot.load().unwrap(), values);
    }

    #[test]
    fn test_slots_are_keyed_by_model_feature_and_video() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path());
        let a = cache.slot("nofu", "contrast", Path::new("/videos/a.mp4"), None);
        let b = cache.slot("fume", "contrast", Path::new("/videos/a.mp4"), None);
        let c = cache.slot("nofu", "blur", Path::new("/videos/a.mp4"), None);
        let d = cache.slot("nofu", "contrast", Path::new("/videos/b.mp4"), None);

        let paths = [a.path(), b.path(), c.path(), d.path()];
        for i in 0..paths.len() {
            for j in i + 1..paths.len() {
                assert_ne!(paths[i], paths[j]);
            }
        }
    }

    #[test]
    fn test_reference_path_is_part_of_identity() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path());
        let no_ref = cache.slot("fume", "ssim", Path::new("/v/dis.mp4"), None);
        let ref_a = cache.slot(
            "fume",
            "ssim",
            Path::new("/v/dis.mp4"),
            Some(Path::new("/v/src_a.mp4")),
        );
        let ref_b = cache.slot(
            "fume",
            "ssim",
            Path::new("/v/dis.mp4"),
            Some(Path::new("/v/src_b.mp4")),
        );
        assert_ne!(no_ref.path(), ref_a.path());
        assert_ne!(ref_a.path(), ref_b.path());
    }

    #[test]
    fn test_corrupt_entry_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path());
        let slot = cache.slot("nofu", "contrast", Path::new("/videos/a.mp4"), None);
        slot.store(&[1.0]).unwrap();
        fs::write(slot.path(), b"not json").unwrap();
        assert!(slot.load().is_none());
    }

    #[test]
    fn test_store_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path());
        let slot = cache.slot("nofu", "contrast", Path::new("/videos/a.mp4"), None);
        slot.store(&[1.0, 2.0, 3.0]).unwrap();
        slot.store(&[9.0]).unwrap();
        assert_eq!(slot.load().unwrap(), vec![9.0]);
    }
}
