//! Feature registry: the closed catalogs and model-variant feature sets.
//!
//! Both universes are immutable constants constructed at startup; a
//! requested name outside the catalog is a configuration error. The
//! per-variant sets are versioned with the models — changing a set
//! changes the pooled vector shape, which silently invalidates any
//! regressor trained against the previous shape (cache entries stay
//! valid because cache keys carry the model name).

use std::collections::BTreeSet;

use super::fullref::{FpsConsistency, Psnr, Ssim, Vifp};
use super::image::{
    calc_blockiness, calc_blur, calc_brisque, calc_ceiq, calc_color_fulness, calc_contrast,
    calc_fft, calc_niqe, calc_noise, calc_saturation, calc_si, calc_tone, calc_uhdhdsim,
    ImageFeature,
};
use super::temporal::{
    BlockMotion, Cuboid, CutDetectionFeatures, MovementFeatures, Staticness, Strred,
    TemporalFeatures, TiFeatures,
};
use super::FeatureCalculator;

/// Every no-reference feature the extractor can compute.
pub const NO_REFERENCE_CATALOG: &[&str] = &[
    "contrast",
    "fft",
    "blur",
    "color_fulness",
    "saturation",
    "tone",
    "scene_cuts",
    "movement",
    "temporal",
    "si",
    "ti",
    "blkmotion",
    "cubrow.0",
    "cubcol.0",
    "cubrow.1.0",
    "cubcol.1.0",
    "cubrow.0.3",
    "cubcol.0.3",
    "cubrow.0.5",
    "cubcol.0.5",
    "cubrow.0.6",
    "cubcol.0.6",
    "staticness",
    "uhdhdsim",
    "blockiness",
    "noise",
    "niqe",
    "ceiq",
    "brisque",
    "strred",
];

/// Reference-comparison features, only usable with a reference stream.
pub const FULL_REFERENCE_CATALOG: &[&str] = &["ssim", "psnr", "vifp", "fps"];

/// Perceptual indices excluded from the shipped variant sets (kept in
/// the catalog for experiments, as in the original model generation).
const EXPERIMENTAL_FEATURES: &[&str] = &["niqe", "ceiq", "brisque", "strred"];

/// The complete feature universe.
pub fn catalog() -> BTreeSet<&'static str> {
    NO_REFERENCE_CATALOG
        .iter()
        .chain(FULL_REFERENCE_CATALOG)
        .copied()
        .collect()
}

pub fn is_full_reference_feature(name: &str) -> bool {
    // "fps" only needs the distorted stream but belongs to the
    // full-reference set; it is gated with the others.
    FULL_REFERENCE_CATALOG.contains(&name)
}

/// Instantiate the calculator for a catalog name. `None` for anything
/// outside the closed universes.
pub fn create_calculator(name: &str) -> Option<Box<dyn FeatureCalculator>> {
    let calculator: Box<dyn FeatureCalculator> = match name {
        "contrast" => Box::new(ImageFeature::new(calc_contrast)),
        "fft" => Box::new(ImageFeature::new(calc_fft)),
        "blur" => Box::new(ImageFeature::new(calc_blur)),
        "color_fulness" => Box::new(ImageFeature::new(calc_color_fulness)),
        "saturation" => Box::new(ImageFeature::new(calc_saturation)),
        "tone" => Box::new(ImageFeature::new(calc_tone)),
        "si" => Box::new(ImageFeature::new(calc_si)),
        "uhdhdsim" => Box::new(ImageFeature::new(calc_uhdhdsim)),
        "blockiness" => Box::new(ImageFeature::new(calc_blockiness)),
        "noise" => Box::new(ImageFeature::new(calc_noise)),
        "niqe" => Box::new(ImageFeature::new(calc_niqe)),
        "ceiq" => Box::new(ImageFeature::new(calc_ceiq)),
        "brisque" => Box::new(ImageFeature::new(calc_brisque)),
        "scene_cuts" => Box::new(CutDetectionFeatures::new()),
        "movement" => Box::new(MovementFeatures::new()),
        "temporal" => Box::new(TemporalFeatures::new()),
        "ti" => Box::new(TiFeatures::new()),
        "blkmotion" => Box::new(BlockMotion::new()),
        "staticness" => Box::new(Staticness::new()),
        "strred" => Box::new(Strred::new()),
        "cubrow.0" => Box::new(Cuboid::row(0.0)),
        "cubcol.0" => Box::new(Cuboid::col(0.0)),
        "cubrow.1.0" => Box::new(Cuboid::row(1.0)),
        "cubcol.1.0" => Box::new(Cuboid::col(1.0)),
        "cubrow.0.3" => Box::new(Cuboid::row(0.3)),
        "cubcol.0.3" => Box::new(Cuboid::col(0.3)),
        "cubrow.0.5" => Box::new(Cuboid::row(0.5)),
        "cubcol.0.5" => Box::new(Cuboid::col(0.5)),
        "cubrow.0.6" => Box::new(Cuboid::row(0.6)),
        "cubcol.0.6" => Box::new(Cuboid::col(0.6)),
        "ssim" => Box::new(Ssim::new()),
        "psnr" => Box::new(Psnr::new()),
        "vifp" => Box::new(Vifp::new()),
        "fps" => Box::new(FpsConsistency::new()),
        _ => return None,
    };
    Some(calculator)
}

/// The four shipped model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// No-reference.
    Nofu,
    /// Full-reference.
    Fume,
    /// Hybrid no-reference (adds bitstream metadata features).
    Hyfu,
    /// Hybrid full-reference.
    Hyfr,
}

impl ModelVariant {
    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::Nofu => "nofu",
            ModelVariant::Fume => "fume",
            ModelVariant::Hyfu => "hyfu",
            ModelVariant::Hyfr => "hyfr",
        }
    }

    pub fn full_reference(&self) -> bool {
        matches!(self, ModelVariant::Fume | ModelVariant::Hyfr)
    }

    /// Hybrid variants merge `meta_*` bitstream features into the
    /// pooled vector.
    pub fn hybrid(&self) -> bool {
        matches!(self, ModelVariant::Hyfu | ModelVariant::Hyfr)
    }

    /// The variant's frozen feature subset.
    pub fn features(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = NO_REFERENCE_CATALOG
            .iter()
            .filter(|name| !EXPERIMENTAL_FEATURES.contains(name))
            .map(|s| s.to_string())
            .collect();
        if self.full_reference() {
            set.extend(FULL_REFERENCE_CATALOG.iter().map(|s| s.to_string()));
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_catalog_name_constructs() {
        for name in catalog() {
            assert!(
                create_calculator(name).is_some(),
                "catalog name '{name}' has no calculator"
            );
        }
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert!(create_calculator("vmaf").is_none());
        assert!(create_calculator("cubrow.0.7").is_none());
        assert!(create_calculator("").is_none());
    }

    #[test]
    fn test_variant_sets_are_subsets_of_catalog() {
        let universe = catalog();
        for variant in [
            ModelVariant::Nofu,
            ModelVariant::Fume,
            ModelVariant::Hyfu,
            ModelVariant::Hyfr,
        ] {
            for name in variant.features() {
                assert!(universe.contains(name.as_str()), "{name} not in catalog");
            }
        }
    }

    #[test]
    fn test_full_reference_gating() {
        assert!(!ModelVariant::Nofu.features().contains("ssim"));
        assert!(!ModelVariant::Hyfu.features().contains("psnr"));
        assert!(ModelVariant::Fume.features().contains("ssim"));
        assert!(ModelVariant::Hyfr.features().contains("fps"));
        assert!(is_full_reference_feature("vifp"));
        assert!(!is_full_reference_feature("blur"));
    }

    #[test]
    fn test_variant_flags() {
        assert!(!ModelVariant::Nofu.hybrid());
        assert!(ModelVariant::Hyfu.hybrid());
        assert!(ModelVariant::Hyfr.hybrid());
        assert!(ModelVariant::Hyfr.full_reference());
        assert!(!ModelVariant::Hyfu.full_reference());
    }
}
