//! Run configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Values are validated once, before any image is touched.

use crate::core::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Distance below which two feature vectors count as duplicates.
pub const DEFAULT_FEATURE_THRESHOLD: f64 = 0.1;

/// ImageNet channel statistics, the usual normalisation for pretrained encoders.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub source: SourceConfig,
    pub fingerprint: FingerprintConfig,
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Descend into subdirectories of a collection
    pub recursive: bool,
    /// File extensions treated as images, compared case-insensitively
    pub extensions: Vec<String>,
    /// Upper bound on images taken from one collection
    pub max_images: Option<usize>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            extensions: ["jpg", "jpeg", "png", "bmp", "gif"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_images: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintAlgorithm {
    /// Mean hash over a DCT of the image (pHash)
    #[default]
    Perceptual,
    /// Mean hash over raw pixels (aHash)
    Mean,
    /// Row gradient hash (dHash)
    Gradient,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub algorithm: FingerprintAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderSource {
    /// Weight-free pooled pixel descriptor
    Builtin { grid: u32 },
    /// Linear projection matrix stored as `.npy`
    Weights { path: PathBuf },
}

impl Default for EncoderSource {
    fn default() -> Self {
        EncoderSource::Builtin { grid: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub enabled: bool,
    pub threshold: f64,
    /// Withhold images already in a fingerprint group from the feature pass
    pub skip_exact_matches: bool,
    pub input_width: u32,
    pub input_height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub encoder: EncoderSource,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_FEATURE_THRESHOLD,
            skip_exact_matches: false,
            input_width: 224,
            input_height: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            encoder: EncoderSource::default(),
        }
    }
}

impl DetectorConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let unreadable = |message: String| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            message,
        };
        let text = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/dupfinder/config.json`, if the platform has a config dir.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dupfinder").join("config.json"))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.source.extensions.is_empty() {
            return Err(ConfigurationError::Invalid(
                "at least one image extension is required".to_string(),
            ));
        }

        let features = &self.features;
        if !features.threshold.is_finite() || features.threshold < 0.0 {
            return Err(ConfigurationError::InvalidThreshold(features.threshold));
        }
        if features.input_width == 0 || features.input_height == 0 {
            return Err(ConfigurationError::Invalid(format!(
                "encoder input size must be non-zero, got {}x{}",
                features.input_width, features.input_height
            )));
        }
        if features.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ConfigurationError::Invalid(
                "channel std components must be finite and non-zero".to_string(),
            ));
        }
        if let EncoderSource::Builtin { grid } = features.encoder {
            if grid == 0 || grid > features.input_width.min(features.input_height) {
                return Err(ConfigurationError::Invalid(format!(
                    "pooling grid {grid} does not fit a {}x{} input",
                    features.input_width, features.input_height
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.features.threshold, 0.1);
        assert!(!config.features.enabled);
        assert_eq!(config.fingerprint.algorithm, FingerprintAlgorithm::Perceptual);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = DetectorConfig::default();
        config.features.threshold = -0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidThreshold(_))
        ));

        config.features.threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_is_allowed() {
        let mut config = DetectorConfig::default();
        config.features.threshold = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "features": { "enabled": true, "threshold": 0.25,
                              "encoder": { "kind": "weights", "path": "w.npy" } },
                "source": { "recursive": true }
            }"#,
        )
        .unwrap();

        let config = DetectorConfig::load(&path).unwrap();
        assert!(config.features.enabled);
        assert_eq!(config.features.threshold, 0.25);
        assert_eq!(
            config.features.encoder,
            EncoderSource::Weights {
                path: PathBuf::from("w.npy")
            }
        );
        assert!(config.source.recursive);
        assert_eq!(config.source.extensions.len(), 5);
        assert_eq!(config.features.input_width, 224);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "features": { "threshold": -1.0 } }"#).unwrap();
        assert!(matches!(
            DetectorConfig::load(&path),
            Err(ConfigurationError::InvalidThreshold(_))
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DetectorConfig::load(&path),
            Err(ConfigurationError::Unreadable { .. })
        ));
    }
}
