//! Feature vectors from a fixed, pretrained encoder.
//!
//! The encoder is a capability handed to [`FeatureEngine`]; the engine owns
//! the preprocessing so every image reaches the encoder in the same shape.

use crate::config::{EncoderSource, FeatureConfig};
use crate::core::error::{ConfigurationError, EncoderInferenceError};
use anyhow::{Result, bail};
use image::DynamicImage;
use image::imageops::FilterType;
use ndarray::{Array1, Array2, Array3, ArrayView3, s};
use ndarray_npy::read_npy;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Fixed-length output of an encoder. Only comparable to vectors from the
/// same encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(pub Vec<f32>);

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Maps a preprocessed `(height, width, 3)` tensor to a vector.
///
/// Implementations are shared read-only across threads for a whole run.
pub trait Encoder: Send + Sync {
    fn dimension(&self) -> usize;

    fn encode(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>>;
}

/// Resize and channel normalisation applied before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    pub width: u32,
    pub height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Preprocessor {
    pub fn from_config(config: &FeatureConfig) -> Self {
        Self {
            width: config.input_width,
            height: config.input_height,
            mean: config.mean,
            std: config.std,
        }
    }

    /// Number of values in one preprocessed tensor.
    pub fn input_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn preprocess(&self, image: &DynamicImage) -> Array3<f32> {
        let rgb = image
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();

        Array3::from_shape_fn(
            (self.height as usize, self.width as usize, 3),
            |(y, x, c)| {
                let value = f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0;
                (value - self.mean[c]) / self.std[c]
            },
        )
    }
}

/// Average of each channel over a `grid x grid` lattice. Needs no weights.
pub struct PooledPixelEncoder {
    grid: usize,
}

impl PooledPixelEncoder {
    pub fn new(grid: u32) -> Self {
        Self {
            grid: grid.max(1) as usize,
        }
    }
}

impl Encoder for PooledPixelEncoder {
    fn dimension(&self) -> usize {
        3 * self.grid * self.grid
    }

    fn encode(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>> {
        let (height, width, channels) = input.dim();
        if channels != 3 || height < self.grid || width < self.grid {
            bail!(
                "input {}x{}x{} cannot be pooled on a {} grid",
                height,
                width,
                channels,
                self.grid
            );
        }

        let mut out = Vec::with_capacity(self.dimension());
        for c in 0..3 {
            for gy in 0..self.grid {
                let (y0, y1) = (gy * height / self.grid, (gy + 1) * height / self.grid);
                for gx in 0..self.grid {
                    let (x0, x1) = (gx * width / self.grid, (gx + 1) * width / self.grid);
                    let cell = input.slice(s![y0..y1, x0..x1, c]);
                    out.push(cell.mean().unwrap_or(0.0));
                }
            }
        }
        Ok(out)
    }
}

/// Linear projection `W · x` with `W` of shape `(dimension, input_len)`.
pub struct ProjectionEncoder {
    weights: Array2<f32>,
}

impl ProjectionEncoder {
    pub fn new(weights: Array2<f32>) -> Self {
        Self { weights }
    }

    /// Load `W` from a `.npy` file and check it fits the preprocessed input.
    pub fn load(path: &Path, input_len: usize) -> Result<Self, ConfigurationError> {
        let weights_error = |message: String| ConfigurationError::EncoderWeights {
            path: path.to_path_buf(),
            message,
        };

        let weights: Array2<f32> = read_npy(path).map_err(|e| weights_error(e.to_string()))?;
        if weights.nrows() == 0 || weights.ncols() != input_len {
            return Err(weights_error(format!(
                "expected shape (n, {}), found {:?}",
                input_len,
                weights.shape()
            )));
        }

        log::info!(
            "Loaded projection encoder {:?} from {}",
            weights.shape(),
            path.display()
        );
        Ok(Self::new(weights))
    }
}

impl Encoder for ProjectionEncoder {
    fn dimension(&self) -> usize {
        self.weights.nrows()
    }

    fn encode(&self, input: ArrayView3<'_, f32>) -> Result<Vec<f32>> {
        let flat: Array1<f32> = input.iter().copied().collect();
        if flat.len() != self.weights.ncols() {
            bail!(
                "input has {} values, encoder expects {}",
                flat.len(),
                self.weights.ncols()
            );
        }
        Ok(self.weights.dot(&flat).to_vec())
    }
}

/// Preprocesses images and runs them through one shared encoder.
#[derive(Clone)]
pub struct FeatureEngine {
    encoder: Arc<dyn Encoder>,
    preprocessor: Preprocessor,
}

impl FeatureEngine {
    pub fn new(encoder: Arc<dyn Encoder>, preprocessor: Preprocessor) -> Self {
        Self {
            encoder,
            preprocessor,
        }
    }

    /// Build the encoder named by the config. Weight problems surface here,
    /// once, rather than per image.
    pub fn from_config(config: &FeatureConfig) -> Result<Self, ConfigurationError> {
        let preprocessor = Preprocessor::from_config(config);
        let encoder: Arc<dyn Encoder> = match &config.encoder {
            EncoderSource::Builtin { grid } => Arc::new(PooledPixelEncoder::new(*grid)),
            EncoderSource::Weights { path } => {
                Arc::new(ProjectionEncoder::load(path, preprocessor.input_len())?)
            }
        };
        Ok(Self::new(encoder, preprocessor))
    }

    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    pub fn extract(
        &self,
        id: &str,
        image: &DynamicImage,
    ) -> Result<FeatureVector, EncoderInferenceError> {
        let failed = |message: String| EncoderInferenceError {
            id: id.to_string(),
            message,
        };

        let input = self.preprocessor.preprocess(image);
        let values = self
            .encoder
            .encode(input.view())
            .map_err(|e| failed(format!("{:#}", e)))?;

        if values.len() != self.dimension() {
            return Err(failed(format!(
                "encoder returned {} values, expected {}",
                values.len(),
                self.dimension()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(failed("encoder returned non-finite values".to_string()));
        }

        Ok(FeatureVector(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::euclidean_distance;
    use image::{ImageBuffer, Rgb};
    use ndarray_npy::write_npy;
    use tempfile::TempDir;

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            input_width: 16,
            input_height: 16,
            encoder: EncoderSource::Builtin { grid: 4 },
            ..FeatureConfig::default()
        }
    }

    fn ramp(invert: bool) -> DynamicImage {
        let img = ImageBuffer::from_fn(32, 32, |x, _| {
            let v = (x * 8) as u8;
            let v = if invert { 255 - v } else { v };
            Rgb([v, v / 2, 255 - v])
        });
        DynamicImage::ImageRgb8(img)
    }

    struct FailingEncoder;

    impl Encoder for FailingEncoder {
        fn dimension(&self) -> usize {
            4
        }

        fn encode(&self, _input: ArrayView3<'_, f32>) -> Result<Vec<f32>> {
            bail!("model exploded")
        }
    }

    struct ShortEncoder;

    impl Encoder for ShortEncoder {
        fn dimension(&self) -> usize {
            4
        }

        fn encode(&self, _input: ArrayView3<'_, f32>) -> Result<Vec<f32>> {
            Ok(vec![1.0, 2.0])
        }
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let pre = Preprocessor {
            width: 8,
            height: 4,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        };
        let white = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(20, 10, Rgb([255, 255, 255])));
        let tensor = pre.preprocess(&white);
        assert_eq!(tensor.dim(), (4, 8, 3));
        assert!(tensor.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_builtin_encoder_dimension_and_determinism() {
        let engine = FeatureEngine::from_config(&small_config()).unwrap();
        assert_eq!(engine.dimension(), 48);

        let a = engine.extract("a", &ramp(false)).unwrap();
        let b = engine.extract("a", &ramp(false)).unwrap();
        assert_eq!(a.len(), 48);
        assert_eq!(a, b);
        assert_eq!(euclidean_distance(a.as_slice(), b.as_slice()), 0.0);
    }

    #[test]
    fn test_different_content_is_far_apart() {
        let engine = FeatureEngine::from_config(&small_config()).unwrap();
        let a = engine.extract("a", &ramp(false)).unwrap();
        let b = engine.extract("b", &ramp(true)).unwrap();
        assert!(euclidean_distance(a.as_slice(), b.as_slice()) > 1.0);
    }

    #[test]
    fn test_missing_weights_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = FeatureConfig {
            encoder: EncoderSource::Weights {
                path: temp_dir.path().join("missing.npy"),
            },
            ..small_config()
        };
        assert!(matches!(
            FeatureEngine::from_config(&config),
            Err(ConfigurationError::EncoderWeights { .. })
        ));
    }

    #[test]
    fn test_projection_weights_shape_checked() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("weights.npy");
        write_npy(&path, &Array2::<f32>::ones((5, 10))).unwrap();

        let config = FeatureConfig {
            encoder: EncoderSource::Weights { path },
            ..small_config()
        };
        assert!(matches!(
            FeatureEngine::from_config(&config),
            Err(ConfigurationError::EncoderWeights { .. })
        ));
    }

    #[test]
    fn test_projection_encoder_from_weights() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("weights.npy");
        let config = small_config();
        let input_len = Preprocessor::from_config(&config).input_len();

        let mut weights = Array2::<f32>::zeros((2, input_len));
        weights.row_mut(0).fill(1.0 / input_len as f32);
        weights[[1, 0]] = 1.0;
        write_npy(&path, &weights).unwrap();

        let config = FeatureConfig {
            encoder: EncoderSource::Weights { path },
            ..config
        };
        let engine = FeatureEngine::from_config(&config).unwrap();
        assert_eq!(engine.dimension(), 2);

        let vector = engine.extract("a", &ramp(false)).unwrap();
        assert_eq!(vector.len(), 2);
    }

    #[test]
    fn test_encoder_failure_is_per_image_error() {
        let engine = FeatureEngine::new(
            Arc::new(FailingEncoder),
            Preprocessor::from_config(&small_config()),
        );
        let err = engine.extract("cat.png", &ramp(false)).unwrap_err();
        assert_eq!(err.id, "cat.png");
        assert!(err.message.contains("model exploded"));
    }

    #[test]
    fn test_wrong_output_length_is_per_image_error() {
        let engine = FeatureEngine::new(
            Arc::new(ShortEncoder),
            Preprocessor::from_config(&small_config()),
        );
        let err = engine.extract("dog.png", &ramp(false)).unwrap_err();
        assert!(err.message.contains("expected 4"));
    }
}
