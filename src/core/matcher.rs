//! Exhaustive nearest-neighbour matching across two collections.
//!
//! Every left vector is compared against every right vector, so the cost is
//! `|left| * |right|` distance evaluations. That is fine for folders of a few
//! hundred images; larger corpora would need an index.

use crate::config::DEFAULT_FEATURE_THRESHOLD;
use crate::core::error::ConfigurationError;
use crate::core::feature::FeatureVector;
use serde::Serialize;

/// A cross-collection pair whose vectors are closer than the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicatePair {
    pub left: String,
    pub right: String,
    pub distance: f64,
}

/// Euclidean distance, accumulated in `f64`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[derive(Debug, Clone)]
pub struct NearestNeighborMatcher {
    threshold: f64,
}

impl NearestNeighborMatcher {
    pub fn new(threshold: f64) -> Result<Self, ConfigurationError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigurationError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// All pairs with distance strictly below the threshold, left-major in
    /// input order. An image may appear in any number of pairs, but an
    /// identifier is never paired with itself.
    pub fn find_pairs(
        &self,
        left: &[(String, FeatureVector)],
        right: &[(String, FeatureVector)],
    ) -> Result<Vec<DuplicatePair>, ConfigurationError> {
        let dimension = match (left.first(), right.first()) {
            (Some((_, l)), Some((_, r))) => {
                if l.len() != r.len() {
                    return Err(ConfigurationError::DimensionMismatch {
                        left: l.len(),
                        right: r.len(),
                    });
                }
                l.len()
            }
            _ => return Ok(Vec::new()),
        };

        if let Some((_, v)) = left
            .iter()
            .chain(right.iter())
            .find(|(_, v)| v.len() != dimension)
        {
            return Err(ConfigurationError::DimensionMismatch {
                left: dimension,
                right: v.len(),
            });
        }

        let mut pairs = Vec::new();
        for (left_id, left_vec) in left {
            for (right_id, right_vec) in right {
                if left_id == right_id {
                    continue;
                }
                let distance = euclidean_distance(left_vec.as_slice(), right_vec.as_slice());
                if distance < self.threshold {
                    log::debug!("{} ~ {} at distance {:.4}", left_id, right_id, distance);
                    pairs.push(DuplicatePair {
                        left: left_id.clone(),
                        right: right_id.clone(),
                        distance,
                    });
                }
            }
        }

        Ok(pairs)
    }
}

impl Default for NearestNeighborMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FEATURE_THRESHOLD,
        }
    }
}
