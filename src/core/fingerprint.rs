use crate::config::{FingerprintAlgorithm, FingerprintConfig};
use crate::core::error::DecodeError;
use crate::core::source::ImageRecord;
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 64-bit perceptual hash of an image. Two fingerprints match only when
/// every bit is equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Number of differing bits. Diagnostic only: grouping never uses it.
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    fn from_hash_bytes(bytes: &[u8]) -> Self {
        Fingerprint(
            bytes
                .iter()
                .take(8)
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
        )
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Fingerprint)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Computes fingerprints with one fixed hasher configuration.
pub struct FingerprintEngine {
    hasher: Hasher,
    algorithm: FingerprintAlgorithm,
}

impl FingerprintEngine {
    pub fn new(config: &FingerprintConfig) -> Self {
        let base = HasherConfig::new().hash_size(8, 8);
        let hasher = match config.algorithm {
            FingerprintAlgorithm::Perceptual => base.hash_alg(HashAlg::Mean).preproc_dct(),
            FingerprintAlgorithm::Mean => base.hash_alg(HashAlg::Mean),
            FingerprintAlgorithm::Gradient => base.hash_alg(HashAlg::Gradient),
        }
        .to_hasher();

        Self {
            hasher,
            algorithm: config.algorithm,
        }
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }

    pub fn fingerprint(&self, image: &DynamicImage) -> Fingerprint {
        Fingerprint::from_hash_bytes(self.hasher.hash_image(image).as_bytes())
    }

    /// Decode the record and fingerprint it. Never substitutes a default on failure.
    pub fn fingerprint_record(&self, record: &ImageRecord) -> Result<Fingerprint, DecodeError> {
        let image = record.decode()?;
        Ok(self.fingerprint(&image))
    }
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new(&FingerprintConfig::default())
    }
}
