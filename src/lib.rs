//! Duplicate and near-duplicate image detection.
//!
//! Two signals are computed per image: a 64-bit perceptual fingerprint for
//! exact grouping, and an encoder feature vector for distance matching
//! across collections. [`core::DuplicateResolver`] runs both and returns a
//! [`core::DuplicateReport`].

pub mod config;
pub mod core;

pub use crate::config::DetectorConfig;
pub use crate::core::{DuplicateReport, DuplicateResolver, ImageSource};
