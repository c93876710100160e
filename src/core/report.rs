use crate::core::error::{ExportError, ImageIssue};
use crate::core::fingerprint::Fingerprint;
use crate::core::grouper::{CrossGroup, FingerprintGroup};
use crate::core::matcher::DuplicatePair;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Fingerprint-equal groups, in first-seen fingerprint order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "groups", rename_all = "snake_case")]
pub enum FingerprintDuplicates {
    Within(Vec<FingerprintGroup>),
    Across(Vec<CrossGroup>),
}

impl FingerprintDuplicates {
    pub fn len(&self) -> usize {
        match self {
            FingerprintDuplicates::Within(groups) => groups.len(),
            FingerprintDuplicates::Across(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one detection run. Fingerprint and feature duplicates are kept
/// as separate result sets; the same images may show up in both.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub generated_at: DateTime<Utc>,
    pub fingerprint_duplicates: FingerprintDuplicates,
    pub feature_duplicates: Vec<DuplicatePair>,
    /// Images skipped for at least one stage of the run
    pub issues: Vec<ImageIssue>,
}

impl DuplicateReport {
    pub fn new(
        fingerprint_duplicates: FingerprintDuplicates,
        feature_duplicates: Vec<DuplicatePair>,
        issues: Vec<ImageIssue>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            fingerprint_duplicates,
            feature_duplicates,
            issues,
        }
    }

    pub fn within_group(&self, fingerprint: Fingerprint) -> Option<&FingerprintGroup> {
        match &self.fingerprint_duplicates {
            FingerprintDuplicates::Within(groups) => {
                groups.iter().find(|g| g.fingerprint == fingerprint)
            }
            FingerprintDuplicates::Across(_) => None,
        }
    }

    pub fn cross_group(&self, fingerprint: Fingerprint) -> Option<&CrossGroup> {
        match &self.fingerprint_duplicates {
            FingerprintDuplicates::Across(groups) => {
                groups.iter().find(|g| g.fingerprint == fingerprint)
            }
            FingerprintDuplicates::Within(_) => None,
        }
    }

    pub fn has_duplicates(&self) -> bool {
        !self.fingerprint_duplicates.is_empty() || !self.feature_duplicates.is_empty()
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
