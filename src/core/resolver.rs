//! Runs the fingerprint and feature passes over one or two collections and
//! assembles the [`DuplicateReport`].

use crate::config::{DetectorConfig, FingerprintAlgorithm};
use crate::core::error::{ConfigurationError, ImageIssue};
use crate::core::feature::{FeatureEngine, FeatureVector};
use crate::core::fingerprint::{Fingerprint, FingerprintEngine};
use crate::core::grouper::{group_across, group_within};
use crate::core::matcher::NearestNeighborMatcher;
use crate::core::report::{DuplicateReport, FingerprintDuplicates};
use crate::core::source::{ImageRecord, ImageSource};
use rayon::prelude::*;
use std::collections::HashSet;

/// Everything computed for one collection, in enumeration order.
#[derive(Debug, Default)]
pub struct CollectionAnalysis {
    pub fingerprints: Vec<(String, Fingerprint)>,
    pub features: Vec<(String, FeatureVector)>,
    pub issues: Vec<ImageIssue>,
}

struct ImageOutcome {
    id: String,
    fingerprint: Option<Fingerprint>,
    feature: Option<FeatureVector>,
    issue: Option<ImageIssue>,
}

pub struct DuplicateResolver {
    fingerprints: FingerprintEngine,
    features: Option<FeatureEngine>,
    matcher: NearestNeighborMatcher,
    skip_exact_matches: bool,
}

impl DuplicateResolver {
    /// Validate the config and build every engine. The encoder, if enabled,
    /// is loaded here and shared read-only for the rest of the run.
    pub fn new(config: &DetectorConfig) -> Result<Self, ConfigurationError> {
        Self::build(config, config.features.enabled)
    }

    /// Like [`DuplicateResolver::new`] but never loads an encoder, for runs
    /// that only group by fingerprint.
    pub fn fingerprint_only(config: &DetectorConfig) -> Result<Self, ConfigurationError> {
        Self::build(config, false)
    }

    fn build(config: &DetectorConfig, with_features: bool) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let matcher = NearestNeighborMatcher::new(config.features.threshold)?;
        let features = if with_features {
            Some(FeatureEngine::from_config(&config.features)?)
        } else {
            None
        };

        Ok(Self {
            fingerprints: FingerprintEngine::new(&config.fingerprint),
            features,
            matcher,
            skip_exact_matches: config.features.skip_exact_matches,
        })
    }

    /// Use this engine for the feature pass, enabling it if it was off.
    pub fn with_feature_engine(mut self, engine: FeatureEngine) -> Self {
        self.features = Some(engine);
        self
    }

    pub fn features_enabled(&self) -> bool {
        self.features.is_some()
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.fingerprints.algorithm()
    }

    /// Decode, fingerprint and (optionally) encode every image in `source`.
    /// Work is spread across threads; results keep the source's order.
    pub fn analyze(&self, source: &ImageSource, with_features: bool) -> CollectionAnalysis {
        let features = if with_features {
            self.features.as_ref()
        } else {
            None
        };

        let records: Vec<ImageRecord> = source.records().collect();
        let outcomes: Vec<ImageOutcome> = records
            .par_iter()
            .map(|record| self.analyze_one(record, features))
            .collect();

        let mut analysis = CollectionAnalysis::default();
        for outcome in outcomes {
            if let Some(fingerprint) = outcome.fingerprint {
                analysis.fingerprints.push((outcome.id.clone(), fingerprint));
            }
            if let Some(feature) = outcome.feature {
                analysis.features.push((outcome.id.clone(), feature));
            }
            if let Some(issue) = outcome.issue {
                analysis.issues.push(issue);
            }
        }

        log::info!(
            "Analysed {} images: {} fingerprinted, {} encoded, {} skipped",
            records.len(),
            analysis.fingerprints.len(),
            analysis.features.len(),
            analysis.issues.len()
        );
        analysis
    }

    fn analyze_one(&self, record: &ImageRecord, features: Option<&FeatureEngine>) -> ImageOutcome {
        let mut outcome = ImageOutcome {
            id: record.id.clone(),
            fingerprint: None,
            feature: None,
            issue: None,
        };

        let image = match record.decode() {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Skipping image: {}", e);
                outcome.issue = Some(e.into());
                return outcome;
            }
        };

        outcome.fingerprint = Some(self.fingerprints.fingerprint(&image));

        if let Some(engine) = features {
            match engine.extract(&record.id, &image) {
                Ok(vector) => outcome.feature = Some(vector),
                Err(e) => {
                    log::warn!("{}; it will only take part in fingerprint grouping", e);
                    outcome.issue = Some(e.into());
                }
            }
        }

        outcome
    }

    /// Feature pass over records already fingerprinted. Decoding is repeated
    /// here, so a record that fails now is reported as a decode issue.
    fn encode(
        &self,
        engine: &FeatureEngine,
        records: &[ImageRecord],
    ) -> (Vec<(String, FeatureVector)>, Vec<ImageIssue>) {
        let outcomes: Vec<Result<(String, FeatureVector), ImageIssue>> = records
            .par_iter()
            .map(|record| {
                let image = record.decode()?;
                let vector = engine.extract(&record.id, &image)?;
                Ok((record.id.clone(), vector))
            })
            .collect();

        let mut features = Vec::new();
        let mut issues = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(feature) => features.push(feature),
                Err(issue) => {
                    log::warn!("Skipping feature pass: {}", issue);
                    issues.push(issue);
                }
            }
        }
        (features, issues)
    }

    /// Encode the fingerprinted records of `source` that are not in `flagged`.
    fn encode_remaining(
        &self,
        engine: &FeatureEngine,
        source: &ImageSource,
        analysis: &mut CollectionAnalysis,
        flagged: &HashSet<&str>,
    ) {
        let fingerprinted: HashSet<&str> =
            analysis.fingerprints.iter().map(|(id, _)| id.as_str()).collect();
        let records: Vec<ImageRecord> = source
            .records()
            .filter(|r| fingerprinted.contains(r.id.as_str()) && !flagged.contains(r.id.as_str()))
            .collect();
        log::info!(
            "Encoding {} image(s) not already grouped by fingerprint",
            records.len()
        );

        let (features, issues) = self.encode(engine, &records);
        analysis.features = features;
        analysis.issues.extend(issues);
    }

    /// Fingerprint duplicates inside one collection.
    pub fn within(&self, source: &ImageSource) -> DuplicateReport {
        let analysis = self.analyze(source, false);
        let groups = group_within(analysis.fingerprints);
        log::info!("Found {} fingerprint group(s)", groups.len());

        DuplicateReport::new(
            FingerprintDuplicates::Within(groups),
            Vec::new(),
            analysis.issues,
        )
    }

    /// Fingerprint duplicates across two collections, plus feature matches
    /// when the feature pass is enabled.
    pub fn across(
        &self,
        left: &ImageSource,
        right: &ImageSource,
    ) -> Result<DuplicateReport, ConfigurationError> {
        if let (Some(l), Some(r)) = (left.root(), right.root()) {
            if l.canonicalize().ok() == r.canonicalize().ok() {
                log::info!(
                    "{} is compared with itself; images are never paired with themselves",
                    l.display()
                );
            }
        }

        // With skip_exact_matches the feature pass waits for grouping, so
        // grouped images are never encoded.
        let deferred = self.skip_exact_matches && self.features.is_some();
        let with_features = self.features.is_some() && !deferred;
        let mut left_analysis = self.analyze(left, with_features);
        let mut right_analysis = self.analyze(right, with_features);

        let groups = group_across(
            left_analysis.fingerprints.iter().cloned(),
            right_analysis.fingerprints.iter().cloned(),
        );
        log::info!("Found {} cross-collection fingerprint group(s)", groups.len());

        let pairs = match &self.features {
            Some(engine) => {
                if deferred {
                    let flagged_left: HashSet<&str> = groups
                        .iter()
                        .flat_map(|g| g.left.iter().map(String::as_str))
                        .collect();
                    let flagged_right: HashSet<&str> = groups
                        .iter()
                        .flat_map(|g| g.right.iter().map(String::as_str))
                        .collect();
                    self.encode_remaining(engine, left, &mut left_analysis, &flagged_left);
                    self.encode_remaining(engine, right, &mut right_analysis, &flagged_right);
                }

                let pairs = self
                    .matcher
                    .find_pairs(&left_analysis.features, &right_analysis.features)?;
                log::info!(
                    "Found {} feature pair(s) under distance {}",
                    pairs.len(),
                    self.matcher.threshold()
                );
                pairs
            }
            None => Vec::new(),
        };

        let mut issues = left_analysis.issues;
        issues.extend(right_analysis.issues);

        Ok(DuplicateReport::new(
            FingerprintDuplicates::Across(groups),
            pairs,
            issues,
        ))
    }
}
