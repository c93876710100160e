pub mod error;
pub mod feature;
pub mod fingerprint;
pub mod grouper;
pub mod matcher;
pub mod report;
pub mod resolver;
pub mod source;

pub use error::{ConfigurationError, DecodeError, EncoderInferenceError, ExportError, ImageIssue};
pub use feature::{Encoder, FeatureEngine, FeatureVector, Preprocessor};
pub use fingerprint::{Fingerprint, FingerprintEngine};
pub use grouper::{CrossGroup, FingerprintGroup};
pub use matcher::{DuplicatePair, NearestNeighborMatcher};
pub use report::{DuplicateReport, FingerprintDuplicates};
pub use resolver::{CollectionAnalysis, DuplicateResolver};
pub use source::{ImageRecord, ImageSource};
