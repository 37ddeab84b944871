//! Pending transaction fraud detection
//!
//! ## Components
//! - Wallet behavioral features over a lookback window
//! - Threshold rules used without a model or after a model failure
//! - Pretrained classifier artifact (logistic regression or tree ensemble)
//! - Two-tier classifier selected once at startup

pub mod config;
pub mod detector;
pub mod errors;
pub mod features;
pub mod model;
pub mod rules;

pub use config::DetectionConfig;
pub use detector::{ClassificationResult, Classifier, Label, Method};
pub use errors::{DetectionError, Result};
pub use features::{
    FeatureComputer, FeatureVector, HistoricalTransaction, TransactionHistory, FEATURE_NAMES,
};
pub use model::{ClassifierArtifact, Preprocessor, ProbabilityModel};
pub use rules::{Indicator, RuleSet};
