//! Transaction classifier
//!
//! Selected once at startup: model-backed when a pretrained artifact loads,
//! rule-based for the rest of the process lifetime otherwise.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::config::DetectionConfig;
use super::features::FeatureVector;
use super::model::ClassifierArtifact;
use super::rules::RuleSet;

/// Binary classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Suspicious,
    Legitimate,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suspicious => "SUSPICIOUS",
            Self::Legitimate => "LEGITIMATE",
        }
    }

    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::Suspicious)
    }

    fn from_flag(suspicious: bool) -> Self {
        if suspicious {
            Self::Suspicious
        } else {
            Self::Legitimate
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification path that produced a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Model,
    RuleFull,
    RuleDegraded,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "MODEL",
            Self::RuleFull => "RULE_FULL",
            Self::RuleDegraded => "RULE_DEGRADED",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one classification call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    pub method: Method,
    /// Model probability, only set on the model path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl ClassificationResult {
    fn from_rules(rules: &RuleSet, method: Method, features: &FeatureVector) -> Self {
        Self {
            label: Label::from_flag(rules.is_suspicious(features)),
            method,
            probability: None,
        }
    }
}

/// Two-tier transaction classifier
#[derive(Debug, Clone)]
pub enum Classifier {
    ModelBacked {
        artifact: Arc<ClassifierArtifact>,
        threshold: f64,
    },
    RuleBased,
}

impl Classifier {
    pub fn model_backed(artifact: ClassifierArtifact, threshold: f64) -> Self {
        Self::ModelBacked {
            artifact: Arc::new(artifact),
            threshold,
        }
    }

    /// Load the first artifact found among `paths`; any failure selects rule-based mode.
    pub fn load_from_paths(paths: &[PathBuf], threshold: f64) -> Self {
        let Some(path) = ClassifierArtifact::locate(paths) else {
            warn!(
                "⚠️ No classifier artifact found ({} candidates), using rule-based classification",
                paths.len()
            );
            return Self::RuleBased;
        };

        match ClassifierArtifact::load(path) {
            Ok(artifact) => {
                info!("🤖 Model-backed classification enabled (threshold {})", threshold);
                Self::model_backed(artifact, threshold)
            }
            Err(e) => {
                error!(
                    "❌ Failed to load classifier artifact {}: {}, using rule-based classification",
                    path.display(),
                    e
                );
                Self::RuleBased
            }
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::load_from_paths(&config.artifact_paths, config.suspicious_threshold)
    }

    /// Mode name for logs and health output
    pub fn mode(&self) -> &'static str {
        match self {
            Self::ModelBacked { .. } => "model",
            Self::RuleBased => "rule_based",
        }
    }

    /// Classify a combined feature vector. Never fails.
    pub fn classify(&self, features: &FeatureVector) -> ClassificationResult {
        match self {
            Self::RuleBased => ClassificationResult::from_rules(&RuleSet::FULL, Method::RuleFull, features),
            Self::ModelBacked {
                artifact,
                threshold,
            } => match artifact.suspicious_probability(features) {
                Ok(probability) => {
                    debug!(probability, "model classification");
                    ClassificationResult {
                        label: Label::from_flag(probability > *threshold),
                        method: Method::Model,
                        probability: Some(probability),
                    }
                }
                Err(e) => {
                    warn!("Model classification failed, using reduced rules: {}", e);
                    ClassificationResult::from_rules(
                        &RuleSet::DEGRADED,
                        Method::RuleDegraded,
                        features,
                    )
                }
            },
        }
    }
}
