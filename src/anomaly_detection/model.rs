//! Pretrained classifier artifact
//!
//! The artifact is a JSON bundle produced by the training pipeline:
//!
//! ```json
//! {
//!   "features": ["Month", "Day", "..."],
//!   "preprocessor": { "kind": "standard_scaler", "mean": [..], "scale": [..] },
//!   "model": { "kind": "logistic_regression", "coefficients": [..], "intercept": 0.0 }
//! }
//! ```
//!
//! `model.kind` may also be `gradient_boosted_trees`. Shape mismatches are not
//! rejected at load time; they surface as inference failures.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::errors::{DetectionError, Result};
use super::features::FeatureVector;

/// Transforms an aligned feature row into model input space
pub trait Preprocessor: Send + Sync {
    fn transform(&self, row: &[f64]) -> Result<Vec<f64>>;

    fn name(&self) -> &'static str;
}

/// Produces the probability of the suspicious class
pub trait ProbabilityModel: Send + Sync {
    fn predict_proba(&self, row: &[f64]) -> Result<f64>;

    fn name(&self) -> &'static str;
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// z-score scaling with per-column mean and scale
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self { mean, scale }
    }
}

impl Preprocessor for StandardScaler {
    fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() || row.len() != self.scale.len() {
            return Err(DetectionError::Preprocessing(format!(
                "scaler fitted on {} columns (scale {}), got {}",
                self.mean.len(),
                self.scale.len(),
                row.len()
            )));
        }

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (mean, scale))| {
                // constant columns are fitted with zero scale
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "standard_scaler"
    }
}

/// Identity preprocessor
#[derive(Debug, Clone, Default)]
pub struct Passthrough;

impl Preprocessor for Passthrough {
    fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        Ok(row.to_vec())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Binary logistic regression
#[derive(Debug, Clone)]
pub struct LogisticModel {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }
}

impl ProbabilityModel for LogisticModel {
    fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(DetectionError::ModelInference(format!(
                "model expects {} inputs, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }

        let margin: f64 = self.intercept
            + row
                .iter()
                .zip(self.coefficients.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>();
        Ok(sigmoid(margin))
    }

    fn name(&self) -> &'static str {
        "logistic_regression"
    }
}

/// Node of a regression tree, stored flat with child indices
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn leaf_value(&self, row: &[f64]) -> Result<f64> {
        let mut index = 0usize;
        // a well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { leaf }) => return Ok(*leaf),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).ok_or_else(|| {
                        DetectionError::ModelInference(format!(
                            "split on feature {} but row has {} columns",
                            feature,
                            row.len()
                        ))
                    })?;
                    index = if value < threshold { *left } else { *right };
                }
                None => {
                    return Err(DetectionError::ModelInference(format!(
                        "node index {} out of range ({} nodes)",
                        index,
                        self.nodes.len()
                    )))
                }
            }
        }
        Err(DetectionError::ModelInference("tree contains a cycle".to_string()))
    }
}

/// Additive tree ensemble with a logistic link
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_score: f64,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn new(base_score: f64, trees: Vec<Tree>) -> Self {
        Self { base_score, trees }
    }
}

impl ProbabilityModel for TreeEnsemble {
    fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        let mut margin = self.base_score;
        for tree in &self.trees {
            margin += tree.leaf_value(row)?;
        }
        Ok(sigmoid(margin))
    }

    fn name(&self) -> &'static str {
        "gradient_boosted_trees"
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PreprocessorSpec {
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
    Passthrough,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelSpec {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    GradientBoostedTrees {
        #[serde(default)]
        base_score: f64,
        trees: Vec<Tree>,
    },
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    features: Vec<String>,
    preprocessor: PreprocessorSpec,
    model: ModelSpec,
}

/// Loaded classifier bundle: model, preprocessor and trained column order.
///
/// Immutable once constructed.
pub struct ClassifierArtifact {
    feature_order: Vec<String>,
    preprocessor: Box<dyn Preprocessor>,
    model: Box<dyn ProbabilityModel>,
}

impl std::fmt::Debug for ClassifierArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierArtifact")
            .field("features", &self.feature_order.len())
            .field("preprocessor", &self.preprocessor.name())
            .field("model", &self.model.name())
            .finish()
    }
}

impl ClassifierArtifact {
    pub fn new(
        feature_order: Vec<String>,
        preprocessor: Box<dyn Preprocessor>,
        model: Box<dyn ProbabilityModel>,
    ) -> Self {
        Self {
            feature_order,
            preprocessor,
            model,
        }
    }

    /// Parse an artifact from its JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(content)
            .map_err(|e| DetectionError::ArtifactLoad(format!("invalid artifact: {}", e)))?;

        if file.features.is_empty() {
            return Err(DetectionError::ArtifactLoad(
                "artifact lists no trained features".to_string(),
            ));
        }

        let preprocessor: Box<dyn Preprocessor> = match file.preprocessor {
            PreprocessorSpec::StandardScaler { mean, scale } => {
                Box::new(StandardScaler::new(mean, scale))
            }
            PreprocessorSpec::Passthrough => Box::new(Passthrough),
        };

        let model: Box<dyn ProbabilityModel> = match file.model {
            ModelSpec::LogisticRegression {
                coefficients,
                intercept,
            } => Box::new(LogisticModel::new(coefficients, intercept)),
            ModelSpec::GradientBoostedTrees { base_score, trees } => {
                Box::new(TreeEnsemble::new(base_score, trees))
            }
        };

        Ok(Self::new(file.features, preprocessor, model))
    }

    /// Read and parse an artifact file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "reading classifier artifact");
        let content = std::fs::read_to_string(path)?;
        let artifact = Self::from_json(&content)?;
        info!(
            "📦 Loaded classifier artifact from {} ({} features, {} + {})",
            path.display(),
            artifact.feature_order.len(),
            artifact.preprocessor.name(),
            artifact.model.name()
        );
        Ok(artifact)
    }

    /// First candidate path that exists on disk.
    pub fn locate(candidates: &[PathBuf]) -> Option<&PathBuf> {
        candidates.iter().find(|path| path.is_file())
    }

    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Reorder `features` to the trained column order; unknown columns are zero.
    pub fn align(&self, features: &FeatureVector) -> Vec<f64> {
        self.feature_order
            .iter()
            .map(|name| features.get(name).unwrap_or(0.0))
            .collect()
    }

    /// Probability of the suspicious class for `features`.
    pub fn suspicious_probability(&self, features: &FeatureVector) -> Result<f64> {
        let row = self.align(features);
        let transformed = self.preprocessor.transform(&row)?;
        if transformed.iter().any(|v| !v.is_finite()) {
            return Err(DetectionError::InvalidInput(
                "preprocessed row contains non-finite values".to_string(),
            ));
        }

        let probability = self.model.predict_proba(&transformed)?;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(DetectionError::ModelInference(format!(
                "probability out of range: {}",
                probability
            )));
        }
        Ok(probability)
    }
}
