//! Fraud detection configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fraud detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Wallet history window in hours
    pub lookback_hours: u64,

    /// Model probability above which a transaction is suspicious
    pub suspicious_threshold: f64,

    /// Candidate artifact locations, tried in order
    pub artifact_paths: Vec<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            suspicious_threshold: 0.7,
            artifact_paths: vec![
                PathBuf::from("fraud_detection_model.json"),
                PathBuf::from("models/fraud_detection_model.json"),
            ],
        }
    }
}

impl DetectionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.lookback_hours == 0 {
            return Err("lookback_hours must be > 0".to_string());
        }

        if !(0.0..1.0).contains(&self.suspicious_threshold) {
            return Err("suspicious_threshold must be in [0, 1)".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectionConfig::default();
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.suspicious_threshold, 0.7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold() {
        let config = DetectionConfig {
            suspicious_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: DetectionConfig = toml::from_str("lookback_hours = 6").unwrap();
        assert_eq!(config.lookback_hours, 6);
        assert_eq!(config.artifact_paths.len(), 2);
    }
}
