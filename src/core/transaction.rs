use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly_detection::{ClassificationResult, FeatureVector};
use crate::blockchain::PendingTransaction;

/// A pending transaction with its feature snapshot and classification.
///
/// Immutable once built; persisted at most once per hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTransaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value_eth: f64,
    /// Gas price in wei
    pub gas_price: f64,
    pub timestamp: DateTime<Utc>,
    pub features: FeatureVector,
    pub classification: ClassificationResult,
}

impl ClassifiedTransaction {
    pub fn new(
        pending: PendingTransaction,
        observed_at: DateTime<Utc>,
        features: FeatureVector,
        classification: ClassificationResult,
    ) -> Self {
        Self {
            hash: pending.hash,
            from: pending.from,
            to: pending.to,
            value_eth: pending.value_eth,
            gas_price: pending.gas_price,
            timestamp: observed_at,
            features,
            classification,
        }
    }

    pub fn is_suspicious(&self) -> bool {
        self.classification.label.is_suspicious()
    }

    /// Hash prefix for log lines
    pub fn short_hash(&self) -> &str {
        self.hash.get(..10).unwrap_or(&self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly_detection::{Label, Method};

    #[test]
    fn test_short_hash() {
        let pending = PendingTransaction {
            hash: "0xabcdef0123456789".to_string(),
            from: "0x1".to_string(),
            to: "0x2".to_string(),
            value_eth: 1.5,
            gas_price: 2e9,
        };
        let now = Utc::now();
        let tx = ClassifiedTransaction::new(
            pending,
            now,
            FeatureVector::safe_default(now),
            ClassificationResult {
                label: Label::Suspicious,
                method: Method::RuleFull,
                probability: None,
            },
        );
        assert_eq!(tx.short_hash(), "0xabcdef01");
        assert!(tx.is_suspicious());

        let mut short = tx.clone();
        short.hash = "0xab".to_string();
        assert_eq!(short.short_hash(), "0xab");
    }
}
