//! Rule-based fallback classification
//!
//! Threshold indicators evaluated over a combined transaction feature vector.
//! The full set is used when no pretrained artifact is loaded; the reduced set
//! is used when model inference fails mid-call.

use super::features::FeatureVector;

/// Received activity spanning less than this many seconds is considered bursty.
pub const RECENT_RECEIVED_SPAN_SECS: f64 = 300.0;

/// Sent count above which a wallet is considered high-volume.
pub const HIGH_SEND_COUNT: f64 = 50.0;

/// Received value volatility above which a wallet is considered erratic.
pub const HIGH_VALUE_VOLATILITY: f64 = 0.7;

/// A single boolean risk indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// Received span shorter than [`RECENT_RECEIVED_SPAN_SECS`]
    RecentReceivedSpan,
    /// More than [`HIGH_SEND_COUNT`] sent transactions in the window
    HighSendCount,
    /// Value volatility above [`HIGH_VALUE_VOLATILITY`]
    HighValueVolatility,
    /// Value anomaly flag set
    ValueAnomaly,
    /// Frequency anomaly flag set
    FrequencyAnomaly,
}

impl Indicator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RecentReceivedSpan => "recent_received_span",
            Self::HighSendCount => "high_send_count",
            Self::HighValueVolatility => "high_value_volatility",
            Self::ValueAnomaly => "value_anomaly",
            Self::FrequencyAnomaly => "frequency_anomaly",
        }
    }

    /// Whether the indicator holds for `features`.
    pub fn holds(&self, features: &FeatureVector) -> bool {
        match self {
            // span is stored in hours
            Self::RecentReceivedSpan => {
                features.time_diff_first_last_received * 3600.0 < RECENT_RECEIVED_SPAN_SECS
            }
            Self::HighSendCount => features.total_tx_sent > HIGH_SEND_COUNT,
            Self::HighValueVolatility => features.value_volatility > HIGH_VALUE_VOLATILITY,
            Self::ValueAnomaly => features.value_anomaly >= 1.0,
            Self::FrequencyAnomaly => features.frequency_anomaly >= 1.0,
        }
    }
}

/// A set of indicators plus the number that must hold to flag a transaction
#[derive(Debug, Clone, Copy)]
pub struct RuleSet {
    indicators: &'static [Indicator],
    min_triggered: usize,
}

impl RuleSet {
    /// Used when no artifact is loaded: suspicious iff at least 2 of 5 hold.
    pub const FULL: RuleSet = RuleSet {
        indicators: &[
            Indicator::RecentReceivedSpan,
            Indicator::HighSendCount,
            Indicator::HighValueVolatility,
            Indicator::ValueAnomaly,
            Indicator::FrequencyAnomaly,
        ],
        min_triggered: 2,
    };

    /// Used after a model failure: suspicious iff at least 1 of 2 holds.
    pub const DEGRADED: RuleSet = RuleSet {
        indicators: &[Indicator::RecentReceivedSpan, Indicator::HighSendCount],
        min_triggered: 1,
    };

    pub fn indicators(&self) -> &'static [Indicator] {
        self.indicators
    }

    pub fn min_triggered(&self) -> usize {
        self.min_triggered
    }

    /// Indicators that hold for `features`.
    pub fn triggered(&self, features: &FeatureVector) -> Vec<Indicator> {
        self.indicators
            .iter()
            .copied()
            .filter(|indicator| indicator.holds(features))
            .collect()
    }

    pub fn is_suspicious(&self, features: &FeatureVector) -> bool {
        self.triggered(features).len() >= self.min_triggered
    }
}
