//! Wallet feature computation
//!
//! Aggregates a wallet's recent transaction history into the fixed 18-field
//! vector the classifier was trained on.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::errors::{DetectionError, Result};

/// Feature names in trained column order.
pub const FEATURE_NAMES: [&str; 18] = [
    "Month",
    "Day",
    "Hour",
    "time_diff_first_last_received",
    "total_tx_sent",
    "total_tx_sent_unique",
    "mean_value_received",
    "total_received",
    "value_volatility",
    "tx_volatility",
    "send_receive_imbalance",
    "unique_behavior_ratio",
    "is_weekend",
    "is_night",
    "is_business_hours",
    "value_category",
    "value_anomaly",
    "frequency_anomaly",
];

/// Guards the volatility ratio against a zero mean.
const VOLATILITY_EPSILON: f64 = 1e-8;

/// Mean received value above which the value anomaly flag is raised (ether).
pub const VALUE_ANOMALY_THRESHOLD: f64 = 10.0;

/// Sent count above which the frequency anomaly flag is raised.
pub const FREQUENCY_ANOMALY_THRESHOLD: f64 = 100.0;

/// Per-wallet behavioural feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    // === calendar ===
    #[serde(rename = "Month")]
    pub month: f64,
    #[serde(rename = "Day")]
    pub day: f64,
    #[serde(rename = "Hour")]
    pub hour: f64,

    // === behaviour ===
    /// Hours between the first and last received transaction
    pub time_diff_first_last_received: f64,
    pub total_tx_sent: f64,
    /// Distinct counterparties across both directions
    pub total_tx_sent_unique: f64,
    pub mean_value_received: f64,
    pub total_received: f64,
    /// std / mean of received values
    pub value_volatility: f64,
    /// Sent transactions per hour of received span
    pub tx_volatility: f64,
    pub send_receive_imbalance: f64,
    pub unique_behavior_ratio: f64,

    // === context flags ===
    pub is_weekend: f64,
    pub is_night: f64,
    pub is_business_hours: f64,

    // === anomaly ===
    /// Ordinal bucket 0-5 of the mean received value
    pub value_category: f64,
    pub value_anomaly: f64,
    pub frequency_anomaly: f64,
}

impl FeatureVector {
    /// Safe fallback: zero behaviour, calendar flags from `now`.
    pub fn safe_default(now: DateTime<Utc>) -> Self {
        let calendar = CalendarContext::at(now);
        Self {
            month: calendar.month,
            day: calendar.day,
            hour: calendar.hour,
            time_diff_first_last_received: 0.0,
            total_tx_sent: 0.0,
            total_tx_sent_unique: 0.0,
            mean_value_received: 0.0,
            total_received: 0.0,
            value_volatility: 0.0,
            tx_volatility: 0.0,
            send_receive_imbalance: 0.0,
            unique_behavior_ratio: 0.0,
            is_weekend: calendar.is_weekend,
            is_night: calendar.is_night,
            is_business_hours: calendar.is_business_hours,
            value_category: 0.0,
            value_anomaly: 0.0,
            frequency_anomaly: 0.0,
        }
    }

    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_vector(&self) -> [f64; 18] {
        [
            self.month,
            self.day,
            self.hour,
            self.time_diff_first_last_received,
            self.total_tx_sent,
            self.total_tx_sent_unique,
            self.mean_value_received,
            self.total_received,
            self.value_volatility,
            self.tx_volatility,
            self.send_receive_imbalance,
            self.unique_behavior_ratio,
            self.is_weekend,
            self.is_night,
            self.is_business_hours,
            self.value_category,
            self.value_anomaly,
            self.frequency_anomaly,
        ]
    }

    /// Rebuild from a slice in [`FEATURE_NAMES`] order.
    pub fn from_vector(vec: &[f64]) -> Option<Self> {
        if vec.len() != Self::dimension() {
            return None;
        }

        Some(Self {
            month: vec[0],
            day: vec[1],
            hour: vec[2],
            time_diff_first_last_received: vec[3],
            total_tx_sent: vec[4],
            total_tx_sent_unique: vec[5],
            mean_value_received: vec[6],
            total_received: vec[7],
            value_volatility: vec[8],
            tx_volatility: vec[9],
            send_receive_imbalance: vec[10],
            unique_behavior_ratio: vec[11],
            is_weekend: vec[12],
            is_night: vec[13],
            is_business_hours: vec[14],
            value_category: vec[15],
            value_anomaly: vec[16],
            frequency_anomaly: vec[17],
        })
    }

    pub fn dimension() -> usize {
        FEATURE_NAMES.len()
    }

    /// Look up a field by its trained column name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.to_vector()[i])
    }

    /// `(name, value)` pairs in trained column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.to_vector())
    }

    /// Field-wise maximum of two wallet vectors.
    ///
    /// Transaction-level features are the max of the sender's and receiver's
    /// vectors, so either party's risk signal carries into classification.
    pub fn elementwise_max(&self, other: &Self) -> Self {
        let a = self.to_vector();
        let b = other.to_vector();
        let mut merged = [0.0; 18];
        for (slot, (x, y)) in merged.iter_mut().zip(a.iter().zip(b.iter())) {
            *slot = x.max(*y);
        }
        // lengths match by construction
        Self::from_vector(&merged).unwrap_or(*self)
    }

    fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

/// Wall-clock context flags, independent of the history window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarContext {
    pub month: f64,
    pub day: f64,
    pub hour: f64,
    pub is_weekend: f64,
    pub is_night: f64,
    pub is_business_hours: f64,
}

impl CalendarContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        let hour = now.hour();
        Self {
            month: now.month() as f64,
            day: now.day() as f64,
            hour: hour as f64,
            is_weekend: flag(now.weekday().num_days_from_monday() >= 5),
            is_night: flag(hour >= 22 || hour <= 6),
            is_business_hours: flag((9..=17).contains(&hour)),
        }
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Ordinal bucket keyed by mean received value.
pub fn value_category(mean_value_received: f64) -> f64 {
    if mean_value_received == 0.0 {
        0.0
    } else if mean_value_received <= 0.01 {
        1.0
    } else if mean_value_received <= 0.1 {
        2.0
    } else if mean_value_received <= 1.0 {
        3.0
    } else if mean_value_received <= 10.0 {
        4.0
    } else {
        5.0
    }
}

/// One row of wallet history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalTransaction {
    pub hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value_eth: f64,
    pub timestamp: DateTime<Utc>,
}

/// Source of wallet history (the persisted ledger in production)
#[async_trait]
pub trait TransactionHistory: Send + Sync {
    /// All transactions where `wallet` is sender or receiver, observed at or after `since`.
    async fn wallet_history(
        &self,
        wallet: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoricalTransaction>>;
}

/// Aggregate `history` into a feature vector for `wallet`.
pub fn aggregate(
    wallet: &str,
    history: &[HistoricalTransaction],
    now: DateTime<Utc>,
) -> Result<FeatureVector> {
    let sent: Vec<&HistoricalTransaction> =
        history.iter().filter(|tx| tx.from_address == wallet).collect();
    let received: Vec<&HistoricalTransaction> =
        history.iter().filter(|tx| tx.to_address == wallet).collect();

    let total_tx_sent = sent.len() as f64;
    let total_received: f64 = received.iter().map(|tx| tx.value_eth).sum();
    let total_sent: f64 = sent.iter().map(|tx| tx.value_eth).sum();

    let unique_counterparties = sent
        .iter()
        .map(|tx| tx.to_address.as_str())
        .chain(received.iter().map(|tx| tx.from_address.as_str()))
        .collect::<HashSet<_>>()
        .len() as f64;

    // span of received activity, in hours
    let time_diff = if received.len() > 1 {
        let first = received.iter().map(|tx| tx.timestamp).min();
        let last = received.iter().map(|tx| tx.timestamp).max();
        match (first, last) {
            (Some(first), Some(last)) => (last - first).num_milliseconds() as f64 / 3_600_000.0,
            _ => 0.0,
        }
    } else {
        0.0
    };

    let (mean_value_received, value_volatility) = if received.is_empty() {
        (0.0, 0.0)
    } else {
        let n = received.len() as f64;
        let mean = total_received / n;
        let std = if received.len() > 1 {
            let variance = received
                .iter()
                .map(|tx| (tx.value_eth - mean).powi(2))
                .sum::<f64>()
                / n;
            variance.sqrt()
        } else {
            0.0
        };
        (mean, std / (mean + VOLATILITY_EPSILON))
    };

    let tx_volatility = total_tx_sent / (time_diff + 1.0);
    let total_volume = total_sent + total_received;
    let send_receive_imbalance = (total_sent - total_received) / (total_volume + 1.0);
    let unique_behavior_ratio = unique_counterparties / (total_tx_sent + 1.0);

    let calendar = CalendarContext::at(now);
    let features = FeatureVector {
        month: calendar.month,
        day: calendar.day,
        hour: calendar.hour,
        time_diff_first_last_received: time_diff,
        total_tx_sent,
        total_tx_sent_unique: unique_counterparties,
        mean_value_received,
        total_received,
        value_volatility,
        tx_volatility,
        send_receive_imbalance,
        unique_behavior_ratio,
        is_weekend: calendar.is_weekend,
        is_night: calendar.is_night,
        is_business_hours: calendar.is_business_hours,
        value_category: value_category(mean_value_received),
        value_anomaly: flag(mean_value_received > VALUE_ANOMALY_THRESHOLD),
        frequency_anomaly: flag(total_tx_sent > FREQUENCY_ANOMALY_THRESHOLD),
    };

    if !features.is_finite() {
        return Err(DetectionError::FeatureComputation(format!(
            "non-finite aggregate for {} ({} rows)",
            wallet,
            history.len()
        )));
    }

    Ok(features)
}

/// Computes wallet feature vectors over a trailing lookback window
#[derive(Clone)]
pub struct FeatureComputer {
    history: Arc<dyn TransactionHistory>,
    lookback: Duration,
}

impl FeatureComputer {
    pub fn new(history: Arc<dyn TransactionHistory>, lookback_hours: u64) -> Self {
        Self {
            history,
            lookback: Duration::hours(lookback_hours as i64),
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Feature vector for `wallet` as of now. Never fails.
    pub async fn compute(&self, wallet: &str) -> FeatureVector {
        self.compute_at(wallet, Utc::now()).await
    }

    /// Feature vector for `wallet` as of `now`.
    ///
    /// Any failure yields [`FeatureVector::safe_default`]; callers never see a
    /// partial vector.
    pub async fn compute_at(&self, wallet: &str, now: DateTime<Utc>) -> FeatureVector {
        match self.try_compute(wallet, now).await {
            Ok(features) => features,
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "feature computation failed, using safe defaults");
                FeatureVector::safe_default(now)
            }
        }
    }

    /// Combined vector for a transaction: field-wise max of both parties.
    pub async fn compute_for_transaction(&self, sender: &str, receiver: &str) -> FeatureVector {
        let now = Utc::now();
        let from_features = self.compute_at(sender, now).await;
        let to_features = self.compute_at(receiver, now).await;
        from_features.elementwise_max(&to_features)
    }

    async fn try_compute(&self, wallet: &str, now: DateTime<Utc>) -> Result<FeatureVector> {
        let since = now - self.lookback;
        let history = self
            .history
            .wallet_history(wallet, since)
            .await
            .map_err(|e| DetectionError::History(e.to_string()))?;

        debug!(wallet = %wallet, rows = history.len(), "aggregating wallet history");
        aggregate(wallet, &history, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    struct StaticHistory {
        rows: Vec<HistoricalTransaction>,
        fail: bool,
    }

    #[async_trait]
    impl TransactionHistory for StaticHistory {
        async fn wallet_history(
            &self,
            wallet: &str,
            since: DateTime<Utc>,
        ) -> anyhow::Result<Vec<HistoricalTransaction>> {
            if self.fail {
                anyhow::bail!("database is locked");
            }
            Ok(self
                .rows
                .iter()
                .filter(|tx| (tx.from_address == wallet || tx.to_address == wallet) && tx.timestamp >= since)
                .cloned()
                .collect())
        }
    }

    fn tx(from: &str, to: &str, value: f64, at: DateTime<Utc>) -> HistoricalTransaction {
        HistoricalTransaction {
            hash: format!("0x{}{}{}", from, to, at.timestamp_millis()),
            from_address: from.to_string(),
            to_address: to.to_string(),
            value_eth: value,
            timestamp: at,
        }
    }

    // Wednesday, 14:00 UTC
    fn weekday_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_vector_round_trip_keeps_order() {
        let features = FeatureVector::safe_default(weekday_afternoon());
        let vec = features.to_vector();
        assert_eq!(vec.len(), FeatureVector::dimension());
        assert_eq!(FeatureVector::from_vector(&vec), Some(features));
        assert_eq!(features.get("Month"), Some(5.0));
        assert_eq!(features.get("is_business_hours"), Some(1.0));
        assert_eq!(features.get("unknown"), None);
    }

    #[test]
    fn test_serialized_keys_match_trained_names() {
        let features = FeatureVector::safe_default(weekday_afternoon());
        let json = serde_json::to_value(features).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 18);
        for name in FEATURE_NAMES {
            assert!(object.contains_key(name), "missing {}", name);
        }
    }

    #[test]
    fn test_empty_history_defaults() {
        let now = weekday_afternoon();
        let features = aggregate("0xabc", &[], now).unwrap();
        assert_eq!(features, FeatureVector::safe_default(now));
    }

    #[test]
    fn test_aggregate_behavioural_fields() {
        let now = weekday_afternoon();
        let w = "0xwallet";
        let rows = vec![
            tx("0xa", w, 1.0, now - Duration::hours(3)),
            tx("0xb", w, 3.0, now - Duration::hours(1)),
            tx(w, "0xa", 0.5, now - Duration::minutes(30)),
            tx(w, "0xc", 1.5, now - Duration::minutes(10)),
        ];

        let f = aggregate(w, &rows, now).unwrap();
        assert_eq!(f.total_tx_sent, 2.0);
        // a, b from receive side + a, c from send side
        assert_eq!(f.total_tx_sent_unique, 3.0);
        assert_eq!(f.total_received, 4.0);
        assert_eq!(f.mean_value_received, 2.0);
        assert!((f.time_diff_first_last_received - 2.0).abs() < 1e-9);
        // population std of [1, 3] is 1
        assert!((f.value_volatility - 0.5).abs() < 1e-6);
        assert!((f.tx_volatility - 2.0 / 3.0).abs() < 1e-9);
        assert!((f.send_receive_imbalance - (2.0 - 4.0) / 7.0).abs() < 1e-9);
        assert!((f.unique_behavior_ratio - 1.0).abs() < 1e-9);
        assert_eq!(f.value_category, 4.0);
        assert_eq!(f.value_anomaly, 0.0);
        assert_eq!(f.frequency_anomaly, 0.0);
    }

    #[test]
    fn test_single_received_has_zero_span_and_volatility() {
        let now = weekday_afternoon();
        let rows = vec![tx("0xa", "0xw", 20.0, now - Duration::hours(2))];
        let f = aggregate("0xw", &rows, now).unwrap();
        assert_eq!(f.time_diff_first_last_received, 0.0);
        assert_eq!(f.value_volatility, 0.0);
        assert_eq!(f.value_anomaly, 1.0);
        assert_eq!(f.value_category, 5.0);
    }

    #[test_case(0.0, 0.0)]
    #[test_case(0.005, 1.0)]
    #[test_case(0.01, 1.0)]
    #[test_case(0.05, 2.0)]
    #[test_case(0.5, 3.0)]
    #[test_case(10.0, 4.0)]
    #[test_case(10.5, 5.0)]
    fn test_value_category_buckets(mean: f64, expected: f64) {
        assert_eq!(value_category(mean), expected);
    }

    #[test_case(2024, 5, 18, 12, 1.0, 0.0, 1.0 ; "saturday noon")]
    #[test_case(2024, 5, 15, 23, 0.0, 1.0, 0.0 ; "weekday late night")]
    #[test_case(2024, 5, 15, 6, 0.0, 1.0, 0.0 ; "six am counts as night")]
    #[test_case(2024, 5, 15, 9, 0.0, 0.0, 1.0 ; "nine am business")]
    #[test_case(2024, 5, 15, 17, 0.0, 0.0, 1.0 ; "five pm business")]
    #[test_case(2024, 5, 15, 18, 0.0, 0.0, 0.0 ; "evening")]
    fn test_calendar_flags(y: i32, m: u32, d: u32, h: u32, weekend: f64, night: f64, business: f64) {
        let ctx = CalendarContext::at(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap());
        assert_eq!(ctx.is_weekend, weekend);
        assert_eq!(ctx.is_night, night);
        assert_eq!(ctx.is_business_hours, business);
    }

    #[test]
    fn test_elementwise_max() {
        let now = weekday_afternoon();
        let mut a = FeatureVector::safe_default(now);
        let mut b = FeatureVector::safe_default(now);
        a.total_tx_sent = 60.0;
        a.value_volatility = 0.2;
        b.total_tx_sent = 5.0;
        b.value_volatility = 0.9;
        b.send_receive_imbalance = -0.5;

        let merged = a.elementwise_max(&b);
        assert_eq!(merged.total_tx_sent, 60.0);
        assert_eq!(merged.value_volatility, 0.9);
        assert_eq!(merged.send_receive_imbalance, 0.0);
    }

    #[test]
    fn test_non_finite_aggregate_is_error() {
        let now = weekday_afternoon();
        let rows = vec![tx("0xa", "0xw", f64::INFINITY, now - Duration::hours(1))];
        let err = aggregate("0xw", &rows, now).unwrap_err();
        assert!(matches!(err, DetectionError::FeatureComputation(_)));
    }

    #[tokio::test]
    async fn test_history_failure_returns_safe_defaults() {
        let computer = FeatureComputer::new(
            Arc::new(StaticHistory { rows: vec![], fail: true }),
            24,
        );
        let now = weekday_afternoon();
        let f = computer.compute_at("0xw", now).await;
        assert_eq!(f, FeatureVector::safe_default(now));
        assert_eq!(f.iter().count(), 18);
    }

    #[tokio::test]
    async fn test_lookback_window_excludes_old_rows() {
        let now = Utc::now();
        let rows = vec![
            tx("0xw", "0xa", 1.0, now - Duration::hours(30)),
            tx("0xw", "0xb", 1.0, now - Duration::hours(2)),
        ];
        let computer = FeatureComputer::new(Arc::new(StaticHistory { rows, fail: false }), 24);
        let f = computer.compute_at("0xw", now).await;
        assert_eq!(f.total_tx_sent, 1.0);
    }
}
