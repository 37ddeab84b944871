//! Feature vector invariants over arbitrary wallet histories

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use eth_fraud_stream::anomaly_detection::features::aggregate;
use eth_fraud_stream::anomaly_detection::{
    FeatureComputer, FeatureVector, HistoricalTransaction, TransactionHistory, FEATURE_NAMES,
};
use proptest::prelude::*;
use std::sync::Arc;

const WALLET: &str = "0xwallet";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 16, 23, 30, 0).unwrap()
}

/// (sends, counterparty index, value in milli-ether, minutes ago)
fn history_strategy() -> impl Strategy<Value = Vec<HistoricalTransaction>> {
    prop::collection::vec((any::<bool>(), 0u8..8, 0u64..50_000_000, 0i64..1440), 0..60).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (sends, peer, milli, minutes))| {
                    let peer = format!("0xpeer{}", peer);
                    let (from, to) = if sends {
                        (WALLET.to_string(), peer)
                    } else {
                        (peer, WALLET.to_string())
                    };
                    HistoricalTransaction {
                        hash: format!("0x{:064x}", i),
                        from_address: from,
                        to_address: to,
                        value_eth: milli as f64 / 1000.0,
                        timestamp: now() - Duration::minutes(minutes),
                    }
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn prop_aggregate_is_finite_and_bounded(history in history_strategy()) {
        let features = aggregate(WALLET, &history, now()).unwrap();

        prop_assert!(features.to_vector().iter().all(|v| v.is_finite()));
        prop_assert!(features.total_tx_sent >= 0.0);
        prop_assert!(features.time_diff_first_last_received >= 0.0);
        prop_assert!(features.time_diff_first_last_received <= 24.0);
        prop_assert!(features.value_volatility >= 0.0);
        prop_assert!((0.0..=5.0).contains(&features.value_category));
        prop_assert!(features.value_anomaly == 0.0 || features.value_anomaly == 1.0);
        prop_assert!(features.frequency_anomaly == 0.0 || features.frequency_anomaly == 1.0);
        prop_assert!(features.send_receive_imbalance.abs() <= 1.0);
    }

    #[test]
    fn prop_counts_match_history(history in history_strategy()) {
        let features = aggregate(WALLET, &history, now()).unwrap();
        let sent = history.iter().filter(|tx| tx.from_address == WALLET).count();
        let received: f64 = history
            .iter()
            .filter(|tx| tx.to_address == WALLET)
            .map(|tx| tx.value_eth)
            .sum();

        prop_assert_eq!(features.total_tx_sent, sent as f64);
        prop_assert!((features.total_received - received).abs() < 1e-6);
        prop_assert!(features.total_tx_sent_unique <= 8.0);
    }

    #[test]
    fn prop_elementwise_max_dominates(a in history_strategy(), b in history_strategy()) {
        let fa = aggregate(WALLET, &a, now()).unwrap();
        let fb = aggregate(WALLET, &b, now()).unwrap();
        let merged = fa.elementwise_max(&fb);

        for ((m, x), y) in merged.to_vector().iter().zip(fa.to_vector()).zip(fb.to_vector()) {
            prop_assert!(*m >= x && *m >= y);
            prop_assert!(*m == x || *m == y);
        }
    }
}

#[test]
fn test_serialized_keys_are_trained_columns() {
    let features = FeatureVector::safe_default(now());
    let json = serde_json::to_value(features).unwrap();
    let object = json.as_object().unwrap();

    assert_eq!(object.len(), FEATURE_NAMES.len());
    for name in FEATURE_NAMES {
        assert!(object.contains_key(name), "missing {}", name);
    }
}

struct UnavailableHistory;

#[async_trait]
impl TransactionHistory for UnavailableHistory {
    async fn wallet_history(
        &self,
        _wallet: &str,
        _since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoricalTransaction>> {
        anyhow::bail!("database is locked")
    }
}

#[tokio::test]
async fn test_unavailable_history_yields_safe_default() {
    let computer = FeatureComputer::new(Arc::new(UnavailableHistory), 24);
    let features = computer.compute_at(WALLET, now()).await;
    assert_eq!(features, FeatureVector::safe_default(now()));

    // Saturday 23:30 UTC
    assert_eq!(features.is_weekend, 1.0);
    assert_eq!(features.is_night, 1.0);
    assert_eq!(features.is_business_hours, 0.0);
}
