//! End-to-end detection scenarios exercised through the public engine API.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use riskwatch::{
    config::DetectionConfig,
    engine::{DetectionEngine, InMemorySource},
    geo::StaticResolver,
    AlertLevel, SignalKind, TimeWindow, Transaction,
};

fn tx_at(account_id: Uuid, amount: f64, ts: DateTime<Utc>, location: Option<&str>) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        account_id,
        amount,
        currency: "USD".to_string(),
        timestamp: ts,
        location: location.map(str::to_string),
        category: Some("payment".to_string()),
        merchant: None,
        success: true,
        fee: 1.0,
    }
}

/// Daytime history, roughly 3 transactions per day.
fn steady_history(account: Uuid, n: usize, base: f64, spread: f64) -> Vec<Transaction> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            // Hours cycle 08:00, 13:00, 18:00 to stay clear of the
            // unusual-hour band.
            let day = (i / 3) as i64;
            let slot = (i % 3) as i64;
            tx_at(
                account,
                base + (i % 6) as f64 * spread,
                start + Duration::days(day) + Duration::hours(slot * 5),
                Some("Nairobi"),
            )
        })
        .collect()
}

fn engine_for(history: Vec<Transaction>) -> DetectionEngine {
    let source = Arc::new(InMemorySource::new(history));
    let resolver = Arc::new(StaticResolver::new().with_place("Nairobi", -1.2921, 36.8219));
    DetectionEngine::new(DetectionConfig::default(), source, resolver).unwrap()
}

#[tokio::test]
async fn amount_outlier_scenario() {
    let account = Uuid::new_v4();
    // Baseline: 30 historical transactions between 100_000 and 150_000.
    let mut history = steady_history(account, 30, 100_000.0, 10_000.0);
    let last = history.last().unwrap().timestamp;
    let spike_ts = last + Duration::hours(2); // 20:00, ordinary hour
    history.push(tx_at(account, 5_000_000.0, spike_ts, Some("Nairobi")));

    let engine = engine_for(history);
    let window = TimeWindow::new(spike_ts - Duration::hours(1), spike_ts + Duration::hours(1));
    let record = engine.evaluate(account, window).await.unwrap();

    let amount_signal = record
        .signals
        .iter()
        .find(|s| s.reason == "amount_outlier")
        .expect("amount outlier must be flagged");
    assert!(amount_signal.severity >= 0.7);
    assert!(!record.suppressed);
}

#[tokio::test]
async fn velocity_burst_scenario() {
    let account = Uuid::new_v4();
    // Account averaging 3 transactions per day.
    let mut history = steady_history(account, 30, 100.0, 10.0);
    let last = history.last().unwrap().timestamp;
    // 6 transactions within an 8-minute span, evenly spaced to keep the
    // burst a pure rate anomaly.
    let burst_start = last + Duration::hours(2);
    for i in 0..6 {
        history.push(tx_at(
            account,
            90.0 + i as f64,
            burst_start + Duration::seconds(i * 96),
            Some("Nairobi"),
        ));
    }

    let engine = engine_for(history);
    let window = TimeWindow::new(burst_start, burst_start + Duration::minutes(10));
    let record = engine.evaluate(account, window).await.unwrap();
    assert!(
        record.level >= AlertLevel::Medium,
        "expected at least medium, got {} (severity {:.2})",
        record.level,
        record.aggregate_severity
    );
}

#[tokio::test]
async fn deep_night_high_amount_scenario() {
    let account = Uuid::new_v4();
    let history = steady_history(account, 30, 100.0, 10.0);
    let last = history.last().unwrap().timestamp;
    // 03:00 transaction above the 80th-percentile amount (baseline spans
    // 100..150, probe at 149).
    let night = (last + Duration::days(1)).date_naive().and_hms_opt(3, 0, 0).unwrap().and_utc();
    let mut all = history.clone();
    all.push(tx_at(account, 149.0, night, Some("Nairobi")));

    let engine = engine_for(all);
    let window = TimeWindow::new(night - Duration::hours(1), night + Duration::hours(1));
    let record = engine.evaluate(account, window).await.unwrap();

    let relevant: Vec<_> = record
        .signals
        .iter()
        .filter(|s| matches!(s.kind, SignalKind::Temporal | SignalKind::Amount))
        .collect();
    assert!(!relevant.is_empty());
    assert!(relevant.iter().all(|s| !s.reason.is_empty()));
}

#[tokio::test]
async fn duplicate_amount_scenario() {
    let account = Uuid::new_v4();
    let mut history = steady_history(account, 30, 100.0, 10.0);
    let last = history.last().unwrap().timestamp;
    let first = last + Duration::hours(2);
    history.push(tx_at(account, 200_000.0, first, Some("Nairobi")));
    history.push(tx_at(account, 200_000.0, first + Duration::minutes(10), Some("Nairobi")));

    let engine = engine_for(history);
    let window = TimeWindow::new(first - Duration::minutes(5), first + Duration::minutes(30));
    let record = engine.evaluate(account, window).await.unwrap();
    assert!(
        record.signals.iter().any(|s| s.reason == "duplicate_amount"),
        "signals: {:?}",
        record.signals.iter().map(|s| &s.reason).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn concurrent_evaluations_emit_exactly_once() {
    let account = Uuid::new_v4();
    let mut history = steady_history(account, 30, 100_000.0, 10_000.0);
    let last = history.last().unwrap().timestamp;
    let spike_ts = last + Duration::hours(2);
    history.push(tx_at(account, 5_000_000.0, spike_ts, Some("Nairobi")));

    let engine = Arc::new(engine_for(history));
    let window = TimeWindow::new(spike_ts - Duration::hours(1), spike_ts + Duration::hours(1));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.evaluate(account, window).await.unwrap()
        }));
    }

    let mut emitted = 0;
    for handle in handles {
        let record = handle.await.unwrap();
        assert!(record.aggregate_severity >= 0.4);
        if !record.suppressed {
            emitted += 1;
        }
    }
    assert_eq!(emitted, 1, "exactly one concurrent evaluation may emit");
}

#[tokio::test]
async fn batch_sweep_flags_only_suspicious_accounts() {
    let quiet = Uuid::new_v4();
    let noisy = Uuid::new_v4();
    let mut history = steady_history(quiet, 24, 100.0, 10.0);

    // Noisy account: steady history plus a retrospective burst day with
    // duplicated round amounts.
    let mut noisy_txs = steady_history(noisy, 24, 100.0, 10.0);
    let burst_day = noisy_txs.last().unwrap().timestamp + Duration::days(2);
    for i in 0..10 {
        noisy_txs.push(tx_at(
            noisy,
            500.0,
            burst_day + Duration::minutes(i * 20),
            Some("Nairobi"),
        ));
    }
    history.extend(noisy_txs);

    let engine = engine_for(Vec::new());
    let records = engine.evaluate_batch(&history).await;
    assert_eq!(records.len(), 2);

    let noisy_record = records.iter().find(|r| r.account_id == noisy).unwrap();
    let quiet_record = records.iter().find(|r| r.account_id == quiet).unwrap();
    assert!(noisy_record.aggregate_severity > quiet_record.aggregate_severity);
    assert!(noisy_record.signals.iter().any(|s| s.reason == "daily_burst"));
}
