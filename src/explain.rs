//! Explanation generator.
//!
//! Turns the structured evidence carried by each signal into a
//! human-readable description, and produces a one-line summary for the
//! alert record as a whole. Rendering is lossless with respect to the
//! evidence: the structured payload stays on the record for the audit sink.

use serde_json::Value;

use crate::{AlertRecord, AnomalySignal};

/// Fill in descriptions for every signal plus the record summary.
pub fn annotate(record: &mut AlertRecord) {
    for signal in &mut record.signals {
        signal.description = describe_signal(signal);
    }
    record.summary = summarize(record);
}

pub fn describe_signal(signal: &AnomalySignal) -> String {
    let ev = &signal.evidence;
    match signal.reason.as_str() {
        "amount_outlier" => {
            let amount = num(ev, "amount");
            let mean = num(ev, "mean");
            match ev.get("z_score").and_then(Value::as_f64) {
                Some(z) => format!(
                    "Amount {:.2} deviates from the typical {:.2} (z = {:.1})",
                    amount, mean, z
                ),
                None => format!(
                    "Amount {:.2} is far outside the usual range around {:.2}",
                    amount, mean
                ),
            }
        }
        "high_velocity" => format!(
            "{} transactions in the last {:.0}h where about {:.1} were expected",
            num(ev, "observed") as u64,
            num(ev, "window_hours"),
            num(ev, "daily_mean") * num(ev, "window_hours") / 24.0,
        ),
        "daily_burst" => format!(
            "{} transactions on {} against a daily average of {:.1}",
            num(ev, "count") as u64,
            text(ev, "date"),
            num(ev, "daily_mean"),
        ),
        "geo_displacement" => format!(
            "Transaction in {} is {:.0} km from the nearest common location ({})",
            text(ev, "location"),
            num(ev, "distance_km"),
            text(ev, "nearest_common"),
        ),
        "unknown_location" => format!(
            "Transaction location \"{}\" could not be resolved",
            text(ev, "location")
        ),
        "unusual_hour" => format!(
            "Transaction at {:02}:00, outside the account's normal hours",
            num(ev, "hour") as u64
        ),
        "weekend_concentration" => format!(
            "{:.0}% of the evaluated window falls on a weekend",
            num(ev, "weekend_fraction") * 100.0
        ),
        "rapid_transactions" => format!(
            "Follows the previous transaction after only {} seconds",
            num(ev, "gap_seconds") as u64
        ),
        "duplicate_amount" => format!(
            "Repeats the exact amount {:.2} within {} minutes",
            num(ev, "amount"),
            num(ev, "gap_seconds") as u64 / 60,
        ),
        "round_number_bias" => format!(
            "{} of {} amounts in the window are exact multiples of 100",
            num(ev, "round_count") as u64,
            num(ev, "sample_size") as u64,
        ),
        "multivariate_outlier" => format!(
            "Cross-feature profile is isolated from the rest of the window (score {:.2})",
            num(ev, "isolation_score")
        ),
        other => format!("{} signal ({})", signal.kind, other),
    }
}

pub fn summarize(record: &AlertRecord) -> String {
    if record.signals.is_empty() {
        return format!("No anomalies for account {}", record.account_id);
    }
    let strongest = record
        .signals
        .iter()
        .max_by(|a, b| {
            a.severity
                .partial_cmp(&b.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|s| s.reason.as_str())
        .unwrap_or("unknown");

    format!(
        "{} alert for account {}: {} signal(s), aggregate severity {:.2}, led by {}{}",
        record.level,
        record.account_id,
        record.signals.len(),
        record.aggregate_severity,
        strongest,
        if record.suppressed { " (suppressed)" } else { "" },
    )
}

fn num(ev: &Value, key: &str) -> f64 {
    ev.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn text<'a>(ev: &'a Value, key: &str) -> &'a str {
    ev.get(key).and_then(Value::as_str).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AlertLevel;
    use crate::SignalKind;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn record_with(signals: Vec<AnomalySignal>) -> AlertRecord {
        AlertRecord {
            account_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            aggregate_severity: 0.75,
            level: AlertLevel::High,
            signals,
            dominant_kind: Some(SignalKind::Amount),
            suppressed: false,
            dedup_key: "k".to_string(),
            summary: String::new(),
        }
    }

    #[test]
    fn test_amount_description_includes_figures() {
        let signal = AnomalySignal::new(
            SignalKind::Amount,
            0.9,
            "amount_outlier",
            json!({ "amount": 5_000_000.0, "mean": 125_000.0, "z_score": 280.5 }),
            None,
        );
        let text = describe_signal(&signal);
        assert!(text.contains("5000000.00"));
        assert!(text.contains("z = 280.5"));
    }

    #[test]
    fn test_unknown_location_description() {
        let signal = AnomalySignal::new(
            SignalKind::Geo,
            0.5,
            "unknown_location",
            json!({ "location": "Atlantis" }),
            None,
        );
        assert!(describe_signal(&signal).contains("Atlantis"));
    }

    #[test]
    fn test_annotate_fills_all_descriptions() {
        let mut record = record_with(vec![
            AnomalySignal::new(
                SignalKind::Temporal,
                0.9,
                "unusual_hour",
                json!({ "hour": 3 }),
                None,
            ),
            AnomalySignal::new(
                SignalKind::Pattern,
                0.7,
                "rapid_transactions",
                json!({ "gap_seconds": 40 }),
                None,
            ),
        ]);
        annotate(&mut record);
        assert!(record.signals.iter().all(|s| !s.description.is_empty()));
        assert!(record.summary.contains("high alert"));
        assert!(record.summary.contains("unusual_hour"));
    }

    #[test]
    fn test_suppressed_marked_in_summary() {
        let mut record = record_with(vec![AnomalySignal::new(
            SignalKind::Velocity,
            0.8,
            "high_velocity",
            json!({ "observed": 6, "window_hours": 6.0, "daily_mean": 3.0 }),
            None,
        )]);
        record.suppressed = true;
        annotate(&mut record);
        assert!(record.summary.ends_with("(suppressed)"));
    }
}
