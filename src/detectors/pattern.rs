//! Pattern detector.
//!
//! Three independent checks over the evaluated window:
//! - rapid sequential transactions (bursts, distinct from sustained-rate
//!   velocity),
//! - identical amounts close in time,
//! - round-number bias, a distributional property flagged once per run
//!   rather than per transaction.

use serde_json::json;

use super::{DetectContext, DetectorOutcome};
use crate::errors::Result;
use crate::{AnomalySignal, SignalKind, Transaction};

const RAPID_GAP_SECONDS: i64 = 60;
const DUPLICATE_GAP_SECONDS: i64 = 30 * 60;
const RAPID_SEVERITY: f64 = 0.7;
const DUPLICATE_SEVERITY: f64 = 0.5;
const ROUND_NUMBER_SEVERITY: f64 = 0.6;
const ROUND_UNIT: f64 = 100.0;

pub fn evaluate(ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    if !ctx.has_baseline() {
        return Ok(DetectorOutcome::NoBaseline);
    }

    let mut sorted_by_time: Vec<&Transaction> = ctx.window.iter().collect();
    sorted_by_time.sort_by_key(|t| t.timestamp);

    let mut signals = rapid_sequences(&sorted_by_time);
    signals.extend(duplicate_amounts(ctx.window));
    signals.extend(round_number_bias(ctx));

    if signals.is_empty() {
        Ok(DetectorOutcome::Clear)
    } else {
        Ok(DetectorOutcome::Flagged(signals))
    }
}

fn rapid_sequences(sorted: &[&Transaction]) -> Vec<AnomalySignal> {
    sorted
        .windows(2)
        .filter(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds() <= RAPID_GAP_SECONDS)
        .map(|pair| {
            AnomalySignal::new(
                SignalKind::Pattern,
                RAPID_SEVERITY,
                "rapid_transactions",
                json!({
                    "previous_id": pair[0].id,
                    "gap_seconds": (pair[1].timestamp - pair[0].timestamp).num_seconds(),
                }),
                Some(pair[1].id),
            )
        })
        .collect()
}

fn duplicate_amounts(window: &[Transaction]) -> Vec<AnomalySignal> {
    let mut sorted: Vec<&Transaction> = window.iter().collect();
    sorted.sort_by(|a, b| {
        a.amount
            .partial_cmp(&b.amount)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    sorted
        .windows(2)
        .filter(|pair| {
            pair[0].amount == pair[1].amount
                && (pair[1].timestamp - pair[0].timestamp)
                    .abs()
                    .num_seconds()
                    <= DUPLICATE_GAP_SECONDS
        })
        .map(|pair| {
            AnomalySignal::new(
                SignalKind::Pattern,
                DUPLICATE_SEVERITY,
                "duplicate_amount",
                json!({
                    "amount": pair[1].amount,
                    "previous_id": pair[0].id,
                    "gap_seconds": (pair[1].timestamp - pair[0].timestamp).abs().num_seconds(),
                }),
                Some(pair[1].id),
            )
        })
        .collect()
}

fn round_number_bias(ctx: &DetectContext<'_>) -> Option<AnomalySignal> {
    if ctx.window.len() <= ctx.config.round_number_min_sample {
        return None;
    }
    let round = ctx
        .window
        .iter()
        .filter(|t| {
            let m = t.magnitude();
            m > 0.0 && m % ROUND_UNIT == 0.0
        })
        .count();
    let fraction = round as f64 / ctx.window.len() as f64;
    if fraction <= ctx.config.round_number_ratio {
        return None;
    }

    Some(AnomalySignal::new(
        SignalKind::Pattern,
        ROUND_NUMBER_SEVERITY,
        "round_number_bias",
        json!({
            "round_count": round,
            "sample_size": ctx.window.len(),
            "fraction": fraction,
        }),
        None,
    ))
}
