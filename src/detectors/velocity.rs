//! Velocity / frequency detector.
//!
//! Streaming mode compares the transaction count in the trailing window
//! against the rate the daily baseline predicts. The severity scale is
//! stepped rather than linear so extreme ratios saturate instead of
//! inflating the aggregate. Batch mode retrospectively flags individual
//! days whose count exceeds mean + 2 stdev.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde_json::json;

use super::{DetectContext, DetectorOutcome};
use crate::errors::Result;
use crate::{AnomalySignal, SignalKind};

/// Floor on the expected count so near-dormant accounts do not blow the
/// ratio up to infinity.
const MIN_EXPECTED: f64 = 0.1;

pub fn evaluate(ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    if !ctx.has_baseline() {
        return Ok(DetectorOutcome::NoBaseline);
    }

    let signals = if ctx.batch {
        batch_signals(ctx)
    } else {
        streaming_signal(ctx).into_iter().collect()
    };

    if signals.is_empty() {
        Ok(DetectorOutcome::Clear)
    } else {
        Ok(DetectorOutcome::Flagged(signals))
    }
}

/// observed/expected ratio for a trailing window; monotone in the observed
/// count for a fixed baseline.
pub fn velocity_ratio(observed: usize, daily_mean: f64, window_hours: f64) -> f64 {
    let expected = (daily_mean * window_hours / 24.0).max(MIN_EXPECTED);
    observed as f64 / expected
}

fn stepped_severity(ratio: f64) -> f64 {
    if ratio > 10.0 {
        1.0
    } else if ratio > 5.0 {
        0.8
    } else {
        (ratio / 5.0).min(1.0)
    }
}

fn streaming_signal(ctx: &DetectContext<'_>) -> Option<AnomalySignal> {
    let window_hours = ctx.config.velocity_window_hours;
    let cutoff = ctx.now - Duration::seconds((window_hours * 3600.0) as i64);
    let observed = ctx
        .window
        .iter()
        .filter(|t| t.timestamp > cutoff && t.timestamp <= ctx.now)
        .count();

    let ratio = velocity_ratio(observed, ctx.baseline.daily.mean, window_hours);
    if ratio <= ctx.config.velocity_ratio_threshold {
        return None;
    }

    Some(AnomalySignal::new(
        SignalKind::Velocity,
        stepped_severity(ratio),
        "high_velocity",
        json!({
            "observed": observed,
            "window_hours": window_hours,
            "daily_mean": ctx.baseline.daily.mean,
            "ratio": ratio,
        }),
        None,
    ))
}

fn batch_signals(ctx: &DetectContext<'_>) -> Vec<AnomalySignal> {
    let daily = &ctx.baseline.daily;
    if daily.std_dev <= f64::EPSILON {
        return Vec::new();
    }
    let threshold = daily.mean + 2.0 * daily.std_dev;

    let mut day_counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for t in ctx.window {
        *day_counts.entry(t.timestamp.date_naive()).or_insert(0) += 1;
    }

    day_counts
        .into_iter()
        .filter(|(_, count)| *count as f64 > threshold)
        .map(|(date, count)| {
            let ratio = count as f64 / daily.mean.max(MIN_EXPECTED);
            AnomalySignal::new(
                SignalKind::Velocity,
                stepped_severity(ratio),
                "daily_burst",
                json!({
                    "date": date.to_string(),
                    "count": count,
                    "daily_mean": daily.mean,
                    "daily_std_dev": daily.std_dev,
                }),
                None,
            )
        })
        .collect()
}
