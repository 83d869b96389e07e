//! Temporal anomaly detector.
//!
//! Two checks: deep-night transactions (02:00-05:59, with 03:00-04:59
//! weighted higher) and weekend concentration. The weekend check is a
//! population-level, low-confidence signal: when more than 40% of the
//! evaluated window falls on a weekend and the account has both weekday and
//! weekend history, every weekend transaction is flagged at a fixed low
//! severity.

use serde_json::json;

use super::{DetectContext, DetectorOutcome};
use crate::errors::Result;
use crate::{AnomalySignal, SignalKind};

const UNUSUAL_HOURS: [u32; 4] = [2, 3, 4, 5];
const DEEP_NIGHT_HOURS: [u32; 2] = [3, 4];
const WEEKEND_FRACTION_THRESHOLD: f64 = 0.4;
const WEEKEND_SEVERITY: f64 = 0.5;

pub fn evaluate(ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    if !ctx.has_baseline() {
        return Ok(DetectorOutcome::NoBaseline);
    }

    let mut signals = Vec::new();

    for tx in ctx.window {
        let hour = tx.hour();
        if !UNUSUAL_HOURS.contains(&hour) {
            continue;
        }
        let severity = if DEEP_NIGHT_HOURS.contains(&hour) {
            0.6 + 0.3
        } else {
            0.6
        };
        signals.push(AnomalySignal::new(
            SignalKind::Temporal,
            severity,
            "unusual_hour",
            json!({
                "hour": hour,
                "typical_hours": modal_hours(&ctx.baseline.hour_histogram),
            }),
            Some(tx.id),
        ));
    }

    signals.extend(weekend_concentration(ctx));

    if signals.is_empty() {
        Ok(DetectorOutcome::Clear)
    } else {
        Ok(DetectorOutcome::Flagged(signals))
    }
}

fn weekend_concentration(ctx: &DetectContext<'_>) -> Vec<AnomalySignal> {
    // Only meaningful when the account has seen both kinds of day.
    if ctx.baseline.weekend_count() == 0 || ctx.baseline.weekday_count() == 0 {
        return Vec::new();
    }
    if ctx.window.is_empty() {
        return Vec::new();
    }

    let weekend: Vec<_> = ctx.window.iter().filter(|t| t.is_weekend()).collect();
    let fraction = weekend.len() as f64 / ctx.window.len() as f64;
    if fraction <= WEEKEND_FRACTION_THRESHOLD {
        return Vec::new();
    }

    weekend
        .into_iter()
        .map(|tx| {
            AnomalySignal::new(
                SignalKind::Temporal,
                WEEKEND_SEVERITY,
                "weekend_concentration",
                json!({
                    "weekend_fraction": fraction,
                    "window_size": ctx.window.len(),
                }),
                Some(tx.id),
            )
        })
        .collect()
}

/// Top-3 most frequent hours, for explanation context.
fn modal_hours(histogram: &[u32; 24]) -> Vec<u32> {
    let mut ranked: Vec<(u32, u32)> = histogram
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > 0)
        .map(|(h, &c)| (h as u32, c))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(3).map(|(h, _)| h).collect()
}
