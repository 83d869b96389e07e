//! Amount outlier detector.
//!
//! Three OR-combined rules over the baseline amount distribution: z-score,
//! IQR fences, and a mean multiplier. Severity is the MAX of the normalized
//! sub-scores, not their sum, so correlated evidence is not double-counted.
//! A zero-stdev baseline disables the detector entirely: a degenerate
//! distribution gives no basis for any of the three rules.

use serde_json::json;

use super::{DetectContext, DetectorOutcome};
use crate::errors::Result;
use crate::{AnomalySignal, SignalKind};

pub fn evaluate(ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    if !ctx.has_baseline() {
        return Ok(DetectorOutcome::NoBaseline);
    }

    let stats = &ctx.baseline.amount;
    if stats.std_dev <= f64::EPSILON {
        return Ok(DetectorOutcome::Clear);
    }

    let mut signals = Vec::new();
    for tx in ctx.window {
        let value = tx.magnitude();

        let z = stats.z_score(value);
        let z_hit = z.map(|z| z.abs() > ctx.config.amount_z_threshold).unwrap_or(false);
        let fence_hit = value < stats.lower_fence || value > stats.upper_fence;
        let multiplier_hit = stats.mean > 0.0 && value > stats.mean * ctx.config.amount_multiplier;

        if !(z_hit || fence_hit || multiplier_hit) {
            continue;
        }

        let z_score = z.map(|z| (z.abs() / 5.0).min(1.0)).unwrap_or(0.0);
        let multiplier_score = if stats.mean > 0.0 {
            (value / stats.mean / 10.0).min(1.0)
        } else {
            0.0
        };
        let fence_score = if fence_hit && stats.iqr > f64::EPSILON {
            let overshoot = if value > stats.upper_fence {
                value - stats.upper_fence
            } else {
                stats.lower_fence - value
            };
            (overshoot / stats.iqr).min(1.0)
        } else {
            0.0
        };
        let severity = z_score.max(multiplier_score).max(fence_score);

        let mut evidence = json!({
            "amount": value,
            "mean": stats.mean,
            "std_dev": stats.std_dev,
            "z_score": z,
            "iqr_fences": [stats.lower_fence, stats.upper_fence],
            "rules": {
                "z": z_hit,
                "iqr": fence_hit,
                "multiplier": multiplier_hit,
            },
        });
        // Category context when the account has history for it.
        if let Some(cat) = &tx.category {
            if let Some(cs) = ctx.baseline.category_stats.get(cat) {
                evidence["category"] = json!({
                    "name": cat,
                    "mean": cs.mean,
                    "count": cs.count,
                });
            }
        }

        signals.push(AnomalySignal::new(
            SignalKind::Amount,
            severity,
            "amount_outlier",
            evidence,
            Some(tx.id),
        ));
    }

    if signals.is_empty() {
        Ok(DetectorOutcome::Clear)
    } else {
        Ok(DetectorOutcome::Flagged(signals))
    }
}
