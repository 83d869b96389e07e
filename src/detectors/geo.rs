//! Geographic anomaly detector.
//!
//! A transaction at one of the account's common locations (identity match)
//! is never anomalous. Anything else is resolved to coordinates and scored
//! by its minimum great-circle distance to any resolvable common location.
//! Unresolvable names degrade to a fixed moderate severity: caution over
//! silence.

use serde_json::json;

use super::{DetectContext, DetectorOutcome};
use crate::errors::Result;
use crate::{AnomalySignal, SignalKind, Transaction};

const UNKNOWN_LOCATION_SEVERITY: f64 = 0.5;

pub fn evaluate(ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    if !ctx.has_baseline() {
        return Ok(DetectorOutcome::NoBaseline);
    }

    let anchor_points: Vec<_> = ctx
        .baseline
        .common_locations
        .iter()
        .filter_map(|name| ctx.resolve(name).map(|p| (name.as_str(), p)))
        .collect();

    let mut signals = Vec::new();
    for tx in ctx.window {
        let Some(location) = tx.location.as_deref() else {
            continue;
        };
        if ctx.baseline.is_common_location(location) {
            continue;
        }

        let Some(point) = ctx.resolve(location) else {
            signals.push(unknown_location(tx, location));
            continue;
        };
        if anchor_points.is_empty() {
            // Nothing to measure against; same degraded path as unresolved.
            signals.push(unknown_location(tx, location));
            continue;
        }

        let Some((nearest, distance_km)) = anchor_points
            .iter()
            .map(|(name, anchor)| (*name, point.distance_km(anchor)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };

        if distance_km <= ctx.config.geo_radius_km {
            continue;
        }

        let severity = if distance_km > 1000.0 {
            1.0
        } else if distance_km > 500.0 {
            0.8
        } else {
            (distance_km / 500.0).min(1.0)
        };

        signals.push(AnomalySignal::new(
            SignalKind::Geo,
            severity,
            "geo_displacement",
            json!({
                "location": location,
                "nearest_common": nearest,
                "distance_km": distance_km,
                "radius_km": ctx.config.geo_radius_km,
            }),
            Some(tx.id),
        ));
    }

    if signals.is_empty() {
        Ok(DetectorOutcome::Clear)
    } else {
        Ok(DetectorOutcome::Flagged(signals))
    }
}

fn unknown_location(tx: &Transaction, location: &str) -> AnomalySignal {
    AnomalySignal::new(
        SignalKind::Geo,
        UNKNOWN_LOCATION_SEVERITY,
        "unknown_location",
        json!({ "location": location }),
        Some(tx.id),
    )
}
