//! Signal detectors.
//!
//! Each detector is a pure function of (baseline, window data, config)
//! dispatched through the closed [`SignalKind`] set in fixed order. A
//! detector failure is caught at this boundary and converted into a skipped
//! detector; the aggregator always receives a signal list, possibly shorter.

pub mod amount;
pub mod geo;
pub mod isolation;
pub mod pattern;
pub mod temporal;
pub mod velocity;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::baseline::AccountBaseline;
use crate::config::DetectionConfig;
use crate::errors::Result;
use crate::geo::GeoPoint;
use crate::{AnomalySignal, SignalKind, Transaction};

/// Everything a detector may look at for one evaluation.
pub struct DetectContext<'a> {
    pub account_id: Uuid,
    pub baseline: &'a AccountBaseline,
    /// Time-sorted, well-formed transactions inside the evaluated window.
    pub window: &'a [Transaction],
    /// Reference instant for streaming checks (the window end).
    pub now: DateTime<Utc>,
    /// Batch evaluations score historical days instead of the live window.
    pub batch: bool,
    /// Pre-resolved location coordinates; None marks an unresolvable name.
    pub resolved: &'a HashMap<String, Option<GeoPoint>>,
    pub config: &'a DetectionConfig,
}

impl DetectContext<'_> {
    pub fn has_baseline(&self) -> bool {
        self.baseline
            .is_established(self.config.min_baseline_samples)
    }

    pub fn resolve(&self, name: &str) -> Option<GeoPoint> {
        self.resolved.get(name).copied().flatten()
    }
}

/// Explicit outcome so "no evidence" is distinguishable from "verified
/// normal".
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutcome {
    /// Account history below the minimum baseline sample; never anomalous.
    NoBaseline,
    /// Baseline present, nothing anomalous found.
    Clear,
    /// One or more findings.
    Flagged(Vec<AnomalySignal>),
}

impl DetectorOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            DetectorOutcome::NoBaseline => "no_baseline",
            DetectorOutcome::Clear => "clear",
            DetectorOutcome::Flagged(_) => "flagged",
        }
    }

    pub fn into_signals(self) -> Vec<AnomalySignal> {
        match self {
            DetectorOutcome::Flagged(signals) => signals,
            _ => Vec::new(),
        }
    }
}

/// Run one detector kind against the context.
pub fn evaluate_kind(kind: SignalKind, ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    match kind {
        SignalKind::Amount => amount::evaluate(ctx),
        SignalKind::Velocity => velocity::evaluate(ctx),
        SignalKind::Geo => geo::evaluate(ctx),
        SignalKind::Temporal => temporal::evaluate(ctx),
        SignalKind::Pattern => pattern::evaluate(ctx),
        SignalKind::Multivariate => isolation::evaluate(ctx),
    }
}

/// Run every detector in fixed order, collecting all findings. A failing
/// detector is logged and skipped so partial results still reach the
/// aggregator.
pub fn run_all(ctx: &DetectContext<'_>) -> Vec<AnomalySignal> {
    let mut signals = Vec::new();
    for kind in SignalKind::ALL {
        match evaluate_kind(kind, ctx) {
            Ok(outcome) => signals.extend(outcome.into_signals()),
            Err(e) => {
                warn!(account_id = %ctx.account_id, detector = %kind, error = %e,
                      "detector failed, skipping");
            }
        }
    }
    signals
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub fn tx(
        account_id: Uuid,
        amount: f64,
        ts: DateTime<Utc>,
        location: Option<&str>,
    ) -> Transaction {
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

    /// Steady history: one ~weekday-daytime transaction every 8 hours.
    pub fn steady_history(account_id: Uuid, n: usize, base_amount: f64) -> Vec<Transaction> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                tx(
                    account_id,
                    base_amount + (i % 7) as f64 * 10.0,
                    start + Duration::hours(i as i64 * 8),
                    Some("Nairobi"),
                )
            })
            .collect()
    }

    pub struct ContextFixture {
        pub account_id: Uuid,
        pub baseline: AccountBaseline,
        pub window: Vec<Transaction>,
        pub now: DateTime<Utc>,
        pub resolved: HashMap<String, Option<GeoPoint>>,
        pub config: DetectionConfig,
        pub batch: bool,
    }

    impl ContextFixture {
        pub fn new(history: &[Transaction], window: Vec<Transaction>) -> Self {
            let account_id = history
                .first()
                .or_else(|| window.first())
                .map(|t| t.account_id)
                .unwrap_or_else(Uuid::new_v4);
            let config = DetectionConfig::default();
            let baseline = crate::baseline::BaselineProfiler::new(config.min_baseline_samples)
                .build(account_id, history);
            let now = window
                .last()
                .map(|t| t.timestamp + Duration::seconds(1))
                .unwrap_or_else(Utc::now);
            Self {
                account_id,
                baseline,
                window,
                now,
                resolved: HashMap::new(),
                config,
                batch: false,
            }
        }

        pub fn ctx(&self) -> DetectContext<'_> {
            DetectContext {
                account_id: self.account_id,
                baseline: &self.baseline,
                window: &self.window,
                now: self.now,
                batch: self.batch,
                resolved: &self.resolved,
                config: &self.config,
            }
        }
    }
}
