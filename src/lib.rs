//! RiskWatch - behavioral anomaly and fraud detection for transaction streams
//!
//! The engine builds a per-account statistical baseline from transaction
//! history and evaluates new or historical activity against six independent
//! signals:
//! - amount outliers (z-score, IQR fences, mean multiplier)
//! - velocity / frequency bursts
//! - geographic displacement from common locations
//! - unusual time-of-day and weekend concentration
//! - transaction patterns (rapid sequences, duplicate amounts, round numbers)
//! - multivariate outliers via a random-partition isolation ensemble
//!
//! Signal severities are combined by a weighted aggregator into a single
//! alert level, with per-(account, kind) cooldown suppression so a single
//! incident does not fan out into an alert storm.

pub mod aggregator;
pub mod baseline;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod errors;
pub mod explain;
pub mod geo;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use aggregator::{AlertLevel, CooldownStore};
pub use config::DetectionConfig;
pub use engine::{AlertSink, DetectionEngine, TracingSink, TransactionSource};
pub use errors::{EngineError, Result};
pub use geo::{GeoPoint, LocationResolver, StaticResolver};

/// Normalized transaction record as supplied by the history adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Signed amount in minor currency units; negative for outflows.
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub success: bool,
    /// Fee charged for the transaction, if any.
    #[serde(default)]
    pub fee: f64,
}

impl Transaction {
    /// Spend magnitude used for amount statistics.
    pub fn magnitude(&self) -> f64 {
        self.amount.abs()
    }

    /// Records with non-finite numeric fields are excluded from every
    /// computation rather than aborting the evaluation.
    pub fn is_well_formed(&self) -> bool {
        self.amount.is_finite() && self.fee.is_finite()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(
            self.timestamp.weekday(),
            chrono::Weekday::Sat | chrono::Weekday::Sun
        )
    }
}

/// Half-open evaluation window [start, end).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Closed set of detector kinds, aggregated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Amount,
    Velocity,
    Geo,
    Temporal,
    Pattern,
    Multivariate,
}

impl SignalKind {
    pub const ALL: [SignalKind; 6] = [
        SignalKind::Amount,
        SignalKind::Velocity,
        SignalKind::Geo,
        SignalKind::Temporal,
        SignalKind::Pattern,
        SignalKind::Multivariate,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            SignalKind::Amount => "amount",
            SignalKind::Velocity => "velocity",
            SignalKind::Geo => "geo",
            SignalKind::Temporal => "temporal",
            SignalKind::Pattern => "pattern",
            SignalKind::Multivariate => "multivariate",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One anomaly finding from a single detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub kind: SignalKind,
    /// Normalized anomaly strength in [0, 1].
    pub severity: f64,
    /// Short machine-readable reason tag, e.g. "amount_outlier".
    pub reason: String,
    /// Structured evidence backing the finding.
    pub evidence: serde_json::Value,
    /// Human-readable rendering, filled by the explanation generator.
    pub description: String,
    /// Transaction the finding refers to, when event-level.
    pub transaction_id: Option<Uuid>,
}

impl AnomalySignal {
    pub fn new(
        kind: SignalKind,
        severity: f64,
        reason: impl Into<String>,
        evidence: serde_json::Value,
        transaction_id: Option<Uuid>,
    ) -> Self {
        Self {
            kind,
            severity: severity.clamp(0.0, 1.0),
            reason: reason.into(),
            evidence,
            description: String::new(),
            transaction_id,
        }
    }
}

/// Final risk assessment for one (account, window) evaluation.
///
/// Always returned for audit; `suppressed` gates only outward notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub account_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub aggregate_severity: f64,
    pub level: AlertLevel,
    /// Contributing signals in fixed detector order.
    pub signals: Vec<AnomalySignal>,
    /// Kind with the largest weighted contribution, used as the cooldown key.
    pub dominant_kind: Option<SignalKind>,
    pub suppressed: bool,
    pub dedup_key: String,
    pub summary: String,
}
