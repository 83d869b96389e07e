//! Risk aggregation and alert suppression.
//!
//! Detector signals carry heterogeneous evidence; the aggregator maps them
//! onto one severity scale with a per-kind weight table, buckets the result
//! into an alert level, and gates outward emission behind a per
//! (account, kind) cooldown. The evaluation result is always returned for
//! audit; `suppressed` only gates notification.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::{AlertRecord, AnomalySignal, SignalKind};

/// Discrete alert bucket derived from the aggregate severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            AlertLevel::Critical
        } else if score >= 0.6 {
            AlertLevel::High
        } else if score >= 0.4 {
            AlertLevel::Medium
        } else if score > 0.0 {
            AlertLevel::Low
        } else {
            AlertLevel::None
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Concurrency-safe keyed store of last emission times.
///
/// Injected into the aggregator rather than process-global so tests can
/// construct a fresh store per run. The entry API gives atomic
/// check-and-set per key; two concurrent evaluations for the same
/// (account, kind) cannot both acquire within the cooldown window.
#[derive(Debug, Default)]
pub struct CooldownStore {
    last_emission: DashMap<(Uuid, SignalKind), DateTime<Utc>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records `now` iff no emission for this key happened
    /// within the cooldown window.
    pub fn try_acquire(
        &self,
        account_id: Uuid,
        kind: SignalKind,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> bool {
        match self.last_emission.entry((account_id, kind)) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < cooldown {
                    false
                } else {
                    *entry.get_mut() = now;
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drop entries older than the cooldown window (TTL housekeeping for
    /// long-running sweeps).
    pub fn purge_expired(&self, now: DateTime<Utc>, cooldown: Duration) {
        self.last_emission.retain(|_, last| now - *last < cooldown);
    }

    pub fn len(&self) -> usize {
        self.last_emission.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_emission.is_empty()
    }
}

/// Combine detector signals into one [`AlertRecord`].
///
/// Deterministic policy: weighted aggregate, level bucketing, then cooldown
/// suppression keyed by the dominant signal kind. The cooldown store is only
/// touched when the aggregate clears the alert threshold.
pub fn aggregate(
    account_id: Uuid,
    now: DateTime<Utc>,
    signals: Vec<AnomalySignal>,
    config: &DetectionConfig,
    cooldowns: &CooldownStore,
) -> AlertRecord {
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut dominant: Option<(SignalKind, f64)> = None;

    for signal in &signals {
        let weight = config.weight_for(signal.kind, &signal.reason);
        let contribution = signal.severity * weight;
        weighted_sum += contribution;
        weight_sum += weight;
        // Ties keep the earlier signal, preserving fixed detector order.
        if dominant.map(|(_, best)| contribution > best).unwrap_or(true) {
            dominant = Some((signal.kind, contribution));
        }
    }

    let aggregate_severity = if weight_sum > 0.0 {
        (weighted_sum / weight_sum).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let level = AlertLevel::from_score(aggregate_severity);
    let dominant_kind = dominant.map(|(kind, _)| kind);

    let suppressed = if aggregate_severity >= config.alert_threshold {
        let kind = dominant_kind.unwrap_or(SignalKind::Amount);
        let cooldown = Duration::seconds((config.cooldown_hours * 3600.0) as i64);
        let acquired = cooldowns.try_acquire(account_id, kind, now, cooldown);
        if !acquired {
            debug!(%account_id, kind = %kind, "alert suppressed by cooldown");
        }
        !acquired
    } else {
        true
    };

    let dedup_key = format!(
        "{}:{}",
        account_id,
        dominant_kind.map(|k| k.tag()).unwrap_or("none")
    );

    AlertRecord {
        account_id,
        timestamp: now,
        aggregate_severity,
        level,
        signals,
        dominant_kind,
        suppressed,
        dedup_key,
        summary: String::new(),
    }
}
