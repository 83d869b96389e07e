//! Configuration for the detection engine.
//!
//! Every detection threshold is tunable without code changes; defaults match
//! the values the detectors were calibrated against.

use serde::{Deserialize, Serialize};

use crate::SignalKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum history size before a baseline is considered established.
    pub min_baseline_samples: usize,

    /// Amount detector: |z| above this flags an outlier.
    pub amount_z_threshold: f64,
    /// Amount detector: amounts above mean * multiplier flag an outlier.
    pub amount_multiplier: f64,

    /// Velocity detector: lookback window in hours (streaming mode).
    pub velocity_window_hours: f64,
    /// Velocity detector: observed/expected ratio above this flags.
    pub velocity_ratio_threshold: f64,

    /// Geo detector: distance from every common location beyond this flags.
    pub geo_radius_km: f64,
    /// Geo detector: budget for one location resolution before falling back
    /// to "unresolved".
    pub geo_resolve_timeout_ms: u64,

    /// Pattern detector: fraction of round-number amounts above this flags.
    pub round_number_ratio: f64,
    /// Pattern detector: minimum sample before the round-number check runs.
    pub round_number_min_sample: usize,

    /// Multivariate detector: minimum rows in the evaluated window.
    pub min_multivariate_samples: usize,
    /// Multivariate detector: trees in the isolation ensemble.
    pub isolation_trees: usize,
    /// Multivariate detector: sub-sample size per tree.
    pub isolation_sample_size: usize,

    /// Aggregator: emit outward only at or above this aggregate severity.
    pub alert_threshold: f64,
    /// Aggregator: minimum hours between two emitted alerts of the same
    /// (account, kind).
    pub cooldown_hours: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_baseline_samples: 5,
            amount_z_threshold: 2.5,
            amount_multiplier: 3.0,
            velocity_window_hours: 6.0,
            velocity_ratio_threshold: 3.0,
            geo_radius_km: 100.0,
            geo_resolve_timeout_ms: 250,
            round_number_ratio: 0.5,
            round_number_min_sample: 10,
            min_multivariate_samples: 20,
            isolation_trees: 100,
            isolation_sample_size: 64,
            alert_threshold: 0.4,
            cooldown_hours: 24.0,
        }
    }
}

impl DetectionConfig {
    /// Aggregation weight per signal kind, reflecting empirical precision.
    /// Pattern signals other than rapid sequences carry a lower weight.
    pub fn weight_for(&self, kind: SignalKind, reason: &str) -> f64 {
        match kind {
            SignalKind::Amount => 1.0,
            SignalKind::Velocity => 0.8,
            SignalKind::Geo => 1.0,
            SignalKind::Temporal => 0.6,
            SignalKind::Pattern => {
                if reason == "rapid_transactions" {
                    0.9
                } else {
                    0.5
                }
            }
            SignalKind::Multivariate => 1.2,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_baseline_samples == 0 {
            return Err("min_baseline_samples must be at least 1".to_string());
        }
        if self.amount_z_threshold <= 0.0 {
            return Err("amount_z_threshold must be positive".to_string());
        }
        if self.amount_multiplier <= 1.0 {
            return Err("amount_multiplier must be greater than 1".to_string());
        }
        if self.velocity_window_hours <= 0.0 || self.velocity_window_hours > 24.0 {
            return Err("velocity_window_hours must be in (0, 24]".to_string());
        }
        if self.velocity_ratio_threshold <= 1.0 {
            return Err("velocity_ratio_threshold must be greater than 1".to_string());
        }
        if self.geo_radius_km <= 0.0 {
            return Err("geo_radius_km must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.round_number_ratio) {
            return Err("round_number_ratio must be in [0, 1]".to_string());
        }
        if self.min_multivariate_samples < 2 {
            return Err("min_multivariate_samples must be at least 2".to_string());
        }
        if self.isolation_trees == 0 || self.isolation_sample_size < 2 {
            return Err("isolation ensemble must have trees and a sample size >= 2".to_string());
        }
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err("alert_threshold must be in [0, 1]".to_string());
        }
        if self.cooldown_hours < 0.0 {
            return Err("cooldown_hours must not be negative".to_string());
        }
        Ok(())
    }
}
