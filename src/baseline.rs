//! Per-account behavioral baseline.
//!
//! The baseline is rebuilt wholesale from a full history scan and owned by
//! the profiler; detectors only ever read it. The amount distribution is
//! kept in two forms on purpose: mean/stdev for z-scores and quartile fences
//! for robustness on skewed spend distributions. Detectors pick whichever
//! statistic suits the signal.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::Transaction;

/// Mean/stdev pair plus robust quartile fences for one distribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmountStats {
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

impl AmountStats {
    fn from_values(values: &mut Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let q1 = percentile(values, 0.25);
        let median = percentile(values, 0.50);
        let q3 = percentile(values, 0.75);
        let iqr = q3 - q1;

        Self {
            mean,
            std_dev: variance.sqrt(),
            median,
            q1,
            q3,
            iqr,
            lower_fence: q1 - 1.5 * iqr,
            upper_fence: q3 + 1.5 * iqr,
        }
    }

    /// Z-score of a value, or None when stdev is zero. A zero stdev must
    /// never be used as a divisor downstream.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.std_dev <= f64::EPSILON {
            None
        } else {
            Some((value - self.mean) / self.std_dev)
        }
    }
}

/// Mean/stdev/max of transactions per active day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyCountStats {
    pub mean: f64,
    pub std_dev: f64,
    pub max: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// Statistical summary of an account's normal behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBaseline {
    pub account_id: Uuid,
    pub sample_count: usize,
    pub amount: AmountStats,
    pub daily: DailyCountStats,
    /// Most frequent location names, largest count first (top 5). Identity
    /// match only; distance reasoning lives in the geo detector.
    pub common_locations: Vec<String>,
    pub category_stats: HashMap<String, CategoryStats>,
    pub hour_histogram: [u32; 24],
    pub weekday_histogram: [u32; 7],
    pub built_at: DateTime<Utc>,
}

impl AccountBaseline {
    /// An empty baseline for accounts without sufficient history.
    pub fn insufficient(account_id: Uuid, sample_count: usize) -> Self {
        Self {
            account_id,
            sample_count,
            amount: AmountStats::default(),
            daily: DailyCountStats::default(),
            common_locations: Vec::new(),
            category_stats: HashMap::new(),
            hour_histogram: [0; 24],
            weekday_histogram: [0; 7],
            built_at: Utc::now(),
        }
    }

    pub fn is_established(&self, min_samples: usize) -> bool {
        self.sample_count >= min_samples
    }

    pub fn is_common_location(&self, location: &str) -> bool {
        self.common_locations.iter().any(|l| l == location)
    }

    /// Weekend/weekday split from the weekday histogram (Mon..Sun order).
    pub fn weekend_count(&self) -> u32 {
        self.weekday_histogram[5] + self.weekday_histogram[6]
    }

    pub fn weekday_count(&self) -> u32 {
        self.weekday_histogram[..5].iter().sum()
    }
}

/// Builds [`AccountBaseline`]s from ordered transaction history.
#[derive(Debug, Clone)]
pub struct BaselineProfiler {
    min_samples: usize,
    top_locations: usize,
}

impl BaselineProfiler {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples,
            top_locations: 5,
        }
    }

    /// Full-scan rebuild. Malformed records are skipped, never fatal.
    pub fn build(&self, account_id: Uuid, history: &[Transaction]) -> AccountBaseline {
        let usable: Vec<&Transaction> = history
            .iter()
            .filter(|t| t.account_id == account_id && t.is_well_formed())
            .collect();

        let skipped = history.len() - usable.len();
        if skipped > 0 {
            debug!(%account_id, skipped, "excluded malformed or foreign records from baseline");
        }

        if usable.len() < self.min_samples {
            return AccountBaseline::insufficient(account_id, usable.len());
        }

        let mut magnitudes: Vec<f64> = usable.iter().map(|t| t.magnitude()).collect();
        let amount = AmountStats::from_values(&mut magnitudes);

        let mut hour_histogram = [0u32; 24];
        let mut weekday_histogram = [0u32; 7];
        let mut day_counts: HashMap<NaiveDate, u32> = HashMap::new();
        let mut location_counts: HashMap<&str, u32> = HashMap::new();
        let mut category_values: HashMap<&str, Vec<f64>> = HashMap::new();

        for t in &usable {
            hour_histogram[t.hour() as usize] += 1;
            weekday_histogram[t.timestamp.weekday().num_days_from_monday() as usize] += 1;
            *day_counts.entry(t.timestamp.date_naive()).or_insert(0) += 1;
            if let Some(loc) = &t.location {
                *location_counts.entry(loc.as_str()).or_insert(0) += 1;
            }
            if let Some(cat) = &t.category {
                category_values
                    .entry(cat.as_str())
                    .or_default()
                    .push(t.magnitude());
            }
        }

        AccountBaseline {
            account_id,
            sample_count: usable.len(),
            amount,
            daily: daily_stats(&day_counts),
            common_locations: top_locations(location_counts, self.top_locations),
            category_stats: category_stats(category_values),
            hour_histogram,
            weekday_histogram,
            built_at: Utc::now(),
        }
    }
}

fn daily_stats(day_counts: &HashMap<NaiveDate, u32>) -> DailyCountStats {
    if day_counts.is_empty() {
        return DailyCountStats::default();
    }
    let n = day_counts.len() as f64;
    let mean = day_counts.values().map(|&c| c as f64).sum::<f64>() / n;
    let variance = day_counts
        .values()
        .map(|&c| (c as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    DailyCountStats {
        mean,
        std_dev: variance.sqrt(),
        max: day_counts.values().copied().max().unwrap_or(0),
    }
}

fn top_locations(counts: HashMap<&str, u32>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
    // Count descending, name ascending for a stable order on ties.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(name, _)| name.to_string())
        .collect()
}

fn category_stats(values: HashMap<&str, Vec<f64>>) -> HashMap<String, CategoryStats> {
    values
        .into_iter()
        .map(|(cat, vs)| {
            let n = vs.len() as f64;
            let mean = vs.iter().sum::<f64>() / n;
            let variance = vs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (
                cat.to_string(),
                CategoryStats {
                    mean,
                    std_dev: variance.sqrt(),
                    count: vs.len(),
                },
            )
        })
        .collect()
}

/// Linear-interpolated percentile over a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
