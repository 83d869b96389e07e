//! Multivariate outlier detector.
//!
//! An ensemble of randomized axis-aligned partitioning trees over a
//! standardized per-transaction feature row. A row that needs fewer random
//! splits to become isolated scores higher. Severity is compressed into the
//! upper-middle band: this detector is noisier than the rule-based ones and
//! must not dominate the aggregate on its own.

use chrono::Datelike;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use super::{DetectContext, DetectorOutcome};
use crate::errors::{EngineError, Result};
use crate::{AnomalySignal, SignalKind, Transaction};

const FEATURES: usize = 7;
const SCORE_THRESHOLD: f64 = 0.6;
const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Fixed seed so a given window always scores identically.
const ENSEMBLE_SEED: u64 = 0x1f0a_3c5d_7e91_b246;

pub fn evaluate(ctx: &DetectContext<'_>) -> Result<DetectorOutcome> {
    if !ctx.has_baseline() {
        return Ok(DetectorOutcome::NoBaseline);
    }
    if ctx.window.len() < ctx.config.min_multivariate_samples {
        return Ok(DetectorOutcome::Clear);
    }

    let matrix: Vec<[f64; FEATURES]> = ctx.window.iter().map(feature_row).collect();
    let standardized = standardize(&matrix).ok_or_else(|| {
        EngineError::detector("multivariate", "degenerate feature matrix: no varying feature")
    })?;

    let mut rng = StdRng::seed_from_u64(ENSEMBLE_SEED);
    let forest = IsolationForest::fit(
        &standardized,
        ctx.config.isolation_trees,
        ctx.config.isolation_sample_size,
        &mut rng,
    );

    let mut signals = Vec::new();
    for (tx, row) in ctx.window.iter().zip(&standardized) {
        let score = forest.score(row);
        if score <= SCORE_THRESHOLD {
            continue;
        }
        let severity = (((score - 0.5).abs() - 0.1) * 2.0).clamp(0.5, 0.95);
        signals.push(AnomalySignal::new(
            SignalKind::Multivariate,
            severity,
            "multivariate_outlier",
            json!({
                "isolation_score": score,
                "window_size": ctx.window.len(),
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

/// {amount, hour, weekday, is_weekend, fee, is_payment, is_swap}
fn feature_row(tx: &Transaction) -> [f64; FEATURES] {
    let category = tx.category.as_deref().unwrap_or("");
    [
        tx.magnitude(),
        tx.hour() as f64,
        tx.timestamp.weekday().num_days_from_monday() as f64,
        if tx.is_weekend() { 1.0 } else { 0.0 },
        tx.fee,
        if category.eq_ignore_ascii_case("payment") { 1.0 } else { 0.0 },
        if category.eq_ignore_ascii_case("swap") || category.eq_ignore_ascii_case("exchange") {
            1.0
        } else {
            0.0
        },
    ]
}

/// Column-wise zero-mean unit-variance scaling. Constant columns become
/// zeros; returns None when every column is constant.
fn standardize(matrix: &[[f64; FEATURES]]) -> Option<Vec<[f64; FEATURES]>> {
    let n = matrix.len() as f64;
    let mut means = [0.0; FEATURES];
    let mut stds = [0.0; FEATURES];

    for col in 0..FEATURES {
        means[col] = matrix.iter().map(|r| r[col]).sum::<f64>() / n;
        let variance = matrix
            .iter()
            .map(|r| (r[col] - means[col]).powi(2))
            .sum::<f64>()
            / n;
        stds[col] = variance.sqrt();
    }

    if stds.iter().all(|&s| s <= f64::EPSILON) {
        return None;
    }

    Some(
        matrix
            .iter()
            .map(|r| {
                let mut out = [0.0; FEATURES];
                for col in 0..FEATURES {
                    if stds[col] > f64::EPSILON {
                        out[col] = (r[col] - means[col]) / stds[col];
                    }
                }
                out
            })
            .collect(),
    )
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    fn fit(
        rows: &[[f64; FEATURES]],
        n_trees: usize,
        sample_size: usize,
        rng: &mut StdRng,
    ) -> Self {
        let sample_size = sample_size.min(rows.len()).max(2);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut indices: Vec<usize> = (0..rows.len()).collect();

        let trees = (0..n_trees)
            .map(|_| {
                indices.shuffle(rng);
                let sample: Vec<&[f64; FEATURES]> =
                    indices[..sample_size].iter().map(|&i| &rows[i]).collect();
                build_tree(&sample, 0, max_depth, rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in (0, 1]; higher means more isolated.
    fn score(&self, row: &[f64; FEATURES]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| path_length(t, row, 0.0)).sum();
        let mean_path = total / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        if norm <= f64::EPSILON {
            return 0.5;
        }
        2.0_f64.powf(-mean_path / norm)
    }
}

fn build_tree(rows: &[&[f64; FEATURES]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if rows.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: rows.len() };
    }

    // Only features with spread can split; a node constant in every feature
    // is a leaf.
    let splittable: Vec<usize> = (0..FEATURES)
        .filter(|&col| {
            let (min, max) = column_range(rows, col);
            max > min
        })
        .collect();
    let Some(&feature) = splittable.as_slice().choose(rng) else {
        return Node::Leaf { size: rows.len() };
    };

    let (min, max) = column_range(rows, feature);
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<&[f64; FEATURES]>, Vec<&[f64; FEATURES]>) =
        rows.iter().copied().partition(|r| r[feature] < threshold);
    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn column_range(rows: &[&[f64; FEATURES]], col: usize) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for r in rows {
        min = min.min(r[col]);
        max = max.max(r[col]);
    }
    (min, max)
}

fn path_length(node: &Node, row: &[f64; FEATURES], depth: f64) -> f64 {
    match node {
        Node::Leaf { size } => depth + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1.0)
            } else {
                path_length(right, row, depth + 1.0)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over n nodes; the
/// standard isolation-forest normalizer c(n).
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    /// Tight weekday-daytime cluster plus one wild row.
    fn cluster_with_spike(account: Uuid) -> Vec<Transaction> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(); // Monday
        let mut window: Vec<_> = (0..24)
            .map(|i| {
                let mut t = tx(
                    account,
                    100.0 + (i % 4) as f64,
                    start + Duration::hours((i as i64 % 5) * 50),
                    None,
                );
                t.fee = 1.0;
                t
            })
            .collect();
        let mut spike = tx(
            account,
            50_000.0,
            Utc.with_ymd_and_hms(2024, 1, 13, 3, 0, 0).unwrap(), // Saturday 03:00
            None,
        );
        spike.fee = 500.0;
        spike.category = Some("swap".to_string());
        window.push(spike);
        window
    }

    #[test]
    fn test_below_minimum_sample_returns_nothing() {
        let account = Uuid::new_v4();
        let history = steady_history(account, 25, 100.0);
        let window = cluster_with_spike(account)[..10].to_vec();
        let fixture = ContextFixture::new(&history, window);
        assert_eq!(evaluate(&fixture.ctx()).unwrap(), DetectorOutcome::Clear);
    }

    #[test]
    fn test_spike_row_isolated() {
        let account = Uuid::new_v4();
        let history = steady_history(account, 25, 100.0);
        let window = cluster_with_spike(account);
        let spike_id = window.last().unwrap().id;
        let fixture = ContextFixture::new(&history, window);

        let signals = evaluate(&fixture.ctx()).unwrap().into_signals();
        assert!(
            signals.iter().any(|s| s.transaction_id == Some(spike_id)),
            "spike row should be flagged"
        );
        for s in &signals {
            assert!(s.severity >= 0.5 && s.severity <= 0.95);
            assert_eq!(s.reason, "multivariate_outlier");
        }
        // The detector must not flag the whole window.
        assert!(signals.len() < 5);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let account = Uuid::new_v4();
        let history = steady_history(account, 25, 100.0);
        let window = cluster_with_spike(account);
        let fixture = ContextFixture::new(&history, window);

        let a = evaluate(&fixture.ctx()).unwrap().into_signals();
        let b = evaluate(&fixture.ctx()).unwrap().into_signals();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.severity, y.severity);
        }
    }

    #[test]
    fn test_degenerate_window_is_detector_error() {
        let account = Uuid::new_v4();
        let history = steady_history(account, 25, 100.0);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        // Every feature identical across the window.
        let window: Vec<_> = (0..25).map(|_| tx(account, 100.0, ts, None)).collect();
        let fixture = ContextFixture::new(&history, window);
        assert!(evaluate(&fixture.ctx()).is_err());
    }

    #[test]
    fn test_average_path_length_grows_with_n() {
        assert_eq!(average_path_length(1), 0.0);
        assert!(average_path_length(16) > average_path_length(8));
    }
}
