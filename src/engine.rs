//! Detection engine: wires the profiler, detectors, aggregator and
//! explanation generator together.
//!
//! A single evaluation is pure and synchronous apart from location
//! resolution, which is the one I/O-bound step and runs under a short
//! timeout with fallback to "unresolved". Evaluations for different
//! accounts share no mutable state except the injected cooldown store, so
//! callers may run one task per account or per incoming event.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{self, CooldownStore};
use crate::baseline::BaselineProfiler;
use crate::config::DetectionConfig;
use crate::detectors::{self, DetectContext};
use crate::errors::{EngineError, Result};
use crate::explain;
use crate::geo::{GeoPoint, LocationResolver};
use crate::{AlertRecord, TimeWindow, Transaction};

/// Ordered transaction history capability; read-only.
pub trait TransactionSource: Send + Sync {
    fn history(&self, account_id: Uuid) -> Result<Vec<Transaction>>;
}

/// Destination for emitted (non-suppressed) alerts.
pub trait AlertSink: Send + Sync {
    fn publish(&self, record: &AlertRecord);
}

/// Default sink: structured log line per emitted alert.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn publish(&self, record: &AlertRecord) {
        info!(
            account_id = %record.account_id,
            level = %record.level,
            severity = record.aggregate_severity,
            signals = record.signals.len(),
            dedup_key = %record.dedup_key,
            "{}", record.summary
        );
    }
}

/// Simple vector-backed source for tests, demos and batch replays.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    transactions: Vec<Transaction>,
}

impl InMemorySource {
    pub fn new(mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by_key(|t| t.timestamp);
        Self { transactions }
    }
}

impl TransactionSource for InMemorySource {
    fn history(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }
}

pub struct DetectionEngine {
    config: DetectionConfig,
    profiler: BaselineProfiler,
    source: Arc<dyn TransactionSource>,
    resolver: Arc<dyn LocationResolver>,
    cooldowns: Arc<CooldownStore>,
    sink: Arc<dyn AlertSink>,
}

impl DetectionEngine {
    pub fn new(
        config: DetectionConfig,
        source: Arc<dyn TransactionSource>,
        resolver: Arc<dyn LocationResolver>,
    ) -> Result<Self> {
        config.validate().map_err(EngineError::config)?;
        Ok(Self {
            profiler: BaselineProfiler::new(config.min_baseline_samples),
            config,
            source,
            resolver,
            cooldowns: Arc::new(CooldownStore::new()),
            sink: Arc::new(TracingSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cooldowns(mut self, cooldowns: Arc<CooldownStore>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Streaming evaluation: baseline from history before the window,
    /// detectors over the window itself.
    pub async fn evaluate(&self, account_id: Uuid, window: TimeWindow) -> Result<AlertRecord> {
        let history = self.source.history(account_id)?;
        self.evaluate_slice(account_id, &history, window, false).await
    }

    /// Retrospective evaluation of a transaction dump: one record per
    /// account, baseline from that account's full history, day-level
    /// velocity checks. An account that fails to evaluate is skipped, not
    /// fatal to the batch.
    pub async fn evaluate_batch(&self, history: &[Transaction]) -> Vec<AlertRecord> {
        let mut order: Vec<Uuid> = Vec::new();
        let mut per_account: HashMap<Uuid, Vec<Transaction>> = HashMap::new();
        for tx in history {
            if !per_account.contains_key(&tx.account_id) {
                order.push(tx.account_id);
            }
            per_account.entry(tx.account_id).or_default().push(tx.clone());
        }

        let mut records = Vec::with_capacity(order.len());
        for account_id in order {
            let txs = &per_account[&account_id];
            let Some(start) = txs.iter().map(|t| t.timestamp).min() else {
                continue;
            };
            let end = txs.iter().map(|t| t.timestamp).max().unwrap_or(start)
                + Duration::seconds(1);
            match self
                .evaluate_slice(account_id, txs, TimeWindow::new(start, end), true)
                .await
            {
                Ok(record) => records.push(record),
                Err(e) => warn!(%account_id, error = %e, "batch evaluation failed for account"),
            }
        }
        records
    }

    async fn evaluate_slice(
        &self,
        account_id: Uuid,
        history: &[Transaction],
        window: TimeWindow,
        batch: bool,
    ) -> Result<AlertRecord> {
        // Baseline is rebuilt once per window evaluation, not per scored
        // transaction. Batch mode profiles the full slice; streaming mode
        // only what precedes the window.
        let baseline_slice: Vec<Transaction> = if batch {
            history.to_vec()
        } else {
            history
                .iter()
                .filter(|t| t.timestamp < window.start)
                .cloned()
                .collect()
        };
        let baseline = self.profiler.build(account_id, &baseline_slice);

        let mut current: Vec<Transaction> = history
            .iter()
            .filter(|t| t.account_id == account_id && window.contains(t.timestamp))
            .cloned()
            .collect();
        let malformed = current.len();
        current.retain(Transaction::is_well_formed);
        if malformed > current.len() {
            warn!(%account_id, skipped = malformed - current.len(),
                  "excluded malformed records from evaluation window");
        }
        current.sort_by_key(|t| t.timestamp);

        let resolved = self.resolve_locations(&baseline.common_locations, &current).await;

        let ctx = DetectContext {
            account_id,
            baseline: &baseline,
            window: &current,
            now: window.end,
            batch,
            resolved: &resolved,
            config: &self.config,
        };
        let signals = detectors::run_all(&ctx);
        debug!(%account_id, signals = signals.len(), window_size = current.len(),
               "detectors complete");

        let mut record =
            aggregator::aggregate(account_id, window.end, signals, &self.config, &self.cooldowns);
        explain::annotate(&mut record);

        if !record.suppressed {
            self.sink.publish(&record);
        }
        Ok(record)
    }

    /// Resolve every location name one evaluation can need, each under the
    /// configured timeout. Failure or timeout degrades to "unresolved" and
    /// never aborts the evaluation.
    async fn resolve_locations(
        &self,
        common_locations: &[String],
        window: &[Transaction],
    ) -> HashMap<String, Option<GeoPoint>> {
        let mut names: HashSet<String> = common_locations.iter().cloned().collect();
        names.extend(window.iter().filter_map(|t| t.location.clone()));

        let budget = StdDuration::from_millis(self.config.geo_resolve_timeout_ms);
        let mut resolved = HashMap::with_capacity(names.len());
        for name in names {
            let resolver = Arc::clone(&self.resolver);
            let lookup = name.clone();
            let point = match tokio::time::timeout(
                budget,
                tokio::task::spawn_blocking(move || resolver.resolve(&lookup)),
            )
            .await
            {
                Ok(Ok(point)) => point,
                Ok(Err(join_err)) => {
                    warn!(location = %name, error = %join_err, "location resolution panicked");
                    None
                }
                Err(_) => {
                    warn!(location = %name, "location resolution timed out");
                    None
                }
            };
            resolved.insert(name, point);
        }
        resolved
    }
}
