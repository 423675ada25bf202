//! Batch scheduler: fan a list of identifiers across a bounded worker pool,
//! stream records as they complete, and aggregate per-run quality metrics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::SourceOutcome;
use crate::merge::{MergedRecord, RecordStatus};
use crate::orchestrator::Orchestrator;
use crate::{SourceId, ValidationError};

/// Counters shared by all workers of one run. Updated atomically as each
/// identifier completes, readable at any time for progress reporting.
#[derive(Debug)]
pub struct RunMetrics {
    pub run_id: Uuid,
    started: Instant,
    total_processed: AtomicUsize,
    complete: AtomicUsize,
    partial: AtomicUsize,
    failed: AtomicUsize,
    cache_hits: AtomicUsize,
    registry_failures: AtomicUsize,
    insurance_failures: AtomicUsize,
    latencies_ms: Mutex<Vec<u64>>,
}

impl RunMetrics {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            total_processed: AtomicUsize::new(0),
            complete: AtomicUsize::new(0),
            partial: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            registry_failures: AtomicUsize::new(0),
            insurance_failures: AtomicUsize::new(0),
            latencies_ms: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, record: &MergedRecord, elapsed: Duration) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        let bucket = match record.status {
            RecordStatus::Complete => &self.complete,
            RecordStatus::Partial => &self.partial,
            RecordStatus::Failed => &self.failed,
        };
        bucket.fetch_add(1, Ordering::Relaxed);

        for summary in &record.sources {
            if summary.cache_hit {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            let failed = matches!(
                summary.outcome,
                SourceOutcome::TransientFailure | SourceOutcome::CircuitOpen
            );
            if failed {
                let counter = match summary.source {
                    SourceId::Registry => &self.registry_failures,
                    SourceId::Insurance => &self.insurance_failures,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }

        let millis = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
        if let Ok(mut latencies) = self.latencies_ms.lock() {
            latencies.push(millis);
        }
    }

    /// Point-in-time copy of the counters, safe to read while workers run.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut latencies = self
            .latencies_ms
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        latencies.sort_unstable();

        MetricsSnapshot {
            run_id: self.run_id,
            elapsed: self.started.elapsed(),
            total_processed: self.total_processed.load(Ordering::Relaxed),
            complete: self.complete.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            registry_failures: self.registry_failures.load(Ordering::Relaxed),
            insurance_failures: self.insurance_failures.load(Ordering::Relaxed),
            latency_p50_ms: percentile(&latencies, 50),
            latency_p95_ms: percentile(&latencies, 95),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub run_id: Uuid,
    pub elapsed: Duration,
    pub total_processed: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub registry_failures: usize,
    pub insurance_failures: usize,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
}

fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (sorted.len() * pct).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Everything one batch run produced.
#[derive(Debug)]
pub struct BatchReport {
    pub records: Vec<MergedRecord>,
    pub metrics: MetricsSnapshot,
}

/// Runs batches of identifiers through a fixed worker pool. Workers pull
/// from a shared cursor, so a slow identifier never stalls the others.
///
/// Designed for one run at a time; [`BatchScheduler::metrics`] tracks the
/// most recently started run.
pub struct BatchScheduler {
    orchestrator: Arc<Orchestrator>,
    config: PipelineConfig,
    metrics: Mutex<Arc<RunMetrics>>,
}

impl BatchScheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        config: PipelineConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            orchestrator,
            config,
            metrics: Mutex::new(Arc::new(RunMetrics::new())),
        })
    }

    /// Live snapshot of the current run's counters, pollable mid-run for
    /// progress reporting. Before the first run all counters are zero.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.current_metrics().snapshot()
    }

    fn current_metrics(&self) -> Arc<RunMetrics> {
        let guard = self.metrics.lock().expect("metrics lock is not poisoned");
        Arc::clone(&guard)
    }

    /// Start a run and stream records as they complete.
    ///
    /// Invalid identifiers still produce a (failed) record, so the stream
    /// always yields one record per input. With `ordered_output` set, a
    /// forwarder re-orders by input index, buffering only the out-of-order
    /// window; otherwise records flow through the bounded channel with no
    /// buffering at all. Dropping the receiver cancels the run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stream(&self, identifiers: Vec<String>) -> mpsc::Receiver<MergedRecord> {
        let metrics = Arc::new(RunMetrics::new());
        *self.metrics.lock().expect("metrics lock is not poisoned") = Arc::clone(&metrics);

        let total = identifiers.len();
        info!(run_id = %metrics.run_id, total, workers = self.config.workers, "batch run started");

        let inputs = Arc::new(identifiers);
        let cursor = Arc::new(AtomicUsize::new(0));
        let capacity = self.config.workers.max(1) * 2;
        let (raw_tx, raw_rx) = mpsc::channel::<(usize, MergedRecord)>(capacity);
        let (out_tx, out_rx) = mpsc::channel::<MergedRecord>(capacity);

        for worker in 0..self.config.workers {
            let inputs = Arc::clone(&inputs);
            let cursor = Arc::clone(&cursor);
            let orchestrator = Arc::clone(&self.orchestrator);
            let metrics = Arc::clone(&metrics);
            let tx = raw_tx.clone();

            tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(identifier) = inputs.get(index) else {
                        break;
                    };
                    let started = Instant::now();
                    let record = orchestrator.enrich(identifier).await;
                    metrics.record(&record, started.elapsed());
                    debug!(worker, index, status = %record.status, "identifier processed");
                    if tx.send((index, record)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(raw_tx);

        tokio::spawn(forward(raw_rx, out_tx, self.config.ordered_output, metrics));
        out_rx
    }

    /// Convenience wrapper: drain the stream and return all records plus
    /// the final metrics snapshot.
    pub async fn run(&self, identifiers: Vec<String>) -> BatchReport {
        let mut rx = self.stream(identifiers);
        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        BatchReport {
            records,
            metrics: self.metrics(),
        }
    }
}

/// Bridge worker output to the caller, re-ordering by input index when asked.
async fn forward(
    mut rx: mpsc::Receiver<(usize, MergedRecord)>,
    tx: mpsc::Sender<MergedRecord>,
    ordered: bool,
    metrics: Arc<RunMetrics>,
) {
    if ordered {
        let mut pending = BTreeMap::new();
        let mut next = 0usize;
        while let Some((index, record)) = rx.recv().await {
            pending.insert(index, record);
            while let Some(record) = pending.remove(&next) {
                if tx.send(record).await.is_err() {
                    return;
                }
                next += 1;
            }
        }
    } else {
        while let Some((_, record)) = rx.recv().await {
            if tx.send(record).await.is_err() {
                return;
            }
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        run_id = %snapshot.run_id,
        complete = snapshot.complete,
        partial = snapshot.partial,
        failed = snapshot.failed,
        "batch run finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_on_small_samples() {
        assert_eq!(percentile(&[], 95), 0);
        assert_eq!(percentile(&[7], 50), 7);
        assert_eq!(percentile(&[1, 2, 3, 4], 50), 2);
        assert_eq!(percentile(&[1, 2, 3, 4], 95), 4);
    }

    #[test]
    fn snapshot_counts_statuses_and_source_failures() {
        use crate::domain::SourceResult;
        use crate::merge::{merge, MergePolicy};

        let metrics = RunMetrics::new();
        let registry = SourceResult::transient_failure(
            SourceId::Registry,
            "timeout",
            Duration::from_millis(30),
            4,
        );
        let insurance = SourceResult::not_found(SourceId::Insurance, Duration::from_millis(5), 1)
            .into_cache_hit();
        let record = merge("0110198560", &registry, &insurance, &MergePolicy::default());
        metrics.record(&record, Duration::from_millis(40));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_processed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.registry_failures, 1);
        assert_eq!(snapshot.insurance_failures, 0);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.latency_p50_ms, 40);
    }
}
