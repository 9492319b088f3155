//! Metric sink and histogram aggregator.
//!
//! Workers submit [`RequestEvent`]s non-blockingly into a bounded channel;
//! a single aggregator task drains it and maintains one [`ActionStats`] per
//! action name. The aggregator is the only writer of histogram state; the
//! reporter reads snapshots.

use crate::percentiles::{PercentileStats, PercentileTracker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Sink capacity: large enough to absorb typical bursts without blocking a
/// worker's request-generation rate.
pub const SINK_CAPACITY: usize = 10_000;

/// A record written by a worker for one completed (or failed) request.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub action: String,
    pub method: String,
    pub url: String,
    pub start: Instant,
    pub end: Instant,
    pub status: u16,
    pub bytes: u64,
    /// Empty on success.
    pub error: String,
}

impl RequestEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_empty() && (200..400).contains(&self.status)
    }

    pub fn latency_us(&self) -> u64 {
        self.end.saturating_duration_since(self.start).as_micros() as u64
    }
}

/// Per-action aggregate: only the aggregator task writes these.
#[derive(Default)]
struct ActionStatsInner {
    success_count: u64,
    error_count: u64,
    bytes_total: u64,
    latencies: Option<PercentileTracker>,
}

/// A read-only snapshot of one action's statistics, safe to hand to the
/// reporter.
#[derive(Debug, Clone)]
pub struct ActionStats {
    pub success_count: u64,
    pub error_count: u64,
    pub bytes_total: u64,
    pub latency: Option<PercentileStats>,
}

/// The producer half: cloned into every worker. `submit` never blocks —
/// on a full channel the event is silently dropped.
#[derive(Clone)]
pub struct MetricSink {
    tx: mpsc::Sender<RequestEvent>,
    dropped: Arc<AtomicU64>,
}

impl MetricSink {
    pub fn submit(&self, event: RequestEvent) {
        if let Err(e) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(reason = %e, "metric sink full, dropping event");
        }
    }
}

/// Holds the statistics map and drains the channel until it is closed (i.e.
/// every `MetricSink` clone has been dropped).
pub struct Aggregator {
    rx: mpsc::Receiver<RequestEvent>,
    stats: Arc<RwLock<HashMap<String, ActionStatsInner>>>,
    dropped: Arc<AtomicU64>,
}

/// A cheaply cloneable read handle for the reporter.
#[derive(Clone)]
pub struct StatsReader {
    stats: Arc<RwLock<HashMap<String, ActionStatsInner>>>,
}

impl StatsReader {
    /// A shallow, read-locked copy of the statistics map.
    pub fn snapshot(&self) -> HashMap<String, ActionStats> {
        let guard = self.stats.read().expect("stats lock poisoned");
        guard
            .iter()
            .map(|(name, inner)| {
                (
                    name.clone(),
                    ActionStats {
                        success_count: inner.success_count,
                        error_count: inner.error_count,
                        bytes_total: inner.bytes_total,
                        latency: inner.latencies.as_ref().and_then(|t| t.stats()),
                    },
                )
            })
            .collect()
    }
}

/// Build a sink/aggregator pair. The aggregator must be run to completion
/// (via [`Aggregator::run`]) to drain events.
pub fn channel() -> (MetricSink, Aggregator, StatsReader) {
    let (tx, rx) = mpsc::channel(SINK_CAPACITY);
    let stats = Arc::new(RwLock::new(HashMap::new()));
    let dropped = Arc::new(AtomicU64::new(0));
    let reader = StatsReader {
        stats: stats.clone(),
    };
    (
        MetricSink {
            tx,
            dropped: dropped.clone(),
        },
        Aggregator { rx, stats, dropped },
        reader,
    )
}

impl Aggregator {
    /// Drains events until every sink producer has been dropped and the
    /// channel closes.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.record(event);
        }
        debug!(
            dropped = self.dropped.load(Ordering::Relaxed),
            "aggregator drained, channel closed"
        );
    }

    fn record(&mut self, event: RequestEvent) {
        let mut guard = self.stats.write().expect("stats lock poisoned");
        let entry = guard.entry(event.action.clone()).or_default();

        entry.bytes_total += event.bytes;

        if event.is_success() {
            entry.success_count += 1;
            entry
                .latencies
                .get_or_insert_with(PercentileTracker::new)
                .record_us(event.latency_us());
        } else {
            entry.error_count += 1;
        }
    }
}
