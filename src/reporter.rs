//! Live progress line, final terminal table, and structured JSON report.

use crate::cancellation::CancellationScope;
use crate::metrics::StatsReader;
use crate::percentiles::format_latency_us;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

pub struct Reporter {
    stats: StatsReader,
    verbose: bool,
}

#[derive(Serialize)]
struct StructuredReport {
    timestamp: String,
    duration_sec: u64,
    actions: HashMap<String, StructuredAction>,
    summary: StructuredSummary,
}

#[derive(Serialize)]
struct StructuredAction {
    total_ok: u64,
    total_errors: u64,
    bytes_total: u64,
    p50_ms: u64,
    p90_ms: u64,
    p95_ms: u64,
    p99_ms: u64,
    rps: f64,
}

#[derive(Serialize)]
struct StructuredSummary {
    total_requests: u64,
    total_ok: u64,
    total_errors: u64,
    success_rate: f64,
    avg_rps: f64,
    bytes_total: u64,
}

impl Reporter {
    pub fn new(stats: StatsReader, verbose: bool) -> Self {
        Self { stats, verbose }
    }

    /// Spawns the one-second progress ticker if verbose mode is on. Returns
    /// `None` otherwise.
    pub fn spawn_live_ticker(&self, mut scope: CancellationScope) -> Option<JoinHandle<()>> {
        if !self.verbose {
            return None;
        }

        let stats = self.stats.clone();
        Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            let mut elapsed = 0u64;
            let mut last_successes = 0u64;

            loop {
                ticker.tick().await;
                if scope.is_cancelled() {
                    break;
                }
                elapsed += 1;

                let snapshot = stats.snapshot();
                let (ok, err) = totals(&snapshot);
                let success_pct = if ok + err > 0 {
                    ok as f64 / (ok + err) as f64 * 100.0
                } else {
                    0.0
                };
                let observed_rps = ok.saturating_sub(last_successes);
                last_successes = ok;

                print!(
                    "\relapsed={}s ok={} err={} success={:.1}% ok/s={}   ",
                    elapsed, ok, err, success_pct, observed_rps
                );
                let _ = std::io::stdout().flush();
            }
        }))
    }

    /// Prints the final terminal table, sorted by action name.
    pub fn final_report(&self, duration: Duration) {
        let snapshot = self.stats.snapshot();
        let duration_secs = duration.as_secs_f64().max(1e-9);

        if self.verbose {
            println!();
        }

        println!(
            "{:<24} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "ACTION", "OK", "ERR", "P50", "P90", "P95", "P99", "RPS"
        );

        let mut names: Vec<&String> = snapshot.keys().collect();
        names.sort();

        let mut total_requests = 0u64;
        let mut total_ok = 0u64;
        let mut total_errors = 0u64;
        let mut total_bytes = 0u64;
        let mut weighted_p50_us = 0f64;

        for name in &names {
            let stats = &snapshot[*name];
            let (p50, p90, p95, p99) = match &stats.latency {
                Some(l) => (l.p50, l.p90, l.p95, l.p99),
                None => (0, 0, 0, 0),
            };
            let rps = stats.success_count as f64 / duration_secs;

            println!(
                "{:<24} {:>8} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10.2}",
                name,
                stats.success_count,
                stats.error_count,
                format_latency_us(p50),
                format_latency_us(p90),
                format_latency_us(p95),
                format_latency_us(p99),
                rps,
            );

            total_ok += stats.success_count;
            total_errors += stats.error_count;
            total_bytes += stats.bytes_total;
            weighted_p50_us += p50 as f64 * stats.success_count as f64;
        }

        total_requests = total_ok + total_errors;
        let success_pct = if total_requests > 0 {
            total_ok as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        let overall_rps = total_requests as f64 / duration_secs;
        let avg_latency_us = if total_ok > 0 {
            weighted_p50_us / total_ok as f64
        } else {
            0.0
        };

        println!(
            "\nTOTAL requests={} success={:.1}% elapsed={:.1}s rps={:.2} avg_latency~{}",
            total_requests,
            success_pct,
            duration_secs,
            overall_rps,
            format_latency_us(avg_latency_us as u64),
        );

        if total_bytes > 0 {
            let mib = total_bytes as f64 / (1024.0 * 1024.0);
            println!("bytes={:.2}MiB ({:.2}MiB/s)", mib, mib / duration_secs);
        }
    }

    /// Writes the structured JSON report per the external contract.
    pub fn write_structured_report(&self, path: &str, duration: Duration) -> std::io::Result<()> {
        let snapshot = self.stats.snapshot();
        let duration_secs = duration.as_secs_f64().max(1e-9);

        let mut actions = HashMap::new();
        let mut total_ok = 0u64;
        let mut total_errors = 0u64;
        let mut total_bytes = 0u64;

        for (name, stats) in &snapshot {
            let (p50, p90, p95, p99) = match &stats.latency {
                Some(l) => (l.p50, l.p90, l.p95, l.p99),
                None => (0, 0, 0, 0),
            };

            actions.insert(
                name.clone(),
                StructuredAction {
                    total_ok: stats.success_count,
                    total_errors: stats.error_count,
                    bytes_total: stats.bytes_total,
                    p50_ms: p50 / 1000,
                    p90_ms: p90 / 1000,
                    p95_ms: p95 / 1000,
                    p99_ms: p99 / 1000,
                    rps: stats.success_count as f64 / duration_secs,
                },
            );

            total_ok += stats.success_count;
            total_errors += stats.error_count;
            total_bytes += stats.bytes_total;
        }

        let total_requests = total_ok + total_errors;
        let report = StructuredReport {
            timestamp: Utc::now().to_rfc3339(),
            duration_sec: duration.as_secs(),
            actions,
            summary: StructuredSummary {
                total_requests,
                total_ok,
                total_errors,
                success_rate: if total_requests > 0 {
                    total_ok as f64 / total_requests as f64
                } else {
                    0.0
                },
                avg_rps: total_requests as f64 / duration_secs,
                bytes_total: total_bytes,
            },
        };

        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
    }
}

fn totals(snapshot: &HashMap<String, crate::metrics::ActionStats>) -> (u64, u64) {
    snapshot.values().fold((0, 0), |(ok, err), s| {
        (ok + s.success_count, err + s.error_count)
    })
}
