//! Spawns workers under a time-bounded cancellation scope, waits for drain,
//! and guarantees a final report is produced.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::cancellation;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::metrics::channel;
use crate::reporter::Reporter;
use crate::scenario::Scenario;
use crate::worker::{self, WorkerConfig};

pub struct Orchestrator {
    config: Config,
    scenario: Arc<Scenario>,
    credentials: Arc<Credentials>,
}

impl Orchestrator {
    pub fn new(config: Config, scenario: Scenario, credentials: Credentials) -> Self {
        Self {
            config,
            scenario: Arc::new(scenario),
            credentials: Arc::new(credentials),
        }
    }

    /// Runs the test to completion (deadline or external cancellation,
    /// whichever comes first) and always produces a final report.
    pub async fn run(&self, external_cancel: cancellation::CancellationScope) {
        let started = Instant::now();
        let (sink, aggregator, stats) = channel();
        let (trigger, scope) = cancellation::scope();

        // The aggregator must drain the channel concurrently with the
        // workers, not after they join — otherwise the bounded sink buffers
        // the whole run instead of just absorbing bursts.
        let aggregator_task = tokio::spawn(aggregator.run());

        let reporter = Reporter::new(stats.clone(), self.config.verbose);
        let live_task = reporter.spawn_live_ticker(scope.clone());

        let mut worker_handles = Vec::with_capacity(self.config.users as usize);
        for worker_id in 1..=self.config.users as u64 {
            let scenario = self.scenario.clone();
            let credentials = self.credentials.clone();
            let sink = sink.clone();
            let scope = scope.clone();
            let worker_config = WorkerConfig {
                rps: self.config.rps,
                login_url: self.config.login_url.clone(),
                login_header: self.config.login_header.clone(),
                insecure_tls: self.config.insecure_tls,
            };

            worker_handles.push(tokio::spawn(async move {
                // Scenario and credentials outlive every worker task: the
                // orchestrator awaits all workers before dropping its Arcs.
                let scenario: &Scenario = &scenario;
                let credentials: &Credentials = &credentials;
                worker::run(worker_id, scenario, credentials, sink, worker_config, scope).await;
            }));
        }

        // The sink's last clone (held here) must be dropped before the
        // aggregator's channel recv() returns None.
        drop(sink);

        let deadline = tokio::time::sleep(self.config.duration);
        tokio::pin!(deadline);

        tokio::select! {
            _ = &mut deadline => {
                info!("test duration elapsed, signalling workers to stop");
                trigger.cancel();
            }
            _ = wait_for_external_cancel(external_cancel) => {
                info!("external interrupt received, signalling workers to stop");
                trigger.cancel();
            }
        }

        for handle in worker_handles {
            let _ = handle.await;
        }

        // Every worker has returned, so every `MetricSink` clone held by a
        // worker task is gone; the aggregator's channel now closes and
        // `run()` returns.
        let _ = aggregator_task.await;

        if let Some(task) = live_task {
            task.abort();
        }

        let elapsed = started.elapsed();
        reporter.final_report(elapsed);

        if let Some(out_path) = &self.config.out {
            if let Err(e) = reporter.write_structured_report(out_path, elapsed) {
                tracing::error!(path = %out_path, error = %e, "failed to write structured report");
            }
        }
    }
}

async fn wait_for_external_cancel(mut scope: cancellation::CancellationScope) {
    scope.cancelled().await;
}
