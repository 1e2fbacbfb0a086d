use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

use crate::probe::{ProbeFailure, ProbeOutcome};

#[derive(Metrics, Clone)]
#[metrics(scope = "benchmark")]
pub(crate) struct BenchmarkMetrics {
    /// The number of benchmarking passes started
    passes: Counter,
    /// The number of claims rejected before clustering
    claims_rejected: Counter,
    /// The number of networks skipped because their claims could not be clustered
    networks_skipped: Counter,
    /// The number of cohorts skipped because their safe range was too narrow
    cohorts_skipped: Counter,
    /// The number of probes sent
    probes_sent: Counter,
    /// The number of probes without a usable answer
    probes_failed: Counter,
    /// The number of probes that were not answered in time
    probes_timed_out: Counter,
    /// Latency of successful probes
    probe_time_seconds: Histogram,
    /// The number of chunks scored
    chunks_scored: Counter,
    /// The number of chunks in which no probe succeeded
    chunks_without_answers: Counter,
    /// The number of chunks abandoned because they panicked
    chunks_abandoned: Counter,
}

impl BenchmarkMetrics {
    pub(crate) fn record_pass(&self) {
        self.passes.increment(1);
    }

    pub(crate) fn record_planning(&self, rejected: usize, networks: usize, cohorts: usize) {
        self.claims_rejected.increment(rejected as u64);
        self.networks_skipped.increment(networks as u64);
        self.cohorts_skipped.increment(cohorts as u64);
    }

    pub(crate) fn record_outcomes(&self, outcomes: &[ProbeOutcome]) {
        self.probes_sent.increment(outcomes.len() as u64);

        for outcome in outcomes {
            match outcome {
                ProbeOutcome::Success { latency, .. } => {
                    self.probe_time_seconds.record(latency.as_secs_f64())
                }
                ProbeOutcome::Failure { reason, .. } => {
                    self.probes_failed.increment(1);
                    if matches!(reason, ProbeFailure::Timeout(_)) {
                        self.probes_timed_out.increment(1);
                    }
                }
            }
        }
    }

    pub(crate) fn record_chunk(&self, scored: bool) {
        if scored {
            self.chunks_scored.increment(1);
        } else {
            self.chunks_without_answers.increment(1);
        }
    }

    pub(crate) fn record_abandoned_chunk(&self) {
        self.chunks_abandoned.increment(1);
    }
}
