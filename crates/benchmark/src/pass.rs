use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tally_config::BenchmarkConfig;
use tally_primitives::ResponderClaim;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::{Chunk, ChunkScheduler};
use crate::cohort::CohortBuilder;
use crate::consensus::{score_chunk, ChunkScore};
use crate::metrics::BenchmarkMetrics;
use crate::probe::{ProbeExecutor, ProbeOutcome, ProbeTransport};
use crate::query::{BenchmarkQuery, QuerySynthesizer};
use crate::report::{ChunkSummary, Diagnostic, Observation, PassReport};

const LOG_TARGET: &str = "benchmark";

/// Runs benchmarking passes over a [`ProbeTransport`].
pub struct BenchmarkEngine<T> {
    transport: T,
    metrics: BenchmarkMetrics,
}

impl<T> std::fmt::Debug for BenchmarkEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkEngine").finish_non_exhaustive()
    }
}

/// A chunk together with the query of its cohort.
#[derive(Debug)]
struct ChunkJob {
    chunk: Chunk,
    query: Arc<BenchmarkQuery>,
}

enum ChunkResult {
    Completed { job: ChunkJob, outcomes: Vec<ProbeOutcome>, score: Option<ChunkScore> },
    Abandoned { job: ChunkJob, error: PanickedChunkError },
}

impl<T: ProbeTransport> BenchmarkEngine<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, metrics: BenchmarkMetrics::default() }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs a complete pass over `claims` using the given configuration snapshot.
    pub async fn run_pass(
        &self,
        claims: Vec<ResponderClaim>,
        config: &BenchmarkConfig,
    ) -> PassReport {
        self.run_pass_until_cancelled(claims, config, &CancellationToken::new()).await
    }

    /// Runs a pass that stops as soon as `cancel` is triggered.
    ///
    /// Chunks still being probed at that point are dropped. The report only contains chunks that
    /// were completely scored, and has [`PassReport::cancelled`] set.
    pub async fn run_pass_until_cancelled(
        &self,
        claims: Vec<ResponderClaim>,
        config: &BenchmarkConfig,
        cancel: &CancellationToken,
    ) -> PassReport {
        let mut report = PassReport::default();

        if !config.enabled {
            info!(target: LOG_TARGET, "Benchmarking is disabled.");
            return report;
        }

        self.metrics.record_pass();
        info!(target: LOG_TARGET, claims = claims.len(), "Starting benchmarking pass.");

        let jobs = self.plan(claims, config, &mut report);
        let total = jobs.len();

        let executor = ProbeExecutor::new(&self.transport, config.probe_timeout);
        let results = futures::stream::iter(jobs)
            .map(|job| self.run_chunk(&executor, job))
            .buffer_unordered(config.max_concurrent_chunks.max(1));
        let mut results = std::pin::pin!(results);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    warn!(target: LOG_TARGET, "Benchmarking pass cancelled.");
                    report.cancelled = true;
                    break;
                }

                result = results.next() => match result {
                    Some(result) => self.record(result, &mut report),
                    None => break,
                },
            }
        }

        report.sort();

        info!(
            target: LOG_TARGET,
            chunks = total,
            scored = report.chunks.len(),
            verdicts = report.verdicts().len(),
            diagnostics = report.diagnostics.len(),
            "Benchmarking pass finished."
        );

        report
    }

    /// Forms cohorts and chunks, and synthesizes one query per cohort.
    ///
    /// Everything that is skipped is recorded in `report`.
    fn plan(
        &self,
        claims: Vec<ResponderClaim>,
        config: &BenchmarkConfig,
        report: &mut PassReport,
    ) -> Vec<ChunkJob> {
        let mut rng = rand::thread_rng();
        let cohorts = CohortBuilder::new(config.cluster_count).build(claims);
        let scheduler = ChunkScheduler::new(config.chunk_size);

        for (uid, error) in &cohorts.rejected {
            let reason = error.to_string();
            report.diagnostics.push(Diagnostic::ClaimRejected { uid: *uid, reason });
        }

        for (network, error) in &cohorts.skipped {
            report.diagnostics.push(Diagnostic::NetworkSkipped {
                network: network.clone(),
                reason: error.to_string(),
            });
        }

        let mut jobs = Vec::new();
        let mut skipped_cohorts = 0;

        for cohort in cohorts.iter() {
            let template = config.template_for(&cohort.network);
            let synthesizer =
                QuerySynthesizer::new(template, config.query_diff, config.query_jitter);

            let query = match synthesizer.synthesize(&cohort.network, cohort.safe_range, &mut rng) {
                Ok(query) => Arc::new(query),
                Err(error) => {
                    warn!(
                        target: LOG_TARGET,
                        network = %cohort.network,
                        cohort = cohort.label,
                        %error,
                        "Skipping cohort."
                    );
                    skipped_cohorts += 1;
                    report.diagnostics.push(Diagnostic::CohortSkipped {
                        network: cohort.network.clone(),
                        cohort: cohort.label,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            debug!(
                target: LOG_TARGET,
                network = %cohort.network,
                cohort = cohort.label,
                range = %query.range,
                "Synthesized query."
            );

            for chunk in scheduler.schedule(cohort, &mut rng) {
                jobs.push(ChunkJob { chunk, query: Arc::clone(&query) });
            }
        }

        self.metrics.record_planning(
            cohorts.rejected.len(),
            cohorts.skipped.len(),
            skipped_cohorts,
        );

        jobs
    }

    async fn run_chunk(&self, executor: &ProbeExecutor<'_, T>, job: ChunkJob) -> ChunkResult {
        let probed = AssertUnwindSafe(async {
            let outcomes = executor.execute(&job.query, &job.chunk.members).await;
            let score = score_chunk(&outcomes);
            (outcomes, score)
        })
        .catch_unwind()
        .await;

        match probed {
            Ok((outcomes, score)) => ChunkResult::Completed { job, outcomes, score },
            Err(error) => ChunkResult::Abandoned { job, error: PanickedChunkError { error } },
        }
    }

    fn record(&self, result: ChunkResult, report: &mut PassReport) {
        let (job, outcomes, score) = match result {
            ChunkResult::Completed { job, outcomes, score } => (job, outcomes, score),
            ChunkResult::Abandoned { job, error } => {
                let Chunk { network, cohort, index, .. } = job.chunk;
                error!(
                    target: LOG_TARGET,
                    %network,
                    cohort,
                    chunk = index,
                    %error,
                    "Chunk abandoned."
                );
                self.metrics.record_abandoned_chunk();
                report.diagnostics.push(Diagnostic::ChunkAbandoned {
                    network,
                    cohort,
                    chunk: index,
                    reason: error.to_string(),
                });
                return;
            }
        };

        self.metrics.record_outcomes(&outcomes);
        self.metrics.record_chunk(score.is_some());

        let Chunk { network, cohort, index, members } = job.chunk;

        for outcome in &outcomes {
            if let ProbeOutcome::Failure { uid, reason } = outcome {
                report.diagnostics.push(Diagnostic::ProbeFailed {
                    uid: *uid,
                    network: network.clone(),
                    cohort,
                    chunk: index,
                    reason: reason.to_string(),
                });
            }
        }

        let mut summary = ChunkSummary {
            network: network.clone(),
            cohort,
            chunk: index,
            range: job.query.range,
            members: members.len(),
            responses: 0,
            support: 0,
            majority: None,
        };

        let Some(score) = score else {
            warn!(target: LOG_TARGET, %network, cohort, chunk = index, "No responder answered.");
            report.diagnostics.push(Diagnostic::NoAnswers { network, cohort, chunk: index });
            report.chunks.push(summary);
            return;
        };

        debug!(
            target: LOG_TARGET,
            %network,
            cohort,
            chunk = index,
            support = score.support,
            responses = score.responses,
            "Chunk scored."
        );

        for (uid, verdict) in &score.verdicts {
            let hotkey = members
                .iter()
                .find(|m| m.uid == *uid)
                .map(|m| m.hotkey.clone())
                .unwrap_or_default();

            report.observations.push(Observation {
                uid: *uid,
                hotkey,
                network: network.clone(),
                cohort,
                chunk: index,
                verdict: *verdict,
            });
        }

        summary.responses = score.responses;
        summary.support = score.support;
        summary.majority = Some(score.majority);
        report.chunks.push(summary);
    }
}

/// Wraps the payload of a panic caught while a chunk was running.
#[derive(Debug, thiserror::Error)]
struct PanickedChunkError {
    error: Box<dyn Any + Send>,
}

impl std::fmt::Display for PanickedChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(msg) = self.error.downcast_ref::<String>() {
            write!(f, "panicked: {msg}")
        } else if let Some(msg) = self.error.downcast_ref::<&str>() {
            write!(f, "panicked: {msg}")
        } else {
            f.write_str("panicked")
        }
    }
}
