use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use tally_benchmark::{BenchmarkEngine, PassReport};
use tally_client::types::Responder;
use tally_client::ResponderClient;
use tally_config::refresh::{ConfigHandle, ConfigRefresher};
use tally_config::remote::RemoteConfigFetcher;
use tally_primitives::ResponderClaim;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::options::{ConfigSources, LoggingOptions, MetricsOptions};
use crate::signal::shutdown_signal;

const LOG_TARGET: &str = "benchmark";

#[derive(Debug, Args)]
#[cfg_attr(test, derive(PartialEq))]
pub struct BenchArgs {
    /// JSON file with the responder claims to benchmark.
    #[arg(long, value_name = "PATH")]
    #[arg(required_unless_present = "responders", conflicts_with = "responders")]
    pub claims: Option<PathBuf>,

    /// JSON file with the responders to run discovery against before every pass.
    #[arg(long, value_name = "PATH")]
    pub responders: Option<PathBuf>,

    /// Time a responder is given to answer discovery.
    #[arg(long = "discovery.timeout", value_name = "SECONDS")]
    #[arg(default_value_t = tally_client::DEFAULT_DISCOVERY_TIMEOUT.as_secs())]
    pub discovery_timeout: u64,

    /// Write the results to this file instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Run a new pass every INTERVAL seconds until interrupted.
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Write the full pass report instead of only the verdicts.
    #[arg(long)]
    pub report: bool,

    /// Only report verdicts from chunks that reached the consensus threshold.
    #[arg(long)]
    pub require_consensus: bool,

    #[command(flatten)]
    pub sources: ConfigSources,

    #[command(flatten)]
    pub logging: LoggingOptions,

    #[command(flatten)]
    pub metrics: MetricsOptions,
}

impl BenchArgs {
    pub async fn execute(self) -> Result<()> {
        tally_tracing::init(self.logging.format, self.logging.filter.as_deref())?;

        let (config, remote) = self.sources.resolve()?;

        if self.metrics.metrics {
            let addr = self.metrics.socket_addr();
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("Failed to start metrics server")?;
            info!(target: LOG_TARGET, %addr, "Metrics server started.");
        }

        let cancel = CancellationToken::new();

        let config = match remote {
            Some(settings) => {
                let (refresher, handle) =
                    ConfigRefresher::new(RemoteConfigFetcher::new(settings), config);

                if let Err(error) = refresher.refresh().await {
                    warn!(target: LOG_TARGET, %error, "Using local configuration.");
                }

                tokio::spawn(refresher.run(cancel.clone()));
                handle
            }
            None => ConfigHandle::fixed(config),
        };

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            let signal = shutdown_signal().await;
            info!(target: LOG_TARGET, signal, "Shutdown signal received.");
            shutdown.cancel();
        });

        let client = ResponderClient::new()
            .with_discovery_timeout(Duration::from_secs(self.discovery_timeout));
        let engine = BenchmarkEngine::new(client);

        let result = self.run(&engine, &config, &cancel).await;
        cancel.cancel();
        result
    }

    async fn run(
        &self,
        engine: &BenchmarkEngine<ResponderClient>,
        config: &ConfigHandle,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let claims = self.claims(engine.transport()).await?;
            let snapshot = config.snapshot();

            let report = engine.run_pass_until_cancelled(claims, &snapshot, cancel).await;
            self.write(&report, snapshot.consensus_threshold)?;

            let Some(interval) = self.interval else { return Ok(()) };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            }
        }
    }

    async fn claims(&self, client: &ResponderClient) -> Result<Vec<ResponderClaim>> {
        if let Some(path) = &self.claims {
            return read_json(path);
        }

        match &self.responders {
            Some(path) => {
                let responders: Vec<Responder> = read_json(path)?;
                Ok(client.discover_all(&responders).await)
            }
            None => Ok(Vec::new()),
        }
    }

    fn write(&self, report: &PassReport, consensus_threshold: f64) -> Result<()> {
        let json = if self.report {
            serde_json::to_string_pretty(report)?
        } else if self.require_consensus {
            serde_json::to_string_pretty(&report.verdicts_with_consensus(consensus_threshold))?
        } else {
            serde_json::to_string_pretty(&report.verdicts())?
        };

        match &self.output {
            Some(path) => std::fs::write(path, json)
                .with_context(|| format!("Failed to write results to {}", path.display())),
            None => {
                println!("{json}");
                Ok(())
            }
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&file).with_context(|| format!("Failed to parse {}", path.display()))
}
