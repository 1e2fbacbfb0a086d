#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod file;
pub mod refresh;
pub mod remote;
pub mod template;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_primitives::Network;

pub use crate::template::{QueryTemplate, TemplateError};

/// Default number of coverage clusters formed per network.
pub const DEFAULT_CLUSTER_COUNT: usize = 1;
/// Default maximum number of responders probed with one shared query.
pub const DEFAULT_CHUNK_SIZE: usize = 5;
/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(600);
/// Default width, in blocks, of the probed sub-range.
pub const DEFAULT_QUERY_DIFF: u64 = 10_000;
/// Default upper bound of the random jitter subtracted from the probed width.
pub const DEFAULT_QUERY_JITTER: u64 = 100;
/// Default share of agreeing responders required by consumers of the verdicts.
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.51;
/// Default number of chunks probed at the same time.
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 16;
/// Keywords that make a query a write query.
pub const DEFAULT_RESTRICTED_KEYWORDS: &[&str] =
    &["CREATE", "SET", "DELETE", "DETACH", "REMOVE", "MERGE", "DROP"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cluster count must be at least 1")]
    ZeroClusterCount,

    #[error("chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("at least one chunk must be allowed to run at a time")]
    ZeroConcurrency,

    #[error("probe timeout must be greater than zero")]
    ZeroProbeTimeout,

    #[error("probe timeout must be a finite, non-negative number of seconds, got {0}")]
    InvalidProbeTimeout(f64),

    #[error("query jitter ({jitter}) must be smaller than the query diff ({diff})")]
    JitterTooLarge { diff: u64, jitter: u64 },

    #[error("consensus threshold must be in (0, 1], got {0}")]
    InvalidConsensusThreshold(f64),

    #[error("invalid query template for network '{network}': {source}")]
    Template {
        network: String,
        #[source]
        source: TemplateError,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Parameters of a benchmarking pass.
///
/// A pass reads one snapshot of this struct at its start and never observes changes made
/// afterwards. Refreshed values are published as new snapshots, see
/// [`ConfigHandle`](crate::refresh::ConfigHandle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Whether benchmarking passes run at all.
    pub enabled: bool,
    /// Number of coverage clusters formed per network.
    pub cluster_count: usize,
    /// Maximum number of responders sharing a single benchmark query.
    pub chunk_size: usize,
    /// Time a single responder is given to answer a benchmark query.
    #[serde(rename = "probe_timeout_secs", with = "tally_primitives::duration::secs")]
    pub probe_timeout: Duration,
    /// Width, in blocks, of the probed sub-range.
    pub query_diff: u64,
    /// Upper bound of the random amount subtracted from `query_diff` for every query.
    pub query_jitter: u64,
    /// Share of agreeing responders a chunk needs before its verdicts are trusted.
    ///
    /// Not applied by the engine itself. See `PassReport::verdicts_with_consensus`.
    pub consensus_threshold: f64,
    /// Maximum number of chunks probed concurrently.
    pub max_concurrent_chunks: usize,
    /// Template used for networks without a dedicated entry in `templates`.
    pub default_template: QueryTemplate,
    /// Per-network query templates.
    pub templates: BTreeMap<Network, QueryTemplate>,
    /// Keywords rejected in query templates.
    pub restricted_keywords: Vec<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cluster_count: DEFAULT_CLUSTER_COUNT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            query_diff: DEFAULT_QUERY_DIFF,
            query_jitter: DEFAULT_QUERY_JITTER,
            consensus_threshold: DEFAULT_CONSENSUS_THRESHOLD,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            default_template: QueryTemplate::default(),
            templates: BTreeMap::new(),
            restricted_keywords: DEFAULT_RESTRICTED_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl BenchmarkConfig {
    /// Returns the query template for the given network, falling back to the default template.
    pub fn template_for(&self, network: &Network) -> &QueryTemplate {
        self.templates.get(network).unwrap_or(&self.default_template)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_count == 0 {
            return Err(ConfigError::ZeroClusterCount);
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        if self.max_concurrent_chunks == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        if self.probe_timeout.is_zero() {
            return Err(ConfigError::ZeroProbeTimeout);
        }

        if self.query_jitter >= self.query_diff {
            return Err(ConfigError::JitterTooLarge {
                diff: self.query_diff,
                jitter: self.query_jitter,
            });
        }

        // written this way so that NaN is rejected too
        if !(self.consensus_threshold > 0.0 && self.consensus_threshold <= 1.0) {
            return Err(ConfigError::InvalidConsensusThreshold(self.consensus_threshold));
        }

        let templates = std::iter::once(("default", &self.default_template))
            .chain(self.templates.iter().map(|(network, template)| (network.as_str(), template)));

        for (network, template) in templates {
            template.ensure_read_only(&self.restricted_keywords).map_err(|source| {
                ConfigError::Template { network: network.to_string(), source }
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_utils;
