//! Remote delivery of benchmark parameters.
//!
//! The coordinator periodically downloads a JSON document whose `benchmark_*` keys override the
//! locally configured [`BenchmarkConfig`]. The last document that produced a valid configuration
//! is kept in a cache file and used whenever the remote endpoint cannot be reached.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tally_primitives::Network;
use tracing::{debug, info, warn};
use url::Url;

use crate::{BenchmarkConfig, ConfigError, QueryTemplate};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const LOG_TARGET: &str = "config";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    #[error("malformed remote config document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("config cache i/o error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("remote config unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },

    #[error("remote config rejected: {0}")]
    Invalid(#[from] ConfigError),
}

/// Where and how often the remote configuration is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSettings {
    pub url: Url,
    /// File the last good document is written to. No caching if unset.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(
        default = "default_refresh_interval",
        rename = "refresh_interval_secs",
        with = "tally_primitives::duration::secs"
    )]
    pub refresh_interval: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(
        default = "default_retry_interval",
        rename = "retry_interval_secs",
        with = "tally_primitives::duration::secs"
    )]
    pub retry_interval: Duration,
    #[serde(
        default = "default_request_timeout",
        rename = "request_timeout_secs",
        with = "tally_primitives::duration::secs"
    )]
    pub request_timeout: Duration,
}

impl RemoteSettings {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cache_path: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_interval() -> Duration {
    DEFAULT_RETRY_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

/// The subset of the remote document that concerns benchmarking.
///
/// Unrelated keys are ignored. Absent keys leave the local value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub benchmark_enabled: Option<bool>,
    pub benchmark_consensus: Option<f64>,
    /// Probe timeout in seconds. Fractions are allowed.
    pub benchmark_timeout: Option<f64>,
    pub benchmark_cluster_size: Option<usize>,
    pub benchmark_query_chunk_size: Option<usize>,
    pub benchmark_query_diff: Option<u64>,
    pub benchmark_query_jitter: Option<u64>,
    pub benchmark_max_concurrent_chunks: Option<usize>,
    pub benchmark_default_query_template: Option<QueryTemplate>,
    #[serde(default)]
    pub benchmark_query_template: BTreeMap<Network, QueryTemplate>,
    pub benchmark_restricted_keywords: Option<Vec<String>>,
}

impl RemoteDocument {
    /// Returns `base` with the values present in this document applied on top of it.
    ///
    /// The result is validated, an invalid combination is returned as an error and `base` is
    /// left as is.
    pub fn apply(&self, base: &BenchmarkConfig) -> Result<BenchmarkConfig, ConfigError> {
        let mut config = base.clone();

        if let Some(enabled) = self.benchmark_enabled {
            config.enabled = enabled;
        }
        if let Some(threshold) = self.benchmark_consensus {
            config.consensus_threshold = threshold;
        }
        if let Some(secs) = self.benchmark_timeout {
            if !secs.is_finite() || secs < 0.0 {
                return Err(ConfigError::InvalidProbeTimeout(secs));
            }
            config.probe_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(count) = self.benchmark_cluster_size {
            config.cluster_count = count;
        }
        if let Some(size) = self.benchmark_query_chunk_size {
            config.chunk_size = size;
        }
        if let Some(diff) = self.benchmark_query_diff {
            config.query_diff = diff;
        }
        if let Some(jitter) = self.benchmark_query_jitter {
            config.query_jitter = jitter;
        }
        if let Some(max) = self.benchmark_max_concurrent_chunks {
            config.max_concurrent_chunks = max;
        }
        if let Some(template) = &self.benchmark_default_query_template {
            config.default_template = template.clone();
        }
        if let Some(keywords) = &self.benchmark_restricted_keywords {
            config.restricted_keywords = keywords.clone();
        }

        config.templates.extend(
            self.benchmark_query_template.iter().map(|(n, t)| (n.clone(), t.clone())),
        );

        config.validate()?;
        Ok(config)
    }
}

/// Downloads [`RemoteDocument`]s.
#[derive(Debug, Clone)]
pub struct RemoteConfigFetcher {
    settings: RemoteSettings,
    client: Client,
}

impl RemoteConfigFetcher {
    pub fn new(settings: RemoteSettings) -> Self {
        Self { settings, client: Client::new() }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Fetches the remote document, falling back to the cached copy if the endpoint is
    /// unavailable.
    pub async fn load(&self) -> Result<RemoteDocument, RemoteError> {
        match self.fetch().await {
            Ok(document) => Ok(document),
            Err(error @ (RemoteError::Unavailable { .. } | RemoteError::Network(_))) => {
                match self.read_cache().await? {
                    Some(document) => {
                        warn!(target: LOG_TARGET, %error, "Using cached remote config.");
                        Ok(document)
                    }
                    None => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Fetches the remote document, retrying on network errors.
    ///
    /// Malformed documents are not retried. The document is not cached here, see
    /// [`store`](Self::store).
    pub async fn fetch(&self) -> Result<RemoteDocument, RemoteError> {
        let attempts = self.settings.max_retries.max(1);

        for attempt in 1..=attempts {
            match self.fetch_once().await {
                Ok(body) => {
                    let document = serde_json::from_slice::<RemoteDocument>(&body)?;
                    info!(target: LOG_TARGET, url = %self.settings.url, "Fetched remote config.");
                    return Ok(document);
                }

                Err(error) => {
                    warn!(
                        target: LOG_TARGET,
                        %error,
                        attempt,
                        url = %self.settings.url,
                        "Attempt to fetch remote config failed."
                    );

                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_interval).await;
                    }
                }
            }
        }

        Err(RemoteError::Unavailable { attempts })
    }

    async fn fetch_once(&self) -> Result<Vec<u8>, reqwest::Error> {
        let response = self
            .client
            .get(self.settings.url.clone())
            .timeout(self.settings.request_timeout)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }

    /// Writes `document` to the cache file, if caching is enabled.
    ///
    /// Only documents that were accepted by [`RemoteDocument::apply`] should be stored, so that
    /// the cache never holds a document that cannot be used.
    pub async fn store(&self, document: &RemoteDocument) -> Result<(), RemoteError> {
        let Some(path) = &self.settings.cache_path else { return Ok(()) };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, serde_json::to_vec_pretty(document)?).await?;
        debug!(target: LOG_TARGET, path = %path.display(), "Cached remote config.");
        Ok(())
    }

    /// Reads the cached document, if caching is enabled and a cache file exists.
    pub async fn read_cache(&self) -> Result<Option<RemoteDocument>, RemoteError> {
        let Some(path) = &self.settings.cache_path else { return Ok(None) };

        match tokio::fs::read(path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::test_utils::OneShotServer;

    fn served_settings(server: &OneShotServer) -> RemoteSettings {
        let mut settings = RemoteSettings::new(server.url.clone());
        settings.max_retries = 3;
        settings.retry_interval = Duration::ZERO;
        settings.request_timeout = Duration::from_secs(2);
        settings
    }

    /// Nothing listens on the discard port.
    fn unreachable_settings() -> RemoteSettings {
        let url = Url::parse("http://127.0.0.1:9/validator.json").unwrap();
        let mut settings = RemoteSettings::new(url);
        settings.max_retries = 2;
        settings.retry_interval = Duration::ZERO;
        settings.request_timeout = Duration::from_secs(2);
        settings
    }

    #[test]
    fn apply_overrides_present_keys_only() {
        let document: RemoteDocument = serde_json::from_str(
            r#"{
                "benchmark_cluster_size": 4,
                "benchmark_timeout": 30,
                "benchmark_query_template": { "doge": "RETURN {start_block} + {end_block}" },
                "process_time_weight": 16,
                "blockchain_importance": { "bitcoin": 0.9 }
            }"#,
        )
        .unwrap();

        let base = BenchmarkConfig::default();
        let config = document.apply(&base).unwrap();

        assert_eq!(config.cluster_count, 4);
        assert_eq!(config.probe_timeout, Duration::from_secs(30));
        assert_eq!(config.chunk_size, base.chunk_size);
        assert_eq!(config.consensus_threshold, base.consensus_threshold);
        assert_eq!(
            config.template_for(&Network::new("doge")).as_str(),
            "RETURN {start_block} + {end_block}"
        );
    }

    #[test]
    fn invalid_document_is_rejected() {
        let document = RemoteDocument { benchmark_query_chunk_size: Some(0), ..Default::default() };
        let result = document.apply(&BenchmarkConfig::default());
        assert_matches!(result, Err(ConfigError::ZeroChunkSize));

        // templates are validated while decoding
        let result = serde_json::from_str::<RemoteDocument>(
            r#"{ "benchmark_query_template": { "doge": "RETURN 1" } }"#,
        );
        assert!(result.is_err());
    }

    #[rstest::rstest]
    #[case(12.5, Duration::from_millis(12_500))]
    #[case(30.0, Duration::from_secs(30))]
    fn fractional_timeout(#[case] secs: f64, #[case] expected: Duration) {
        let json = format!(r#"{{ "benchmark_timeout": {secs}, "benchmark_query_chunk_size": 8 }}"#);
        let document: RemoteDocument = serde_json::from_str(&json).unwrap();

        let config = document.apply(&BenchmarkConfig::default()).unwrap();
        assert_eq!(config.probe_timeout, expected);
        assert_eq!(config.chunk_size, 8);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let document = RemoteDocument { benchmark_timeout: Some(-1.0), ..Default::default() };
        assert_matches!(
            document.apply(&BenchmarkConfig::default()),
            Err(ConfigError::InvalidProbeTimeout(_))
        );
    }

    #[tokio::test]
    async fn fetch_decodes_served_document() {
        let server = OneShotServer::start(vec![(200, r#"{ "benchmark_query_diff": 5000 }"#)]).await;

        let fetcher = RemoteConfigFetcher::new(served_settings(&server));
        let document = fetcher.fetch().await.unwrap();

        assert_eq!(document.benchmark_query_diff, Some(5000));
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let replies = vec![(503, ""), (200, r#"{ "benchmark_enabled": false }"#)];
        let server = OneShotServer::start(replies).await;

        let fetcher = RemoteConfigFetcher::new(served_settings(&server));
        let document = fetcher.fetch().await.unwrap();

        assert_eq!(document.benchmark_enabled, Some(false));
        assert_eq!(server.requests(), 2);
    }

    #[tokio::test]
    async fn malformed_document_is_not_retried() {
        let replies = vec![(200, "<html>maintenance</html>"), (200, "{}")];
        let server = OneShotServer::start(replies).await;

        let fetcher = RemoteConfigFetcher::new(served_settings(&server));

        assert_matches!(fetcher.fetch().await, Err(RemoteError::Decode(_)));
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test]
    async fn fetch_does_not_touch_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let server = OneShotServer::start(vec![(200, r#"{ "benchmark_query_diff": 5000 }"#)]).await;

        let mut settings = served_settings(&server);
        settings.cache_path = Some(dir.path().join("validator.json"));

        let fetcher = RemoteConfigFetcher::new(settings);
        let document = fetcher.fetch().await.unwrap();
        assert_matches!(fetcher.read_cache().await, Ok(None));

        fetcher.store(&document).await.unwrap();
        assert_matches!(fetcher.read_cache().await, Ok(Some(cached)) => {
            assert_eq!(cached, document);
        });
    }

    #[tokio::test]
    async fn unreachable_endpoint_without_cache() {
        let fetcher = RemoteConfigFetcher::new(unreachable_settings());
        assert_matches!(fetcher.load().await, Err(RemoteError::Unavailable { attempts: 2 }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("validator.json");
        std::fs::write(&cache_path, r#"{ "benchmark_query_diff": 5000 }"#).unwrap();

        let mut settings = unreachable_settings();
        settings.cache_path = Some(cache_path);

        let document = RemoteConfigFetcher::new(settings).load().await.unwrap();
        assert_eq!(document.benchmark_query_diff, Some(5000));
    }
}
