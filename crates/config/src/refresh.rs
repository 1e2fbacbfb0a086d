use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::remote::{RemoteConfigFetcher, RemoteError};
use crate::BenchmarkConfig;

const LOG_TARGET: &str = "config";

/// Read side of the published configuration.
///
/// Every benchmarking pass should call [`ConfigHandle::snapshot`] once and use the returned
/// value for its whole duration.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    rx: watch::Receiver<Arc<BenchmarkConfig>>,
}

impl ConfigHandle {
    /// Creates a handle that always returns `config`.
    pub fn fixed(config: BenchmarkConfig) -> Self {
        let (_, rx) = watch::channel(Arc::new(config));
        Self { rx }
    }

    /// Returns the most recently published configuration.
    pub fn snapshot(&self) -> Arc<BenchmarkConfig> {
        Arc::clone(&self.rx.borrow())
    }

    /// Waits until a new configuration is published.
    ///
    /// Returns `false` if the publisher is gone and no further updates will arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Periodically applies the remote document on top of a local base configuration and publishes
/// the result.
#[derive(Debug)]
pub struct ConfigRefresher {
    fetcher: RemoteConfigFetcher,
    base: BenchmarkConfig,
    tx: watch::Sender<Arc<BenchmarkConfig>>,
}

impl ConfigRefresher {
    /// Creates a refresher publishing `base` until the first successful refresh.
    pub fn new(fetcher: RemoteConfigFetcher, base: BenchmarkConfig) -> (Self, ConfigHandle) {
        let (tx, rx) = watch::channel(Arc::new(base.clone()));
        (Self { fetcher, base, tx }, ConfigHandle { rx })
    }

    /// Loads the remote document and publishes the resulting configuration.
    ///
    /// On error the currently published configuration stays in place, and so does the cached
    /// document.
    pub async fn refresh(&self) -> Result<Arc<BenchmarkConfig>, RemoteError> {
        let document = self.fetcher.load().await?;
        let config = Arc::new(document.apply(&self.base)?);

        if let Err(error) = self.fetcher.store(&document).await {
            warn!(target: LOG_TARGET, %error, "Failed to cache remote config.");
        }

        self.tx.send_if_modified(|current| {
            if **current == *config {
                false
            } else {
                *current = Arc::clone(&config);
                true
            }
        });

        Ok(config)
    }

    /// Refreshes the configuration every refresh interval until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        let interval = self.fetcher.settings().refresh_interval;
        info!(target: LOG_TARGET, interval = ?interval, "Remote config refresher started.");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match self.refresh().await {
                Ok(config) => debug!(target: LOG_TARGET, ?config, "Remote config refreshed."),
                Err(error) => {
                    error!(target: LOG_TARGET, %error, "Failed to refresh remote config.")
                }
            }
        }

        info!(target: LOG_TARGET, "Remote config refresher stopped.");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use url::Url;

    use super::*;
    use crate::remote::{RemoteDocument, RemoteSettings};
    use crate::test_utils::OneShotServer;
    use crate::ConfigError;

    fn cached_settings(dir: &tempfile::TempDir, body: &str) -> RemoteSettings {
        let cache_path = dir.path().join("validator.json");
        std::fs::write(&cache_path, body).unwrap();

        let url = Url::parse("http://127.0.0.1:9/validator.json").unwrap();
        let mut settings = RemoteSettings::new(url);
        settings.cache_path = Some(cache_path);
        settings.max_retries = 1;
        settings.retry_interval = Duration::ZERO;
        settings
    }

    #[test]
    fn fixed_handle_keeps_value() {
        let config = BenchmarkConfig { chunk_size: 3, ..Default::default() };
        let handle = ConfigHandle::fixed(config.clone());
        assert_eq!(*handle.snapshot(), config);
        assert_eq!(*handle.clone().snapshot(), config);
    }

    #[tokio::test]
    async fn refresh_publishes_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let settings = cached_settings(&dir, r#"{ "benchmark_query_chunk_size": 8 }"#);

        let (refresher, mut handle) =
            ConfigRefresher::new(RemoteConfigFetcher::new(settings), BenchmarkConfig::default());

        let before = handle.snapshot();
        assert_eq!(before.chunk_size, crate::DEFAULT_CHUNK_SIZE);

        refresher.refresh().await.unwrap();
        assert!(handle.changed().await);

        // snapshots taken earlier are not affected
        assert_eq!(before.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(handle.snapshot().chunk_size, 8);
    }

    #[tokio::test]
    async fn invalid_refresh_keeps_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let settings = cached_settings(&dir, r#"{ "benchmark_consensus": 2.0 }"#);

        let (refresher, handle) =
            ConfigRefresher::new(RemoteConfigFetcher::new(settings), BenchmarkConfig::default());

        assert!(refresher.refresh().await.is_err());
        assert_eq!(*handle.snapshot(), BenchmarkConfig::default());
    }

    #[tokio::test]
    async fn accepted_document_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache").join("validator.json");
        let reply = (200, r#"{ "benchmark_query_chunk_size": 8 }"#);
        let server = OneShotServer::start(vec![reply]).await;

        let mut settings = RemoteSettings::new(server.url.clone());
        settings.cache_path = Some(cache_path.clone());

        let (refresher, handle) =
            ConfigRefresher::new(RemoteConfigFetcher::new(settings), BenchmarkConfig::default());
        refresher.refresh().await.unwrap();

        assert_eq!(handle.snapshot().chunk_size, 8);
        let cached: RemoteDocument =
            serde_json::from_slice(&std::fs::read(&cache_path).unwrap()).unwrap();
        assert_eq!(cached.benchmark_query_chunk_size, Some(8));
    }

    #[tokio::test]
    async fn rejected_document_keeps_the_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let reply = (200, r#"{ "benchmark_query_chunk_size": 0 }"#);
        let server = OneShotServer::start(vec![reply]).await;

        let mut settings = cached_settings(&dir, r#"{ "benchmark_query_chunk_size": 8 }"#);
        settings.url = server.url.clone();
        settings.request_timeout = Duration::from_secs(2);
        let cache_path = settings.cache_path.clone().unwrap();

        let (refresher, handle) =
            ConfigRefresher::new(RemoteConfigFetcher::new(settings), BenchmarkConfig::default());

        assert_matches!(
            refresher.refresh().await,
            Err(RemoteError::Invalid(ConfigError::ZeroChunkSize))
        );
        assert_eq!(server.requests(), 1);
        assert_eq!(*handle.snapshot(), BenchmarkConfig::default());

        let cached: RemoteDocument =
            serde_json::from_slice(&std::fs::read(&cache_path).unwrap()).unwrap();
        assert_eq!(cached.benchmark_query_chunk_size, Some(8));

        // the server is gone, the cached copy takes over
        refresher.refresh().await.unwrap();
        assert_eq!(handle.snapshot().chunk_size, 8);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let settings = cached_settings(&dir, "{}");

        let (refresher, _handle) =
            ConfigRefresher::new(RemoteConfigFetcher::new(settings), BenchmarkConfig::default());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresher.run(cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
