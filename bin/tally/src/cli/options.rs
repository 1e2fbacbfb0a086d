//! Options shared by the `tally` subcommands.
//!
//! Every benchmark option is optional on the command line. When a config file is given, options
//! set on the command line take precedence over the file, and the file over the defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tally_config::file::ConfigFile;
use tally_config::remote::RemoteSettings;
use tally_config::BenchmarkConfig;
use tally_tracing::LogFormat;
use url::Url;

pub const DEFAULT_METRICS_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_METRICS_PORT: u16 = 9100;

#[derive(Debug, Args, Clone, Default, PartialEq)]
#[command(next_help_heading = "Benchmark options")]
pub struct BenchmarkOptions {
    /// Number of coverage clusters formed per network.
    #[arg(long = "benchmark.cluster-count", value_name = "COUNT")]
    pub cluster_count: Option<usize>,

    /// Maximum number of responders sharing one query.
    #[arg(long = "benchmark.chunk-size", value_name = "SIZE")]
    pub chunk_size: Option<usize>,

    /// Time a responder is given to answer a query.
    #[arg(long = "benchmark.timeout", value_name = "SECONDS")]
    pub probe_timeout: Option<u64>,

    /// Width, in blocks, of the probed range.
    #[arg(long = "benchmark.query-diff", value_name = "BLOCKS")]
    pub query_diff: Option<u64>,

    /// Upper bound of the random amount subtracted from the query diff.
    #[arg(long = "benchmark.query-jitter", value_name = "BLOCKS")]
    pub query_jitter: Option<u64>,

    /// Share of agreeing responders a chunk needs for its verdicts to be reported.
    #[arg(long = "benchmark.consensus", value_name = "SHARE")]
    pub consensus_threshold: Option<f64>,

    /// Maximum number of chunks probed at the same time.
    #[arg(long = "benchmark.max-concurrent-chunks", value_name = "COUNT")]
    pub max_concurrent_chunks: Option<usize>,

    /// Disable benchmarking. Passes return without probing anyone.
    #[arg(long = "benchmark.disable")]
    pub disable: bool,
}

impl BenchmarkOptions {
    /// Overrides the values of `config` that were set on the command line.
    pub fn apply(&self, config: &mut BenchmarkConfig) {
        if let Some(count) = self.cluster_count {
            config.cluster_count = count;
        }

        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }

        if let Some(secs) = self.probe_timeout {
            config.probe_timeout = Duration::from_secs(secs);
        }

        if let Some(diff) = self.query_diff {
            config.query_diff = diff;
        }

        if let Some(jitter) = self.query_jitter {
            config.query_jitter = jitter;
        }

        if let Some(threshold) = self.consensus_threshold {
            config.consensus_threshold = threshold;
        }

        if let Some(count) = self.max_concurrent_chunks {
            config.max_concurrent_chunks = count;
        }

        if self.disable {
            config.enabled = false;
        }
    }
}

#[derive(Debug, Args, Clone, Default, PartialEq)]
#[command(next_help_heading = "Remote configuration options")]
pub struct RemoteOptions {
    /// URL of a remote configuration document applied on top of the local configuration.
    #[arg(long = "remote-config", value_name = "URL")]
    pub url: Option<Url>,

    /// File the last fetched remote document is cached in.
    #[arg(long = "remote-config.cache", value_name = "PATH")]
    #[arg(requires = "url")]
    pub cache_path: Option<PathBuf>,
}

/// Where the benchmark configuration comes from.
#[derive(Debug, Args, Clone, Default, PartialEq)]
pub struct ConfigSources {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub benchmark: BenchmarkOptions,

    #[command(flatten)]
    pub remote: RemoteOptions,
}

impl ConfigSources {
    /// Merges the config file and the command line into a validated configuration.
    pub fn resolve(&self) -> Result<(BenchmarkConfig, Option<RemoteSettings>)> {
        let file = match &self.config {
            Some(path) => ConfigFile::read(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?,
            None => ConfigFile::default(),
        };

        let mut config = file.benchmark;
        self.benchmark.apply(&mut config);
        config.validate().context("Invalid benchmark configuration")?;

        let mut remote = file.remote;
        if let Some(url) = &self.remote.url {
            let settings = remote.get_or_insert_with(|| RemoteSettings::new(url.clone()));
            settings.url = url.clone();
        }

        if let (Some(settings), Some(path)) = (remote.as_mut(), &self.remote.cache_path) {
            settings.cache_path = Some(path.clone());
        }

        Ok((config, remote))
    }
}

#[derive(Debug, Args, Clone, Default, PartialEq)]
#[command(next_help_heading = "Logging options")]
pub struct LoggingOptions {
    #[arg(long = "log.format", value_name = "FORMAT")]
    #[arg(default_value_t = LogFormat::Full)]
    pub format: LogFormat,

    /// Log filter directives, e.g. `info,probe=debug`. Ignored if `RUST_LOG` is set.
    #[arg(long = "log.filter", value_name = "FILTER")]
    pub filter: Option<String>,
}

#[derive(Debug, Args, Clone, PartialEq)]
#[command(next_help_heading = "Metrics options")]
pub struct MetricsOptions {
    /// Serve Prometheus metrics.
    #[arg(long)]
    pub metrics: bool,

    /// The metrics will be served at the given address.
    #[arg(requires = "metrics")]
    #[arg(long = "metrics.addr", value_name = "ADDRESS")]
    #[arg(default_value_t = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: IpAddr,

    /// The metrics will be served at the given port.
    #[arg(requires = "metrics")]
    #[arg(long = "metrics.port", value_name = "PORT")]
    #[arg(default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            metrics: false,
            metrics_addr: DEFAULT_METRICS_ADDR,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl MetricsOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_addr, self.metrics_port)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use clap::Parser;
    use tally_primitives::Network;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cmd {
        #[command(flatten)]
        sources: ConfigSources,
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let cmd = Cmd::parse_from(["tally"]);
        let (config, remote) = cmd.sources.resolve().unwrap();

        similar_asserts::assert_eq!(config, BenchmarkConfig::default());
        assert_eq!(remote, None);
    }

    #[test]
    fn cli_takes_precedence_over_file() {
        let file = config_file(
            r#"
[benchmark]
cluster_count = 4
chunk_size = 8
probe_timeout_secs = 120

[benchmark.templates]
doge = "RETURN {start_block} + {end_block}"
"#,
        );

        let path = file.path().to_str().unwrap();
        let cmd = Cmd::parse_from([
            "tally",
            "--config",
            path,
            "--benchmark.chunk-size",
            "3",
            "--benchmark.disable",
        ]);

        let (config, _) = cmd.sources.resolve().unwrap();

        assert_eq!(config.cluster_count, 4);
        assert_eq!(config.chunk_size, 3);
        assert_eq!(config.probe_timeout, Duration::from_secs(120));
        assert!(!config.enabled);
        let template = config.template_for(&Network::new("doge"));
        assert_eq!(template.as_str(), "RETURN {start_block} + {end_block}");
    }

    #[test]
    fn invalid_result_is_rejected() {
        let cmd = Cmd::parse_from(["tally", "--benchmark.consensus", "1.5"]);
        assert!(cmd.sources.resolve().is_err());

        let file =
            config_file("[benchmark]\ndefault_template = \"DROP {start_block} {end_block}\"\n");
        let path = file.path().to_str().unwrap();
        let cmd = Cmd::parse_from(["tally", "--config", path]);
        assert!(cmd.sources.resolve().is_err());
    }

    #[test]
    fn remote_url_from_cli_overrides_file() {
        let file = config_file(
            r#"
[remote]
url = "https://config.example.org/a.json"
refresh_interval_secs = 60
"#,
        );

        let path = file.path().to_str().unwrap();
        let cmd = Cmd::parse_from([
            "tally",
            "--config",
            path,
            "--remote-config",
            "https://config.example.org/b.json",
            "--remote-config.cache",
            "/tmp/b.json",
        ]);

        let (_, remote) = cmd.sources.resolve().unwrap();
        assert_matches!(remote, Some(settings) => {
            assert_eq!(settings.url.as_str(), "https://config.example.org/b.json");
            assert_eq!(settings.refresh_interval, Duration::from_secs(60));
            assert_eq!(settings.cache_path, Some(PathBuf::from("/tmp/b.json")));
        });
    }

    #[test]
    fn log_format_is_parsed() {
        #[derive(Debug, Parser)]
        struct LogCmd {
            #[command(flatten)]
            logging: LoggingOptions,
        }

        let cmd = LogCmd::parse_from(["tally"]);
        assert_eq!(cmd.logging.format, LogFormat::Full);

        let args = ["tally", "--log.format", "json", "--log.filter", "probe=debug"];
        let cmd = LogCmd::parse_from(args);
        assert_eq!(cmd.logging.format, LogFormat::Json);
        assert_eq!(cmd.logging.filter.as_deref(), Some("probe=debug"));

        assert!(LogCmd::try_parse_from(["tally", "--log.format", "pretty"]).is_err());
    }

    #[test]
    fn cache_requires_remote_url() {
        assert!(Cmd::try_parse_from(["tally", "--remote-config.cache", "/tmp/x.json"]).is_err());
    }
}
