use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::remote::RemoteSettings;
use crate::{BenchmarkConfig, ConfigError};

/// Configuration file for the `tally` binary.
///
/// ```toml
/// [benchmark]
/// cluster_count = 4
/// chunk_size = 5
/// probe_timeout_secs = 120
///
/// [benchmark.templates]
/// doge = "UNWIND range({start_block}, {end_block}) AS h RETURN COUNT(h);"
///
/// [remote]
/// url = "https://config.example.org/validator.json"
/// cache_path = "/var/lib/tally/validator.json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    pub remote: Option<RemoteSettings>,
}

impl ConfigFile {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&file)?)
    }
}
