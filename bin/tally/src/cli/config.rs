use anyhow::Result;
use clap::Args;
use tally_config::remote::RemoteConfigFetcher;
use tally_config::BenchmarkConfig;

use super::options::ConfigSources;

#[derive(Debug, Args)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ConfigArgs {
    #[command(flatten)]
    pub sources: ConfigSources,
}

impl ConfigArgs {
    pub async fn execute(self) -> Result<()> {
        let config = self.effective_config().await?;
        print!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }

    /// The configuration a pass started now would use.
    async fn effective_config(&self) -> Result<BenchmarkConfig> {
        let (config, remote) = self.sources.resolve()?;

        let Some(settings) = remote else { return Ok(config) };

        let document = RemoteConfigFetcher::new(settings).load().await?;
        Ok(document.apply(&config)?)
    }
}
