use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter, EnvFilter, Layer};

mod fmt;

pub use fmt::{LocalTime, LogFormat};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str =
    "benchmark=info,cohort=info,probe=info,config=info,client=info,hyper=off,\
     reqwest=off,info";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse environment filter: {0}")]
    EnvFilterParse(#[from] filter::ParseError),

    #[error("failed to initialize tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `filter`, which in turn defaults to [`DEFAULT_LOG_FILTER`].
pub fn init(format: LogFormat, filter: Option<&str>) -> Result<(), Error> {
    let default_filter = EnvFilter::try_new(filter.unwrap_or(DEFAULT_LOG_FILTER));
    let filter = EnvFilter::try_from_default_env().or(default_filter)?;

    let fmt = match format {
        LogFormat::Full => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(LocalTime)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_timer(LocalTime)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt).try_init()?;

    Ok(())
}
