use std::fmt;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// How log lines are rendered.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Full,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 3339 timestamps in the local timezone, with millisecond precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&chrono::Local::now().to_rfc3339_opts(SecondsFormat::Millis, false))
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[rstest::rstest]
    #[case("json", LogFormat::Json)]
    #[case("full", LogFormat::Full)]
    #[case("JSON", LogFormat::Json)]
    fn parses_ignoring_case(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::from_str(input, true).unwrap(), expected);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(LogFormat::from_str("pretty", true).is_err());
        assert!(LogFormat::from_str("", true).is_err());
    }

    #[test]
    fn cli_and_config_names_match() {
        for format in LogFormat::value_variants() {
            let possible = format.to_possible_value().unwrap();
            assert_eq!(possible.get_name(), format.as_str());

            let json = serde_json::to_value(format).unwrap();
            assert_eq!(json, serde_json::Value::from(format.as_str()));
        }
    }

    #[test]
    fn local_time_has_millisecond_precision() {
        let mut out = String::new();
        LocalTime.format_time(&mut Writer::new(&mut out)).unwrap();
        // e.g. 2024-05-01T12:30:45.123+02:00
        assert_eq!(out.len(), 29, "unexpected timestamp: {out}");
    }
}
