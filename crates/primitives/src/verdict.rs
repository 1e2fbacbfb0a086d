use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The outcome of benchmarking a single responder: how long it took to answer and whether its
/// answer matched the majority of its peers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(rename = "latency_ms", with = "crate::duration::millis")]
    pub latency: Duration,
    pub agreement: bool,
}

impl Verdict {
    pub const fn new(latency: Duration, agreement: bool) -> Self {
        Self { latency, agreement }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_latency_is_in_milliseconds() {
        let verdict = Verdict::new(Duration::from_millis(1500), true);
        let json = serde_json::to_value(verdict).unwrap();
        assert_eq!(json, serde_json::json!({ "latency_ms": 1500.0, "agreement": true }));

        let back: Verdict = serde_json::from_value(json).unwrap();
        assert_eq!(back, verdict);
    }
}
