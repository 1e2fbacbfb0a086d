use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_primitives::{BlockNumber, BlockRange, Network, ResponderClaim, Uid};
use url::Url;

/// A responder to run discovery against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Responder {
    pub uid: Uid,
    pub hotkey: String,
    pub endpoint: Url,
}

/// Body of a benchmark request.
#[derive(Debug, Serialize)]
pub struct BenchmarkRequest<'a> {
    pub network: &'a Network,
    pub query: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkResponse {
    #[serde(default)]
    pub output: Value,
}

/// A responder's answer to discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryOutput {
    pub network: Network,
    /// First block the responder claims to have indexed.
    pub start_block_height: BlockNumber,
    /// Last block the responder claims to have indexed.
    pub block_height: BlockNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// Sample of indexed data. Not interpreted.
    #[serde(default)]
    pub data_samples: Value,
}

impl DiscoveryOutput {
    pub fn into_claim(self, responder: &Responder) -> ResponderClaim {
        let coverage = BlockRange::new(self.start_block_height, self.block_height);
        ResponderClaim::new(
            responder.uid,
            responder.hotkey.clone(),
            responder.endpoint.clone(),
            self.network,
            coverage,
        )
        .with_payload(self.data_samples)
    }
}

/// Error returned by a responder in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ResponderError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Response<T> {
    Data(T),
    Error(ResponderError),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn benchmark_response() {
        let response: Response<BenchmarkResponse> =
            serde_json::from_value(json!({ "output": [{ "sum": 1200 }] })).unwrap();
        assert_matches!(response, Response::Data(BenchmarkResponse { output }) => {
            assert_eq!(output, json!([{ "sum": 1200 }]));
        });

        let response: Response<BenchmarkResponse> =
            serde_json::from_value(json!({ "output": null })).unwrap();
        assert_matches!(response, Response::Data(BenchmarkResponse { output: Value::Null }));

        let error = json!({ "code": 400, "message": "write queries are not allowed" });
        let response: Response<BenchmarkResponse> = serde_json::from_value(error).unwrap();
        assert_matches!(response, Response::Error(ResponderError { code: 400, .. }));
    }

    #[test]
    fn discovery_output_into_claim() {
        let output: DiscoveryOutput = serde_json::from_value(json!({
            "network": "bitcoin",
            "start_block_height": 1,
            "block_height": 840_000,
            "data_samples": [{ "block_height": 5, "tx_count": 1 }]
        }))
        .unwrap();

        let responder = Responder {
            uid: 12,
            hotkey: "5FZ1".to_string(),
            endpoint: Url::parse("http://10.0.0.12:8091").unwrap(),
        };

        let claim = output.into_claim(&responder);
        assert_eq!(claim.uid, 12);
        assert_eq!(claim.network, Network::bitcoin());
        assert_eq!(claim.coverage, BlockRange::new(1, 840_000));
        assert_eq!(claim.payload, json!([{ "block_height": 5, "tx_count": 1 }]));
    }
}
