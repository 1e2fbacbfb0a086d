use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BlockRange, Network};

/// Numeric identifier of a responder in the network registry.
pub type Uid = u64;

/// A responder's answer to the discovery probe: who it is, where to reach it, and the range of
/// blocks it claims to index for a network.
///
/// Claims are immutable once received and are never trusted on their own. The coverage is only
/// used to decide which responders are compared against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderClaim {
    pub uid: Uid,
    /// Opaque identity handle (e.g. the responder's public key).
    pub hotkey: String,
    /// Base URL the responder serves benchmark queries on.
    pub endpoint: Url,
    pub network: Network,
    pub coverage: BlockRange,
    /// Raw discovery payload, kept for diagnostics only.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidClaim {
    #[error("declared coverage {coverage} starts after it ends")]
    InvertedCoverage { coverage: BlockRange },

    #[error("network name is empty")]
    EmptyNetwork,
}

impl ResponderClaim {
    pub fn new(
        uid: Uid,
        hotkey: impl Into<String>,
        endpoint: Url,
        network: Network,
        coverage: BlockRange,
    ) -> Self {
        Self {
            uid,
            hotkey: hotkey.into(),
            endpoint,
            network,
            coverage,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Checks that the claim can take part in a benchmarking pass.
    pub fn validate(&self) -> Result<(), InvalidClaim> {
        if self.network.as_str().is_empty() {
            return Err(InvalidClaim::EmptyNetwork);
        }

        if !self.coverage.is_well_formed() {
            return Err(InvalidClaim::InvertedCoverage { coverage: self.coverage });
        }

        Ok(())
    }
}
