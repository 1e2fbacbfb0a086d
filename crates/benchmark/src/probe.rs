//! Sending a benchmark query to every member of a chunk.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tally_primitives::{ResponderClaim, Uid};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::query::BenchmarkQuery;

const LOG_TARGET: &str = "probe";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("responder rejected the query: {0}")]
    Rejected(String),

    #[error("responder is rate limiting requests")]
    RateLimited,

    /// The transport gave up waiting before the executor did.
    #[error("request timed out")]
    TimedOut,
}

/// Delivers benchmark queries to responders.
pub trait ProbeTransport: Send + Sync {
    /// Sends `query` to `responder` and returns the value it answered with, or `None` if the
    /// answer carried no value.
    ///
    /// `timeout` is the time the caller is willing to wait. The executor enforces it regardless
    /// of whether the transport honors it.
    fn send(
        &self,
        responder: &ResponderClaim,
        query: &BenchmarkQuery,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Value>, TransportError>> + Send;
}

impl<T: ProbeTransport> ProbeTransport for Arc<T> {
    fn send(
        &self,
        responder: &ResponderClaim,
        query: &BenchmarkQuery,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Value>, TransportError>> + Send {
        T::send(self, responder, query, timeout)
    }
}

/// Why a responder has no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("answer carried no value")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success { uid: Uid, latency: Duration, value: Value },
    Failure { uid: Uid, reason: ProbeFailure },
}

impl ProbeOutcome {
    pub fn uid(&self) -> Uid {
        match self {
            Self::Success { uid, .. } | Self::Failure { uid, .. } => *uid,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Probes responders through a [`ProbeTransport`], bounding every probe by a timeout.
#[derive(Debug)]
pub struct ProbeExecutor<'a, T> {
    transport: &'a T,
    timeout: Duration,
}

impl<'a, T: ProbeTransport> ProbeExecutor<'a, T> {
    pub fn new(transport: &'a T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Probes all `members` concurrently.
    ///
    /// Returns exactly one outcome per member, in member order.
    pub async fn execute(
        &self,
        query: &BenchmarkQuery,
        members: &[ResponderClaim],
    ) -> Vec<ProbeOutcome> {
        join_all(members.iter().map(|member| self.probe(query, member))).await
    }

    pub async fn probe(&self, query: &BenchmarkQuery, responder: &ResponderClaim) -> ProbeOutcome {
        let uid = responder.uid;
        trace!(target: LOG_TARGET, uid, range = %query.range, "Sending query.");

        let started = Instant::now();
        let result =
            tokio::time::timeout(self.timeout, self.transport.send(responder, query, self.timeout))
                .await;
        let latency = started.elapsed();

        let reason = match result {
            Ok(Ok(Some(value))) if !value.is_null() => {
                debug!(target: LOG_TARGET, uid, ?latency, "Responder answered.");
                return ProbeOutcome::Success { uid, latency, value };
            }
            Ok(Ok(_)) => ProbeFailure::EmptyResponse,
            Ok(Err(TransportError::TimedOut)) | Err(_) => ProbeFailure::Timeout(self.timeout),
            Ok(Err(error)) => ProbeFailure::Transport(error.to_string()),
        };

        debug!(target: LOG_TARGET, uid, %reason, "Probe failed.");
        ProbeOutcome::Failure { uid, reason }
    }
}
