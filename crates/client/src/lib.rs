#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod types;

use std::time::Duration;

use futures::future::join_all;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tally_benchmark::query::BenchmarkQuery;
use tally_benchmark::{ProbeTransport, TransportError};
use tally_primitives::ResponderClaim;
use tracing::{debug, info, warn};
use url::Url;

use crate::types::{
    BenchmarkRequest, BenchmarkResponse, DiscoveryOutput, Responder, ResponderError, Response,
};

const LOG_TARGET: &str = "client";

/// Default time a responder is given to answer discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(6);

const BENCHMARK_PATH: &str = "benchmark";
const DISCOVERY_PATH: &str = "discovery";

/// HTTP client for talking to responders.
#[derive(Debug, Clone)]
pub struct ResponderClient {
    client: Client,
    discovery_timeout: Duration,
}

impl Default for ResponderClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponderClient {
    pub fn new() -> Self {
        Self { client: Client::new(), discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT }
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sends a benchmark query to the responder at `endpoint`.
    ///
    /// Returns `None` if the responder answered without a value.
    pub async fn benchmark(
        &self,
        endpoint: &Url,
        query: &BenchmarkQuery,
        timeout: Duration,
    ) -> Result<Option<Value>, Error> {
        let body = BenchmarkRequest { network: &query.network, query: &query.text };
        let response: BenchmarkResponse = self
            .request(Method::POST, endpoint, BENCHMARK_PATH)?
            .json(&body)?
            .timeout(timeout)
            .send()
            .await?;

        Ok(Some(response.output).filter(|output| !output.is_null()))
    }

    /// Asks a responder which network and blocks it serves.
    pub async fn discover(&self, responder: &Responder) -> Result<ResponderClaim, Error> {
        let output: DiscoveryOutput = self
            .request(Method::GET, &responder.endpoint, DISCOVERY_PATH)?
            .timeout(self.discovery_timeout)
            .send()
            .await?;

        Ok(output.into_claim(responder))
    }

    /// Runs discovery against all `responders` concurrently.
    ///
    /// Responders that fail to answer are left out.
    pub async fn discover_all(&self, responders: &[Responder]) -> Vec<ResponderClaim> {
        let results = join_all(responders.iter().map(|r| self.discover(r))).await;

        let claims = responders
            .iter()
            .zip(results)
            .filter_map(|(responder, result)| match result {
                Ok(claim) => Some(claim),
                Err(error) => {
                    warn!(target: LOG_TARGET, uid = responder.uid, %error, "Discovery failed.");
                    None
                }
            })
            .collect::<Vec<_>>();

        info!(
            target: LOG_TARGET,
            responders = responders.len(),
            claims = claims.len(),
            "Discovery round finished."
        );

        claims
    }

    fn request(
        &self,
        method: Method,
        endpoint: &Url,
        path: &str,
    ) -> Result<RequestBuilder<'_>, Error> {
        let mut url = endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidEndpoint(endpoint.clone()))?
            .pop_if_empty()
            .push(path);

        Ok(RequestBuilder::new(self, method, url))
    }
}

impl ProbeTransport for ResponderClient {
    async fn send(
        &self,
        responder: &ResponderClaim,
        query: &BenchmarkQuery,
        timeout: Duration,
    ) -> Result<Option<Value>, TransportError> {
        Ok(self.benchmark(&responder.endpoint, query, timeout).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Network(reqwest::Error),

    #[error(transparent)]
    Responder(ResponderError),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("endpoint '{0}' cannot be used as a base url")]
    InvalidEndpoint(Url),

    #[error("request rate limited")]
    RateLimited,

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }

        if let Some(status) = err.status() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Self::RateLimited;
            }
        }

        Self::Network(err)
    }
}

impl Error {
    /// Returns `true` if the error is due to rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

impl From<Error> for TransportError {
    fn from(err: Error) -> Self {
        match err {
            Error::RateLimited => TransportError::RateLimited,
            Error::Timeout => TransportError::TimedOut,
            Error::Responder(error) => TransportError::Rejected(error.to_string()),
            other => TransportError::Request(Box::new(other)),
        }
    }
}

#[derive(Debug)]
struct RequestBuilder<'a> {
    client: &'a ResponderClient,
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl<'a> RequestBuilder<'a> {
    fn new(client: &'a ResponderClient, method: Method, url: Url) -> Self {
        Self { client, method, url, body: None, timeout: None }
    }

    fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl RequestBuilder<'_> {
    /// Send the request.
    async fn send<T: DeserializeOwned>(self) -> Result<T, Error> {
        let client = self.client.client.clone();
        let request = self.build();
        debug!(
            target: LOG_TARGET,
            method = %request.method(),
            url = %request.url(),
            "Sending request."
        );

        let response = client.execute(request).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }

        match response.json().await? {
            Response::Data(data) => Ok(data),
            Response::Error(error) => Err(Error::Responder(error)),
        }
    }

    /// Build the request.
    fn build(self) -> Request {
        let mut request = Request::new(self.method, self.url);
        *request.timeout_mut() = self.timeout;

        if let Some(body) = self.body {
            let content_type = HeaderValue::from_static("application/json");
            request.headers_mut().insert(CONTENT_TYPE, content_type);
            *request.body_mut() = Some(body.into());
        }

        request
    }
}
