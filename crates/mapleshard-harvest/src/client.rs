//! Rate-limited fetch client for the upstream API
//!
//! One lookup is `GET {base}/{region}/{version}/{entity}/{id}`, classified as:
//!
//! - 200 with a JSON body: [`FetchOutcome::Success`]
//! - 404: [`FetchOutcome::Absent`], never retried and never counted as a failure
//! - 408, 429, 5xx, timeouts, connection errors, malformed bodies: retried with
//!   linear capped backoff, then [`FetchOutcome::TransientError`]
//! - any other status: [`FetchOutcome::FatalError`], not retried
//!
//! None of these abort a run; the scheduler only counts them.

use crate::config::ApiConfig;
use crate::enumerator::PageSource;
use async_trait::async_trait;
use mapleshard_common::types::EntityId;
use mapleshard_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

// ============================================================================
// Retry Policy
// ============================================================================

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 2000;

/// Bounded, monotonic non-decreasing retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `min(base * retry, max)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry).min(self.max_delay)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal result of looking up one candidate id
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Value),
    /// Upstream has no entity at this id
    Absent,
    /// Retries exhausted on a retryable failure
    TransientError(String),
    /// Upstream refused the request outright
    FatalError(String),
}

/// Outcome of one fetch plus the number of retries it took
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub id: EntityId,
    pub outcome: FetchOutcome,
    pub retries: u32,
}

/// Anything that can look up a candidate id
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch(&self, id: EntityId) -> Fetched;
}

enum Step<T> {
    Done(T),
    Retry(String),
}

struct Retried<T> {
    result: std::result::Result<T, String>,
    retries: u32,
}

// ============================================================================
// Client
// ============================================================================

/// Build the shared HTTP client; the per-request timeout bounds every fetch.
pub fn http_client(api: &ApiConfig) -> Result<Client> {
    Client::builder()
        .timeout(api.timeout())
        .user_agent(api.user_agent.clone())
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Fetch client bound to one entity endpoint
#[derive(Clone)]
pub struct FetchClient {
    http: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl FetchClient {
    /// `endpoint` is the entity collection URL, e.g. `https://host/api/GMS/83/mob`
    pub fn new(http: Client, endpoint: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            retry,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn entity_url(&self, id: EntityId) -> String {
        format!("{}/{}", self.endpoint, id)
    }

    pub fn listing_url(&self, start: usize, count: usize) -> String {
        format!("{}?startPosition={}&count={}", self.endpoint, start, count)
    }

    async fn retrying<T, F, Fut>(&self, url: &str, mut attempt: F) -> Retried<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Step<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Step::Done(value) => {
                    return Retried {
                        result: Ok(value),
                        retries,
                    }
                },
                Step::Retry(cause) if retries >= self.retry.max_retries => {
                    warn!(
                        url,
                        retries,
                        cause = %cause,
                        "Giving up after exhausting retries"
                    );
                    return Retried {
                        result: Err(cause),
                        retries,
                    };
                },
                Step::Retry(cause) => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        url,
                        retry = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        cause = %cause,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    async fn get_json(&self, url: &str) -> Step<std::result::Result<Option<Value>, String>> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Step::Retry(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Step::Done(Ok(None));
        }
        if is_retryable(status) {
            return Step::Retry(format!("HTTP {}", status));
        }
        if !status.is_success() {
            return Step::Done(Err(format!("HTTP {}", status)));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Step::Retry(format!("failed to read body: {}", e)),
        };

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Step::Done(Ok(Some(value))),
            Err(e) => Step::Retry(format!("malformed body: {}", e)),
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl EntityFetcher for FetchClient {
    async fn fetch(&self, id: EntityId) -> Fetched {
        let url = self.entity_url(id);
        let Retried { result, retries } = self.retrying(&url, || self.get_json(&url)).await;

        let outcome = match result {
            Ok(Ok(Some(payload))) => FetchOutcome::Success(payload),
            Ok(Ok(None)) => {
                trace!(id, "Absent");
                FetchOutcome::Absent
            },
            Ok(Err(cause)) => {
                warn!(id, cause = %cause, "Upstream rejected request");
                FetchOutcome::FatalError(cause)
            },
            Err(cause) => FetchOutcome::TransientError(cause),
        };

        Fetched {
            id,
            outcome,
            retries,
        }
    }
}

#[async_trait]
impl PageSource for FetchClient {
    async fn page(&self, start: usize, count: usize) -> Result<Vec<Value>> {
        let url = self.listing_url(start, count);
        let Retried { result, .. } = self.retrying(&url, || self.get_json(&url)).await;

        match result {
            Ok(Ok(Some(Value::Array(objects)))) => Ok(objects),
            Ok(Ok(Some(_))) => Err(Error::upstream(format!("Listing at {} is not an array", url))),
            Ok(Ok(None)) => {
                debug!(url, "Listing absent, treating as empty");
                Ok(Vec::new())
            },
            Ok(Err(cause)) | Err(cause) => Err(Error::upstream(format!(
                "Listing request {} failed: {}",
                url, cause
            ))),
        }
    }
}
