//! SQLite persistence + GraphQL fetch utilities for FullCourtVision.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ORIGIN};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub mod db;

pub use db::{CheckpointStore, Database, StoreError, TableTotals, UpsertWriter};

pub const CRATE_NAME: &str = "fcv-storage";

pub const DEFAULT_ENDPOINT: &str = "https://api.playhq.com/graphql";
pub const DEFAULT_TENANT: &str = "basketball-victoria";
pub const DEFAULT_ORIGIN: &str = "https://www.playhq.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const PARSE_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {snippet}")]
    Parse { snippet: String },
    #[error("GraphQL errors: {0}")]
    GraphQl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// One network round trip: POST `{query, variables}` and decode the JSON body.
///
/// Implementations must not interpret a top-level `errors` array; that is
/// [`RetryingClient`]'s job.
#[async_trait]
pub trait GraphQlTransport: Send + Sync {
    async fn execute(&self, query: &str, variables: &JsonValue) -> Result<JsonValue, FetchError>;
}

/// Decode a response body, keeping a short snippet of the raw text when it is not JSON.
pub fn decode_body(bytes: &[u8]) -> Result<JsonValue, FetchError> {
    serde_json::from_slice(bytes).map_err(|_| FetchError::Parse {
        snippet: String::from_utf8_lossy(bytes)
            .chars()
            .take(PARSE_SNIPPET_CHARS)
            .collect(),
    })
}

/// Joined messages of a non-empty top-level `errors` array, if any.
pub fn graphql_error_messages(body: &JsonValue) -> Option<String> {
    let errors = body.get("errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    let messages = errors
        .iter()
        .map(|e| match e.get("message").and_then(JsonValue::as_str) {
            Some(message) => message.to_string(),
            None => e.to_string(),
        })
        .collect::<Vec<_>>();
    Some(messages.join("; "))
}

/// Linear backoff: the pause after the n-th failed attempt is `base_delay × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_after_attempt(&self, failed_attempts: usize) -> Duration {
        let factor = u32::try_from(failed_attempts).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub endpoint: String,
    pub tenant: String,
    pub origin: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Single-shot GraphQL client against the fixed upstream endpoint.
#[derive(Debug)]
pub struct QueryClient {
    client: reqwest::Client,
    endpoint: String,
    tenant: String,
    origin: String,
}

impl QueryClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            tenant: config.tenant,
            origin: config.origin,
        })
    }
}

#[async_trait]
impl GraphQlTransport for QueryClient {
    async fn execute(&self, query: &str, variables: &JsonValue) -> Result<JsonValue, FetchError> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        debug!(endpoint = %self.endpoint, "posting GraphQL request");

        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header("tenant", &self.tenant)
            .header(ORIGIN, &self.origin)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(status = status.as_u16(), bytes = bytes.len(), "GraphQL response received");
        decode_body(&bytes)
    }
}

/// Wraps a transport and re-issues failed calls within the attempt budget.
///
/// Transport, parse and GraphQL-level failures are all retryable. Only the
/// last failure is surfaced once the budget is spent.
pub struct RetryingClient {
    transport: Box<dyn GraphQlTransport>,
    backoff: BackoffPolicy,
}

impl RetryingClient {
    pub fn new(transport: Box<dyn GraphQlTransport>, backoff: BackoffPolicy) -> Self {
        Self { transport, backoff }
    }

    pub async fn query(
        &self,
        operation: &str,
        query: &str,
        variables: &JsonValue,
    ) -> Result<JsonValue, FetchError> {
        let max_attempts = self.backoff.max_attempts.max(1);
        let mut attempt = 1usize;

        loop {
            let err = match self.transport.execute(query, variables).await {
                Ok(body) => match graphql_error_messages(&body) {
                    None => return Ok(body),
                    Some(messages) => FetchError::GraphQl(messages),
                },
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.backoff.delay_after_attempt(attempt);
            warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying GraphQL request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
