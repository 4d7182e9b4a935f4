//! Crawl orchestration: configuration, throttling and the hierarchy walker.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fcv_adapters::PlayHqApi;
use fcv_storage::{
    BackoffPolicy, Database, HttpClientConfig, QueryClient, RetryingClient, DEFAULT_ENDPOINT,
    DEFAULT_ORIGIN, DEFAULT_TENANT, DEFAULT_USER_AGENT,
};
use serde::Serialize;
use uuid::Uuid;

mod throttle;
mod walker;

pub use throttle::{FixedDelayLimiter, RateLimiter, ThrottleConfig, ThrottleSite};
pub use walker::{HierarchyWalker, OrganisationDiscovery, TraversalScope, WalkOptions};

pub const CRATE_NAME: &str = "fcv-sync";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/playhq.db";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub http: HttpClientConfig,
    pub backoff: BackoffPolicy,
    pub throttle_file: Option<PathBuf>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let http_defaults = HttpClientConfig::default();
        let backoff_defaults = BackoffPolicy::default();
        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            http: HttpClientConfig {
                endpoint: lookup("PLAYHQ_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                tenant: lookup("PLAYHQ_TENANT").unwrap_or_else(|| DEFAULT_TENANT.to_string()),
                origin: lookup("PLAYHQ_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
                user_agent: lookup("PLAYHQ_USER_AGENT")
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                timeout: lookup("FCV_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(http_defaults.timeout),
            },
            backoff: BackoffPolicy {
                max_attempts: lookup("FCV_MAX_ATTEMPTS")
                    .and_then(|v| v.parse().ok())
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(backoff_defaults.max_attempts),
                base_delay: lookup("FCV_RETRY_BASE_MS")
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(backoff_defaults.base_delay),
            },
            throttle_file: lookup("FCV_THROTTLE_FILE").map(PathBuf::from),
        }
    }

    pub async fn throttle(&self) -> Result<ThrottleConfig> {
        match &self.throttle_file {
            Some(path) => ThrottleConfig::load(path).await,
            None => Ok(ThrottleConfig::default()),
        }
    }

    pub async fn open_database(&self) -> Result<Database> {
        let db = Database::connect(&self.database_url)
            .await
            .with_context(|| format!("opening {}", self.database_url))?;
        db.migrate().await.context("applying migrations")?;
        Ok(db)
    }

    pub fn api(&self) -> Result<PlayHqApi> {
        let client = QueryClient::new(self.http.clone())?;
        Ok(PlayHqApi::new(RetryingClient::new(Box::new(client), self.backoff)))
    }

    /// Open the database and wire a walker with the fixed-delay limiter.
    pub async fn walker(&self, options: WalkOptions) -> Result<HierarchyWalker> {
        let db = self.open_database().await?;
        let limiter = FixedDelayLimiter::new(self.throttle().await?);
        Ok(HierarchyWalker::new(self.api()?, db, Box::new(limiter), options))
    }
}

/// Counters accumulated by one walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub organisations_scraped: usize,
    pub organisations_skipped: usize,
    pub organisations_failed: usize,
    pub grades_scraped: usize,
    pub grades_skipped: usize,
    pub grades_failed: usize,
    /// Upstream discovery calls (competitions, seasons, teams) that failed after retries.
    pub discovery_failures: usize,
    pub players: usize,
    pub games: usize,
    pub teams: usize,
}

impl RunSummary {
    pub fn start(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            organisations_scraped: 0,
            organisations_skipped: 0,
            organisations_failed: 0,
            grades_scraped: 0,
            grades_skipped: 0,
            grades_failed: 0,
            discovery_failures: 0,
            players: 0,
            games: 0,
            teams: 0,
        }
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
