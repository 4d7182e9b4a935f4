use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Call sites in the walk that pause before issuing more upstream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleSite {
    OrganisationPage,
    StatsPage,
    Round,
    BetweenLeaves,
    Season,
    Grade,
    Organisation,
}

impl ThrottleSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrganisationPage => "organisation_page",
            Self::StatsPage => "stats_page",
            Self::Round => "round",
            Self::BetweenLeaves => "between_leaves",
            Self::Season => "season",
            Self::Grade => "grade",
            Self::Organisation => "organisation",
        }
    }
}

impl fmt::Display for ThrottleSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-site delays in milliseconds. Any site missing from a YAML file keeps its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    pub organisation_page: u64,
    pub stats_page: u64,
    pub round: u64,
    pub between_leaves: u64,
    pub season: u64,
    pub grade: u64,
    pub organisation: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            organisation_page: 200,
            stats_page: 100,
            round: 150,
            between_leaves: 1000,
            season: 1000,
            grade: 1500,
            organisation: 1500,
        }
    }
}

impl ThrottleConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("parsing throttle config")
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("loading {}", path.display()))
    }

    pub fn delay(&self, site: ThrottleSite) -> Duration {
        let ms = match site {
            ThrottleSite::OrganisationPage => self.organisation_page,
            ThrottleSite::StatsPage => self.stats_page,
            ThrottleSite::Round => self.round,
            ThrottleSite::BetweenLeaves => self.between_leaves,
            ThrottleSite::Season => self.season,
            ThrottleSite::Grade => self.grade,
            ThrottleSite::Organisation => self.organisation,
        };
        Duration::from_millis(ms)
    }
}

/// Cooperative pause between upstream calls.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn pause(&self, site: ThrottleSite);
}

/// Sleeps for the configured static delay of each site.
#[derive(Debug, Clone, Default)]
pub struct FixedDelayLimiter {
    config: ThrottleConfig,
}

impl FixedDelayLimiter {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RateLimiter for FixedDelayLimiter {
    async fn pause(&self, site: ThrottleSite) {
        let delay = self.config.delay(site);
        trace!(%site, delay_ms = delay.as_millis() as u64, "throttling");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
