//! Core domain rows and checkpoint namespaces for the FullCourtVision crawler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "fcv-core";

/// A club or association. Owns competitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: String,
    pub name: String,
    pub kind: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    pub organisation_id: String,
    pub name: String,
    pub kind: Option<String>,
}

/// A time-boxed instance of a competition. Dates are kept exactly as the upstream sends them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub competition_id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
}

/// A division within a season; the deepest unit owning both statistics and fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub id: String,
    pub season_id: String,
    pub name: String,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub organisation_id: Option<String>,
    pub season_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One player's aggregate line in one grade, unique on `(player_id, grade_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStat {
    pub player_id: String,
    pub grade_id: String,
    pub team_name: Option<String>,
    pub games_played: i64,
    pub total_points: i64,
    pub one_point: i64,
    pub two_point: i64,
    pub three_point: i64,
    pub total_fouls: i64,
    pub ranking: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    pub grade_id: String,
    pub name: String,
    pub number: Option<i64>,
    pub provisional_date: Option<String>,
    pub is_finals: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub grade_id: String,
    pub round_id: String,
    pub round_name: Option<String>,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub venue: Option<String>,
    pub court: Option<String>,
    pub status: Option<String>,
}

/// One attempt at a unit of work. Append-only; many rows may exist per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// The `entity_type` values written to the checkpoint log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckpointNamespace {
    Organisation,
    GradeFull,
    GradeStats,
    GradeFixtures,
    /// Older logs record full grade scrapes under `grade_wide`.
    GradeWide,
}

impl CheckpointNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organisation => "org_wide",
            Self::GradeFull => "grade_full",
            Self::GradeStats => "grade_stats",
            Self::GradeFixtures => "grade_fixtures",
            Self::GradeWide => "grade_wide",
        }
    }
}

impl std::fmt::Display for CheckpointNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which leaf fetchers run for each grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeLeaves {
    pub stats: bool,
    pub fixtures: bool,
}

impl Default for GradeLeaves {
    fn default() -> Self {
        Self {
            stats: true,
            fixtures: true,
        }
    }
}

impl GradeLeaves {
    pub fn is_empty(&self) -> bool {
        !self.stats && !self.fixtures
    }

    /// Namespace a grade checkpoint is written under. `None` when no leaf runs.
    pub fn namespace(&self) -> Option<CheckpointNamespace> {
        match (self.stats, self.fixtures) {
            (true, true) => Some(CheckpointNamespace::GradeFull),
            (true, false) => Some(CheckpointNamespace::GradeStats),
            (false, true) => Some(CheckpointNamespace::GradeFixtures),
            (false, false) => None,
        }
    }

    /// Namespaces whose successful checkpoint means this walk can skip the grade.
    pub fn satisfied_by(&self) -> Vec<CheckpointNamespace> {
        let mut out = vec![CheckpointNamespace::GradeFull, CheckpointNamespace::GradeWide];
        match (self.stats, self.fixtures) {
            (true, false) => out.push(CheckpointNamespace::GradeStats),
            (false, true) => out.push(CheckpointNamespace::GradeFixtures),
            _ => {}
        }
        out
    }
}
