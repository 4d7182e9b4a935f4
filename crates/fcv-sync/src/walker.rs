use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fcv_adapters::{AdapterError, PlayHqApi};
use fcv_core::{CheckpointNamespace, Grade, GradeLeaves, Season};
use fcv_storage::{CheckpointStore, Database, StoreError, UpsertWriter};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::throttle::{RateLimiter, ThrottleSite};
use crate::RunSummary;

/// Which part of the hierarchy a walk covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalScope {
    /// Every organisation in the local table, ordered by name.
    AllOrganisations,
    Organisation(String),
    /// One competition's seasons; `seasons` keeps only those whose id or name is listed.
    Competition {
        organisation_id: String,
        competition_id: String,
        seasons: Option<Vec<String>>,
    },
    /// Grades named up front; each one is looked up upstream with its season.
    KnownGrades {
        organisation_id: String,
        competition_id: String,
        grade_ids: Vec<String>,
    },
    /// Grades already stored locally for a competition.
    LocalGrades { competition_id: String },
}

impl fmt::Display for TraversalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllOrganisations => f.write_str("all-organisations"),
            Self::Organisation(id) => write!(f, "organisation:{id}"),
            Self::Competition {
                organisation_id,
                competition_id,
                seasons: None,
            } => write!(f, "competition:{organisation_id}/{competition_id}"),
            Self::Competition {
                organisation_id,
                competition_id,
                seasons: Some(seasons),
            } => write!(
                f,
                "competition:{organisation_id}/{competition_id}[{}]",
                seasons.join(",")
            ),
            Self::KnownGrades {
                competition_id,
                grade_ids,
                ..
            } => write!(f, "grades:{competition_id}[{}]", grade_ids.len()),
            Self::LocalGrades { competition_id } => write!(f, "local-grades:{competition_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub include_stats: bool,
    pub include_fixtures: bool,
    pub include_teams: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_stats: true,
            include_fixtures: true,
            include_teams: false,
        }
    }
}

impl WalkOptions {
    pub fn leaves(&self) -> GradeLeaves {
        GradeLeaves {
            stats: self.include_stats,
            fixtures: self.include_fixtures,
        }
    }

    /// `org_wide` checkpoints only describe walks that ran every leaf.
    fn tracks_organisations(&self) -> bool {
        self.include_stats && self.include_fixtures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrganisationDiscovery {
    pub pages: i64,
    pub organisations: usize,
    pub complete: bool,
}

/// Failure of one unit of work. Upstream failures are recorded and the walk
/// moves on; store failures end the run.
#[derive(Debug, Error)]
enum UnitError {
    #[error(transparent)]
    Upstream(#[from] AdapterError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GradeStatus {
    Scraped,
    Skipped,
    Failed,
}

#[derive(Debug, Default, Clone, Copy)]
struct GradeCounts {
    players: usize,
    games: usize,
}

/// Depth-first crawler over Organisation → Season → Grade → {statistics, fixtures}.
pub struct HierarchyWalker {
    api: PlayHqApi,
    db: Database,
    writer: UpsertWriter,
    checkpoints: CheckpointStore,
    limiter: Box<dyn RateLimiter>,
    options: WalkOptions,
}

impl HierarchyWalker {
    pub fn new(
        api: PlayHqApi,
        db: Database,
        limiter: Box<dyn RateLimiter>,
        options: WalkOptions,
    ) -> Self {
        Self {
            api,
            writer: db.writer(),
            checkpoints: db.checkpoints(),
            db,
            limiter,
            options,
        }
    }

    /// Page through every upstream organisation and upsert each one.
    ///
    /// Stops on an empty page, on a page that still fails after retries, or
    /// once the current page reaches the reported page count.
    pub async fn discover_organisations(&self) -> Result<OrganisationDiscovery> {
        let seen_at = Utc::now();
        let mut discovery = OrganisationDiscovery {
            pages: 0,
            organisations: 0,
            complete: true,
        };
        let mut page = 1i64;

        loop {
            let listing = match self.api.organisations_page(page, seen_at).await {
                Ok(listing) => listing,
                Err(err) => {
                    warn!(page, error = %err, "organisation discovery stopped");
                    discovery.complete = false;
                    break;
                }
            };
            if listing.organisations.is_empty() {
                break;
            }
            if page == 1 {
                info!(
                    total_records = listing.total_records,
                    total_pages = listing.total_pages,
                    "discovering organisations"
                );
            }

            for org in &listing.organisations {
                self.writer
                    .organisation(org)
                    .await
                    .context("storing discovered organisation")?;
            }
            discovery.pages = page;
            discovery.organisations += listing.organisations.len();

            if page >= listing.total_pages {
                break;
            }
            page += 1;
            self.limiter.pause(ThrottleSite::OrganisationPage).await;
        }

        info!(
            organisations = discovery.organisations,
            pages = discovery.pages,
            complete = discovery.complete,
            "organisation discovery finished"
        );
        Ok(discovery)
    }

    /// Walk `scope`, consulting and recording checkpoints per unit.
    ///
    /// Upstream failures never escape: they become failed checkpoints and
    /// counters on the returned summary. A local write failure aborts the walk.
    pub async fn walk(&self, scope: &TraversalScope) -> Result<RunSummary> {
        let mut summary = RunSummary::start(Uuid::new_v4(), Utc::now());
        let span = info_span!("walk", run_id = %summary.run_id, scope = %scope);

        async {
            info!(options = ?self.options, "walk started");
            self.walk_scope(scope, &mut summary).await?;
            summary.finish(Utc::now());
            info!(
                organisations_scraped = summary.organisations_scraped,
                organisations_skipped = summary.organisations_skipped,
                grades_scraped = summary.grades_scraped,
                grades_skipped = summary.grades_skipped,
                grades_failed = summary.grades_failed,
                players = summary.players,
                games = summary.games,
                "walk finished"
            );
            Ok::<(), anyhow::Error>(())
        }
        .instrument(span)
        .await?;

        Ok(summary)
    }

    async fn walk_scope(&self, scope: &TraversalScope, summary: &mut RunSummary) -> Result<()> {
        let seen_at = summary.started_at;
        match scope {
            TraversalScope::AllOrganisations => {
                let organisations = self
                    .db
                    .organisations()
                    .await
                    .context("listing local organisations")?;
                let total = organisations.len();
                info!(total, "organisations to process");
                for (index, org) in organisations.iter().enumerate() {
                    self.process_organisation(&org.id, &org.name, summary).await?;
                    let processed = index + 1;
                    if processed % 10 == 0 {
                        info!(
                            processed,
                            total,
                            skipped = summary.organisations_skipped,
                            players = summary.players,
                            games = summary.games,
                            "progress"
                        );
                    }
                }
            }
            TraversalScope::Organisation(id) => {
                self.writer
                    .ensure_organisation(id, seen_at)
                    .await
                    .context("ensuring organisation row")?;
                let name = self
                    .db
                    .organisation(id)
                    .await
                    .context("reading organisation")?
                    .map(|o| o.name)
                    .unwrap_or_else(|| id.clone());
                self.process_organisation(id, &name, summary).await?;
            }
            TraversalScope::Competition {
                organisation_id,
                competition_id,
                seasons,
            } => {
                self.writer
                    .ensure_organisation(organisation_id, seen_at)
                    .await
                    .context("ensuring organisation row")?;
                self.process_competition(organisation_id, competition_id, seasons.as_deref(), summary)
                    .await?;
            }
            TraversalScope::KnownGrades {
                organisation_id,
                competition_id,
                grade_ids,
            } => {
                self.writer
                    .ensure_organisation(organisation_id, seen_at)
                    .await
                    .context("ensuring organisation row")?;
                self.writer
                    .ensure_competition(competition_id, organisation_id)
                    .await
                    .context("ensuring competition row")?;
                for grade_id in grade_ids {
                    self.process_known_grade(competition_id, grade_id, summary)
                        .await?;
                }
            }
            TraversalScope::LocalGrades { competition_id } => {
                let grades = self
                    .db
                    .grades_for_competition(competition_id)
                    .await
                    .context("listing local grades")?;
                info!(competition_id = %competition_id, grades = grades.len(), "local grades to process");
                for grade in &grades {
                    self.process_grade(grade, summary).await?;
                }
            }
        }
        Ok(())
    }

    async fn process_organisation(
        &self,
        org_id: &str,
        org_name: &str,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let tracked = self.options.tracks_organisations();
        if tracked
            && self
                .checkpoints
                .has_succeeded(CheckpointNamespace::Organisation, org_id)
                .await
                .context("reading organisation checkpoint")?
        {
            summary.organisations_skipped += 1;
            return Ok(());
        }

        info!(org_id, org_name, "processing organisation");
        let outcome = self.scrape_organisation(org_id, summary).await;
        let failure = match outcome {
            Ok(0) => None,
            Ok(failures) => Some(format!("{failures} units failed")),
            Err(UnitError::Upstream(err)) => {
                summary.discovery_failures += 1;
                Some(err.to_string())
            }
            Err(UnitError::Store(err)) => {
                return Err(err).context("storing organisation hierarchy");
            }
        };

        match &failure {
            None => {
                summary.organisations_scraped += 1;
                info!(org_id, "organisation complete");
            }
            Some(error) => {
                summary.organisations_failed += 1;
                warn!(org_id, error = %error, "organisation incomplete");
            }
        }
        if tracked {
            self.checkpoints
                .record(
                    CheckpointNamespace::Organisation,
                    org_id,
                    failure.is_none(),
                    failure.as_deref(),
                )
                .await
                .context("recording organisation checkpoint")?;
        }

        self.limiter.pause(ThrottleSite::Organisation).await;
        Ok(())
    }

    /// Returns the number of failed units below the organisation.
    async fn scrape_organisation(
        &self,
        org_id: &str,
        summary: &mut RunSummary,
    ) -> Result<usize, UnitError> {
        let listings = self.api.competitions(org_id).await?;
        let mut seasons = Vec::new();
        for listing in listings {
            self.writer.competition(&listing.competition).await?;
            for season in listing.seasons {
                self.writer.season(&season).await?;
                seasons.push(season);
            }
        }
        if seasons.is_empty() {
            info!(org_id, "no competitions or seasons found");
            return Ok(0);
        }

        info!(org_id, seasons = seasons.len(), "competition seasons discovered");
        let mut failures = 0;
        for season in &seasons {
            failures += self.process_season(season, summary).await?;
        }
        Ok(failures)
    }

    async fn process_competition(
        &self,
        org_id: &str,
        competition_id: &str,
        season_filter: Option<&[String]>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let listings = match self.api.competitions(org_id).await {
            Ok(listings) => listings,
            Err(err) => {
                summary.discovery_failures += 1;
                warn!(org_id, competition_id, error = %err, "competition discovery failed");
                return Ok(());
            }
        };

        let Some(listing) = listings
            .into_iter()
            .find(|l| l.competition.id == competition_id)
        else {
            warn!(org_id, competition_id, "competition not offered by organisation");
            return Ok(());
        };

        self.writer
            .competition(&listing.competition)
            .await
            .context("storing competition")?;
        for season in &listing.seasons {
            self.writer.season(season).await.context("storing season")?;
        }
        let selected = listing.seasons.iter().filter(|season| {
            season_filter.map_or(true, |wanted| {
                wanted.iter().any(|w| *w == season.id || *w == season.name)
            })
        });
        for season in selected {
            self.process_season(season, summary)
                .await
                .context("walking season")?;
        }
        Ok(())
    }

    /// Discover a season's teams and grades, then process each grade.
    /// Returns the number of failed units; only store errors propagate.
    async fn process_season(
        &self,
        season: &Season,
        summary: &mut RunSummary,
    ) -> Result<usize, StoreError> {
        let mut failures = 0;

        if self.options.include_teams {
            match self.api.season_teams(&season.id).await {
                Ok(teams) => {
                    for team in &teams {
                        self.writer.team(team).await?;
                    }
                    summary.teams += teams.len();
                }
                Err(err) => {
                    failures += 1;
                    summary.discovery_failures += 1;
                    warn!(season_id = %season.id, error = %err, "team discovery failed");
                }
            }
        }

        let grades = match self.api.season_grades(&season.id).await {
            Ok(grades) => grades,
            Err(err) => {
                summary.discovery_failures += 1;
                warn!(season_id = %season.id, error = %err, "grade discovery failed");
                return Ok(failures + 1);
            }
        };
        if grades.is_empty() {
            return Ok(failures);
        }
        for grade in &grades {
            self.writer.grade(grade).await?;
        }
        info!(season_id = %season.id, season = %season.name, grades = grades.len(), "grades discovered");
        self.limiter.pause(ThrottleSite::Season).await;

        for grade in &grades {
            if self.process_grade(grade, summary).await? == GradeStatus::Failed {
                failures += 1;
            }
        }
        Ok(failures)
    }

    async fn grade_already_done(&self, grade_id: &str) -> Result<bool, StoreError> {
        self.checkpoints
            .has_succeeded_any(&self.options.leaves().satisfied_by(), grade_id)
            .await
    }

    async fn process_grade(
        &self,
        grade: &Grade,
        summary: &mut RunSummary,
    ) -> Result<GradeStatus, StoreError> {
        if self.options.leaves().is_empty() {
            return Ok(GradeStatus::Skipped);
        }
        if self.grade_already_done(&grade.id).await? {
            summary.grades_skipped += 1;
            return Ok(GradeStatus::Skipped);
        }
        self.run_grade(grade, summary).await
    }

    async fn process_known_grade(
        &self,
        competition_id: &str,
        grade_id: &str,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let leaves = self.options.leaves();
        let Some(namespace) = leaves.namespace() else {
            return Ok(());
        };
        if self.grade_already_done(grade_id).await? {
            summary.grades_skipped += 1;
            return Ok(());
        }

        let failure = match self.api.grade(grade_id).await {
            Ok(Some(lookup)) => {
                self.writer
                    .ensure_season(&lookup.grade.season_id, competition_id, &lookup.season_name)
                    .await
                    .context("ensuring season row")?;
                self.writer
                    .grade(&lookup.grade)
                    .await
                    .context("storing grade")?;
                self.run_grade(&lookup.grade, summary).await?;
                return Ok(());
            }
            Ok(None) => "grade not found upstream".to_string(),
            Err(err) => err.to_string(),
        };

        summary.grades_failed += 1;
        warn!(grade_id, error = %failure, "grade lookup failed");
        self.checkpoints
            .record(namespace, grade_id, false, Some(&failure))
            .await
            .context("recording grade checkpoint")?;
        Ok(())
    }

    async fn run_grade(
        &self,
        grade: &Grade,
        summary: &mut RunSummary,
    ) -> Result<GradeStatus, StoreError> {
        let leaves = self.options.leaves();
        let Some(namespace) = leaves.namespace() else {
            return Ok(GradeStatus::Skipped);
        };

        let status = match self.scrape_grade(grade, leaves, summary.started_at).await {
            Ok(counts) => {
                self.checkpoints.record(namespace, &grade.id, true, None).await?;
                summary.grades_scraped += 1;
                summary.players += counts.players;
                summary.games += counts.games;
                info!(
                    grade_id = %grade.id,
                    grade = %grade.name,
                    players = counts.players,
                    games = counts.games,
                    "grade scraped"
                );
                GradeStatus::Scraped
            }
            Err(UnitError::Upstream(err)) => {
                let message = err.to_string();
                self.checkpoints
                    .record(namespace, &grade.id, false, Some(&message))
                    .await?;
                summary.grades_failed += 1;
                warn!(grade_id = %grade.id, grade = %grade.name, error = %message, "grade failed");
                GradeStatus::Failed
            }
            Err(UnitError::Store(err)) => return Err(err),
        };

        self.limiter.pause(ThrottleSite::Grade).await;
        Ok(status)
    }

    async fn scrape_grade(
        &self,
        grade: &Grade,
        leaves: GradeLeaves,
        seen_at: DateTime<Utc>,
    ) -> Result<GradeCounts, UnitError> {
        let mut counts = GradeCounts::default();
        if leaves.stats {
            counts.players = self.scrape_statistics(&grade.id, seen_at).await?;
        }
        if leaves.stats && leaves.fixtures {
            self.limiter.pause(ThrottleSite::BetweenLeaves).await;
        }
        if leaves.fixtures {
            counts.games = self.scrape_fixtures(grade).await?;
        }
        Ok(counts)
    }

    /// Page through a grade's statistics. The page bound is re-read from every
    /// response, so a shrinking `totalPages` ends the loop early.
    async fn scrape_statistics(&self, grade_id: &str, seen_at: DateTime<Utc>) -> Result<usize, UnitError> {
        let mut players = HashSet::new();
        let mut page = 1i64;
        let mut total_pages = 1i64;

        while page <= total_pages {
            if page > 1 {
                self.limiter.pause(ThrottleSite::StatsPage).await;
            }
            let Some(stats) = self
                .api
                .player_statistics_page(grade_id, page, seen_at)
                .await?
            else {
                break;
            };
            total_pages = stats.total_pages;

            for line in &stats.lines {
                self.writer.player(&line.player).await?;
                self.writer.player_stat(&line.stat).await?;
                players.insert(line.player.id.clone());
            }
            page += 1;
        }
        Ok(players.len())
    }

    /// Store every round of a grade and the games of each round. Any failed
    /// round call fails the whole grade.
    async fn scrape_fixtures(&self, grade: &Grade) -> Result<usize, UnitError> {
        let rounds = self.api.grade_rounds(&grade.id).await?;
        let mut games = 0;
        for round in &rounds {
            self.writer.round(round).await?;
            let fixture = self.api.round_fixture(round).await?;
            for game in &fixture {
                self.writer.game(game).await?;
            }
            games += fixture.len();
            self.limiter.pause(ThrottleSite::Round).await;
        }
        Ok(games)
    }
}
