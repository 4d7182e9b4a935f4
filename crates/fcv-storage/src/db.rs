//! Local SQLite store: idempotent upserts keyed by upstream IDs and the append-only checkpoint log.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use fcv_core::{
    CheckpointNamespace, CheckpointRecord, Competition, Game, Grade, Organisation, Player,
    PlayerStat, Round, Season, Team,
};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening database {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("creating database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("applying migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("writing {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("reading {what}: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

fn write_err(what: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| StoreError::Write { what, source }
}

fn read_err(what: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| StoreError::Read { what, source }
}

/// Handle on the crawler's SQLite file.
///
/// The pool holds a single connection: the crawler is the only writer, and
/// WAL mode lets the web layer and sync script read alongside it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| StoreError::Connect {
                url: url.to_string(),
                source,
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Directory {
                        path: parent.display().to_string(),
                        source,
                    })?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Connect {
                url: url.to_string(),
                source,
            })?;
        Ok(Self { pool })
    }

    /// Private in-memory database; lives as long as the returned handle.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let url = "sqlite::memory:";
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| StoreError::Connect {
                url: url.to_string(),
                source,
            })?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Connect {
                url: url.to_string(),
                source,
            })?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn writer(&self) -> UpsertWriter {
        UpsertWriter {
            pool: self.pool.clone(),
        }
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore {
            pool: self.pool.clone(),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn organisation(&self, id: &str) -> Result<Option<Organisation>, StoreError> {
        let row = sqlx::query("SELECT id, name, type, updated_at FROM organisations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err("organisation"))?;
        row.map(|r| organisation_from_row(&r))
            .transpose()
            .map_err(read_err("organisation"))
    }

    /// All locally known organisations, ordered by name.
    pub async fn organisations(&self) -> Result<Vec<Organisation>, StoreError> {
        let rows = sqlx::query("SELECT id, name, type, updated_at FROM organisations ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(read_err("organisations"))?;
        rows.iter()
            .map(organisation_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err("organisations"))
    }

    /// Grades already stored for a competition, ordered by season then grade name.
    pub async fn grades_for_competition(&self, competition_id: &str) -> Result<Vec<Grade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.season_id, g.name, g.type
            FROM grades g
            JOIN seasons s ON g.season_id = s.id
            WHERE s.competition_id = ?
            ORDER BY s.name, g.name, g.id
            "#,
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err("grades"))?;

        rows.iter()
            .map(|r| {
                Ok(Grade {
                    id: r.try_get("id")?,
                    season_id: r.try_get("season_id")?,
                    name: r.try_get("name")?,
                    kind: r.try_get("type")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(read_err("grades"))
    }

    pub async fn player_stat(
        &self,
        player_id: &str,
        grade_id: &str,
    ) -> Result<Option<PlayerStat>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT player_id, grade_id, team_name, games_played, total_points, one_point,
                   two_point, three_point, total_fouls, ranking
            FROM player_stats WHERE player_id = ? AND grade_id = ?
            "#,
        )
        .bind(player_id)
        .bind(grade_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err("player_stats"))?;

        row.map(|r| {
            Ok(PlayerStat {
                player_id: r.try_get("player_id")?,
                grade_id: r.try_get("grade_id")?,
                team_name: r.try_get("team_name")?,
                games_played: r.try_get("games_played")?,
                total_points: r.try_get("total_points")?,
                one_point: r.try_get("one_point")?,
                two_point: r.try_get("two_point")?,
                three_point: r.try_get("three_point")?,
                total_fouls: r.try_get("total_fouls")?,
                ranking: r.try_get("ranking")?,
            })
        })
        .transpose()
        .map_err(read_err("player_stats"))
    }

    pub async fn round(&self, id: &str) -> Result<Option<Round>, StoreError> {
        let row = sqlx::query(
            "SELECT id, grade_id, name, number, provisional_date, is_finals FROM rounds WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err("rounds"))?;

        row.map(|r| {
            Ok(Round {
                id: r.try_get("id")?,
                grade_id: r.try_get("grade_id")?,
                name: r.try_get("name")?,
                number: r.try_get("number")?,
                provisional_date: r.try_get("provisional_date")?,
                is_finals: r.try_get("is_finals")?,
            })
        })
        .transpose()
        .map_err(read_err("rounds"))
    }

    pub async fn game(&self, id: &str) -> Result<Option<Game>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, grade_id, round_id, round_name, home_team_id, away_team_id, home_score,
                   away_score, date, time, venue, court, status
            FROM games WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err("games"))?;

        row.map(|r| {
            Ok(Game {
                id: r.try_get("id")?,
                grade_id: r.try_get("grade_id")?,
                round_id: r.try_get::<Option<String>, _>("round_id")?.unwrap_or_default(),
                round_name: r.try_get("round_name")?,
                home_team_id: r.try_get("home_team_id")?,
                away_team_id: r.try_get("away_team_id")?,
                home_score: r.try_get("home_score")?,
                away_score: r.try_get("away_score")?,
                date: r.try_get("date")?,
                time: r.try_get("time")?,
                venue: r.try_get("venue")?,
                court: r.try_get("court")?,
                status: r.try_get("status")?,
            })
        })
        .transpose()
        .map_err(read_err("games"))
    }

    pub async fn totals(&self) -> Result<TableTotals, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
              (SELECT COUNT(*) FROM organisations) AS organisations,
              (SELECT COUNT(*) FROM competitions) AS competitions,
              (SELECT COUNT(*) FROM seasons) AS seasons,
              (SELECT COUNT(*) FROM grades) AS grades,
              (SELECT COUNT(*) FROM teams) AS teams,
              (SELECT COUNT(*) FROM players) AS players,
              (SELECT COUNT(*) FROM player_stats) AS player_stats,
              (SELECT COUNT(*) FROM rounds) AS rounds,
              (SELECT COUNT(*) FROM games) AS games,
              (SELECT COUNT(*) FROM scrape_log) AS checkpoints
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(read_err("table totals"))?;

        let get = |name: &str| row.try_get::<i64, _>(name);
        Ok(TableTotals {
            organisations: get("organisations").map_err(read_err("table totals"))?,
            competitions: get("competitions").map_err(read_err("table totals"))?,
            seasons: get("seasons").map_err(read_err("table totals"))?,
            grades: get("grades").map_err(read_err("table totals"))?,
            teams: get("teams").map_err(read_err("table totals"))?,
            players: get("players").map_err(read_err("table totals"))?,
            player_stats: get("player_stats").map_err(read_err("table totals"))?,
            rounds: get("rounds").map_err(read_err("table totals"))?,
            games: get("games").map_err(read_err("table totals"))?,
            checkpoints: get("checkpoints").map_err(read_err("table totals"))?,
        })
    }
}

fn organisation_from_row(r: &SqliteRow) -> Result<Organisation, sqlx::Error> {
    Ok(Organisation {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        kind: r.try_get("type")?,
        updated_at: r
            .try_get::<Option<DateTime<Utc>>, _>("updated_at")?
            .unwrap_or(DateTime::UNIX_EPOCH),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableTotals {
    pub organisations: i64,
    pub competitions: i64,
    pub seasons: i64,
    pub grades: i64,
    pub teams: i64,
    pub players: i64,
    pub player_stats: i64,
    pub rounds: i64,
    pub games: i64,
    pub checkpoints: i64,
}

/// "Insert or fully replace" writes keyed by upstream external IDs. Never deletes.
#[derive(Debug, Clone)]
pub struct UpsertWriter {
    pool: SqlitePool,
}

impl UpsertWriter {
    pub async fn organisation(&self, org: &Organisation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO organisations (id, name, type, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              name = excluded.name, type = excluded.type, updated_at = excluded.updated_at
            "#,
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(&org.kind)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_err("organisation"))?;
        Ok(())
    }

    /// Insert a placeholder organisation named after its ID unless one already exists.
    pub async fn ensure_organisation(&self, id: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO organisations (id, name, updated_at) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(id)
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .map_err(write_err("organisation placeholder"))?;
        Ok(())
    }

    pub async fn competition(&self, comp: &Competition) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO competitions (id, organisation_id, name, type) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              organisation_id = excluded.organisation_id, name = excluded.name, type = excluded.type
            "#,
        )
        .bind(&comp.id)
        .bind(&comp.organisation_id)
        .bind(&comp.name)
        .bind(&comp.kind)
        .execute(&self.pool)
        .await
        .map_err(write_err("competition"))?;
        Ok(())
    }

    pub async fn ensure_competition(&self, id: &str, organisation_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO competitions (id, organisation_id, name) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(organisation_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(write_err("competition placeholder"))?;
        Ok(())
    }

    pub async fn season(&self, season: &Season) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO seasons (id, competition_id, name, start_date, end_date, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              competition_id = excluded.competition_id, name = excluded.name,
              start_date = excluded.start_date, end_date = excluded.end_date,
              status = excluded.status
            "#,
        )
        .bind(&season.id)
        .bind(&season.competition_id)
        .bind(&season.name)
        .bind(&season.start_date)
        .bind(&season.end_date)
        .bind(&season.status)
        .execute(&self.pool)
        .await
        .map_err(write_err("season"))?;
        Ok(())
    }

    /// Insert a season known only by ID and name; an existing row is left untouched.
    pub async fn ensure_season(
        &self,
        id: &str,
        competition_id: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO seasons (id, competition_id, name) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(competition_id)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(write_err("season placeholder"))?;
        Ok(())
    }

    pub async fn grade(&self, grade: &Grade) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO grades (id, season_id, name, type) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              season_id = excluded.season_id, name = excluded.name, type = excluded.type
            "#,
        )
        .bind(&grade.id)
        .bind(&grade.season_id)
        .bind(&grade.name)
        .bind(&grade.kind)
        .execute(&self.pool)
        .await
        .map_err(write_err("grade"))?;
        Ok(())
    }

    pub async fn team(&self, team: &Team) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, organisation_id, season_id) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              name = excluded.name, organisation_id = excluded.organisation_id,
              season_id = excluded.season_id
            "#,
        )
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.organisation_id)
        .bind(&team.season_id)
        .execute(&self.pool)
        .await
        .map_err(write_err("team"))?;
        Ok(())
    }

    pub async fn player(&self, player: &Player) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO players (id, first_name, last_name, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              first_name = excluded.first_name, last_name = excluded.last_name,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(&player.id)
        .bind(&player.first_name)
        .bind(&player.last_name)
        .bind(player.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_err("player"))?;
        Ok(())
    }

    /// Latest write wins for a `(player_id, grade_id)` pair.
    pub async fn player_stat(&self, stat: &PlayerStat) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO player_stats (player_id, grade_id, team_name, games_played, total_points,
                                      one_point, two_point, three_point, total_fouls, ranking)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(player_id, grade_id) DO UPDATE SET
              team_name = excluded.team_name, games_played = excluded.games_played,
              total_points = excluded.total_points, one_point = excluded.one_point,
              two_point = excluded.two_point, three_point = excluded.three_point,
              total_fouls = excluded.total_fouls, ranking = excluded.ranking
            "#,
        )
        .bind(&stat.player_id)
        .bind(&stat.grade_id)
        .bind(&stat.team_name)
        .bind(stat.games_played)
        .bind(stat.total_points)
        .bind(stat.one_point)
        .bind(stat.two_point)
        .bind(stat.three_point)
        .bind(stat.total_fouls)
        .bind(stat.ranking)
        .execute(&self.pool)
        .await
        .map_err(write_err("player stat"))?;
        Ok(())
    }

    pub async fn round(&self, round: &Round) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rounds (id, grade_id, name, number, provisional_date, is_finals)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              grade_id = excluded.grade_id, name = excluded.name, number = excluded.number,
              provisional_date = excluded.provisional_date, is_finals = excluded.is_finals
            "#,
        )
        .bind(&round.id)
        .bind(&round.grade_id)
        .bind(&round.name)
        .bind(round.number)
        .bind(&round.provisional_date)
        .bind(round.is_finals)
        .execute(&self.pool)
        .await
        .map_err(write_err("round"))?;
        Ok(())
    }

    pub async fn game(&self, game: &Game) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO games (id, grade_id, round_id, round_name, home_team_id, away_team_id,
                               home_score, away_score, date, time, venue, court, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
              grade_id = excluded.grade_id, round_id = excluded.round_id,
              round_name = excluded.round_name, home_team_id = excluded.home_team_id,
              away_team_id = excluded.away_team_id, home_score = excluded.home_score,
              away_score = excluded.away_score, date = excluded.date, time = excluded.time,
              venue = excluded.venue, court = excluded.court, status = excluded.status
            "#,
        )
        .bind(&game.id)
        .bind(&game.grade_id)
        .bind(&game.round_id)
        .bind(&game.round_name)
        .bind(&game.home_team_id)
        .bind(&game.away_team_id)
        .bind(game.home_score)
        .bind(game.away_score)
        .bind(&game.date)
        .bind(&game.time)
        .bind(&game.venue)
        .bind(&game.court)
        .bind(&game.status)
        .execute(&self.pool)
        .await
        .map_err(write_err("game"))?;
        Ok(())
    }
}

/// Append-only attempt log backing resumability.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    pub async fn has_succeeded(
        &self,
        namespace: CheckpointNamespace,
        entity_id: &str,
    ) -> Result<bool, StoreError> {
        self.has_succeeded_any(&[namespace], entity_id).await
    }

    /// True when any of `namespaces` has a successful row for `entity_id`.
    pub async fn has_succeeded_any(
        &self,
        namespaces: &[CheckpointNamespace],
        entity_id: &str,
    ) -> Result<bool, StoreError> {
        if namespaces.is_empty() {
            return Ok(false);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT 1 FROM scrape_log WHERE success = 1 AND entity_id = ");
        qb.push_bind(entity_id);
        qb.push(" AND entity_type IN (");
        let mut separated = qb.separated(", ");
        for ns in namespaces {
            separated.push_bind(ns.as_str());
        }
        separated.push_unseparated(") LIMIT 1");

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err("checkpoint"))?;
        Ok(row.is_some())
    }

    /// Append one attempt row. Never updates or deduplicates.
    pub async fn record(
        &self,
        namespace: CheckpointNamespace,
        entity_id: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        debug!(%namespace, entity_id, success, "recording checkpoint");
        sqlx::query(
            "INSERT INTO scrape_log (entity_type, entity_id, scraped_at, success, error) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(namespace.as_str())
        .bind(entity_id)
        .bind(Utc::now())
        .bind(success)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(write_err("checkpoint"))?;
        Ok(())
    }

    /// Every attempt recorded for a key, oldest first.
    pub async fn history(
        &self,
        namespace: CheckpointNamespace,
        entity_id: &str,
    ) -> Result<Vec<CheckpointRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT entity_type, entity_id, scraped_at, success, error
            FROM scrape_log WHERE entity_type = ? AND entity_id = ?
            ORDER BY id
            "#,
        )
        .bind(namespace.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err("checkpoint history"))?;

        rows.iter()
            .map(|r| {
                Ok(CheckpointRecord {
                    entity_type: r.try_get("entity_type")?,
                    entity_id: r.try_get("entity_id")?,
                    success: r.try_get("success")?,
                    error: r.try_get("error")?,
                    scraped_at: r.try_get("scraped_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(read_err("checkpoint history"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap()
    }

    async fn seeded() -> Database {
        let db = Database::in_memory().await.expect("db");
        db.migrate().await.expect("migrate");
        let writer = db.writer();
        writer
            .organisation(&Organisation {
                id: "org1".into(),
                name: "Eltham Wildcats".into(),
                kind: Some("CLUB".into()),
                updated_at: ts(),
            })
            .await
            .unwrap();
        writer
            .competition(&Competition {
                id: "comp1".into(),
                organisation_id: "org1".into(),
                name: "Domestic".into(),
                kind: None,
            })
            .await
            .unwrap();
        writer
            .season(&Season {
                id: "s1".into(),
                competition_id: "comp1".into(),
                name: "Winter 2025".into(),
                start_date: Some("2025-04-01".into()),
                end_date: None,
                status: Some("ACTIVE".into()),
            })
            .await
            .unwrap();
        writer
            .grade(&Grade {
                id: "g1".into(),
                season_id: "s1".into(),
                name: "U16 Boys A".into(),
                kind: None,
            })
            .await
            .unwrap();
        db
    }

    fn stat(team: &str, points: i64) -> PlayerStat {
        PlayerStat {
            player_id: "p1".into(),
            grade_id: "g1".into(),
            team_name: Some(team.into()),
            games_played: 4,
            total_points: points,
            one_point: 1,
            two_point: 3,
            three_point: 0,
            total_fouls: 2,
            ranking: Some(7),
        }
    }

    async fn insert_player(db: &Database) {
        db.writer()
            .player(&Player {
                id: "p1".into(),
                first_name: Some("Joshua".into()),
                last_name: Some("Citizen".into()),
                updated_at: ts(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn repeated_upserts_leave_one_identical_row() {
        let db = seeded().await;
        insert_player(&db).await;
        insert_player(&db).await;
        db.writer().player_stat(&stat("Eltham 07", 7)).await.unwrap();
        db.writer().player_stat(&stat("Eltham 07", 7)).await.unwrap();

        let totals = db.totals().await.unwrap();
        assert_eq!(totals.players, 1);
        assert_eq!(totals.player_stats, 1);
        assert_eq!(
            db.player_stat("p1", "g1").await.unwrap(),
            Some(stat("Eltham 07", 7))
        );
    }

    #[tokio::test]
    async fn hierarchy_rows_are_unchanged_by_a_second_identical_upsert() {
        let db = seeded().await;
        let writer = db.writer();
        let season = Season {
            id: "s1".into(),
            competition_id: "comp1".into(),
            name: "Winter 2025".into(),
            start_date: Some("2025-04-01".into()),
            end_date: None,
            status: Some("ACTIVE".into()),
        };
        let grade = Grade {
            id: "g1".into(),
            season_id: "s1".into(),
            name: "U16 Boys A".into(),
            kind: None,
        };
        let team = Team {
            id: "t1".into(),
            name: "Eltham 07".into(),
            organisation_id: Some("org1".into()),
            season_id: Some("s1".into()),
        };
        let round = Round {
            id: "r1".into(),
            grade_id: "g1".into(),
            name: "Round 1".into(),
            number: Some(1),
            provisional_date: Some("2025-05-03".into()),
            is_finals: false,
        };

        let season_row = "SELECT id, competition_id, name, start_date, end_date, status FROM seasons";
        let team_row = "SELECT id, name, organisation_id, season_id FROM teams";
        let mut snapshots = Vec::new();
        for _ in 0..2 {
            writer.season(&season).await.unwrap();
            writer.grade(&grade).await.unwrap();
            writer.team(&team).await.unwrap();
            writer.round(&round).await.unwrap();
            let seasons: Vec<(String, String, String, Option<String>, Option<String>, Option<String>)> =
                sqlx::query_as(season_row).fetch_all(db.pool()).await.unwrap();
            let teams: Vec<(String, String, Option<String>, Option<String>)> =
                sqlx::query_as(team_row).fetch_all(db.pool()).await.unwrap();
            snapshots.push((
                seasons,
                db.grades_for_competition("comp1").await.unwrap(),
                teams,
                db.round("r1").await.unwrap(),
            ));
        }

        assert_eq!(snapshots[0], snapshots[1]);
        assert_eq!(snapshots[1].1, vec![grade]);
        assert_eq!(snapshots[1].3, Some(round));
        let totals = db.totals().await.unwrap();
        assert_eq!((totals.seasons, totals.grades, totals.teams, totals.rounds), (1, 1, 1, 1));
    }

    #[tokio::test]
    async fn player_stat_latest_write_wins_within_a_grade() {
        let db = seeded().await;
        insert_player(&db).await;
        db.writer().player_stat(&stat("Eltham 07", 7)).await.unwrap();
        db.writer().player_stat(&stat("Eltham 09", 12)).await.unwrap();

        let stored = db.player_stat("p1", "g1").await.unwrap().unwrap();
        assert_eq!(stored.team_name.as_deref(), Some("Eltham 09"));
        assert_eq!(stored.total_points, 12);
        assert_eq!(db.totals().await.unwrap().player_stats, 1);
    }

    #[tokio::test]
    async fn reupserting_a_parent_keeps_children_intact() {
        let db = seeded().await;
        db.writer()
            .organisation(&Organisation {
                id: "org1".into(),
                name: "Eltham Wildcats Basketball Club".into(),
                kind: Some("CLUB".into()),
                updated_at: ts(),
            })
            .await
            .unwrap();

        let org = db.organisation("org1").await.unwrap().unwrap();
        assert_eq!(org.name, "Eltham Wildcats Basketball Club");
        assert_eq!(db.grades_for_competition("comp1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn placeholders_do_not_overwrite_known_parents() {
        let db = seeded().await;
        let writer = db.writer();
        writer.ensure_organisation("org1", ts()).await.unwrap();
        writer.ensure_organisation("org2", ts()).await.unwrap();
        writer.ensure_competition("comp1", "org1").await.unwrap();

        assert_eq!(db.organisation("org1").await.unwrap().unwrap().name, "Eltham Wildcats");
        assert_eq!(db.organisation("org2").await.unwrap().unwrap().name, "org2");
        assert_eq!(db.totals().await.unwrap().competitions, 1);
    }

    #[tokio::test]
    async fn games_are_replaced_not_duplicated() {
        let db = seeded().await;
        let mut game = Game {
            id: "game1".into(),
            grade_id: "g1".into(),
            round_id: "r1".into(),
            round_name: Some("Round 1".into()),
            home_team_id: Some("t1".into()),
            away_team_id: Some("t2".into()),
            home_score: None,
            away_score: None,
            date: Some("2025-05-03".into()),
            time: Some("09:00".into()),
            venue: Some("Eltham High".into()),
            court: Some("Court 1".into()),
            status: Some("UPCOMING".into()),
        };
        db.writer().game(&game).await.unwrap();
        game.home_score = Some(42);
        game.away_score = Some(38);
        game.status = Some("FINAL".into());
        db.writer().game(&game).await.unwrap();

        assert_eq!(db.game("game1").await.unwrap(), Some(game));
        assert_eq!(db.totals().await.unwrap().games, 1);
    }

    #[tokio::test]
    async fn checkpoint_log_is_append_only_and_monotonic() {
        let db = seeded().await;
        let checkpoints = db.checkpoints();
        let ns = CheckpointNamespace::GradeFull;

        assert!(!checkpoints.has_succeeded(ns, "g1").await.unwrap());
        checkpoints.record(ns, "g1", false, Some("boom")).await.unwrap();
        assert!(!checkpoints.has_succeeded(ns, "g1").await.unwrap());
        checkpoints.record(ns, "g1", true, None).await.unwrap();
        checkpoints.record(ns, "g1", false, Some("later failure")).await.unwrap();
        assert!(checkpoints.has_succeeded(ns, "g1").await.unwrap());

        let history = checkpoints.history(ns, "g1").await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.success).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert_eq!(history[0].error.as_deref(), Some("boom"));
        assert!(!checkpoints
            .has_succeeded(CheckpointNamespace::GradeFixtures, "g1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn has_succeeded_any_matches_across_namespaces() {
        let db = seeded().await;
        let checkpoints = db.checkpoints();
        checkpoints
            .record(CheckpointNamespace::GradeWide, "g1", true, None)
            .await
            .unwrap();

        assert!(checkpoints
            .has_succeeded_any(
                &[CheckpointNamespace::GradeFull, CheckpointNamespace::GradeWide],
                "g1"
            )
            .await
            .unwrap());
        assert!(!checkpoints
            .has_succeeded_any(&[CheckpointNamespace::GradeStats], "g1")
            .await
            .unwrap());
        assert!(!checkpoints.has_succeeded_any(&[], "g1").await.unwrap());
    }

    #[tokio::test]
    async fn foreign_keys_reject_orphans() {
        let db = seeded().await;
        let err = db
            .writer()
            .grade(&Grade {
                id: "g2".into(),
                season_id: "missing".into(),
                name: "Orphan".into(),
                kind: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { what: "grade", .. }), "{err}");
    }

    #[tokio::test]
    async fn file_database_uses_wal_and_creates_parent_dirs() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("playhq.db");
        let url = format!("sqlite://{}", path.display());

        let db = Database::connect(&url).await.expect("connect");
        db.migrate().await.expect("migrate");
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
        db.close().await;
        assert!(path.exists());

        let reopened = Database::connect(&url).await.expect("reopen");
        reopened.migrate().await.expect("migrations are idempotent");
        assert_eq!(reopened.totals().await.unwrap(), TableTotals::default());
    }
}
