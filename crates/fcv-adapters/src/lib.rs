//! Typed PlayHQ GraphQL operations and the mapping from responses into `fcv-core` rows.

use chrono::{DateTime, Utc};
use fcv_core::{Competition, Game, Grade, Organisation, Player, PlayerStat, Round, Season, Team};
use fcv_storage::{FetchError, RetryingClient};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

pub mod queries;

pub const CRATE_NAME: &str = "fcv-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganisationPage {
    pub organisations: Vec<Organisation>,
    pub page: i64,
    pub total_pages: i64,
    pub total_records: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetitionListing {
    pub competition: Competition,
    pub seasons: Vec<Season>,
}

/// A grade looked up by ID together with the season it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeLookup {
    pub grade: Grade,
    pub season_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLine {
    pub player: Player,
    pub stat: PlayerStat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsPage {
    pub lines: Vec<PlayerLine>,
    pub page: i64,
    pub total_pages: i64,
}

/// The PlayHQ operations the crawler issues, each one retried through [`RetryingClient`].
pub struct PlayHqApi {
    client: RetryingClient,
}

impl PlayHqApi {
    pub fn new(client: RetryingClient) -> Self {
        Self { client }
    }

    async fn call(
        &self,
        operation: &'static str,
        query: &str,
        variables: JsonValue,
    ) -> Result<JsonValue, AdapterError> {
        debug!(operation, "issuing GraphQL operation");
        Ok(self.client.query(operation, query, &variables).await?)
    }

    pub async fn organisations_page(
        &self,
        page: i64,
        seen_at: DateTime<Utc>,
    ) -> Result<OrganisationPage, AdapterError> {
        let variables = json!({
            "filter": { "limit": queries::ORGANISATION_PAGE_SIZE, "page": page }
        });
        let body = self
            .call("discoverOrganisations", queries::DISCOVER_ORGANISATIONS, variables)
            .await?;
        parse_organisation_page(body, page, seen_at)
    }

    pub async fn competitions(&self, organisation_id: &str) -> Result<Vec<CompetitionListing>, AdapterError> {
        let body = self
            .call(
                "discoverCompetitions",
                queries::DISCOVER_COMPETITIONS,
                json!({ "organisationID": organisation_id }),
            )
            .await?;
        parse_competitions(body, organisation_id)
    }

    pub async fn season_grades(&self, season_id: &str) -> Result<Vec<Grade>, AdapterError> {
        let body = self
            .call(
                "discoverSeason",
                queries::DISCOVER_SEASON_GRADES,
                json!({ "seasonID": season_id }),
            )
            .await?;
        parse_season_grades(body, season_id)
    }

    pub async fn season_teams(&self, season_id: &str) -> Result<Vec<Team>, AdapterError> {
        let body = self
            .call(
                "discoverTeams",
                queries::DISCOVER_TEAMS,
                json!({ "filter": { "seasonID": season_id } }),
            )
            .await?;
        parse_season_teams(body, season_id)
    }

    pub async fn grade(&self, grade_id: &str) -> Result<Option<GradeLookup>, AdapterError> {
        let body = self
            .call("discoverGrade", queries::DISCOVER_GRADE, json!({ "gradeID": grade_id }))
            .await?;
        parse_grade_lookup(body)
    }

    pub async fn grade_rounds(&self, grade_id: &str) -> Result<Vec<Round>, AdapterError> {
        let body = self
            .call("gradeRounds", queries::GRADE_ROUNDS, json!({ "gradeID": grade_id }))
            .await?;
        parse_grade_rounds(body, grade_id)
    }

    /// One page of a grade's player statistics, sorted by appearances.
    /// `None` when the response carries no statistics object at all.
    pub async fn player_statistics_page(
        &self,
        grade_id: &str,
        page: i64,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<StatisticsPage>, AdapterError> {
        let variables = json!({
            "gradeID": grade_id,
            "filter": {
                "sort": [{ "column": "APPEARANCE", "direction": "DESC" }],
                "pagination": { "page": page, "limit": queries::STATISTICS_PAGE_SIZE }
            }
        });
        let body = self
            .call("gradePlayerStatistics", queries::GRADE_PLAYER_STATISTICS, variables)
            .await?;
        parse_statistics_page(body, grade_id, page, seen_at)
    }

    pub async fn round_fixture(&self, round: &Round) -> Result<Vec<Game>, AdapterError> {
        let body = self
            .call(
                "discoverFixtureByRound",
                queries::FIXTURE_BY_ROUND,
                json!({ "roundID": round.id }),
            )
            .await?;
        parse_round_fixture(body, round)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: JsonValue) -> Result<Option<T>, AdapterError> {
    let envelope: Envelope<T> =
        serde_json::from_value(body).map_err(|source| AdapterError::Decode { operation, source })?;
    Ok(envelope.data)
}

#[derive(Debug, Deserialize)]
struct ValueOf {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ref {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    page: Option<i64>,
    total_pages: Option<i64>,
    total_records: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganisationsData {
    discover_organisations: Option<OrganisationConnection>,
}

#[derive(Debug, Deserialize)]
struct OrganisationConnection {
    results: Option<Vec<WireOrganisation>>,
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct WireOrganisation {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub fn parse_organisation_page(
    body: JsonValue,
    requested_page: i64,
    seen_at: DateTime<Utc>,
) -> Result<OrganisationPage, AdapterError> {
    let connection = decode::<OrganisationsData>("discoverOrganisations", body)?
        .and_then(|d| d.discover_organisations);
    let Some(connection) = connection else {
        return Ok(OrganisationPage {
            organisations: Vec::new(),
            page: requested_page,
            total_pages: 0,
            total_records: None,
        });
    };

    let organisations = connection
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|o| Organisation {
            name: o.name.unwrap_or_else(|| o.id.clone()),
            id: o.id,
            kind: o.kind,
            updated_at: seen_at,
        })
        .collect();
    let meta = connection.meta;
    Ok(OrganisationPage {
        organisations,
        page: meta.as_ref().and_then(|m| m.page).unwrap_or(requested_page),
        total_pages: meta.as_ref().and_then(|m| m.total_pages).unwrap_or(0),
        total_records: meta.and_then(|m| m.total_records),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompetitionsData {
    discover_competitions: Option<Vec<WireCompetition>>,
}

#[derive(Debug, Deserialize)]
struct WireCompetition {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    seasons: Option<Vec<WireSeason>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeason {
    id: String,
    name: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    status: Option<ValueOf>,
}

pub fn parse_competitions(
    body: JsonValue,
    organisation_id: &str,
) -> Result<Vec<CompetitionListing>, AdapterError> {
    let competitions = decode::<CompetitionsData>("discoverCompetitions", body)?
        .and_then(|d| d.discover_competitions)
        .unwrap_or_default();

    Ok(competitions
        .into_iter()
        .map(|c| {
            let seasons = c
                .seasons
                .unwrap_or_default()
                .into_iter()
                .map(|s| Season {
                    name: s.name.unwrap_or_else(|| s.id.clone()),
                    id: s.id,
                    competition_id: c.id.clone(),
                    start_date: s.start_date,
                    end_date: s.end_date,
                    status: s.status.and_then(|v| v.value),
                })
                .collect();
            CompetitionListing {
                competition: Competition {
                    name: c.name.unwrap_or_else(|| c.id.clone()),
                    id: c.id,
                    organisation_id: organisation_id.to_string(),
                    kind: c.kind,
                },
                seasons,
            }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonGradesData {
    discover_season: Option<SeasonGrades>,
}

#[derive(Debug, Deserialize)]
struct SeasonGrades {
    grades: Option<Vec<WireGrade>>,
}

#[derive(Debug, Deserialize)]
struct WireGrade {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub fn parse_season_grades(body: JsonValue, season_id: &str) -> Result<Vec<Grade>, AdapterError> {
    let grades = decode::<SeasonGradesData>("discoverSeason", body)?
        .and_then(|d| d.discover_season)
        .and_then(|s| s.grades)
        .unwrap_or_default();

    Ok(grades
        .into_iter()
        .map(|g| Grade {
            name: g.name.unwrap_or_else(|| g.id.clone()),
            id: g.id,
            season_id: season_id.to_string(),
            kind: g.kind,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamsData {
    discover_teams: Option<Vec<WireTeam>>,
}

#[derive(Debug, Deserialize)]
struct WireTeam {
    id: String,
    name: Option<String>,
    organisation: Option<Ref>,
}

pub fn parse_season_teams(body: JsonValue, season_id: &str) -> Result<Vec<Team>, AdapterError> {
    let teams = decode::<TeamsData>("discoverTeams", body)?
        .and_then(|d| d.discover_teams)
        .unwrap_or_default();

    Ok(teams
        .into_iter()
        .map(|t| Team {
            name: t.name.unwrap_or_else(|| t.id.clone()),
            id: t.id,
            organisation_id: t.organisation.and_then(|o| o.id),
            season_id: Some(season_id.to_string()),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeData {
    discover_grade: Option<WireGradeDetail>,
}

#[derive(Debug, Deserialize)]
struct WireGradeDetail {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    season: Option<Ref>,
}

/// `None` unless both the grade and its season ID are present.
pub fn parse_grade_lookup(body: JsonValue) -> Result<Option<GradeLookup>, AdapterError> {
    let Some(detail) = decode::<GradeData>("discoverGrade", body)?.and_then(|d| d.discover_grade) else {
        return Ok(None);
    };
    let Some(season) = detail.season else {
        return Ok(None);
    };
    let Some(season_id) = season.id else {
        return Ok(None);
    };

    Ok(Some(GradeLookup {
        season_name: season.name.unwrap_or_else(|| season_id.clone()),
        grade: Grade {
            name: detail.name.unwrap_or_else(|| detail.id.clone()),
            id: detail.id,
            season_id,
            kind: detail.kind,
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeRoundsData {
    discover_grade: Option<GradeRounds>,
}

#[derive(Debug, Deserialize)]
struct GradeRounds {
    rounds: Option<Vec<WireRound>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRound {
    id: String,
    name: Option<String>,
    number: Option<JsonValue>,
    is_finals_round: Option<bool>,
    provisional_dates: Option<Vec<Option<String>>>,
}

pub fn parse_grade_rounds(body: JsonValue, grade_id: &str) -> Result<Vec<Round>, AdapterError> {
    let rounds = decode::<GradeRoundsData>("gradeRounds", body)?
        .and_then(|d| d.discover_grade)
        .and_then(|g| g.rounds)
        .unwrap_or_default();

    Ok(rounds
        .into_iter()
        .map(|r| Round {
            name: r.name.unwrap_or_else(|| r.id.clone()),
            id: r.id,
            grade_id: grade_id.to_string(),
            number: r.number.as_ref().and_then(json_i64),
            provisional_date: r
                .provisional_dates
                .and_then(|dates| dates.into_iter().next().flatten()),
            is_finals: r.is_finals_round.unwrap_or(false),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsData {
    grade_player_statistics: Option<StatisticsConnection>,
}

#[derive(Debug, Deserialize)]
struct StatisticsConnection {
    meta: Option<PageMeta>,
    results: Option<Vec<WireStatLine>>,
}

#[derive(Debug, Deserialize)]
struct WireStatLine {
    ranking: Option<JsonValue>,
    profile: Option<WireProfile>,
    team: Option<Named>,
    statistics: Option<Vec<WireStatistic>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProfile {
    id: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStatistic {
    count: Option<JsonValue>,
    details: Option<ValueOf>,
}

pub fn parse_statistics_page(
    body: JsonValue,
    grade_id: &str,
    requested_page: i64,
    seen_at: DateTime<Utc>,
) -> Result<Option<StatisticsPage>, AdapterError> {
    let Some(connection) =
        decode::<StatisticsData>("gradePlayerStatistics", body)?.and_then(|d| d.grade_player_statistics)
    else {
        return Ok(None);
    };

    let lines = connection
        .results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|line| {
            let profile = line.profile?;
            let counts = line.statistics.unwrap_or_default();
            let count_of = |key: &str| {
                counts
                    .iter()
                    .find(|s| s.details.as_ref().and_then(|d| d.value.as_deref()) == Some(key))
                    .and_then(|s| s.count.as_ref())
                    .and_then(json_i64)
                    .unwrap_or(0)
            };
            let stat = PlayerStat {
                player_id: profile.id.clone(),
                grade_id: grade_id.to_string(),
                team_name: line.team.and_then(|t| t.name),
                games_played: count_of("APPEARANCE"),
                total_points: count_of("TOTAL_SCORE"),
                one_point: count_of("1_POINT_SCORE"),
                two_point: count_of("2_POINT_SCORE"),
                three_point: count_of("3_POINT_SCORE"),
                total_fouls: count_of("TOTAL_FOULS"),
                ranking: line.ranking.as_ref().and_then(json_i64),
            };
            Some(PlayerLine {
                player: Player {
                    id: profile.id,
                    first_name: profile.first_name,
                    last_name: profile.last_name,
                    updated_at: seen_at,
                },
                stat,
            })
        })
        .collect();

    let meta = connection.meta;
    Ok(Some(StatisticsPage {
        lines,
        page: meta.as_ref().and_then(|m| m.page).unwrap_or(requested_page),
        total_pages: meta.and_then(|m| m.total_pages).unwrap_or(0),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureData {
    discover_fixture_by_round: Option<Fixture>,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    games: Option<Vec<WireGame>>,
}

#[derive(Debug, Deserialize)]
struct WireGame {
    id: String,
    home: Option<Ref>,
    away: Option<Ref>,
    result: Option<WireResult>,
    status: Option<ValueOf>,
    date: Option<String>,
    allocation: Option<WireAllocation>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    home: Option<WireSide>,
    away: Option<WireSide>,
}

#[derive(Debug, Deserialize)]
struct WireSide {
    score: Option<JsonValue>,
    statistics: Option<Vec<WireSideStatistic>>,
}

#[derive(Debug, Deserialize)]
struct WireSideStatistic {
    count: Option<JsonValue>,
    #[serde(rename = "type")]
    kind: Option<ValueOf>,
}

#[derive(Debug, Deserialize)]
struct WireAllocation {
    time: Option<String>,
    court: Option<WireCourt>,
}

#[derive(Debug, Deserialize)]
struct WireCourt {
    name: Option<String>,
    venue: Option<Named>,
}

fn side_score(side: Option<&WireSide>) -> Option<i64> {
    let side = side?;
    side.score.as_ref().and_then(json_i64).or_else(|| {
        side.statistics
            .as_ref()?
            .iter()
            .find(|s| s.kind.as_ref().and_then(|k| k.value.as_deref()) == Some("TOTAL_SCORE"))
            .and_then(|s| s.count.as_ref())
            .and_then(json_i64)
    })
}

pub fn parse_round_fixture(body: JsonValue, round: &Round) -> Result<Vec<Game>, AdapterError> {
    let games = decode::<FixtureData>("discoverFixtureByRound", body)?
        .and_then(|d| d.discover_fixture_by_round)
        .and_then(|f| f.games)
        .unwrap_or_default();

    Ok(games
        .into_iter()
        .map(|g| {
            let (court, venue) = match g.allocation.as_ref().and_then(|a| a.court.as_ref()) {
                Some(c) => (c.name.clone(), c.venue.as_ref().and_then(|v| v.name.clone())),
                None => (None, None),
            };
            Game {
                id: g.id,
                grade_id: round.grade_id.clone(),
                round_id: round.id.clone(),
                round_name: Some(round.name.clone()),
                home_team_id: g.home.and_then(|t| t.id),
                away_team_id: g.away.and_then(|t| t.id),
                home_score: side_score(g.result.as_ref().and_then(|r| r.home.as_ref())),
                away_score: side_score(g.result.as_ref().and_then(|r| r.away.as_ref())),
                date: g.date,
                time: g.allocation.and_then(|a| a.time),
                venue,
                court,
                status: g.status.and_then(|s| s.value),
            }
        })
        .collect())
}

/// Numeric value of a count-like field, accepting integers, floats and numeric strings.
fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seen_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().unwrap()
    }

    fn round() -> Round {
        Round {
            id: "r1".into(),
            grade_id: "g1".into(),
            name: "Round 1".into(),
            number: Some(1),
            provisional_date: None,
            is_finals: false,
        }
    }

    #[test]
    fn statistics_map_by_detail_key_and_default_to_zero() {
        let body = json!({
            "data": { "gradePlayerStatistics": {
                "meta": { "page": 1, "totalPages": 3, "totalRecords": 120 },
                "results": [{
                    "ranking": 4,
                    "profile": { "id": "p1", "firstName": "Joshua", "lastName": "Citizen" },
                    "team": { "name": "Eltham U16 Boys 07" },
                    "statistics": [
                        { "count": 9, "details": { "value": "APPEARANCE" } },
                        { "count": 87.0, "details": { "value": "TOTAL_SCORE" } },
                        { "count": 11, "details": { "value": "3_POINT_SCORE" } },
                        { "count": null, "details": { "value": "TOTAL_FOULS" } }
                    ]
                }]
            }}
        });

        let page = parse_statistics_page(body, "g1", 1, seen_at()).unwrap().unwrap();
        assert_eq!(page.total_pages, 3);
        let line = &page.lines[0];
        assert_eq!(line.player.first_name.as_deref(), Some("Joshua"));
        assert_eq!(line.player.updated_at, seen_at());
        assert_eq!(line.stat.games_played, 9);
        assert_eq!(line.stat.total_points, 87);
        assert_eq!(line.stat.three_point, 11);
        assert_eq!(line.stat.one_point, 0);
        assert_eq!(line.stat.two_point, 0);
        assert_eq!(line.stat.total_fouls, 0);
        assert_eq!(line.stat.ranking, Some(4));
        assert_eq!(line.stat.team_name.as_deref(), Some("Eltham U16 Boys 07"));
    }

    #[test]
    fn statistics_lines_without_profile_are_skipped() {
        let body = json!({
            "data": { "gradePlayerStatistics": {
                "meta": { "page": 1, "totalPages": 1 },
                "results": [
                    { "ranking": 1, "profile": null, "statistics": [] },
                    { "ranking": 2, "profile": { "id": "p2" } }
                ]
            }}
        });
        let page = parse_statistics_page(body, "g1", 1, seen_at()).unwrap().unwrap();
        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].stat.player_id, "p2");
    }

    #[test]
    fn missing_statistics_object_is_none() {
        assert_eq!(
            parse_statistics_page(json!({ "data": { "gradePlayerStatistics": null } }), "g1", 2, seen_at())
                .unwrap(),
            None
        );
        assert_eq!(parse_statistics_page(json!({}), "g1", 1, seen_at()).unwrap(), None);
    }

    #[test]
    fn game_score_falls_back_to_total_score_statistic() {
        let body = json!({
            "data": { "discoverFixtureByRound": { "games": [{
                "id": "game1",
                "home": { "id": "t1", "name": "Eltham" },
                "away": {},
                "result": {
                    "home": { "score": null, "statistics": [
                        { "count": 3, "type": { "value": "TOTAL_FOULS" } },
                        { "count": 51, "type": { "value": "TOTAL_SCORE" } }
                    ]},
                    "away": { "score": 47 }
                },
                "status": { "value": "FINAL" },
                "date": "2025-05-03",
                "allocation": { "time": "09:00:00", "court": { "name": "Court 2", "venue": { "name": "Eltham High" } } }
            }]}}
        });

        let games = parse_round_fixture(body, &round()).unwrap();
        let game = &games[0];
        assert_eq!(game.home_score, Some(51));
        assert_eq!(game.away_score, Some(47));
        assert_eq!(game.home_team_id.as_deref(), Some("t1"));
        assert_eq!(game.away_team_id, None);
        assert_eq!(game.round_id, "r1");
        assert_eq!(game.round_name.as_deref(), Some("Round 1"));
        assert_eq!(game.venue.as_deref(), Some("Eltham High"));
        assert_eq!(game.court.as_deref(), Some("Court 2"));
        assert_eq!(game.time.as_deref(), Some("09:00:00"));
        assert_eq!(game.status.as_deref(), Some("FINAL"));
    }

    #[test]
    fn unplayed_game_has_no_scores() {
        let body = json!({
            "data": { "discoverFixtureByRound": { "games": [{ "id": "game2", "result": null }] } }
        });
        let games = parse_round_fixture(body, &round()).unwrap();
        assert_eq!(games[0].home_score, None);
        assert_eq!(games[0].away_score, None);
        assert_eq!(games[0].venue, None);
    }

    #[test]
    fn round_takes_first_provisional_date() {
        let body = json!({
            "data": { "discoverGrade": { "rounds": [
                { "id": "r1", "name": "Round 1", "number": 1, "isFinalsRound": false,
                  "provisionalDates": ["2025-05-03", "2025-05-04"] },
                { "id": "r9", "name": "Grand Final", "number": "9", "isFinalsRound": true,
                  "provisionalDates": [] }
            ]}}
        });
        let rounds = parse_grade_rounds(body, "g1").unwrap();
        assert_eq!(rounds[0].provisional_date.as_deref(), Some("2025-05-03"));
        assert_eq!(rounds[1].provisional_date, None);
        assert_eq!(rounds[1].number, Some(9));
        assert!(rounds[1].is_finals);
    }

    #[test]
    fn absent_nested_data_yields_empty_results() {
        assert!(parse_competitions(json!({ "data": { "discoverCompetitions": null } }), "org1")
            .unwrap()
            .is_empty());
        assert!(parse_season_grades(json!({ "data": { "discoverSeason": {} } }), "s1")
            .unwrap()
            .is_empty());
        assert!(parse_grade_rounds(json!({ "data": null }), "g1").unwrap().is_empty());
        assert!(parse_season_teams(json!({ "data": {} }), "s1").unwrap().is_empty());
        let page = parse_organisation_page(json!({ "data": {} }), 4, seen_at()).unwrap();
        assert!(page.organisations.is_empty());
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn schema_mismatch_is_a_decode_error() {
        let err = parse_season_grades(json!({ "data": { "discoverSeason": { "grades": "nope" } } }), "s1")
            .unwrap_err();
        assert!(matches!(err, AdapterError::Decode { operation: "discoverSeason", .. }), "{err}");
    }

    #[test]
    fn grade_lookup_requires_a_season() {
        let found = parse_grade_lookup(json!({
            "data": { "discoverGrade": { "id": "g1", "name": "U16 Boys A", "season": { "id": "s1", "name": "Winter 2025" } } }
        }))
        .unwrap()
        .unwrap();
        assert_eq!(found.grade.season_id, "s1");
        assert_eq!(found.season_name, "Winter 2025");

        let orphan = parse_grade_lookup(json!({
            "data": { "discoverGrade": { "id": "g1", "name": "U16 Boys A", "season": null } }
        }))
        .unwrap();
        assert_eq!(orphan, None);
    }

    #[test]
    fn competitions_carry_their_seasons() {
        let body = json!({
            "data": { "discoverCompetitions": [{
                "id": "comp1", "name": "Domestic",
                "seasons": [{ "id": "s1", "name": "Winter 2025", "startDate": "2025-04-01", "status": { "value": "ACTIVE" } }]
            }]}
        });
        let listings = parse_competitions(body, "org1").unwrap();
        assert_eq!(listings[0].competition.organisation_id, "org1");
        assert_eq!(listings[0].seasons[0].competition_id, "comp1");
        assert_eq!(listings[0].seasons[0].status.as_deref(), Some("ACTIVE"));
        assert_eq!(listings[0].seasons[0].end_date, None);
    }

    #[test]
    fn count_values_accept_floats_and_strings() {
        assert_eq!(json_i64(&json!(4)), Some(4));
        assert_eq!(json_i64(&json!(12.0)), Some(12));
        assert_eq!(json_i64(&json!("7")), Some(7));
        assert_eq!(json_i64(&json!(null)), None);
        assert_eq!(json_i64(&json!("n/a")), None);
    }
}
