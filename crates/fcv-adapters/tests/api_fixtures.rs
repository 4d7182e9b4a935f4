use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fcv_adapters::{queries, AdapterError, PlayHqApi};
use fcv_core::Round;
use fcv_storage::{BackoffPolicy, FetchError, GraphQlTransport, RetryingClient};
use serde_json::{json, Value as JsonValue};

fn fixture(name: &str) -> JsonValue {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    serde_json::from_str(&raw).expect("fixture json")
}

#[derive(Default)]
struct Recorded {
    responses: VecDeque<Result<JsonValue, FetchError>>,
    calls: Vec<(String, JsonValue)>,
}

#[derive(Clone, Default)]
struct Replay(Arc<Mutex<Recorded>>);

impl Replay {
    fn with(responses: Vec<Result<JsonValue, FetchError>>) -> Self {
        let replay = Self::default();
        replay.0.lock().unwrap().responses = responses.into();
        replay
    }

    fn calls(&self) -> Vec<(String, JsonValue)> {
        self.0.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl GraphQlTransport for Replay {
    async fn execute(&self, query: &str, variables: &JsonValue) -> Result<JsonValue, FetchError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push((query.to_string(), variables.clone()));
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("no scripted response".into())))
    }
}

fn api(replay: &Replay) -> PlayHqApi {
    PlayHqApi::new(RetryingClient::new(
        Box::new(replay.clone()),
        BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
    ))
}

#[tokio::test]
async fn organisation_page_is_requested_by_variables() {
    let replay = Replay::with(vec![Ok(fixture("discover_organisations_page1.json"))]);
    let seen_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();

    let page = api(&replay).organisations_page(1, seen_at).await.unwrap();

    assert_eq!(page.organisations.len(), 2);
    assert_eq!(page.total_pages, 9);
    assert_eq!(page.total_records, Some(887));
    assert_eq!(page.organisations[1].kind.as_deref(), Some("ASSOCIATION"));

    let calls = replay.calls();
    assert_eq!(calls[0].0, queries::DISCOVER_ORGANISATIONS);
    assert_eq!(calls[0].1, json!({ "filter": { "limit": 100, "page": 1 } }));
}

#[tokio::test]
async fn statistics_page_maps_players_and_skips_profileless_rows() {
    let replay = Replay::with(vec![Ok(fixture("grade_player_statistics.json"))]);
    let seen_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();

    let page = api(&replay)
        .player_statistics_page("g-u16a", 2, seen_at)
        .await
        .unwrap()
        .expect("statistics object present");

    assert_eq!(page.page, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.lines.len(), 2);
    let joshua = &page.lines[0].stat;
    assert_eq!(
        (joshua.games_played, joshua.total_points, joshua.one_point, joshua.two_point, joshua.three_point, joshua.total_fouls),
        (12, 64, 6, 20, 6, 17)
    );
    assert_eq!(page.lines[1].stat.total_points, 0);

    let (query, variables) = &replay.calls()[0];
    assert_eq!(query, queries::GRADE_PLAYER_STATISTICS);
    assert_eq!(variables["gradeID"], "g-u16a");
    assert_eq!(variables["filter"]["pagination"], json!({ "page": 2, "limit": 50 }));
    assert_eq!(variables["filter"]["sort"][0]["column"], "APPEARANCE");
}

#[tokio::test]
async fn round_fixture_maps_games() {
    let replay = Replay::with(vec![Ok(fixture("fixture_by_round.json"))]);
    let round = Round {
        id: "r-5".into(),
        grade_id: "g-u16a".into(),
        name: "Round 5".into(),
        number: Some(5),
        provisional_date: Some("2025-05-03".into()),
        is_finals: false,
    };

    let games = api(&replay).round_fixture(&round).await.unwrap();

    assert_eq!(games.len(), 2);
    assert_eq!(games[0].home_score, Some(48));
    assert_eq!(games[0].away_score, Some(39));
    assert_eq!(games[0].venue.as_deref(), Some("Eltham College"));
    assert_eq!(games[1].away_team_id, None);
    assert_eq!(games[1].status.as_deref(), Some("UPCOMING"));
    assert!(games.iter().all(|g| g.grade_id == "g-u16a" && g.round_id == "r-5"));
    assert_eq!(replay.calls()[0].1, json!({ "roundID": "r-5" }));
}

#[tokio::test]
async fn persistent_graphql_errors_surface_after_the_retry_budget() {
    let replay = Replay::with(vec![
        Ok(fixture("graphql_error.json")),
        Ok(fixture("graphql_error.json")),
        Ok(fixture("graphql_error.json")),
    ]);

    let err = api(&replay).grade_rounds("g-missing").await.unwrap_err();

    assert!(
        matches!(&err, AdapterError::Fetch(FetchError::GraphQl(msg)) if msg == "Grade not found"),
        "{err}"
    );
    assert_eq!(replay.calls().len(), 3);
}

#[tokio::test]
async fn hostile_ids_never_reach_the_query_text() {
    let hostile = r#"x") { __schema { types { name } } } #"#;
    let replay = Replay::with(vec![Ok(json!({ "data": { "discoverSeason": null } }))]);

    let grades = api(&replay).season_grades(hostile).await.unwrap();

    assert!(grades.is_empty());
    let (query, variables) = &replay.calls()[0];
    assert!(!query.contains("__schema"));
    assert_eq!(variables["seasonID"], hostile);
}
