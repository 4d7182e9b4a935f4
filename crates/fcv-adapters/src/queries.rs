//! Fixed GraphQL documents. Every caller-supplied value travels as a variable.

pub const ORGANISATION_PAGE_SIZE: u32 = 100;
pub const STATISTICS_PAGE_SIZE: u32 = 50;

pub const DISCOVER_ORGANISATIONS: &str = r#"
query discoverOrganisations($filter: DiscoverOrganisationsFilter) {
  discoverOrganisations(filter: $filter) {
    results { id name type }
    meta { page totalPages totalRecords }
  }
}"#;

pub const DISCOVER_COMPETITIONS: &str = r#"
query discoverCompetitions($organisationID: ID!) {
  discoverCompetitions(organisationID: $organisationID) {
    id
    name
    type
    seasons(organisationID: $organisationID) {
      id name startDate endDate status { value }
    }
  }
}"#;

pub const DISCOVER_SEASON_GRADES: &str = r#"
query discoverSeason($seasonID: ID!) {
  discoverSeason(seasonID: $seasonID) {
    grades { id name type }
  }
}"#;

pub const DISCOVER_TEAMS: &str = r#"
query discoverTeams($filter: DiscoverTeamsFilter) {
  discoverTeams(filter: $filter) {
    id
    name
    organisation { id name }
  }
}"#;

pub const DISCOVER_GRADE: &str = r#"
query discoverGrade($gradeID: ID!) {
  discoverGrade(gradeID: $gradeID) {
    id name type
    season { id name }
  }
}"#;

pub const GRADE_ROUNDS: &str = r#"
query gradeRounds($gradeID: ID!) {
  discoverGrade(gradeID: $gradeID) {
    rounds { id name number isFinalsRound provisionalDates }
  }
}"#;

pub const GRADE_PLAYER_STATISTICS: &str = r#"
query gradePlayerStatistics($gradeID: ID!, $filter: GradePlayerStatisticsFilter) {
  gradePlayerStatistics(gradeID: $gradeID, filter: $filter) {
    meta { page totalPages totalRecords }
    results {
      ranking
      profile { id firstName lastName }
      team { name }
      statistics { count details { value } }
    }
  }
}"#;

pub const FIXTURE_BY_ROUND: &str = r#"
query discoverFixtureByRound($roundID: ID!) {
  discoverFixtureByRound(roundID: $roundID) {
    games {
      id
      home { ... on DiscoverTeam { id name } }
      away { ... on DiscoverTeam { id name } }
      result {
        home { score statistics { count type { value } } }
        away { score statistics { count type { value } } }
      }
      status { value }
      date
      allocation { time court { name venue { name } } }
    }
  }
}"#;
