use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fcv_sync::{RunSummary, SyncConfig, TraversalScope, WalkOptions};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "fcv-cli")]
#[command(about = "FullCourtVision PlayHQ crawler")]
struct Cli {
    /// Level for the crawler's own logs when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database file and apply migrations.
    InitDb,
    /// Discover every upstream organisation and store it locally.
    Orgs,
    /// Walk part of the hierarchy, skipping units that already succeeded.
    Walk {
        #[command(subcommand)]
        target: WalkTarget,
        #[command(flatten)]
        leaves: LeafArgs,
    },
    /// Row counts per table.
    Stats,
}

#[derive(Debug, Subcommand)]
enum WalkTarget {
    /// Every organisation already in the local table.
    All,
    Org { organisation_id: String },
    Competition {
        organisation_id: String,
        competition_id: String,
        /// Only walk these seasons (id or name); repeatable.
        #[arg(long = "season")]
        seasons: Vec<String>,
    },
    /// Specific grades of a competition, looked up upstream.
    Grades {
        organisation_id: String,
        competition_id: String,
        #[arg(required = true)]
        grade_ids: Vec<String>,
    },
    /// Grades of a competition already stored locally.
    LocalGrades { competition_id: String },
}

impl WalkTarget {
    fn into_scope(self) -> TraversalScope {
        match self {
            Self::All => TraversalScope::AllOrganisations,
            Self::Org { organisation_id } => TraversalScope::Organisation(organisation_id),
            Self::Competition {
                organisation_id,
                competition_id,
                seasons,
            } => TraversalScope::Competition {
                organisation_id,
                competition_id,
                seasons: (!seasons.is_empty()).then_some(seasons),
            },
            Self::Grades {
                organisation_id,
                competition_id,
                grade_ids,
            } => TraversalScope::KnownGrades {
                organisation_id,
                competition_id,
                grade_ids,
            },
            Self::LocalGrades { competition_id } => TraversalScope::LocalGrades { competition_id },
        }
    }
}

#[derive(Debug, Args)]
struct LeafArgs {
    #[arg(long, global = true)]
    skip_stats: bool,
    #[arg(long, global = true)]
    skip_fixtures: bool,
    /// Also discover each season's teams.
    #[arg(long, global = true)]
    with_teams: bool,
}

impl LeafArgs {
    fn options(&self) -> Result<WalkOptions> {
        if self.skip_stats && self.skip_fixtures && !self.with_teams {
            bail!("--skip-stats and --skip-fixtures together leave nothing to walk");
        }
        Ok(WalkOptions {
            include_stats: !self.skip_stats,
            include_fixtures: !self.skip_fixtures,
            include_teams: self.with_teams,
        })
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("fcv_cli={level},fcv_sync={level},fcv_adapters={level},fcv_storage={level},warn").into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("encoding output")?);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("walk complete: run_id={}", summary.run_id);
    println!(
        "  organisations: {} scraped, {} skipped, {} failed",
        summary.organisations_scraped, summary.organisations_skipped, summary.organisations_failed
    );
    println!(
        "  grades: {} scraped, {} skipped, {} failed",
        summary.grades_scraped, summary.grades_skipped, summary.grades_failed
    );
    println!(
        "  players={} games={} teams={} discovery_failures={}",
        summary.players, summary.games, summary.teams, summary.discovery_failures
    );
    if let Some(elapsed) = summary.elapsed() {
        println!("  elapsed: {}s", elapsed.num_seconds());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let config = SyncConfig::from_env();

    match cli.command {
        Commands::InitDb => {
            let db = config.open_database().await?;
            db.close().await;
            println!("database ready: {}", config.database_url);
        }
        Commands::Orgs => {
            let walker = config.walker(WalkOptions::default()).await?;
            let discovery = walker.discover_organisations().await?;
            if cli.json {
                print_json(&discovery)?;
            } else {
                println!(
                    "organisations stored: {} across {} pages{}",
                    discovery.organisations,
                    discovery.pages,
                    if discovery.complete { "" } else { " (stopped early)" }
                );
            }
        }
        Commands::Walk { target, leaves } => {
            let options = leaves.options()?;
            let scope = target.into_scope();
            info!(database = %config.database_url, endpoint = %config.http.endpoint, "starting walk");
            let walker = config.walker(options).await?;
            let summary = walker.walk(&scope).await?;
            if cli.json {
                print_json(&summary)?;
            } else {
                print_summary(&summary);
            }
        }
        Commands::Stats => {
            let db = config.open_database().await?;
            let totals = db.totals().await.context("counting rows")?;
            db.close().await;
            if cli.json {
                print_json(&totals)?;
            } else {
                println!("organisations: {}", totals.organisations);
                println!("competitions:  {}", totals.competitions);
                println!("seasons:       {}", totals.seasons);
                println!("grades:        {}", totals.grades);
                println!("teams:         {}", totals.teams);
                println!("players:       {}", totals.players);
                println!("player_stats:  {}", totals.player_stats);
                println!("rounds:        {}", totals.rounds);
                println!("games:         {}", totals.games);
                println!("checkpoints:   {}", totals.checkpoints);
            }
        }
    }

    Ok(())
}
