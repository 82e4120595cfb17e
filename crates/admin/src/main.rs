use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use contests::{ContestService, Role};
use serde::Serialize;
use serde::de::DeserializeOwned;
use storage::Database;
use storage::dto::contest::{ContestRequest, EventRequest};
use storage::models::ContestState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "contest-admin")]
#[command(about = "Contest lifecycle administration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create a contest from a JSON definition
    Create {
        #[arg(long)]
        file: PathBuf,

        /// Person id of the creator
        #[arg(long)]
        creator: i32,
    },
    /// Apply a JSON definition to an existing contest
    Update {
        competition_id: String,

        #[arg(long)]
        file: PathBuf,

        #[arg(long = "role", default_value = "admin")]
        roles: Vec<Role>,
    },
    /// Move a contest to another state
    State {
        competition_id: String,

        state: ContestState,

        #[arg(long = "role", default_value = "admin")]
        roles: Vec<Role>,
    },
    /// Replace the results of a contest with the events in a JSON file
    PostResults {
        competition_id: String,

        #[arg(long)]
        file: PathBuf,
    },
    /// Show the records of an event
    Records {
        event_id: String,

        /// Only consider results from before this date
        #[arg(long)]
        before: Option<NaiveDate>,
    },
    /// Show a contest with its persons and records
    Show {
        competition_id: String,

        /// Show what the public sees instead
        #[arg(long)]
        public: bool,
    },
    List {
        #[arg(long)]
        region: Option<String>,

        /// Include contests that were not approved yet
        #[arg(long)]
        all: bool,
    },
    Delete {
        competition_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "contest_admin={0},contests={0},storage={0}",
                log_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::debug!(
        "Connecting to database at: {}",
        config
            .database_url
            .split('@')
            .next_back()
            .unwrap_or("unknown")
    );
    let db = Database::with_max_connections(&config.database_url, config.max_connections)
        .await
        .context("Failed to initialize database")?;

    if let Commands::Migrate = cli.command {
        db.run_migrations()
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Database migrations completed successfully");
        return Ok(());
    }

    let service = ContestService::new(Arc::new(db), config.settings());
    run(&service, cli.command).await
}

async fn run(service: &ContestService<Database>, command: Commands) -> Result<()> {
    match command {
        Commands::Migrate => Ok(()),
        Commands::Create { file, creator } => {
            let request: ContestRequest = read_json(&file).await?;
            let contest = service.create_contest(&request, creator).await?;
            print_json(&contest)
        }
        Commands::Update {
            competition_id,
            file,
            roles,
        } => {
            let request: ContestRequest = read_json(&file).await?;
            let report = service
                .update_contest(&competition_id, &request, &roles)
                .await?;
            print_json(&report)
        }
        Commands::State {
            competition_id,
            state,
            roles,
        } => {
            let outcome = service.advance_state(&competition_id, state, &roles).await?;
            print_json(&outcome)
        }
        Commands::PostResults {
            competition_id,
            file,
        } => {
            let events: Vec<EventRequest> = read_json(&file).await?;
            let response = service.post_results(&competition_id, &events).await?;
            print_json(&response)
        }
        Commands::Records { event_id, before } => {
            let record_types = service.active_record_types().await?;
            let before = before.map(|date| date.and_time(NaiveTime::MIN).and_utc());
            let records = service
                .get_records_for_event(&event_id, &record_types, before)
                .await?;
            print_json(&records)
        }
        Commands::Show {
            competition_id,
            public,
        } => {
            if public {
                print_json(&service.get_contest(&competition_id).await?)
            } else {
                print_json(&service.get_mod_contest(&competition_id).await?)
            }
        }
        Commands::List { region, all } => {
            let contests = if all {
                service.list_mod_contests(0, &[Role::Admin]).await?
            } else {
                service.list_contests(region.as_deref()).await?
            };
            print_json(&contests)
        }
        Commands::Delete { competition_id } => {
            service
                .delete_contest(&competition_id, &[Role::Admin])
                .await?;
            print_json(&serde_json::json!({ "deleted": competition_id }))
        }
    }
}

async fn read_json<T: DeserializeOwned>(file: &Path) -> Result<T> {
    tracing::debug!("Loading JSON from: {}", file.display());

    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Cannot read {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", file.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
