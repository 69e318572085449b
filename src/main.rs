use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use defi_yield_risk::{
    config::Settings,
    database::{establish_connection, run_migrations, SqliteStore},
    handlers::{create_router, AppState},
    models::HistoryWindow,
    services::{
        DefiLlamaClient, HistoricalCollector, RegistryFetcher, RiskCalculator, ScoringService,
        UpdateOrchestrator, YieldsProvider,
    },
    utils::{init_logging, time::today_utc, RequestPacer},
    AppError,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "defi-yield-risk")]
#[command(version, about = "DeFi yield pool ingestion and risk scoring")]
struct Cli {
    /// Configuration file layered over the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// First load: migrate, refresh the registry, collect full history, score
    Init {
        /// Only collect the first N pools in registry order
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Sync the pool registry from the provider
    Refresh,

    /// Collect daily history for eligible pools
    Collect {
        /// Trailing window in days (defaults to the configured window)
        #[arg(long)]
        window_days: Option<u32>,

        /// Only collect the first N pools in registry order
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Score pools whose history changed
    Score {
        /// Rescore every eligible pool
        #[arg(long)]
        all: bool,
    },

    /// Fetch only missing dates, then rescore changed pools
    Update {
        /// Reference date (YYYY-MM-DD), defaults to today in UTC
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Do not sync the registry first
        #[arg(long)]
        skip_refresh: bool,
    },

    /// Print the risk distribution of eligible pools
    Summary,

    /// Serve the read-only query API
    Serve,
}

struct Components {
    registry: RegistryFetcher,
    collector: Arc<HistoricalCollector>,
    scoring: Arc<ScoringService>,
    orchestrator: UpdateOrchestrator,
}

impl Components {
    fn build(settings: &Settings, store: Arc<SqliteStore>) -> Result<Self, AppError> {
        let provider: Arc<dyn YieldsProvider> = Arc::new(DefiLlamaClient::new(&settings.upstream)?);
        let pacer = Arc::new(RequestPacer::new(settings.collection.min_request_interval()));
        let retry_policy = settings.collection.retry_policy();

        let registry = RegistryFetcher::new(
            provider.clone(),
            store.clone(),
            pacer.clone(),
            retry_policy.clone(),
            settings.eligibility.clone(),
        );
        let collector = Arc::new(HistoricalCollector::new(
            provider,
            store.clone(),
            store.clone(),
            store.clone(),
            pacer,
            retry_policy,
        ));
        let scoring = Arc::new(ScoringService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            RiskCalculator::new(settings.risk.clone()),
        ));
        let orchestrator = UpdateOrchestrator::new(
            store.clone(),
            store,
            collector.clone(),
            scoring.clone(),
            settings.collection.window_days,
        );

        Ok(Self {
            registry,
            collector,
            scoring,
            orchestrator,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn open_store(settings: &Settings) -> Result<Arc<SqliteStore>, AppError> {
    let pool = establish_connection(&settings.database.url, settings.database.max_connections).await?;
    run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn run(command: Commands, settings: Settings) -> Result<(), AppError> {
    let store = open_store(&settings).await?;

    match command {
        Commands::Migrate => {
            info!("Database is up to date");
        }
        Commands::Init { limit } => {
            let components = Components::build(&settings, store)?;
            let window = HistoryWindow::trailing(today_utc(), settings.collection.window_days);

            print_json(&components.registry.refresh_registry().await?)?;
            print_json(&components.collector.collect_eligible(window, limit).await?)?;
            print_json(&components.scoring.score_pending().await?)?;
        }
        Commands::Refresh => {
            let components = Components::build(&settings, store)?;
            print_json(&components.registry.refresh_registry().await?)?;
        }
        Commands::Collect { window_days, limit } => {
            let days = settings.collection.window_days_or(window_days)?;
            let components = Components::build(&settings, store)?;
            let window = HistoryWindow::trailing(today_utc(), days);

            print_json(&components.collector.collect_eligible(window, limit).await?)?;
        }
        Commands::Score { all } => {
            let components = Components::build(&settings, store)?;
            let report = if all {
                components.scoring.score_all().await?
            } else {
                components.scoring.score_pending().await?
            };
            print_json(&report)?;
        }
        Commands::Update { as_of, skip_refresh } => {
            let components = Components::build(&settings, store)?;
            if !skip_refresh {
                print_json(&components.registry.refresh_registry().await?)?;
            }
            let as_of = as_of.unwrap_or_else(today_utc);
            print_json(&components.orchestrator.run_incremental_update(as_of).await?)?;
        }
        Commands::Summary => {
            let state = AppState::new(store);
            print_json(&state.query.summary().await?)?;
        }
        Commands::Serve => serve(&settings, store).await?,
    }

    Ok(())
}

async fn serve(settings: &Settings, store: Arc<SqliteStore>) -> Result<(), AppError> {
    let app = create_router(AppState::new(store));
    let addr = format!("{}:{}", settings.api.host, settings.api.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::ConfigError(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Query API listening on {}", addr);
    info!("  GET /health");
    info!("  GET /api/v1/pools");
    info!("  GET /api/v1/pools/{{id}}");
    info!("  GET /api/v1/pools/{{id}}/history");
    info!("  GET /api/v1/summary");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
        .map_err(|e| AppError::InternalError(format!("Server error: {}", e)))?;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
