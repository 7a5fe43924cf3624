//! tsa-rt - Sentiment retraining and serving service
//!
//! Default command serves the HTTP API and runs the retraining scheduler.
//! `check`, `retrain`, `promote` and `reset-batch` are one-shot operator
//! commands against the same database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use tsa_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV};
use tsa_common::events::EventBus;
use tsa_rt::db::{RetrainStore, SqliteStore};
use tsa_rt::services::{BowTrainer, RetrainScheduler, RetrainingOrchestrator};
use tsa_rt::AppState;

/// Event bus capacity
const EVENT_CAPACITY: usize = 100;

/// Command-line arguments for tsa-rt
#[derive(Parser, Debug)]
#[command(name = "tsa-rt")]
#[command(about = "Sentiment model retraining and serving")]
#[command(version)]
struct Args {
    /// Data folder holding the database and model files
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "TSA_RT_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the API and run the scheduler (default)
    Serve,
    /// Print the retraining decision
    Check,
    /// Run one retraining cycle now
    Retrain {
        /// Skip the trigger check
        #[arg(long)]
        force: bool,
    },
    /// Deploy a registered model version
    Promote { version: i64 },
    /// Return the samples consumed by a batch to the unused pool
    ResetBatch { batch_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "tsa_rt={level},tsa_common={level},tower_http=info",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tsa-rt {}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(args.root_folder.as_deref(), &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let db_pool = tsa_common::db::init_database(&initializer.database_path()).await?;
    let store: Arc<dyn RetrainStore> = Arc::new(SqliteStore::new(db_pool));
    let event_bus = EventBus::new(EVENT_CAPACITY);

    let trainer = Arc::new(BowTrainer::new(config.trainer.clone(), config.retrain.seed));
    let orchestrator = Arc::new(RetrainingOrchestrator::new(
        Arc::clone(&store),
        trainer,
        config.retrain.clone(),
        initializer.models_dir(),
        event_bus.clone(),
    )?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(args.port, config, orchestrator, event_bus).await,
        Command::Check => {
            let status = orchestrator.pool_status().await?;
            let decision = orchestrator.check_retraining_needed().await?;
            println!(
                "{}",
                serde_json::json!({
                    "should_retrain": decision.should_retrain,
                    "reason": decision.reason,
                    "unused_samples": status.unused_samples,
                    "hours_since_last_train": status.hours_since_last_train,
                })
            );
            Ok(())
        }
        Command::Retrain { force } => {
            match orchestrator.run_retraining_cycle(force).await? {
                Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                None => println!("Retraining not needed"),
            }
            Ok(())
        }
        Command::Promote { version } => {
            let previous = orchestrator.registry().promote(version).await?;
            info!(version, previous_version = ?previous, "Manual promotion done");
            Ok(())
        }
        Command::ResetBatch { batch_id } => {
            let reset = store.reset_samples(batch_id).await?;
            info!(%batch_id, samples = reset, "Returned batch samples to the pool");
            Ok(())
        }
    }
}

async fn serve(
    port: Option<u16>,
    config: TomlConfig,
    orchestrator: Arc<RetrainingOrchestrator>,
    event_bus: EventBus,
) -> Result<()> {
    let mut state = AppState::new(Arc::clone(&orchestrator), event_bus);

    let scheduler = if config.scheduler.enabled {
        let handle = RetrainScheduler::new(orchestrator, config.scheduler.clone())
            .with_last_error(Arc::clone(&state.last_error))
            .spawn();
        state = state.with_retrain_sender(handle.sender());
        Some(handle)
    } else {
        warn!("Scheduler disabled; retraining only runs on demand");
        None
    };

    let app = tsa_rt::build_router(state);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(host, port.unwrap_or(config.server.port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
