//! heatwise - predictive heat-pump control engine
//!
//! Runs the control loop, the learning scheduler and the read-only status
//! API under one supervisor.
//!
//! # Usage
//!
//! ```bash
//! # Drive a simulated house in real time
//! cargo run --release -- --simulate
//!
//! # Read forecast/telemetry JSON lines from stdin, write commands to stdout
//! ./weather_feed | ./heatwise --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `HEATWISE_CONFIG`: path to the TOML config (default: ./heatwise.toml)
//! - `HEATWISE_LOG_FORMAT`: `json` for structured log lines
//! - `HEATWISE_RETRAIN_INTERVAL_SECS`: override the retrain interval
//! - `HEATWISE_CORS_ORIGINS`: comma-separated origins allowed by the API
//! - `HEATWISE_RESET_DB`: set to "true" to wipe persistent data on startup
//! - `RUST_LOG`: logging level (default: info)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use heatwise::api::{create_app, ApiState};
use heatwise::background::HealthBoard;
use heatwise::config::SystemConfig;
use heatwise::ml_engine::{LearningEngine, LearningScheduler};
use heatwise::pipeline::{
    Clock, Collaborators, ControlLoop, JsonLinesFeed, PredictiveController, SharedState,
    StatusHandle, StdoutSink, SystemClock,
};
use heatwise::simulation::SimulatedHouse;
use heatwise::startup::{open_data_stores, restore_learning_state};
use heatwise::storage::ProcessLock;
use heatwise::thermal_model::{PlantConstants, ThermalModel};
use heatwise::types::ThermalParameters;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "heatwise")]
#[command(about = "Predictive heat-pump control engine")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file
    #[arg(short, long, env = "HEATWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Read forecast and telemetry JSON lines from stdin and write
    /// committed commands to stdout
    #[arg(long, conflicts_with = "simulate")]
    stdin: bool,

    /// Drive a simulated house in real time (the default when no input is given)
    #[arg(long)]
    simulate: bool,

    /// Seed for the simulated house noise
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Override the status API address (default from config: "0.0.0.0:8099")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Wipe the history journal and learning state on startup.
    /// Can also be set via HEATWISE_RESET_DB=true.
    #[arg(long)]
    reset_db: bool,
}

// ============================================================================
// Logging
// ============================================================================

const LOG_FORMAT_ENV: &str = "HEATWISE_LOG_FORMAT";

/// Logs go to stderr so stdout stays free for the command stream.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

// ============================================================================
// Database Reset
// ============================================================================

fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    std::env::var("HEATWISE_RESET_DB")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn reset_data_directory(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        info!("Data directory does not exist, nothing to reset");
        return Ok(());
    }
    warn!(path = %data_dir.display(), "Reset requested, removing history and learning state");
    std::fs::remove_dir_all(data_dir)
        .with_context(|| format!("Failed to remove data directory {}", data_dir.display()))?;
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    ControlLoop,
    LearningScheduler,
    Feed,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::ControlLoop => write!(f, "ControlLoop"),
            TaskName::LearningScheduler => write!(f, "LearningScheduler"),
            TaskName::Feed => write!(f, "Feed"),
        }
    }
}

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await
            .map_err(|e| {
                error!("[HttpServer] Server error: {}", e);
                anyhow::anyhow!("HTTP server error: {}", e)
            })?;
        info!("[HttpServer] Graceful shutdown complete");
        Ok(TaskName::HttpServer)
    });
}

/// Monitor tasks; the first failure cancels everything else.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => {
                info!("Supervisor: task {} completed", task_name);
            }
            Ok(Err(e)) => {
                error!("Supervisor: task failed: {:#}", e);
                cancel_token.cancel();
                return Err(e);
            }
            Err(e) => {
                error!("Supervisor: task panicked: {}", e);
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    info!("Supervisor: all tasks completed");
    Ok(())
}

/// Hidden parameters of the simulated house: the configured prior, a bit off.
fn simulated_truth(config: &SystemConfig) -> ThermalParameters {
    let mut truth = config.prior_parameters();
    truth.thermal_lag_hours *= 1.25;
    truth.solar_gain_factor = (truth.solar_gain_factor * 1.3).min(1.0);
    truth.clamped()
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => SystemConfig::load_from_file(path)
            .with_context(|| format!("Invalid config {}", path.display()))?,
        None => SystemConfig::load(),
    };
    if let Some(dir) = args.data_dir.clone() {
        config.storage.data_dir = dir;
    }
    if let Some(addr) = args.addr.clone() {
        config.server.addr = addr;
    }
    let data_dir = config.storage.data_dir.clone();

    info!(
        target_temp = config.house.target_temperature,
        horizon_h = config.control.prediction_horizon_hours,
        tick_secs = config.control.tick_interval_secs,
        data_dir = %data_dir.display(),
        "heatwise starting"
    );

    if should_reset_db(args.reset_db) {
        reset_data_directory(&data_dir)?;
    }
    let _process_lock = ProcessLock::acquire(&data_dir)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let now = clock.now();
    let health = Arc::new(HealthBoard::new());
    let status = Arc::new(StatusHandle::new(now));

    let stores = open_data_stores(&data_dir, config.learning.history_capacity, &health, now)?;
    let engine = Arc::new(LearningEngine::new(
        config.learning.clone(),
        PlantConstants::from(&config.model),
        config.prior_parameters(),
    ));
    restore_learning_state(&engine, &stores.learning, &health, now);

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let model = ThermalModel::new(PlantConstants::from(&config.model));

    let collaborators = if args.stdin {
        info!("Input: JSON lines on stdin, commands on stdout");
        let feed = Arc::new(JsonLinesFeed::new());
        let reader = BufReader::new(tokio::io::stdin());
        let feed_task = Arc::clone(&feed);
        let token = cancel_token.clone();
        task_set.spawn(async move {
            feed_task.run(reader, token).await?;
            Ok(TaskName::Feed)
        });
        Collaborators {
            forecast: feed.clone(),
            telemetry: feed,
            sink: Arc::new(StdoutSink::new()),
        }
    } else {
        if !args.simulate {
            info!("No input selected, defaulting to --simulate");
        }
        let house = Arc::new(SimulatedHouse::new(
            model,
            simulated_truth(&config),
            Arc::clone(&clock),
            config.house.target_temperature - 1.0,
            args.seed,
        ));
        info!(seed = args.seed, "Input: simulated house");
        Collaborators {
            forecast: house.clone(),
            telemetry: house.clone(),
            sink: house,
        }
    };

    let shared = SharedState {
        engine: Arc::clone(&engine),
        history: Arc::clone(&stores.history),
        status: Arc::clone(&status),
        health: Arc::clone(&health),
    };
    let controller = PredictiveController::new(&config, model, collaborators, shared);
    let control_loop = ControlLoop::new(controller, Arc::clone(&clock), cancel_token.clone());
    task_set.spawn(async move {
        control_loop.run().await;
        Ok(TaskName::ControlLoop)
    });

    let scheduler = LearningScheduler::new(
        &config.learning,
        Arc::clone(&engine),
        Arc::clone(&stores.history),
        Arc::clone(&status),
        Arc::clone(&clock),
    )
    .with_state_store(Arc::clone(&stores.learning));
    let token = cancel_token.clone();
    task_set.spawn(async move {
        scheduler.run(token).await?;
        Ok(TaskName::LearningScheduler)
    });

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind status API on {}", config.server.addr))?;
    info!(addr = %config.server.addr, "Status API listening");
    let app = create_app(ApiState {
        status,
        health,
        engine,
        history: stores.history,
        clock,
    });
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await?;
    info!("heatwise shutdown complete");
    Ok(())
}
