use crate::config::{Config, LogConfig, MonitorSource};
use crate::monitor::PathMonitor;
use crate::observer::PathObserver;
use crate::presenter::{present, render_text};
use crate::replay::ReplayMonitor;
use crate::system::SystemMonitor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

mod config;
mod endpoint;
mod interface;
mod monitor;
mod observer;
mod path;
mod presenter;
mod replay;
mod state;
mod system;
mod tui;

use clap::{Parser, Subcommand};

/// pathwatch: live view of the current network path
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Watch the network path (interactive TUI)
    Watch,
    /// Print the current network path once
    Show {
        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
        /// How long to wait for the peer path lookup
        #[arg(long, default_value_t = 500)]
        settle_ms: u64,
    },
    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Watch);

    let loaded = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| (path.clone(), e)),
        None => Ok(Config::default()),
    };
    let log_cfg = loaded.as_ref().map(|c| c.log.clone()).unwrap_or_default();
    init_logging(&log_cfg, matches!(command, Commands::Watch))?;

    let config = match loaded {
        Ok(cfg) => cfg,
        Err((path, e)) => {
            error!("Configuration '{}' is INVALID: {}", path, e);
            return Err(anyhow::anyhow!("Invalid config"));
        }
    };

    match command {
        Commands::Validate => validate_config(cli.config.as_deref(), &config),
        command => match config.monitor.source {
            MonitorSource::System => {
                let monitor = SystemMonitor::new(config.system.clone(), config.monitor.poll_interval());
                run_command(Arc::new(monitor), command, &config).await
            }
            MonitorSource::Replay => {
                let script = config
                    .monitor
                    .replay
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("monitor.replay is not set"))?;
                let monitor = ReplayMonitor::load(script)?;
                run_command(Arc::new(monitor), command, &config).await
            }
        },
    }
}

fn init_logging(log: &LogConfig, interactive: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.filter))?;

    let (writer, ansi) = match &log.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        // Anything written to the terminal would tear the TUI.
        None if interactive => (BoxMakeWriter::new(std::io::sink), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .init();
    Ok(())
}

fn validate_config(path: Option<&str>, cfg: &Config) -> anyhow::Result<()> {
    let path = path.unwrap_or("<defaults>");
    info!("Configuration '{}' is valid.", path);
    info!("Monitor source: {:?}", cfg.monitor.source);
    info!("Poll interval: {} ms", cfg.monitor.poll_interval_ms);
    if let Some(script) = &cfg.monitor.replay {
        info!("Replay script: {}", script.display());
    }
    Ok(())
}

async fn run_command<M: PathMonitor>(
    monitor: Arc<M>,
    command: Commands,
    config: &Config,
) -> anyhow::Result<()> {
    let subscription = PathObserver::subscribe(monitor)?;

    let result = match command {
        Commands::Watch => {
            tui::run(
                subscription.state(),
                Duration::from_millis(config.display.tick_ms),
            )
            .await
        }
        Commands::Show { json, settle_ms } => {
            show_state(subscription.state(), json, Duration::from_millis(settle_ms)).await
        }
        Commands::Validate => Ok(()),
    };

    subscription.cancel().await;
    result
}

async fn show_state(
    mut state_rx: tokio::sync::watch::Receiver<Option<state::PathState>>,
    json: bool,
    settle: Duration,
) -> anyhow::Result<()> {
    if state_rx.wait_for(|s| s.is_some()).await.is_err() {
        warn!("Path observer stopped before the first snapshot");
    }
    let settled = tokio::time::timeout(
        settle,
        state_rx.wait_for(|s| s.as_ref().is_some_and(|s| s.resolved)),
    )
    .await
    .is_ok();
    if !settled {
        warn!("Peer path lookup did not finish within {} ms", settle.as_millis());
    }

    let Some(state) = state_rx.borrow().clone() else {
        return Err(anyhow::anyhow!("No network path observed"));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print!("{}", render_text(&present(&state)));
    }
    Ok(())
}
