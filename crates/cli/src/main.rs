//! Fiber CLI - drive a synthetic workload through the sequencer.

mod workload;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiber_core::SequencerConfig;
use fiber_execution::TokioScheduler;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use workload::{drive, Workload};

#[derive(Parser)]
#[command(name = "fiber")]
#[command(about = "Cooperative one-at-a-time task sequencer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload
    Run {
        /// Number of items (runs until interrupted when omitted)
        #[arg(long)]
        items: Option<usize>,
        /// Simulated work per item, in milliseconds
        #[arg(long, default_value = "100")]
        work_ms: u64,
        /// Delay between items, in milliseconds (overrides the config file)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Abort the run after this many milliseconds
        #[arg(long)]
        abort_after_ms: Option<u64>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { items, work_ms, delay_ms, abort_after_ms, config } => {
            let mut config = load_config(config.as_deref()).await?;
            if let Some(delay_ms) = delay_ms {
                config.step_delay_ms = delay_ms;
            }

            let workload = Workload {
                items,
                work: Duration::from_millis(work_ms),
            };
            let stop = stop_signal(abort_after_ms.map(Duration::from_millis));

            let local = tokio::task::LocalSet::new();
            let outcome = local
                .run_until(drive(workload, TokioScheduler::new(), config, stop))
                .await?;

            println!("{}", outcome);
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<SequencerConfig> {
    let Some(path) = path else {
        return Ok(SequencerConfig::default());
    };

    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let config = SequencerConfig::from_json(&json)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Resolves on Ctrl-C or once `abort_after` has elapsed.
async fn stop_signal(abort_after: Option<Duration>) {
    match abort_after {
        Some(after) => {
            tokio::select! {
                _ = tokio::time::sleep(after) => info!(?after, "abort deadline reached"),
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupted");
        }
    }
}
