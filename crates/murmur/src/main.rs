//! # Murmur - Gossip Membership Daemon
//!
//! Every node tracks the liveness of every other node through periodic
//! heartbeats, full-table gossip to a random fan-out, and timeout-based
//! eviction. The only coordination point is a well-known introducer used
//! for the initial join.
//!
//! ## Architecture
//! ```text
//! transport ──> inbound queue ──> Node::tick ──┬─> join handshake
//!                                              ├─> gossip merge / fan-out
//!                                              └─> failure detector ──> observer
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use murmur_common::NodeIdentity;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod daemon;
mod membership;
mod node;
mod observer;
mod protocol;
mod simulation;
mod transport;

use config::MurmurConfig;
use simulation::{Simulation, SimulationConfig};

/// Murmur - gossip-based group membership
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/murmur.toml", global = true)]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL", global = true)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one node over UDP
    Run {
        /// This node's address (overrides config)
        #[arg(short, long, env = "MURMUR_BIND")]
        bind: Option<String>,

        /// Introducer address (overrides config)
        #[arg(long, env = "MURMUR_BOOTSTRAP")]
        bootstrap: Option<String>,
    },

    /// Run an emulated cluster in-process
    Simulate {
        /// Number of nodes (node 1 is the introducer)
        #[arg(short, long, default_value = "10")]
        nodes: u32,

        /// Ticks to run
        #[arg(short, long, default_value = "700")]
        ticks: u64,

        /// Probability that any single message is lost
        #[arg(long, default_value = "0.0")]
        drop_rate: f64,

        /// Ticks between successive node starts
        #[arg(long, default_value = "1")]
        join_stagger: u64,

        /// Node index to crash-stop
        #[arg(long, requires = "fail_at")]
        fail_node: Option<u32>,

        /// Tick at which the node crashes
        #[arg(long, requires = "fail_node")]
        fail_at: Option<u64>,

        /// RNG seed for fan-out and message loss
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Write the JSON report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🔊 Starting Murmur v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = MurmurConfig::load(&args.config)?;
    info!("📋 Configuration loaded from {}", args.config);

    match args.command {
        Command::Run { bind, bootstrap } => {
            // Apply CLI overrides
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(bootstrap) = bootstrap {
                config.bootstrap_addr = bootstrap;
            }
            run(config).await
        }
        Command::Simulate {
            nodes,
            ticks,
            drop_rate,
            join_stagger,
            fail_node,
            fail_at,
            seed,
            report,
        } => {
            let sim_config = SimulationConfig {
                nodes,
                ticks,
                drop_rate,
                join_stagger,
                failure: fail_node.zip(fail_at),
                seed,
                protocol: config.protocol,
            };
            simulate(sim_config, report)
        }
    }
}

async fn run(config: MurmurConfig) -> Result<()> {
    let identity: NodeIdentity = config.bind_identity()?;
    let bootstrap: NodeIdentity = config.bootstrap_identity()?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Handle graceful shutdown
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        let _ = signal_tx.send(());
    });

    daemon::run_node(identity, bootstrap, config.protocol, shutdown_tx).await?;

    info!("👋 Murmur shutdown complete");
    Ok(())
}

fn simulate(config: SimulationConfig, report_path: Option<PathBuf>) -> Result<()> {
    info!(
        nodes = config.nodes,
        ticks = config.ticks,
        drop_rate = config.drop_rate,
        seed = config.seed,
        "🧪 Running emulated cluster"
    );

    let report = Simulation::new(config)?.run();

    if let Some(failure) = &report.failure {
        info!(
            node = %failure.node,
            detected = failure.detected_by.len(),
            missed = failure.missed_by.len(),
            "Crash detection summary"
        );
    }
    info!(converged = report.converged, events = report.events.len(), "🏁 Simulation finished");

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match report_path {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("📝 Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
