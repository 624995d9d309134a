// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! envfuse - Environmental Telemetry Fusion Engine
//!
//! Headless daemon that fuses multi-source environmental telemetry and
//! exposes the latest reading, history, link health and alerts to its
//! dashboard collaborators.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use envfuse::config::SourceConfig;
use envfuse::{Channel, Config, Pipeline, Profile, SourceKind, VERSION};

/// envfuse - Environmental Telemetry Fusion Engine
#[derive(Parser, Debug)]
#[command(name = "envfuse")]
#[command(version = VERSION)]
#[command(about = "Multi-source environmental telemetry fusion and health tracking")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with the simulated source
    #[arg(long)]
    demo: bool,

    /// Low-resource profile (smaller history, single-source fusion)
    #[arg(long)]
    lite: bool,

    /// Seconds between status log lines
    #[arg(long, default_value = "10")]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("envfuse v{} - Environmental Telemetry Fusion Engine", VERSION);

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    if args.demo {
        config.demo_mode = true;
    }
    if config.demo_mode
        && !config.sources.iter().any(|s| s.kind == SourceKind::Simulator)
    {
        // Demo needs a local source that works without hardware
        config.sources.insert(0, SourceConfig::simulator("esp32-sim", 3, 0));
    }
    if args.lite {
        config.profile = Profile::Lite;
        config.history.capacity = config.history.capacity.min(20);
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Profile: {:?}, demo mode: {}", config.profile, config.demo_mode);

    let mut pipeline = Pipeline::new(config)?;
    let handle = pipeline.handle();
    pipeline.start()?;

    info!("Pipeline running, press Ctrl+C to shut down");

    let mut status_ticker = tokio::time::interval(Duration::from_secs(args.status_interval.max(1)));
    status_ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = status_ticker.tick() => {
                log_status(&handle);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    pipeline.stop().await;
    info!("envfuse shutdown complete");

    Ok(())
}

fn log_status(handle: &envfuse::PipelineHandle) {
    let health = handle.health();
    match handle.latest() {
        Some(reading) => {
            info!(
                "health: {:?} ({}%) | temp: {} | humidity: {} | gas: {} | alerts: {}",
                health.state,
                health.confidence,
                reading.display(Channel::Temperature).unwrap_or_else(|| "-".into()),
                reading.display(Channel::Humidity).unwrap_or_else(|| "-".into()),
                reading.display(Channel::GasPpm).unwrap_or_else(|| "-".into()),
                handle.alerts().len(),
            );
            for alert in handle.alerts() {
                warn!("[{:?}] {}", alert.severity, alert.message);
            }
        }
        None => info!("health: {:?} ({}%) | no data yet", health.state, health.confidence),
    }
}
