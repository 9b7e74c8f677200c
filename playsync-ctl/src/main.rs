//! playsync-ctl - scenario runner
//!
//! Spawns one playback controller over the simulated backend, drives it
//! through a scripted scenario and prints every caller-visible event.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use playsync_common::config::load_config;
use playsync_common::{ControllerEvent, EventBus, PlayerEvent};
use playsync_ctl::scenario::Scenario;
use playsync_ctl::{spawn_controller, SimulatedAdapter};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for playsync-ctl
#[derive(Parser, Debug)]
#[command(name = "playsync-ctl")]
#[command(about = "Run a scripted playback session against a simulated backend")]
#[command(version)]
struct Args {
    /// Scenario file (TOML); the built-in demo runs when omitted
    #[arg(short, long, env = "PLAYSYNC_SCENARIO")]
    scenario: Option<PathBuf>,

    /// Config file (overrides PLAYSYNC_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level for playsync crates (trace, debug, info, warn, error)
    #[arg(long, env = "PLAYSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging so its level can seed the filter
    let config = load_config(args.config.as_deref());
    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&level, args.log_level.is_some());

    let config = config.context("Failed to load configuration")?;

    let scenario = match &args.scenario {
        Some(path) => Scenario::from_file(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?,
        None => Scenario::demo().context("Built-in demo scenario is invalid")?,
    };
    info!(
        steps = scenario.steps.len(),
        total_ms = scenario.total_duration().as_millis() as u64,
        "Scenario loaded"
    );

    let bus = EventBus::new(config.controller.event_capacity);
    info!(capacity = bus.capacity(), "Event bus ready");
    let printer = tokio::spawn(print_events(bus.subscribe(), args.json));

    let backend = scenario.backend.clone();
    let handle = spawn_controller(
        config.controller.clone(),
        bus.clone(),
        scenario.initial.clone(),
        |events| SimulatedAdapter::new(backend, Some(events)),
    );
    info!(controller = %handle.id(), "Controller started");

    tokio::select! {
        result = scenario.run(handle) => {
            result.context("Scenario run failed")?;
            info!("Scenario complete");
        }
        _ = signal::ctrl_c() => {
            // Dropping the handle unmounts the controller
            info!("Received Ctrl+C, stopping");
        }
    }

    // Printer exits once the controller task releases its bus clone
    drop(bus);
    printer.await.context("Event printer failed")?;
    Ok(())
}

/// `--log-level` beats `RUST_LOG`, which beats the config file
fn init_tracing(level: &str, forced: bool) {
    let fallback = format!("playsync_ctl={level},playsync_common={level}");
    let filter = if forced {
        tracing_subscriber::EnvFilter::new(fallback)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn print_events(mut rx: broadcast::Receiver<ControllerEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(envelope) if json => match serde_json::to_string(&envelope) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            },
            Ok(envelope) => println!(
                "{} {} {}",
                envelope
                    .timestamp
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                envelope.controller_id,
                describe(&envelope.event)
            ),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn describe(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::Duration { seconds } => format!("duration {:.3}s", seconds),
        PlayerEvent::Error { message } => format!("error: {}", message),
        other => other.name().to_string(),
    }
}
