// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Liftstation - pump station supervisory controller
//!
//! Runs the control loop against simulated I/O modules and a simulated
//! booster plant. Hardware drivers plug in through the `io` module traits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use liftstation::io::{AnalogBank, DigitalBank, IoModules, PlantConfig, PlantSimulator};
use liftstation::station::TICK_PERIOD;
use liftstation::{
    assemble, Config, ConfigStore, MemoryStore, SqliteStore, StationUpdate, StationWarning, NAME,
    VERSION,
};

/// Liftstation - lead-lag pump station controller
#[derive(Parser, Debug)]
#[command(name = "liftstation")]
#[command(version = VERSION)]
#[command(about = "Supervisory controller for multi-pump lift and booster stations")]
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

    /// Demo mode with a simulated plant
    #[arg(long)]
    demo: bool,

    /// Config store database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Run this many control ticks, then exit
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> Result<()> {
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
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{}", NAME, VERSION);

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    if args.demo {
        config.demo_mode = true;
    }
    if let Some(db) = args.db {
        config.storage.path = db;
        config.storage.in_memory = false;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    if !config.demo_mode {
        warn!("No hardware I/O drivers are built in; running the simulated plant");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.ticks))
}

fn open_store(config: &Config) -> Result<Arc<dyn ConfigStore>> {
    if config.storage.in_memory {
        info!("Using in-memory config store");
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(SqliteStore::open(&config.storage.path)?))
    }
}

/// Simulated modules sized to the configured wiring
fn simulated_io(config: &Config) -> (DigitalBank, DigitalBank, AnalogBank) {
    let wiring = &config.io;
    let di_count = wiring
        .systems
        .iter()
        .flat_map(|s| [s.di_running, s.di_hand, s.di_auto])
        .chain(std::iter::once(wiring.di_emergency_stop))
        .max()
        .map_or(0, |m| m + 1);
    let do_count = wiring.systems.iter().map(|s| s.do_run + 1).max().unwrap_or(0);
    let ai_count = std::iter::once(wiring.ai_primary_sensor)
        .chain(wiring.ai_secondary_sensor)
        .max()
        .map_or(1, |m| m + 1);

    (
        DigitalBank::new("sim-di", 0, di_count),
        DigitalBank::new("sim-do", 0, do_count),
        AnalogBank::new("sim-ai", 0, ai_count, config.sensor.ai_max),
    )
}

async fn run(config: Config, ticks: Option<u64>) -> Result<()> {
    let store = open_store(&config)?;
    let (di, dout, ai) = simulated_io(&config);

    // Start the header at the set-point
    let sensor = &config.sensor;
    let span = (sensor.value_scaled_max - sensor.value_scaled_min).abs().max(f64::EPSILON);
    let fraction = ((config.settings.set_point - sensor.value_scaled_min) / span).clamp(0.0, 1.0);
    let full_scale = (sensor.ai_max - sensor.ai_min) as f64;
    ai.set(
        config.io.ai_primary_sensor,
        sensor.ai_min + (fraction * full_scale).round() as i32,
    );

    let plant = PlantSimulator::new(
        PlantConfig {
            pumps: config
                .io
                .systems
                .iter()
                .map(|s| (s.do_run, s.di_running))
                .collect(),
            pressure_ai: config.io.ai_primary_sensor,
            demand_per_sec: full_scale * 0.02,
            boost_per_pump_sec: full_scale * 0.015,
            noise: full_scale * 0.002,
            dead_pumps: Vec::new(),
        },
        di.clone(),
        dout.clone(),
        ai.clone(),
    );

    let modules = IoModules {
        digital_inputs: vec![Box::new(di)],
        digital_outputs: vec![Box::new(dout)],
        analog_inputs: vec![Box::new(ai)],
        analog_outputs: vec![],
    };
    let station = assemble(&config, store, modules)?;

    station.dispatcher().subscribe(|update: &StationUpdate| {
        let status = &update.0;
        tracing::debug!(
            "Header {:.1}, {} running, alarm {}",
            status.primary_sensor.value_scaled,
            status.running_count(),
            status.has_alarm()
        );
        Ok(())
    });
    station.dispatcher().subscribe(|warning: &StationWarning| {
        info!("Operator warning: {}", warning.message);
        Ok(())
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let plant_task = tokio::spawn(plant.run(Duration::from_millis(100), shutdown_rx));

    station.start()?;
    info!("Station running, press Ctrl+C to shutdown");

    match ticks {
        Some(n) => {
            while station.tick_count() < n {
                tokio::time::sleep(TICK_PERIOD / 5).await;
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutting down...");
    station.shutdown().await;
    let _ = shutdown_tx.send(true);
    plant_task.await?;

    let status = station.status(std::time::Instant::now());
    info!("Final state:\n{}", serde_json::to_string_pretty(&status)?);
    info!("{} shutdown complete", NAME);

    Ok(())
}
