//! bmc-sensors entry point: CLI dispatch, endpoint selection, table output.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use bmc_sensors::app::cli::{Args, HELP_TEXT};
use bmc_sensors::app::logging::{init_tracing, reload_level, resolve_level};
use bmc_sensors::config::load_config;
use bmc_sensors::config::types::{EndpointKind, MonitorConfig};
use bmc_sensors::hardware::types::SensorSnapshot;
use bmc_sensors::hardware::{BmcEndpoint, BmcSensorMonitor, EmulatorEndpoint};
use bmc_sensors::profiles::load_fixture;
use bmc_sensors::system::IpmitoolEndpoint;

fn print_snapshot(snapshot: &SensorSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot).context("Failed to serialize snapshot")?);
        return Ok(());
    }
    println!("--- {} (pass {}) ---", snapshot.timestamp, snapshot.pass);
    if snapshot.sensors.is_empty() {
        println!("no sensors");
    }
    for sensor in &snapshot.sensors {
        println!("{}", sensor);
    }
    Ok(())
}

fn build_endpoint(config: &MonitorConfig) -> Result<Arc<dyn BmcEndpoint>> {
    match config.endpoint.kind {
        EndpointKind::Emulator => {
            let path = config
                .endpoint
                .fixture
                .as_deref()
                .ok_or_else(|| anyhow!("Emulator endpoint needs a fixture (--fixture <path>)"))?;
            let fixture = load_fixture(Path::new(path))?;
            Ok(Arc::new(EmulatorEndpoint::from_fixture(&fixture)))
        }
        EndpointKind::Ipmitool => Ok(Arc::new(IpmitoolEndpoint)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{}", HELP_TEXT);
                std::process::exit(0);
            }
            if err.kind() == clap::error::ErrorKind::DisplayVersion {
                println!("bmc-sensors {} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
                std::process::exit(0);
            }
            eprintln!("{}", err);
            eprint!("{}", HELP_TEXT);
            std::process::exit(1);
        }
    };

    let env_level = std::env::var("LOG_LEVEL").ok();
    init_tracing(resolve_level(args.log_level.as_deref(), env_level.as_deref(), None));

    info!("bmc-sensors v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref()).await?;

    let level = resolve_level(
        args.log_level.as_deref(),
        env_level.as_deref(),
        Some(config.logging.level.as_str()),
    );
    if let Err(e) = reload_level(level) {
        warn!("{}", e);
    }

    if let Some(ms) = args.interval {
        config.reading.staleness_ms = ms;
        config.reading.tick_interval_ms = config.reading.tick_interval_ms.min(ms.max(1));
    }
    if let Some(path) = &args.fixture {
        config.endpoint.kind = EndpointKind::Emulator;
        config.endpoint.fixture = Some(path.display().to_string());
    }

    let endpoint = build_endpoint(&config)?;
    let monitor = BmcSensorMonitor::new(config, endpoint).spawn();
    let mut snapshots = monitor.subscribe();
    let mut printed_pass = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received (Ctrl+C)");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    error!("Sensor monitor exited unexpectedly");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.discovery_complete {
                    continue;
                }
                // an empty directory never produces a reading pass
                let nothing_to_read = snapshot.sensors.is_empty();
                if snapshot.pass > printed_pass || nothing_to_read {
                    printed_pass = snapshot.pass;
                    print_snapshot(&snapshot, args.json)?;
                    if args.once {
                        break;
                    }
                }
            }
        }
    }

    monitor.shutdown().await;
    info!("bmc-sensors stopped");
    Ok(())
}
