//!
//! Runs the positioner against simulated motors: calibrates, then drives
//! through the given waypoints on a real-time control loop, logging progress.
//!

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spoolcore::controller::{Controller, SharedController};
use spoolcore::driver::sim::SimulatedDriver;
use spoolcore::hardware::MachineConfig;
use spoolcore::lengths::{Position, Tangential};

#[derive(Parser, Debug)]
#[command(about = "Drive a simulated two-cable positioner through waypoints")]
struct Args {
    /// Machine configuration JSON; defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Measured left tangential length at startup, inches
    #[arg(long, default_value_t = 30.)]
    left: f64,

    /// Measured right tangential length at startup, inches
    #[arg(long, default_value_t = 30.)]
    right: f64,

    /// Waypoints as `x,y` in inches from the calibrated origin
    #[arg(value_parser = parse_point)]
    waypoints: Vec<Position>,
}

fn parse_point(text: &str) -> Result<Position, String> {
    let (x, y) = text.split_once(',').ok_or_else(|| format!("expected `x,y`, got `{}`", text))?;
    let x: f64 = x.trim().parse().map_err(|err| format!("bad x `{}`: {}", x, err))?;
    let y: f64 = y.trim().parse().map_err(|err| format!("bad y `{}`: {}", y, err))?;

    Ok(Position::new(x, y))
}

///
/// The control loop: advances the simulated motors by one period, then ticks
/// the controller, forever.
///
async fn control_loop(controller: SharedController<SimulatedDriver>) {
    let period = controller.lock().await.config().control_period();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut controller = controller.lock().await;
        controller.driver_mut().advance(period);
        if let Err(err) = controller.tick().await {
            error!("control tick failed: {}", err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    let config = Arc::new(config);
    info!("baseline {} in, spool radius {:.4} in, grid speed {:.3} in/s", config.width(), config.spool_radius(), config.max_grid_speed());

    let mut controller = Controller::new(Arc::clone(&config), SimulatedDriver::new(Arc::clone(&config)));
    controller.calibrate_hard(Tangential::new(args.left, args.right))?;
    let controller = controller.into_shared();

    let looping = tokio::spawn(control_loop(Arc::clone(&controller)));
    let mut poll = interval(config.control_period());

    for waypoint in args.waypoints {
        if let Err(err) = controller.lock().await.move_to(waypoint).await {
            error!("skipping {}: {}", waypoint, err);
            continue;
        }

        loop {
            tokio::select! {
                _ = poll.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    looping.abort();
                    return Ok(());
                }
            }

            let controller = controller.lock().await;
            if !controller.track_state().is_tracking() {
                info!("at {} (read-back {})", controller.current_position()?, controller.observed_position()?);
                break;
            }
        }
    }

    looping.abort();
    Ok(())
}
