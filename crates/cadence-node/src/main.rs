//! cadence node entry point.

use cadence_core::Context;
use cadence_node::{Config, MonitorNode};
use eyre::{Result, WrapErr, bail};
use std::{
    env,
    sync::{Arc, atomic::AtomicBool},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(config_file) = env::args().nth(1) else {
        bail!(
            "A configuration file is required.\n\
             Usage: cadence-node /path/to/config.yaml"
        );
    };

    info!(config_file = %config_file, "Loading configuration");
    let mut config = Config::load(&config_file)?;

    if simulation_from_env()? {
        config.submaster.simulation = true;
    }

    info!(
        services = config.submaster.services.len(),
        publishers = config.publishers.len(),
        tick = ?config.tick,
        run_for = ?config.run_for,
        simulation = config.submaster.simulation,
        "Configuration loaded"
    );

    let ctx = Context::new();
    let node = MonitorNode::new(&ctx, config)?;
    let report = node.run(Arc::new(AtomicBool::new(false)))?;

    info!(
        frame = report.frame,
        healthy = report.healthy(),
        "cadence node shutting down"
    );
    Ok(())
}

/// `SIMULATION` is read as an integer; unset means off.
fn simulation_from_env() -> Result<bool> {
    match env::var("SIMULATION") {
        Ok(value) => {
            let value: i64 = value
                .trim()
                .parse()
                .wrap_err_with(|| format!("SIMULATION must be an integer, got '{value}'"))?;
            Ok(value != 0)
        }
        Err(env::VarError::NotPresent) => Ok(false),
        Err(err) => Err(err).wrap_err("Failed to read SIMULATION"),
    }
}
