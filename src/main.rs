//! Minimal command-line front end: acquire and report to the log.
//!
//! Usage: `serial_daq [--sim] [config.toml]`. With `--sim` the engine runs
//! against the simulated source; otherwise it opens the configured port.
//! Latest values per channel are logged every two seconds until the
//! process is killed or the session errors out.

use anyhow::{bail, Context, Result};
use log::{error, info};
use serial_daq::config::AcquisitionConfig;
use serial_daq::core::{Channel, ConnectionState};
use serial_daq::AcquisitionEngine;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut simulate = false;
    let mut config_path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--sim" => simulate = true,
            path if !path.starts_with('-') => config_path = Some(PathBuf::from(path)),
            other => bail!("unknown argument '{other}'"),
        }
    }

    let cfg = AcquisitionConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;
    let mut engine = AcquisitionEngine::new(cfg)?;

    if simulate {
        engine.start_simulated()?;
    } else {
        engine.start().context("failed to start acquisition")?;
    }

    loop {
        thread::sleep(Duration::from_secs(2));
        if engine.state() == ConnectionState::Error {
            error!(
                "acquisition failed: {}",
                engine.last_error().unwrap_or_else(|| "unknown".to_string())
            );
            engine.stop();
            bail!("session ended in error");
        }
        for channel in Channel::ALL {
            let readings = engine.snapshot(channel);
            if let Some(last) = readings.last() {
                info!(
                    "{channel}: {:.2} {} ({} in window)",
                    last.value,
                    channel.unit(),
                    readings.len()
                );
            }
        }
    }
}
