pub mod cli;
pub mod client;
pub mod config;
pub mod driver;
pub mod models;
pub mod protocol;

use crate::cli::Options;
use crate::config::AppConfig;
use crate::driver::{Driver, DRIVER_NAME};
use anyhow::Context;
use log::{debug, error, info};

/// Runs the driver standalone: loads it from `config` and prints loop
/// packets as JSON lines until the station goes away or `--count` is reached.
pub fn run(config: &AppConfig, options: &Options) -> anyhow::Result<()> {
    info!("Starting {} driver", DRIVER_NAME);

    match main_loop(config, options) {
        Ok(_) => info!("Driver completed successfully"),
        Err(e) => {
            error!("Driver error: {e:#}");
            // Print chain of error causes
            let mut source = e.source();
            while let Some(e) = source {
                error!("Caused by: {e}");
                source = e.source();
            }
            return Err(e).context("Driver failed to run");
        }
    }

    Ok(())
}

fn main_loop(config: &AppConfig, options: &Options) -> anyhow::Result<()> {
    let mut driver = driver::loader(config).context("Failed to load station driver")?;
    info!("Connected to {}", driver.hardware_name());

    if options.get_time || options.set_time {
        if options.set_time {
            driver.set_time().context("Failed to set station clock")?;
        }
        println!("{}", driver.get_time().format("%Y-%m-%d %H:%M:%S %Z"));
        driver.close_port();
        return Ok(());
    }

    let limit = options.count.unwrap_or(usize::MAX);
    let result = print_packets(&mut driver, limit);

    driver.close_port();
    result
}

/// Prints up to `limit` packets as JSON lines, skipping cycles that produced
/// none. Stops at the first fatal error.
fn print_packets<D: Driver>(driver: &mut D, limit: usize) -> anyhow::Result<()> {
    if limit == 0 {
        return Ok(());
    }
    let mut printed = 0;
    for item in driver.gen_loop_packets() {
        match item {
            Ok(packet) => {
                debug!("loop packet {:?}", packet.fields());
                println!("{}", serde_json::to_string(&packet)?);
                printed += 1;
                if printed == limit {
                    break;
                }
            }
            Err(e) if e.is_transient() => debug!("skipped loop cycle: {}", e),
            Err(e) => return Err(e).context("Station stopped answering"),
        }
    }
    Ok(())
}
