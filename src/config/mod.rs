use anyhow::{Context, Result};
use config::{Config, File};
use log::{debug, info, LevelFilter};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_CONFIG_FILE: &str = "id5001.conf";

/// Longest accepted loop interval, one day.
pub const MAX_LOOP_INTERVAL: f64 = 86_400.0;

/// Module path the host uses to select this driver.
pub const DRIVER_SELECTOR: &str = "weewx.drivers.id5001";

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_model() -> String {
    "ID5001".to_string()
}

fn default_loop_interval() -> f64 {
    5.0
}

fn default_max_tries() -> u32 {
    5
}

fn default_retry_wait() -> u64 {
    5
}

fn default_driver() -> String {
    DRIVER_SELECTOR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no serial port configured")]
    EmptyPort,

    #[error("loop_interval must be between 0 and 86400 seconds, got {0}")]
    LoopInterval(f64),

    #[error("max_tries must be at least 1")]
    MaxTries,

    #[error("section selects driver {0:?}, expected one ending in id5001")]
    Driver(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct StationConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_loop_interval")]
    pub loop_interval: f64,
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    #[serde(default = "default_retry_wait")]
    pub retry_wait: u64,
    #[serde(default)]
    pub debug_serial: bool,
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            model: default_model(),
            loop_interval: default_loop_interval(),
            max_tries: default_max_tries(),
            retry_wait: default_retry_wait(),
            debug_serial: false,
            driver: default_driver(),
        }
    }
}

impl StationConfig {
    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs_f64(self.loop_interval)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }
        if !(0.0..=MAX_LOOP_INTERVAL).contains(&self.loop_interval) {
            return Err(ConfigError::LoopInterval(self.loop_interval));
        }
        if self.max_tries == 0 {
            return Err(ConfigError::MaxTries);
        }
        let module = self.driver.rsplit('.').next().unwrap_or_default();
        if !module.eq_ignore_ascii_case("id5001") {
            return Err(ConfigError::Driver(self.driver.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(rename = "ID5001", alias = "id5001", default)]
    pub station: StationConfig,
    #[serde(rename = "LOGGING", alias = "logging", default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_FILE)
    }

    pub fn get_log_level(&self) -> LevelFilter {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            "off" => LevelFilter::Off,
            _ => LevelFilter::Info, // Default to Info if invalid
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        debug!("Loading configuration from {}", config_path.display());

        let config = Config::builder()
            .add_source(File::from(config_path).format(config::FileFormat::Ini))
            .build()
            .context(format!("Failed to load config from {}", config_path.display()))?;

        let app_config: AppConfig = config.try_deserialize()
            .context("Failed to deserialize config")?;

        Ok(app_config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_path = path.as_ref();
        let station = &self.station;

        let config_str = format!(
            "[ID5001]\nport = {}\nmodel = {}\nloop_interval = {}\nmax_tries = {}\nretry_wait = {}\ndebug_serial = {}\ndriver = {}\n\n[LOGGING]\nlevel = {}\n",
            station.port,
            station.model,
            station.loop_interval,
            station.max_tries,
            station.retry_wait,
            station.debug_serial,
            station.driver,
            self.logging.level
        );

        fs::write(config_path, config_str)
            .context(format!("Failed to save config to {}", config_path.display()))?;

        info!("Configuration saved to {}", config_path.display());
        Ok(())
    }
}

/// The configuration section a fresh install starts from.
pub fn default_stanza() -> String {
    format!(
        "[ID5001]
# This section is for the Heathkit ID-5001 weather station

# Serial port where the station is attached
port = {}

model = ID5001

# Interval between pollings of the station.
loop_interval = 5.0

# The driver to use:
driver = {}
",
        DEFAULT_PORT, DRIVER_SELECTOR
    )
}
