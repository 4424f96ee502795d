use chrono::{DateTime, Local, Utc};
use log::{error, info, warn};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crate::client::{SerialTransport, Station, StationError, Transport};
use crate::config::{AppConfig, StationConfig};
use crate::models::LoopPacket;

pub const DRIVER_NAME: &str = "ID5001";
pub const DRIVER_VERSION: &str = "0.1";

pub type LoopItem = Result<LoopPacket, StationError>;

/// Lifecycle a host framework drives a station through.
pub trait Driver {
    fn hardware_name(&self) -> &str;

    /// Endless stream of loop packets, one item per loop interval.
    ///
    /// A cycle without a packet yields a transient error (see
    /// [`StationError::is_transient`]); the stream carries on after it.
    fn gen_loop_packets(&mut self) -> Box<dyn Iterator<Item = LoopItem> + '_>;

    fn get_time(&mut self) -> DateTime<Local>;

    fn set_time(&mut self) -> Result<(), StationError>;

    fn close_port(&mut self);
}

/// Opens the configured serial port and returns an initialised driver.
pub fn loader(config: &AppConfig) -> Result<Id5001Driver<SerialTransport>, StationError> {
    Id5001Driver::new(&config.station)
}

fn port_closed() -> StationError {
    StationError::Disconnected(io::Error::new(
        io::ErrorKind::NotConnected,
        "serial port is closed",
    ))
}

pub struct Id5001Driver<T: Transport> {
    model: String,
    loop_interval: Duration,
    max_tries: u32,
    retry_wait: Duration,
    station: Option<Station<T>>,
}

impl Id5001Driver<SerialTransport> {
    pub fn new(config: &StationConfig) -> Result<Self, StationError> {
        config.validate()?;
        info!("driver version is {}", DRIVER_VERSION);
        info!("using serial port {}", config.port);
        let station = Station::open(&config.port, config.debug_serial)?;
        Self::with_station(config, station)
    }
}

impl<T: Transport> Id5001Driver<T> {
    /// Wraps an already opened station and puts it in polling mode.
    pub fn with_station(
        config: &StationConfig,
        mut station: Station<T>,
    ) -> Result<Self, StationError> {
        config.validate()?;
        station.initialize()?;
        Ok(Self {
            model: config.model.clone(),
            loop_interval: config.loop_interval(),
            max_tries: config.max_tries,
            retry_wait: config.retry_wait(),
            station: Some(station),
        })
    }

    pub fn station(&self) -> Option<&Station<T>> {
        self.station.as_ref()
    }

    pub fn loop_packets(&mut self) -> LoopPackets<'_, T> {
        LoopPackets {
            station: self.station.as_mut(),
            loop_interval: self.loop_interval,
            max_tries: self.max_tries,
            retry_wait: self.retry_wait,
            last_sweep: Instant::now(),
            done: false,
        }
    }
}

impl<T: Transport> Driver for Id5001Driver<T> {
    fn hardware_name(&self) -> &str {
        &self.model
    }

    fn gen_loop_packets(&mut self) -> Box<dyn Iterator<Item = LoopItem> + '_> {
        Box::new(self.loop_packets())
    }

    /// Station clock, or the host clock when the station cannot be read.
    fn get_time(&mut self) -> DateTime<Local> {
        let result = match self.station.as_mut() {
            Some(station) => station.get_time(),
            None => Err(port_closed()),
        };
        result.unwrap_or_else(|e| {
            error!("get_time failed: {}", e);
            Local::now()
        })
    }

    fn set_time(&mut self) -> Result<(), StationError> {
        let station = self.station.as_mut().ok_or_else(port_closed)?;
        station.set_time(Local::now())
    }

    fn close_port(&mut self) {
        if let Some(station) = self.station.take() {
            info!("closing serial port");
            drop(station.close());
        }
    }
}

/// Iterator behind [`Driver::gen_loop_packets`].
///
/// Waits out the loop interval before each sweep and yields once per cycle.
/// A cycle whose sweep fails on timeouts or malformed replies yields that
/// transient error and the next call polls again. A fatal error is yielded
/// once and ends the iteration.
pub struct LoopPackets<'a, T: Transport> {
    station: Option<&'a mut Station<T>>,
    loop_interval: Duration,
    max_tries: u32,
    retry_wait: Duration,
    last_sweep: Instant,
    done: bool,
}

impl<'a, T: Transport> Iterator for LoopPackets<'a, T> {
    type Item = LoopItem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(station) = self.station.as_deref_mut() else {
            self.done = true;
            return Some(Err(port_closed()));
        };

        let wake = self.last_sweep + self.loop_interval;
        let now = Instant::now();
        if wake > now {
            thread::sleep(wake - now);
        }

        let result = station.get_readings(self.max_tries, self.retry_wait);
        // Stamped after the sweep, retries included.
        self.last_sweep = Instant::now();

        match result {
            Ok(observation) => Some(Ok(LoopPacket::new(Utc::now().timestamp(), observation))),
            Err(e) if e.is_transient() => {
                warn!("No loop packet this cycle: {}", e);
                Some(Err(e))
            }
            Err(e) => {
                error!("Loop stopped: {}", e);
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
