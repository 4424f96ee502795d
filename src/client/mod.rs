use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::FrameError;

pub mod id5001;
#[cfg(test)]
pub(crate) mod mock;

pub use id5001::Station;

pub const BAUD_RATE: u32 = 9600;
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StationError {
    #[error("Failed to open serial port {port}: {source}")]
    DeviceOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Invalid station configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Timed out waiting for reply to AT{0}")]
    Timeout(String),

    #[error("Malformed reply to AT{command}: {source}")]
    MalformedFrame {
        command: String,
        #[source]
        source: FrameError,
    },

    #[error("Station disconnected: {0}")]
    Disconnected(#[from] io::Error),

    #[error("Max retries ({0}) exceeded for readings")]
    RetriesExceeded(u32),
}

impl StationError {
    /// Errors that only cost the current cycle; everything else ends the loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StationError::Timeout(_)
                | StationError::MalformedFrame { .. }
                | StationError::RetriesExceeded(_)
        )
    }
}

/// Byte-level link to the station.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Reads one byte, or `None` when the read timeout expired first.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Discards anything the station sent that has not been read yet.
    fn clear_input(&mut self) -> io::Result<()>;
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens `port_name` at 9600 baud, 8N1, without flow control.
    pub fn open(port_name: &str) -> Result<Self, StationError> {
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| StationError::DeviceOpen {
                port: port_name.to_string(),
                source,
            })?;

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Hex dump of serial traffic, e.g. `41 54 52 54 0D`.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
