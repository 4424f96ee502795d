use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};
use log::{debug, error, info, warn};
use std::thread;
use std::time::Duration;

use super::{format_bytes, SerialTransport, StationError, Transport};
use crate::models::Observation;
use crate::protocol::{command_spec, Frame, FrameError};

const EOL: u8 = b'\r';

/// A reply longer than this without a `\r` is line noise.
const MAX_LINE: usize = 64;

/// Commands that put the station in a known state after the port opens.
const SETUP_COMMANDS: &[(&str, &str)] = &[
    ("EC", "echo clear"),
    ("LS", "linefeed set"),
    ("XCA", "auto transmit clear"),
    ("CWGH", "reset peak wind gust"),
];

/// Station epoch after a power loss is 1987; two-digit years above this are 19xx.
const CENTURY_PIVOT: u32 = 86;

/// # Heathkit ID-5001 Weather Computer
///
/// The station speaks a Hayes-style command set over a 9600 8N1 line. Every
/// request is `AT<command>\r` and every reply is one line ending in `\r`.
///
/// | Command       | Meaning                                     |
/// |---------------|---------------------------------------------|
/// | `EC`          | echo clear                                  |
/// | `LS`          | linefeed set                                |
/// | `XCA`         | auto transmit clear, station only answers polls |
/// | `CWGH`        | clear wind gust high                        |
/// | `RT` / `RD`   | read time `hhmmss` / date `yymmdd`          |
/// | `ST` / `SD`   | set time `SThhmmss` / date `SDyymmdd`       |
///
/// Reading commands and their reply frames are listed in [`crate::protocol`].
pub struct Station<T: Transport> {
    transport: T,
    debug_serial: bool,
    last_rain: Option<f64>,
}

impl Station<SerialTransport> {
    pub fn open(port: &str, debug_serial: bool) -> Result<Self, StationError> {
        debug!("open serial port {}", port);
        let transport = SerialTransport::open(port)?;
        Ok(Self::new(transport, debug_serial))
    }
}

impl<T: Transport> Station<T> {
    pub fn new(transport: T, debug_serial: bool) -> Self {
        Self {
            transport,
            debug_serial,
            last_rain: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Rain accumulator value at the last successful sweep, in inches.
    pub fn last_rain(&self) -> Option<f64> {
        self.last_rain
    }

    /// Puts the station in polling mode and seeds the rain baseline.
    pub fn initialize(&mut self) -> Result<(), StationError> {
        for (command, what) in SETUP_COMMANDS {
            debug!("{} (AT{})", what, command);
            self.send_tolerant(command)?;
        }

        self.last_rain = match self.read_frame("RR") {
            Ok(frame) => Some(frame.value()),
            Err(e) if e.is_transient() => {
                warn!("Could not read rain accumulator, first loop reports no rain: {}", e);
                None
            }
            Err(e) => return Err(e),
        };
        Ok(())
    }

    /// Sends `AT<command>\r` and returns the trimmed reply line.
    pub fn send_command(&mut self, command: &str) -> Result<String, StationError> {
        self.transport.clear_input()?;

        let request = format!("AT{}\r", command);
        if self.debug_serial {
            debug!("sent: {}", format_bytes(request.as_bytes()));
        }
        self.transport.write_all(request.as_bytes())?;
        self.transport.flush()?;

        self.read_line(command)
    }

    /// Like [`send_command`](Self::send_command) for commands whose reply
    /// carries nothing; a missing reply is not an error.
    fn send_tolerant(&mut self, command: &str) -> Result<(), StationError> {
        match self.send_command(command) {
            Ok(_) => Ok(()),
            Err(StationError::Timeout(_)) => {
                debug!("no reply to AT{}", command);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn read_line(&mut self, command: &str) -> Result<String, StationError> {
        let mut line = Vec::with_capacity(16);
        loop {
            match self.transport.read_byte()? {
                Some(EOL) => break,
                Some(b) if line.len() < MAX_LINE => line.push(b),
                Some(_) => {
                    debug!("overlong reply to AT{}: {}", command, format_bytes(&line));
                    return Err(StationError::MalformedFrame {
                        command: command.to_string(),
                        source: FrameError::TooLong(MAX_LINE),
                    });
                }
                None => {
                    if !line.is_empty() {
                        debug!("partial reply to AT{}: {}", command, format_bytes(&line));
                    }
                    return Err(StationError::Timeout(command.to_string()));
                }
            }
        }

        if self.debug_serial {
            debug!("recv: {}", format_bytes(&line));
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Sends a reading command and validates its reply frame.
    pub fn read_frame(&mut self, command: &str) -> Result<Frame, StationError> {
        let malformed = |source| StationError::MalformedFrame {
            command: command.to_string(),
            source,
        };
        let spec = command_spec(command).map_err(malformed)?;
        let line = self.send_command(command)?;
        Frame::decode(spec, &line).map_err(malformed)
    }

    /// One attempt at a full set of readings.
    ///
    /// Either every reply is valid and a complete observation comes back, or
    /// nothing does and the rain baseline is left untouched.
    pub fn sweep(&mut self) -> Result<Observation, StationError> {
        let in_temp = self.read_frame("RTI")?.value();
        let out_temp = self.read_frame("RTO")?.value();
        let in_humidity = self.read_frame("RHI")?.value();
        let out_humidity = self.read_frame("RHO")?.value();

        let wind = self.read_frame("RWA")?;
        let gust = self.read_frame("RWGH")?;
        self.send_tolerant("CWGH")?;

        let baro = self.read_frame("RB")?;
        // A zero barometer is a glitched reading.
        let barometer = (baro.raw("pressure") != Some(0)).then(|| baro.value());

        let rain_total = self.read_frame("RR")?.value();
        let rain_rate = self.read_frame("RRR")?.value();
        let wind_chill = self.read_frame("RWCA")?.value();

        let rain = match self.last_rain {
            Some(last) if rain_total >= last => rain_total - last,
            Some(last) => {
                info!(
                    "rain accumulator dropped from {:.2} to {:.2}, station was reset",
                    last, rain_total
                );
                0.0
            }
            None => 0.0,
        };
        self.last_rain = Some(rain_total);

        Ok(Observation {
            in_temp,
            out_temp,
            in_humidity,
            out_humidity,
            wind_speed: wind.value(),
            wind_dir: wind.direction().unwrap_or_default(),
            wind_gust: gust.value(),
            wind_gust_dir: gust.direction().unwrap_or_default(),
            barometer,
            rain,
            rain_rate,
            wind_chill,
        })
    }

    /// Sweeps until one succeeds, sleeping `retry_wait` between attempts.
    pub fn get_readings(
        &mut self,
        max_tries: u32,
        retry_wait: Duration,
    ) -> Result<Observation, StationError> {
        for attempt in 1..=max_tries {
            match self.sweep() {
                Ok(observation) => return Ok(observation),
                Err(e) if e.is_transient() => {
                    info!("Failed attempt {} of {} to get readings: {}", attempt, max_tries, e);
                    if attempt < max_tries {
                        thread::sleep(retry_wait);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        error!("Max retries ({}) exceeded for readings", max_tries);
        Err(StationError::RetriesExceeded(max_tries))
    }

    /// Reads the station clock, kept in local time.
    pub fn get_time(&mut self) -> Result<DateTime<Local>, StationError> {
        let time = self.read_number("RT")?;
        let date = self.read_number("RD")?;

        let ts = station_datetime(date, time).ok_or_else(|| StationError::MalformedFrame {
            command: "RD".to_string(),
            source: FrameError::Field {
                field: "date",
                text: format!("{:06} {:06}", date, time),
                frame: format!("{:06}", date),
            },
        })?;
        debug!("station date: {}, time: {}, ({})", date, time, ts);
        Ok(ts)
    }

    pub fn set_time(&mut self, ts: DateTime<Local>) -> Result<(), StationError> {
        let set_time = format!("ST{:02}{:02}{:02}", ts.hour(), ts.minute(), ts.second());
        debug!("set station time to {} ({})", ts, set_time);
        self.send_tolerant(&set_time)?;

        let set_date = format!("SD{:02}{:02}{:02}", ts.year() % 100, ts.month(), ts.day());
        debug!("set station date to {} ({})", ts, set_date);
        self.send_tolerant(&set_date)
    }

    fn read_number(&mut self, command: &str) -> Result<u32, StationError> {
        let line = self.send_command(command)?;
        line.parse().map_err(|_| StationError::MalformedFrame {
            command: command.to_string(),
            source: FrameError::Field {
                field: "number",
                text: line.clone(),
                frame: line.clone(),
            },
        })
    }

    pub fn close(self) -> T {
        self.transport
    }
}

/// Combines the station's `yymmdd` and `hhmmss` readings into a local time.
pub fn station_datetime(date: u32, time: u32) -> Option<DateTime<Local>> {
    let (yy, month, day) = (date / 10000, date / 100 % 100, date % 100);
    let (hour, minute, second) = (time / 10000, time / 100 % 100, time % 100);
    let year = if yy > CENTURY_PIVOT { 1900 + yy } else { 2000 + yy };

    let naive =
        NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, second)?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{line, MockStation, Reply};
    use chrono::NaiveDateTime;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn station(mock: MockStation) -> Station<MockStation> {
        Station::new(mock, true)
    }

    #[test]
    fn test_initialize_sends_setup_and_seeds_rain() {
        let mut station = station(MockStation::healthy());
        station.initialize().unwrap();

        assert_eq!(station.transport().sent, vec!["EC", "LS", "XCA", "CWGH", "RR"]);
        assert_eq!(station.last_rain(), Some(1.25));
    }

    #[test]
    fn test_initialize_tolerates_silent_station() {
        let mut station = station(MockStation::new());
        station.initialize().unwrap();
        assert_eq!(station.last_rain(), None);
    }

    #[test]
    fn test_send_command_trims_reply() {
        let mut mock = MockStation::new();
        mock.set("RT", line("\n123456 "));
        let mut station = station(mock);
        assert_eq!(station.send_command("RT").unwrap(), "123456");
    }

    #[test]
    fn test_partial_line_is_timeout() {
        let mut mock = MockStation::new();
        mock.set("RTO", Reply::Partial("T07".into()));
        let mut station = station(mock);
        assert!(matches!(
            station.read_frame("RTO"),
            Err(StationError::Timeout(ref c)) if c == "RTO"
        ));
    }

    #[test]
    fn test_line_noise_is_malformed() {
        let mut mock = MockStation::new();
        mock.set("RTO", Reply::Partial("x".repeat(100)));
        let mut station = station(mock);
        assert!(matches!(
            station.read_frame("RTO"),
            Err(StationError::MalformedFrame {
                source: FrameError::TooLong(MAX_LINE),
                ..
            })
        ));
    }

    #[test]
    fn test_sweep_decodes_all_readings() {
        let mut station = station(MockStation::healthy());
        station.initialize().unwrap();

        let obs = station.sweep().unwrap();
        assert!(close(obs.in_temp, 71.6));
        assert!(close(obs.out_temp, 45.0));
        assert!(close(obs.in_humidity, 40.0));
        assert!(close(obs.out_humidity, 85.0));
        assert!(close(obs.wind_speed, 10.0));
        assert!(close(obs.wind_dir, 270.0));
        assert!(close(obs.wind_gust, 25.0));
        assert!(close(obs.wind_gust_dir, 280.0));
        assert!(close(obs.barometer.unwrap(), 29.92));
        assert!(close(obs.rain, 0.0));
        assert!(close(obs.rain_rate, 0.10));
        assert!(close(obs.wind_chill, 41.0));

        // Gust high is cleared right after it is read.
        let sent = &station.transport().sent;
        let gust = sent.iter().rposition(|c| c == "RWGH").unwrap();
        assert_eq!(sent[gust + 1], "CWGH");
    }

    #[test]
    fn test_rain_delta_between_sweeps() {
        let mut mock = MockStation::healthy();
        mock.push("RR", line("R00125"))
            .push("RR", line("R00131"))
            .push("RR", line("R00002"));
        let mut station = station(mock);
        station.initialize().unwrap();

        assert!(close(station.sweep().unwrap().rain, 0.06));
        // Accumulator went backwards: station reset.
        assert!(close(station.sweep().unwrap().rain, 0.0));
        assert_eq!(station.last_rain(), Some(0.02));
    }

    #[test]
    fn test_first_sweep_without_baseline_reports_no_rain() {
        let mut station = station(MockStation::healthy());
        let obs = station.sweep().unwrap();
        assert_eq!(obs.rain, 0.0);
        assert_eq!(station.last_rain(), Some(1.25));
    }

    #[test]
    fn test_zero_barometer_is_dropped() {
        let mut mock = MockStation::healthy();
        mock.set("RB", line("B0000"));
        let mut station = station(mock);
        assert_eq!(station.sweep().unwrap().barometer, None);
    }

    #[test]
    fn test_corrupted_frame_yields_no_record() {
        let mut mock = MockStation::healthy();
        mock.push("RR", line("R00125"))
            .set("RR", line("R00200"))
            .set("RWCA", line(">cT0?1"));
        let mut station = station(mock);
        station.initialize().unwrap();

        let err = station.sweep().unwrap_err();
        assert!(matches!(
            err,
            StationError::MalformedFrame { ref command, .. } if command == "RWCA"
        ));
        // The failed sweep does not consume rain.
        assert_eq!(station.last_rain(), Some(1.25));
    }

    #[test]
    fn test_get_readings_retries_transient_errors() {
        let mut mock = MockStation::healthy();
        mock.push("RTI", Reply::Silence).push("RTI", line("t0x2"));
        let mut station = station(mock);

        let obs = station.get_readings(3, Duration::ZERO).unwrap();
        assert!(close(obs.in_temp, 71.6));
        assert_eq!(station.transport().count("RTI"), 3);
    }

    #[test]
    fn test_get_readings_gives_up() {
        let mut mock = MockStation::healthy();
        mock.set("RB", Reply::Silence);
        let mut station = station(mock);

        let err = station.get_readings(2, Duration::ZERO).unwrap_err();
        assert!(matches!(err, StationError::RetriesExceeded(2)));
        assert_eq!(station.transport().count("RB"), 2);
    }

    #[test]
    fn test_disconnect_is_fatal() {
        let mut mock = MockStation::healthy();
        mock.set("RHO", Reply::Disconnect);
        let mut station = station(mock);

        let err = station.get_readings(5, Duration::ZERO).unwrap_err();
        assert!(matches!(err, StationError::Disconnected(_)));
        assert_eq!(station.transport().count("RHO"), 1);
    }

    #[test]
    fn test_get_time() {
        let mut station = station(MockStation::healthy());
        let ts = station.get_time().unwrap();
        let expected =
            NaiveDateTime::parse_from_str("2024-03-15 12:34:56", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(ts.naive_local(), expected);
    }

    #[test]
    fn test_get_time_rejects_garbage() {
        let mut mock = MockStation::healthy();
        mock.set("RD", line("24-03-15"));
        let mut station = station(mock);
        assert!(matches!(station.get_time(), Err(StationError::MalformedFrame { .. })));
    }

    #[test]
    fn test_set_time_commands() {
        let mut station = station(MockStation::new());
        let ts = Local.with_ymd_and_hms(2023, 7, 4, 9, 5, 3).earliest().unwrap();
        station.set_time(ts).unwrap();
        assert_eq!(station.transport().sent, vec!["ST090503", "SD230704"]);
    }

    #[test]
    fn test_station_datetime_century() {
        let old = station_datetime(870101, 0).unwrap();
        assert_eq!(old.year(), 1987);
        let new = station_datetime(860101, 0).unwrap();
        assert_eq!(new.year(), 2086);
        assert!(station_datetime(241301, 0).is_none());
        assert!(station_datetime(240101, 250000).is_none());
    }
}
