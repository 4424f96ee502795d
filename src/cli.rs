use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

use crate::config::AppConfig;

pub const USAGE: &str = "Usage: id5001 [options]

Options:
  --help                 show this message
  --version              display driver version
  --debug                provide additional debug output in log
  --config PATH          configuration file (default: id5001.conf)
  --port PORT            serial port to which the station is connected
  --loop-interval SECS   interval in seconds between polling the station
  --count N              stop after N loop packets
  --stanza               print the default configuration section
  --get-time             print the station clock and exit
  --set-time             set the station clock to the host clock and exit";

#[derive(Debug, Default, PartialEq)]
pub struct Options {
    pub help: bool,
    pub version: bool,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub port: Option<String>,
    pub loop_interval: Option<f64>,
    pub count: Option<usize>,
    pub stanza: bool,
    pub get_time: bool,
    pub set_time: bool,
}

impl Options {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Options::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg.clone(), None),
            };
            let mut value = |name: &str| {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| anyhow!("{} requires a value", name))
            };

            match flag.as_str() {
                "-h" | "--help" => options.help = true,
                "--version" => options.version = true,
                "--debug" => options.debug = true,
                "--stanza" => options.stanza = true,
                "--get-time" => options.get_time = true,
                "--set-time" => options.set_time = true,
                "--config" => options.config = Some(PathBuf::from(value("--config")?)),
                "--port" => options.port = Some(value("--port")?),
                "--loop-interval" | "--loop_interval" => {
                    let secs = value("--loop-interval")?;
                    options.loop_interval = Some(
                        secs.parse()
                            .with_context(|| format!("Invalid loop interval {:?}", secs))?,
                    );
                }
                "--count" => {
                    let n = value("--count")?;
                    options.count =
                        Some(n.parse().with_context(|| format!("Invalid count {:?}", n))?);
                }
                other => bail!("Unknown option {}\n\n{}", other, USAGE),
            }
        }

        Ok(options)
    }

    /// Command-line settings take precedence over the configuration file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.station.port = port.clone();
        }
        if let Some(secs) = self.loop_interval {
            config.station.loop_interval = secs;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        Options::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_args() {
        assert_eq!(parse(&[]).unwrap(), Options::default());
    }

    #[test]
    fn test_flags_and_values() {
        let options = parse(&[
            "--debug",
            "--port",
            "/dev/ttyS0",
            "--loop-interval=2.5",
            "--count",
            "3",
            "--config",
            "station.conf",
        ])
        .unwrap();

        assert!(options.debug);
        assert_eq!(options.port.as_deref(), Some("/dev/ttyS0"));
        assert_eq!(options.loop_interval, Some(2.5));
        assert_eq!(options.count, Some(3));
        assert_eq!(options.config, Some(PathBuf::from("station.conf")));
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--port"]).is_err());
        assert!(parse(&["--loop-interval", "soon"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let options =
            parse(&["--port", "/dev/ttyACM1", "--loop_interval", "1", "--debug"]).unwrap();
        let mut config = AppConfig::default();
        options.apply(&mut config);

        assert_eq!(config.station.port, "/dev/ttyACM1");
        assert_eq!(config.station.loop_interval, 1.0);
        assert_eq!(config.logging.level, "debug");
    }
}
