use indexmap::IndexMap;
use serde::Serialize;

use crate::protocol::units::US_UNITS;

pub mod observation;

pub use observation::Observation;

/// A loop packet as handed to the host ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopPacket {
    #[serde(rename = "dateTime")]
    pub date_time: i64,
    #[serde(rename = "usUnits")]
    pub us_units: u8,
    #[serde(flatten)]
    pub observation: Observation,
}

impl LoopPacket {
    pub fn new(date_time: i64, observation: Observation) -> Self {
        Self {
            date_time,
            us_units: US_UNITS,
            observation,
        }
    }

    /// Observation values keyed by the host's schema names, in sweep order.
    pub fn fields(&self) -> IndexMap<&'static str, Option<f64>> {
        let obs = &self.observation;
        IndexMap::from([
            ("inTemp", Some(obs.in_temp)),
            ("outTemp", Some(obs.out_temp)),
            ("inHumidity", Some(obs.in_humidity)),
            ("outHumidity", Some(obs.out_humidity)),
            ("windSpeed", Some(obs.wind_speed)),
            ("windDir", Some(obs.wind_dir)),
            ("windGust", Some(obs.wind_gust)),
            ("windGustDir", Some(obs.wind_gust_dir)),
            ("barometer", obs.barometer),
            ("rain", Some(obs.rain)),
            ("rainRate", Some(obs.rain_rate)),
            ("windchill", Some(obs.wind_chill)),
        ])
    }
}
