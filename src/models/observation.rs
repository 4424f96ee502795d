use serde::Serialize;

/// One sweep of station readings, in US units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub in_temp: f64,
    pub out_temp: f64,
    pub in_humidity: f64,
    pub out_humidity: f64,
    pub wind_speed: f64,
    pub wind_dir: f64,
    pub wind_gust: f64,
    pub wind_gust_dir: f64,
    pub barometer: Option<f64>,
    pub rain: f64,
    pub rain_rate: f64,
    #[serde(rename = "windchill")]
    pub wind_chill: f64,
}

impl Default for Observation {
    fn default() -> Self {
        Self {
            in_temp: 0.0,
            out_temp: 0.0,
            in_humidity: 0.0,
            out_humidity: 0.0,
            wind_speed: 0.0,
            wind_dir: 0.0,
            wind_gust: 0.0,
            wind_gust_dir: 0.0,
            barometer: None,
            rain: 0.0,
            rain_rate: 0.0,
            wind_chill: 0.0,
        }
    }
}
