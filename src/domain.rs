use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// feature columns in the exact order the forecaster was trained on.
/// scaling and inference are positional, so this order is load-bearing.
pub const FEATURE_COLUMNS: [&str; 15] = [
    "temp",
    "humidity",
    "pressure",
    "rain_analog",
    "light_intensity",
    "aqi",
    "precipitation",
    "hour",
    "day_of_week",
    "month",
    "day_of_year",
    "hour_sin",
    "hour_cos",
    "month_sin",
    "month_cos",
];

/// predicted quantities, one column each in the forecaster output
pub const TARGET_COLUMNS: [&str; 3] = ["temp", "precipitation", "aqi"];

pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();
pub const TARGET_COUNT: usize = TARGET_COLUMNS.len();

/// full scale of the rain sensor's 10-bit adc
pub const RAIN_ADC_MAX: f64 = 1023.0;

/// one decoded frame from the sensor board
///
/// only the fields the forecaster consumes are required. the gas channels
/// and the digital rain flag are typed optionals, and any other key the
/// board sends lands in `extra`. all of it is forwarded to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// temperature in celsius (the bench generator calls it "temperature")
    #[serde(alias = "temperature")]
    pub temp: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// pressure in hPa
    pub pressure: f64,
    /// raw rain sensor adc value (0 = soaked, 1023 = dry)
    pub rain_analog: f64,
    /// light sensor adc value
    pub light_intensity: f64,
    /// air quality index 0-500
    pub aqi: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain_detected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nh3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alcohol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lpg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ch4: Option<f64>,

    /// sensor fields this host does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// model input row, laid out as FEATURE_COLUMNS
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

/// one future step of a forecast
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastPoint {
    /// wall-clock instant this point forecasts
    #[serde(skip)]
    pub at: NaiveDateTime,
    /// "HH:00" label shown on the dashboard cards
    pub time: String,
    /// celsius, rounded to 0.1
    pub temp: f64,
    /// chance of rain in percent, rounded to 0.1
    pub precipitation: f64,
    pub aqi: i64,
}

/// ordered forecast, strictly increasing in time
pub type ForecastBatch = Vec<ForecastPoint>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// snapshot shared between the ingestion worker (writes) and the web server (reads)
pub type SharedState = Arc<RwLock<PipelineSnapshot>>;

/// pipeline state exposed on /api
#[derive(Clone, Debug, Default, Serialize)]
pub struct PipelineSnapshot {
    pub connection: ConnectionState,
    pub window_len: usize,
    pub window_capacity: usize,
    pub latest_reading: Option<RawReading>,
    pub latest_forecast: Option<ForecastBatch>,
    /// unix timestamp (ms) of the last processed reading
    pub last_update: u64,
    pub readings_processed: u64,
    pub decode_failures: u64,
    pub inference_failures: u64,
    pub subscribers: usize,
}
