//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use forecast_host::broadcast::{Broadcaster, Event, Subscription};
use forecast_host::domain::{SharedState, FEATURE_COUNT, TARGET_COUNT};
use forecast_host::error::InferenceError;
use forecast_host::gate::InferenceGate;
use forecast_host::ingest::IngestionLoop;
use forecast_host::model::{ForecastModel, Forecaster, MinMaxScaler};
use forecast_host::window::SlidingWindow;
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// column indices in FEATURE_COLUMNS
const TEMP: usize = 0;
const AQI: usize = 5;
const PRECIPITATION: usize = 6;

/// repeats the newest reading for every step, and fails on chosen calls (1-based)
pub struct FlakyForecaster {
    lookback: usize,
    horizon: usize,
    calls: AtomicUsize,
    fail_on: Vec<usize>,
}

impl Forecaster for FlakyForecaster {
    fn lookback(&self) -> usize {
        self.lookback
    }

    fn horizon(&self) -> usize {
        self.horizon
    }

    fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    fn target_count(&self) -> usize {
        TARGET_COUNT
    }

    fn predict(&self, scaled: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(InferenceError::Backend(format!("injected failure on call {call}")));
        }
        let last = scaled.row(scaled.nrows() - 1);
        let row = [last[TEMP], last[PRECIPITATION], last[AQI]];
        Ok(Array2::from_shape_fn((self.horizon, TARGET_COUNT), |(_, c)| row[c]))
    }
}

pub fn model(lookback: usize, horizon: usize, fail_on: &[usize]) -> Arc<ForecastModel> {
    let identity = |width: usize| {
        Box::new(MinMaxScaler::new(vec![0.0; width], vec![1.0; width]).unwrap())
    };
    let forecaster = FlakyForecaster {
        lookback,
        horizon,
        calls: AtomicUsize::new(0),
        fail_on: fail_on.to_vec(),
    };
    Arc::new(
        ForecastModel::new(identity(FEATURE_COUNT), Box::new(forecaster), identity(TARGET_COUNT))
            .unwrap(),
    )
}

pub fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, 4).unwrap().and_hms_opt(10, 42, 0).unwrap()
}

pub struct Harness {
    pub pipeline: IngestionLoop,
    pub broadcaster: Broadcaster,
    pub state: SharedState,
    pub window: Arc<SlidingWindow>,
}

pub fn harness(capacity: usize, horizon: usize, display_limit: usize, fail_on: &[usize]) -> Harness {
    let window = Arc::new(SlidingWindow::new(capacity).unwrap());
    let gate = InferenceGate::new(model(capacity, horizon, fail_on), capacity, display_limit, 2).unwrap();
    let broadcaster = Broadcaster::new(256);
    let state = SharedState::default();
    let pipeline = IngestionLoop::new(
        window.clone(),
        gate,
        broadcaster.clone(),
        state.clone(),
        Duration::ZERO,
    )
    .with_clock(Box::new(fixed_time));
    Harness {
        pipeline,
        broadcaster,
        state,
        window,
    }
}

/// one firmware-style json line
pub fn frame(temp: f64) -> String {
    format!(
        r#"{{"temp": {temp}, "humidity": 50.0, "pressure": 1013.0, "rain_analog": 1023, "light_intensity": 512, "aqi": 40, "co2": 415.0}}"#
    ) + "\n"
}

pub fn drain(sub: &mut Subscription) -> Vec<Event> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

pub async fn next_event(sub: &mut Subscription) -> Event {
    tokio::time::timeout(Duration::from_secs(600), sub.recv())
        .await
        .expect("timed out waiting for event")
        .expect("broadcaster closed")
}

pub fn status(msg: &str) -> Event {
    Event::status(msg)
}
