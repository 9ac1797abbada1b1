//! ==============================================================================
//! ingest.rs - per-reading orchestration
//! ==============================================================================
//!
//! flow:
//!     decode -> transform -> buffer -> publish reading -> gate -> publish result
//!
//! ordering:
//!     readings are handled one at a time in arrival order. the reading event
//!     for a frame is always published before anything the gate produces.
//!
//! ==============================================================================

use crate::broadcast::{Broadcaster, Event};
use crate::decoder;
use crate::domain::SharedState;
use crate::features;
use crate::gate::{GateOutcome, InferenceGate};
use crate::window::SlidingWindow;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// what happened to one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Skipped,
    Gathering { count: usize, capacity: usize },
    Forecast,
    InferenceFailed,
}

pub struct IngestionLoop {
    window: Arc<SlidingWindow>,
    gate: InferenceGate,
    broadcaster: Broadcaster,
    state: SharedState,
    pause: Duration,
    show_sensor_data: bool,
    clock: Clock,
}

impl IngestionLoop {
    pub fn new(
        window: Arc<SlidingWindow>,
        gate: InferenceGate,
        broadcaster: Broadcaster,
        state: SharedState,
        pause: Duration,
    ) -> Self {
        Self {
            window,
            gate,
            broadcaster,
            state,
            pause,
            show_sensor_data: false,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn show_sensor_data(mut self, show: bool) -> Self {
        self.show_sensor_data = show;
        self
    }

    pub async fn process_line(&mut self, line: &[u8]) -> LineOutcome {
        let reading = match decoder::decode(line) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(
                    "[INGEST] ⚠ Could not decode frame ({}): {}",
                    e,
                    String::from_utf8_lossy(line).trim_end()
                );
                self.state.write().await.decode_failures += 1;
                return LineOutcome::Skipped;
            }
        };

        let now = (self.clock)();
        let vector = features::transform(&reading, now);
        let snapshot = self.window.push_and_snapshot(vector);

        if self.show_sensor_data {
            tracing::info!(
                "[SENSOR] Temp: {:.1}°C | Humidity: {:.1}% | Pressure: {:.0} hPa | AQI: {:.0}",
                reading.temp,
                reading.humidity,
                reading.pressure,
                reading.aqi
            );
        }

        {
            let mut state = self.state.write().await;
            state.latest_reading = Some(reading.clone());
            state.window_len = snapshot.len();
            state.window_capacity = self.window.capacity();
            state.readings_processed += 1;
            state.last_update = unix_millis();
        }
        self.broadcaster.publish(Event::Reading(reading));

        match self.gate.evaluate(&snapshot, now) {
            GateOutcome::Gathering { count, capacity } => {
                self.broadcaster
                    .publish(Event::status(format!("Gathering data... {count}/{capacity}")));
                LineOutcome::Gathering { count, capacity }
            }
            GateOutcome::Forecast(points) => {
                tracing::debug!("[GATE] forecast ready ({} points)", points.len());
                self.state.write().await.latest_forecast = Some(points.clone());
                self.broadcaster.publish(Event::Forecast { points });
                self.broadcaster
                    .publish(Event::status("Live prediction active."));
                LineOutcome::Forecast
            }
            GateOutcome::Failed(e) => {
                tracing::error!("[GATE] ✗ Inference failed: {}", e);
                self.state.write().await.inference_failures += 1;
                self.broadcaster.publish(Event::status(
                    "Prediction failed; will retry on next reading.",
                ));
                LineOutcome::InferenceFailed
            }
        }
    }

    /// inter-reading pause; false if cancelled while waiting
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.pause) => true,
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
