//! ==============================================================================
//! gate.rs - gathering / ready gate in front of the forecaster
//! ==============================================================================
//!
//! purpose:
//!     the gate never touches the window itself. it only sees the snapshot
//!     taken right after the latest push, so a failed inference leaves the
//!     window as is.
//!
//! ==============================================================================

use crate::domain::{FeatureVector, ForecastBatch, ForecastPoint, FEATURE_COUNT};
use crate::error::{ConfigError, InferenceError};
use crate::model::ForecastModel;
use chrono::NaiveDateTime;
use ndarray::Array2;
use std::sync::Arc;

#[derive(Debug)]
pub enum GateOutcome {
    Gathering { count: usize, capacity: usize },
    Forecast(ForecastBatch),
    Failed(InferenceError),
}

pub struct InferenceGate {
    model: Arc<ForecastModel>,
    capacity: usize,
    /// min(display limit, model horizon)
    points: usize,
    step: chrono::Duration,
}

impl InferenceGate {
    pub fn new(
        model: Arc<ForecastModel>,
        capacity: usize,
        display_limit: usize,
        step_hours: i64,
    ) -> Result<Self, ConfigError> {
        if model.lookback() != capacity {
            return Err(ConfigError::Invalid(format!(
                "window capacity {} does not match model lookback {}",
                capacity,
                model.lookback()
            )));
        }
        if display_limit == 0 || step_hours <= 0 {
            return Err(ConfigError::Invalid(
                "display limit and forecast step must be positive".to_string(),
            ));
        }
        let points = display_limit.min(model.horizon());
        if points < display_limit {
            tracing::warn!(
                "[GATE] display limit {} exceeds model horizon {}, showing {} points",
                display_limit,
                model.horizon(),
                points
            );
        }
        Ok(Self {
            model,
            capacity,
            points,
            step: chrono::Duration::hours(step_hours),
        })
    }

    /// number of points in every forecast batch
    pub fn batch_len(&self) -> usize {
        self.points
    }

    pub fn evaluate(&self, snapshot: &[FeatureVector], timestamp: NaiveDateTime) -> GateOutcome {
        if snapshot.len() < self.capacity {
            return GateOutcome::Gathering {
                count: snapshot.len(),
                capacity: self.capacity,
            };
        }
        match self.infer(snapshot, timestamp) {
            Ok(batch) => GateOutcome::Forecast(batch),
            Err(e) => GateOutcome::Failed(e),
        }
    }

    fn infer(
        &self,
        snapshot: &[FeatureVector],
        timestamp: NaiveDateTime,
    ) -> Result<ForecastBatch, InferenceError> {
        let window = to_matrix(snapshot)?;
        let scaled = self.model.scale(&window)?;
        let raw = self.model.forecast(&scaled)?;
        let actual = self.model.unscale(&raw)?;

        let batch = actual
            .rows()
            .into_iter()
            .take(self.points)
            .enumerate()
            .map(|(i, row)| {
                let at = timestamp + self.step * (i as i32 + 1);
                ForecastPoint {
                    at,
                    time: at.format("%H:00").to_string(),
                    temp: round1(row[0]),
                    precipitation: round1(row[1] * 100.0),
                    aqi: row[2] as i64,
                }
            })
            .collect();
        Ok(batch)
    }
}

fn to_matrix(snapshot: &[FeatureVector]) -> Result<Array2<f64>, InferenceError> {
    let flat: Vec<f64> = snapshot.iter().flat_map(|v| v.0).collect();
    Array2::from_shape_vec((snapshot.len(), FEATURE_COUNT), flat)
        .map_err(|e| InferenceError::Backend(e.to_string()))
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
