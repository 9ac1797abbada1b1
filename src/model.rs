//! ==============================================================================
//! model.rs - forecasting capabilities
//! ==============================================================================
//!
//! purpose:
//!     the ingestion core treats the forecaster as three opaque steps:
//!         scale(window)        (lookback, features) -> (lookback, features)
//!         forecast(scaled)     (lookback, features) -> (horizon, targets)
//!         unscale(raw)         (horizon, targets)   -> (horizon, targets)
//!     anything implementing `Scaler` + `Forecaster` can be dropped in.
//!
//! shipped backends:
//!     - MinMaxScaler: per-column min/max, json on disk
//!     - LinearForecaster: one dense layer over the flattened window, json on disk
//!
//! loading happens once at startup. every mismatch (missing file, wrong
//! column schema, wrong lookback/horizon) is a fatal ModelError.
//!
//! ==============================================================================

use crate::config::ModelConfig;
use crate::domain::{FEATURE_COLUMNS, FEATURE_COUNT, TARGET_COLUMNS, TARGET_COUNT};
use crate::error::{InferenceError, ModelError};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::path::Path;

// ==============================================================================
// capability traits
// ==============================================================================

pub trait Scaler: Send + Sync {
    /// number of columns this scaler was fitted on
    fn width(&self) -> usize;
    fn transform(&self, input: &Array2<f64>) -> Result<Array2<f64>, InferenceError>;
    fn inverse_transform(&self, input: &Array2<f64>) -> Result<Array2<f64>, InferenceError>;
}

pub trait Forecaster: Send + Sync {
    fn lookback(&self) -> usize;
    fn horizon(&self) -> usize;
    fn feature_count(&self) -> usize;
    fn target_count(&self) -> usize;
    fn predict(&self, scaled: &Array2<f64>) -> Result<Array2<f64>, InferenceError>;
}

// ==============================================================================
// forecast model bundle
// ==============================================================================

/// feature scaler + forecaster + target scaler, validated against each other
pub struct ForecastModel {
    feature_scaler: Box<dyn Scaler>,
    forecaster: Box<dyn Forecaster>,
    target_scaler: Box<dyn Scaler>,
}

impl std::fmt::Debug for ForecastModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastModel")
            .field("lookback", &self.lookback())
            .field("horizon", &self.horizon())
            .finish()
    }
}

impl ForecastModel {
    pub fn new(
        feature_scaler: Box<dyn Scaler>,
        forecaster: Box<dyn Forecaster>,
        target_scaler: Box<dyn Scaler>,
    ) -> Result<Self, ModelError> {
        if forecaster.feature_count() != FEATURE_COUNT {
            return Err(ModelError::Invalid(format!(
                "forecaster expects {} features, pipeline produces {}",
                forecaster.feature_count(),
                FEATURE_COUNT
            )));
        }
        if forecaster.target_count() != TARGET_COUNT {
            return Err(ModelError::Invalid(format!(
                "forecaster predicts {} targets, pipeline expects {}",
                forecaster.target_count(),
                TARGET_COUNT
            )));
        }
        if feature_scaler.width() != FEATURE_COUNT {
            return Err(ModelError::Invalid(format!(
                "feature scaler fitted on {} columns, expected {}",
                feature_scaler.width(),
                FEATURE_COUNT
            )));
        }
        if target_scaler.width() != TARGET_COUNT {
            return Err(ModelError::Invalid(format!(
                "target scaler fitted on {} columns, expected {}",
                target_scaler.width(),
                TARGET_COUNT
            )));
        }
        if forecaster.lookback() == 0 || forecaster.horizon() == 0 {
            return Err(ModelError::Invalid(
                "forecaster lookback and horizon must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            feature_scaler,
            forecaster,
            target_scaler,
        })
    }

    /// load the json backends named in the config and check them against
    /// the configured lookback / horizon
    pub fn load(config: &ModelConfig, lookback: usize, horizon: usize) -> Result<Self, ModelError> {
        let feature_scaler = MinMaxScaler::load(&config.feature_scaler_path)?;
        let target_scaler = MinMaxScaler::load(&config.target_scaler_path)?;
        let forecaster = LinearForecaster::load(&config.model_path)?;

        if forecaster.lookback() != lookback {
            return Err(ModelError::Invalid(format!(
                "model lookback is {}, config says {}",
                forecaster.lookback(),
                lookback
            )));
        }
        if forecaster.horizon() != horizon {
            return Err(ModelError::Invalid(format!(
                "model horizon is {}, config says {}",
                forecaster.horizon(),
                horizon
            )));
        }

        Self::new(
            Box::new(feature_scaler),
            Box::new(forecaster),
            Box::new(target_scaler),
        )
    }

    pub fn lookback(&self) -> usize {
        self.forecaster.lookback()
    }

    pub fn horizon(&self) -> usize {
        self.forecaster.horizon()
    }

    pub fn scale(&self, window: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        let expected = (self.lookback(), FEATURE_COUNT);
        check_shape("scale input", expected, window)?;
        let scaled = self.feature_scaler.transform(window)?;
        check_shape("scale output", expected, &scaled)?;
        check_finite("scale", &scaled)?;
        Ok(scaled)
    }

    pub fn forecast(&self, scaled: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        check_shape("forecast input", (self.lookback(), FEATURE_COUNT), scaled)?;
        let raw = self.forecaster.predict(scaled)?;
        check_shape("forecast output", (self.horizon(), TARGET_COUNT), &raw)?;
        check_finite("forecast", &raw)?;
        Ok(raw)
    }

    pub fn unscale(&self, raw: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        let expected = (self.horizon(), TARGET_COUNT);
        check_shape("unscale input", expected, raw)?;
        let actual = self.target_scaler.inverse_transform(raw)?;
        check_shape("unscale output", expected, &actual)?;
        check_finite("unscale", &actual)?;
        Ok(actual)
    }
}

fn check_shape(
    stage: &'static str,
    expected: (usize, usize),
    m: &Array2<f64>,
) -> Result<(), InferenceError> {
    let actual = m.dim();
    if actual != expected {
        return Err(InferenceError::Shape {
            stage,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_finite(stage: &'static str, m: &Array2<f64>) -> Result<(), InferenceError> {
    if m.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(InferenceError::NonFinite { stage })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ModelError::Parse {
        path: path.display().to_string(),
        source,
    })
}

// ==============================================================================
// min-max scaler
// ==============================================================================

#[derive(Deserialize)]
struct MinMaxFile {
    data_min: Vec<f64>,
    data_max: Vec<f64>,
}

/// maps each column from [data_min, data_max] onto [0, 1].
/// a constant column (zero range) is shifted but not stretched.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    range: Array1<f64>,
}

impl MinMaxScaler {
    pub fn new(data_min: Vec<f64>, data_max: Vec<f64>) -> Result<Self, ModelError> {
        if data_min.len() != data_max.len() || data_min.is_empty() {
            return Err(ModelError::Invalid(format!(
                "scaler has {} minimums and {} maximums",
                data_min.len(),
                data_max.len()
            )));
        }
        let min = Array1::from(data_min);
        let max = Array1::from(data_max);
        let range = (&max - &min).mapv(|r| if r == 0.0 { 1.0 } else { r });
        if range.iter().chain(min.iter()).any(|x| !x.is_finite()) {
            return Err(ModelError::Invalid("scaler bounds must be finite".to_string()));
        }
        Ok(Self { min, range })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file: MinMaxFile = read_json(path)?;
        Self::new(file.data_min, file.data_max)
            .map_err(|e| ModelError::Invalid(format!("{}: {}", path.display(), e)))
    }

    fn check_width(&self, input: &Array2<f64>) -> Result<(), InferenceError> {
        if input.ncols() != self.width() {
            return Err(InferenceError::Shape {
                stage: "scaler",
                expected: (input.nrows(), self.width()),
                actual: input.dim(),
            });
        }
        Ok(())
    }
}

impl Scaler for MinMaxScaler {
    fn width(&self) -> usize {
        self.min.len()
    }

    fn transform(&self, input: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        self.check_width(input)?;
        Ok((input - &self.min) / &self.range)
    }

    fn inverse_transform(&self, input: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        self.check_width(input)?;
        Ok(input * &self.range + &self.min)
    }
}

// ==============================================================================
// linear forecaster
// ==============================================================================

#[derive(Deserialize)]
struct LinearModelFile {
    lookback: usize,
    horizon: usize,
    feature_columns: Vec<String>,
    target_columns: Vec<String>,
    /// (horizon * targets) rows of (lookback * features) weights
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

/// y = W · flatten(window) + b, reshaped to (horizon, targets)
#[derive(Debug, Clone)]
pub struct LinearForecaster {
    lookback: usize,
    horizon: usize,
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearForecaster {
    pub fn new(
        lookback: usize,
        horizon: usize,
        weights: Array2<f64>,
        bias: Array1<f64>,
    ) -> Result<Self, ModelError> {
        let expected = (horizon * TARGET_COUNT, lookback * FEATURE_COUNT);
        if weights.dim() != expected {
            return Err(ModelError::Invalid(format!(
                "weights shape {:?}, expected {:?}",
                weights.dim(),
                expected
            )));
        }
        if bias.len() != expected.0 {
            return Err(ModelError::Invalid(format!(
                "bias length {}, expected {}",
                bias.len(),
                expected.0
            )));
        }
        Ok(Self {
            lookback,
            horizon,
            weights,
            bias,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file: LinearModelFile = read_json(path)?;
        let invalid = |msg: String| ModelError::Invalid(format!("{}: {}", path.display(), msg));

        if file.feature_columns != FEATURE_COLUMNS {
            return Err(invalid(format!(
                "feature columns {:?} do not match {:?}",
                file.feature_columns, FEATURE_COLUMNS
            )));
        }
        if file.target_columns != TARGET_COLUMNS {
            return Err(invalid(format!(
                "target columns {:?} do not match {:?}",
                file.target_columns, TARGET_COLUMNS
            )));
        }

        let rows = file.weights.len();
        let cols = file.weights.first().map_or(0, Vec::len);
        if file.weights.iter().any(|row| row.len() != cols) {
            return Err(invalid("weight rows have uneven lengths".to_string()));
        }
        let flat: Vec<f64> = file.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| invalid(e.to_string()))?;

        Self::new(file.lookback, file.horizon, weights, Array1::from(file.bias))
            .map_err(|e| invalid(e.to_string()))
    }
}

impl Forecaster for LinearForecaster {
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
        let flat: Array1<f64> = scaled.iter().copied().collect();
        if flat.len() != self.weights.ncols() {
            return Err(InferenceError::Shape {
                stage: "linear forecaster",
                expected: (self.lookback, FEATURE_COUNT),
                actual: scaled.dim(),
            });
        }
        let out = self.weights.dot(&flat) + &self.bias;
        out.into_shape((self.horizon, TARGET_COUNT))
            .map_err(|e| InferenceError::Backend(e.to_string()))
    }
}
