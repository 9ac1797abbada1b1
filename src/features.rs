//! ==============================================================================
//! features.rs - feature derivation for one reading
//! ==============================================================================
//!
//! purpose:
//!     pure function of (reading, timestamp). the output layout is
//!     FEATURE_COLUMNS; the scaler and the forecaster index by position.
//!
//! ==============================================================================

use crate::domain::{FeatureVector, RawReading, RAIN_ADC_MAX};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::f64::consts::PI;

pub fn transform(reading: &RawReading, timestamp: NaiveDateTime) -> FeatureVector {
    let precipitation = 1.0 - reading.rain_analog / RAIN_ADC_MAX;

    let hour = f64::from(timestamp.hour());
    let day_of_week = f64::from(timestamp.weekday().num_days_from_monday());
    let month = f64::from(timestamp.month());
    let day_of_year = f64::from(timestamp.ordinal());

    let hour_angle = 2.0 * PI * hour / 24.0;
    let month_angle = 2.0 * PI * month / 12.0;

    FeatureVector([
        reading.temp,
        reading.humidity,
        reading.pressure,
        reading.rain_analog,
        reading.light_intensity,
        reading.aqi,
        precipitation,
        hour,
        day_of_week,
        month,
        day_of_year,
        hour_angle.sin(),
        hour_angle.cos(),
        month_angle.sin(),
        month_angle.cos(),
    ])
}
