//! ==============================================================================
//! decoder.rs - line framing for the sensor board
//! ==============================================================================
//!
//! purpose:
//!     one json object per line. a frame either decodes into a complete
//!     `RawReading` or is rejected; nothing partial leaves this module.
//!
//! accepted:
//!     - `temp` or its alias `temperature`
//!     - optional gas channels and `rain_detected`
//!     - any other key, kept verbatim in `RawReading::extra`
//!
//! ==============================================================================

use crate::domain::{RawReading, RAIN_ADC_MAX};
use crate::error::DecodeError;
use serde_json::Value;

/// fields the feature transformer cannot do without.
/// each entry lists the accepted names, first one is canonical.
const REQUIRED_FIELDS: [&[&str]; 6] = [
    &["temp", "temperature"],
    &["humidity"],
    &["pressure"],
    &["rain_analog"],
    &["light_intensity"],
    &["aqi"],
];

pub fn decode(line: &[u8]) -> Result<RawReading, DecodeError> {
    let text = std::str::from_utf8(line)?.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::Malformed("frame is not a json object".to_string()))?;

    for names in REQUIRED_FIELDS {
        if !names.iter().any(|name| object.contains_key(*name)) {
            return Err(DecodeError::MissingField(names[0].to_string()));
        }
    }

    let reading: RawReading =
        serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    validate(&reading)?;
    Ok(reading)
}

fn validate(reading: &RawReading) -> Result<(), DecodeError> {
    let required = [
        ("temp", reading.temp),
        ("humidity", reading.humidity),
        ("pressure", reading.pressure),
        ("rain_analog", reading.rain_analog),
        ("light_intensity", reading.light_intensity),
        ("aqi", reading.aqi),
    ];
    if let Some((field, value)) = required.into_iter().find(|(_, v)| !v.is_finite()) {
        return Err(DecodeError::OutOfRange { field, value });
    }

    if !(0.0..=RAIN_ADC_MAX).contains(&reading.rain_analog) {
        return Err(DecodeError::OutOfRange {
            field: "rain_analog",
            value: reading.rain_analog,
        });
    }
    Ok(())
}
