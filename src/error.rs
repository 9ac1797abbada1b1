//! ==============================================================================
//! error.rs - error types for the ingestion pipeline
//! ==============================================================================
//!
//! each family maps to one recovery strategy:
//!     DecodeError     one bad frame. the line is skipped, ingestion continues.
//!     LinkError       the link could not be opened or failed mid-stream. the
//!                     connection manager drops to Disconnected and retries.
//!     InferenceError  the forecasting chain rejected the window. the reading
//!                     stays buffered, no forecast is emitted for it.
//!     ModelError,
//!     ConfigError     startup only. these abort before the server starts.
//!
//! ==============================================================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("empty frame")]
    Empty,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("field '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("link closed by peer")]
    Closed,
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{stage} shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape {
        stage: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("{stage} produced a non-finite value")]
    NonFinite { stage: &'static str },

    #[error("forecast backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
