//! ==============================================================================
//! forecast-host - streaming weather forecaster for a serial sensor station
//! ==============================================================================
//!
//! pipeline (one worker task, strictly in arrival order):
//!
//! ```text
//!     serial link ──► decoder ──► features ──► window ──► gate ──► broadcaster
//!     (link.rs)      (decoder.rs) (features.rs) (window.rs) (gate.rs) (broadcast.rs)
//!                                                            │
//!                                                   model.rs (scale → forecast → unscale)
//! ```
//!
//! the web server (server.rs) runs beside the worker and only reads:
//! it subscribes websocket clients to the broadcaster and serves /api.
//!
//! ==============================================================================

pub mod broadcast;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod error;
pub mod features;
pub mod gate;
pub mod ingest;
pub mod link;
pub mod model;
pub mod server;
pub mod simulator;
pub mod telemetry;
pub mod window;
