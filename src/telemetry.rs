//! ==============================================================================
//! telemetry.rs - log output setup
//! ==============================================================================
//!
//! purpose:
//!     `RUST_LOG` wins when set. otherwise `[logging] level` from host.toml
//!     applies to this crate and everything else stays at warn.
//!
//! ==============================================================================

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub fn init(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("warn,forecast_host={level}"))
            .map_err(|e| anyhow!("invalid log level '{}': {}", level, e))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
