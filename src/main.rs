//! ==============================================================================
//! main.rs - forecast host entry point
//! ==============================================================================
//!
//! purpose:
//!     reads json frames from the weather station's arduino over serial,
//!     keeps the last `lookback` readings, and once the window is full runs
//!     the forecaster on every new reading. results are pushed to every
//!     dashboard client over a websocket.
//!
//! responsibilities:
//!     - load configuration (config/host.toml, FORECAST_CONFIG, SERIAL_PORT)
//!     - load the scalers and forecaster; abort if anything is missing
//!     - run the ingestion worker (link -> decode -> window -> gate -> broadcast)
//!     - serve the dashboard, /api and /ws
//!     - stop everything cleanly on ctrl-c
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                   rust host (this file)                      │
//!     │  ┌──────────────────────┐        ┌──────────────────────┐   │
//!     │  │ ingestion worker     │        │ web server           │   │
//!     │  │ link.rs + ingest.rs  │        │ server.rs (port 5000)│   │
//!     │  └──────────┬───────────┘        └──────────┬───────────┘   │
//!     │             │ publish                       │ subscribe     │
//!     │             └──────────► broadcaster ◄──────┘               │
//!     │             │                               │               │
//!     │             └──── window (mutex) ◄──────────┘ /api reads    │
//!     └─────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use forecast_host::broadcast::Broadcaster;
use forecast_host::config::{HostConfig, LinkKind};
use forecast_host::domain::SharedState;
use forecast_host::gate::InferenceGate;
use forecast_host::ingest::IngestionLoop;
use forecast_host::link::{ConnectionManager, LinkOpener, SerialOpener};
use forecast_host::model::ForecastModel;
use forecast_host::server::{self, ServerState};
use forecast_host::simulator::SimulatedOpener;
use forecast_host::telemetry;
use forecast_host::window::SlidingWindow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration and start logging
    let config = HostConfig::load_or_default().context("failed to load configuration")?;
    telemetry::init(&config.logging.level)?;

    tracing::info!("===========================================================");
    tracing::info!("  Forecast Host - Weather Station");
    tracing::info!("===========================================================");
    config.print_summary();

    // step 2: load the forecasting capabilities. nothing works without them.
    tracing::info!("[STARTUP] Loading model and scalers...");
    let model = ForecastModel::load(&config.model, config.pipeline.lookback, config.pipeline.horizon)
        .context("could not load model or scalers, check the [model] paths")?;
    tracing::info!("[STARTUP] ✓ Model and scalers loaded ({:?})", model);

    // step 3: build the pipeline
    let window = Arc::new(SlidingWindow::new(config.pipeline.lookback)?);
    let gate = InferenceGate::new(
        Arc::new(model),
        config.pipeline.lookback,
        config.pipeline.display_limit,
        config.pipeline.step_hours,
    )?;
    let broadcaster = Broadcaster::new(config.server.subscriber_buffer);
    let state = SharedState::default();
    state.write().await.window_capacity = window.capacity();

    let mut pipeline = IngestionLoop::new(
        window.clone(),
        gate,
        broadcaster.clone(),
        state.clone(),
        Duration::from_millis(config.pipeline.pause_ms),
    )
    .show_sensor_data(config.logging.show_sensor_data);

    let opener: Box<dyn LinkOpener> = match config.link.kind {
        LinkKind::Serial => Box::new(SerialOpener::new(&config.link.port, config.link.baud_rate)),
        LinkKind::Simulated => Box::new(SimulatedOpener::new(config.link.simulated_period()?)),
    };
    let mut manager = ConnectionManager::new(
        opener,
        config.link.backoff_policy(),
        config.link.read_timeout(),
        broadcaster.clone(),
        state.clone(),
    );

    // step 4: ctrl-c cancels the worker and the server together
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("[RUNTIME] Shutdown requested");
                signal_cancel.cancel();
            }
            Err(e) => tracing::error!("[RUNTIME] ✗ Cannot listen for ctrl-c: {}", e),
        }
    });

    // step 5: ingestion worker in background
    let worker_cancel = cancel.clone();
    let worker = tokio::spawn(async move {
        manager.run(&mut pipeline, worker_cancel).await;
    });

    // step 6: serve until shutdown. whichever of server and worker stops
    // first takes the other down with it
    let server_state = ServerState {
        broadcaster,
        state,
        window,
    };
    let server = server::run_server(&config.server.bind, server_state, cancel.clone());
    tokio::pin!(server);
    let mut worker = worker;

    tokio::select! {
        served = &mut server => {
            cancel.cancel();
            worker.await.context("ingestion worker panicked")?;
            served
        }
        joined = &mut worker => {
            let requested = cancel.is_cancelled();
            cancel.cancel();
            let served = server.await;
            joined.context("ingestion worker panicked")?;
            if !requested {
                anyhow::bail!("ingestion worker stopped unexpectedly");
            }
            served
        }
    }
}
