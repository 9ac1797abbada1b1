//! ==============================================================================
//! link.rs - sensor link lifecycle
//! ==============================================================================
//!
//! purpose:
//!     owns the physical link to the sensor board and feeds complete lines to
//!     the ingestion loop. this is the only place that retries forever.
//!
//! state machine:
//!
//! ```text
//!     ┌──────────────┐  open()   ┌────────────┐   ok    ┌───────────┐
//!     │ Disconnected │ ────────► │ Connecting │ ──────► │ Connected │
//!     └──────────────┘           └─────┬──────┘         └─────┬─────┘
//!            ▲                         │ err                  │ read err / eof
//!            │      backoff wait       │                      │
//!            └─────────────────────────┴──────────────────────┘
//! ```
//!
//! never busy-loops:
//!     - reads are bounded by `read_timeout` (an empty read just loops)
//!     - every failed open or dropped link waits `BackoffPolicy::delay`
//!     - the cancellation token is raced against every wait
//!
//! ==============================================================================

use crate::broadcast::{Broadcaster, Event};
use crate::domain::{ConnectionState, SharedState};
use crate::error::LinkError;
use crate::ingest::IngestionLoop;

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::spawn_blocking;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

// ==============================================================================
// link traits
// ==============================================================================

/// an open link that yields newline-framed frames
#[async_trait]
pub trait LineSource: Send {
    /// `Ok(None)` means the timeout elapsed with no complete line.
    /// partial data is kept for the next call.
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError>;
}

/// knows how to (re)open a link
#[async_trait]
pub trait LinkOpener: Send + Sync {
    /// human-readable link name used in status messages
    fn name(&self) -> &str;
    async fn open(&self) -> Result<Box<dyn LineSource>, LinkError>;
}

// ==============================================================================
// byte stream source (serial ports, pipes, test duplex streams)
// ==============================================================================

/// longest frame kept in memory. a link that never sends `\n` (wrong baud,
/// line noise) gets cut into lines of this size, which then fail to decode.
pub const MAX_LINE_BYTES: usize = 4096;

pub struct StreamSource<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// bytes move from the reader into `pending` without an await in between,
    /// so dropping this future on timeout never loses a partial line
    async fn next_line(&mut self) -> Result<Vec<u8>, LinkError> {
        loop {
            let available = self.reader.fill_buf().await.map_err(LinkError::Read)?;
            if available.is_empty() {
                if self.pending.is_empty() {
                    return Err(LinkError::Closed);
                }
                return Ok(std::mem::take(&mut self.pending));
            }

            let room = MAX_LINE_BYTES - self.pending.len();
            let (used, complete) = match available.iter().take(room).position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len().min(room), false),
            };
            self.pending.extend_from_slice(&available[..used]);
            self.reader.consume(used);

            if complete {
                return Ok(std::mem::take(&mut self.pending));
            }
            if self.pending.len() >= MAX_LINE_BYTES {
                tracing::warn!("[LINK] ⚠ No newline in {} bytes, cutting frame", MAX_LINE_BYTES);
                return Ok(std::mem::take(&mut self.pending));
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineSource for StreamSource<R> {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        match tokio::time::timeout(timeout, self.next_line()).await {
            Err(_elapsed) => Ok(None),
            Ok(line) => line.map(Some),
        }
    }
}

/// opens a serial port, 8N1 no flow control
pub struct SerialOpener {
    port: String,
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl LinkOpener for SerialOpener {
    fn name(&self) -> &str {
        &self.port
    }

    async fn open(&self) -> Result<Box<dyn LineSource>, LinkError> {
        let port = self.port.clone();
        let baud_rate = self.baud_rate;

        // opening can block on some usb-serial drivers
        let stream = spawn_blocking(move || {
            tokio_serial::new(&port, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .map_err(|e| LinkError::Open {
                    port,
                    source: e.into(),
                })
        })
        .await
        .map_err(|e| LinkError::Open {
            port: self.port.clone(),
            source: std::io::Error::other(e),
        })??;

        Ok(Box::new(StreamSource::new(stream)))
    }
}

// ==============================================================================
// backoff
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    Fixed(Duration),
    /// base * 2^attempt, capped at max
    Exponential { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed(delay) => delay,
            BackoffPolicy::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

// ==============================================================================
// connection manager
// ==============================================================================

enum LinkExit {
    Cancelled,
    Dropped(LinkError),
}

pub struct ConnectionManager {
    opener: Box<dyn LinkOpener>,
    backoff: BackoffPolicy,
    read_timeout: Duration,
    broadcaster: Broadcaster,
    state: SharedState,
    connection: ConnectionState,
}

impl ConnectionManager {
    pub fn new(
        opener: Box<dyn LinkOpener>,
        backoff: BackoffPolicy,
        read_timeout: Duration,
        broadcaster: Broadcaster,
        state: SharedState,
    ) -> Self {
        Self {
            opener,
            backoff,
            read_timeout,
            broadcaster,
            state,
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// run until `cancel` fires. there is no other exit.
    pub async fn run(&mut self, pipeline: &mut IngestionLoop, cancel: CancellationToken) {
        tracing::info!("[LINK] Starting sensor reader on {}", self.opener.name());
        let mut attempt: u32 = 0;

        loop {
            self.transition(ConnectionState::Connecting).await;

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                opened = self.opener.open() => opened,
            };

            let source = match opened {
                Ok(source) => source,
                Err(e) => {
                    self.transition(ConnectionState::Disconnected).await;
                    tracing::warn!("[LINK] ⚠ {}", e);
                    self.status(format!(
                        "Sensor not detected on {}. Retrying...",
                        self.opener.name()
                    ));
                    let delay = self.backoff.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    if !wait(delay, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            attempt = 0;
            self.transition(ConnectionState::Connected).await;
            tracing::info!("[LINK] ✓ Connected to sensor on {}", self.opener.name());
            self.status(format!("Connected to sensor on {}.", self.opener.name()));

            match self.pump(source, pipeline, &cancel).await {
                LinkExit::Cancelled => break,
                LinkExit::Dropped(e) => {
                    self.transition(ConnectionState::Disconnected).await;
                    tracing::warn!("[LINK] ⚠ Link lost: {}", e);
                    self.status(format!(
                        "Connection to sensor on {} lost. Reconnecting...",
                        self.opener.name()
                    ));
                    if !wait(self.backoff.delay(0), &cancel).await {
                        break;
                    }
                }
            }
        }

        self.transition(ConnectionState::Disconnected).await;
        tracing::info!("[LINK] Sensor reader stopped");
    }

    async fn pump(
        &self,
        mut source: Box<dyn LineSource>,
        pipeline: &mut IngestionLoop,
        cancel: &CancellationToken,
    ) -> LinkExit {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return LinkExit::Cancelled,
                line = source.read_line(self.read_timeout) => line,
            };

            match line {
                Ok(None) => continue,
                Ok(Some(bytes)) => {
                    pipeline.process_line(&bytes).await;
                    if !pipeline.pause(cancel).await {
                        return LinkExit::Cancelled;
                    }
                }
                Err(e) => return LinkExit::Dropped(e),
            }
        }
    }

    async fn transition(&mut self, next: ConnectionState) {
        if self.connection != next {
            tracing::debug!("[LINK] {:?} -> {:?}", self.connection, next);
            self.connection = next;
            self.state.write().await.connection = next;
        }
    }

    fn status(&self, msg: String) {
        self.broadcaster.publish(Event::status(msg));
    }
}

/// sleep unless cancelled first; false means cancelled
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
