//! ==============================================================================
//! server.rs - dashboard, json api and websocket event stream
//! ==============================================================================
//!
//! routes:
//!     GET /      dashboard page (static html, talks to /ws)
//!     GET /ws    websocket: one broadcast subscription per connection
//!     GET /api   json snapshot of the pipeline
//!
//! the server only ever reads pipeline state. the ingestion worker keeps
//! running whether or not anybody is connected.
//!
//! ==============================================================================

use crate::broadcast::{Broadcaster, Subscription};
use crate::domain::{PipelineSnapshot, SharedState};
use crate::window::SlidingWindow;

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

const DASHBOARD_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct ServerState {
    pub broadcaster: Broadcaster,
    pub state: SharedState,
    pub window: Arc<SlidingWindow>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: ServerState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("[SERVER] ✓ Dashboard live at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    tracing::info!("[SERVER] stopped");
    Ok(())
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// current pipeline state for programmatic access
async fn api_handler(State(server): State<ServerState>) -> Json<PipelineSnapshot> {
    let mut snapshot = server.state.read().await.clone();
    snapshot.window_len = server.window.len();
    snapshot.window_capacity = server.window.capacity();
    snapshot.subscribers = server.broadcaster.subscriber_count();
    Json(snapshot)
}

async fn ws_handler(ws: WebSocketUpgrade, State(server): State<ServerState>) -> impl IntoResponse {
    let subscription = server.broadcaster.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, subscription))
}

/// forward broadcast events until either side goes away.
/// dropping the subscription on return unregisters it.
async fn stream_events(mut socket: WebSocket, mut subscription: Subscription) {
    let id = subscription.id();
    tracing::info!("[SERVER] subscriber {} connected", id);

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("[SERVER] failed to encode {} event: {}", event.kind(), e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!("[SERVER] subscriber {} disconnected", id);
}
