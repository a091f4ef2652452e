//! WebSocket upgrade and per-client session.
//!
//! Authentication happens on the handshake, before the upgrade: a
//! request without a resolvable bearer credential never becomes a
//! channel. After the upgrade the session wires the channel into the
//! gateway, forwards queued events to the socket, and keeps liveness
//! with ping/pong. The gateway is push-only: client text frames are
//! ignored apart from counting as liveness traffic.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use flowgate_auth::{AuthError, bearer_token};
use flowgate_core::{ChannelId, Identity};
use flowgate_gateway::{ClientChannel, ConnectionState, WireEvent};

use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    IDENTITY_SCOPES_ACTIVE, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_REJECTED_TOTAL,
};
use crate::server::AppState;

/// GET /ws — authenticate the handshake, then upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.hub.channel_count() >= state.config.max_connections {
        counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        warn!(limit = state.config.max_connections, "refusing connection, at capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let identity = match authenticate(&headers, &state).await {
        Ok(identity) => identity,
        Err(e) => {
            counter!(WS_REJECTED_TOTAL, "reason" => "unauthorized").increment(1);
            info!(error = %e, "refusing unauthenticated connection");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let channel_id = ChannelId::new();
    ws.on_upgrade(move |socket| run_session(socket, channel_id, identity, state))
}

/// Resolve the handshake's `Authorization` header into an identity.
async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<Identity, AuthError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;
    let token = bearer_token(header_value)?;
    state.resolver.resolve(token).await
}

/// Run one client session from upgrade through disconnect.
#[instrument(skip_all, fields(channel_id = %channel_id))]
#[allow(clippy::cast_precision_loss)]
async fn run_session(socket: WebSocket, channel_id: ChannelId, identity: Identity, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_size);
    let channel = Arc::new(ClientChannel::new(channel_id, identity, send_tx));

    // Bring the channel into service. Scoped delivery is guaranteed only
    // once this returns with the channel Active; a failed open leaves no
    // state behind.
    if let Err(e) = state.lifecycle.on_open(channel.clone()).await {
        warn!(error = %e, "channel open failed");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }
    if channel.state() != ConnectionState::Active {
        // The open was overtaken by a close; nothing was kept.
        return;
    }

    let connection_start = std::time::Instant::now();
    info!(user_id = %channel.user_id(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    gauge!(IDENTITY_SCOPES_ACTIVE).set(state.registry.identity_scope_count().await as f64);

    // Tell the client it is ready to receive scoped events.
    let established = WireEvent::new(
        "connection.established",
        serde_json::json!({ "channel_id": channel.id.as_str() }),
    );
    if let Ok(json) = serde_json::to_string(&established) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    let cancel = state.shutdown.child_token();

    // Outbound: forward queued events and send periodic pings.
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let outbound_cancel = cancel.clone();
    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick.
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Watchdog: close the session when the client stops answering pings.
    let heartbeat_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let watchdog = {
        let channel = channel.clone();
        let session_cancel = cancel.clone();
        let heartbeat_cancel = cancel.child_token();
        tokio::spawn(async move {
            let result =
                run_heartbeat(channel, ping_interval, heartbeat_timeout, heartbeat_cancel).await;
            if result == HeartbeatResult::TimedOut {
                warn!("client unresponsive, closing channel");
                session_cancel.cancel();
            }
        })
    };

    // Inbound: liveness traffic only.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => channel.mark_alive(),
                    Some(Ok(Message::Close(_))) => {
                        info!("client sent close frame");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        channel.mark_alive();
                        debug!("ignoring client frame on push-only channel");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "socket error");
                        break;
                    }
                    None => break,
                }
            }
            () = cancel.cancelled() => break,
        }
    }

    // Clean up.
    state.lifecycle.on_close(&channel).await;
    cancel.cancel();
    outbound.abort();
    watchdog.abort();
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    gauge!(IDENTITY_SCOPES_ACTIVE).set(state.registry.identity_scope_count().await as f64);
    info!(user_id = %channel.user_id(), "client disconnected");
}
