//! `WebSocket` session lifecycle: handles a single observer from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::connection::ObserverConnection;
use super::handler::{Dispatch, handle_message};
use super::hub::BroadcastHub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;

/// Ping cadence and the silence after which a client is dropped.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// How long without a Pong before the client is considered dead.
    pub timeout: Duration,
}

/// First frame on every connection.
pub fn established_frame(connection: &ObserverConnection) -> serde_json::Value {
    json!({
        "type": "connection.established",
        "timestamp": lens_core::time::now_wire(),
        "data": {
            "connectionId": connection.id,
            "sessionId": connection.session_id(),
        },
    })
}

/// Run a `WebSocket` session for an authenticated observer.
///
/// 1. Sends `connection.established`
/// 2. Handles subscription frames and dispatches RPC requests
/// 3. Forwards queued frames, `resync_required` markers first
/// 4. Pings periodically and drops unresponsive clients
/// 5. Deregisters from the hub on disconnect or server-side close
#[instrument(skip_all, fields(conn_id = %connection.id, session_id = %connection.session_id()))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection: Arc<ObserverConnection>,
    token: String,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    hub: Arc<BroadcastHub>,
    heartbeat: Heartbeat,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let connection_start = Instant::now();
    info!("observer connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    hub.add(Arc::clone(&connection)).await;

    if let Ok(json) = serde_json::to_string(&established_frame(&connection)) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    let outbound_conn = Arc::clone(&connection);
    let outbound = tokio::spawn(async move {
        let closed = outbound_conn.closed();
        let mut ping_interval = tokio::time::interval(heartbeat.interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = outbound_conn.next_frame() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(String::clone(&frame).into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", heartbeat.timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = closed.cancelled() => break,
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        // Stop the inbound loop too.
        outbound_conn.close();
    });

    let closed = connection.closed();
    let dispatch = Dispatch {
        registry: &registry,
        ctx: &ctx,
        hub: &hub,
        connection: &connection,
        token: &token,
    };

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = closed.cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    Some(s.to_owned())
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };
        connection.mark_alive();

        let result = handle_message(&text, &dispatch).await;
        if !connection.send_reply(result.response_json) {
            debug!(method = result.method, "reply not queued (queue full or closing)");
        }
    }

    info!(
        dropped = connection.drop_count(),
        "observer disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    connection.close();
    outbound.abort();
    let _ = hub.remove(&connection.id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_core::SessionId;

    #[test]
    fn established_frame_has_required_fields() {
        let conn = ObserverConnection::new(SessionId::from("sess_abc"), 4);
        let frame = established_frame(&conn);
        assert_eq!(frame["type"], "connection.established");
        assert_eq!(frame["data"]["connectionId"], conn.id.as_str());
        assert_eq!(frame["data"]["sessionId"], "sess_abc");
        assert!(frame["timestamp"].is_string());
    }
}
