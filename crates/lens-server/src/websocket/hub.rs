//! Fan-out of store events to subscribed observers.

use std::collections::HashMap;
use std::sync::Arc;

use lens_core::{ConnectionId, SessionId};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::ObserverConnection;
use super::pattern::KeyPattern;
use crate::metrics::{HUB_DROPS_TOTAL, HUB_EVENTS_TOTAL, HUB_RESYNCS_TOTAL};
use crate::rpc::types::RpcEvent;

/// Routes key-scoped frames to the connections whose patterns match.
///
/// Each frame is serialized once and shared across recipients. Delivery
/// never blocks: a full connection queue drops its oldest event frame.
pub struct BroadcastHub {
    connections: RwLock<HashMap<ConnectionId, Arc<ObserverConnection>>>,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ObserverConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<ObserverConnection>> {
        self.connections.write().await.remove(connection_id)
    }

    /// Subscribe a connection to a key pattern. Returns `false` if the
    /// connection is unknown.
    pub async fn subscribe(&self, connection_id: &ConnectionId, pattern: KeyPattern) -> bool {
        let conns = self.connections.read().await;
        let Some(conn) = conns.get(connection_id) else {
            return false;
        };
        debug!(conn_id = %connection_id, %pattern, "subscribed");
        let _ = conn.subscribe(pattern);
        true
    }

    /// Drop a subscription. Returns `false` if the connection or pattern is
    /// unknown.
    pub async fn unsubscribe(&self, connection_id: &ConnectionId, pattern: &KeyPattern) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(connection_id)
            .is_some_and(|conn| conn.unsubscribe(pattern))
    }

    /// Deliver a key-scoped frame to every matching connection. Returns the
    /// number of recipients.
    pub async fn publish(&self, key: &str, event: &RpcEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type, error = %e, "failed to serialize event");
                return 0;
            }
        };
        counter!(HUB_EVENTS_TOTAL, "type" => event.event_type.clone()).increment(1);

        let conns = self.connections.read().await;
        let mut recipients = 0;
        for conn in conns.values().filter(|c| c.wants(key)) {
            recipients += 1;
            if !conn.send_event(Arc::clone(&json)) && !conn.is_closed() {
                counter!(HUB_DROPS_TOTAL).increment(1);
                debug!(conn_id = %conn.id, key, "outbound queue full, dropped oldest frame");
            }
        }
        debug!(event_type = event.event_type, key, recipients, "published");
        recipients
    }

    /// Mark every connection as needing a resync.
    pub async fn resync_all(&self, reason: &'static str) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            conn.request_resync();
        }
        counter!(HUB_RESYNCS_TOTAL, "reason" => reason).increment(1);
        info!(reason, connections = conns.len(), "requested resync on all connections");
    }

    /// Close and remove every connection authenticated as `session_id`.
    /// Returns how many were closed.
    pub async fn disconnect_session(&self, session_id: &SessionId) -> usize {
        let mut conns = self.connections.write().await;
        let ids: Vec<ConnectionId> = conns
            .values()
            .filter(|c| c.session_id() == session_id)
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            if let Some(conn) = conns.remove(id) {
                conn.close();
            }
        }
        if !ids.is_empty() {
            info!(%session_id, count = ids.len(), "closed connections of ended session");
        }
        ids.len()
    }

    /// Close and remove every connection whose session fails `is_live`.
    /// Returns how many were closed.
    pub async fn disconnect_stale<F>(&self, is_live: F) -> usize
    where
        F: Fn(&SessionId) -> bool,
    {
        let mut conns = self.connections.write().await;
        let before = conns.len();
        conns.retain(|_, conn| {
            let keep = is_live(conn.session_id());
            if !keep {
                conn.close();
            }
            keep
        });
        let closed = before - conns.len();
        if closed > 0 {
            info!(count = closed, "closed connections of ended sessions");
        }
        closed
    }

    /// Close every connection (server shutdown).
    pub async fn close_all(&self) {
        let mut conns = self.connections.write().await;
        for (_, conn) in conns.drain() {
            conn.close();
        }
    }

    /// Number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Look up a connection.
    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Arc<ObserverConnection>> {
        self.connections.read().await.get(connection_id).cloned()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
