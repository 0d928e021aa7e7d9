//! Event bridge: drains the registry's broadcast channel into the hub.

use std::sync::Arc;

use lens_registry::StoreEvent;
use metrics::counter;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::hub::BroadcastHub;
use crate::metrics::STORE_CHANGES_TOTAL;
use crate::rpc::types::RpcEvent;

/// Bridges registry events to observer connections.
pub struct EventBridge {
    rx: broadcast::Receiver<StoreEvent>,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
}

impl EventBridge {
    /// Create a new event bridge.
    pub fn new(
        rx: broadcast::Receiver<StoreEvent>,
        hub: Arc<BroadcastHub>,
        cancel: CancellationToken,
    ) -> Self {
        Self { rx, hub, cancel }
    }

    /// Run until cancelled or the registry is dropped.
    ///
    /// If the bridge falls behind the registry, the skipped events are gone;
    /// every connection is told to resync instead.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self) {
        loop {
            let received = tokio::select! {
                () = self.cancel.cancelled() => break,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    if matches!(event, StoreEvent::Changed { .. }) {
                        counter!(STORE_CHANGES_TOTAL).increment(1);
                    }
                    let rpc_event = store_event_to_rpc(&event);
                    let _ = self.hub.publish(event.key(), &rpc_event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event bridge lagged");
                    self.hub.resync_all("bridge_lagged").await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("registry closed, event bridge exiting");
                    break;
                }
            }
        }
    }
}

/// Convert a registry event to its wire frame.
pub fn store_event_to_rpc(event: &StoreEvent) -> RpcEvent {
    let mut frame = RpcEvent::new(event.event_type()).with_key(event.key());
    frame.timestamp = lens_core::time::to_wire(event.timestamp());
    frame.version = Some(event.version());
    match event {
        StoreEvent::Registered { value, .. } => {
            frame.value = Some(value.as_ref().clone());
        }
        StoreEvent::Changed {
            previous_version,
            value,
            actor_session_id,
            ..
        } => {
            frame.previous_version = Some(*previous_version);
            frame.value = Some(value.as_ref().clone());
            frame.data = Some(serde_json::json!({ "actorSessionId": actor_session_id }));
        }
        StoreEvent::Removed { .. } => {}
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ObserverConnection;
    use crate::websocket::pattern::KeyPattern;
    use chrono::{TimeZone, Utc};
    use lens_core::SessionId;
    use serde_json::{Value, json};

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn registered_frame() {
        let frame = store_event_to_rpc(&StoreEvent::Registered {
            key: "cart".into(),
            value: Arc::new(json!({"items": []})),
            timestamp: ts(),
        });
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "store_registered");
        assert_eq!(v["key"], "cart");
        assert_eq!(v["version"], 0);
        assert_eq!(v["value"], json!({"items": []}));
        assert_eq!(v["timestamp"], "2026-03-01T12:00:00.000Z");
        assert!(v.get("previousVersion").is_none());
    }

    #[test]
    fn changed_frame() {
        let frame = store_event_to_rpc(&StoreEvent::Changed {
            key: "cart".into(),
            version: 4,
            previous_version: 3,
            value: Arc::new(json!(1)),
            timestamp: ts(),
            actor_session_id: SessionId::from("sess_w"),
        });
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "store_changed");
        assert_eq!(v["version"], 4);
        assert_eq!(v["previousVersion"], 3);
        assert_eq!(v["data"]["actorSessionId"], "sess_w");
    }

    #[test]
    fn removed_frame() {
        let frame = store_event_to_rpc(&StoreEvent::Removed {
            key: "cart".into(),
            last_version: 9,
            timestamp: ts(),
        });
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "store_removed");
        assert_eq!(v["version"], 9);
        assert!(v.get("value").is_none());
    }

    #[tokio::test]
    async fn bridge_forwards_until_cancelled() {
        let (tx, rx) = broadcast::channel(16);
        let hub = Arc::new(BroadcastHub::new());
        let conn = Arc::new(ObserverConnection::new(SessionId::from("sess_a"), 16));
        hub.add(Arc::clone(&conn)).await;
        let _ = conn.subscribe(KeyPattern::All);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(EventBridge::new(rx, Arc::clone(&hub), cancel.clone()).run());

        let _ = tx.send(StoreEvent::Removed {
            key: "cart".into(),
            last_version: 1,
            timestamp: ts(),
        });
        let frame: Value = serde_json::from_str(&conn.next_frame().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "store_removed");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lagged_bridge_requests_resync() {
        let (tx, rx) = broadcast::channel(2);
        let hub = Arc::new(BroadcastHub::new());
        let conn = Arc::new(ObserverConnection::new(SessionId::from("sess_a"), 16));
        hub.add(Arc::clone(&conn)).await;

        // Overrun the channel before the bridge starts reading.
        for v in 0..5 {
            let _ = tx.send(StoreEvent::Removed {
                key: format!("k{v}"),
                last_version: v,
                timestamp: ts(),
            });
        }
        drop(tx);
        EventBridge::new(rx, Arc::clone(&hub), CancellationToken::new())
            .run()
            .await;

        let frame: Value = serde_json::from_str(&conn.next_frame().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "resync_required");
    }
}
