//! Background tasks: session expiry sweep, compliance sweep, session
//! lifecycle listener, and the registry → hub event bridge.
//!
//! Every task exits when its `CancellationToken` is cancelled.

use std::sync::Arc;
use std::time::Duration;

use lens_auth::{SessionLifecycle, SessionManager};
use lens_core::SessionId;
use lens_registry::StoreRegistry;
use metrics::{counter, gauge};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compliance;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_EXPIRED_TOTAL, STORES_ACTIVE};
use crate::rpc::context::RpcContext;
use crate::rpc::types::RpcEvent;
use crate::server::InspectorServer;
use crate::websocket::event_bridge::EventBridge;
use crate::websocket::hub::BroadcastHub;

/// Run `tick` every `period` until cancelled. The immediate first tick is
/// skipped.
async fn every<F, Fut>(period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = time::interval(period.max(Duration::from_millis(10)));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let _ = interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            () = cancel.cancelled() => break,
        }
    }
}

/// Purge expired sessions every `period`.
pub fn spawn_session_sweep(
    sessions: Arc<SessionManager>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(every(period, cancel, move || {
        let sessions = Arc::clone(&sessions);
        async move {
            let purged = sessions.sweep_expired();
            if purged > 0 {
                counter!(SESSIONS_EXPIRED_TOTAL).increment(purged as u64);
            }
            #[allow(clippy::cast_precision_loss)]
            gauge!(SESSIONS_ACTIVE).set(sessions.active_count() as f64);
        }
    }))
}

/// Evaluate changed stores every `period` and push a `compliance_report`
/// frame per fresh report.
pub fn spawn_compliance_sweep(
    ctx: Arc<RpcContext>,
    hub: Arc<BroadcastHub>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(every(period, cancel, move || {
        let ctx = Arc::clone(&ctx);
        let hub = Arc::clone(&hub);
        async move {
            let reports = compliance::sweep(&ctx.registry, &ctx.laws, &ctx.reports);
            #[allow(clippy::cast_precision_loss)]
            gauge!(STORES_ACTIVE).set(ctx.registry.len() as f64);
            for report in reports {
                let data = match serde_json::to_value(&report) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(key = report.key, error = %e, "failed to serialize report");
                        continue;
                    }
                };
                let mut frame = RpcEvent::new("compliance_report")
                    .with_key(report.key.as_str())
                    .with_data(data);
                frame.version = Some(report.version);
                let _ = hub.publish(&report.key, &frame).await;
            }
        }
    }))
}

/// React to sessions ending: close their observer connections and, when
/// configured, deregister the stores they own.
///
/// If the listener lags behind the lifecycle channel, the missed endings are
/// recovered by checking every connection (and store owner) against
/// `sessions`.
pub fn spawn_lifecycle_listener(
    mut rx: broadcast::Receiver<SessionLifecycle>,
    sessions: Arc<SessionManager>,
    hub: Arc<BroadcastHub>,
    registry: Arc<StoreRegistry>,
    cleanup_stores: bool,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) if event.is_terminal() => {
                    let session_id = event.session_id();
                    let closed = hub.disconnect_session(session_id).await;
                    debug!(%session_id, closed, "session ended");
                    if cleanup_stores {
                        remove_owned_stores(&registry, session_id);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "session lifecycle listener lagged, reconciling");
                    let closed = hub.disconnect_stale(|id| sessions.is_live(id)).await;
                    let mut orphaned = Vec::new();
                    if cleanup_stores {
                        for key in registry.list_keys() {
                            let owner = registry.get(&key).ok().and_then(|s| s.owner_session_id);
                            if let Some(owner) = owner.filter(|o| !sessions.is_live(o)) {
                                if !orphaned.contains(&owner) {
                                    orphaned.push(owner);
                                }
                            }
                        }
                        for owner in &orphaned {
                            remove_owned_stores(&registry, owner);
                        }
                    }
                    info!(closed, ended_owners = orphaned.len(), "lifecycle reconciled");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn remove_owned_stores(registry: &StoreRegistry, session_id: &SessionId) {
    let removed = registry.deregister_owned_by(session_id);
    if !removed.is_empty() {
        info!(%session_id, stores = ?removed, "removed stores of ended session");
    }
}

/// Start the registry → hub event bridge.
pub fn spawn_event_bridge(
    registry: &StoreRegistry,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(EventBridge::new(registry.subscribe(), hub, cancel).run())
}

/// Start every background task for `server` and hand the handles to its
/// shutdown coordinator.
pub fn spawn_all(server: &InspectorServer) {
    let ctx = server.context();
    let hub = server.hub();
    let shutdown = server.shutdown();
    let settings = &ctx.settings;
    let cancel = shutdown.token();

    shutdown.register(spawn_event_bridge(&ctx.registry, Arc::clone(hub), cancel.clone()));
    shutdown.register(spawn_lifecycle_listener(
        ctx.sessions.subscribe(),
        Arc::clone(&ctx.sessions),
        Arc::clone(hub),
        Arc::clone(&ctx.registry),
        settings.registry.cleanup_on_session_end,
        cancel.clone(),
    ));
    shutdown.register(spawn_session_sweep(
        Arc::clone(&ctx.sessions),
        Duration::from_secs(settings.auth.sweep_interval_secs),
        cancel.clone(),
    ));
    shutdown.register(spawn_compliance_sweep(
        Arc::clone(ctx),
        Arc::clone(hub),
        Duration::from_secs(settings.laws.sweep_interval_secs),
        cancel,
    ));
    info!(tasks = shutdown.task_count(), "background tasks started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lens_core::Role;
    use lens_registry::RegisterMode;
    use lens_settings::LensSettings;
    use serde_json::{Value, json};

    use crate::websocket::connection::ObserverConnection;
    use crate::websocket::pattern::KeyPattern;

    fn ctx_with(settings: LensSettings) -> Arc<RpcContext> {
        Arc::new(RpcContext::from_settings(settings).unwrap())
    }

    async fn observer(hub: &BroadcastHub, session: lens_core::SessionId) -> Arc<ObserverConnection> {
        let conn = Arc::new(ObserverConnection::new(session, 16));
        hub.add(Arc::clone(&conn)).await;
        assert!(hub.subscribe(&conn.id, KeyPattern::All).await);
        conn
    }

    async fn next_json(conn: &ObserverConnection) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), conn.next_frame())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn session_sweep_purges_expired() {
        let ctx = ctx_with(LensSettings::default());
        let mut events = ctx.sessions.subscribe();
        let short = ctx
            .sessions
            .create_session(Role::Viewer, "short", Some(Duration::from_secs(1)));
        let cancel = CancellationToken::new();
        let handle = spawn_session_sweep(
            Arc::clone(&ctx.sessions),
            Duration::from_millis(20),
            cancel.clone(),
        );

        let expired = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let SessionLifecycle::Expired { session_id } = events.recv().await.unwrap() {
                    break session_id;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(expired, short.session.id);
        assert_eq!(ctx.sessions.active_count(), 0);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_listener_closes_connections_of_revoked_session() {
        let ctx = ctx_with(LensSettings::default());
        let hub = Arc::new(BroadcastHub::new());
        let issued = ctx.sessions.create_session(Role::Viewer, "obs", None);
        let conn = observer(&hub, issued.session.id.clone()).await;

        let cancel = CancellationToken::new();
        let handle = spawn_lifecycle_listener(
            ctx.sessions.subscribe(),
            Arc::clone(&ctx.sessions),
            Arc::clone(&hub),
            Arc::clone(&ctx.registry),
            false,
            cancel.clone(),
        );
        assert!(ctx.sessions.revoke(&issued.session.id));

        tokio::time::timeout(Duration::from_secs(5), conn.closed().cancelled())
            .await
            .unwrap();
        assert_eq!(hub.connection_count().await, 0);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_listener_cleans_up_owned_stores_when_enabled() {
        let mut settings = LensSettings::default();
        settings.registry.cleanup_on_session_end = true;
        let ctx = ctx_with(settings);
        let hub = Arc::new(BroadcastHub::new());
        let issued = ctx.sessions.create_session(Role::Editor, "producer", None);
        let _ = ctx
            .registry
            .register("cart", json!({}), &issued.session, RegisterMode::CreateOnly)
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_lifecycle_listener(
            ctx.sessions.subscribe(),
            Arc::clone(&ctx.sessions),
            Arc::clone(&hub),
            Arc::clone(&ctx.registry),
            true,
            cancel.clone(),
        );
        assert!(ctx.sessions.revoke(&issued.session.id));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !ctx.registry.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn lagging_lifecycle_listener_reconciles_connections_and_stores() {
        let mut settings = LensSettings::default();
        settings.registry.cleanup_on_session_end = true;
        let ctx = ctx_with(settings);
        let hub = Arc::new(BroadcastHub::new());
        let rx = ctx.sessions.subscribe();

        let gone = ctx.sessions.create_session(Role::Editor, "gone", None);
        let kept = ctx.sessions.create_session(Role::Viewer, "kept", None);
        let gone_conn = observer(&hub, gone.session.id.clone()).await;
        let kept_conn = observer(&hub, kept.session.id.clone()).await;
        let _ = ctx
            .registry
            .register("cart", json!({}), &gone.session, RegisterMode::CreateOnly)
            .unwrap();
        assert!(ctx.sessions.revoke(&gone.session.id));

        // Overflow the lifecycle channel so the revoke is never delivered.
        for _ in 0..1000 {
            let _ = ctx.sessions.create_session(Role::Viewer, "filler", None);
        }

        let cancel = CancellationToken::new();
        let handle = spawn_lifecycle_listener(
            rx,
            Arc::clone(&ctx.sessions),
            Arc::clone(&hub),
            Arc::clone(&ctx.registry),
            true,
            cancel.clone(),
        );

        tokio::time::timeout(Duration::from_secs(5), gone_conn.closed().cancelled())
            .await
            .unwrap();
        assert!(!kept_conn.is_closed());
        assert_eq!(hub.connection_count().await, 1);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !ctx.registry.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn compliance_sweep_publishes_reports() {
        let ctx = ctx_with(LensSettings::default());
        let hub = Arc::new(BroadcastHub::new());
        let issued = ctx.sessions.create_session(Role::Editor, "producer", None);
        let conn = observer(&hub, issued.session.id.clone()).await;
        let _ = ctx
            .registry
            .register("cart", json!({"a": 1}), &issued.session, RegisterMode::CreateOnly)
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_compliance_sweep(
            Arc::clone(&ctx),
            Arc::clone(&hub),
            Duration::from_millis(20),
            cancel.clone(),
        );

        let frame = next_json(&conn).await;
        assert_eq!(frame["type"], "compliance_report");
        assert_eq!(frame["key"], "cart");
        assert_eq!(frame["version"], 0);
        assert!(frame["data"]["score"].is_u64());
        assert!(ctx.reports.latest("cart").is_some());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn event_bridge_delivers_store_changes() {
        let ctx = ctx_with(LensSettings::default());
        let hub = Arc::new(BroadcastHub::new());
        let issued = ctx.sessions.create_session(Role::Editor, "producer", None);
        let conn = observer(&hub, issued.session.id.clone()).await;

        let cancel = CancellationToken::new();
        let handle = spawn_event_bridge(&ctx.registry, Arc::clone(&hub), cancel.clone());
        let _ = ctx
            .registry
            .register("cart", json!({"items": []}), &issued.session, RegisterMode::CreateOnly)
            .unwrap();
        let _ = ctx
            .registry
            .apply_change("cart", json!({"items": ["x"]}), &issued.session)
            .unwrap();

        assert_eq!(next_json(&conn).await["type"], "store_registered");
        let changed = next_json(&conn).await;
        assert_eq!(changed["type"], "store_changed");
        assert_eq!(changed["version"], 1);
        assert_eq!(changed["previousVersion"], 0);
        assert_eq!(changed["value"], json!({"items": ["x"]}));

        cancel.cancel();
        handle.await.unwrap();
    }
}
