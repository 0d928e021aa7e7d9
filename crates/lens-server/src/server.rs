//! `InspectorServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::rpc::context::RpcContext;
use crate::rpc::errors::{self, RpcError, http_status};
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ObserverConnection;
use crate::websocket::hub::BroadcastHub;
use crate::websocket::session::{Heartbeat, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub for event fan-out.
    pub hub: Arc<BroadcastHub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// RPC method registry.
    pub registry: Arc<MethodRegistry>,
    /// Handler context.
    pub ctx: Arc<RpcContext>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus render handle.
    pub metrics_handle: PrometheusHandle,
}

/// The inspector server.
pub struct InspectorServer {
    config: Arc<ServerConfig>,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    hub: Arc<BroadcastHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
}

impl InspectorServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        registry: MethodRegistry,
        ctx: RpcContext,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            ctx: Arc::new(ctx),
            hub: Arc::new(BroadcastHub::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            registry: Arc::clone(&self.registry),
            ctx: Arc::clone(&self.ctx),
            config: Arc::clone(&self.config),
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/rpc", post(rpc_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve until the shutdown token is cancelled.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%local_addr, "inspector server listening");
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                warn!(error = %e, "server exited with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the broadcast hub.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Get the handler context.
    pub fn context(&self) -> &Arc<RpcContext> {
        &self.ctx
    }
}

/// Token from `Authorization: Bearer …`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn error_response(status: StatusCode, err: &RpcError) -> Response {
    (status, Json(json!({ "error": err.to_error_body() }))).into_response()
}

/// POST /rpc
async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<RpcResponse>) {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "invalid RPC body");
            let resp = RpcResponse::error("unknown", errors::INVALID_PARAMS, format!("Invalid JSON: {e}"));
            return (StatusCode::BAD_REQUEST, Json(resp));
        }
    };

    let response = state
        .registry
        .dispatch(request, bearer_token(&headers), &state.ctx)
        .await;
    let status = response
        .error_code()
        .map_or(StatusCode::OK, http_status);
    (status, Json(response))
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// GET /ws
///
/// The token is checked before the upgrade; a missing or invalid one gets a
/// plain 401.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(token) = bearer_token(&headers)
        .map(ToOwned::to_owned)
        .or(query.token)
    else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            &RpcError::Unauthorized {
                message: "a bearer token is required".into(),
            },
        );
    };
    let session = match state.ctx.sessions.validate_token(&token) {
        Ok(session) => session,
        Err(e) => {
            let err = RpcError::from(e);
            return error_response(http_status(err.code()), &err);
        }
    };

    if state.hub.connection_count().await >= state.config.max_connections {
        warn!(max = state.config.max_connections, "connection limit reached");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &RpcError::Internal {
                message: "too many observer connections".into(),
            },
        );
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let connection = Arc::new(ObserverConnection::new(
        session.id,
        state.config.outbound_queue_capacity,
    ));
    let heartbeat = Heartbeat {
        interval: state.config.heartbeat_interval(),
        timeout: state.config.heartbeat_timeout(),
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(
                socket,
                connection,
                token,
                state.registry,
                state.ctx,
                state.hub,
                heartbeat,
            )
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.hub.connection_count().await;
    let resp = health::health_check(
        state.start_time,
        connections,
        state.ctx.sessions.active_count(),
        state.ctx.registry.len(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics_handle),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use lens_core::Role;
    use lens_settings::LensSettings;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::rpc::handlers::register_all;

    fn make_server() -> InspectorServer {
        let ctx = RpcContext::from_settings(LensSettings::default()).unwrap();
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        InspectorServer::new(ServerConfig::default(), registry, ctx, metrics_handle)
    }

    fn token(server: &InspectorServer, role: Role) -> String {
        server.context().sessions.create_session(role, "test", None).token
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn rpc(body: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::from(body.to_owned())).unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(server.registry().has_method("store.change"));
        assert!(!server.shutdown().is_shutting_down());
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        let _ = headers.insert(header::AUTHORIZATION, "Bearer lens_abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("lens_abc"));
        let _ = headers.insert(header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        let _ = headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert!(parsed.get("active_sessions").is_some());
        assert_eq!(parsed["stores"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_is_text() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn ping_needs_no_token() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(rpc(r#"{"id":"p","method":"system.ping"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["id"], "p");
        assert_eq!(parsed["result"]["pong"], true);
    }

    #[tokio::test]
    async fn invalid_body_is_bad_request() {
        let server = make_server();
        let resp = server.router().oneshot(rpc("{nope", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["id"], "unknown");
        assert_eq!(parsed["error"]["code"], "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn rpc_errors_map_to_http_status() {
        let server = make_server();
        let viewer = token(&server, Role::Viewer);

        let resp = server
            .router()
            .oneshot(rpc(r#"{"id":"1","method":"store.list"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = server
            .router()
            .oneshot(rpc(
                r#"{"id":"2","method":"store.register","params":{"key":"cart"}}"#,
                Some(&viewer),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await["error"]["details"]["required"], "editor");

        let resp = server
            .router()
            .oneshot(rpc(r#"{"id":"3","method":"no.such"}"#, Some(&viewer)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn editor_round_trip_over_http() {
        let server = make_server();
        let editor = token(&server, Role::Editor);
        for body in [
            r#"{"id":"1","method":"store.register","params":{"key":"cart","value":{"items":[]}}}"#,
            r#"{"id":"2","method":"store.change","params":{"key":"cart","value":{"items":["x"]}}}"#,
        ] {
            let resp = server.router().oneshot(rpc(body, Some(&editor))).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let resp = server
            .router()
            .oneshot(rpc(
                r#"{"id":"3","method":"store.get","params":{"key":"cart"}}"#,
                Some(&editor),
            ))
            .await
            .unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["result"]["value"]["items"][0], "x");
        assert_eq!(parsed["result"]["version"], 1);
    }

    #[tokio::test]
    async fn ws_without_token_is_unauthorized() {
        let server = make_server();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn ws_with_bad_query_token_is_unauthorized() {
        let server = make_server();
        let req = Request::builder()
            .uri("/ws?token=lens_bogus")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_with_valid_token_but_no_upgrade_is_rejected_by_axum() {
        let server = make_server();
        let viewer = token(&server, Role::Viewer);
        let req = Request::builder()
            .uri(format!("/ws?token={viewer}"))
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
