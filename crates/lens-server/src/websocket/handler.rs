//! `WebSocket` message dispatch: subscription control frames are handled
//! here, anything else is parsed as an `RpcRequest` and routed through the
//! `MethodRegistry`.

use lens_core::Role;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::connection::ObserverConnection;
use super::hub::BroadcastHub;
use super::pattern::KeyPattern;
use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Result of handling a `WebSocket` message.
pub struct HandleResult {
    /// Serialized JSON frame to send back.
    pub response_json: String,
    /// The RPC method or control frame type (empty if parse failed).
    pub method: String,
    /// Whether the request succeeded.
    pub success: bool,
}

/// Client → server subscription frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    Subscribe {
        #[serde(rename = "keyPattern")]
        key_pattern: String,
    },
    Unsubscribe {
        #[serde(rename = "keyPattern")]
        key_pattern: String,
    },
}

/// Everything one connection needs to answer its frames.
pub struct Dispatch<'a> {
    /// Method table.
    pub registry: &'a MethodRegistry,
    /// Handler context.
    pub ctx: &'a RpcContext,
    /// Hub the connection is registered with.
    pub hub: &'a BroadcastHub,
    /// The connection the frame arrived on.
    pub connection: &'a ObserverConnection,
    /// Bearer token presented on upgrade, re-validated per frame.
    pub token: &'a str,
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize response");
        String::new()
    })
}

/// Handle an incoming `WebSocket` text message.
#[instrument(skip_all, fields(method, conn_id = %dispatch.connection.id))]
pub async fn handle_message(message: &str, dispatch: &Dispatch<'_>) -> HandleResult {
    let value: Value = match serde_json::from_str(message) {
        Ok(v) => v,
        Err(e) => {
            warn!("invalid JSON received");
            let resp = RpcResponse::error("unknown", "INVALID_PARAMS", format!("Invalid JSON: {e}"));
            return HandleResult {
                response_json: to_json(&resp),
                method: String::new(),
                success: false,
            };
        }
    };

    if value.get("type").is_some() && value.get("method").is_none() {
        return handle_control(value, dispatch).await;
    }

    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("malformed RPC request");
            let resp = RpcResponse::error("unknown", "INVALID_PARAMS", format!("Invalid request: {e}"));
            return HandleResult {
                response_json: to_json(&resp),
                method: String::new(),
                success: false,
            };
        }
    };

    let method = request.method.clone();
    let _ = tracing::Span::current().record("method", method.as_str());
    debug!(method, id = request.id, "dispatching RPC");

    if !dispatch.registry.has_method(&method) {
        warn!(method, "unknown RPC method");
    }

    let response = dispatch
        .registry
        .dispatch(request, Some(dispatch.token), dispatch.ctx)
        .await;
    HandleResult {
        response_json: to_json(&response),
        method,
        success: response.success,
    }
}

async fn handle_control(value: Value, dispatch: &Dispatch<'_>) -> HandleResult {
    let method = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let _ = tracing::Span::current().record("method", method.as_str());

    match apply_control(value, dispatch).await {
        Ok(reply) => HandleResult {
            response_json: to_json(&reply),
            method,
            success: true,
        },
        Err(err) => {
            debug!(method, code = err.code(), "control frame rejected");
            HandleResult {
                response_json: to_json(&json!({ "type": "error", "error": err.to_error_body() })),
                method,
                success: false,
            }
        }
    }
}

async fn apply_control(value: Value, dispatch: &Dispatch<'_>) -> Result<Value, RpcError> {
    let session = dispatch.ctx.sessions.validate_token(dispatch.token)?;
    session.require(Role::Viewer)?;

    let frame: ControlFrame = serde_json::from_value(value).map_err(|e| RpcError::InvalidParams {
        message: format!("Invalid control frame: {e}"),
    })?;
    let parse = |raw: &str| {
        raw.parse::<KeyPattern>().map_err(|e| RpcError::InvalidParams {
            message: e.to_string(),
        })
    };

    let conn_id = &dispatch.connection.id;
    match frame {
        ControlFrame::Subscribe { key_pattern } => {
            let pattern = parse(&key_pattern)?;
            if !dispatch.hub.subscribe(conn_id, pattern.clone()).await {
                return Err(RpcError::NotFound {
                    message: format!("connection {conn_id} is not registered"),
                });
            }
            Ok(json!({ "type": "subscribed", "keyPattern": pattern.to_string() }))
        }
        ControlFrame::Unsubscribe { key_pattern } => {
            let pattern = parse(&key_pattern)?;
            let _ = dispatch.hub.unsubscribe(conn_id, &pattern).await;
            Ok(json!({ "type": "unsubscribed", "keyPattern": pattern.to_string() }))
        }
    }
}
